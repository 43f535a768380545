//! Per-container-type lifecycle handlers.
//!
//! One handler per `type` string, registered explicitly at startup. The
//! trait requires every lifecycle method, so an incomplete handler is
//! rejected by the compiler rather than discovered mid-deploy.

use std::collections::BTreeMap;
use std::error::Error;

use serde_json::Value;
use thiserror::Error as ThisError;

use crate::document::{ContainerDefinition, ContainerInstance, SystemDocument};

/// Whether handler side effects are real or only described.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExecuteMode {
  Live,
  /// Handlers must be side-effect-free and describe what they would do.
  Preview,
}

/// Opaque failure from a handler; surfaced verbatim to the caller.
pub type HandlerError = Box<dyn Error + Send + Sync>;

/// Receives a monotonically increasing percentage. Any `FnMut(u32)` closure
/// is a sink.
pub trait ProgressSink {
  fn emit(&mut self, percent: u32);
}

impl<F: FnMut(u32)> ProgressSink for F {
  fn emit(&mut self, percent: u32) {
    self(percent)
  }
}

/// Everything a handler sees for one step.
pub struct StepContext<'a> {
  pub mode: ExecuteMode,
  /// `specific` block of the containing instance's definition, when the
  /// instance has a distinct parent.
  pub parent_specific: Option<&'a Value>,
  /// The topology the executor is converging on.
  pub document: &'a SystemDocument,
  pub definition: &'a ContainerDefinition,
  pub instance: &'a ContainerInstance,
  /// Sub-step progress channel for long-running actions (image pulls, VM
  /// boots). Percentages are scoped to this step; the executor emits its
  /// own per-step tick after the handler returns.
  pub progress: &'a mut dyn ProgressSink,
}

/// An identifier learned during execution, e.g. a freshly created resource
/// reporting its real id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Remap {
  pub old_id: String,
  pub new_id: String,
}

/// What a handler hands back: optionally a replacement topology and a set
/// of identifier remaps the executor must propagate through the remaining
/// plan.
#[derive(Debug, Default)]
pub struct StepOutcome {
  pub document: Option<SystemDocument>,
  pub remaps: Vec<Remap>,
}

impl StepOutcome {
  /// No replacement document, no remaps.
  pub fn unchanged() -> Self {
    Self::default()
  }
}

/// The full lifecycle capability set for one container type.
pub trait ContainerHandler {
  fn add(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
  fn start(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
  fn link(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
  fn unlink(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
  fn stop(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
  fn remove(&self, ctx: &mut StepContext<'_>) -> Result<StepOutcome, HandlerError>;
}

#[derive(Debug, ThisError)]
#[error("handler for container type '{0}' already registered")]
pub struct DuplicateHandler(pub String);

/// Type tag to handler mapping, populated at startup.
#[derive(Default)]
pub struct HandlerRegistry {
  handlers: BTreeMap<String, Box<dyn ContainerHandler>>,
}

impl HandlerRegistry {
  pub fn new() -> Self {
    Self::default()
  }

  pub fn register(
    &mut self,
    container_type: impl Into<String>,
    handler: Box<dyn ContainerHandler>,
  ) -> Result<(), DuplicateHandler> {
    let container_type = container_type.into();
    if self.handlers.contains_key(&container_type) {
      return Err(DuplicateHandler(container_type));
    }
    self.handlers.insert(container_type, handler);
    Ok(())
  }

  pub fn get(&self, container_type: &str) -> Option<&dyn ContainerHandler> {
    self.handlers.get(container_type).map(Box::as_ref)
  }

  pub fn registered_types(&self) -> impl Iterator<Item = &str> {
    self.handlers.keys().map(String::as_str)
  }
}

//! Deployment plans and the planner boundary.
//!
//! A plan is an ordered list of lifecycle steps transforming the currently
//! deployed topology into the target topology. Plans are *consumed* here,
//! never produced: the diffing algorithm is an external collaborator behind
//! the [`Planner`] trait.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::document::SystemDocument;

/// A lifecycle command applied to one container instance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StepCommand {
  Add,
  Start,
  Link,
  Unlink,
  Stop,
  Remove,
}

impl fmt::Display for StepCommand {
  fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
    let name = match self {
      StepCommand::Add => "add",
      StepCommand::Start => "start",
      StepCommand::Link => "link",
      StepCommand::Unlink => "unlink",
      StepCommand::Stop => "stop",
      StepCommand::Remove => "remove",
    };
    f.write_str(name)
  }
}

/// One plan step. `parent` names the other end of a link/unlink, or the
/// containing instance for structural steps that need it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Step {
  pub id: String,
  pub cmd: StepCommand,
  #[serde(default, skip_serializing_if = "Option::is_none")]
  pub parent: Option<String>,
}

/// An ordered sequence of steps. Empty means "no changes required".
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Plan {
  pub steps: Vec<Step>,
}

impl Plan {
  pub fn new(steps: Vec<Step>) -> Self {
    Self { steps }
  }

  pub fn is_empty(&self) -> bool {
    self.steps.is_empty()
  }

  pub fn len(&self) -> usize {
    self.steps.len()
  }
}

/// The planner failed outright; the deploy must not proceed.
#[derive(Debug, Error)]
#[error("planning failed: {0}")]
pub struct PlanError(pub String);

/// External diffing collaborator: computes the step list that transforms
/// `current` into `target`.
pub trait Planner {
  fn plan(&self, current: &SystemDocument, target: &SystemDocument) -> Result<Plan, PlanError>;
}

//! Sequential plan execution against live infrastructure.

use thiserror::Error;
use tracing::{debug, warn};

use crate::document::{ContainerDefinition, ContainerInstance, SystemDocument};
use crate::plan::{Plan, Step, StepCommand};

use super::handler::{
  ExecuteMode, HandlerError, HandlerRegistry, ProgressSink, StepContext, StepOutcome,
};

#[derive(Debug, Error)]
pub enum ExecuteError {
  #[error("instance '{id}' referenced by step {step} not found in either topology")]
  InstanceNotFound { step: usize, id: String },

  #[error("definition '{id}' referenced by step {step} not found in either topology")]
  DefinitionNotFound { step: usize, id: String },

  #[error("no handler registered for container type '{container_type}' (instance '{id}')")]
  UnsupportedContainerType { container_type: String, id: String },

  #[error("step '{cmd} {id}' failed: {source}")]
  Handler {
    id: String,
    cmd: StepCommand,
    source: HandlerError,
  },
}

/// Applies an externally supplied plan, strictly in order.
///
/// No rollback: a failed step aborts execution and leaves infrastructure
/// between the two topologies. The caller must re-derive a fresh plan
/// rather than resume a partial one.
pub struct DeploymentExecutor {
  handlers: HandlerRegistry,
}

impl DeploymentExecutor {
  pub fn new(handlers: HandlerRegistry) -> Self {
    Self { handlers }
  }

  /// Apply `plan` to converge `current` onto `target`, returning the final
  /// topology.
  ///
  /// Instances and definitions are resolved target-first with a fallback to
  /// `current`, so both "new node" and "removed node" steps resolve. When a
  /// handler reports id remaps, every remaining step referencing an old id
  /// is rewritten before execution continues. Progress ticks after every
  /// step, independent of that step's outcome; handlers additionally emit
  /// their own sub-step percentages through the context.
  pub fn execute<P: ProgressSink>(
    &self,
    current: &SystemDocument,
    target: &SystemDocument,
    plan: &Plan,
    mode: ExecuteMode,
    progress: &mut P,
  ) -> Result<SystemDocument, ExecuteError> {
    let mut document = target.clone();
    let mut steps: Vec<Step> = plan.steps.clone();
    let total = steps.len();

    for index in 0..total {
      let step = steps[index].clone();
      let result = self.run_step(current, &document, &step, index, mode, progress);
      progress.emit(((index + 1) * 100 / total) as u32);

      let outcome = result?;
      if let Some(replacement) = outcome.document {
        document = replacement;
      }
      for remap in &outcome.remaps {
        debug!(old = %remap.old_id, new = %remap.new_id, "propagating id remap through plan");
        for later in steps.iter_mut().skip(index + 1) {
          if later.id == remap.old_id {
            later.id = remap.new_id.clone();
          }
          if later.parent.as_deref() == Some(remap.old_id.as_str()) {
            later.parent = Some(remap.new_id.clone());
          }
        }
      }
    }

    Ok(document)
  }

  fn run_step(
    &self,
    current: &SystemDocument,
    document: &SystemDocument,
    step: &Step,
    index: usize,
    mode: ExecuteMode,
    progress: &mut dyn ProgressSink,
  ) -> Result<StepOutcome, ExecuteError> {
    let instance = resolve_instance(document, current, &step.id).ok_or_else(|| {
      ExecuteError::InstanceNotFound {
        step: index,
        id: step.id.clone(),
      }
    })?;
    let definition = resolve_definition(document, current, &instance.container_definition_id)
      .ok_or_else(|| ExecuteError::DefinitionNotFound {
        step: index,
        id: instance.container_definition_id.clone(),
      })?;
    let handler = self.handlers.get(&definition.container_type).ok_or_else(|| {
      ExecuteError::UnsupportedContainerType {
        container_type: definition.container_type.clone(),
        id: instance.id.clone(),
      }
    })?;

    let parent_specific = if instance.is_root() {
      None
    } else {
      resolve_instance(document, current, &instance.contained_by)
        .and_then(|parent| resolve_definition(document, current, &parent.container_definition_id))
        .map(|parent_definition| &parent_definition.specific)
    };

    let mut ctx = StepContext {
      mode,
      parent_specific,
      document,
      definition,
      instance,
      progress,
    };

    debug!(step = index, cmd = %step.cmd, id = %step.id, "executing step");
    let dispatched = match step.cmd {
      StepCommand::Add => handler.add(&mut ctx),
      StepCommand::Start => handler.start(&mut ctx),
      StepCommand::Link => handler.link(&mut ctx),
      StepCommand::Unlink => handler.unlink(&mut ctx),
      StepCommand::Stop => handler.stop(&mut ctx),
      StepCommand::Remove => handler.remove(&mut ctx),
    };
    dispatched.map_err(|source| {
      warn!(step = index, cmd = %step.cmd, id = %step.id, %source, "step failed");
      ExecuteError::Handler {
        id: step.id.clone(),
        cmd: step.cmd,
        source,
      }
    })
  }
}

fn resolve_instance<'a>(
  target: &'a SystemDocument,
  current: &'a SystemDocument,
  id: &str,
) -> Option<&'a ContainerInstance> {
  target.topology.get(id).or_else(|| current.topology.get(id))
}

fn resolve_definition<'a>(
  target: &'a SystemDocument,
  current: &'a SystemDocument,
  id: &str,
) -> Option<&'a ContainerDefinition> {
  target
    .definition_by_id(id)
    .or_else(|| current.definition_by_id(id))
}

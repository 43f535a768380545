//! Deploy orchestration: resolve a target revision, gate it, plan the
//! diff, execute the plan, then move the environment pointer.

mod execute;
mod handler;

use serde_json::json;
use thiserror::Error;
use tracing::info;

use crate::document::{self, DocumentError, SystemDocument};
use crate::gate::{DependencyGate, GateError, GateReport};
use crate::plan::{PlanError, Planner};
use crate::registry::System;
use crate::revlog::{RevisionLog, RevlogError};
use crate::store::RevisionStore;

pub use execute::{DeploymentExecutor, ExecuteError};
pub use handler::{
  ContainerHandler, DuplicateHandler, ExecuteMode, HandlerError, HandlerRegistry, ProgressSink,
  Remap, StepContext, StepOutcome,
};

#[derive(Debug, Error)]
pub enum DeployError {
  /// One or more declared version constraints failed; the report carries
  /// every failing tuple.
  #[error("dependency gate refused deploy of '{revision}' to '{env}'")]
  GateRefused {
    revision: String,
    env: String,
    report: GateReport,
  },

  #[error("target document is invalid: {0}")]
  InvalidTarget(#[from] DocumentError),

  #[error(transparent)]
  Gate(#[from] GateError),

  #[error(transparent)]
  Plan(#[from] PlanError),

  #[error(transparent)]
  Execute(#[from] ExecuteError),

  #[error(transparent)]
  Revlog(#[from] RevlogError),
}

/// One deploy request: revision `identifier` of `system` into `env`.
pub struct DeployRequest<'a> {
  pub user: &'a str,
  pub system: &'a System,
  /// Anything `find_revision` accepts.
  pub identifier: &'a str,
  pub env: &'a str,
  pub mode: ExecuteMode,
}

/// Run a full deploy.
///
/// The target document is validated and gated before any handler runs. In
/// [`ExecuteMode::Live`] the environment pointer moves only after the whole
/// plan succeeded; [`ExecuteMode::Preview`] never touches pointers. The
/// final topology (post handler remaps) is returned either way.
pub fn run_deploy<S, P, G>(
  revlog: &RevisionLog<S>,
  executor: &DeploymentExecutor,
  planner: &P,
  gate: &DependencyGate,
  request: &DeployRequest<'_>,
  progress: &mut G,
) -> Result<SystemDocument, DeployError>
where
  S: RevisionStore,
  P: Planner,
  G: ProgressSink,
{
  let revision = revlog.find_revision(request.system, request.identifier)?;
  let target = revlog.get_revision(request.system, &revision, request.env)?;
  document::validate(&target)?;

  let report = gate.check(&target)?;
  if !report.ok {
    return Err(DeployError::GateRefused {
      revision,
      env: request.env.to_string(),
      report,
    });
  }

  let current = match revlog.get_deployed_revision(request.system, request.env, request.env) {
    Ok(document) => document,
    Err(RevlogError::NothingDeployed { .. }) => SystemDocument::empty(&target.name),
    Err(e) => return Err(e.into()),
  };

  let plan = planner.plan(&current, &target)?;
  info!(
    system = %request.system.id,
    env = request.env,
    revision = %revision,
    steps = plan.len(),
    "executing deploy plan"
  );
  let final_document = executor.execute(&current, &target, &plan, request.mode, progress)?;

  if request.mode == ExecuteMode::Live {
    revlog.mark_deployed_revision(request.user, request.system, &revision, request.env)?;
  } else {
    revlog.write_timeline(
      request.user,
      request.system,
      "preview",
      json!({ "revision": revision, "environment": request.env }),
    );
  }

  Ok(final_document)
}

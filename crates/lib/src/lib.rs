//! Core library for convoy, a deployment orchestrator for multi-container
//! systems.
//!
//! A *system* is a declarative topology of containers (docker images, VM
//! instances, load-balancer groups) whose definition is versioned in a
//! per-system git repository. The library is organized around that history:
//!
//! - [`store`] — git-backed revision primitives (commit, tag, read-at-rev)
//! - [`registry`] — maps stable system ids/names to repository paths
//! - [`revlog`] — revision and per-environment deployment semantics
//! - [`rewrite`] — identifier rewriting during container builds
//! - [`gate`] — semantic-version dependency checks before a deploy
//! - [`deploy`] — sequential execution of an externally computed plan
//!
//! The diffing planner and the per-technology command runners are external
//! collaborators; only their interface boundaries ([`plan::Planner`] and
//! [`deploy::ContainerHandler`]) live here.

pub mod config;
pub mod deploy;
pub mod document;
pub mod gate;
pub mod lock;
pub mod plan;
pub mod registry;
pub mod revlog;
pub mod rewrite;
pub mod store;

pub use config::{Author, Config};
pub use deploy::{
  ContainerHandler, DeployError, DeployRequest, DeploymentExecutor, ExecuteMode, HandlerRegistry,
  ProgressSink, StepContext, StepOutcome, run_deploy,
};
pub use document::{ContainerDefinition, ContainerInstance, SystemDocument};
pub use gate::{DependencyGate, GateReport};
pub use plan::{Plan, Planner, Step, StepCommand};
pub use registry::{System, SystemRegistry};
pub use revlog::{EDITS, RevisionLog};
pub use store::{GitRevisionStore, RevisionStore};

//! The system document: container definitions plus the instance topology.

mod types;
mod validate;

pub use types::{ContainerDefinition, ContainerInstance, SystemDocument};
pub use validate::{DocumentError, validate};

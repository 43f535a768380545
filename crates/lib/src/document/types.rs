//! System document types.
//!
//! A document is the unit a revision snapshots: the container definitions a
//! system is built from, and the topology of instances wired together at
//! deploy time. Field names serialize in camelCase — that is the on-disk
//! format of `<target>.json` files inside a system repository.
//!
//! # Topology
//!
//! The topology is a tree keyed by instance id. The root marks itself by
//! setting `containedBy` to its own id; every other instance points at its
//! parent, and the parent lists it in `contains`. [`BTreeMap`] keeps the
//! serialized form deterministic.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// A versioned container blueprint.
///
/// Definitions are immutable once a committed revision references them: the
/// build pipeline mints a *new* id (see [`crate::rewrite`]) instead of
/// mutating one in place.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerDefinition {
  pub id: String,
  pub name: String,
  /// Technology tag (`docker`, `aws`, ...) used for handler dispatch.
  #[serde(rename = "type")]
  pub container_type: String,
  pub version: String,
  /// Type-specific fields (image name, repository URL, instance size, ...).
  #[serde(default)]
  pub specific: serde_json::Value,
  /// Declared constraints on sibling definitions: name -> semver range.
  #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
  pub dependencies: BTreeMap<String, String>,
}

/// A node in the instance topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContainerInstance {
  pub id: String,
  pub container_definition_id: String,
  /// Parent instance id; the root references itself.
  pub contained_by: String,
  #[serde(default, skip_serializing_if = "Vec::is_empty")]
  pub contains: Vec<String>,
}

impl ContainerInstance {
  /// The root marks "no parent" with a self-reference.
  pub fn is_root(&self) -> bool {
    self.contained_by == self.id
  }
}

/// A complete system document: definitions plus topology.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SystemDocument {
  pub name: String,
  #[serde(default)]
  pub container_definitions: Vec<ContainerDefinition>,
  #[serde(default)]
  pub topology: BTreeMap<String, ContainerInstance>,
}

impl SystemDocument {
  /// An empty document (no definitions, no topology).
  pub fn empty(name: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      container_definitions: Vec::new(),
      topology: BTreeMap::new(),
    }
  }

  pub fn definition_by_id(&self, id: &str) -> Option<&ContainerDefinition> {
    self.container_definitions.iter().find(|d| d.id == id)
  }

  pub(crate) fn definition_by_id_mut(&mut self, id: &str) -> Option<&mut ContainerDefinition> {
    self.container_definitions.iter_mut().find(|d| d.id == id)
  }

  /// Look a definition up by its stable name (dependency constraints are
  /// declared by name, not id).
  pub fn definition_by_name(&self, name: &str) -> Option<&ContainerDefinition> {
    self.container_definitions.iter().find(|d| d.name == name)
  }

  pub fn root(&self) -> Option<&ContainerInstance> {
    self.topology.values().find(|i| i.is_root())
  }
}

//! Whole-graph validation of a system document.
//!
//! The checks here mirror the invariants the rest of the engine relies on:
//! unique ids, resolvable definition references, bidirectional parent/child
//! consistency, exactly one root, and every instance reachable from that
//! root. Identifier rewriting is expected to
//! preserve all of them; a violation observed at runtime is a bug, not a
//! recoverable condition.

use std::collections::BTreeSet;

use thiserror::Error;

use super::types::SystemDocument;

/// A violated document invariant, pointing at the offending node.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum DocumentError {
  #[error("duplicate container definition id '{0}'")]
  DuplicateDefinitionId(String),

  #[error("topology key '{key}' does not match instance id '{id}'")]
  KeyMismatch { key: String, id: String },

  #[error("instance '{instance}' references unknown container definition '{definition}'")]
  UnknownDefinition { instance: String, definition: String },

  #[error("instance '{instance}' is contained by unknown instance '{parent}'")]
  UnknownParent { instance: String, parent: String },

  #[error("instance '{parent}' does not list child '{child}' in contains")]
  MissingContainsEntry { parent: String, child: String },

  #[error("instance '{parent}' lists unknown child '{child}'")]
  UnknownChild { parent: String, child: String },

  #[error("instance '{child}' is listed by '{parent}' but contained by '{actual}'")]
  ParentMismatch {
    parent: String,
    child: String,
    actual: String,
  },

  #[error("topology has no root instance")]
  MissingRoot,

  #[error("instance '{0}' is not reachable from the root")]
  UnreachableInstance(String),

  #[error("topology has multiple roots: '{0}' and '{1}'")]
  MultipleRoots(String, String),
}

/// Validate every structural invariant of `doc`.
///
/// Returns the first violation found. An empty topology is valid (a system
/// can be all definitions and no deployed shape yet).
pub fn validate(doc: &SystemDocument) -> Result<(), DocumentError> {
  let mut definition_ids = BTreeSet::new();
  for definition in &doc.container_definitions {
    if !definition_ids.insert(definition.id.as_str()) {
      return Err(DocumentError::DuplicateDefinitionId(definition.id.clone()));
    }
  }

  let mut root: Option<&str> = None;
  for (key, instance) in &doc.topology {
    if *key != instance.id {
      return Err(DocumentError::KeyMismatch {
        key: key.clone(),
        id: instance.id.clone(),
      });
    }

    if !definition_ids.contains(instance.container_definition_id.as_str()) {
      return Err(DocumentError::UnknownDefinition {
        instance: instance.id.clone(),
        definition: instance.container_definition_id.clone(),
      });
    }

    if instance.is_root() {
      match root {
        None => root = Some(&instance.id),
        Some(existing) => {
          return Err(DocumentError::MultipleRoots(
            existing.to_string(),
            instance.id.clone(),
          ));
        }
      }
    } else {
      let parent =
        doc
          .topology
          .get(&instance.contained_by)
          .ok_or_else(|| DocumentError::UnknownParent {
            instance: instance.id.clone(),
            parent: instance.contained_by.clone(),
          })?;
      if !parent.contains.contains(&instance.id) {
        return Err(DocumentError::MissingContainsEntry {
          parent: parent.id.clone(),
          child: instance.id.clone(),
        });
      }
    }

    for child_id in &instance.contains {
      let child = doc
        .topology
        .get(child_id)
        .ok_or_else(|| DocumentError::UnknownChild {
          parent: instance.id.clone(),
          child: child_id.clone(),
        })?;
      if child.contained_by != instance.id {
        return Err(DocumentError::ParentMismatch {
          parent: instance.id.clone(),
          child: child_id.clone(),
          actual: child.contained_by.clone(),
        });
      }
    }
  }

  match root {
    None if !doc.topology.is_empty() => return Err(DocumentError::MissingRoot),
    Some(root_id) => {
      // Pairwise-consistent edges can still form an island (a detached
      // parent/child cycle); walk down from the root to rule that out.
      let mut visited: BTreeSet<&str> = BTreeSet::new();
      let mut pending: Vec<&str> = vec![root_id];
      while let Some(id) = pending.pop() {
        if !visited.insert(id) {
          continue;
        }
        if let Some(instance) = doc.topology.get(id) {
          pending.extend(instance.contains.iter().map(String::as_str));
        }
      }
      if visited.len() != doc.topology.len()
        && let Some(orphan) = doc.topology.keys().find(|k| !visited.contains(k.as_str()))
      {
        return Err(DocumentError::UnreachableInstance(orphan.clone()));
      }
    }
    None => {}
  }

  Ok(())
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use super::super::types::{ContainerDefinition, ContainerInstance};
  use super::*;

  fn definition(id: &str) -> ContainerDefinition {
    ContainerDefinition {
      id: id.to_string(),
      name: id.to_string(),
      container_type: "docker".to_string(),
      version: "1.0.0".to_string(),
      specific: serde_json::json!({}),
      dependencies: BTreeMap::new(),
    }
  }

  fn instance(id: &str, definition_id: &str, parent: &str, children: &[&str]) -> ContainerInstance {
    ContainerInstance {
      id: id.to_string(),
      container_definition_id: definition_id.to_string(),
      contained_by: parent.to_string(),
      contains: children.iter().map(|c| c.to_string()).collect(),
    }
  }

  fn valid_doc() -> SystemDocument {
    let mut doc = SystemDocument::empty("test");
    doc.container_definitions.push(definition("host"));
    doc.container_definitions.push(definition("api"));
    doc
      .topology
      .insert("h0".to_string(), instance("h0", "host", "h0", &["a0"]));
    doc
      .topology
      .insert("a0".to_string(), instance("a0", "api", "h0", &[]));
    doc
  }

  #[test]
  fn accepts_valid_document() {
    assert_eq!(validate(&valid_doc()), Ok(()));
  }

  #[test]
  fn accepts_empty_topology() {
    let mut doc = valid_doc();
    doc.topology.clear();
    assert_eq!(validate(&doc), Ok(()));
  }

  #[test]
  fn rejects_duplicate_definition_id() {
    let mut doc = valid_doc();
    doc.container_definitions.push(definition("api"));
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::DuplicateDefinitionId(id)) if id == "api"
    ));
  }

  #[test]
  fn rejects_unknown_definition_reference() {
    let mut doc = valid_doc();
    doc.topology.get_mut("a0").unwrap().container_definition_id = "ghost".to_string();
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::UnknownDefinition { .. })
    ));
  }

  #[test]
  fn rejects_missing_contains_entry() {
    let mut doc = valid_doc();
    doc.topology.get_mut("h0").unwrap().contains.clear();
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::MissingContainsEntry { .. })
    ));
  }

  #[test]
  fn rejects_dangling_child() {
    let mut doc = valid_doc();
    doc
      .topology
      .get_mut("h0")
      .unwrap()
      .contains
      .push("gone".to_string());
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::UnknownChild { .. })
    ));
  }

  #[test]
  fn rejects_multiple_roots() {
    let mut doc = valid_doc();
    doc
      .topology
      .insert("h1".to_string(), instance("h1", "host", "h1", &[]));
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::MultipleRoots(..))
    ));
  }

  #[test]
  fn rejects_instances_disconnected_from_the_root() {
    let mut doc = valid_doc();
    // b0 and c0 are pairwise consistent but form an island off the tree.
    doc
      .topology
      .insert("b0".to_string(), instance("b0", "api", "c0", &["c0"]));
    doc
      .topology
      .insert("c0".to_string(), instance("c0", "api", "b0", &["b0"]));
    assert!(matches!(
      validate(&doc),
      Err(DocumentError::UnreachableInstance(id)) if id == "b0"
    ));
  }

  #[test]
  fn rejects_rootless_topology() {
    let mut doc = valid_doc();
    // Break the self-reference; h0 now points at a node that lists it, so
    // fabricate a cycle without a root.
    doc.topology.get_mut("h0").unwrap().contained_by = "a0".to_string();
    doc
      .topology
      .get_mut("a0")
      .unwrap()
      .contains
      .push("h0".to_string());
    assert_eq!(validate(&doc), Err(DocumentError::MissingRoot));
  }
}

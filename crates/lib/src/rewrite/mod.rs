//! Identifier rewriting for the build pipeline.
//!
//! Once build artifacts exist, a container definition gets a *new* id that
//! embeds the artifact identity (a commit sha, an image tag) instead of
//! mutating the old id in place. [`rename_definition`] is the primitive:
//! it renames the definition and propagates the rename through every
//! topology instance and adjacency link, returning a new document so
//! concurrent readers never observe a half-mutated graph.
//!
//! Two policies are built on it: commit-pinning ([`pin`]) and image-tagging
//! ([`image`]). Both derive the new id from the *base* id (everything up to
//! the first `$`), so re-applying a policy with the same artifact is
//! idempotent.

mod image;
mod pin;
mod sync;

use thiserror::Error;

use crate::document::{ContainerInstance, SystemDocument};

pub use image::pin_to_image_tag;
pub use pin::{PinOutcome, apply_commit_pin, pin_to_commit};
pub use sync::{SyncError, sync_source};

#[derive(Debug, Error)]
pub enum RewriteError {
  #[error("container definition '{0}' not found in document")]
  DefinitionNotFound(String),

  #[error("instance rename collides with existing id '{0}'")]
  IdCollision(String),

  #[error("definition '{definition}' is missing required field '{field}'")]
  MissingField { definition: String, field: String },

  #[error(transparent)]
  Sync(#[from] SyncError),
}

/// The id without any build suffix (everything up to the first `$`).
pub(crate) fn base_id(id: &str) -> &str {
  id.split('$').next().unwrap_or(id)
}

/// Rename a container definition and propagate the rename everywhere.
///
/// - the definition's own `id` becomes `new_id`;
/// - every instance referencing it has `container_definition_id` updated;
/// - `instance_id` may additionally rename the instance itself (return
///   `None` or the unchanged id to keep it). A renamed instance is re-keyed
///   in the topology map and every reference to it — the parent's
///   `contains`, each child's `contained_by`, the root self-reference — is
///   fixed up.
///
/// The input document is untouched; the transformed copy is returned.
pub fn rename_definition<F>(
  document: &SystemDocument,
  definition_id: &str,
  new_id: &str,
  mut instance_id: F,
) -> Result<SystemDocument, RewriteError>
where
  F: FnMut(&ContainerInstance) -> Option<String>,
{
  let mut next = document.clone();

  let definition = next
    .definition_by_id_mut(definition_id)
    .ok_or_else(|| RewriteError::DefinitionNotFound(definition_id.to_string()))?;
  definition.id = new_id.to_string();

  let mut renames: Vec<(String, String)> = Vec::new();
  for instance in next.topology.values_mut() {
    if instance.container_definition_id == definition_id {
      instance.container_definition_id = new_id.to_string();
      if let Some(renamed) = instance_id(instance)
        && renamed != instance.id
      {
        renames.push((instance.id.clone(), renamed));
      }
    }
  }

  for (old, new) in &renames {
    if next.topology.contains_key(new) {
      return Err(RewriteError::IdCollision(new.clone()));
    }
    let Some(mut instance) = next.topology.remove(old) else {
      continue;
    };
    if instance.contained_by == *old {
      instance.contained_by = new.clone();
    }
    instance.id = new.clone();
    next.topology.insert(new.clone(), instance);

    for other in next.topology.values_mut() {
      if other.id != *new {
        if other.contained_by == *old {
          other.contained_by = new.clone();
        }
      }
      for child in other.contains.iter_mut() {
        if child == old {
          *child = new.clone();
        }
      }
    }
  }

  Ok(next)
}

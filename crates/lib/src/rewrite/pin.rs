//! Commit-pinning: bake a source commit sha into a definition's identity.

use std::path::Path;

use serde_json::Value;
use tracing::info;

use crate::document::SystemDocument;

use super::{RewriteError, base_id, rename_definition, sync_source};

/// Result of pinning a definition to a source commit.
#[derive(Debug, Clone)]
pub struct PinOutcome {
  pub document: SystemDocument,
  /// The commit sha the definition is now pinned to.
  pub commit: String,
}

/// Sync the definition's source repository and pin the definition to its
/// head commit.
///
/// The source URL comes from the definition's `specific.repositoryUrl`; the
/// checkout lives under `workspace_dir` and is reused across syncs. When
/// the sync fails the document is returned untouched inside the error path,
/// so a retry starts from the pre-build id.
pub fn pin_to_commit(
  document: &SystemDocument,
  definition_id: &str,
  workspace_dir: &Path,
) -> Result<PinOutcome, RewriteError> {
  let definition = document
    .definition_by_id(definition_id)
    .ok_or_else(|| RewriteError::DefinitionNotFound(definition_id.to_string()))?;
  let url = definition
    .specific
    .get("repositoryUrl")
    .and_then(Value::as_str)
    .ok_or_else(|| RewriteError::MissingField {
      definition: definition_id.to_string(),
      field: "repositoryUrl".to_string(),
    })?;

  let (_checkout, commit) = sync_source(&definition.name, url, workspace_dir)?;
  let document = apply_commit_pin(document, definition_id, &commit)?;
  info!(definition = definition_id, %commit, "pinned definition to source commit");
  Ok(PinOutcome { document, commit })
}

/// Pin `definition_id` to `commit` without touching the network.
///
/// The new id is `<base>$<commit>` where `<base>` strips any previous pin
/// suffix, so re-pinning to the same commit is a no-op in effect.
pub fn apply_commit_pin(
  document: &SystemDocument,
  definition_id: &str,
  commit: &str,
) -> Result<SystemDocument, RewriteError> {
  let new_id = format!("{}${commit}", base_id(definition_id));
  let mut next = rename_definition(document, definition_id, &new_id, |instance| {
    Some(format!("{}${commit}", base_id(&instance.id)))
  })?;

  if let Some(definition) = next.definition_by_id_mut(&new_id)
    && let Value::Object(specific) = &mut definition.specific
  {
    specific.insert("commit".to_string(), Value::String(commit.to_string()));
  }
  Ok(next)
}

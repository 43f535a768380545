//! Image-tagging: bake a normalized docker image tag into a definition's
//! identity.

use serde_json::Value;
use tracing::debug;

use crate::document::SystemDocument;

use super::{RewriteError, base_id, rename_definition};

/// Normalize the definition's declared image to carry an explicit tag
/// (`:latest` when absent) and rename the definition to `<base>$<tag>`.
///
/// The tag is sanitized for id-safety: `:` becomes `_` and `/` becomes `.`.
pub fn pin_to_image_tag(
  document: &SystemDocument,
  definition_id: &str,
) -> Result<SystemDocument, RewriteError> {
  let definition = document
    .definition_by_id(definition_id)
    .ok_or_else(|| RewriteError::DefinitionNotFound(definition_id.to_string()))?;
  let image = definition
    .specific
    .get("image")
    .and_then(Value::as_str)
    .ok_or_else(|| RewriteError::MissingField {
      definition: definition_id.to_string(),
      field: "image".to_string(),
    })?;

  let normalized = normalize_image(image);
  let suffix = sanitize(&normalized);
  let new_id = format!("{}${suffix}", base_id(definition_id));
  debug!(definition = definition_id, image = %normalized, new_id = %new_id, "tagging image");

  let mut next = rename_definition(document, definition_id, &new_id, |instance| {
    Some(format!("{}${suffix}", base_id(&instance.id)))
  })?;

  if let Some(definition) = next.definition_by_id_mut(&new_id)
    && let Value::Object(specific) = &mut definition.specific
  {
    specific.insert("image".to_string(), Value::String(normalized));
  }
  Ok(next)
}

/// Append `:latest` when the image name carries no tag. The tag separator
/// is a `:` after the last `/`, so registry ports are not mistaken for
/// tags.
fn normalize_image(image: &str) -> String {
  let after_slash = image.rfind('/').map_or(image, |i| &image[i + 1..]);
  if after_slash.contains(':') {
    image.to_string()
  } else {
    format!("{image}:latest")
  }
}

fn sanitize(image: &str) -> String {
  image.replace(':', "_").replace('/', ".")
}

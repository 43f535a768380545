//! Implementation of the `convoy status` command.
//!
//! Shows the deployment pointer of every environment of one system.

use anyhow::{Context, Result};

use convoy_lib::{Config, EDITS, RevisionLog, SystemRegistry};

use crate::output::{print_info, print_json, print_stat, truncate_hash};

pub fn cmd_status(config: Config, system: &str, json: bool) -> Result<()> {
  let registry = SystemRegistry::open(config.clone()).context("Failed to open system registry")?;
  let system = registry.get(system)?;
  let revlog = RevisionLog::new(config);
  let targets = revlog
    .get_deployed_targets(&system)
    .with_context(|| format!("Failed to read pointers of {}", system.qualified_name()))?;

  if json {
    let items: Vec<_> = targets
      .iter()
      .map(|t| serde_json::json!({ "environment": t.env, "revision": t.revision }))
      .collect();
    return print_json(&items);
  }

  if targets.is_empty() {
    print_info("Nothing deployed.");
    return Ok(());
  }
  for target in &targets {
    let revision = if target.revision == EDITS {
      "uncommitted edits".to_string()
    } else {
      truncate_hash(&target.revision).to_string()
    };
    print_stat(&target.env, &revision);
  }
  Ok(())
}

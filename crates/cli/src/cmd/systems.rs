//! Implementation of the `convoy systems` command.

use anyhow::{Context, Result};

use convoy_lib::{Config, SystemRegistry};

use crate::output::{print_info, print_json, print_stat};

pub fn cmd_systems(config: Config, json: bool) -> Result<()> {
  let registry = SystemRegistry::open(config).context("Failed to open system registry")?;
  let systems = registry.list().context("Failed to list systems")?;

  if json {
    let items: Vec<_> = systems
      .iter()
      .map(|s| {
        serde_json::json!({
          "id": s.id,
          "namespace": s.namespace,
          "name": s.name,
          "repoPath": s.repo_path,
        })
      })
      .collect();
    return print_json(&items);
  }

  if systems.is_empty() {
    print_info("No systems registered. Run 'convoy init <namespace> <name>' to add one.");
    return Ok(());
  }
  for system in &systems {
    print_stat(&system.qualified_name(), &system.id);
  }
  Ok(())
}

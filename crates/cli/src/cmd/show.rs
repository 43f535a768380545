//! Implementation of the `convoy show` command.

use anyhow::{Context, Result};

use convoy_lib::{Config, RevisionLog, SystemRegistry};

use crate::output::print_json;

pub fn cmd_show(config: Config, system: &str, revision: &str, target: &str) -> Result<()> {
  let registry = SystemRegistry::open(config.clone()).context("Failed to open system registry")?;
  let system = registry.get(system)?;
  let revlog = RevisionLog::new(config);

  let resolved = revlog.find_revision(&system, revision)?;
  let document = revlog.get_revision(&system, &resolved, target)?;
  print_json(&document)
}

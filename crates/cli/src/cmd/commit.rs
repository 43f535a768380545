//! Implementation of the `convoy commit` command.

use anyhow::{Context, Result};

use convoy_lib::{Config, RevisionLog, SystemRegistry};

use crate::output::{print_success, truncate_hash};

pub fn cmd_commit(config: Config, system: &str, message: &str) -> Result<()> {
  let registry = SystemRegistry::open(config.clone()).context("Failed to open system registry")?;
  let system = registry.get(system)?;

  let revlog = RevisionLog::new(config);
  let author = revlog.author().clone();
  let revision = revlog
    .commit_revision(&system, message, &author)
    .with_context(|| format!("Failed to commit revision of {}", system.qualified_name()))?;

  print_success(&format!("Committed revision {}", truncate_hash(&revision)));
  Ok(())
}

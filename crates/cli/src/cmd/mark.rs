//! Implementation of the `convoy mark` command.

use anyhow::{Context, Result};

use convoy_lib::{Config, RevisionLog, SystemRegistry};

use crate::output::{print_success, truncate_hash};

pub fn cmd_mark(config: Config, system: &str, revision: &str, env: &str, user: &str) -> Result<()> {
  let registry = SystemRegistry::open(config.clone()).context("Failed to open system registry")?;
  let system = registry.get(system)?;
  let revlog = RevisionLog::new(config);

  let resolved = revlog.find_revision(&system, revision)?;
  revlog
    .mark_deployed_revision(user, &system, &resolved, env)
    .with_context(|| format!("Failed to mark {resolved} deployed to {env}"))?;

  print_success(&format!(
    "Marked {} deployed to {env}",
    truncate_hash(&resolved)
  ));
  Ok(())
}

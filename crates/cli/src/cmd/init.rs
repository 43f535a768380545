//! Implementation of the `convoy init` command.

use anyhow::{Context, Result};
use owo_colors::OwoColorize;

use convoy_lib::{Config, SystemRegistry};

use crate::output::symbols;

/// Register a new system and create its git repository.
pub fn cmd_init(config: Config, namespace: &str, name: &str) -> Result<()> {
  let registry = SystemRegistry::open(config).context("Failed to open system registry")?;
  let system = registry
    .create_system(namespace, name)
    .with_context(|| format!("Failed to register system {namespace}/{name}"))?;

  println!(
    "{} {}",
    symbols::SUCCESS.green(),
    format!("Registered system {}", system.qualified_name()).green().bold()
  );
  println!();
  println!("  {} Id:         {}", symbols::INFO.cyan(), system.id);
  println!(
    "  {} Repository: {}",
    symbols::INFO.cyan(),
    system.repo_path.display()
  );
  Ok(())
}

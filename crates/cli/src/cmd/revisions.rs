//! Implementation of the `convoy revisions` command.

use anyhow::{Context, Result};
use owo_colors::{OwoColorize, Stream};

use convoy_lib::{Config, EDITS, RevisionLog, SystemRegistry};

use crate::output::{print_info, print_json, symbols, truncate_hash};

pub fn cmd_revisions(config: Config, system: &str, json: bool) -> Result<()> {
  let registry = SystemRegistry::open(config.clone()).context("Failed to open system registry")?;
  let system = registry.get(system)?;
  let revlog = RevisionLog::new(config);
  let revisions = revlog
    .list_revisions(&system)
    .with_context(|| format!("Failed to list revisions of {}", system.qualified_name()))?;

  if json {
    let items: Vec<_> = revisions
      .iter()
      .map(|r| {
        serde_json::json!({
          "id": r.id,
          "author": r.author,
          "date": r.date,
          "message": r.message,
          "deployedTo": r.deployed_to,
        })
      })
      .collect();
    return print_json(&items);
  }

  if revisions.is_empty() {
    print_info("No revisions yet.");
    return Ok(());
  }
  for revision in &revisions {
    let id = if revision.id == EDITS {
      EDITS.to_string()
    } else {
      truncate_hash(&revision.id).to_string()
    };
    let date = revision
      .date
      .map(|d| d.format("%Y-%m-%d %H:%M").to_string())
      .unwrap_or_else(|| "-".repeat(16));
    let deployed = if revision.deployed_to.is_empty() {
      String::new()
    } else {
      format!(" {} {}", symbols::ARROW, revision.deployed_to.join(", "))
    };
    println!(
      "  {}  {}  {}{}",
      id.if_supports_color(Stream::Stdout, |s| s.yellow()),
      date.if_supports_color(Stream::Stdout, |s| s.dimmed()),
      revision.message,
      deployed.if_supports_color(Stream::Stdout, |s| s.green()),
    );
  }
  Ok(())
}

//! Runtime configuration passed explicitly to each component.
//!
//! There is no process-wide state: everything that needs the data directory
//! or commit authorship receives a [`Config`] at construction time.

use std::path::PathBuf;

/// Commit authorship used for repository writes.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Author {
  pub name: String,
  pub email: String,
}

impl Author {
  pub fn new(name: impl Into<String>, email: impl Into<String>) -> Self {
    Self {
      name: name.into(),
      email: email.into(),
    }
  }
}

/// Orchestrator configuration.
///
/// `data_dir` is the root under which the registry repository
/// (`{data_dir}/registry`) and the per-system repositories
/// (`{data_dir}/systems/{repo_name}`) live.
#[derive(Debug, Clone)]
pub struct Config {
  pub data_dir: PathBuf,
  pub author: Author,
}

impl Config {
  pub fn new(data_dir: impl Into<PathBuf>, author: Author) -> Self {
    Self {
      data_dir: data_dir.into(),
      author,
    }
  }
}

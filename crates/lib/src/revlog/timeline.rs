//! Append-only audit timeline, one JSON object per line.
//!
//! The timeline is best-effort: a failed write is logged and swallowed so
//! auditing never blocks the deploy path.

use std::fs::OpenOptions;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::warn;

const TIMELINE_FILE: &str = "timeline";
const TIMELINE_VERSION: u32 = 1;

/// One audit record.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TimelineEntry {
  pub v: u32,
  pub user: String,
  pub ts: DateTime<Utc>,
  #[serde(rename = "type")]
  pub kind: String,
  pub details: Value,
}

/// The per-system timeline file inside a system repository. The file is
/// excluded from commits (see the store's ignore rules).
pub struct Timeline {
  path: PathBuf,
}

impl Timeline {
  pub fn new(repo_path: &Path) -> Self {
    Self {
      path: repo_path.join(TIMELINE_FILE),
    }
  }

  /// Append an entry. Failures are swallowed with a warning.
  pub fn append(&self, user: &str, kind: &str, details: Value) {
    let entry = TimelineEntry {
      v: TIMELINE_VERSION,
      user: user.to_string(),
      ts: Utc::now(),
      kind: kind.to_string(),
      details,
    };
    if let Err(err) = self.try_append(&entry) {
      warn!(path = %self.path.display(), %err, "timeline write failed");
    }
  }

  fn try_append(&self, entry: &TimelineEntry) -> io::Result<()> {
    let mut file = OpenOptions::new()
      .create(true)
      .append(true)
      .open(&self.path)?;
    let line = serde_json::to_string(entry).map_err(io::Error::other)?;
    writeln!(file, "{line}")
  }

  /// All recorded entries, oldest first. A missing file is an empty
  /// timeline.
  pub fn read_all(&self) -> io::Result<Vec<TimelineEntry>> {
    let content = match std::fs::read_to_string(&self.path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
      Err(e) => return Err(e),
    };
    content
      .lines()
      .filter(|line| !line.trim().is_empty())
      .map(|line| serde_json::from_str(line).map_err(io::Error::other))
      .collect()
  }
}

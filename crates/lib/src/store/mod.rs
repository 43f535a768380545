//! Durable revision storage for system documents.
//!
//! [`RevisionStore`] is the narrow interface the rest of the engine talks
//! to: commit, tag, read-at-revision. The upper layers ([`crate::revlog`],
//! [`crate::registry`]) never touch git directly, so an alternative
//! content-addressed backend could be substituted without touching them.

mod git;

use std::path::Path;

use chrono::{DateTime, Utc};

use crate::config::Author;

pub use git::{GitRevisionStore, StoreError};

/// One entry of a repository's commit history.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitEntry {
  pub id: String,
  pub author: String,
  pub date: DateTime<Utc>,
  pub message: String,
}

/// Commit/tag/read-at-revision primitives over one repository.
///
/// Every operation takes the repository path explicitly: each system owns
/// its own repository, so commit ids are scoped per system and unrelated
/// systems never contend on the same index.
pub trait RevisionStore {
  /// Initialize a repository at `path` and create its initial commit.
  ///
  /// Fails with [`StoreError::RepoExists`] when the path already contains a
  /// repository.
  fn create_repository(&self, path: &Path, author: &Author) -> Result<String, StoreError>;

  /// Stage all working-tree changes and commit them.
  ///
  /// A clean tree is tolerated: the current head id is returned and no
  /// commit is created.
  fn commit(&self, path: &Path, message: &str, author: &Author) -> Result<String, StoreError>;

  /// Point `tag` at `commit_id`, replacing any previous target.
  fn tag(&self, path: &Path, tag: &str, commit_id: &str) -> Result<(), StoreError>;

  /// Remove `tag`. Removing a missing tag is a no-op, never an error.
  fn untag(&self, path: &Path, tag: &str) -> Result<(), StoreError>;

  /// Resolve `tag` to the commit it points at, or `None` if absent.
  fn resolve_tag(&self, path: &Path, tag: &str) -> Result<Option<String>, StoreError>;

  /// All `(tag name, commit id)` pairs whose name starts with `prefix`.
  fn list_tags(&self, path: &Path, prefix: &str) -> Result<Vec<(String, String)>, StoreError>;

  /// Read `file` as stored at `commit_id`.
  ///
  /// A file absent at that commit is [`StoreError::FileNotFound`], distinct
  /// from an unknown commit ([`StoreError::RevisionNotFound`]).
  fn read_file_at_revision(
    &self,
    path: &Path,
    commit_id: &str,
    file: &str,
  ) -> Result<Vec<u8>, StoreError>;

  /// Full history, newest first. Each call re-walks from the current head;
  /// no cursor state is retained.
  fn list_commits(&self, path: &Path) -> Result<Vec<CommitEntry>, StoreError>;

  /// Whether the working tree differs from the head commit.
  fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, StoreError>;
}

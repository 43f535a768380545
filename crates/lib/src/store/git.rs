//! git2-backed [`RevisionStore`] implementation.
//!
//! Each system repository is a plain (non-bare) git repository whose working
//! tree holds the system documents. A few paths are never committed:
//! `workspace/` (checked-out source repositories), `timeline` (the
//! append-only audit log) and the advisory lock file; all are excluded via
//! `.gitignore` written at repository creation.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use git2::{ErrorCode, IndexAddOption, ObjectType, Oid, Repository, Signature, Sort, StatusOptions};
use thiserror::Error;
use tracing::debug;

use crate::config::Author;

use super::{CommitEntry, RevisionStore};

/// Paths excluded from every commit.
const IGNORED_PATHS: &str = "workspace/\ntimeline\n.convoy.lock\n";

/// Errors from git-level storage operations.
#[derive(Debug, Error)]
pub enum StoreError {
  /// `create_repository` was asked to initialize an existing repository.
  #[error("a repository already exists at '{0}'")]
  RepoExists(PathBuf),

  #[error("failed to create repository at '{path}': {source}")]
  Create {
    path: PathBuf,
    #[source]
    source: git2::Error,
  },

  #[error("failed to open repository at '{path}': {source}")]
  Open {
    path: PathBuf,
    #[source]
    source: git2::Error,
  },

  #[error("commit failed in '{path}': {source}")]
  Commit {
    path: PathBuf,
    #[source]
    source: git2::Error,
  },

  #[error("tag operation on '{tag}' failed: {source}")]
  Tag {
    tag: String,
    #[source]
    source: git2::Error,
  },

  /// The named commit does not exist in this repository.
  #[error("revision '{0}' not found")]
  RevisionNotFound(String),

  /// The file does not exist at the given commit. Distinct from a git-level
  /// failure: the revision itself is fine.
  #[error("file '{file}' does not exist at revision '{revision}'")]
  FileNotFound { file: String, revision: String },

  #[error("git operation failed: {0}")]
  Git(#[from] git2::Error),

  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// The git-backed store. Stateless; every call opens the repository fresh.
#[derive(Debug, Default, Clone)]
pub struct GitRevisionStore;

impl GitRevisionStore {
  pub fn new() -> Self {
    Self
  }

  fn open(path: &Path) -> Result<Repository, StoreError> {
    Repository::open(path).map_err(|source| StoreError::Open {
      path: path.to_path_buf(),
      source,
    })
  }
}

impl RevisionStore for GitRevisionStore {
  fn create_repository(&self, path: &Path, author: &Author) -> Result<String, StoreError> {
    if path.join(".git").exists() {
      return Err(StoreError::RepoExists(path.to_path_buf()));
    }
    fs::create_dir_all(path)?;
    Repository::init(path).map_err(|source| StoreError::Create {
      path: path.to_path_buf(),
      source,
    })?;
    fs::write(path.join(".gitignore"), IGNORED_PATHS)?;

    debug!(path = %path.display(), "initialized repository");
    self.commit(path, "Created system repository", author)
  }

  fn commit(&self, path: &Path, message: &str, author: &Author) -> Result<String, StoreError> {
    let repo = Self::open(path)?;
    let commit_err = |source: git2::Error| StoreError::Commit {
      path: path.to_path_buf(),
      source,
    };

    let mut index = repo.index().map_err(commit_err)?;
    index
      .add_all(["*"], IndexAddOption::DEFAULT, None)
      .map_err(commit_err)?;
    index.update_all(["*"], None).map_err(commit_err)?;
    index.write().map_err(commit_err)?;
    let tree_id = index.write_tree().map_err(commit_err)?;

    let head = match repo.head() {
      Ok(reference) => reference.target(),
      Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => None,
      Err(e) => return Err(commit_err(e)),
    };
    let parent = match head {
      Some(oid) => Some(repo.find_commit(oid).map_err(commit_err)?),
      None => None,
    };

    // Nothing to commit: keep the current head instead of an empty commit.
    if let Some(parent) = &parent
      && parent.tree_id() == tree_id
    {
      return Ok(parent.id().to_string());
    }

    let tree = repo.find_tree(tree_id).map_err(commit_err)?;
    let signature = Signature::now(&author.name, &author.email).map_err(commit_err)?;
    let parents: Vec<_> = parent.iter().collect();
    let oid = repo
      .commit(Some("HEAD"), &signature, &signature, message, &tree, &parents)
      .map_err(commit_err)?;

    debug!(path = %path.display(), commit = %oid, "created commit");
    Ok(oid.to_string())
  }

  fn tag(&self, path: &Path, tag: &str, commit_id: &str) -> Result<(), StoreError> {
    let repo = Self::open(path)?;
    let oid =
      Oid::from_str(commit_id).map_err(|_| StoreError::RevisionNotFound(commit_id.to_string()))?;
    let object = repo
      .find_object(oid, Some(ObjectType::Commit))
      .map_err(|e| match e.code() {
        ErrorCode::NotFound => StoreError::RevisionNotFound(commit_id.to_string()),
        _ => StoreError::Tag {
          tag: tag.to_string(),
          source: e,
        },
      })?;
    repo
      .tag_lightweight(tag, &object, true)
      .map_err(|source| StoreError::Tag {
        tag: tag.to_string(),
        source,
      })?;
    Ok(())
  }

  fn untag(&self, path: &Path, tag: &str) -> Result<(), StoreError> {
    let repo = Self::open(path)?;
    match repo.tag_delete(tag) {
      Ok(()) => Ok(()),
      Err(e) if e.code() == ErrorCode::NotFound => Ok(()),
      Err(source) => Err(StoreError::Tag {
        tag: tag.to_string(),
        source,
      }),
    }
  }

  fn resolve_tag(&self, path: &Path, tag: &str) -> Result<Option<String>, StoreError> {
    let repo = Self::open(path)?;
    match repo.find_reference(&format!("refs/tags/{tag}")) {
      Ok(reference) => {
        let commit = reference.peel_to_commit().map_err(|source| StoreError::Tag {
          tag: tag.to_string(),
          source,
        })?;
        Ok(Some(commit.id().to_string()))
      }
      Err(e) if e.code() == ErrorCode::NotFound => Ok(None),
      Err(source) => Err(StoreError::Tag {
        tag: tag.to_string(),
        source,
      }),
    }
  }

  fn list_tags(&self, path: &Path, prefix: &str) -> Result<Vec<(String, String)>, StoreError> {
    let repo = Self::open(path)?;
    let names = repo.tag_names(Some(&format!("{prefix}*")))?;
    let mut tags = Vec::new();
    for name in names.iter().flatten() {
      let reference = repo.find_reference(&format!("refs/tags/{name}"))?;
      let commit = reference.peel_to_commit().map_err(|source| StoreError::Tag {
        tag: name.to_string(),
        source,
      })?;
      tags.push((name.to_string(), commit.id().to_string()));
    }
    Ok(tags)
  }

  fn read_file_at_revision(
    &self,
    path: &Path,
    commit_id: &str,
    file: &str,
  ) -> Result<Vec<u8>, StoreError> {
    let repo = Self::open(path)?;
    let oid =
      Oid::from_str(commit_id).map_err(|_| StoreError::RevisionNotFound(commit_id.to_string()))?;
    let commit = repo
      .find_commit(oid)
      .map_err(|_| StoreError::RevisionNotFound(commit_id.to_string()))?;
    let tree = commit.tree()?;
    let entry = tree.get_path(Path::new(file)).map_err(|e| match e.code() {
      ErrorCode::NotFound => StoreError::FileNotFound {
        file: file.to_string(),
        revision: commit_id.to_string(),
      },
      _ => StoreError::Git(e),
    })?;
    let object = entry.to_object(&repo)?;
    let blob = object.peel_to_blob()?;
    Ok(blob.content().to_vec())
  }

  fn list_commits(&self, path: &Path) -> Result<Vec<CommitEntry>, StoreError> {
    let repo = Self::open(path)?;
    let mut walk = repo.revwalk()?;
    walk.set_sorting(Sort::TOPOLOGICAL | Sort::TIME)?;
    match walk.push_head() {
      Ok(()) => {}
      Err(e) if e.code() == ErrorCode::UnbornBranch || e.code() == ErrorCode::NotFound => {
        return Ok(Vec::new());
      }
      Err(e) => return Err(e.into()),
    }

    let mut entries = Vec::new();
    for oid in walk {
      let commit = repo.find_commit(oid?)?;
      let author = commit.author();
      entries.push(CommitEntry {
        id: commit.id().to_string(),
        author: author.name().unwrap_or("").to_string(),
        date: DateTime::from_timestamp(commit.time().seconds(), 0)
          .unwrap_or(DateTime::<Utc>::UNIX_EPOCH),
        message: commit.message().unwrap_or("").trim_end().to_string(),
      });
    }
    Ok(entries)
  }

  fn has_uncommitted_changes(&self, path: &Path) -> Result<bool, StoreError> {
    let repo = Self::open(path)?;
    let mut options = StatusOptions::new();
    options.include_untracked(true).recurse_untracked_dirs(true);
    let statuses = repo.statuses(Some(&mut options))?;
    Ok(!statuses.is_empty())
  }
}

//! The revision log: revision and deployment semantics over the store.
//!
//! Each environment of a system carries at most one pointer, realized as a
//! git tag: `deployed-<env>` when a committed revision is live, or
//! `edits-<env>` when the deployed state is the on-disk working file that
//! has not been committed yet. Setting one removes the other. The pointer
//! move is two separate tag operations, so a crash in between leaves an
//! environment with neither tag; readers treat that as "nothing deployed",
//! never as an error.
//!
//! The working tree can be newer than any commit; that state surfaces as
//! the [`EDITS`] pseudo-revision, listed ahead of the real head.

mod timeline;

use std::io;
use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde_json::json;
use thiserror::Error;
use tracing::{debug, info};

use crate::config::{Author, Config};
use crate::document::SystemDocument;
use crate::lock::{LockError, SystemLock};
use crate::registry::System;
use crate::store::{GitRevisionStore, RevisionStore, StoreError};

pub use timeline::{Timeline, TimelineEntry};

/// The pseudo-revision representing uncommitted on-disk changes.
pub const EDITS: &str = "EDITS";

const DEPLOYED_TAG_PREFIX: &str = "deployed-";
const EDITS_TAG_PREFIX: &str = "edits-";

fn deployed_tag(env: &str) -> String {
  format!("{DEPLOYED_TAG_PREFIX}{env}")
}

fn edits_tag(env: &str) -> String {
  format!("{EDITS_TAG_PREFIX}{env}")
}

/// One revision as listed by [`RevisionLog::list_revisions`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Revision {
  /// Commit id, or [`EDITS`].
  pub id: String,
  pub author: String,
  /// `None` for the synthetic [`EDITS`] entry.
  pub date: Option<DateTime<Utc>>,
  pub message: String,
  /// Environments whose deployment pointer references this revision.
  pub deployed_to: Vec<String>,
}

/// One environment's deployment pointer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployedTarget {
  pub env: String,
  /// Commit id, or [`EDITS`] when the environment runs uncommitted edits.
  pub revision: String,
}

#[derive(Debug, Error)]
pub enum RevlogError {
  #[error("revision '{0}' not found")]
  RevisionNotFound(String),

  /// The revision exists but was never compiled for this deploy target.
  #[error("target '{target}' was not compiled for revision '{revision}'")]
  TargetNotFound { target: String, revision: String },

  #[error("document for target '{target}' at revision '{revision}' is malformed: {source}")]
  InvalidDocument {
    target: String,
    revision: String,
    #[source]
    source: serde_json::Error,
  },

  #[error("nothing deployed to environment '{env}' of system '{system}'")]
  NothingDeployed { system: String, env: String },

  #[error("failed to read working document '{path}': {source}")]
  ReadWorking {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write working document '{path}': {source}")]
  WriteWorking {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error(transparent)]
  Store(#[from] StoreError),

  #[error(transparent)]
  Lock(#[from] LockError),
}

/// Revision/deployment operations for registered systems.
pub struct RevisionLog<S = GitRevisionStore> {
  store: S,
  config: Config,
}

impl RevisionLog<GitRevisionStore> {
  pub fn new(config: Config) -> Self {
    Self::with_store(GitRevisionStore::new(), config)
  }
}

impl<S: RevisionStore> RevisionLog<S> {
  pub fn with_store(store: S, config: Config) -> Self {
    Self { store, config }
  }

  /// The configured default commit author.
  pub fn author(&self) -> &Author {
    &self.config.author
  }

  /// Write a target's working document into the system's working tree.
  ///
  /// Until committed, the document is visible as the [`EDITS`]
  /// pseudo-revision.
  pub fn write_working_document(
    &self,
    system: &System,
    target: &str,
    document: &SystemDocument,
  ) -> Result<(), RevlogError> {
    let path = system.repo_path.join(format!("{target}.json"));
    let content = serde_json::to_string_pretty(document).map_err(|source| {
      RevlogError::InvalidDocument {
        target: target.to_string(),
        revision: EDITS.to_string(),
        source,
      }
    })?;
    std::fs::write(&path, content).map_err(|source| RevlogError::WriteWorking { path, source })?;
    Ok(())
  }

  /// Commit everything in the system's working tree as a new revision.
  pub fn commit_revision(
    &self,
    system: &System,
    description: &str,
    author: &Author,
  ) -> Result<String, RevlogError> {
    let _lock = SystemLock::acquire(&system.repo_path, "commit")?;
    let revision = self.store.commit(&system.repo_path, description, author)?;
    info!(system = %system.id, revision = %revision, "committed revision");
    Ok(revision)
  }

  /// All revisions, newest first, each annotated with the environments it
  /// is deployed to. A dirty working tree prepends a synthetic [`EDITS`]
  /// entry ahead of the real head.
  pub fn list_revisions(&self, system: &System) -> Result<Vec<Revision>, RevlogError> {
    let targets = self.get_deployed_targets(system)?;
    let mut revisions = Vec::new();

    if self.store.has_uncommitted_changes(&system.repo_path)? {
      revisions.push(Revision {
        id: EDITS.to_string(),
        author: String::new(),
        date: None,
        message: "uncommitted edits".to_string(),
        deployed_to: targets
          .iter()
          .filter(|t| t.revision == EDITS)
          .map(|t| t.env.clone())
          .collect(),
      });
    }

    for commit in self.store.list_commits(&system.repo_path)? {
      let deployed_to = targets
        .iter()
        .filter(|t| t.revision == commit.id)
        .map(|t| t.env.clone())
        .collect();
      revisions.push(Revision {
        id: commit.id,
        author: commit.author,
        date: Some(commit.date),
        message: commit.message,
        deployed_to,
      });
    }

    Ok(revisions)
  }

  /// Resolve a revision identifier: `head`/`latest`, [`EDITS`], a full
  /// commit id, or a case-insensitive prefix of one. An ambiguous prefix
  /// resolves to the first match in [`Self::list_revisions`] order.
  pub fn find_revision(&self, system: &System, identifier: &str) -> Result<String, RevlogError> {
    let revisions = self.list_revisions(system)?;

    if identifier.eq_ignore_ascii_case("head") || identifier.eq_ignore_ascii_case("latest") {
      return revisions
        .first()
        .map(|r| r.id.clone())
        .ok_or_else(|| RevlogError::RevisionNotFound(identifier.to_string()));
    }

    if identifier == EDITS {
      return if revisions.iter().any(|r| r.id == EDITS) {
        Ok(EDITS.to_string())
      } else {
        Err(RevlogError::RevisionNotFound(identifier.to_string()))
      };
    }

    let needle = identifier.to_ascii_lowercase();
    revisions
      .iter()
      .find(|r| r.id != EDITS && r.id.to_ascii_lowercase().starts_with(&needle))
      .map(|r| r.id.clone())
      .ok_or_else(|| RevlogError::RevisionNotFound(identifier.to_string()))
  }

  /// Load the document compiled for `target` at `revision_id`.
  ///
  /// [`EDITS`] reads the on-disk working file directly, bypassing history.
  pub fn get_revision(
    &self,
    system: &System,
    revision_id: &str,
    target: &str,
  ) -> Result<SystemDocument, RevlogError> {
    let file = format!("{target}.json");
    let bytes = if revision_id == EDITS {
      let path = system.repo_path.join(&file);
      std::fs::read(&path).map_err(|source| {
        if source.kind() == io::ErrorKind::NotFound {
          RevlogError::TargetNotFound {
            target: target.to_string(),
            revision: EDITS.to_string(),
          }
        } else {
          RevlogError::ReadWorking { path, source }
        }
      })?
    } else {
      self
        .store
        .read_file_at_revision(&system.repo_path, revision_id, &file)
        .map_err(|e| match e {
          StoreError::FileNotFound { .. } => RevlogError::TargetNotFound {
            target: target.to_string(),
            revision: revision_id.to_string(),
          },
          StoreError::RevisionNotFound(_) => {
            RevlogError::RevisionNotFound(revision_id.to_string())
          }
          e => RevlogError::Store(e),
        })?
    };

    serde_json::from_slice(&bytes).map_err(|source| RevlogError::InvalidDocument {
      target: target.to_string(),
      revision: revision_id.to_string(),
      source,
    })
  }

  /// Move an environment's deployment pointer to `revision_id`.
  ///
  /// The `deployed-<env>` and `edits-<env>` tags are mutually exclusive:
  /// setting one removes the other. For [`EDITS`], the edits tag is written
  /// at the current committed head so a later promotion stays traceable.
  /// Not transactional; see the module docs for the crash window.
  pub fn mark_deployed_revision(
    &self,
    user: &str,
    system: &System,
    revision_id: &str,
    env: &str,
  ) -> Result<(), RevlogError> {
    let _lock = SystemLock::acquire(&system.repo_path, "mark-deployed")?;

    if revision_id == EDITS {
      let head = self
        .store
        .list_commits(&system.repo_path)?
        .into_iter()
        .next()
        .ok_or_else(|| RevlogError::RevisionNotFound("head".to_string()))?;
      self.store.untag(&system.repo_path, &deployed_tag(env))?;
      self.store.tag(&system.repo_path, &edits_tag(env), &head.id)?;
    } else {
      self.store.untag(&system.repo_path, &edits_tag(env))?;
      self
        .store
        .tag(&system.repo_path, &deployed_tag(env), revision_id)?;
    }

    Timeline::new(&system.repo_path).append(
      user,
      "deploy",
      json!({ "revision": revision_id, "environment": env }),
    );
    info!(system = %system.id, env, revision = %revision_id, "moved deployment pointer");
    Ok(())
  }

  /// The document currently deployed to `env`, resolving the deployed tag
  /// first and falling back to uncommitted edits.
  pub fn get_deployed_revision(
    &self,
    system: &System,
    env: &str,
    target: &str,
  ) -> Result<SystemDocument, RevlogError> {
    if let Some(commit) = self.store.resolve_tag(&system.repo_path, &deployed_tag(env))? {
      debug!(system = %system.id, env, revision = %commit, "resolved deployed revision");
      return self.get_revision(system, &commit, target);
    }
    if self
      .store
      .resolve_tag(&system.repo_path, &edits_tag(env))?
      .is_some()
    {
      debug!(system = %system.id, env, "environment runs uncommitted edits");
      return self.get_revision(system, EDITS, target);
    }
    Err(RevlogError::NothingDeployed {
      system: system.id.clone(),
      env: env.to_string(),
    })
  }

  /// Every environment with a deployment pointer, in environment order.
  pub fn get_deployed_targets(&self, system: &System) -> Result<Vec<DeployedTarget>, RevlogError> {
    let mut targets = Vec::new();
    for (name, commit) in self.store.list_tags(&system.repo_path, DEPLOYED_TAG_PREFIX)? {
      targets.push(DeployedTarget {
        env: name[DEPLOYED_TAG_PREFIX.len()..].to_string(),
        revision: commit,
      });
    }
    for (name, _) in self.store.list_tags(&system.repo_path, EDITS_TAG_PREFIX)? {
      targets.push(DeployedTarget {
        env: name[EDITS_TAG_PREFIX.len()..].to_string(),
        revision: EDITS.to_string(),
      });
    }
    targets.sort_by(|a, b| a.env.cmp(&b.env));
    Ok(targets)
  }

  /// Append an audit entry to the system's timeline. Best-effort.
  pub fn write_timeline(&self, user: &str, system: &System, kind: &str, details: serde_json::Value) {
    Timeline::new(&system.repo_path).append(user, kind, details);
  }
}

#[cfg(test)]
mod tests {
  use tempfile::TempDir;

  use crate::config::Config;
  use crate::document::SystemDocument;

  use super::*;

  fn author() -> Author {
    Author::new("tester", "tester@example.com")
  }

  fn temp_system() -> (TempDir, RevisionLog, System) {
    let temp = TempDir::new().unwrap();
    let config = Config::new(temp.path(), author());
    let system = System {
      id: "sys1".to_string(),
      name: "test".to_string(),
      namespace: "test".to_string(),
      repo_name: "test-test".to_string(),
      repo_path: temp.path().join("systems/test-test"),
    };
    let revlog = RevisionLog::new(config);
    GitRevisionStore::new()
      .create_repository(&system.repo_path, &author())
      .unwrap();
    (temp, revlog, system)
  }

  fn sample_document(name: &str) -> SystemDocument {
    serde_json::from_value(serde_json::json!({
      "name": name,
      "containerDefinitions": [{
        "id": "api",
        "name": "api",
        "type": "docker",
        "version": "0.1.0",
        "specific": { "image": "registry/api" }
      }],
      "topology": {
        "api-0": {
          "id": "api-0",
          "containerDefinitionId": "api",
          "containedBy": "api-0"
        }
      }
    }))
    .unwrap()
  }

  #[test]
  fn edits_listed_before_commits() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();

    let revisions = revlog.list_revisions(&system).unwrap();
    assert_eq!(revisions[0].id, EDITS);
    assert!(revisions[0].date.is_none());
    assert_eq!(revisions.len(), 2); // EDITS + initial commit

    revlog
      .commit_revision(&system, "first real revision", &author())
      .unwrap();
    let revisions = revlog.list_revisions(&system).unwrap();
    assert!(revisions.iter().all(|r| r.id != EDITS));
    assert_eq!(revisions[0].message, "first real revision");
  }

  #[test]
  fn find_revision_by_alias_and_prefix() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    let revision = revlog
      .commit_revision(&system, "first", &author())
      .unwrap();

    assert_eq!(revlog.find_revision(&system, "head").unwrap(), revision);
    assert_eq!(revlog.find_revision(&system, "LATEST").unwrap(), revision);
    assert_eq!(
      revlog.find_revision(&system, &revision[..10]).unwrap(),
      revision
    );
    // Case-insensitive prefix.
    assert_eq!(
      revlog
        .find_revision(&system, &revision[..10].to_uppercase())
        .unwrap(),
      revision
    );
  }

  #[test]
  fn find_revision_unknown_fails_and_ambiguous_takes_first() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    let head = revlog.commit_revision(&system, "first", &author()).unwrap();

    assert!(matches!(
      revlog.find_revision(&system, "zzzzzzzz"),
      Err(RevlogError::RevisionNotFound(_))
    ));
    // The empty prefix matches every commit (initial + first); the newest
    // one wins.
    assert_eq!(revlog.find_revision(&system, "").unwrap(), head);
    assert!(matches!(
      revlog.find_revision(&system, EDITS),
      Err(RevlogError::RevisionNotFound(_))
    ));
  }

  #[test]
  fn head_resolves_to_edits_when_dirty() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    assert_eq!(revlog.find_revision(&system, "head").unwrap(), EDITS);
    assert_eq!(revlog.find_revision(&system, EDITS).unwrap(), EDITS);
  }

  #[test]
  fn get_revision_reads_edits_from_disk() {
    let (_temp, revlog, system) = temp_system();
    let doc = sample_document("test");
    revlog
      .write_working_document(&system, "development", &doc)
      .unwrap();

    let loaded = revlog.get_revision(&system, EDITS, "development").unwrap();
    assert_eq!(loaded, doc);
  }

  #[test]
  fn get_revision_distinguishes_missing_target_from_missing_revision() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    let revision = revlog.commit_revision(&system, "first", &author()).unwrap();

    assert!(matches!(
      revlog.get_revision(&system, &revision, "production"),
      Err(RevlogError::TargetNotFound { .. })
    ));
    assert!(matches!(
      revlog.get_revision(&system, &"b".repeat(40), "development"),
      Err(RevlogError::RevisionNotFound(_))
    ));
  }

  #[test]
  fn get_revision_rejects_malformed_document() {
    let (_temp, revlog, system) = temp_system();
    std::fs::write(system.repo_path.join("development.json"), "not json").unwrap();
    let revision = revlog.commit_revision(&system, "bad doc", &author()).unwrap();

    assert!(matches!(
      revlog.get_revision(&system, &revision, "development"),
      Err(RevlogError::InvalidDocument { .. })
    ));
  }

  #[test]
  fn deployment_pointer_roundtrip() {
    let (_temp, revlog, system) = temp_system();
    let doc = sample_document("test");
    revlog
      .write_working_document(&system, "development", &doc)
      .unwrap();
    let revision = revlog.commit_revision(&system, "first", &author()).unwrap();

    assert!(matches!(
      revlog.get_deployed_revision(&system, "development", "development"),
      Err(RevlogError::NothingDeployed { .. })
    ));

    revlog
      .mark_deployed_revision("alice", &system, &revision, "development")
      .unwrap();
    let deployed = revlog
      .get_deployed_revision(&system, "development", "development")
      .unwrap();
    assert_eq!(deployed, doc);

    let targets = revlog.get_deployed_targets(&system).unwrap();
    assert_eq!(
      targets,
      vec![DeployedTarget {
        env: "development".to_string(),
        revision: revision.clone(),
      }]
    );

    let revisions = revlog.list_revisions(&system).unwrap();
    assert_eq!(revisions[0].deployed_to, vec!["development".to_string()]);
  }

  #[test]
  fn tag_exclusivity_per_environment() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    let revision = revlog.commit_revision(&system, "first", &author()).unwrap();

    let store = GitRevisionStore::new();
    // Alternate between committed and edits pointers; at most one tag may
    // exist for the environment after every step.
    for step in 0..4 {
      if step % 2 == 0 {
        revlog
          .mark_deployed_revision("alice", &system, &revision, "development")
          .unwrap();
      } else {
        revlog
          .mark_deployed_revision("alice", &system, EDITS, "development")
          .unwrap();
      }
      let deployed = store
        .resolve_tag(&system.repo_path, "deployed-development")
        .unwrap();
      let edits = store
        .resolve_tag(&system.repo_path, "edits-development")
        .unwrap();
      assert!(
        deployed.is_none() || edits.is_none(),
        "both tags present after step {step}"
      );
    }
  }

  #[test]
  fn edits_pointer_resolves_working_document() {
    let (_temp, revlog, system) = temp_system();
    let doc = sample_document("test");
    revlog
      .write_working_document(&system, "development", &doc)
      .unwrap();
    revlog.commit_revision(&system, "first", &author()).unwrap();

    // New uncommitted edits on top of the commit.
    let mut edited = doc.clone();
    edited.name = "test-edited".to_string();
    revlog
      .write_working_document(&system, "development", &edited)
      .unwrap();

    revlog
      .mark_deployed_revision("alice", &system, EDITS, "development")
      .unwrap();
    let deployed = revlog
      .get_deployed_revision(&system, "development", "development")
      .unwrap();
    assert_eq!(deployed, edited);

    let targets = revlog.get_deployed_targets(&system).unwrap();
    assert_eq!(targets[0].revision, EDITS);
  }

  #[test]
  fn mark_deployed_writes_timeline_entry() {
    let (_temp, revlog, system) = temp_system();
    revlog
      .write_working_document(&system, "development", &sample_document("test"))
      .unwrap();
    let revision = revlog.commit_revision(&system, "first", &author()).unwrap();
    revlog
      .mark_deployed_revision("alice", &system, &revision, "development")
      .unwrap();

    let entries = Timeline::new(&system.repo_path).read_all().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].user, "alice");
    assert_eq!(entries[0].kind, "deploy");
    assert_eq!(entries[0].details["environment"], "development");
  }
}

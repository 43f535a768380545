//! The system registry: stable ids and names mapped to repository paths.
//!
//! The registry is a single JSON object keyed by system id, stored as
//! `systems.json` inside its own git repository (`{data_dir}/registry`) so
//! that every registration is itself auditable history. Per-system
//! repositories are created under `{data_dir}/systems/{namespace}-{name}`.

use std::collections::BTreeMap;
use std::fs;
use std::io;
use std::path::PathBuf;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::info;

use crate::config::Config;
use crate::store::{GitRevisionStore, RevisionStore, StoreError};

const REGISTRY_DIR: &str = "registry";
const REGISTRY_FILE: &str = "systems.json";
const SYSTEMS_DIR: &str = "systems";

/// A registered system. Created once; the repository is never renamed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct System {
  pub id: String,
  pub name: String,
  pub namespace: String,
  pub repo_name: String,
  pub repo_path: PathBuf,
}

impl System {
  /// The `namespace/name` form used in user-facing identifiers.
  pub fn qualified_name(&self) -> String {
    format!("{}/{}", self.namespace, self.name)
  }
}

/// On-disk registry entry.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RegistryEntry {
  name: String,
  namespace: String,
  repo_name: String,
  repo_path: PathBuf,
}

#[derive(Debug, Error)]
pub enum RegistryError {
  #[error("system '{0}' not found in registry")]
  SystemNotFound(String),

  #[error("system '{namespace}/{name}' is already registered")]
  AlreadyExists { namespace: String, name: String },

  #[error("failed to read registry file '{path}': {source}")]
  Read {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("failed to write registry file '{path}': {source}")]
  Write {
    path: PathBuf,
    #[source]
    source: io::Error,
  },

  #[error("registry file is malformed: {0}")]
  Parse(#[source] serde_json::Error),

  #[error(transparent)]
  Store(#[from] StoreError),
}

/// Registry over a revision store backend.
pub struct SystemRegistry<S = GitRevisionStore> {
  store: S,
  config: Config,
}

impl SystemRegistry<GitRevisionStore> {
  /// Open the registry at `config.data_dir`, creating its repository on
  /// first use.
  pub fn open(config: Config) -> Result<Self, RegistryError> {
    Self::open_with_store(GitRevisionStore::new(), config)
  }
}

impl<S: RevisionStore> SystemRegistry<S> {
  pub fn open_with_store(store: S, config: Config) -> Result<Self, RegistryError> {
    let registry = Self { store, config };
    let path = registry.registry_path();
    if !path.join(".git").exists() {
      registry
        .store
        .create_repository(&path, &registry.config.author)?;
      info!(path = %path.display(), "created registry repository");
    }
    Ok(registry)
  }

  fn registry_path(&self) -> PathBuf {
    self.config.data_dir.join(REGISTRY_DIR)
  }

  fn registry_file(&self) -> PathBuf {
    self.registry_path().join(REGISTRY_FILE)
  }

  /// Register a new system and create its repository.
  pub fn create_system(&self, namespace: &str, name: &str) -> Result<System, RegistryError> {
    let mut entries = self.load()?;
    if entries
      .values()
      .any(|e| e.namespace == namespace && e.name == name)
    {
      return Err(RegistryError::AlreadyExists {
        namespace: namespace.to_string(),
        name: name.to_string(),
      });
    }

    let id = mint_system_id(&entries);
    let repo_name = format!("{namespace}-{name}");
    let repo_path = self.config.data_dir.join(SYSTEMS_DIR).join(&repo_name);
    self
      .store
      .create_repository(&repo_path, &self.config.author)?;

    entries.insert(
      id.clone(),
      RegistryEntry {
        name: name.to_string(),
        namespace: namespace.to_string(),
        repo_name: repo_name.clone(),
        repo_path: repo_path.clone(),
      },
    );
    self.save(&entries)?;
    self.store.commit(
      &self.registry_path(),
      &format!("Registered system {namespace}/{name}"),
      &self.config.author,
    )?;

    info!(system = %id, repo = %repo_path.display(), "registered system");
    Ok(System {
      id,
      name: name.to_string(),
      namespace: namespace.to_string(),
      repo_name,
      repo_path,
    })
  }

  /// Look a system up by id or by its `namespace/name` form.
  pub fn get(&self, identifier: &str) -> Result<System, RegistryError> {
    let entries = self.load()?;
    if let Some(entry) = entries.get(identifier) {
      return Ok(to_system(identifier, entry));
    }
    if let Some((namespace, name)) = identifier.split_once('/')
      && let Some((id, entry)) = entries
        .iter()
        .find(|(_, e)| e.namespace == namespace && e.name == name)
    {
      return Ok(to_system(id, entry));
    }
    Err(RegistryError::SystemNotFound(identifier.to_string()))
  }

  /// All registered systems, ordered by `namespace/name`.
  pub fn list(&self) -> Result<Vec<System>, RegistryError> {
    let entries = self.load()?;
    let mut systems: Vec<System> = entries
      .iter()
      .map(|(id, entry)| to_system(id, entry))
      .collect();
    systems.sort_by(|a, b| a.qualified_name().cmp(&b.qualified_name()));
    Ok(systems)
  }

  fn load(&self) -> Result<BTreeMap<String, RegistryEntry>, RegistryError> {
    let path = self.registry_file();
    let content = match fs::read_to_string(&path) {
      Ok(content) => content,
      Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
      Err(source) => return Err(RegistryError::Read { path, source }),
    };
    serde_json::from_str(&content).map_err(RegistryError::Parse)
  }

  /// Atomic write (temp file, then rename) to prevent a torn registry.
  fn save(&self, entries: &BTreeMap<String, RegistryEntry>) -> Result<(), RegistryError> {
    let path = self.registry_file();
    let temp_path = self.registry_path().join(format!("{REGISTRY_FILE}.tmp"));
    let content = serde_json::to_string_pretty(entries).map_err(RegistryError::Parse)?;
    fs::write(&temp_path, &content).map_err(|source| RegistryError::Write {
      path: temp_path.clone(),
      source,
    })?;
    fs::rename(&temp_path, &path).map_err(|source| RegistryError::Write { path, source })?;
    Ok(())
  }
}

fn to_system(id: &str, entry: &RegistryEntry) -> System {
  System {
    id: id.to_string(),
    name: entry.name.clone(),
    namespace: entry.namespace.clone(),
    repo_name: entry.repo_name.clone(),
    repo_path: entry.repo_path.clone(),
  }
}

/// Mint a new system id from the current time, bumped on collision so two
/// registrations in the same millisecond stay distinct.
fn mint_system_id(entries: &BTreeMap<String, RegistryEntry>) -> String {
  let base = Utc::now().timestamp_millis();
  let mut offset = 0;
  loop {
    let id = format!("{:x}", base + offset);
    if !entries.contains_key(&id) {
      return id;
    }
    offset += 1;
  }
}

//! The pre-deploy dependency gate.
//!
//! Container definitions may declare semantic-version constraints on sibling
//! definitions (`dependencies: {name: range}`). Before a deploy, every
//! constraint on a gated definition type is checked against the version of
//! the named definition in the same document. The full result set is
//! surfaced so an operator sees exactly which constraints failed, not just
//! a boolean.

use std::collections::BTreeSet;

use semver::{Version, VersionReq};
use thiserror::Error;
use tracing::debug;

use crate::document::SystemDocument;

/// Validation failure while evaluating constraints: the document itself is
/// bad, distinct from an unsatisfied (but well-formed) constraint.
#[derive(Debug, Error)]
pub enum GateError {
  #[error("definition '{definition}' declares dependency on unknown definition '{depends_on}'")]
  DependencyNotFound {
    definition: String,
    depends_on: String,
  },

  #[error("definition '{definition}' declares malformed range '{range}' for '{depends_on}': {source}")]
  InvalidRange {
    definition: String,
    depends_on: String,
    range: String,
    #[source]
    source: semver::Error,
  },

  #[error("definition '{definition}' carries malformed version '{version}': {source}")]
  InvalidVersion {
    definition: String,
    version: String,
    #[source]
    source: semver::Error,
  },
}

/// One evaluated constraint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateResult {
  /// Name of the definition declaring the constraint.
  pub definition: String,
  /// Name of the definition depended on.
  pub depends_on: String,
  pub range: String,
  pub satisfied: bool,
}

/// The aggregate gate verdict.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GateReport {
  pub ok: bool,
  pub results: Vec<GateResult>,
}

impl GateReport {
  /// The failing constraint tuples.
  pub fn failures(&self) -> impl Iterator<Item = &GateResult> {
    self.results.iter().filter(|r| !r.satisfied)
  }
}

/// Evaluates declared version constraints for definitions of gated types.
#[derive(Debug, Clone)]
pub struct DependencyGate {
  gated_types: BTreeSet<String>,
}

impl DependencyGate {
  pub fn new<I, T>(gated_types: I) -> Self
  where
    I: IntoIterator<Item = T>,
    T: Into<String>,
  {
    Self {
      gated_types: gated_types.into_iter().map(Into::into).collect(),
    }
  }

  /// Evaluate every constraint declared by gated definitions in `document`.
  pub fn check(&self, document: &SystemDocument) -> Result<GateReport, GateError> {
    let mut results = Vec::new();

    for definition in &document.container_definitions {
      if !self.gated_types.contains(&definition.container_type) {
        continue;
      }
      for (depends_on, range) in &definition.dependencies {
        let requirement =
          VersionReq::parse(range).map_err(|source| GateError::InvalidRange {
            definition: definition.name.clone(),
            depends_on: depends_on.clone(),
            range: range.clone(),
            source,
          })?;
        let dependency = document.definition_by_name(depends_on).ok_or_else(|| {
          GateError::DependencyNotFound {
            definition: definition.name.clone(),
            depends_on: depends_on.clone(),
          }
        })?;
        let version =
          Version::parse(&dependency.version).map_err(|source| GateError::InvalidVersion {
            definition: dependency.name.clone(),
            version: dependency.version.clone(),
            source,
          })?;

        let satisfied = requirement.matches(&version);
        debug!(
          definition = %definition.name,
          depends_on = %depends_on,
          range = %range,
          version = %dependency.version,
          satisfied,
          "evaluated dependency constraint"
        );
        results.push(GateResult {
          definition: definition.name.clone(),
          depends_on: depends_on.clone(),
          range: range.clone(),
          satisfied,
        });
      }
    }

    let ok = results.iter().all(|r| r.satisfied);
    Ok(GateReport { ok, results })
  }
}

#[cfg(test)]
mod tests {
  use std::collections::BTreeMap;

  use crate::document::ContainerDefinition;

  use super::*;

  fn definition(
    name: &str,
    container_type: &str,
    version: &str,
    dependencies: &[(&str, &str)],
  ) -> ContainerDefinition {
    ContainerDefinition {
      id: name.to_string(),
      name: name.to_string(),
      container_type: container_type.to_string(),
      version: version.to_string(),
      specific: serde_json::json!({}),
      dependencies: dependencies
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect::<BTreeMap<_, _>>(),
    }
  }

  fn document(definitions: Vec<ContainerDefinition>) -> SystemDocument {
    let mut doc = SystemDocument::empty("test");
    doc.container_definitions = definitions;
    doc
  }

  #[test]
  fn satisfied_constraint_passes() {
    let doc = document(vec![
      definition("a", "docker", "1.0.0", &[("b", "^1.0.0")]),
      definition("b", "docker", "1.2.0", &[]),
    ]);
    let report = DependencyGate::new(["docker"]).check(&doc).unwrap();
    assert!(report.ok);
    assert_eq!(report.results.len(), 1);
    assert!(report.results[0].satisfied);
  }

  #[test]
  fn unsatisfied_constraint_reports_failing_tuple() {
    let doc = document(vec![
      definition("a", "docker", "1.0.0", &[("b", "^1.0.0")]),
      definition("b", "docker", "2.0.0", &[]),
    ]);
    let report = DependencyGate::new(["docker"]).check(&doc).unwrap();
    assert!(!report.ok);

    let failures: Vec<_> = report.failures().collect();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].definition, "a");
    assert_eq!(failures[0].depends_on, "b");
    assert_eq!(failures[0].range, "^1.0.0");
  }

  #[test]
  fn non_gated_types_are_skipped() {
    let doc = document(vec![
      definition("lb", "loadbalancer", "1.0.0", &[("b", "^9.0.0")]),
      definition("b", "docker", "1.0.0", &[]),
    ]);
    let report = DependencyGate::new(["docker"]).check(&doc).unwrap();
    assert!(report.ok);
    assert!(report.results.is_empty());
  }

  #[test]
  fn unknown_dependency_is_a_validation_error() {
    let doc = document(vec![definition("a", "docker", "1.0.0", &[("ghost", "^1.0.0")])]);
    let result = DependencyGate::new(["docker"]).check(&doc);
    assert!(matches!(result, Err(GateError::DependencyNotFound { .. })));
  }

  #[test]
  fn malformed_range_and_version_are_validation_errors() {
    let doc = document(vec![
      definition("a", "docker", "1.0.0", &[("b", "not-a-range")]),
      definition("b", "docker", "1.0.0", &[]),
    ]);
    assert!(matches!(
      DependencyGate::new(["docker"]).check(&doc),
      Err(GateError::InvalidRange { .. })
    ));

    let doc = document(vec![
      definition("a", "docker", "1.0.0", &[("b", "^1.0.0")]),
      definition("b", "docker", "one-point-oh", &[]),
    ]);
    assert!(matches!(
      DependencyGate::new(["docker"]).check(&doc),
      Err(GateError::InvalidVersion { .. })
    ));
  }

  #[test]
  fn multiple_constraints_all_reported() {
    let doc = document(vec![
      definition("a", "docker", "1.0.0", &[("b", "^1.0.0"), ("c", ">=2.0.0")]),
      definition("b", "docker", "1.5.0", &[]),
      definition("c", "docker", "1.0.0", &[]),
    ]);
    let report = DependencyGate::new(["docker"]).check(&doc).unwrap();
    assert!(!report.ok);
    assert_eq!(report.results.len(), 2);
    assert_eq!(report.failures().count(), 1);
  }
}

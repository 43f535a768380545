//! Full lifecycle: register a system, commit revisions, deploy and promote.

use convoy_lib::document::validate;
use convoy_lib::plan::{Plan, PlanError, Step, StepCommand};
use convoy_lib::rewrite::{apply_commit_pin, pin_to_image_tag};
use convoy_lib::revlog::RevlogError;
use convoy_lib::{
  Author, Config, ContainerHandler, DependencyGate, DeployRequest, DeploymentExecutor,
  ExecuteMode, GitRevisionStore, HandlerRegistry, Planner, RevisionLog, RevisionStore,
  StepContext, StepOutcome, SystemDocument, SystemRegistry, run_deploy,
};
use tempfile::TempDir;

fn author() -> Author {
  Author::new("tester", "tester@example.com")
}

fn sample_document() -> SystemDocument {
  serde_json::from_value(serde_json::json!({
    "name": "test",
    "containerDefinitions": [{
      "id": "test",
      "name": "test",
      "type": "docker",
      "version": "0.1.0",
      "specific": { "image": "registry.example.com/test" }
    }],
    "topology": {
      "test-0": {
        "id": "test-0",
        "containerDefinitionId": "test",
        "containedBy": "test-0"
      }
    }
  }))
  .unwrap()
}

#[test]
fn deploy_then_promote_moves_the_pointer() {
  let temp = TempDir::new().unwrap();
  let config = Config::new(temp.path(), author());
  let registry = SystemRegistry::open(config.clone()).unwrap();
  let system = registry.create_system("test", "test").unwrap();
  let revlog = RevisionLog::new(config);

  // First revision: one docker definition.
  let doc = sample_document();
  revlog
    .write_working_document(&system, "development", &doc)
    .unwrap();
  let first = revlog
    .commit_revision(&system, "initial topology", &author())
    .unwrap();

  revlog
    .mark_deployed_revision("alice", &system, &first, "development")
    .unwrap();
  let deployed = revlog
    .get_deployed_revision(&system, "development", "development")
    .unwrap();
  assert_eq!(deployed, doc);

  // Second revision: empty topology; promote it.
  let empty = SystemDocument::empty("test");
  revlog
    .write_working_document(&system, "development", &empty)
    .unwrap();
  let second = revlog
    .commit_revision(&system, "tear down", &author())
    .unwrap();
  revlog
    .mark_deployed_revision("alice", &system, &second, "development")
    .unwrap();

  let deployed = revlog
    .get_deployed_revision(&system, "development", "development")
    .unwrap();
  assert_eq!(deployed, empty);

  // The pointer no longer references the first revision.
  let store = GitRevisionStore::new();
  let tag = store
    .resolve_tag(&system.repo_path, "deployed-development")
    .unwrap();
  assert_eq!(tag.as_deref(), Some(second.as_str()));
  assert_ne!(tag.as_deref(), Some(first.as_str()));

  let revisions = revlog.list_revisions(&system).unwrap();
  assert_eq!(revisions[0].id, second);
  assert_eq!(revisions[0].deployed_to, vec!["development".to_string()]);
  assert!(revisions.iter().all(|r| r.deployed_to.is_empty() || r.id == second));
}

struct CountingHandler;

impl ContainerHandler for CountingHandler {
  fn add(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
  fn start(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
  fn link(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
  fn unlink(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
  fn stop(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
  fn remove(&self, _: &mut StepContext<'_>) -> Result<StepOutcome, convoy_lib::deploy::HandlerError> {
    Ok(StepOutcome::unchanged())
  }
}

struct AddEverything;

impl Planner for AddEverything {
  fn plan(&self, current: &SystemDocument, target: &SystemDocument) -> Result<Plan, PlanError> {
    let steps = target
      .topology
      .keys()
      .filter(|id| !current.topology.contains_key(*id))
      .flat_map(|id| {
        [
          Step {
            id: id.clone(),
            cmd: StepCommand::Add,
            parent: None,
          },
          Step {
            id: id.clone(),
            cmd: StepCommand::Start,
            parent: None,
          },
        ]
      })
      .collect();
    Ok(Plan::new(steps))
  }
}

#[test]
fn build_pipeline_feeds_a_full_deploy() {
  let temp = TempDir::new().unwrap();
  let config = Config::new(temp.path(), author());
  let registry = SystemRegistry::open(config.clone()).unwrap();
  let system = registry.create_system("test", "test").unwrap();
  let revlog = RevisionLog::new(config);

  // Build: pin the definition to a source commit, then tag its image.
  let doc = sample_document();
  let pinned = apply_commit_pin(&doc, "test", "abc123").unwrap();
  let tagged = pin_to_image_tag(&pinned, "test$abc123").unwrap();
  validate(&tagged).unwrap();
  let definition = &tagged.container_definitions[0];
  assert_eq!(definition.id, "test$registry.example.com.test_latest");
  assert_eq!(definition.specific["commit"], "abc123");
  assert_eq!(definition.specific["image"], "registry.example.com/test:latest");

  revlog
    .write_working_document(&system, "development", &tagged)
    .unwrap();
  revlog
    .commit_revision(&system, "build output", &author())
    .unwrap();

  let mut handlers = HandlerRegistry::new();
  handlers.register("docker", Box::new(CountingHandler)).unwrap();
  let executor = DeploymentExecutor::new(handlers);

  let mut ticks = Vec::new();
  let request = DeployRequest {
    user: "alice",
    system: &system,
    identifier: "head",
    env: "development",
    mode: ExecuteMode::Live,
  };
  let final_doc = run_deploy(
    &revlog,
    &executor,
    &AddEverything,
    &DependencyGate::new(["docker"]),
    &request,
    &mut |p: u32| ticks.push(p),
  )
  .unwrap();

  assert_eq!(final_doc, tagged);
  assert_eq!(ticks, vec![50, 100]);

  let deployed = revlog
    .get_deployed_revision(&system, "development", "development")
    .unwrap();
  assert_eq!(deployed, tagged);
}

#[test]
fn edits_pseudo_revision_survives_the_full_cycle() {
  let temp = TempDir::new().unwrap();
  let config = Config::new(temp.path(), author());
  let registry = SystemRegistry::open(config.clone()).unwrap();
  let system = registry.create_system("test", "test").unwrap();
  let revlog = RevisionLog::new(config);

  let doc = sample_document();
  revlog
    .write_working_document(&system, "development", &doc)
    .unwrap();
  let first = revlog.commit_revision(&system, "first", &author()).unwrap();

  // Uncommitted edit on top; deploy the edits state.
  let mut edited = doc.clone();
  edited.name = "test-edited".to_string();
  revlog
    .write_working_document(&system, "development", &edited)
    .unwrap();

  let head = revlog.find_revision(&system, "head").unwrap();
  assert_eq!(head, convoy_lib::EDITS);
  revlog
    .mark_deployed_revision("alice", &system, &head, "development")
    .unwrap();
  assert_eq!(
    revlog
      .get_deployed_revision(&system, "development", "development")
      .unwrap(),
    edited
  );

  // Promote to a clean commit; the edits pointer disappears.
  let second = revlog
    .commit_revision(&system, "promote edits", &author())
    .unwrap();
  assert_ne!(second, first);
  revlog
    .mark_deployed_revision("alice", &system, &second, "development")
    .unwrap();

  let store = GitRevisionStore::new();
  assert!(store
    .resolve_tag(&system.repo_path, "edits-development")
    .unwrap()
    .is_none());
  assert_eq!(
    revlog
      .get_deployed_revision(&system, "development", "development")
      .unwrap(),
    edited
  );

  // A fresh listing is restartable and newest-first.
  let revisions = revlog.list_revisions(&system).unwrap();
  assert_eq!(revisions[0].id, second);
  assert!(matches!(
    revlog.find_revision(&system, "zzzzzzzz"),
    Err(RevlogError::RevisionNotFound(_))
  ));
}

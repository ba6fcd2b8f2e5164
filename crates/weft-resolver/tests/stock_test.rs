//! The units and orchestrators shipped with the repository must compose.

use std::path::PathBuf;

use weft_config::{EventKind, load_orchestrator};
use weft_resolver::{Resolver, StandardResolver};
use weft_unit_registry::{FsUnitRegistry, UnitRegistry};
use weft_workflow::{Trigger, Workflow};

fn repo_root() -> PathBuf {
  PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../..")
}

async fn compose(file: &str) -> Workflow {
  let def = load_orchestrator(&repo_root().join("workflows").join(file)).unwrap();
  StandardResolver::new(FsUnitRegistry::new(repo_root().join("units")))
    .resolve(def)
    .await
    .unwrap()
}

#[tokio::test]
async fn test_stock_units_load() {
  let registry = FsUnitRegistry::new(repo_root().join("units"));
  let names: Vec<String> = registry
    .list()
    .await
    .unwrap()
    .into_iter()
    .map(|u| u.name)
    .collect();
  assert_eq!(
    names,
    vec![
      "docker-build",
      "go-test",
      "k8s-deploy",
      "nodejs-test",
      "security-scan"
    ]
  );
}

#[tokio::test]
async fn test_ci_composes() {
  let workflow = compose("ci.yaml").await;
  assert_eq!(workflow.nodes.len(), 6);

  let build = workflow.get_node("build[service=users]").unwrap();
  assert_eq!(build.needs, vec!["scan", "test-api[service=users]"]);

  let pr = workflow
    .select(&Trigger::new(EventKind::PullRequest, "feature/login"))
    .unwrap();
  assert!(!pr.contains("test-web"));
  assert_eq!(pr.len(), 5);

  let release = workflow
    .select(&Trigger::new(EventKind::Push, "release/1.2"))
    .unwrap();
  assert_eq!(release.len(), 6);
  assert!(
    workflow
      .select(&Trigger::new(EventKind::Push, "feature/login"))
      .is_err()
  );
}

#[tokio::test]
async fn test_cd_composes() {
  let workflow = compose("cd.yaml").await;
  assert_eq!(
    workflow.topological_order().unwrap(),
    vec![
      "build[service=orders]",
      "build[service=users]",
      "deploy[service=orders]",
      "deploy[service=users]"
    ]
  );

  let deploy = workflow.get_node("deploy[service=users]").unwrap();
  assert_eq!(deploy.needs, vec!["build[service=users]"]);
  assert_eq!(deploy.downloads[0].artifact, "image-users");
  assert_eq!(deploy.timeout_ms, Some(600_000));
  assert_eq!(workflow.get_node("build[service=users]").unwrap().publishes[0].retention_days, 30);
}

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use tracing::debug;

use weft_artifact::ArtifactName;
use weft_config::{JobDef, OrchestratorDef, UnitDef};
use weft_unit_registry::UnitRegistry;
use weft_workflow::{JobNode, LockedDownload, LockedPublish, UnitContract, Workflow, node_id_for};

use crate::error::{ResolveError, Violation};
use crate::input::{coerce_value, environment, render_str, render_value};
use crate::matrix::{expand_matrix, matrix_agrees};

/// Retention applied when neither the publish step nor the orchestrator sets one.
pub const DEFAULT_RETENTION_DAYS: u32 = 90;

/// Resolver transforms an OrchestratorDef into a locked Workflow.
#[async_trait]
pub trait Resolver: Send + Sync {
  /// Compose an orchestrator definition into a locked workflow.
  ///
  /// This process:
  /// 1. Validates every job call against its unit contract
  /// 2. Expands matrices and renders inputs per instance
  /// 3. Resolves `needs` edges between instances and rejects cycles
  /// 4. Checks artifact ownership and ordering
  async fn resolve(&self, def: OrchestratorDef) -> Result<Workflow, ResolveError>;
}

/// Standard resolver implementation that uses a unit registry.
pub struct StandardResolver<R: UnitRegistry> {
  registry: R,
}

impl<R: UnitRegistry> StandardResolver<R> {
  /// Create a new resolver with the given unit registry.
  pub fn new(registry: R) -> Self {
    Self { registry }
  }

  /// Look up a unit in the registry.
  async fn lookup_unit(&self, job_id: &str, unit: &str) -> Result<UnitDef, ResolveError> {
    self
      .registry
      .get(unit)
      .await?
      .ok_or_else(|| ResolveError::UnitNotFound {
        job_id: job_id.to_string(),
        unit: unit.to_string(),
      })
  }

  /// Load and check the contract of every unit the orchestrator uses.
  async fn load_contracts(
    &self,
    def: &OrchestratorDef,
  ) -> Result<BTreeMap<String, UnitContract>, ResolveError> {
    let mut contracts = BTreeMap::new();
    for (job_id, job) in &def.jobs {
      if contracts.contains_key(&job.uses) {
        continue;
      }
      let unit = self.lookup_unit(job_id, &job.uses).await?;
      let contract = UnitContract::from(unit);
      validate_defaults(&contract)?;
      validate_publishes(&contract)?;
      contracts.insert(job.uses.clone(), contract);
    }
    Ok(contracts)
  }
}

#[async_trait]
impl<R: UnitRegistry> Resolver for StandardResolver<R> {
  async fn resolve(&self, def: OrchestratorDef) -> Result<Workflow, ResolveError> {
    if def.jobs.is_empty() {
      return Err(ResolveError::NoJobs { name: def.name });
    }

    validate_job_ids(&def)?;
    validate_needs(&def)?;
    let contracts = self.load_contracts(&def).await?;

    for (job_id, job) in &def.jobs {
      check_contract(&def, job_id, job, &contracts[&job.uses])?;
    }

    // Expansion happens before edge resolution so every instance inherits
    // its template's edges.
    let mut nodes = BTreeMap::new();
    for (job_id, job) in &def.jobs {
      for node in expand_job(&def, job_id, job, &contracts[&job.uses])? {
        if let Some(previous) = nodes.insert(node.node_id.clone(), node) {
          return Err(ResolveError::DuplicateNode {
            node_id: previous.node_id,
          });
        }
      }
    }

    let edges = link_needs(&def, &mut nodes)?;
    detect_cycle(&nodes)?;

    for trigger in &def.triggers {
      for job_id in &trigger.jobs {
        if !def.jobs.contains_key(job_id) {
          return Err(ResolveError::UnknownTriggerJob(job_id.clone()));
        }
      }
    }

    let workflow = Workflow {
      workflow_id: def.name.clone(),
      name: def.name,
      contracts,
      nodes,
      edges,
      triggers: def.triggers,
      timeout_ms: def.timeout_ms,
      retention_days: def.retention_days,
    };

    check_artifacts(&workflow)?;

    debug!(
      workflow_id = %workflow.workflow_id,
      nodes = workflow.nodes.len(),
      edges = workflow.edges.len(),
      "workflow composed"
    );

    Ok(workflow)
  }
}

/// Job ids must not be mistaken for matrix instance ids.
fn validate_job_ids(def: &OrchestratorDef) -> Result<(), ResolveError> {
  for job_id in def.jobs.keys() {
    if job_id.contains(['[', ']', '=', ',']) {
      return Err(ResolveError::InvalidJobId {
        job_id: job_id.clone(),
      });
    }
  }
  Ok(())
}

/// Every `needs` entry must name another job.
fn validate_needs(def: &OrchestratorDef) -> Result<(), ResolveError> {
  for (job_id, job) in &def.jobs {
    for needs in &job.needs {
      if !def.jobs.contains_key(needs) {
        return Err(ResolveError::InvalidNeeds {
          job_id: job_id.clone(),
          needs: needs.clone(),
        });
      }
    }
  }
  Ok(())
}

/// Defaults must already be of the declared type.
fn validate_defaults(contract: &UnitContract) -> Result<(), ResolveError> {
  for (input, spec) in &contract.inputs {
    if let Some(default) = &spec.default {
      coerce_value(default, spec.input_type).map_err(|message| ResolveError::InvalidDefault {
        unit: contract.name.clone(),
        input: input.clone(),
        message,
      })?;
    }
  }
  Ok(())
}

/// A unit may not publish the same artifact twice.
fn validate_publishes(contract: &UnitContract) -> Result<(), ResolveError> {
  match contract.repeated_artifact() {
    Some(artifact) => Err(ResolveError::DuplicatePublish {
      unit: contract.name.clone(),
      artifact: artifact.to_string(),
    }),
    None => Ok(()),
  }
}

/// Check a job's call against the unit contract.
fn check_contract(
  def: &OrchestratorDef,
  job_id: &str,
  job: &JobDef,
  contract: &UnitContract,
) -> Result<(), ResolveError> {
  let violation = |violation: Violation| ResolveError::ContractViolation {
    job_id: job_id.to_string(),
    unit: contract.name.clone(),
    violation,
  };

  for input in job.with.keys() {
    if !contract.declares_input(input) {
      return Err(violation(Violation::UndeclaredInput(input.clone())));
    }
  }

  for (unit_secret, caller_secret) in &job.secrets {
    if !contract.declares_secret(unit_secret) {
      return Err(violation(Violation::UndeclaredSecret(unit_secret.clone())));
    }
    if !def.secrets.contains(caller_secret) {
      return Err(violation(Violation::UndeclaredCallerSecret(
        caller_secret.clone(),
      )));
    }
  }

  for secret in &contract.secrets {
    if !job.secrets.contains_key(secret) {
      return Err(ResolveError::MissingSecret {
        job_id: job_id.to_string(),
        unit: contract.name.clone(),
        secret: secret.clone(),
      });
    }
  }

  if let Some(matrix) = &job.matrix {
    for (axis, values) in matrix {
      if values.is_empty() {
        return Err(ResolveError::EmptyMatrixAxis {
          job_id: job_id.to_string(),
          axis: axis.clone(),
        });
      }
      // Values that print alike would share a node id.
      let mut seen = BTreeSet::new();
      for value in values {
        let printed = value.to_string();
        if !seen.insert(printed.clone()) {
          return Err(ResolveError::DuplicateMatrixValue {
            job_id: job_id.to_string(),
            axis: axis.clone(),
            value: printed,
          });
        }
      }
    }
  }

  Ok(())
}

/// Instantiate a job once per matrix combination.
fn expand_job(
  def: &OrchestratorDef,
  job_id: &str,
  job: &JobDef,
  contract: &UnitContract,
) -> Result<Vec<JobNode>, ResolveError> {
  let env = environment();
  let mut nodes = Vec::new();

  for matrix in expand_matrix(job.matrix.as_ref()) {
    let node_id = node_id_for(job_id, &matrix);
    let call_context = serde_json::json!({ "matrix": matrix });

    let mut inputs = BTreeMap::new();
    for (input, spec) in &contract.inputs {
      let value = match (job.with.get(input), &spec.default) {
        (Some(value), _) => render_value(value, &call_context).map_err(|message| {
          ResolveError::Template {
            node_id: node_id.clone(),
            field: format!("input '{}'", input),
            message,
          }
        })?,
        (None, Some(default)) => default.clone(),
        (None, None) if spec.required => {
          return Err(ResolveError::MissingInput {
            node_id,
            input: input.clone(),
          });
        }
        (None, None) => continue,
      };

      let typed = coerce_value(&value, spec.input_type).map_err(|_| {
        ResolveError::ContractViolation {
          job_id: job_id.to_string(),
          unit: contract.name.clone(),
          violation: Violation::TypeMismatch {
            input: input.clone(),
            expected: spec.input_type.to_string(),
            value: value.to_string(),
          },
        }
      })?;
      inputs.insert(input.clone(), typed);
    }

    let unit_context = serde_json::json!({ "matrix": matrix, "inputs": inputs });
    let mut publishes = Vec::with_capacity(contract.publish.len());
    for publish in &contract.publish {
      let artifact = render_str(&env, &publish.artifact, &unit_context).map_err(|message| {
        ResolveError::Template {
          node_id: node_id.clone(),
          field: format!("artifact '{}'", publish.artifact),
          message,
        }
      })?;
      let artifact = parse_artifact_name(&node_id, artifact)?;
      publishes.push(LockedPublish {
        artifact,
        path: publish.path.clone(),
        always: publish.always,
        retention_days: publish
          .retention_days
          .or(def.retention_days)
          .unwrap_or(DEFAULT_RETENTION_DAYS),
      });
    }

    let mut downloads = Vec::with_capacity(job.downloads.len());
    for download in &job.downloads {
      let artifact = render_str(&env, &download.name, &call_context).map_err(|message| {
        ResolveError::Template {
          node_id: node_id.clone(),
          field: format!("download '{}'", download.name),
          message,
        }
      })?;
      let artifact = parse_artifact_name(&node_id, artifact)?;
      downloads.push(LockedDownload {
        path: download.path.clone().unwrap_or_else(|| artifact.clone()),
        artifact,
        default: download.default.clone(),
      });
    }

    nodes.push(JobNode {
      node_id,
      job_id: job_id.to_string(),
      unit: contract.name.clone(),
      matrix,
      inputs,
      secrets: job.secrets.clone(),
      needs: Vec::new(),
      downloads,
      publishes,
      always: job.always,
      optional: job.optional,
      timeout_ms: job.timeout_ms,
    });
  }

  Ok(nodes)
}

fn parse_artifact_name(node_id: &str, name: String) -> Result<String, ResolveError> {
  ArtifactName::parse(name)
    .map(String::from)
    .map_err(|e| ResolveError::InvalidArtifactName {
      node_id: node_id.to_string(),
      message: e.to_string(),
    })
}

/// Resolve job-level `needs` into node-level edges.
///
/// An instance links to the instances of the needed job that agree with it
/// on every shared matrix axis; without shared axes it links to all of them.
fn link_needs(
  def: &OrchestratorDef,
  nodes: &mut BTreeMap<String, JobNode>,
) -> Result<Vec<(String, String)>, ResolveError> {
  let mut by_job: BTreeMap<String, Vec<(String, BTreeMap<String, serde_json::Value>)>> =
    BTreeMap::new();
  for node in nodes.values() {
    by_job
      .entry(node.job_id.clone())
      .or_default()
      .push((node.node_id.clone(), node.matrix.clone()));
  }

  let mut edges = Vec::new();
  for node in nodes.values_mut() {
    let mut preds = BTreeSet::new();
    for needs in &def.jobs[&node.job_id].needs {
      let candidates = by_job.get(needs).map(Vec::as_slice).unwrap_or(&[]);
      let matched: Vec<&String> = candidates
        .iter()
        .filter(|(_, matrix)| matrix_agrees(&node.matrix, matrix))
        .map(|(id, _)| id)
        .collect();
      if matched.is_empty() {
        return Err(ResolveError::UnsatisfiedNeeds {
          node_id: node.node_id.clone(),
          needs: needs.clone(),
        });
      }
      preds.extend(matched.into_iter().cloned());
    }

    for pred in &preds {
      edges.push((pred.clone(), node.node_id.clone()));
    }
    node.needs = preds.into_iter().collect();
  }

  edges.sort();
  Ok(edges)
}

/// Check for cycles using DFS, reporting the first cycle found.
fn detect_cycle(nodes: &BTreeMap<String, JobNode>) -> Result<(), ResolveError> {
  // DFS over predecessor lists with coloring:
  // 0 = white (unvisited), 1 = gray (on the stack), 2 = black (done)
  let mut color: BTreeMap<&str, u8> = nodes.keys().map(|id| (id.as_str(), 0u8)).collect();

  fn dfs<'a>(
    node: &'a str,
    nodes: &'a BTreeMap<String, JobNode>,
    color: &mut BTreeMap<&'a str, u8>,
    stack: &mut Vec<&'a str>,
  ) -> Option<Vec<String>> {
    color.insert(node, 1);
    stack.push(node);

    if let Some(job) = nodes.get(node) {
      for pred in &job.needs {
        match color.get(pred.as_str()) {
          Some(1) => {
            // Back edge: the cycle is the stack from `pred` to here.
            let start = stack.iter().position(|id| *id == pred.as_str()).unwrap_or(0);
            let mut path: Vec<String> = stack[start..].iter().rev().map(|s| s.to_string()).collect();
            path.push(path[0].clone());
            return Some(path);
          }
          Some(0) => {
            if let Some(path) = dfs(pred.as_str(), nodes, color, stack) {
              return Some(path);
            }
          }
          _ => {}
        }
      }
    }

    stack.pop();
    color.insert(node, 2);
    None
  }

  for node_id in nodes.keys() {
    if color.get(node_id.as_str()) == Some(&0) {
      let mut stack = Vec::new();
      if let Some(path) = dfs(node_id.as_str(), nodes, &mut color, &mut stack) {
        return Err(ResolveError::CycleDetected { path });
      }
    }
  }

  Ok(())
}

/// Each artifact has one producer, and consumers must run after it.
fn check_artifacts(workflow: &Workflow) -> Result<(), ResolveError> {
  let mut producers: BTreeMap<&str, &str> = BTreeMap::new();
  for node in workflow.nodes.values() {
    for publish in &node.publishes {
      if let Some(first) = producers.insert(publish.artifact.as_str(), node.node_id.as_str())
        && first != node.node_id
      {
        return Err(ResolveError::DuplicateArtifactProducer {
          artifact: publish.artifact.clone(),
          first: first.to_string(),
          second: node.node_id.clone(),
        });
      }
    }
  }

  let graph = workflow.graph();
  for node in workflow.nodes.values() {
    if node.downloads.is_empty() {
      continue;
    }
    let ancestors = graph.ancestors(&node.node_id);
    for download in &node.downloads {
      if let Some(producer) = producers.get(download.artifact.as_str())
        && !ancestors.contains(*producer)
      {
        return Err(ResolveError::UnorderedArtifact {
          artifact: download.artifact.clone(),
          producer: producer.to_string(),
          consumer: node.node_id.clone(),
        });
      }
    }
  }

  Ok(())
}

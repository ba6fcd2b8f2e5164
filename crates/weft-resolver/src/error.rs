use thiserror::Error;

/// Errors that can occur during composition.
#[derive(Debug, Error)]
pub enum ResolveError {
  /// The orchestrator declares no jobs.
  #[error("orchestrator '{name}' has no jobs")]
  NoJobs { name: String },

  /// A job invokes a unit the registry does not know.
  #[error("job '{job_id}' uses unknown unit '{unit}'")]
  UnitNotFound { job_id: String, unit: String },

  /// A job's `needs` names a job that does not exist.
  #[error("job '{job_id}' needs unknown job '{needs}'")]
  InvalidNeeds { job_id: String, needs: String },

  /// A job's call does not fit its unit's contract.
  #[error("contract violation in job '{job_id}' ({unit}): {violation}")]
  ContractViolation {
    job_id: String,
    unit: String,
    violation: Violation,
  },

  /// A required input has neither a value nor a default.
  #[error("node '{node_id}' is missing required input '{input}'")]
  MissingInput { node_id: String, input: String },

  /// A secret consumed by the unit is not passed by the caller.
  #[error("job '{job_id}' does not pass secret '{secret}' required by unit '{unit}'")]
  MissingSecret {
    job_id: String,
    unit: String,
    secret: String,
  },

  /// A unit's default does not match its declared type.
  #[error("unit '{unit}' has an invalid default for input '{input}': {message}")]
  InvalidDefault {
    unit: String,
    input: String,
    message: String,
  },

  /// A unit lists the same artifact in two publish entries.
  #[error("unit '{unit}' publishes artifact '{artifact}' more than once")]
  DuplicatePublish { unit: String, artifact: String },

  /// A job id uses characters reserved for matrix instance ids.
  #[error("job id '{job_id}' may not contain '[', ']', '=' or ','")]
  InvalidJobId { job_id: String },

  /// A matrix axis lists the same value twice.
  #[error("job '{job_id}' repeats value '{value}' on matrix axis '{axis}'")]
  DuplicateMatrixValue {
    job_id: String,
    axis: String,
    value: String,
  },

  /// Two instances ended up with the same node id.
  #[error("node id '{node_id}' is produced more than once")]
  DuplicateNode { node_id: String },

  /// A matrix axis has no values.
  #[error("job '{job_id}' has an empty matrix axis '{axis}'")]
  EmptyMatrixAxis { job_id: String, axis: String },

  /// A template failed to render.
  #[error("failed to render {field} for node '{node_id}': {message}")]
  Template {
    node_id: String,
    field: String,
    message: String,
  },

  /// No instance of a needed job agrees with this instance's matrix values.
  #[error("node '{node_id}' needs job '{needs}' but no instance shares its matrix values")]
  UnsatisfiedNeeds { node_id: String, needs: String },

  /// The `needs` graph contains a cycle.
  #[error("cycle detected: {}", .path.join(" -> "))]
  CycleDetected { path: Vec<String> },

  /// A rendered artifact name is not a valid store name.
  #[error("node '{node_id}' uses invalid artifact name: {message}")]
  InvalidArtifactName { node_id: String, message: String },

  /// Two nodes publish the same artifact.
  #[error("artifact '{artifact}' is published by both '{first}' and '{second}'")]
  DuplicateArtifactProducer {
    artifact: String,
    first: String,
    second: String,
  },

  /// A node downloads an artifact whose producer is not one of its predecessors.
  #[error("node '{consumer}' downloads '{artifact}' but its producer '{producer}' is not upstream")]
  UnorderedArtifact {
    artifact: String,
    producer: String,
    consumer: String,
  },

  /// A trigger lists a job that does not exist.
  #[error("trigger references unknown job: {0}")]
  UnknownTriggerJob(String),

  /// Registry error while looking up a unit.
  #[error("registry error: {0}")]
  Registry(#[from] weft_unit_registry::RegistryError),
}

impl ResolveError {
  /// Whether this error is a contract violation (undeclared input/secret or bad type).
  pub fn is_contract_violation(&self) -> bool {
    matches!(self, ResolveError::ContractViolation { .. })
  }
}

/// The specific way a call breaks a unit contract.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum Violation {
  #[error("input '{0}' is not declared by the unit")]
  UndeclaredInput(String),

  #[error("secret '{0}' is not declared by the unit")]
  UndeclaredSecret(String),

  #[error("secret '{0}' is not declared by the orchestrator")]
  UndeclaredCallerSecret(String),

  #[error("input '{input}' expects {expected}, got '{value}'")]
  TypeMismatch {
    input: String,
    expected: String,
    value: String,
  },
}

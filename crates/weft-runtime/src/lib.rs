//! Weft Runtime
//!
//! This crate schedules a composed workflow. It handles trigger selection,
//! dependency ordering, the skip policy, per-node timeouts, cancellation and
//! the flow of artifacts between nodes.
//!
//! # Architecture
//!
//! ```text
//! Runtime
//! ├── invoke(trigger, cancel) -> RunReport    - schedules the selected nodes
//! └── invoke_node(node_id, cancel) -> NodeResult - runs one node in isolation
//!
//! UnitExecution (one per node)
//! ├── downloads  - fetch declared artifacts into the working directory
//! ├── steps      - run through a StepExecutor, stop at the first failure
//! └── publishes  - upload artifacts (only `always` ones after a failure)
//! ```
//!
//! # Usage
//!
//! ```ignore
//! use weft_runtime::{Runtime, RuntimeConfig, ShellExecutor};
//!
//! let runtime = Runtime::new(workflow, RuntimeConfig::default(), store, Arc::new(ShellExecutor::new()));
//! let report = runtime.invoke(Trigger::new(EventKind::Push, "main"), cancel).await?;
//! report.ensure_success()?;
//! ```

mod config;
mod error;
mod events;
mod executor;
mod result;
mod runtime;
mod secrets;
mod unit;

pub use config::RuntimeConfig;
pub use error::{ExecutorError, RuntimeError};
pub use events::{ChannelNotifier, ExecutionEvent, ExecutionNotifier, NoopNotifier};
pub use executor::{ShellExecutor, StepContext, StepExecutor, StepOutcome};
pub use result::{NodeResult, NodeStatus, RunReport, RunStatus, StepRecord};
pub use runtime::Runtime;
pub use secrets::{EnvSecretProvider, SecretProvider, SecretValue, StaticSecrets};

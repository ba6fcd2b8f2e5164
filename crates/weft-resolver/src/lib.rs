//! Weft Resolver
//!
//! Turns an [`OrchestratorDef`](weft_config::OrchestratorDef) into a locked
//! [`Workflow`](weft_workflow::Workflow). Composition is where every
//! definition-time error is reported: contract violations, missing inputs
//! and secrets, cycles and artifact ordering problems all surface here,
//! before any node executes.

mod error;
mod input;
mod matrix;
mod resolver;

pub use error::{ResolveError, Violation};
pub use input::{coerce_value, render_value};
pub use matrix::{expand_matrix, matrix_agrees};
pub use resolver::{DEFAULT_RETENTION_DAYS, Resolver, StandardResolver};

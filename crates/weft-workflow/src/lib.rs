//! Weft Workflow
//!
//! This crate provides the "locked" workflow representation for weft.
//! A locked workflow is the composed form of an orchestrator definition:
//! every job has been validated against its unit's contract, matrices have
//! been expanded into independent job nodes and the `needs` edges resolved
//! between the expanded instances.
//!
//! Key differences from `weft-config`:
//! - Graph structure is validated (no cycles, valid edges)
//! - Inputs are rendered and typed, defaults applied
//! - Artifact names are concrete
//! - Ready to be scheduled by the runtime

mod contract;
mod error;
mod graph;
mod node;
mod trigger;
mod workflow;

pub use contract::UnitContract;
pub use error::WorkflowError;
pub use graph::Graph;
pub use node::{JobNode, LockedDownload, LockedPublish, node_id_for};
pub use trigger::{Trigger, branch_matches};
pub use workflow::Workflow;

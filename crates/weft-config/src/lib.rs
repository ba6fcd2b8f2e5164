//! Weft Config
//!
//! This crate contains the serializable definition types for weft. These
//! types represent reusable units and orchestrators as they are written on
//! disk, before they are composed and validated by the resolver.
//!
//! Definitions can be loaded from:
//! - YAML files (`.yaml` / `.yml`)
//! - JSON files (`.json`)
//!
//! The resolver takes these definition types, validates every job against its
//! unit's contract, expands matrices and produces a locked workflow.

mod enums;
mod input;
mod job;
mod load;
mod orchestrator;
mod trigger;
mod unit;

pub use enums::{EventKind, InputType};
pub use input::InputValue;
pub use job::{ArtifactInput, JobDef};
pub use load::{ConfigError, Format, load_orchestrator, load_unit, parse_orchestrator, parse_unit};
pub use orchestrator::OrchestratorDef;
pub use trigger::TriggerDef;
pub use unit::{InputSpec, PublishDef, StepDef, UnitDef};

mod error;
mod fs_registry;
mod registry;

pub use error::RegistryError;
pub use fs_registry::FsUnitRegistry;
pub use registry::UnitRegistry;

use async_trait::async_trait;
use weft_config::UnitDef;

use crate::error::RegistryError;

/// Looks up reusable unit definitions by name.
#[async_trait]
pub trait UnitRegistry: Send + Sync {
  /// Get a unit by name.
  async fn get(&self, name: &str) -> Result<Option<UnitDef>, RegistryError>;

  /// List every available unit, sorted by name.
  async fn list(&self) -> Result<Vec<UnitDef>, RegistryError>;
}

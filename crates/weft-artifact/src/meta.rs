use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

use crate::name::ArtifactName;

/// Metadata committed alongside an artifact's payload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactMeta {
  pub name: ArtifactName,
  /// Node id of the producer; the only writer allowed for this name.
  pub producer: String,
  pub size: u64,
  pub created_at: DateTime<Utc>,
  pub retention_days: u32,
}

impl ArtifactMeta {
  pub fn expires_at(&self) -> DateTime<Utc> {
    self.created_at + Duration::days(i64::from(self.retention_days))
  }

  pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
    now >= self.expires_at()
  }
}

#[cfg(test)]
mod tests {
  use super::*;

  #[test]
  fn test_expiry() {
    let created_at = Utc::now();
    let meta = ArtifactMeta {
      name: ArtifactName::parse("report").unwrap(),
      producer: "test".to_string(),
      size: 0,
      created_at,
      retention_days: 7,
    };
    assert!(!meta.is_expired(created_at + Duration::days(6)));
    assert!(meta.is_expired(created_at + Duration::days(7)));
  }
}

use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use bytes::Bytes;
use chrono::{DateTime, Utc};

use crate::{ArtifactMeta, ArtifactName, ByteStream, Error, Store, read_all, stream_from};

/// In-memory artifact store.
///
/// The payload is fully buffered before it is inserted, so readers never see
/// a partial write. Cloning shares the underlying map.
#[derive(Clone, Default)]
pub struct MemoryStore {
  artifacts: Arc<RwLock<BTreeMap<ArtifactName, (ArtifactMeta, Bytes)>>>,
}

impl MemoryStore {
  pub fn new() -> Self {
    Self::default()
  }

  /// Names of every stored artifact, expired or not.
  pub fn names(&self) -> Vec<ArtifactName> {
    let artifacts = self.artifacts.read().unwrap_or_else(|e| e.into_inner());
    artifacts.keys().cloned().collect()
  }

  fn live(&self, name: &ArtifactName) -> Result<(ArtifactMeta, Bytes), Error> {
    let artifacts = self.artifacts.read().unwrap_or_else(|e| e.into_inner());
    match artifacts.get(name) {
      Some((meta, data)) if !meta.is_expired(Utc::now()) => Ok((meta.clone(), data.clone())),
      _ => Err(Error::NotFound(name.to_string())),
    }
  }
}

#[async_trait]
impl Store for MemoryStore {
  async fn publish(
    &self,
    name: &ArtifactName,
    producer: &str,
    data: ByteStream,
    retention_days: u32,
  ) -> Result<ArtifactMeta, Error> {
    let data = read_all(data).await?;

    let mut artifacts = self.artifacts.write().unwrap_or_else(|e| e.into_inner());
    if let Some((existing, _)) = artifacts.get(name)
      && existing.producer != producer
    {
      return Err(Error::OwnershipConflict {
        name: name.to_string(),
        owner: existing.producer.clone(),
        producer: producer.to_string(),
      });
    }

    let meta = ArtifactMeta {
      name: name.clone(),
      producer: producer.to_string(),
      size: data.len() as u64,
      created_at: Utc::now(),
      retention_days,
    };
    artifacts.insert(name.clone(), (meta.clone(), data));
    Ok(meta)
  }

  async fn fetch(&self, name: &ArtifactName) -> Result<ByteStream, Error> {
    let (_, data) = self.live(name)?;
    Ok(stream_from(data))
  }

  async fn stat(&self, name: &ArtifactName) -> Result<ArtifactMeta, Error> {
    self.live(name).map(|(meta, _)| meta)
  }

  async fn delete(&self, name: &ArtifactName) -> Result<(), Error> {
    let mut artifacts = self.artifacts.write().unwrap_or_else(|e| e.into_inner());
    artifacts
      .remove(name)
      .map(|_| ())
      .ok_or_else(|| Error::NotFound(name.to_string()))
  }

  async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<ArtifactName>, Error> {
    let mut artifacts = self.artifacts.write().unwrap_or_else(|e| e.into_inner());
    let expired: Vec<ArtifactName> = artifacts
      .iter()
      .filter(|(_, (meta, _))| meta.is_expired(now))
      .map(|(name, _)| name.clone())
      .collect();
    for name in &expired {
      artifacts.remove(name);
    }
    Ok(expired)
  }
}

#[cfg(test)]
mod tests {
  use super::*;
  use chrono::Duration;

  #[tokio::test]
  async fn test_publish_fetch_and_purge() {
    let store = MemoryStore::new();
    let name = ArtifactName::parse("exec/coverage").unwrap();

    store
      .publish(&name, "test", stream_from("93%"), 3)
      .await
      .unwrap();
    let data = read_all(store.fetch(&name).await.unwrap()).await.unwrap();
    assert_eq!(&data[..], b"93%");

    let conflict = store.publish(&name, "other", stream_from("x"), 3).await;
    assert!(matches!(conflict, Err(Error::OwnershipConflict { .. })));

    let purged = store
      .purge_expired(Utc::now() + Duration::days(4))
      .await
      .unwrap();
    assert_eq!(purged, vec![name.clone()]);
    assert!(store.names().is_empty());
  }
}

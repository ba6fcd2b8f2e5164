//! Weft Artifact
//!
//! This crate provides the artifact storage trait and implementations for weft.
//! Artifacts are named payloads (test reports, image tarballs, manifests)
//! published by one job node and fetched by name by the nodes downstream of it.
//!
//! The [`Store`] trait is the key-value contract the runtime relies on:
//! - the producing node owns a name; a different producer cannot overwrite it
//! - a fetch issued after a publish completes sees the whole payload
//! - artifacts expire after their retention window and are purged
//!
//! The trait uses async streaming for efficient handling of large files.

mod fs;
mod memory;
mod meta;
mod name;

pub use fs::FsStore;
pub use memory::MemoryStore;
pub use meta::ArtifactMeta;
pub use name::ArtifactName;

use async_trait::async_trait;
use bytes::{Bytes, BytesMut};
use chrono::{DateTime, Utc};
use futures::{Stream, StreamExt};
use std::pin::Pin;

/// A boxed stream of bytes for artifact data.
pub type ByteStream = Pin<Box<dyn Stream<Item = Result<Bytes, Error>> + Send>>;

/// Error type for artifact storage operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
  /// The requested artifact was not found (or has expired).
  #[error("artifact not found: {0}")]
  NotFound(String),

  /// The artifact name is not a valid store key.
  #[error("invalid artifact name '{name}': {reason}")]
  InvalidName { name: String, reason: String },

  /// The artifact is owned by another producer.
  #[error("artifact '{name}' is owned by '{owner}', refusing write from '{producer}'")]
  OwnershipConflict {
    name: String,
    owner: String,
    producer: String,
  },

  /// Stored metadata could not be read.
  #[error("corrupt metadata for '{name}': {source}")]
  Meta {
    name: String,
    #[source]
    source: serde_json::Error,
  },

  /// An I/O error occurred.
  #[error("io error: {0}")]
  Io(#[from] std::io::Error),
}

/// Artifact storage trait.
///
/// Implementations provide the actual storage backend (filesystem, memory, ...).
/// The runtime is responsible for scoping names per execution.
#[async_trait]
pub trait Store: Send + Sync {
  /// Store an artifact on behalf of `producer`, kept for `retention_days`.
  ///
  /// Returns the committed metadata, which acts as the handle to the artifact.
  async fn publish(
    &self,
    name: &ArtifactName,
    producer: &str,
    data: ByteStream,
    retention_days: u32,
  ) -> Result<ArtifactMeta, Error>;

  /// Retrieve an artifact's payload by name.
  async fn fetch(&self, name: &ArtifactName) -> Result<ByteStream, Error>;

  /// Retrieve an artifact's metadata by name.
  async fn stat(&self, name: &ArtifactName) -> Result<ArtifactMeta, Error>;

  /// Delete an artifact by name.
  async fn delete(&self, name: &ArtifactName) -> Result<(), Error>;

  /// Remove every artifact whose retention window has elapsed at `now`.
  async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<ArtifactName>, Error>;
}

/// Wrap an in-memory payload as a [`ByteStream`].
pub fn stream_from(data: impl Into<Bytes>) -> ByteStream {
  let data = data.into();
  Box::pin(futures::stream::once(async move { Ok(data) }))
}

/// Collect a [`ByteStream`] into a single buffer.
pub async fn read_all(mut stream: ByteStream) -> Result<Bytes, Error> {
  let mut buf = BytesMut::new();
  while let Some(chunk) = stream.next().await {
    buf.extend_from_slice(&chunk?);
  }
  Ok(buf.freeze())
}

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use futures::StreamExt;
use tokio::fs::{self, File};
use tokio::io::AsyncWriteExt;
use tokio_util::io::ReaderStream;
use tracing::debug;

use crate::{ArtifactMeta, ArtifactName, ByteStream, Error, Store};

const PAYLOAD_FILE: &str = ".payload";
const META_FILE: &str = ".meta.json";

/// Filesystem-based artifact store.
///
/// Each artifact lives in its own directory:
/// ```text
/// {base_path}/{name}/
/// ├── .payload
/// └── .meta.json
/// ```
///
/// Both files are written to a temporary name and renamed into place, payload
/// first. An artifact only exists once its metadata is committed, so a fetch
/// never observes a partially written payload.
pub struct FsStore {
  base_path: PathBuf,
}

impl FsStore {
  /// Create a new filesystem store with the given base path.
  pub fn new(base_path: impl Into<PathBuf>) -> Self {
    Self {
      base_path: base_path.into(),
    }
  }

  pub fn base_path(&self) -> &Path {
    &self.base_path
  }

  fn artifact_dir(&self, name: &ArtifactName) -> PathBuf {
    self.base_path.join(name.as_str())
  }

  async fn read_meta(&self, name: &ArtifactName) -> Result<ArtifactMeta, Error> {
    let path = self.artifact_dir(name).join(META_FILE);
    let content = fs::read(&path).await.map_err(|e| not_found_or_io(e, name))?;
    serde_json::from_slice(&content).map_err(|source| Error::Meta {
      name: name.to_string(),
      source,
    })
  }

  /// Read metadata, treating expired artifacts as gone.
  async fn live_meta(&self, name: &ArtifactName) -> Result<ArtifactMeta, Error> {
    let meta = self.read_meta(name).await?;
    if meta.is_expired(Utc::now()) {
      return Err(Error::NotFound(name.to_string()));
    }
    Ok(meta)
  }

  async fn remove_files(&self, name: &ArtifactName) -> Result<(), Error> {
    let dir = self.artifact_dir(name);
    // Metadata goes first so the artifact disappears atomically for readers.
    fs::remove_file(dir.join(META_FILE))
      .await
      .map_err(|e| not_found_or_io(e, name))?;
    match fs::remove_file(dir.join(PAYLOAD_FILE)).await {
      Ok(()) => {}
      Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
      Err(e) => return Err(Error::Io(e)),
    }
    // Each removal only succeeds on an empty directory, so the walk stops at
    // the first ancestor still holding other artifacts.
    let mut current = Some(dir.as_path());
    while let Some(path) = current.filter(|p| *p != self.base_path.as_path()) {
      if fs::remove_dir(path).await.is_err() {
        break;
      }
      current = path.parent();
    }
    Ok(())
  }
}

fn not_found_or_io(e: std::io::Error, name: &ArtifactName) -> Error {
  if e.kind() == std::io::ErrorKind::NotFound {
    Error::NotFound(name.to_string())
  } else {
    Error::Io(e)
  }
}

async fn write_atomic(target: &Path, data: &[u8]) -> Result<(), Error> {
  let tmp = temp_path(target);
  let result = async {
    let mut file = File::create(&tmp).await?;
    file.write_all(data).await?;
    file.flush().await?;
    file.sync_all().await?;
    drop(file);
    fs::rename(&tmp, target).await?;
    Ok::<_, Error>(())
  }
  .await;
  discard_on_error(&tmp, result).await
}

/// Remove a temp file left behind by a failed write.
async fn discard_on_error<T>(tmp: &Path, result: Result<T, Error>) -> Result<T, Error> {
  if result.is_err() {
    let _ = fs::remove_file(tmp).await;
  }
  result
}

fn temp_path(target: &Path) -> PathBuf {
  let file_name = target
    .file_name()
    .map(|n| n.to_string_lossy().into_owned())
    .unwrap_or_default();
  target.with_file_name(format!("{}.tmp-{}", file_name, uuid::Uuid::new_v4()))
}

#[async_trait]
impl Store for FsStore {
  async fn publish(
    &self,
    name: &ArtifactName,
    producer: &str,
    data: ByteStream,
    retention_days: u32,
  ) -> Result<ArtifactMeta, Error> {
    match self.read_meta(name).await {
      Ok(existing) if existing.producer != producer => {
        return Err(Error::OwnershipConflict {
          name: name.to_string(),
          owner: existing.producer,
          producer: producer.to_string(),
        });
      }
      Ok(_) | Err(Error::NotFound(_)) => {}
      Err(e) => return Err(e),
    }

    let dir = self.artifact_dir(name);
    fs::create_dir_all(&dir).await?;

    let payload_path = dir.join(PAYLOAD_FILE);
    let tmp = temp_path(&payload_path);
    let written = async {
      let mut file = File::create(&tmp).await?;
      let mut stream = std::pin::pin!(data);
      let mut size = 0u64;
      while let Some(chunk) = stream.next().await {
        let bytes = chunk?;
        size += bytes.len() as u64;
        file.write_all(&bytes).await?;
      }
      file.flush().await?;
      file.sync_all().await?;
      drop(file);
      fs::rename(&tmp, &payload_path).await?;
      Ok::<_, Error>(size)
    }
    .await;
    let size = discard_on_error(&tmp, written).await?;

    let meta = ArtifactMeta {
      name: name.clone(),
      producer: producer.to_string(),
      size,
      created_at: Utc::now(),
      retention_days,
    };
    let encoded = serde_json::to_vec_pretty(&meta).map_err(|source| Error::Meta {
      name: name.to_string(),
      source,
    })?;
    write_atomic(&dir.join(META_FILE), &encoded).await?;

    debug!(artifact = %name, producer = %producer, size, "artifact committed");
    Ok(meta)
  }

  async fn fetch(&self, name: &ArtifactName) -> Result<ByteStream, Error> {
    self.live_meta(name).await?;
    let path = self.artifact_dir(name).join(PAYLOAD_FILE);
    let file = File::open(&path)
      .await
      .map_err(|e| not_found_or_io(e, name))?;
    let stream = ReaderStream::new(file).map(|r| r.map_err(Error::Io));
    Ok(Box::pin(stream))
  }

  async fn stat(&self, name: &ArtifactName) -> Result<ArtifactMeta, Error> {
    self.live_meta(name).await
  }

  async fn delete(&self, name: &ArtifactName) -> Result<(), Error> {
    self.remove_files(name).await
  }

  async fn purge_expired(&self, now: DateTime<Utc>) -> Result<Vec<ArtifactName>, Error> {
    let mut purged = Vec::new();
    if !self.base_path.exists() {
      return Ok(purged);
    }

    let mut pending = vec![self.base_path.clone()];
    let mut expired = Vec::new();

    while let Some(dir) = pending.pop() {
      let mut entries = fs::read_dir(&dir).await?;
      while let Some(entry) = entries.next_entry().await? {
        let path = entry.path();
        if entry.file_type().await?.is_dir() {
          pending.push(path);
        } else if path.file_name().is_some_and(|n| n == META_FILE) {
          let content = fs::read(&path).await?;
          let Ok(meta) = serde_json::from_slice::<ArtifactMeta>(&content) else {
            continue;
          };
          if meta.is_expired(now) {
            expired.push(meta.name);
          }
        }
      }
    }

    expired.sort();
    for name in expired {
      self.remove_files(&name).await?;
      debug!(artifact = %name, "purged expired artifact");
      purged.push(name);
    }

    Ok(purged)
  }
}

use std::path::PathBuf;
use std::time::Duration;

/// Configuration for the runtime.
#[derive(Debug, Clone)]
pub struct RuntimeConfig {
  /// Root for per-node working directories: `{work_dir}/{execution_id}/{node}`.
  pub work_dir: PathBuf,
  /// Wall-clock cap for nodes whose job and orchestrator set no timeout.
  pub default_timeout: Duration,
  /// Keep `{work_dir}/{execution_id}` after a run instead of removing it.
  pub keep_work_dirs: bool,
}

impl Default for RuntimeConfig {
  fn default() -> Self {
    Self {
      work_dir: std::env::temp_dir().join("weft"),
      default_timeout: Duration::from_secs(6 * 60 * 60),
      keep_work_dirs: false,
    }
  }
}

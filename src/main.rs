use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::warn;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

use weft_artifact::{FsStore, Store};
use weft_config::{EventKind, load_orchestrator};
use weft_resolver::{Resolver, StandardResolver};
use weft_runtime::{EnvSecretProvider, Runtime, RuntimeConfig, ShellExecutor};
use weft_unit_registry::FsUnitRegistry;
use weft_workflow::{Trigger, Workflow};

/// Weft - reusable CI/CD units composed into job graphs
#[derive(Parser)]
#[command(name = "weft")]
#[command(version, about, long_about = None)]
struct Cli {
  /// Path to the data directory (default: ~/.weft)
  #[arg(long, global = true)]
  data_dir: Option<PathBuf>,

  /// Log output format
  #[arg(long, global = true, value_enum, default_value_t = LogFormat::Text)]
  log_format: LogFormat,

  #[command(subcommand)]
  command: Option<Commands>,
}

#[derive(Clone, Copy, ValueEnum)]
enum LogFormat {
  Text,
  Json,
}

#[derive(Clone, Copy, ValueEnum)]
enum Event {
  Push,
  #[value(name = "pull_request")]
  PullRequest,
  Manual,
}

impl From<Event> for EventKind {
  fn from(event: Event) -> Self {
    match event {
      Event::Push => EventKind::Push,
      Event::PullRequest => EventKind::PullRequest,
      Event::Manual => EventKind::Manual,
    }
  }
}

#[derive(Subcommand)]
enum Commands {
  /// Compose an orchestrator and report contract violations and cycles
  Lint {
    /// Path to the orchestrator file (JSON or YAML)
    orchestrator: PathBuf,

    /// Directory holding unit files
    #[arg(long, default_value = "units")]
    units: PathBuf,
  },

  /// Print the nodes of an orchestrator in execution order
  Plan {
    /// Path to the orchestrator file (JSON or YAML)
    orchestrator: PathBuf,

    /// Directory holding unit files
    #[arg(long, default_value = "units")]
    units: PathBuf,

    /// Only show the nodes this event selects
    #[arg(long, value_enum, requires = "branch")]
    event: Option<Event>,

    #[arg(long)]
    branch: Option<String>,
  },

  /// Run an orchestrator, or a single node of it
  Run {
    /// Path to the orchestrator file (JSON or YAML)
    orchestrator: PathBuf,

    /// Directory holding unit files
    #[arg(long, default_value = "units")]
    units: PathBuf,

    /// Event that triggered the run
    #[arg(long, value_enum)]
    event: Event,

    /// Branch the event happened on
    #[arg(long)]
    branch: String,

    /// Run only this node, ignoring its dependencies
    #[arg(long)]
    node: Option<String>,

    /// Keep per-node working directories after the run
    #[arg(long)]
    keep_work_dirs: bool,
  },

  /// Manage stored artifacts
  Artifacts {
    #[command(subcommand)]
    command: ArtifactCommand,
  },
}

#[derive(Subcommand)]
enum ArtifactCommand {
  /// Delete artifacts whose retention window has elapsed
  Purge,
}

fn main() -> Result<()> {
  let cli = Cli::parse();
  init_tracing(cli.log_format);

  let data_dir = match cli.data_dir {
    Some(dir) => dir,
    None => dirs::home_dir()
      .context("could not determine home directory")?
      .join(".weft"),
  };

  let rt = tokio::runtime::Runtime::new()?;
  match cli.command {
    Some(Commands::Lint {
      orchestrator,
      units,
    }) => rt.block_on(lint(&orchestrator, &units)),
    Some(Commands::Plan {
      orchestrator,
      units,
      event,
      branch,
    }) => {
      let trigger = event
        .zip(branch)
        .map(|(event, branch)| Trigger::new(event.into(), branch));
      rt.block_on(plan(&orchestrator, &units, trigger))
    }
    Some(Commands::Run {
      orchestrator,
      units,
      event,
      branch,
      node,
      keep_work_dirs,
    }) => rt.block_on(run(
      &orchestrator,
      &units,
      Trigger::new(event.into(), branch),
      node,
      keep_work_dirs,
      &data_dir,
    )),
    Some(Commands::Artifacts {
      command: ArtifactCommand::Purge,
    }) => rt.block_on(purge(&data_dir)),
    None => {
      println!("weft - use --help to see available commands");
      Ok(())
    }
  }
}

fn init_tracing(format: LogFormat) {
  let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
  let registry = tracing_subscriber::registry().with(filter);
  match format {
    LogFormat::Json => registry
      .with(tracing_subscriber::fmt::layer().json().with_writer(std::io::stderr))
      .init(),
    LogFormat::Text => registry
      .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
      .init(),
  }
}

async fn compose(orchestrator_file: &Path, units_dir: &Path) -> Result<Workflow> {
  let def = load_orchestrator(orchestrator_file).with_context(|| {
    format!(
      "failed to load orchestrator: {}",
      orchestrator_file.display()
    )
  })?;

  let resolver = StandardResolver::new(FsUnitRegistry::new(units_dir));
  resolver
    .resolve(def)
    .await
    .with_context(|| format!("failed to compose {}", orchestrator_file.display()))
}

async fn lint(orchestrator_file: &Path, units_dir: &Path) -> Result<()> {
  let workflow = compose(orchestrator_file, units_dir).await?;
  println!(
    "{}: ok ({} nodes, {} edges)",
    workflow.name,
    workflow.nodes.len(),
    workflow.edges.len()
  );
  Ok(())
}

async fn plan(orchestrator_file: &Path, units_dir: &Path, trigger: Option<Trigger>) -> Result<()> {
  let workflow = compose(orchestrator_file, units_dir).await?;
  let selected = match &trigger {
    Some(trigger) => Some(
      workflow
        .select(trigger)
        .with_context(|| format!("no trigger accepts {}", trigger))?,
    ),
    None => None,
  };

  for node_id in workflow.topological_order()? {
    if selected.as_ref().is_some_and(|s| !s.contains(&node_id)) {
      continue;
    }
    let Some(node) = workflow.get_node(&node_id) else {
      continue;
    };
    if node.needs.is_empty() {
      println!("{} ({})", node_id, node.unit);
    } else {
      println!("{} ({}) <- {}", node_id, node.unit, node.needs.join(", "));
    }
  }
  Ok(())
}

async fn run(
  orchestrator_file: &Path,
  units_dir: &Path,
  trigger: Trigger,
  node: Option<String>,
  keep_work_dirs: bool,
  data_dir: &Path,
) -> Result<()> {
  let workflow = compose(orchestrator_file, units_dir).await?;
  eprintln!(
    "Resolved {} with {} nodes",
    workflow.name,
    workflow.nodes.len()
  );

  let store: Arc<dyn Store> = Arc::new(FsStore::new(data_dir.join("artifacts")));
  let config = RuntimeConfig {
    work_dir: data_dir.join("work"),
    keep_work_dirs,
    ..RuntimeConfig::default()
  };
  let runtime = Runtime::new(workflow, config, store, Arc::new(ShellExecutor::new()))
    .with_secrets(Arc::new(EnvSecretProvider));

  let cancel = CancellationToken::new();
  let on_interrupt = cancel.clone();
  tokio::spawn(async move {
    if tokio::signal::ctrl_c().await.is_ok() {
      warn!("interrupt received, cancelling run");
      on_interrupt.cancel();
    }
  });

  if let Some(node_id) = node {
    let result = runtime
      .invoke_node(&node_id, cancel)
      .await
      .context("node execution failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    if result.status != weft_runtime::NodeStatus::Succeeded {
      bail!(
        "node '{}' {}: {}",
        node_id,
        result.status,
        result.message.unwrap_or_default()
      );
    }
    return Ok(());
  }

  let report = runtime
    .invoke(trigger, cancel)
    .await
    .context("run could not start")?;

  eprintln!("Execution {}: {}", report.execution_id, report.status);
  println!("{}", serde_json::to_string_pretty(&report)?);
  report.ensure_success()?;
  Ok(())
}

async fn purge(data_dir: &Path) -> Result<()> {
  let store = FsStore::new(data_dir.join("artifacts"));
  let purged = store
    .purge_expired(chrono::Utc::now())
    .await
    .context("failed to purge artifacts")?;
  for name in &purged {
    println!("purged {}", name);
  }
  eprintln!("Purged {} artifacts", purged.len());
  Ok(())
}

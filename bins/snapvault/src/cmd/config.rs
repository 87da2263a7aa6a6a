use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};
use serde::Deserialize;

use snapvault_engine::{EngineConfig, SchedulerConfig};

use super::error::CliError;
use super::fetch::SourceConfig;
use super::gate::GateConfig;

// ═══════════════════════════════════════════════════════════════
//  CLI args
// ═══════════════════════════════════════════════════════════════

#[derive(Parser)]
#[command(name = "snapvault", about = "Periodic JSON snapshots into a time-indexed file store")]
pub struct Cli {
    /// Path to the TOML config file
    #[arg(long, global = true, default_value = "snapvault.toml", env = "SNAPVAULT_CONFIG")]
    pub config: String,

    /// Snapshot directory (overrides `data_dir`)
    #[arg(long, global = true, env = "SNAPVAULT_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Poll the source and persist snapshots until Ctrl+C
    Run(RunArgs),
    /// Read snapshots from the store and print them as JSON
    Query(QueryArgs),
}

#[derive(Args, Clone, Debug)]
pub struct RunArgs {
    /// Milliseconds between polls (0 = poll once)
    #[arg(long)]
    pub cadence_ms: Option<i64>,

    /// Persist every Nth poll (0 = never)
    #[arg(long)]
    pub persist_every: Option<i64>,

    /// Source URL (overrides `source.url`)
    #[arg(long)]
    pub url: Option<String>,

    /// Run a single capture inline and exit
    #[arg(long)]
    pub once: bool,
}

#[derive(Args, Clone, Debug)]
pub struct QueryArgs {
    #[command(subcommand)]
    pub mode: QueryMode,
}

#[derive(Subcommand, Clone, Debug)]
pub enum QueryMode {
    /// Every stored snapshot
    All,
    /// The snapshot taken at exactly this second
    At { at: String },
    /// Snapshots between two instants, inclusive
    Range { from: String, to: String },
    /// The N most recent snapshots
    Last { count: i64 },
    /// The most recent snapshot
    Latest,
}

// ═══════════════════════════════════════════════════════════════
//  Config file (TOML)
// ═══════════════════════════════════════════════════════════════

#[derive(Debug, Default, Deserialize)]
pub struct FileConfig {
    pub data_dir: Option<PathBuf>,
    #[serde(default)]
    pub scheduler: SchedulerConfig,
    pub source: Option<SourceConfig>,
    pub gate: Option<GateConfig>,
}

impl FileConfig {
    pub fn load(path: &str) -> Result<Self, CliError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::Config(format!("cannot read config {path}: {e}")))?;
        Self::parse(&content).map_err(|e| match e {
            CliError::Config(msg) => CliError::Config(format!("bad config {path}: {msg}")),
            other => other,
        })
    }

    pub fn parse(toml_str: &str) -> Result<Self, CliError> {
        toml::from_str(toml_str).map_err(|e| CliError::Config(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════
//  Effective — merged config
// ═══════════════════════════════════════════════════════════════

/// Final configuration: config file < env/CLI.
#[derive(Debug)]
pub struct Effective {
    pub engine: EngineConfig,
    pub source: Option<SourceConfig>,
    pub gate: Option<GateConfig>,
}

impl Effective {
    pub fn new(cli: &Cli) -> Result<Self, CliError> {
        let cfg = match FileConfig::load(&cli.config) {
            Ok(c) => c,
            Err(e) => {
                if std::path::Path::new(&cli.config).exists() {
                    return Err(e);
                }
                tracing::debug!(config = %cli.config, "config file not found, using defaults");
                FileConfig::default()
            }
        };
        let run = match &cli.command {
            Commands::Run(args) => Some(args),
            Commands::Query(_) => None,
        };
        Ok(Self::merge(cfg, cli.data_dir.clone(), run))
    }

    fn merge(cfg: FileConfig, data_dir: Option<PathBuf>, run: Option<&RunArgs>) -> Self {
        let mut scheduler = cfg.scheduler;
        let mut source = cfg.source;

        if let Some(args) = run {
            if let Some(ms) = args.cadence_ms {
                scheduler.cadence_ms = ms;
            }
            if let Some(every) = args.persist_every {
                scheduler.persist_every = every;
            }
            if let Some(ref url) = args.url {
                match source.as_mut() {
                    Some(s) => s.url = url.clone(),
                    None => source = Some(SourceConfig::from_url(url.clone())),
                }
            }
        }

        Self {
            engine: EngineConfig {
                data_dir: data_dir
                    .or(cfg.data_dir)
                    .unwrap_or_else(|| EngineConfig::default().data_dir),
                scheduler,
            },
            source,
            gate: cfg.gate,
        }
    }
}

//! Command-line arguments and configuration resolution

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use tracing::info;

use ceremony_core::{HarnessConfig, CONFIG_ENV};

/// Config file used when neither `--config` nor the environment names one
pub const DEFAULT_CONFIG_FILE: &str = "ceremony-harness.toml";

/// Ceremony harness - bootstrap a threshold beacon group in one process
#[derive(Parser, Debug)]
#[command(name = "ceremony-harness")]
#[command(about = "Run barrier-synchronized beacon ceremonies in-process", long_about = None)]
#[command(version)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,

    /// Path to the TOML configuration file
    #[arg(long, global = true)]
    pub config: Option<PathBuf>,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run every instance of a ceremony and report the outcome
    Run(RunArgs),

    /// Write the default configuration file
    InitConfig {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Overrides applied on top of the configuration file
#[derive(Args, Debug, Default, Clone)]
pub struct RunArgs {
    /// Number of instances
    #[arg(short = 'n', long)]
    pub instances: Option<usize>,

    /// Output period in seconds
    #[arg(long)]
    pub period_secs: Option<u64>,

    /// Global run deadline in seconds
    #[arg(long)]
    pub timeout_secs: Option<u64>,

    /// Where to write exported metric points (`.lp` selects line protocol)
    #[arg(long)]
    pub metrics_out: Option<PathBuf>,

    /// Root directory for per-instance state
    #[arg(long)]
    pub workdir: Option<PathBuf>,
}

impl RunArgs {
    /// Apply every given override to `config`
    pub fn apply(&self, config: &mut HarnessConfig) {
        if let Some(instances) = self.instances {
            config.instances = instances;
        }
        if let Some(period) = self.period_secs {
            config.period_secs = period;
        }
        if let Some(timeout) = self.timeout_secs {
            config.timeout_secs = timeout;
        }
        if let Some(path) = &self.metrics_out {
            config.metrics_file = path.clone();
        }
        if let Some(workdir) = &self.workdir {
            config.workdir = workdir.clone();
        }
    }
}

/// Config path from the flag, then the environment, then the default
pub fn config_path(flag: Option<&Path>) -> PathBuf {
    flag.map(Path::to_path_buf)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

/// Load the config at `path`, writing the defaults there first if missing
pub fn load_or_create(path: &Path) -> Result<HarnessConfig> {
    if path.exists() {
        return HarnessConfig::load(path)
            .with_context(|| format!("Failed to load config from {:?}", path));
    }

    let config = HarnessConfig::default();
    config
        .save(path)
        .with_context(|| format!("Failed to write default config to {:?}", path))?;
    info!("Created default config at {:?}", path);
    Ok(config)
}

/// Write the default config; refuses to overwrite unless `force`
pub fn init_config(path: &Path, force: bool) -> Result<()> {
    if path.exists() && !force {
        anyhow::bail!("{:?} already exists (use --force to overwrite)", path);
    }
    HarnessConfig::default()
        .save(path)
        .with_context(|| format!("Failed to write config to {:?}", path))?;
    println!("Wrote default configuration to {}", path.display());
    Ok(())
}

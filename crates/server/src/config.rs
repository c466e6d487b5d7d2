use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::Parser;
use orchestrator::PipelineConfig;
use serde::{Deserialize, Serialize};
use store::{JsonFileStore, MemoryStore, SessionStore, SqliteStore, StoreError};
use tokio::fs;
use tracing::{debug, info, warn};

pub const CONFIG_FILE: &str = "insights.toml";
pub const DEFAULT_PORT: u16 = 3001;
const DATABASE_FILE: &str = "insights.db";

/// Where sessions are persisted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum StoreKind {
    #[default]
    #[value(alias = "json")]
    File,
    Sqlite,
    Memory,
}

/// Command line, with each override also readable from an `INSIGHTS_*` variable.
#[derive(Parser, Debug, Default)]
#[command(name = "insights-server", version, about = "Restaurant insights pipeline server")]
pub struct ServerArgs {
    /// Path to the TOML configuration file
    #[arg(short, long, env = "INSIGHTS_CONFIG", default_value = CONFIG_FILE)]
    pub config: PathBuf,

    #[arg(long, env = "INSIGHTS_HOST")]
    pub host: Option<String>,

    #[arg(short, long, env = "INSIGHTS_PORT")]
    pub port: Option<u16>,

    /// Directory holding session records
    #[arg(long, env = "INSIGHTS_DATA_DIR")]
    pub data_dir: Option<PathBuf>,

    #[arg(long, env = "INSIGHTS_STORE", value_enum, ignore_case = true)]
    pub store: Option<StoreKind>,
}

/// Pipeline tuning read from the `[pipeline]` table.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineSettings {
    pub forecast_horizon_days: u32,
    pub progress_channel_capacity: usize,
    pub visual_gap_threshold: f64,
    pub persist_skips: bool,
}

impl Default for PipelineSettings {
    fn default() -> Self {
        let defaults = PipelineConfig::default();
        Self {
            forecast_horizon_days: defaults.forecast_horizon_days,
            progress_channel_capacity: defaults.progress_channel_capacity,
            visual_gap_threshold: defaults.visual_gap_threshold,
            persist_skips: defaults.persist_skips,
        }
    }
}

impl PipelineSettings {
    pub fn to_pipeline_config(&self) -> PipelineConfig {
        PipelineConfig::new()
            .with_forecast_horizon(self.forecast_horizon_days)
            .with_channel_capacity(self.progress_channel_capacity)
            .with_visual_gap_threshold(self.visual_gap_threshold)
            .with_persist_skips(self.persist_skips)
    }
}

/// Server settings from `insights.toml`, overridden by [`ServerArgs`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
    pub data_dir: PathBuf,
    pub store: StoreKind,
    pub pipeline: PipelineSettings,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "0.0.0.0".to_string(),
            port: DEFAULT_PORT,
            data_dir: PathBuf::from(".insights"),
            store: StoreKind::default(),
            pipeline: PipelineSettings::default(),
        }
    }
}

impl ServerConfig {
    /// Reads `path`, falling back to defaults when it is missing or invalid.
    pub async fn read(path: &Path) -> Self {
        if !path.exists() {
            debug!(path = %path.display(), "Config file does not exist, using defaults");
            return Self::default();
        }

        match fs::read_to_string(path).await {
            Ok(content) => match toml::from_str(&content) {
                Ok(config) => {
                    debug!(path = %path.display(), "Config loaded successfully");
                    config
                }
                Err(e) => {
                    warn!(path = %path.display(), error = %e, "Failed to parse config, using defaults");
                    Self::default()
                }
            },
            Err(e) => {
                warn!(path = %path.display(), error = %e, "Failed to read config file, using defaults");
                Self::default()
            }
        }
    }

    /// Layers command-line flags and `INSIGHTS_*` variables over the file.
    pub fn with_args(mut self, args: &ServerArgs) -> Self {
        if let Some(host) = &args.host {
            self.host = host.clone();
        }
        if let Some(port) = args.port {
            self.port = port;
        }
        if let Some(data_dir) = &args.data_dir {
            self.data_dir = data_dir.clone();
        }
        if let Some(store) = args.store {
            self.store = store;
        }
        self
    }

    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }

    pub async fn open_store(&self) -> Result<Arc<dyn SessionStore>, StoreError> {
        let store: Arc<dyn SessionStore> = match self.store {
            StoreKind::File => Arc::new(JsonFileStore::open(&self.data_dir).await?),
            StoreKind::Sqlite => {
                fs::create_dir_all(&self.data_dir).await?;
                let url = format!("sqlite:{}", self.data_dir.join(DATABASE_FILE).display());
                Arc::new(SqliteStore::connect(&url).await?)
            }
            StoreKind::Memory => Arc::new(MemoryStore::new()),
        };
        info!(backend = ?self.store, data_dir = %self.data_dir.display(), "Session store ready");
        Ok(store)
    }
}

//! cloudfit.toml configuration parser.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Hard ceiling on retained runner-up placements.
pub const MAX_ALTERNATIVES: usize = 5;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CloudfitConfig {
    pub store: Option<StoreConfig>,
    pub optimizer: Option<OptimizerConfig>,
    pub logging: Option<LoggingConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// redb file holding resource state. Omitted means in-memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OptimizerConfig {
    pub max_alternatives: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// `tracing_subscriber::EnvFilter` directive string.
    pub filter: Option<String>,
    pub json: Option<bool>,
}

impl CloudfitConfig {
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: CloudfitConfig = toml::from_str(&content)?;
        Ok(config)
    }

    pub fn to_toml_string(&self) -> anyhow::Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Scaffold a cloudfit.toml storing state under `data_dir`.
    pub fn scaffold(data_dir: &Path) -> Self {
        CloudfitConfig {
            store: Some(StoreConfig {
                path: Some(data_dir.join("state.redb")),
            }),
            optimizer: Some(OptimizerConfig {
                max_alternatives: Some(MAX_ALTERNATIVES),
            }),
            logging: Some(LoggingConfig {
                filter: Some("cloudfit=info".to_string()),
                json: Some(false),
            }),
        }
    }

    pub fn store_path(&self) -> Option<&Path> {
        self.store.as_ref().and_then(|s| s.path.as_deref())
    }

    /// Configured alternatives cap, clamped to [`MAX_ALTERNATIVES`].
    pub fn max_alternatives(&self) -> usize {
        self.optimizer
            .as_ref()
            .and_then(|o| o.max_alternatives)
            .unwrap_or(MAX_ALTERNATIVES)
            .min(MAX_ALTERNATIVES)
    }

    pub fn log_filter(&self) -> &str {
        self.logging
            .as_ref()
            .and_then(|l| l.filter.as_deref())
            .unwrap_or("cloudfit=info")
    }

    pub fn log_json(&self) -> bool {
        self.logging.as_ref().and_then(|l| l.json).unwrap_or(false)
    }
}

pub mod init;
pub mod place;
pub mod resource;

use std::path::Path;

use anyhow::Context;
use cloudfit_core::{CloudfitConfig, ResourceRequirement};
use cloudfit_service::PlacementService;
use serde::Serialize;

/// Config file picked up from the working directory when `--config` is absent.
pub const DEFAULT_CONFIG: &str = "cloudfit.toml";

/// Load `path`, or `./cloudfit.toml` when present, or built-in defaults.
pub fn load_config(path: Option<&Path>) -> anyhow::Result<CloudfitConfig> {
    match path {
        Some(path) => CloudfitConfig::from_file(path)
            .with_context(|| format!("reading config {}", path.display())),
        None => {
            let default = Path::new(DEFAULT_CONFIG);
            if default.is_file() {
                CloudfitConfig::from_file(default)
                    .with_context(|| format!("reading config {}", default.display()))
            } else {
                Ok(CloudfitConfig::default())
            }
        }
    }
}

pub fn open_service(config: &CloudfitConfig) -> anyhow::Result<PlacementService> {
    if config.store_path().is_none() {
        tracing::warn!("no [store] path configured; state will not outlive this command");
    }
    Ok(PlacementService::from_config(config)?)
}

pub fn read_requirement(path: &Path) -> anyhow::Result<ResourceRequirement> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing requirement {}", path.display()))
}

pub fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

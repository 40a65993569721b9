use std::path::Path;

use anyhow::bail;
use cloudfit_core::CloudfitConfig;

use super::DEFAULT_CONFIG;

pub fn init(config_path: Option<&Path>, data_dir: &Path, force: bool) -> anyhow::Result<()> {
    let output = config_path.unwrap_or(Path::new(DEFAULT_CONFIG));
    if output.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", output.display());
    }

    std::fs::create_dir_all(data_dir)?;
    let config = CloudfitConfig::scaffold(data_dir);
    std::fs::write(output, config.to_toml_string()?)?;
    println!("✓ Generated {}", output.display());
    Ok(())
}

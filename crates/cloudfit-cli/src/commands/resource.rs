use std::path::Path;

use anyhow::{Context, bail};
use cloudfit_core::CloudfitConfig;
use cloudfit_state::ImportMode;

use super::{open_service, print_json};

pub fn get(config: &CloudfitConfig, id: &str) -> anyhow::Result<()> {
    let service = open_service(config)?;
    print_json(&service.get(id)?)
}

pub fn list(config: &CloudfitConfig) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let states = service.list();
    if states.is_empty() {
        eprintln!("No resources recorded.");
        return Ok(());
    }
    for state in &states {
        println!(
            "{}  {:<9} v{:<3} {}  ${:.2}/mo",
            state.id,
            state.resource_type.as_str(),
            state.version,
            state.placement.selected.candidate.label(),
            state.placement.selected.candidate.monthly_cost,
        );
    }
    Ok(())
}

pub fn delete(
    config: &CloudfitConfig,
    id: &str,
    expected_version: Option<u64>,
    force: bool,
) -> anyhow::Result<()> {
    let service = open_service(config)?;
    match expected_version {
        Some(version) => service.remove_at(id, version, force)?,
        None => service.remove(id, force)?,
    }
    println!("✓ Deleted {id}");
    Ok(())
}

pub fn export(config: &CloudfitConfig, id: &str, out: Option<&Path>) -> anyhow::Result<()> {
    let service = open_service(config)?;
    let bytes = service.export(id)?;
    match out {
        Some(path) => {
            std::fs::write(path, &bytes).with_context(|| format!("writing {}", path.display()))?;
            println!("✓ Exported {id} to {}", path.display());
        }
        None => println!("{}", String::from_utf8_lossy(&bytes)),
    }
    Ok(())
}

pub fn import(config: &CloudfitConfig, file: &Path, fresh_id: bool) -> anyhow::Result<()> {
    let bytes = std::fs::read(file).with_context(|| format!("reading {}", file.display()))?;
    let mode = if fresh_id {
        ImportMode::FreshId
    } else {
        ImportMode::Preserve
    };
    let service = open_service(config)?;
    print_json(&service.import(&bytes, mode)?)
}

pub fn refresh(config: &CloudfitConfig, id: Option<&str>) -> anyhow::Result<()> {
    let service = open_service(config)?;
    if let Some(id) = id {
        let state = service.refresh(id)?;
        println!("✓ {id} is consistent (v{})", state.version);
        return Ok(());
    }

    let drift = service.refresh_all();
    if drift.is_empty() {
        println!("✓ {} resources consistent", service.list().len());
        return Ok(());
    }
    print_json(&drift)?;
    bail!("{} resources drifted", drift.len())
}

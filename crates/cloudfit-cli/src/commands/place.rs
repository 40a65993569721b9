use std::collections::BTreeSet;
use std::path::Path;

use anyhow::Context;
use cloudfit_core::{Candidate, CloudfitConfig};
use cloudfit_placement::{CandidateCatalog, StaticCatalog};
use cloudfit_service::ServiceError;
use tracing::info;

use super::{open_service, print_json, read_requirement};

/// Load a candidate file. Malformed offerings are dropped with a warning
/// rather than failing the whole run.
pub fn read_catalog(path: &Path) -> anyhow::Result<StaticCatalog> {
    let bytes = std::fs::read(path).with_context(|| format!("reading {}", path.display()))?;
    let candidates: Vec<Candidate> = serde_json::from_slice(&bytes)
        .with_context(|| format!("parsing candidates {}", path.display()))?;
    let catalog = StaticCatalog::lenient(candidates);
    info!(path = %path.display(), candidates = catalog.len(), "catalog loaded");
    Ok(catalog)
}

pub fn place(
    config: &CloudfitConfig,
    requirement: &Path,
    candidates: &Path,
    depends_on: Vec<String>,
    dry_run: bool,
) -> anyhow::Result<()> {
    let req = read_requirement(requirement)?;
    let catalog = read_catalog(candidates)?;
    let service = open_service(config)?;

    if dry_run {
        let placement = service.plan(&req, &catalog.candidates_for(&req))?;
        return print_json(&placement);
    }

    let deps: BTreeSet<String> = depends_on.into_iter().collect();
    match service.place_from_catalog(&req, &catalog, deps) {
        Ok(state) => print_json(&state),
        Err(ServiceError::Persist { placement, source }) => {
            eprintln!("Placement computed but not recorded: {source}");
            print_json(&placement)?;
            Err(source.into())
        }
        Err(e) => Err(e.into()),
    }
}

pub fn replace(
    config: &CloudfitConfig,
    id: &str,
    requirement: &Path,
    candidates: &Path,
    expected_version: u64,
) -> anyhow::Result<()> {
    let req = read_requirement(requirement)?;
    let catalog = read_catalog(candidates)?;
    let service = open_service(config)?;

    match service.replace(id, &req, &catalog.candidates_for(&req), expected_version) {
        Ok(state) => print_json(&state),
        Err(e) if e.is_conflict() => {
            eprintln!("{id} changed since version {expected_version}; re-read it with `cloudfit get {id}` and retry");
            Err(e.into())
        }
        Err(e) => Err(e.into()),
    }
}

//! Batch resolution over a directory of scenarios
//!
//! Discovery walks the tree with jwalk; resolution fans out over rayon.
//! Results come back sorted by path so a batch run prints the same way
//! every time.

use crate::core::card::CardCatalog;
use crate::core::character::PowerTable;
use crate::game::engine::{resolve_beats, ResolveContext, ResolveOutput};
use crate::loader::scenario::load_scenario_sync;
use crate::{ClashError, Result};
use rayon::prelude::*;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

/// Every `*.json` file under `dir`, sorted
pub fn discover_scenarios(dir: &Path) -> Result<Vec<PathBuf>> {
    if !dir.is_dir() {
        return Err(ClashError::ParseError(format!("not a directory: {}", dir.display())));
    }
    let mut paths = Vec::new();
    for entry in jwalk::WalkDir::new(dir).skip_hidden(true) {
        let entry = entry.map_err(|e| ClashError::IoError(std::io::Error::other(e.to_string())))?;
        if !entry.file_type().is_file() {
            continue;
        }
        let path = entry.path();
        if path.extension().is_some_and(|ext| ext == "json") {
            paths.push(path);
        }
    }
    paths.sort();
    Ok(paths)
}

/// Outcome of one scenario in a batch
#[derive(Debug)]
pub struct BatchResult {
    pub path: PathBuf,
    pub output: Result<ResolveOutput>,
}

impl BatchResult {
    pub fn is_ok(&self) -> bool {
        self.output.is_ok()
    }
}

#[derive(Debug)]
pub struct BatchReport {
    pub results: Vec<BatchResult>,
    pub elapsed: Duration,
}

impl BatchReport {
    pub fn failures(&self) -> impl Iterator<Item = &BatchResult> {
        self.results.iter().filter(|result| !result.is_ok())
    }

    /// Number of scenarios still waiting on a player decision
    pub fn halted(&self) -> usize {
        self.results
            .iter()
            .filter_map(|result| result.output.as_ref().ok())
            .filter(|output| output.pending_interactions().next().is_some())
            .count()
    }
}

/// Load and resolve every path in parallel
pub fn resolve_paths(paths: &[PathBuf], catalog: &CardCatalog, powers: &PowerTable) -> BatchReport {
    let start = Instant::now();
    let results = paths
        .par_iter()
        .map(|path| {
            let output = load_scenario_sync(path)
                .map(|scenario| resolve_beats(scenario.input, ResolveContext::new(catalog, powers)));
            BatchResult {
                path: path.clone(),
                output,
            }
        })
        .collect();
    BatchReport {
        results,
        elapsed: start.elapsed(),
    }
}

pub fn resolve_directory(dir: &Path, catalog: &CardCatalog, powers: &PowerTable) -> Result<BatchReport> {
    let paths = discover_scenarios(dir)?;
    Ok(resolve_paths(&paths, catalog, powers))
}

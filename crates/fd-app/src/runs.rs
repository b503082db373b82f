//! Access to stored runs in a model's results database.

use std::path::Path;

use fd_results::{ResponseHistory, ResultsDatabase, RunManifest};

use crate::error::{AppError, AppResult};

/// Runs stored for the model at `model_path`, oldest first.
pub fn list_runs(model_path: &Path) -> AppResult<Vec<RunManifest>> {
    let database = ResultsDatabase::for_model(model_path)?;
    Ok(database.list_runs()?)
}

pub fn load_run(model_path: &Path, run_id: &str) -> AppResult<(RunManifest, ResponseHistory)> {
    let database = ResultsDatabase::for_model(model_path)?;
    let manifest = database.load_manifest(run_id)?;
    let history = database.load_history(run_id)?;
    Ok((manifest, history))
}

/// Write a stored run as an ASCII response table; returns the row count.
pub fn export_run(model_path: &Path, run_id: &str, output: &Path) -> AppResult<usize> {
    let (_manifest, history) = load_run(model_path, run_id)?;
    std::fs::write(output, history.to_table().to_ascii()).map_err(|e| AppError::FileWrite {
        path: output.to_path_buf(),
        source: e,
    })?;
    Ok(history.len())
}

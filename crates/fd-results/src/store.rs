//! Results database: one directory per run next to the model file.

use crate::history::{ResponseHistory, ResponseRow};
use crate::types::RunManifest;
use crate::{ResultsError, ResultsResult};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Clone, Debug)]
pub struct ResultsDatabase {
    root_dir: PathBuf,
}

impl ResultsDatabase {
    pub fn new(root_dir: PathBuf) -> ResultsResult<Self> {
        if !root_dir.exists() {
            fs::create_dir_all(&root_dir)?;
        }
        Ok(Self { root_dir })
    }

    /// Database for `model_path`: `<dir>/<stem>_RDB`.
    pub fn for_model(model_path: &Path) -> ResultsResult<Self> {
        let stem = model_path
            .file_stem()
            .ok_or_else(|| ResultsError::InvalidPath {
                message: format!("model path {} has no file name", model_path.display()),
            })?;
        let parent = model_path.parent().unwrap_or_else(|| Path::new("."));
        let dir = parent.join(format!("{}_RDB", stem.to_string_lossy()));
        Self::new(dir)
    }

    pub fn root_dir(&self) -> &Path {
        &self.root_dir
    }

    fn run_dir(&self, run_id: &str) -> PathBuf {
        self.root_dir.join(run_id)
    }

    pub fn save_run(&self, manifest: &RunManifest, history: &ResponseHistory) -> ResultsResult<()> {
        let run_dir = self.run_dir(&manifest.run_id);
        fs::create_dir_all(&run_dir)?;

        let manifest_json = serde_json::to_string_pretty(manifest)?;
        fs::write(run_dir.join("manifest.json"), manifest_json)?;

        let mut content = String::new();
        for row in history.rows() {
            content.push_str(&serde_json::to_string(row)?);
            content.push('\n');
        }
        fs::write(run_dir.join("response.jsonl"), content)?;

        Ok(())
    }

    pub fn load_manifest(&self, run_id: &str) -> ResultsResult<RunManifest> {
        let manifest_path = self.run_dir(run_id).join("manifest.json");

        if !manifest_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(manifest_path)?;
        Ok(serde_json::from_str(&content)?)
    }

    pub fn load_history(&self, run_id: &str) -> ResultsResult<ResponseHistory> {
        let manifest = self.load_manifest(run_id)?;
        let response_path = self.run_dir(run_id).join("response.jsonl");

        if !response_path.exists() {
            return Err(ResultsError::RunNotFound {
                run_id: run_id.to_string(),
            });
        }

        let content = fs::read_to_string(response_path)?;
        let mut rows = Vec::new();
        for line in content.lines() {
            if !line.trim().is_empty() {
                let row: ResponseRow = serde_json::from_str(line)?;
                rows.push(row);
            }
        }

        Ok(ResponseHistory::from_parts(manifest.function_ids, rows))
    }

    pub fn list_runs(&self) -> ResultsResult<Vec<RunManifest>> {
        let mut runs = Vec::new();

        if !self.root_dir.exists() {
            return Ok(runs);
        }

        for entry in fs::read_dir(&self.root_dir)? {
            let entry = entry?;
            if entry.path().is_dir() {
                let run_id = entry.file_name().to_string_lossy().to_string();
                if let Ok(manifest) = self.load_manifest(&run_id) {
                    runs.push(manifest);
                }
            }
        }

        runs.sort_by(|a, b| a.timestamp.cmp(&b.timestamp));
        Ok(runs)
    }
}

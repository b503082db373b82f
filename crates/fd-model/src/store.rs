//! Model store: loading, write-back and re-run preparation.

use std::path::{Path, PathBuf};

use tracing::{debug, info};

use crate::schema::{ModelDef, ResultsDef};
use crate::validate::validate_model;
use crate::{ModelError, ModelResult};

/// A model held in memory for the lifetime of a solver session.
#[derive(Debug, Clone)]
pub struct Model {
    path: PathBuf,
    def: ModelDef,
    pending_results: Option<ResultsDef>,
}

impl Model {
    /// Wrap an in-memory definition. The path is where `save_model` writes by
    /// default.
    pub fn from_def(path: impl Into<PathBuf>, def: ModelDef) -> ModelResult<Self> {
        validate_model(&def)?;
        Ok(Self {
            path: path.into(),
            def,
            pending_results: None,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn def(&self) -> &ModelDef {
        &self.def
    }

    /// Results computed in this session that have not been written yet.
    pub fn has_unsaved_results(&self) -> bool {
        self.pending_results.is_some()
    }

    /// Results as of the last write-back (or as loaded from disk).
    pub fn stored_results(&self) -> Option<&ResultsDef> {
        self.def.results.as_ref()
    }

    /// Newest results known for this model, saved or not.
    pub fn latest_results(&self) -> Option<&ResultsDef> {
        self.pending_results.as_ref().or(self.def.results.as_ref())
    }

    /// Attach freshly computed results; they reach the file on the next
    /// `save_model(.., true)`.
    pub fn record_results(&mut self, results: ResultsDef) {
        self.pending_results = Some(results);
    }
}

/// Load and validate a model file.
pub fn load_model(path: &Path) -> ModelResult<Model> {
    if !path.exists() {
        return Err(ModelError::NotFound {
            path: path.to_path_buf(),
        });
    }

    let content = std::fs::read_to_string(path).map_err(|e| ModelError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    let def: ModelDef = serde_yaml::from_str(&content).map_err(|e| ModelError::Parse {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    validate_model(&def)?;

    info!(
        path = %path.display(),
        dofs = def.dofs.len(),
        sensors = def.sensors.len(),
        "loaded model"
    );

    Ok(Model {
        path: path.to_path_buf(),
        def,
        pending_results: None,
    })
}

/// Write the model to `path`.
///
/// With `overwrite_results` the pending results replace the results section;
/// otherwise the structural data and whatever results were already stored
/// are written unchanged. On failure the in-memory model is untouched.
pub fn save_model(model: &mut Model, path: &Path, overwrite_results: bool) -> ModelResult<()> {
    let mut def = model.def.clone();
    if overwrite_results && let Some(pending) = &model.pending_results {
        def.results = Some(pending.clone());
    }

    let content = serde_yaml::to_string(&def)?;
    std::fs::write(path, content).map_err(|e| ModelError::Io {
        path: path.to_path_buf(),
        source: e,
    })?;

    if overwrite_results {
        model.def = def;
        model.pending_results = None;
    }

    debug!(path = %path.display(), overwrite_results, "saved model");
    Ok(())
}

/// Drop any unsaved results so the model can be solved again from its start
/// time without reloading.
pub fn reset_for_rerun(model: &mut Model) {
    model.pending_results = None;
}

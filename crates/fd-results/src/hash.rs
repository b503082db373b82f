//! Content-based hashing for run IDs.

use fd_model::ModelDef;
use sha2::{Digest, Sha256};

use crate::history::ResponseHistory;

/// Hash of the model's structure, the solver version and the recorded
/// response.
///
/// The results section is excluded, so writing results back into a model
/// does not change the id of its next run. Runs of one model that respond
/// differently (other initial conditions or external inputs) get distinct
/// ids; identical runs share one.
pub fn compute_run_id(
    model: &ModelDef,
    solver_version: &str,
    history: &ResponseHistory,
) -> String {
    let mut structural = model.clone();
    structural.results = None;

    let mut hasher = Sha256::new();
    let model_json = serde_json::to_string(&structural).unwrap_or_default();
    hasher.update(model_json.as_bytes());
    hasher.update(solver_version.as_bytes());

    for id in history.function_ids() {
        hasher.update(id.to_le_bytes());
    }
    for row in history.rows() {
        hasher.update(row.time.to_bits().to_le_bytes());
        for value in &row.values {
            hasher.update(value.to_bits().to_le_bytes());
        }
    }

    let result = hasher.finalize();
    format!("{:x}", result)
}

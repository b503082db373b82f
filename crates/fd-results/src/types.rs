//! Result data types.

use serde::{Deserialize, Serialize};

pub type RunId = String;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct RunManifest {
    pub run_id: RunId,
    pub model_name: String,
    pub timestamp: String,
    pub solver_version: String,
    pub function_ids: Vec<u32>,
    pub steps: usize,
    pub final_time: f64,
    /// 0 for a clean completion, otherwise the integrator's error code.
    pub error_code: i32,
}

//! Error types for the fd-app session layer.

use std::path::PathBuf;

use fd_model::ModelError;
use fd_sim::{SimError, codes};

/// Unified error for the session layer and its front ends.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    #[error("Model error: {0}")]
    Model(#[from] ModelError),

    #[error("Simulation error: {0}")]
    Simulation(#[from] SimError),

    #[error("Results error: {0}")]
    Results(String),

    #[error("No model is open in this session")]
    NoModel,

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Failed to write {path}")]
    FileWrite {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl AppError {
    /// Integer code for exit statuses and polling callers.
    pub fn code(&self) -> i32 {
        match self {
            AppError::Simulation(e) => e.code(),
            AppError::Model(ModelError::NotFound { .. } | ModelError::Io { .. }) => codes::IO,
            AppError::Model(_) => codes::INVALID_MODEL,
            AppError::NoModel => codes::NOT_INITIALIZED,
            AppError::InvalidInput(_) => codes::INVALID_ARG,
            AppError::Results(_) | AppError::FileWrite { .. } => codes::IO,
        }
    }
}

/// Result type for fd-app operations.
pub type AppResult<T> = Result<T, AppError>;

impl From<fd_results::ResultsError> for AppError {
    fn from(err: fd_results::ResultsError) -> Self {
        AppError::Results(err.to_string())
    }
}

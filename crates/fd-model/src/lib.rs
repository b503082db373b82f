//! fd-model: model file format, validation and the model store.

pub mod schema;
pub mod store;
pub mod validate;

pub use schema::*;
pub use store::{Model, load_model, reset_for_rerun, save_model};
pub use validate::{ValidationError, validate_model};

use std::path::PathBuf;

pub type ModelResult<T> = Result<T, ModelError>;

#[derive(thiserror::Error, Debug)]
pub enum ModelError {
    #[error("Model file not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Failed to parse model file {path}: {message}")]
    Parse { path: PathBuf, message: String },

    #[error("Invalid model: {0}")]
    Invalid(#[from] ValidationError),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

//! fd-results: reference tables, response histories and the results database.

pub mod compare;
pub mod hash;
pub mod history;
pub mod store;
pub mod table;
pub mod types;

pub use compare::{Comparison, compare_history, compare_lists};
pub use hash::compute_run_id;
pub use history::{ResponseHistory, ResponseRow};
pub use store::ResultsDatabase;
pub use table::AsciiTable;
pub use types::*;

pub type ResultsResult<T> = Result<T, ResultsError>;

#[derive(thiserror::Error, Debug)]
pub enum ResultsError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Malformed table at line {line}: {message}")]
    Table { line: usize, message: String },

    #[error("Run not found: {run_id}")]
    RunNotFound { run_id: String },

    #[error("Invalid path: {message}")]
    InvalidPath { message: String },
}

//! Error types for simulation operations.

use thiserror::Error;

use crate::forcing::ForcingError;

/// Stable integer codes reported through `TimeIntegrator::last_error`.
pub mod codes {
    pub const OK: i32 = 0;
    pub const NOT_INITIALIZED: i32 = 1;
    pub const UNKNOWN_FUNCTION_ID: i32 = 2;
    pub const NUMERICAL_DIVERGENCE: i32 = 3;
    pub const FORCING: i32 = 4;
    pub const INVALID_MODEL: i32 = 5;
    pub const INVALID_ARG: i32 = 6;
    /// Reported by session layers when persisting results fails.
    pub const IO: i32 = 7;
}

/// Errors encountered during transient simulation.
#[derive(Error, Debug)]
pub enum SimError {
    #[error("Integrator is not initialized")]
    NotInitialized,

    /// The integrator failed earlier and must be re-initialized.
    #[error("Integrator stopped after failure (code {code})")]
    Terminated { code: i32 },

    #[error("Unknown function id: {id}")]
    UnknownFunctionId { id: u32 },

    #[error("Numerical divergence at t = {time}: {what}")]
    NumericalDivergence { time: f64, what: String },

    #[error("Forcing evaluation failed at t = {time}: {source}")]
    Forcing {
        time: f64,
        #[source]
        source: ForcingError,
    },

    #[error("Invalid model: {what}")]
    InvalidModel { what: String },

    #[error("Invalid argument: {what}")]
    InvalidArg { what: &'static str },
}

impl SimError {
    pub fn code(&self) -> i32 {
        match self {
            SimError::NotInitialized => codes::NOT_INITIALIZED,
            SimError::Terminated { code } => *code,
            SimError::UnknownFunctionId { .. } => codes::UNKNOWN_FUNCTION_ID,
            SimError::NumericalDivergence { .. } => codes::NUMERICAL_DIVERGENCE,
            SimError::Forcing { .. } => codes::FORCING,
            SimError::InvalidModel { .. } => codes::INVALID_MODEL,
            SimError::InvalidArg { .. } => codes::INVALID_ARG,
        }
    }
}

pub type SimResult<T> = Result<T, SimError>;

impl From<fd_core::FdError> for SimError {
    fn from(e: fd_core::FdError) -> Self {
        SimError::InvalidModel {
            what: e.to_string(),
        }
    }
}

//! Session layer for fedyn.
//!
//! Ties the model store, the time integrator and the results database
//! together behind `SolverSession`, shared by the CLI and by embedding
//! applications that drive a simulation step by step.

pub mod check;
pub mod error;
pub mod progress;
pub mod runs;
pub mod session;

pub use check::{CheckReport, CheckRequest, check_against_reference};
pub use error::{AppError, AppResult};
pub use progress::{RunProgressEvent, SessionStage, StepProgress};
pub use runs::{export_run, list_runs, load_run};
pub use session::{RestartPolicy, SessionOptions, SolverSession};

//! Regression check of a model's response against reference data.

use std::path::Path;

use fd_results::{AsciiTable, Comparison, compare_history};
use fd_sim::ExternalFunctionProvider;
use tracing::{info, warn};

use crate::error::AppResult;
use crate::session::{SessionOptions, SolverSession};

/// Request to solve a model and compare it with a reference table.
pub struct CheckRequest<'a> {
    pub model_path: &'a Path,
    pub reference_path: &'a Path,
    /// Absolute tolerance per scalar.
    pub tolerance: f64,
    /// Reference rows to drop before comparing, e.g. a `t = start` line.
    pub skip_rows: usize,
    pub options: SessionOptions,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CheckReport {
    pub comparison: Comparison,
    pub error_code: i32,
}

impl CheckReport {
    /// Discrepancy count plus the magnitude of the run's error code.
    pub fn exit_code(&self) -> i32 {
        let discrepancies = i32::try_from(self.comparison.discrepancies).unwrap_or(i32::MAX);
        discrepancies.saturating_add(self.error_code.saturating_abs())
    }

    pub fn passed(&self) -> bool {
        self.exit_code() == 0
    }
}

/// Solve the model without write-back or a results database entry and
/// compare every recorded step with the reference rows.
pub fn check_against_reference(
    request: CheckRequest<'_>,
    provider: Option<Box<dyn ExternalFunctionProvider>>,
) -> AppResult<CheckReport> {
    let reference = AsciiTable::from_file(request.reference_path)?.skip_rows(request.skip_rows);

    let options = SessionOptions {
        write_back: false,
        results_database: false,
        ..request.options
    };
    let mut session = SolverSession::new(options);
    if let Some(provider) = provider {
        session = session.with_provider(provider);
    }
    let error_code = session.run_all(request.model_path)?;

    let comparison = compare_history(session.history(), &reference, request.tolerance);
    let report = CheckReport {
        comparison,
        error_code,
    };

    if report.passed() {
        info!(steps = comparison.checked_steps, "response matches reference");
    } else {
        warn!(
            discrepancies = comparison.discrepancies,
            error_code, "response differs from reference"
        );
    }
    Ok(report)
}

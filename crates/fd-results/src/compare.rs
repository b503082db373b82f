//! Element-wise comparison of responses against reference data.

use fd_core::{Tolerances, nearly_equal};
use tracing::warn;

use crate::history::ResponseHistory;
use crate::table::AsciiTable;

/// Count the scalars of `outputs` that differ from `reference` by more than
/// `tol` (absolute). Extra or missing trailing entries count as mismatches.
pub fn compare_lists(time: f64, outputs: &[f64], reference: &[f64], tol: f64) -> usize {
    let tol = Tolerances::absolute(tol);
    let mut discrepancies = outputs.len().abs_diff(reference.len());
    if discrepancies > 0 {
        warn!(
            time,
            outputs = outputs.len(),
            reference = reference.len(),
            "response and reference differ in length"
        );
    }

    for (index, (&value, &expected)) in outputs.iter().zip(reference).enumerate() {
        if !nearly_equal(value, expected, tol) {
            warn!(time, index, value, expected, "response value mismatch");
            discrepancies += 1;
        }
    }
    discrepancies
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Comparison {
    /// Steps that had a reference row to compare with.
    pub checked_steps: usize,
    pub discrepancies: usize,
}

impl Comparison {
    pub fn passed(&self) -> bool {
        self.discrepancies == 0
    }
}

/// Compare every recorded step, as `[time, values...]`, with the reference
/// row of the same index. Steps beyond the end of the reference count all of
/// their scalars as discrepancies.
pub fn compare_history(history: &ResponseHistory, reference: &AsciiTable, tol: f64) -> Comparison {
    let table = history.to_table();
    let mut comparison = Comparison::default();

    for (step, row) in table.rows.iter().enumerate() {
        match reference.rows.get(step) {
            Some(expected) => {
                comparison.checked_steps += 1;
                comparison.discrepancies += compare_lists(row[0], row, expected, tol);
            }
            None => {
                warn!(step, time = row[0], "no reference row for step");
                comparison.discrepancies += row.len();
            }
        }
    }
    comparison
}

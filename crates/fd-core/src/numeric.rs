use crate::FdError;

/// Floating point type used throughout the solver
pub type Real = f64;

/// Fraction of a time step below which a trailing partial step is ignored.
const STEP_COUNT_SLACK: Real = 1e-6;

/// Absolute/relative tolerance pair
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tolerances {
    pub abs: Real,
    pub rel: Real,
}

impl Tolerances {
    /// Purely absolute tolerance, as used by reference-table comparison.
    pub const fn absolute(abs: Real) -> Self {
        Self { abs, rel: 0.0 }
    }
}

impl Default for Tolerances {
    fn default() -> Self {
        Self {
            abs: 1e-12,
            rel: 1e-9,
        }
    }
}

/// `true` if `a` and `b` agree within either tolerance. NaN never agrees.
pub fn nearly_equal(a: Real, b: Real, tol: Tolerances) -> bool {
    let diff = (a - b).abs();
    diff <= tol.abs || diff <= tol.rel * a.abs().max(b.abs())
}

pub fn ensure_finite(v: Real, what: &'static str) -> Result<Real, FdError> {
    if v.is_finite() {
        Ok(v)
    } else {
        Err(FdError::NonFinite { what, value: v })
    }
}

/// Number of whole steps of size `dt` from `start` to `stop`.
///
/// `(stop - start) / dt` rarely lands on an integer in floating point, so a
/// quotient within a millionth of a step below the next integer counts as
/// that integer. Empty or reversed ranges give zero.
pub fn step_count(start: Real, stop: Real, dt: Real) -> usize {
    let steps = ((stop - start) / dt + STEP_COUNT_SLACK).floor();
    if steps.is_finite() && steps > 0.0 {
        steps as usize
    } else {
        0
    }
}

/// Time after `k` steps. Computed from the step index so that long runs
/// do not accumulate rounding drift.
pub fn step_time(start: Real, dt: Real, k: usize) -> Real {
    start + k as Real * dt
}


#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn nearly_equal_is_symmetric(a in -1e6_f64..1e6, b in -1e6_f64..1e6) {
            let tol = Tolerances::default();
            prop_assert_eq!(nearly_equal(a, b, tol), nearly_equal(b, a, tol));
        }

        #[test]
        fn whole_step_ranges_are_counted_exactly(
            start in -10.0_f64..10.0,
            dt in 1e-4_f64..1.0,
            steps in 0_usize..2000,
        ) {
            let stop = step_time(start, dt, steps);
            prop_assert_eq!(step_count(start, stop, dt), steps);
        }
    }
}

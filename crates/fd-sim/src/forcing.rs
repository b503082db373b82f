//! Forcing functions: built-in time functions and external providers.

use std::path::Path;

use fd_model::FunctionKind;
use fd_results::AsciiTable;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ForcingError {
    #[error("Unknown external function id: {id}")]
    UnknownFunctionId { id: u32 },

    #[error("External function {id} failed: {message}")]
    Evaluation { id: u32, message: String },

    #[error("Invalid function table: {message}")]
    InvalidTable { message: String },
}

/// Source of external function values.
///
/// `id` is the channel of an `External` function in the model. Values must
/// depend only on `id` and `time` so that repeated runs of the same model
/// reproduce the same response.
pub trait ExternalFunctionProvider {
    fn evaluate(&self, id: u32, time: f64) -> Result<f64, ForcingError>;
}

/// Provider for models without external functions.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoExternalFunctions;

impl ExternalFunctionProvider for NoExternalFunctions {
    fn evaluate(&self, id: u32, _time: f64) -> Result<f64, ForcingError> {
        Err(ForcingError::UnknownFunctionId { id })
    }
}

/// Closure-backed provider; `None` means the id is unknown.
pub struct FnProvider<F>(pub F);

impl<F> ExternalFunctionProvider for FnProvider<F>
where
    F: Fn(u32, f64) -> Option<f64>,
{
    fn evaluate(&self, id: u32, time: f64) -> Result<f64, ForcingError> {
        (self.0)(id, time).ok_or(ForcingError::UnknownFunctionId { id })
    }
}

/// External functions sampled in an ASCII table `[time, f_1, ..., f_n]`.
///
/// Channel `k` reads column `k`. Values are interpolated linearly and held
/// constant beyond the first and last rows.
#[derive(Clone, Debug)]
pub struct TabulatedFunctions {
    channels: Vec<Vec<(f64, f64)>>,
}

impl TabulatedFunctions {
    pub fn from_table(table: &AsciiTable) -> Result<Self, ForcingError> {
        let width = match table.rows.first() {
            Some(row) if row.len() >= 2 => row.len(),
            _ => {
                return Err(ForcingError::InvalidTable {
                    message: "need at least one row with a time and a value".to_string(),
                });
            }
        };

        let mut channels = vec![Vec::with_capacity(table.len()); width - 1];
        let mut previous_time = f64::NEG_INFINITY;
        for row in &table.rows {
            if row.len() != width {
                return Err(ForcingError::InvalidTable {
                    message: format!("expected {width} columns, found {}", row.len()),
                });
            }
            let time = row[0];
            if time <= previous_time {
                return Err(ForcingError::InvalidTable {
                    message: format!("time {time} does not increase"),
                });
            }
            previous_time = time;
            for (channel, &value) in channels.iter_mut().zip(&row[1..]) {
                channel.push((time, value));
            }
        }

        Ok(Self { channels })
    }

    pub fn from_file(path: &Path) -> Result<Self, ForcingError> {
        let table = AsciiTable::from_file(path).map_err(|e| ForcingError::InvalidTable {
            message: format!("{}: {e}", path.display()),
        })?;
        Self::from_table(&table)
    }

    pub fn channel_count(&self) -> usize {
        self.channels.len()
    }
}

impl ExternalFunctionProvider for TabulatedFunctions {
    fn evaluate(&self, id: u32, time: f64) -> Result<f64, ForcingError> {
        let channel = (id as usize)
            .checked_sub(1)
            .and_then(|index| self.channels.get(index))
            .ok_or(ForcingError::UnknownFunctionId { id })?;
        Ok(interpolate(channel, time))
    }
}

/// Value of a built-in function at `t`; `None` for external functions.
pub fn evaluate_builtin(kind: &FunctionKind, t: f64) -> Option<f64> {
    match kind {
        FunctionKind::Constant { value } => Some(*value),
        FunctionKind::Sine {
            amplitude,
            frequency_hz,
            phase_rad,
            offset,
        } => Some(offset + amplitude * (std::f64::consts::TAU * frequency_hz * t + phase_rad).sin()),
        FunctionKind::Ramp {
            slope,
            start_time,
            max_value,
        } => {
            let value = slope * (t - start_time).max(0.0);
            Some(match max_value {
                Some(limit) if *slope >= 0.0 => value.min(*limit),
                Some(limit) => value.max(*limit),
                None => value,
            })
        }
        FunctionKind::Polyline { points } => Some(interpolate(points, t)),
        FunctionKind::External { .. } => None,
    }
}

/// Piecewise linear interpolation through sorted points, clamped at the ends.
fn interpolate(points: &[(f64, f64)], t: f64) -> f64 {
    let (first, last) = match (points.first(), points.last()) {
        (Some(first), Some(last)) => (*first, *last),
        _ => return 0.0,
    };
    if t <= first.0 {
        return first.1;
    }
    if t >= last.0 {
        return last.1;
    }

    let upper = points.partition_point(|&(x, _)| x <= t);
    let (x0, y0) = points[upper - 1];
    let (x1, y1) = points[upper];
    y0 + (y1 - y0) * (t - x0) / (x1 - x0)
}

//! Per-step response history recorded by a solver session.

use serde::{Deserialize, Serialize};

use crate::table::AsciiTable;

/// One step: the time and the value of each recorded function.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseRow {
    pub time: f64,
    pub values: Vec<f64>,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ResponseHistory {
    function_ids: Vec<u32>,
    rows: Vec<ResponseRow>,
}

impl ResponseHistory {
    pub fn new(function_ids: Vec<u32>) -> Self {
        Self {
            function_ids,
            rows: Vec::new(),
        }
    }

    pub fn function_ids(&self) -> &[u32] {
        &self.function_ids
    }

    pub fn rows(&self) -> &[ResponseRow] {
        &self.rows
    }

    pub fn push(&mut self, time: f64, values: Vec<f64>) {
        debug_assert_eq!(values.len(), self.function_ids.len());
        self.rows.push(ResponseRow { time, values });
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Rows flattened as `[time, f_1, ..., f_n]`, the reference table layout.
    pub fn to_table(&self) -> AsciiTable {
        let mut columns = vec!["time".to_string()];
        columns.extend(self.function_ids.iter().map(|id| format!("f{id}")));
        AsciiTable {
            columns,
            comments: Vec::new(),
            rows: self
                .rows
                .iter()
                .map(|row| {
                    let mut flat = Vec::with_capacity(row.values.len() + 1);
                    flat.push(row.time);
                    flat.extend_from_slice(&row.values);
                    flat
                })
                .collect(),
        }
    }

    pub(crate) fn from_parts(function_ids: Vec<u32>, rows: Vec<ResponseRow>) -> Self {
        Self { function_ids, rows }
    }
}

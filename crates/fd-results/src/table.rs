//! Line-oriented ASCII tables.
//!
//! The format is shared by reference response files and tabulated load
//! functions:
//!
//! ```text
//! # free comment
//! #DESC  time  TipX  TipY  TipZ
//! 0.0    0.0   0.0   0.0
//! 0.01   1e-4  2e-4  0.0
//! ```
//!
//! Lines starting with `#` are comments, except the `#DESC` line which names
//! the columns. Every other non-blank line is one row of whitespace-separated
//! floats.

use std::fmt::Write as _;
use std::path::Path;

use crate::{ResultsError, ResultsResult};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct AsciiTable {
    /// Column names from the `#DESC` line (empty if there is none).
    pub columns: Vec<String>,
    pub comments: Vec<String>,
    pub rows: Vec<Vec<f64>>,
}

impl AsciiTable {
    pub fn parse(text: &str) -> ResultsResult<Self> {
        let mut table = AsciiTable::default();

        for (index, raw) in text.lines().enumerate() {
            let line = raw.trim();
            if line.is_empty() {
                continue;
            }
            if let Some(desc) = line.strip_prefix("#DESC") {
                table.columns = desc.split_whitespace().map(str::to_string).collect();
                continue;
            }
            if let Some(comment) = line.strip_prefix('#') {
                table.comments.push(comment.trim().to_string());
                continue;
            }

            let row = line
                .split_whitespace()
                .map(|token| {
                    token.parse::<f64>().map_err(|e| ResultsError::Table {
                        line: index + 1,
                        message: format!("'{token}': {e}"),
                    })
                })
                .collect::<ResultsResult<Vec<f64>>>()?;
            table.rows.push(row);
        }

        Ok(table)
    }

    /// Read a table file. Non-UTF-8 bytes (e.g. latin-1 units in headers) are
    /// replaced rather than rejected.
    pub fn from_file(path: &Path) -> ResultsResult<Self> {
        let bytes = std::fs::read(path)?;
        Self::parse(&String::from_utf8_lossy(&bytes))
    }

    /// Drop the first `n` data rows, e.g. the initial `t = 0` line of a
    /// reference file when the solver starts reporting at the first step.
    pub fn skip_rows(mut self, n: usize) -> Self {
        let n = n.min(self.rows.len());
        self.rows.drain(..n);
        self
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Render in the same format `parse` accepts.
    pub fn to_ascii(&self) -> String {
        let mut out = String::new();
        for comment in &self.comments {
            let _ = writeln!(out, "# {comment}");
        }
        if !self.columns.is_empty() {
            let _ = writeln!(out, "#DESC\t{}", self.columns.join("\t"));
        }
        for row in &self.rows {
            let line: Vec<String> = row.iter().map(|v| format!("{v:.12e}")).collect();
            let _ = writeln!(out, "{}", line.join("\t"));
        }
        out
    }
}

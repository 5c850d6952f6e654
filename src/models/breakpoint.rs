//! Breakpoint entity consumed from the caller's breakpoint list.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::{AppError, Result};

/// A source breakpoint using 0-based line and column numbering.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct Breakpoint {
    /// Caller-assigned identity.
    pub id: String,
    /// Source file the breakpoint lives in.
    pub source: PathBuf,
    /// 0-based line.
    pub line: u32,
    /// 0-based column.
    pub column: u32,
}

impl Breakpoint {
    /// Construct a breakpoint from 0-based coordinates.
    #[must_use]
    pub fn new(id: impl Into<String>, source: impl Into<PathBuf>, line: u32, column: u32) -> Self {
        Self {
            id: id.into(),
            source: source.into(),
            line,
            column,
        }
    }

    /// Parse an editor-style `path:line[:column]` location (1-based).
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` when the line or column is missing,
    /// non-numeric, or zero.
    pub fn parse_location(raw: &str) -> Result<Self> {
        let invalid = || AppError::Config(format!("invalid breakpoint location '{raw}'"));

        let mut parts = raw.rsplitn(3, ':');
        let last = parts.next().ok_or_else(invalid)?;
        let middle = parts.next().ok_or_else(invalid)?;

        let (path, line, column) = match (middle.parse::<u32>(), parts.next()) {
            (Ok(line), Some(path)) => (path, line, last.parse::<u32>().map_err(|_| invalid())?),
            _ => {
                let line = last.parse::<u32>().map_err(|_| invalid())?;
                let path = raw
                    .strip_suffix(last)
                    .and_then(|p| p.strip_suffix(':'))
                    .ok_or_else(invalid)?;
                (path, line, 1)
            }
        };

        if path.is_empty() || line == 0 || column == 0 {
            return Err(invalid());
        }

        Ok(Self::new(raw, path, line - 1, column - 1))
    }

    /// Whether a stop reported at `path` and 1-based `wire_line` is this breakpoint.
    #[must_use]
    pub fn matches_wire_location(&self, path: &Path, wire_line: u32) -> bool {
        wire_line.checked_sub(1) == Some(self.line) && path == self.source
    }
}

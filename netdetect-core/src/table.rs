// Copyright 2025 AgentReplay (https://github.com/agentreplay)
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program. If not, see <https://www.gnu.org/licenses/>.

//! In-memory record tables handed over by the ingestion layer

use serde::{Deserialize, Serialize};

use crate::error::{EngineError, EngineResult};

/// A single table cell
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Cell {
    Str(String),
    Int(i64),
    Float(f64),
    Null,
}

impl Cell {
    /// Textual form of the cell; `None` for nulls and NaN.
    ///
    /// Integral floats print without a fractional part so that `7.0` and `7`
    /// produce the same node.
    pub fn as_text(&self) -> Option<String> {
        match self {
            Cell::Str(s) => Some(s.clone()),
            Cell::Int(i) => Some(i.to_string()),
            Cell::Float(f) if f.is_nan() => None,
            Cell::Float(f) if f.fract() == 0.0 && f.abs() < 1e15 => Some(format!("{}", *f as i64)),
            Cell::Float(f) => Some(f.to_string()),
            Cell::Null => None,
        }
    }

    /// Numeric value of the cell, parsing strings when needed
    pub fn as_number(&self) -> Option<f64> {
        match self {
            Cell::Str(s) => s.trim().parse::<f64>().ok(),
            Cell::Int(i) => Some(*i as f64),
            Cell::Float(f) if f.is_nan() => None,
            Cell::Float(f) => Some(*f),
            Cell::Null => None,
        }
    }

    pub fn is_null(&self) -> bool {
        match self {
            Cell::Null => true,
            Cell::Float(f) => f.is_nan(),
            Cell::Str(s) => s.trim().is_empty(),
            Cell::Int(_) => false,
        }
    }
}

impl From<&str> for Cell {
    fn from(value: &str) -> Self {
        Cell::Str(value.to_string())
    }
}

impl From<String> for Cell {
    fn from(value: String) -> Self {
        Cell::Str(value)
    }
}

impl From<i64> for Cell {
    fn from(value: i64) -> Self {
        Cell::Int(value)
    }
}

impl From<f64> for Cell {
    fn from(value: f64) -> Self {
        Cell::Float(value)
    }
}

impl<T: Into<Cell>> From<Option<T>> for Cell {
    fn from(value: Option<T>) -> Self {
        value.map(Into::into).unwrap_or(Cell::Null)
    }
}

/// Named columns with rows of cells
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Table {
    columns: Vec<String>,
    rows: Vec<Vec<Cell>>,
}

impl Table {
    pub fn new<S: Into<String>>(columns: impl IntoIterator<Item = S>) -> Self {
        Self {
            columns: columns.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append a row. Short rows are padded with nulls, long rows truncated.
    pub fn push_row<C: Into<Cell>>(&mut self, row: impl IntoIterator<Item = C>) {
        let mut cells: Vec<Cell> = row.into_iter().map(Into::into).collect();
        cells.resize(self.columns.len(), Cell::Null);
        self.rows.push(cells);
    }

    /// Builder form of [`Table::push_row`]
    pub fn with_row<C: Into<Cell>>(mut self, row: impl IntoIterator<Item = C>) -> Self {
        self.push_row(row);
        self
    }

    pub fn columns(&self) -> &[String] {
        &self.columns
    }

    pub fn rows(&self) -> &[Vec<Cell>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Position of a column, or `MissingColumn`
    pub fn column_index(&self, name: &str) -> EngineResult<usize> {
        self.columns
            .iter()
            .position(|c| c == name)
            .ok_or_else(|| EngineError::MissingColumn(name.to_string()))
    }

    /// Resolve several columns at once, failing on the first missing one
    pub fn column_indices(&self, names: &[String]) -> EngineResult<Vec<usize>> {
        names.iter().map(|n| self.column_index(n)).collect()
    }
}

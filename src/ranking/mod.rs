//! Multi-criteria ranking over tabular performance data.
//!
//! Both rankers read a [`DecisionMatrix`] (alternatives x named criteria) and
//! are pure, single-pass functions: no shared state, safe to run for many
//! requests in parallel.
//!
//! - [`topsis::score`]: composite closeness-to-ideal score and rank
//! - [`pareto::pareto_fronts`]: non-dominated front index per alternative

pub mod pareto;
pub mod topsis;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};

pub use pareto::{Objective, ParetoRank};
pub use topsis::TopsisScore;

/// Whether larger values of a criterion are preferred.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Maximize,
    Minimize,
}

impl Direction {
    /// Map a value so that larger is always better.
    pub fn orient(&self, value: f64) -> f64 {
        match self {
            Direction::Maximize => value,
            Direction::Minimize => -value,
        }
    }
}

/// Alternatives (rows) scored on named criteria (columns).
#[derive(Debug, Clone, PartialEq, Default)]
pub struct DecisionMatrix {
    criteria: Vec<String>,
    rows: Vec<Vec<f64>>,
}

impl DecisionMatrix {
    pub fn new<S: Into<String>>(criteria: impl IntoIterator<Item = S>) -> Self {
        Self {
            criteria: criteria.into_iter().map(Into::into).collect(),
            rows: Vec::new(),
        }
    }

    /// Append an alternative. Values must be finite and one per criterion.
    pub fn push_row(&mut self, row: Vec<f64>) -> Result<()> {
        if row.len() != self.criteria.len() {
            return Err(CatalogError::InvalidRequest(format!(
                "row {} has {} values, expected {}",
                self.rows.len(),
                row.len(),
                self.criteria.len()
            )));
        }
        if let Some(pos) = row.iter().position(|v| !v.is_finite()) {
            return Err(CatalogError::InvalidRequest(format!(
                "row {} has a non-finite value for '{}'",
                self.rows.len(),
                self.criteria[pos]
            )));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn with_row(mut self, row: Vec<f64>) -> Result<Self> {
        self.push_row(row)?;
        Ok(self)
    }

    pub fn criteria(&self) -> &[String] {
        &self.criteria
    }

    pub fn rows(&self) -> &[Vec<f64>] {
        &self.rows
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, criterion: &str) -> Option<usize> {
        self.criteria.iter().position(|c| c == criterion)
    }

    pub fn column(&self, index: usize) -> impl Iterator<Item = f64> + '_ {
        self.rows.iter().map(move |row| row[index])
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_ragged_rows() {
        let mut m = DecisionMatrix::new(["accuracy", "latency"]);
        assert!(m.push_row(vec![0.9]).is_err());
        assert!(m.push_row(vec![0.9, 100.0]).is_ok());
        assert_eq!(m.len(), 1);
    }

    #[test]
    fn rejects_non_finite_values() {
        let m = DecisionMatrix::new(["accuracy", "latency"]);
        let err = m.with_row(vec![0.9, f64::NAN]).unwrap_err();
        assert!(err.to_string().contains("latency"));
    }

    #[test]
    fn column_access() {
        let m = DecisionMatrix::new(["a", "b"])
            .with_row(vec![1.0, 2.0])
            .unwrap()
            .with_row(vec![3.0, 4.0])
            .unwrap();
        assert_eq!(m.column_index("b"), Some(1));
        assert_eq!(m.column_index("c"), None);
        assert_eq!(m.column(1).collect::<Vec<_>>(), vec![2.0, 4.0]);
    }

    #[test]
    fn orient_flips_minimized_values() {
        assert_eq!(Direction::Maximize.orient(3.0), 3.0);
        assert_eq!(Direction::Minimize.orient(3.0), -3.0);
    }
}

//! Pareto front assignment by non-dominated sorting.
//!
//! Row `a` dominates row `b` when `a` is at least as good on every objective
//! and strictly better on one. Front 1 holds the rows nothing dominates; front
//! `k + 1` holds the rows dominated only by rows in fronts `1..=k`.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::error::{CatalogError, Result};
use crate::ranking::{DecisionMatrix, Direction};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Objective {
    pub criterion: String,
    pub direction: Direction,
}

impl Objective {
    pub fn maximize(criterion: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            direction: Direction::Maximize,
        }
    }

    pub fn minimize(criterion: impl Into<String>) -> Self {
        Self {
            criterion: criterion.into(),
            direction: Direction::Minimize,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ParetoRank {
    pub index: usize,
    /// 1 = non-dominated.
    pub front: usize,
    /// Number of other rows this row dominates.
    pub dominates: usize,
}

/// `a` dominates `b` over already-oriented values (larger is better).
fn dominates(a: &[f64], b: &[f64]) -> bool {
    let mut strictly_better = false;
    for (x, y) in a.iter().zip(b) {
        if x < y {
            return false;
        }
        if x > y {
            strictly_better = true;
        }
    }
    strictly_better
}

/// Assign a front to every row of `matrix`, in input order.
pub fn pareto_fronts(matrix: &DecisionMatrix, objectives: &[Objective]) -> Result<Vec<ParetoRank>> {
    if objectives.is_empty() {
        return Err(CatalogError::InvalidRequest(
            "at least one objective is required".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    let mut columns = Vec::with_capacity(objectives.len());
    for objective in objectives {
        if !seen.insert(objective.criterion.as_str()) {
            return Err(CatalogError::InvalidRequest(format!(
                "duplicate objective '{}'",
                objective.criterion
            )));
        }
        let column = matrix.column_index(&objective.criterion).ok_or_else(|| {
            CatalogError::InvalidRequest(format!("unknown objective '{}'", objective.criterion))
        })?;
        columns.push((column, objective.direction));
    }

    let oriented: Vec<Vec<f64>> = matrix
        .rows()
        .iter()
        .map(|row| {
            columns
                .iter()
                .map(|(column, direction)| direction.orient(row[*column]))
                .collect()
        })
        .collect();

    let n = oriented.len();
    let mut dominated_by = vec![0usize; n];
    let mut dominated_sets: Vec<Vec<usize>> = vec![Vec::new(); n];
    for p in 0..n {
        for q in (p + 1)..n {
            if dominates(&oriented[p], &oriented[q]) {
                dominated_sets[p].push(q);
                dominated_by[q] += 1;
            } else if dominates(&oriented[q], &oriented[p]) {
                dominated_sets[q].push(p);
                dominated_by[p] += 1;
            }
        }
    }

    let mut fronts = vec![0usize; n];
    let mut current: Vec<usize> = (0..n).filter(|&i| dominated_by[i] == 0).collect();
    let mut front = 1;
    while !current.is_empty() {
        let mut next = Vec::new();
        for &p in &current {
            fronts[p] = front;
            for &q in &dominated_sets[p] {
                dominated_by[q] -= 1;
                if dominated_by[q] == 0 {
                    next.push(q);
                }
            }
        }
        current = next;
        front += 1;
    }

    Ok((0..n)
        .map(|index| ParetoRank {
            index,
            front: fronts[index],
            dominates: dominated_sets[index].len(),
        })
        .collect())
}

/// Indices of the first front, in input order.
pub fn non_dominated(matrix: &DecisionMatrix, objectives: &[Objective]) -> Result<Vec<usize>> {
    Ok(pareto_fronts(matrix, objectives)?
        .into_iter()
        .filter(|r| r.front == 1)
        .map(|r| r.index)
        .collect())
}

//! TOPSIS (Technique for Order Preference by Similarity to Ideal Solution).
//!
//! 1. vector-normalise each column by its Euclidean norm
//! 2. scale each column by its weight
//! 3. ideal = best value per column, anti-ideal = worst value per column
//! 4. d+ / d- = Euclidean distance of each row to ideal / anti-ideal
//! 5. score = d- / (d+ + d-), 0 when both distances vanish
//! 6. rank by descending score, ties kept in input order
//!
//! A zero-variance column places ideal and anti-ideal on the same value, so
//! it adds nothing to either distance. A single alternative scores 1.0.

use std::collections::{HashMap, HashSet};

use serde::Serialize;

use crate::error::{CatalogError, Result};
use crate::ranking::{DecisionMatrix, Direction};

/// Allowed deviation of the weight sum from 1.0.
pub const WEIGHT_TOLERANCE: f64 = 1e-6;

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct TopsisScore {
    /// Row position in the input matrix.
    pub index: usize,
    /// Relative closeness to the ideal point, in [0, 1].
    pub score: f64,
    /// 1 = best.
    pub rank: usize,
}

/// Check weights and the benefit/cost partition against `criteria`.
///
/// Returns the direction of every criterion in column order.
pub fn validate(
    criteria: &[String],
    weights: &HashMap<String, f64>,
    benefit: &[&str],
    cost: &[&str],
) -> Result<Vec<Direction>> {
    let mut seen = HashSet::with_capacity(criteria.len());
    if let Some(dup) = criteria.iter().find(|c| !seen.insert(c.as_str())) {
        return Err(CatalogError::InvalidWeights(format!(
            "criterion '{}' appears more than once",
            dup
        )));
    }

    for (name, weight) in weights {
        if !weight.is_finite() || *weight < 0.0 {
            return Err(CatalogError::InvalidWeights(format!(
                "weight for '{}' must be a non-negative number, got {}",
                name, weight
            )));
        }
        if !criteria.iter().any(|c| c == name) {
            return Err(CatalogError::InvalidWeights(format!(
                "weight given for unknown criterion '{}'",
                name
            )));
        }
    }

    let total: f64 = weights.values().sum();
    if (total - 1.0).abs() > WEIGHT_TOLERANCE {
        return Err(CatalogError::InvalidWeights(format!(
            "weights must sum to 1.0, got {:.6}",
            total
        )));
    }

    let benefit_set: HashSet<&str> = benefit.iter().copied().collect();
    let cost_set: HashSet<&str> = cost.iter().copied().collect();
    for name in benefit_set.iter().chain(cost_set.iter()) {
        if !criteria.iter().any(|c| c == name) {
            return Err(CatalogError::InvalidWeights(format!(
                "unknown criterion '{}' in benefit/cost sets",
                name
            )));
        }
    }

    criteria
        .iter()
        .map(|criterion| {
            if !weights.contains_key(criterion) {
                return Err(CatalogError::InvalidWeights(format!(
                    "missing weight for criterion '{}'",
                    criterion
                )));
            }
            match (
                benefit_set.contains(criterion.as_str()),
                cost_set.contains(criterion.as_str()),
            ) {
                (true, false) => Ok(Direction::Maximize),
                (false, true) => Ok(Direction::Minimize),
                (true, true) => Err(CatalogError::InvalidWeights(format!(
                    "criterion '{}' is both benefit and cost",
                    criterion
                ))),
                (false, false) => Err(CatalogError::InvalidWeights(format!(
                    "criterion '{}' is neither benefit nor cost",
                    criterion
                ))),
            }
        })
        .collect()
}

/// Score every row of `matrix`. Output is in input order; use `rank` to sort.
pub fn score(
    matrix: &DecisionMatrix,
    weights: &HashMap<String, f64>,
    benefit: &[&str],
    cost: &[&str],
) -> Result<Vec<TopsisScore>> {
    let directions = validate(matrix.criteria(), weights, benefit, cost)?;

    let n = matrix.len();
    if n == 0 {
        return Ok(Vec::new());
    }
    if n == 1 {
        return Ok(vec![TopsisScore {
            index: 0,
            score: 1.0,
            rank: 1,
        }]);
    }

    let m = matrix.criteria().len();
    let weight_vec: Vec<f64> = matrix.criteria().iter().map(|c| weights[c]).collect();

    let norms: Vec<f64> = (0..m)
        .map(|j| {
            let norm = matrix.column(j).map(|v| v * v).sum::<f64>().sqrt();
            if norm == 0.0 {
                1.0
            } else {
                norm
            }
        })
        .collect();

    let weighted: Vec<Vec<f64>> = matrix
        .rows()
        .iter()
        .map(|row| {
            row.iter()
                .enumerate()
                .map(|(j, v)| v / norms[j] * weight_vec[j])
                .collect()
        })
        .collect();

    let mut ideal = vec![0.0; m];
    let mut anti_ideal = vec![0.0; m];
    for j in 0..m {
        let (min, max) = weighted
            .iter()
            .map(|row| row[j])
            .fold((f64::INFINITY, f64::NEG_INFINITY), |(lo, hi), v| {
                (lo.min(v), hi.max(v))
            });
        match directions[j] {
            Direction::Maximize => {
                ideal[j] = max;
                anti_ideal[j] = min;
            }
            Direction::Minimize => {
                ideal[j] = min;
                anti_ideal[j] = max;
            }
        }
    }

    let scores: Vec<f64> = weighted
        .iter()
        .map(|row| {
            let d_plus = distance(row, &ideal);
            let d_minus = distance(row, &anti_ideal);
            let denom = d_plus + d_minus;
            if denom == 0.0 {
                0.0
            } else {
                (d_minus / denom).clamp(0.0, 1.0)
            }
        })
        .collect();

    let mut order: Vec<usize> = (0..n).collect();
    // sort_by is stable, so equal scores keep input order
    order.sort_by(|&a, &b| scores[b].total_cmp(&scores[a]));

    let mut ranks = vec![0usize; n];
    for (position, &index) in order.iter().enumerate() {
        ranks[index] = position + 1;
    }

    Ok((0..n)
        .map(|index| TopsisScore {
            index,
            score: scores[index],
            rank: ranks[index],
        })
        .collect())
}

fn distance(a: &[f64], b: &[f64]) -> f64 {
    a.iter()
        .zip(b)
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f64>()
        .sqrt()
}

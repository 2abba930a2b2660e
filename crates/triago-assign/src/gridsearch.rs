//! Exhaustive search over scoring-coefficient space.
//!
//! Enumerates the full Cartesian product of per-coefficient candidate
//! values, re-runs the assignment engine for each vector, and keeps the
//! one with the highest F-measure against the ground truth. The cost is
//! the product of the candidate counts; callers bound it by choosing
//! their grids.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use triago_core::{ScoringWeights, TriagoError};

use crate::engine::AssignmentEngine;
use crate::evaluate::{Confusion, Evaluation, PrecisionMode};

/// Candidate values for each of the five scoring coefficients.
///
/// # Examples
///
/// ```
/// use triago_assign::gridsearch::CoefficientGrid;
///
/// let grid = CoefficientGrid::with_step(0.5).unwrap();
/// assert_eq!(grid.availability, vec![0.0, 0.5, 1.0]);
/// assert_eq!(grid.vector_count(), 3usize.pow(5));
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoefficientGrid {
    pub availability: Vec<f64>,
    pub collaborativity: Vec<f64>,
    pub competency: Vec<f64>,
    pub productivity: Vec<f64>,
    pub reliability: Vec<f64>,
}

impl CoefficientGrid {
    /// The same candidate list for every coefficient.
    pub fn uniform(values: Vec<f64>) -> Self {
        Self {
            availability: values.clone(),
            collaborativity: values.clone(),
            competency: values.clone(),
            productivity: values.clone(),
            reliability: values,
        }
    }

    /// Candidates `0.0, step, 2*step, ...` up to and including 1.0, for
    /// every coefficient.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Config`] unless `step` is a positive finite
    /// number: anything else would never advance past 1.0.
    pub fn with_step(step: f64) -> Result<Self, TriagoError> {
        if !(step > 0.0 && step.is_finite()) {
            return Err(TriagoError::Config(format!(
                "grid step must be a positive number, got {step}"
            )));
        }
        let mut values = Vec::new();
        let mut v = 0.0;
        while v <= 1.0 + 1e-9 {
            values.push((v * 1e9_f64).round() / 1e9);
            v += step;
        }
        Ok(Self::uniform(values))
    }

    /// Size of the full Cartesian product.
    pub fn vector_count(&self) -> usize {
        self.availability.len()
            * self.collaborativity.len()
            * self.competency.len()
            * self.productivity.len()
            * self.reliability.len()
    }

    /// Enumerate every weight vector. Iteration order is fixed:
    /// reliability varies fastest, availability slowest, so ties resolve
    /// to the same vector on every run.
    pub fn vectors(&self) -> impl Iterator<Item = ScoringWeights> + '_ {
        self.availability.iter().flat_map(move |&availability| {
            self.collaborativity.iter().flat_map(move |&collaborativity| {
                self.competency.iter().flat_map(move |&competency| {
                    self.productivity.iter().flat_map(move |&productivity| {
                        self.reliability.iter().map(move |&reliability| ScoringWeights {
                            availability,
                            collaborativity,
                            competency,
                            productivity,
                            reliability,
                        })
                    })
                })
            })
        })
    }
}

/// The winning configuration of a grid search.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GridSearchResult {
    pub best_weights: ScoringWeights,
    pub best_score: f64,
    pub best_evaluation: Evaluation,
    pub vectors_tried: usize,
}

/// Grid search driver wrapping the engine and evaluator.
///
/// Every vector gets a fresh engine pass (isolated per-run state), and a
/// vector that leaves any biddable bug unassigned scores exactly 0: an
/// incomplete assignment is never preferred over a complete but lower-F
/// one.
pub struct GridSearch<'a> {
    engine: &'a AssignmentEngine,
    ground_truth: &'a BTreeMap<i64, String>,
    mode: PrecisionMode,
}

impl<'a> GridSearch<'a> {
    pub fn new(
        engine: &'a AssignmentEngine,
        ground_truth: &'a BTreeMap<i64, String>,
        mode: PrecisionMode,
    ) -> Self {
        Self {
            engine,
            ground_truth,
            mode,
        }
    }

    /// Run the exhaustive search. `progress` is called after each vector
    /// with (vectors done, vectors total). Returns `None` for an empty
    /// grid.
    ///
    /// Retention is a strict maximum: a later vector replaces the best
    /// only with a strictly higher score, so ties keep the first found.
    pub fn run(
        &self,
        grid: &CoefficientGrid,
        mut progress: impl FnMut(usize, usize),
    ) -> Option<GridSearchResult> {
        let total = grid.vector_count();
        let mut best: Option<GridSearchResult> = None;
        let mut done = 0;

        for weights in grid.vectors() {
            let outcome = self.engine.run(&weights);
            let evaluation =
                Confusion::from_assignments(&outcome.picks(), self.ground_truth).evaluate(self.mode);
            let score = if outcome.is_complete() {
                evaluation.f_measure
            } else {
                0.0
            };

            let improved = match &best {
                Some(current) => score > current.best_score,
                None => true,
            };
            if improved {
                best = Some(GridSearchResult {
                    best_weights: weights,
                    best_score: score,
                    best_evaluation: evaluation,
                    vectors_tried: total,
                });
            }

            done += 1;
            progress(done, total);
        }

        best
    }
}

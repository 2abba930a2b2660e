//! Developer-bug assignment scoring engine.
//!
//! Given a project's aggregated issue statistics, this crate ranks
//! candidate developers for every open bug and greedily assigns each bug
//! to its best-fit developer, subject to a per-developer capacity budget:
//! - [`score`] — the five-factor score function (availability,
//!   collaborativity, competency, productivity, reliability)
//! - [`capacity`] — the time-budget gate deciding who can still take work
//! - [`engine`] — the sequential greedy assignment pass
//! - [`evaluate`] — precision / recall / F-measure against ground truth
//! - [`gridsearch`] — exhaustive coefficient search maximizing F-measure

pub mod capacity;
pub mod engine;
pub mod evaluate;
pub mod gridsearch;
pub mod score;

pub use capacity::CapacityGate;
pub use engine::{AssignmentEngine, AssignmentInput, AssignmentOutcome, RankedAssignment};
pub use evaluate::{Confusion, Evaluation, PrecisionMode};
pub use gridsearch::{CoefficientGrid, GridSearch, GridSearchResult};
pub use score::{safe_div, CombinedSnapshot, SubScores};

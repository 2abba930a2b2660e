//! Precision / recall / F-measure against a held-out ground truth.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::score::safe_div;

/// True/false positive and false negative counts from comparing picks
/// against the reality check.
///
/// # Examples
///
/// ```
/// use std::collections::BTreeMap;
/// use triago_assign::evaluate::Confusion;
///
/// let picks = BTreeMap::from([(1, "a".to_string()), (2, "b".to_string())]);
/// let truth = BTreeMap::from([(1, "a".to_string()), (2, "c".to_string()), (3, "a".to_string())]);
/// let c = Confusion::from_assignments(&picks, &truth);
/// assert_eq!((c.tp, c.fp, c.fn_), (1, 1, 1));
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Confusion {
    /// Picks matching the real historical assignee.
    pub tp: u64,
    /// Picks naming a different developer than the real assignee.
    pub fp: u64,
    /// Ground-truth bugs the engine left unassigned.
    pub fn_: u64,
}

impl Confusion {
    pub fn new(tp: u64, fp: u64, fn_: u64) -> Self {
        Self { tp, fp, fn_ }
    }

    /// Compare an assignment pass against the ground-truth map. Bugs with
    /// no ground truth are ignored; they carry no signal either way.
    pub fn from_assignments(
        picks: &BTreeMap<i64, String>,
        ground_truth: &BTreeMap<i64, String>,
    ) -> Self {
        let mut counts = Self::default();
        for (bug, real) in ground_truth {
            match picks.get(bug) {
                Some(picked) if picked == real => counts.tp += 1,
                Some(_) => counts.fp += 1,
                None => counts.fn_ += 1,
            }
        }
        counts
    }

    /// Derive precision, recall, and F-measure under the given
    /// denominator orientation.
    pub fn evaluate(&self, mode: PrecisionMode) -> Evaluation {
        let tp = self.tp as f64;
        let fp = self.fp as f64;
        let fn_ = self.fn_ as f64;

        let (precision, recall) = match mode {
            PrecisionMode::Legacy => (
                safe_div(tp, tp + fn_, 0.0),
                safe_div(tp, tp + fp, 0.0),
            ),
            PrecisionMode::Conventional => (
                safe_div(tp, tp + fp, 0.0),
                safe_div(tp, tp + fn_, 0.0),
            ),
        };
        let f_measure = safe_div(2.0 * precision * recall, precision + recall, 0.0);

        Evaluation {
            precision,
            recall,
            f_measure,
        }
    }
}

/// Which counts sit under the precision and recall fractions.
///
/// `Legacy` reproduces the historical behavior this engine was validated
/// against, where precision divides by `tp + fn` and recall by `tp + fp`
/// — the opposite of the textbook orientation. It stays the default so
/// results remain comparable run over run; `Conventional` is the textbook
/// form. The F-measure is symmetric in P and R, so the best grid-search
/// vector is the same under either mode.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PrecisionMode {
    #[default]
    Legacy,
    Conventional,
}

/// Derived quality metrics for one assignment pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Evaluation {
    pub precision: f64,
    pub recall: f64,
    pub f_measure: f64,
}

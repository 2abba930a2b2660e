//! The five-factor score function used to rank candidate developers.
//!
//! Every ratio goes through [`safe_div`], so empty history (zero
//! denominators) degrades to a caller-chosen fallback instead of failing
//! the scoring pass.

use serde::{Deserialize, Serialize};
use triago_core::{BugStatistics, ScoringWeights, StatSnapshot};

/// Divide `num` by `den`, substituting `default` when the denominator is
/// zero or not a finite number.
///
/// # Examples
///
/// ```
/// use triago_assign::score::safe_div;
///
/// assert_eq!(safe_div(42.0, 0.0, 7.0), 7.0);
/// assert_eq!(safe_div(42.0, 2.0, 7.0), 21.0);
/// ```
pub fn safe_div(num: f64, den: f64, default: f64) -> f64 {
    if den == 0.0 || !den.is_finite() {
        default
    } else {
        num / den
    }
}

/// A developer's fixed-bug and open-bug snapshots for one
/// (component, priority) class, merged into the view the score function
/// consumes.
///
/// Counts are summed across both snapshots: assignment counts should
/// reflect total workload. Turnaround fields (`dev_avg_time`,
/// `bug_avg_eta`) take the fixed-bug value whenever any fixed-bug history
/// exists, because completed work is the more reliable signal.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct CombinedSnapshot {
    pub reviews: f64,
    pub num_assigned: f64,
    pub num_attachment: f64,
    pub num_comment: f64,
    pub size_attachment: f64,
    pub dev_avg_time: f64,
    pub bug_avg_eta: f64,
    /// The open-snapshot share of `num_assigned`; the engine commits
    /// `num_assigned_open + 1` when it provisionally takes a bug.
    pub num_assigned_open: f64,
}

impl CombinedSnapshot {
    /// Merge a developer's fixed and open snapshots. A missing snapshot
    /// contributes zeros.
    pub fn combine(fixed: Option<&StatSnapshot>, open: Option<&StatSnapshot>) -> Self {
        let f = fixed.copied().unwrap_or_default();
        let o = open.copied().unwrap_or_default();
        let has_fixed = fixed.is_some();

        Self {
            reviews: f.reviews + o.reviews,
            num_assigned: f.num_assigned + o.num_assigned,
            num_attachment: f.num_attachment + o.num_attachment,
            num_comment: f.num_comment + o.num_comment,
            size_attachment: f.size_attachment + o.size_attachment,
            dev_avg_time: if has_fixed { f.dev_avg_time } else { o.dev_avg_time },
            bug_avg_eta: if has_fixed { f.bug_avg_eta } else { o.bug_avg_eta },
            num_assigned_open: o.num_assigned,
        }
    }
}

/// The five normalized sub-scores for one (bug, candidate) pair.
///
/// # Examples
///
/// ```
/// use triago_assign::score::{CombinedSnapshot, SubScores};
/// use triago_core::{BugStatistics, ScoringWeights};
///
/// let stat = BugStatistics {
///     avg_num_assigned: 5.0,
///     avg_dev_avg_time: 100.0,
///     avg_num_comment: 4.0,
///     avg_num_attachment: 2.0,
///     avg_reviews: 10.0,
///     avg_size_attachment: 512.0,
/// };
/// let dev = CombinedSnapshot {
///     reviews: 10.0,
///     num_assigned: 10.0,
///     num_attachment: 2.0,
///     num_comment: 4.0,
///     size_attachment: 512.0,
///     dev_avg_time: 100.0,
///     bug_avg_eta: 50.0,
///     num_assigned_open: 3.0,
/// };
/// let scores = SubScores::compute(&stat, &dev);
/// assert_eq!(scores.competency, 3.0);
/// let rank = scores.rank(&ScoringWeights::default());
/// assert!(rank > 0.0);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SubScores {
    pub availability: f64,
    pub collaborativity: f64,
    pub competency: f64,
    pub productivity: f64,
    pub reliability: f64,
}

impl SubScores {
    /// Compute all five sub-scores from a bug's population averages and a
    /// candidate's combined snapshot.
    pub fn compute(stat: &BugStatistics, dev: &CombinedSnapshot) -> Self {
        let availability = safe_div(
            stat.avg_num_assigned,
            dev.num_assigned,
            stat.avg_num_assigned + 1.0,
        );

        let collaborativity = safe_div(dev.num_attachment, stat.avg_num_attachment, dev.num_attachment)
            + safe_div(dev.num_comment, stat.avg_num_comment, dev.num_comment);

        let competency = safe_div(dev.num_assigned, stat.avg_num_assigned, dev.num_assigned)
            + safe_div(dev.reviews, stat.avg_reviews, dev.reviews);

        let productivity = (safe_div(dev.reviews, stat.avg_reviews, 0.0)
            * (safe_div(dev.size_attachment, stat.avg_size_attachment, dev.size_attachment)
                * safe_div(dev.num_attachment, stat.avg_num_attachment, dev.num_attachment))
            + safe_div(dev.num_comment, stat.avg_num_comment, dev.num_comment))
            * safe_div(
                stat.avg_dev_avg_time,
                dev.dev_avg_time,
                stat.avg_dev_avg_time + 1.0,
            );

        let reliability = safe_div(dev.num_assigned, stat.avg_num_assigned, dev.num_assigned)
            * safe_div(
                stat.avg_dev_avg_time,
                dev.dev_avg_time,
                stat.avg_dev_avg_time + 1.0,
            );

        Self {
            availability,
            collaborativity,
            competency,
            productivity,
            reliability,
        }
    }

    /// Combine the sub-scores into a single rank via the configured weights.
    pub fn rank(&self, weights: &ScoringWeights) -> f64 {
        self.availability * weights.availability
            + self.collaborativity * weights.collaborativity
            + self.competency * weights.competency
            + self.productivity * weights.productivity
            + self.reliability * weights.reliability
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn snapshot(num_assigned: f64, reviews: f64) -> StatSnapshot {
        StatSnapshot {
            reviews,
            num_assigned,
            num_attachment: 2.0,
            num_comment: 4.0,
            size_attachment: 512.0,
            dev_avg_time: 100.0,
            bug_avg_eta: 50.0,
        }
    }

    fn baseline() -> BugStatistics {
        BugStatistics {
            avg_num_assigned: 5.0,
            avg_dev_avg_time: 100.0,
            avg_num_comment: 4.0,
            avg_num_attachment: 2.0,
            avg_reviews: 10.0,
            avg_size_attachment: 512.0,
        }
    }

    #[test]
    fn safe_div_zero_denominator_gives_default() {
        assert_eq!(safe_div(42.0, 0.0, 0.0), 0.0);
        assert_eq!(safe_div(0.0, 0.0, 9.0), 9.0);
        assert_eq!(safe_div(-1.0, 0.0, 3.5), 3.5);
    }

    #[test]
    fn safe_div_normal_division() {
        assert_eq!(safe_div(42.0, 1.0, 0.0), 42.0);
        assert_eq!(safe_div(1.0, 4.0, 0.0), 0.25);
    }

    #[test]
    fn safe_div_non_finite_denominator_gives_default() {
        assert_eq!(safe_div(1.0, f64::NAN, 2.0), 2.0);
        assert_eq!(safe_div(1.0, f64::INFINITY, 2.0), 2.0);
    }

    #[test]
    fn combine_sums_counts_across_snapshots() {
        let fixed = snapshot(3.0, 1.0);
        let open = snapshot(2.0, 4.0);
        let combined = CombinedSnapshot::combine(Some(&fixed), Some(&open));
        assert_eq!(combined.num_assigned, 5.0);
        assert_eq!(combined.reviews, 5.0);
        assert_eq!(combined.num_attachment, 4.0);
        assert_eq!(combined.num_assigned_open, 2.0);
    }

    #[test]
    fn combine_prefers_fixed_turnaround_when_present() {
        let mut fixed = snapshot(3.0, 1.0);
        fixed.dev_avg_time = 80.0;
        fixed.bug_avg_eta = 40.0;
        let mut open = snapshot(2.0, 4.0);
        open.dev_avg_time = 200.0;
        open.bug_avg_eta = 90.0;

        let combined = CombinedSnapshot::combine(Some(&fixed), Some(&open));
        assert_eq!(combined.dev_avg_time, 80.0);
        assert_eq!(combined.bug_avg_eta, 40.0);

        let open_only = CombinedSnapshot::combine(None, Some(&open));
        assert_eq!(open_only.dev_avg_time, 200.0);
        assert_eq!(open_only.bug_avg_eta, 90.0);
    }

    #[test]
    fn combine_missing_snapshots_are_zero() {
        let combined = CombinedSnapshot::combine(None, None);
        assert_eq!(combined, CombinedSnapshot::default());
    }

    #[test]
    fn availability_falls_with_load() {
        let stat = baseline();
        let light = CombinedSnapshot::combine(Some(&snapshot(2.0, 5.0)), None);
        let heavy = CombinedSnapshot::combine(Some(&snapshot(20.0, 5.0)), None);
        let s_light = SubScores::compute(&stat, &light);
        let s_heavy = SubScores::compute(&stat, &heavy);
        assert!(s_light.availability > s_heavy.availability);
    }

    #[test]
    fn no_history_candidate_gets_fallback_scores() {
        let stat = baseline();
        let empty = CombinedSnapshot::default();
        let scores = SubScores::compute(&stat, &empty);
        // avg/0 falls back to avg+1; all the x/avg ratios are plain zero
        assert_eq!(scores.availability, stat.avg_num_assigned + 1.0);
        assert_eq!(scores.collaborativity, 0.0);
        assert_eq!(scores.competency, 0.0);
        assert_eq!(scores.reliability, 0.0);
    }

    #[test]
    fn rank_is_weighted_sum() {
        let scores = SubScores {
            availability: 1.0,
            collaborativity: 2.0,
            competency: 3.0,
            productivity: 4.0,
            reliability: 5.0,
        };
        let weights = ScoringWeights {
            availability: 1.0,
            collaborativity: 1.0,
            competency: 1.0,
            productivity: 1.0,
            reliability: 1.0,
        };
        assert_eq!(scores.rank(&weights), 15.0);

        let default_rank = scores.rank(&ScoringWeights::default());
        let expected = 1.0 * 0.2 + 2.0 * 0.15 + 3.0 * 0.15 + 4.0 * 0.3 + 5.0 * 0.2;
        assert!((default_rank - expected).abs() < 1e-12);
    }

    #[test]
    fn heavier_competency_profile_outranks_with_equal_weights() {
        // Two candidates over the same baseline: d2 carries twice the
        // population-average assignment count and matches the average
        // review volume, so its competency and reliability terms dominate.
        let stat = baseline();
        let d1 = CombinedSnapshot::combine(Some(&snapshot(5.0, 2.0)), None);
        let d2 = CombinedSnapshot::combine(Some(&snapshot(10.0, 10.0)), None);

        let equal = ScoringWeights {
            availability: 1.0,
            collaborativity: 1.0,
            competency: 1.0,
            productivity: 1.0,
            reliability: 1.0,
        };

        let r1 = SubScores::compute(&stat, &d1).rank(&equal);
        let r2 = SubScores::compute(&stat, &d2).rank(&equal);

        // d1: availability 5/5=1, competency 5/5 + 2/10 = 1.2, reliability 1*1 = 1
        // d2: availability 5/10=0.5, competency 10/5 + 10/10 = 3, reliability 2*1 = 2
        let s1 = SubScores::compute(&stat, &d1);
        assert!((s1.availability - 1.0).abs() < 1e-12);
        assert!((s1.competency - 1.2).abs() < 1e-12);
        assert!((s1.reliability - 1.0).abs() < 1e-12);

        let s2 = SubScores::compute(&stat, &d2);
        assert!((s2.availability - 0.5).abs() < 1e-12);
        assert!((s2.competency - 3.0).abs() < 1e-12);
        assert!((s2.reliability - 2.0).abs() < 1e-12);

        assert!(r2 > r1);
    }
}

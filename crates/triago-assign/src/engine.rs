//! The greedy assignment engine.
//!
//! Bugs are processed sequentially in ascending id order; later bugs see
//! the load committed to developers by earlier bugs, so order matters and
//! is deterministic. All mutable per-pass state lives in an engine-owned
//! [`PassState`], never in globals, so independent runs (grid search
//! vectors) are fully isolated.

use std::collections::{BTreeMap, HashMap, HashSet};

use serde::{Deserialize, Serialize};
use triago_core::{
    Assignment, BugStatistics, CandidateEdge, DevClassKey, DeveloperTime, ScoringWeights,
    StatSnapshot,
};

use crate::capacity::CapacityGate;
use crate::score::{CombinedSnapshot, SubScores};

/// Sentinel lower than any attainable rank, so the first eligible
/// candidate is always provisionally accepted.
const INITIAL_RANK: f64 = -255.0;

/// Everything the engine consumes for one project, as produced by the
/// metric aggregation queries.
///
/// `candidates` is a `BTreeMap` keyed by bug id: iteration order is the
/// documented processing order of the pass.
#[derive(Debug, Clone, Default)]
pub struct AssignmentInput {
    /// Per-bug population averages.
    pub bug_stats: BTreeMap<i64, BugStatistics>,
    /// Per-bug candidate edges, in stable query order.
    pub candidates: BTreeMap<i64, Vec<CandidateEdge>>,
    /// Per-class developer snapshots.
    pub snapshots: HashMap<DevClassKey, StatSnapshot>,
    /// Per-developer historical time budgets.
    pub developer_time: HashMap<String, DeveloperTime>,
}

impl AssignmentInput {
    /// Number of bugs that have at least one candidate edge.
    pub fn biddable_bugs(&self) -> usize {
        self.candidates.len()
    }
}

/// The winning pick for one bug.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RankedAssignment {
    pub developer: String,
    pub rank: f64,
    /// The open-class assignment count committed for the winner,
    /// including this bug.
    pub num_assigned: f64,
}

/// Result of one assignment pass.
#[derive(Debug, Clone, Default)]
pub struct AssignmentOutcome {
    /// At most one entry per bug; bugs with no eligible candidate are
    /// absent, not errors.
    pub assignments: BTreeMap<i64, RankedAssignment>,
    /// Number of bugs that were up for assignment.
    pub biddable_bugs: usize,
    /// Final per-developer committed load, in minutes.
    pub developer_load: HashMap<String, f64>,
}

impl AssignmentOutcome {
    /// The bug → developer picks, for evaluation.
    pub fn picks(&self) -> BTreeMap<i64, String> {
        self.assignments
            .iter()
            .map(|(bug, ranked)| (*bug, ranked.developer.clone()))
            .collect()
    }

    /// Rows for the persistence write-back.
    pub fn to_rows(&self, project_id: i64) -> Vec<Assignment> {
        self.assignments
            .iter()
            .map(|(bug, ranked)| Assignment {
                bug_id: *bug,
                project_id,
                developer: ranked.developer.clone(),
            })
            .collect()
    }

    /// `true` when every biddable bug received an assignee.
    pub fn is_complete(&self) -> bool {
        self.assignments.len() == self.biddable_bugs
    }
}

/// Mutable state for a single pass: committed load, the monotonic busy
/// set, and a snapshot overlay carrying hypothetical `num_assigned`
/// increments.
struct PassState {
    load: HashMap<String, f64>,
    busy: HashSet<String>,
    overlay: HashMap<DevClassKey, StatSnapshot>,
}

/// The provisional commitment made for a bug's current best candidate.
/// Held so a better-ranked candidate can displace it cleanly.
struct Provisional {
    developer: String,
    open_key: DevClassKey,
    rank: f64,
    eta: f64,
    num_assigned: f64,
    prior_snapshot: Option<StatSnapshot>,
}

impl PassState {
    fn new() -> Self {
        Self {
            load: HashMap::new(),
            busy: HashSet::new(),
            overlay: HashMap::new(),
        }
    }

    fn load_of(&self, developer: &str) -> f64 {
        self.load.get(developer).copied().unwrap_or(0.0)
    }

    /// Overlay first, base input second.
    fn snapshot<'a>(&'a self, input: &'a AssignmentInput, key: &DevClassKey) -> Option<&'a StatSnapshot> {
        self.overlay.get(key).or_else(|| input.snapshots.get(key))
    }

    fn commit(&mut self, prov: &Provisional, input: &AssignmentInput) {
        *self.load.entry(prov.developer.clone()).or_insert(0.0) += prov.eta;
        let mut snapshot = self
            .snapshot(input, &prov.open_key)
            .copied()
            .unwrap_or_default();
        snapshot.num_assigned = prov.num_assigned;
        self.overlay.insert(prov.open_key.clone(), snapshot);
    }

    fn revert(&mut self, prov: Provisional) {
        if let Some(load) = self.load.get_mut(&prov.developer) {
            *load -= prov.eta;
        }
        match prov.prior_snapshot {
            Some(snapshot) => {
                self.overlay.insert(prov.open_key, snapshot);
            }
            None => {
                self.overlay.remove(&prov.open_key);
            }
        }
    }
}

/// Multi-pass greedy engine: for each bug, the highest-ranked candidate
/// with remaining capacity wins, and the win debits that developer's
/// budget for every later bug.
///
/// # Examples
///
/// ```
/// use triago_assign::capacity::CapacityGate;
/// use triago_assign::engine::{AssignmentEngine, AssignmentInput};
/// use triago_core::{ScoringConfig, ScoringWeights};
///
/// let gate = CapacityGate::new(&ScoringConfig::default()).unwrap();
/// let engine = AssignmentEngine::new(AssignmentInput::default(), gate);
/// let outcome = engine.run(&ScoringWeights::default());
/// assert!(outcome.assignments.is_empty());
/// ```
pub struct AssignmentEngine {
    input: AssignmentInput,
    gate: CapacityGate,
}

impl AssignmentEngine {
    pub fn new(input: AssignmentInput, gate: CapacityGate) -> Self {
        Self { input, gate }
    }

    pub fn input(&self) -> &AssignmentInput {
        &self.input
    }

    /// Run one full pass with the given weights. Each call starts from a
    /// fresh [`PassState`]; results for fixed input and weights are
    /// identical across calls.
    pub fn run(&self, weights: &ScoringWeights) -> AssignmentOutcome {
        let mut state = PassState::new();
        let mut assignments = BTreeMap::new();

        for (bug_id, edges) in &self.input.candidates {
            let stat = self
                .input
                .bug_stats
                .get(bug_id)
                .copied()
                .unwrap_or_default();

            let best = self.evaluate_bug(&stat, edges, weights, &mut state);
            if let Some(winner) = best {
                assignments.insert(
                    *bug_id,
                    RankedAssignment {
                        developer: winner.developer,
                        rank: winner.rank,
                        num_assigned: winner.num_assigned,
                    },
                );
            }
        }

        AssignmentOutcome {
            assignments,
            biddable_bugs: self.input.candidates.len(),
            developer_load: state.load,
        }
    }

    /// Walk a bug's candidates and leave the winner's debit committed in
    /// `state`. A displaced provisional best is rolled back in full before
    /// the next candidate's debit lands.
    fn evaluate_bug(
        &self,
        stat: &BugStatistics,
        edges: &[CandidateEdge],
        weights: &ScoringWeights,
        state: &mut PassState,
    ) -> Option<Provisional> {
        let mut best: Option<Provisional> = None;
        let mut best_rank = INITIAL_RANK;
        let mut seen: HashSet<&str> = HashSet::new();

        for edge in edges {
            // A developer reachable via several class edges is evaluated once.
            if !seen.insert(edge.developer.as_str()) {
                continue;
            }
            // Capacity only depletes: once busy, busy for the rest of the pass.
            if state.busy.contains(&edge.developer) {
                continue;
            }

            let time = self
                .input
                .developer_time
                .get(&edge.developer)
                .copied()
                .unwrap_or_default();
            if self.gate.is_busy(&time, state.load_of(&edge.developer)) {
                state.busy.insert(edge.developer.clone());
                continue;
            }

            let fixed_key =
                DevClassKey::new(&*edge.developer, &*edge.component, &*edge.priority, false);
            let open_key = fixed_key.with_open(true);
            let combined = CombinedSnapshot::combine(
                state.snapshot(&self.input, &fixed_key),
                state.snapshot(&self.input, &open_key),
            );

            let rank = SubScores::compute(stat, &combined).rank(weights);
            if rank > best_rank {
                let prov = Provisional {
                    developer: edge.developer.clone(),
                    prior_snapshot: state.snapshot(&self.input, &open_key).copied(),
                    open_key,
                    rank,
                    eta: combined.bug_avg_eta,
                    num_assigned: combined.num_assigned_open + 1.0,
                };
                if let Some(previous) = best.take() {
                    state.revert(previous);
                }
                state.commit(&prov, &self.input);
                best_rank = rank;
                best = Some(prov);
            }
        }

        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use triago_core::ScoringConfig;

    fn gate() -> CapacityGate {
        CapacityGate::new(&ScoringConfig::default()).unwrap()
    }

    fn edge(developer: &str) -> CandidateEdge {
        CandidateEdge {
            developer: developer.into(),
            component: "DOM".into(),
            priority: "P1".into(),
            is_open: false,
        }
    }

    fn fixed_snapshot(num_assigned: f64, reviews: f64, eta: f64) -> StatSnapshot {
        StatSnapshot {
            reviews,
            num_assigned,
            num_attachment: 2.0,
            num_comment: 4.0,
            size_attachment: 512.0,
            dev_avg_time: 100.0,
            bug_avg_eta: eta,
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

    fn plenty_of_time() -> DeveloperTime {
        DeveloperTime {
            available: 100_000.0,
            unavailable: 0.0,
        }
    }

    fn equal_weights() -> ScoringWeights {
        ScoringWeights {
            availability: 1.0,
            collaborativity: 1.0,
            competency: 1.0,
            productivity: 1.0,
            reliability: 1.0,
        }
    }

    fn input_with(
        bugs: &[i64],
        edges_per_bug: Vec<Vec<CandidateEdge>>,
        snapshots: Vec<(DevClassKey, StatSnapshot)>,
        times: Vec<(&str, DeveloperTime)>,
    ) -> AssignmentInput {
        let mut input = AssignmentInput::default();
        for (bug, edges) in bugs.iter().zip(edges_per_bug) {
            input.bug_stats.insert(*bug, baseline());
            input.candidates.insert(*bug, edges);
        }
        for (key, snapshot) in snapshots {
            input.snapshots.insert(key, snapshot);
        }
        for (dev, time) in times {
            input.developer_time.insert(dev.into(), time);
        }
        input
    }

    #[test]
    fn competency_heavy_candidate_wins() {
        // d1: numAssigned=5, reviews=2; d2: numAssigned=10, reviews=10.
        // With equal weights d2's competency term dominates: rank(d1)=6.4,
        // rank(d2)=9.5 over this baseline.
        let input = input_with(
            &[1],
            vec![vec![edge("d1"), edge("d2")]],
            vec![
                (
                    DevClassKey::new("d1", "DOM", "P1", false),
                    fixed_snapshot(5.0, 2.0, 50.0),
                ),
                (
                    DevClassKey::new("d2", "DOM", "P1", false),
                    fixed_snapshot(10.0, 10.0, 50.0),
                ),
            ],
            vec![("d1", plenty_of_time()), ("d2", plenty_of_time())],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        let winner = &outcome.assignments[&1];
        assert_eq!(winner.developer, "d2");
        assert!((winner.rank - 9.5).abs() < 1e-9);
    }

    #[test]
    fn runs_are_deterministic() {
        let input = input_with(
            &[1, 2, 3],
            vec![
                vec![edge("d1"), edge("d2")],
                vec![edge("d2"), edge("d3")],
                vec![edge("d1"), edge("d3")],
            ],
            vec![
                (
                    DevClassKey::new("d1", "DOM", "P1", false),
                    fixed_snapshot(5.0, 2.0, 50.0),
                ),
                (
                    DevClassKey::new("d2", "DOM", "P1", false),
                    fixed_snapshot(10.0, 10.0, 50.0),
                ),
                (
                    DevClassKey::new("d3", "DOM", "P1", false),
                    fixed_snapshot(7.0, 6.0, 30.0),
                ),
            ],
            vec![
                ("d1", plenty_of_time()),
                ("d2", plenty_of_time()),
                ("d3", plenty_of_time()),
            ],
        );

        let engine = AssignmentEngine::new(input, gate());
        let weights = ScoringWeights::default();
        let first = engine.run(&weights);
        let second = engine.run(&weights);
        assert_eq!(first.picks(), second.picks());
        assert_eq!(first.developer_load, second.developer_load);
    }

    #[test]
    fn duplicate_edges_are_evaluated_once() {
        // d1 appears via two class edges for the same bug; its budget is
        // barely enough for a single debit, so double counting would make
        // it busy for the second bug.
        let mut e2 = edge("d1");
        e2.priority = "P2".into();
        let input = input_with(
            &[1, 2],
            vec![vec![edge("d1"), e2], vec![edge("d1")]],
            vec![(
                DevClassKey::new("d1", "DOM", "P1", false),
                fixed_snapshot(5.0, 2.0, 100.0),
            )],
            vec![(
                "d1",
                DeveloperTime {
                    // 1.1 * available * (60/90) must stay above one eta
                    // debit (100) but not two.
                    available: 205.0,
                    unavailable: 0.0,
                },
            )],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        // 1.1 * 205 * 2/3 = 150.3: one debit leaves 50.3, a double-counted
        // pass would have left d1 busy for bug 2.
        assert_eq!(outcome.assignments[&1].developer, "d1");
        assert_eq!(outcome.assignments[&2].developer, "d1");
        assert_eq!(outcome.developer_load["d1"], 200.0);
    }

    #[test]
    fn displaced_candidate_load_is_fully_reverted() {
        // Three candidates of strictly increasing rank; only the final
        // winner's debit must remain.
        let input = input_with(
            &[1],
            vec![vec![edge("weak"), edge("mid"), edge("strong")]],
            vec![
                (
                    DevClassKey::new("weak", "DOM", "P1", false),
                    fixed_snapshot(2.0, 1.0, 10.0),
                ),
                (
                    DevClassKey::new("mid", "DOM", "P1", false),
                    fixed_snapshot(7.0, 5.0, 20.0),
                ),
                (
                    DevClassKey::new("strong", "DOM", "P1", false),
                    fixed_snapshot(10.0, 10.0, 40.0),
                ),
            ],
            vec![
                ("weak", plenty_of_time()),
                ("mid", plenty_of_time()),
                ("strong", plenty_of_time()),
            ],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        assert_eq!(outcome.assignments[&1].developer, "strong");
        assert_eq!(outcome.developer_load.get("weak").copied().unwrap_or(0.0), 0.0);
        assert_eq!(outcome.developer_load.get("mid").copied().unwrap_or(0.0), 0.0);
        assert_eq!(outcome.developer_load["strong"], 40.0);
    }

    #[test]
    fn busy_developer_is_never_assigned() {
        // d1 would rank highest, but its time budget fails the gate:
        // available * opened/fixed - unavailable <= 0.
        let input = input_with(
            &[1, 2],
            vec![vec![edge("d1"), edge("d2")], vec![edge("d1"), edge("d2")]],
            vec![
                (
                    DevClassKey::new("d1", "DOM", "P1", false),
                    fixed_snapshot(10.0, 10.0, 50.0),
                ),
                (
                    DevClassKey::new("d2", "DOM", "P1", false),
                    fixed_snapshot(5.0, 2.0, 50.0),
                ),
            ],
            vec![
                (
                    "d1",
                    DeveloperTime {
                        available: 100.0,
                        unavailable: 10_000.0,
                    },
                ),
                ("d2", plenty_of_time()),
            ],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        for (_, ranked) in &outcome.assignments {
            assert_ne!(ranked.developer, "d1");
        }
        assert_eq!(outcome.assignments[&1].developer, "d2");
        assert_eq!(outcome.assignments[&2].developer, "d2");
    }

    #[test]
    fn busy_set_is_monotonic_across_bugs() {
        // d1 has budget for exactly one debit. After winning bug 1 it goes
        // busy while evaluating bug 2 and must stay unassigned from then on.
        let input = input_with(
            &[1, 2, 3],
            vec![
                vec![edge("d1")],
                vec![edge("d1"), edge("d2")],
                vec![edge("d1"), edge("d2")],
            ],
            vec![
                (
                    DevClassKey::new("d1", "DOM", "P1", false),
                    fixed_snapshot(10.0, 10.0, 100.0),
                ),
                (
                    DevClassKey::new("d2", "DOM", "P1", false),
                    fixed_snapshot(5.0, 2.0, 10.0),
                ),
            ],
            vec![
                (
                    "d1",
                    DeveloperTime {
                        available: 205.0,
                        unavailable: 0.0,
                    },
                ),
                ("d2", plenty_of_time()),
            ],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        assert_eq!(outcome.assignments[&1].developer, "d1");
        // 150.3 - 100 = 50.3 left; the second debit would need 100 more.
        assert_eq!(outcome.assignments[&2].developer, "d2");
        assert_eq!(outcome.assignments[&3].developer, "d2");
    }

    #[test]
    fn hypothetical_num_assigned_carries_to_later_bugs() {
        // After d1 wins bug 1, its open-class num_assigned is 1, so bug 2
        // scores d1 with the incremented count (lower availability).
        let input = input_with(
            &[1, 2],
            vec![vec![edge("d1")], vec![edge("d1")]],
            vec![(
                DevClassKey::new("d1", "DOM", "P1", false),
                fixed_snapshot(5.0, 2.0, 10.0),
            )],
            vec![("d1", plenty_of_time())],
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        assert_eq!(outcome.assignments[&1].num_assigned, 1.0);
        assert_eq!(outcome.assignments[&2].num_assigned, 2.0);
    }

    #[test]
    fn bug_with_no_candidates_is_skipped_not_an_error() {
        let mut input = input_with(&[], vec![], vec![], vec![]);
        input.bug_stats.insert(7, baseline());
        input.candidates.insert(7, vec![]);

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        assert!(outcome.assignments.is_empty());
        assert_eq!(outcome.biddable_bugs, 1);
        assert!(!outcome.is_complete());
    }

    #[test]
    fn bugs_are_processed_in_ascending_id_order() {
        // d1 has budget for one bug; insertion order is reversed but the
        // BTreeMap iterates ascending, so bug 1 gets d1.
        let mut input = AssignmentInput::default();
        for bug in [5, 1] {
            input.bug_stats.insert(bug, baseline());
            input.candidates.insert(bug, vec![edge("d1")]);
        }
        input.snapshots.insert(
            DevClassKey::new("d1", "DOM", "P1", false),
            fixed_snapshot(5.0, 2.0, 100.0),
        );
        input.developer_time.insert(
            "d1".into(),
            DeveloperTime {
                available: 205.0,
                unavailable: 0.0,
            },
        );

        let outcome = AssignmentEngine::new(input, gate()).run(&equal_weights());
        assert!(outcome.assignments.contains_key(&1));
        assert!(!outcome.assignments.contains_key(&5));
    }
}

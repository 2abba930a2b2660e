use std::collections::{BTreeMap, BTreeSet};

use triago_core::{
    Attachment, Bug, BugRelation, Comment, Developer, HistoryChange, RelationKind, Result,
};

use crate::client::{BugzillaClient, ScrapedBug};

/// How a sweep treats recently fixed bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RunMode {
    /// Normal run: fixed bugs stay fixed.
    #[default]
    Analysis,
    /// Evaluation run: the fixed sweep comes from the period before the
    /// open window, and a third of its bugs are re-opened with their true
    /// assignee held out as ground truth.
    Test,
}

/// Source URL of each payload section, recorded for cache keying.
#[derive(Debug, Clone, Default)]
pub struct SweepUrls {
    pub bugs: String,
    pub developers: String,
    pub attachments: String,
    pub comments: String,
    pub history: String,
    pub relations: String,
}

/// Everything one full tracker sweep produces, ready to cache and import.
#[derive(Debug, Clone, Default)]
pub struct TrackerSnapshot {
    pub bugs: BTreeMap<i64, Bug>,
    pub developers: BTreeMap<String, Developer>,
    pub attachments: Vec<Attachment>,
    pub comments: Vec<Comment>,
    pub history: Vec<HistoryChange>,
    pub relations: Vec<BugRelation>,
    pub urls: SweepUrls,
}

impl BugzillaClient {
    /// Run the full sweep: fixed and open bug queries, dependency pruning,
    /// relation extraction, then attachment / comment / history detail for
    /// the first `fetch_limit` bugs.
    ///
    /// # Errors
    ///
    /// Returns [`triago_core::TriagoError::Http`] if any tracker query
    /// fails; a partial sweep is never returned.
    pub async fn snapshot(&self, mode: RunMode) -> Result<TrackerSnapshot> {
        let mut snapshot = TrackerSnapshot::default();

        let fixed = self.closed_fixed(mode == RunMode::Test).await?;
        snapshot.urls.developers = fixed.url;
        let mut scraped = fixed.payload;
        if mode == RunMode::Test {
            hold_out_fixed(&mut scraped, self.unassigned_login());
        }

        let unassigned = self.open_unassigned().await?;
        scraped.extend(unassigned.payload);
        let assigned = self.open_assigned().await?;
        snapshot.urls.bugs = assigned.url;
        scraped.extend(assigned.payload);

        let mut open_deps = BTreeSet::new();
        let mut edges: BTreeMap<i64, (Vec<i64>, Vec<i64>)> = BTreeMap::new();
        for item in scraped {
            if let Some(dev) = item.assignee {
                snapshot.developers.insert(dev.login.clone(), dev);
            }
            if item.bug.is_open {
                open_deps.extend(item.depends_on.iter().copied());
            }
            edges.insert(item.bug.id, (item.blocks, item.depends_on));
            snapshot.bugs.insert(item.bug.id, item.bug);
        }

        // An open bug whose dependency is itself still open cannot be
        // worked on yet; drop it from the sweep.
        if !open_deps.is_empty() {
            let deps: Vec<i64> = open_deps.into_iter().collect();
            let unresolved = self.bugs_by_ids(&deps, true).await?;
            snapshot.urls.relations = unresolved.url;
            prune_blocked(&mut snapshot.bugs, &unresolved.payload);
        }
        edges.retain(|id, _| snapshot.bugs.contains_key(id));
        snapshot.relations = collect_relations(&edges);

        let detail_ids: Vec<i64> = snapshot
            .bugs
            .keys()
            .copied()
            .take(self.fetch_limit())
            .collect();
        if detail_ids.is_empty() {
            return Ok(snapshot);
        }

        let attachments = self.attachments(&detail_ids).await?;
        snapshot.urls.attachments = attachments.url;
        snapshot.attachments = attachments.payload;

        let missing = missing_creators(&snapshot.attachments, &snapshot.developers);
        if !missing.is_empty() {
            let users = self.users(&missing).await?;
            for dev in users.payload {
                snapshot.developers.insert(dev.login.clone(), dev);
            }
        }

        let comments = self.comments(&detail_ids).await?;
        snapshot.urls.comments = comments.url;
        snapshot.comments = comments.payload;

        let history = self.history(&detail_ids).await?;
        snapshot.urls.history = history.url;
        snapshot.history = history.payload;

        Ok(snapshot)
    }
}

/// Re-open every third fixed bug and hold its true assignee out as ground
/// truth. Bugs that were never really assigned are left alone.
pub fn hold_out_fixed(bugs: &mut [ScrapedBug], unassigned_login: &str) {
    for item in bugs.iter_mut().step_by(3) {
        if item.bug.assigned_to == unassigned_login {
            continue;
        }
        item.bug.real_assignee = Some(item.bug.assigned_to.clone());
        item.bug.assigned_to = unassigned_login.to_string();
        item.bug.is_open = true;
        item.assignee = None;
    }
}

/// Remove open bugs that are blocked by a dependency the tracker reports
/// as still open.
pub fn prune_blocked(bugs: &mut BTreeMap<i64, Bug>, unresolved: &[ScrapedBug]) {
    for dep in unresolved {
        for blocked in &dep.blocks {
            if bugs.get(blocked).is_some_and(|b| b.is_open) {
                bugs.remove(blocked);
            }
        }
    }
}

/// Turn per-bug blocks / depends_on id lists into typed relation rows.
pub fn collect_relations(edges: &BTreeMap<i64, (Vec<i64>, Vec<i64>)>) -> Vec<BugRelation> {
    let mut relations = Vec::new();
    for (&bug_id, (blocks, depends_on)) in edges {
        for &related_id in blocks {
            relations.push(BugRelation {
                bug_id,
                related_id,
                kind: RelationKind::Blocks,
            });
        }
        for &related_id in depends_on {
            relations.push(BugRelation {
                bug_id,
                related_id,
                kind: RelationKind::DependsOn,
            });
        }
    }
    relations
}

/// Attachment creators the bug sweeps never mentioned, in stable order.
pub fn missing_creators(
    attachments: &[Attachment],
    developers: &BTreeMap<String, Developer>,
) -> Vec<String> {
    let mut missing = BTreeSet::new();
    for attachment in attachments {
        if !developers.contains_key(&attachment.creator) {
            missing.insert(attachment.creator.clone());
        }
    }
    missing.into_iter().collect()
}

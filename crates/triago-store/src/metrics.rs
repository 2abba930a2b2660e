//! Read-side aggregation: the scoring pass's input, derived from the
//! persisted records through the store's SQL views. Pure reads, no side
//! effects.

use std::collections::{BTreeMap, HashMap};

use rusqlite::params;
use triago_assign::{AssignmentInput, Confusion};
use triago_core::{
    BugStatistics, CandidateEdge, DevClassKey, DeveloperTime, Result, StatSnapshot, TriagoError,
};

use crate::db::IssueStore;

impl IssueStore {
    /// Per-bug population averages over the candidate view, grouped by
    /// (bug, component, priority, severity).
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::NoData`] when the project has no candidate
    /// rows, [`TriagoError::Database`] on query failure.
    pub fn bug_statistics(&self, project_id: i64) -> Result<BTreeMap<i64, BugStatistics>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT issue_id,
                        AVG(num_assigned), AVG(dev_avg_time), AVG(num_comment),
                        AVG(num_attachment), AVG(reviews), AVG(size_attachment)
                 FROM view_assignment
                 WHERE project_id = ?1
                 GROUP BY issue_id, component, priority, severity
                 ORDER BY issue_id",
            )
            .map_err(query_err)?;

        let mut stats = BTreeMap::new();
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    BugStatistics {
                        avg_num_assigned: row.get(1)?,
                        avg_dev_avg_time: row.get(2)?,
                        avg_num_comment: row.get(3)?,
                        avg_num_attachment: row.get(4)?,
                        avg_reviews: row.get(5)?,
                        avg_size_attachment: row.get(6)?,
                    },
                ))
            })
            .map_err(query_err)?;
        for row in rows {
            let (bug_id, bug_stats) = row.map_err(query_err)?;
            stats.insert(bug_id, bug_stats);
        }

        if stats.is_empty() {
            return Err(no_data(project_id, "bug statistics"));
        }
        Ok(stats)
    }

    /// Every (bug, developer, component, priority, open-flag) row of the
    /// candidate view: per-bug edges in stable query order, plus the
    /// per-class snapshots they point at.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::NoData`] when the project has no candidate
    /// rows, [`TriagoError::Database`] on query failure.
    pub fn candidate_edges(
        &self,
        project_id: i64,
    ) -> Result<(
        BTreeMap<i64, Vec<CandidateEdge>>,
        HashMap<DevClassKey, StatSnapshot>,
    )> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT issue_id, component, priority, developer, is_open,
                        reviews, num_assigned, num_attachment, num_comment,
                        size_attachment, dev_avg_time, bug_avg_eta
                 FROM view_assignment
                 WHERE project_id = ?1
                 ORDER BY issue_id, developer, is_open",
            )
            .map_err(query_err)?;

        let mut candidates: BTreeMap<i64, Vec<CandidateEdge>> = BTreeMap::new();
        let mut snapshots = HashMap::new();
        let rows = stmt
            .query_map(params![project_id], |row| {
                let bug_id: i64 = row.get(0)?;
                let edge = CandidateEdge {
                    component: row.get(1)?,
                    priority: row.get(2)?,
                    developer: row.get(3)?,
                    is_open: row.get(4)?,
                };
                let snapshot = StatSnapshot {
                    reviews: row.get(5)?,
                    num_assigned: row.get(6)?,
                    num_attachment: row.get(7)?,
                    num_comment: row.get(8)?,
                    size_attachment: row.get(9)?,
                    dev_avg_time: row.get(10)?,
                    bug_avg_eta: row.get(11)?,
                };
                Ok((bug_id, edge, snapshot))
            })
            .map_err(query_err)?;
        for row in rows {
            let (bug_id, edge, snapshot) = row.map_err(query_err)?;
            let key = DevClassKey::new(
                edge.developer.clone(),
                edge.component.clone(),
                edge.priority.clone(),
                edge.is_open,
            );
            snapshots.insert(key, snapshot);
            candidates.entry(bug_id).or_default().push(edge);
        }

        if candidates.is_empty() {
            return Err(no_data(project_id, "candidate edges"));
        }
        Ok((candidates, snapshots))
    }

    /// Minutes each developer has spent on fixed vs still-open bugs.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::NoData`] when the project has no bugs,
    /// [`TriagoError::Database`] on query failure.
    pub fn developer_time(&self, project_id: i64) -> Result<HashMap<String, DeveloperTime>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT developer, available, unavailable
                 FROM view_developer_time
                 WHERE project_id = ?1",
            )
            .map_err(query_err)?;

        let mut time = HashMap::new();
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    DeveloperTime {
                        available: row.get(1)?,
                        unavailable: row.get(2)?,
                    },
                ))
            })
            .map_err(query_err)?;
        for row in rows {
            let (developer, budget) = row.map_err(query_err)?;
            time.insert(developer, budget);
        }

        if time.is_empty() {
            return Err(no_data(project_id, "developer time"));
        }
        Ok(time)
    }

    /// Bug id to real assignee for held-out bugs.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] on query failure. An empty map
    /// is a valid result: analysis runs hold nothing out.
    pub fn ground_truth(&self, project_id: i64) -> Result<BTreeMap<i64, String>> {
        let mut stmt = self
            .conn
            .prepare(
                "SELECT issue_id, real_assignee FROM issue_data
                 WHERE project_id = ?1 AND real_assignee IS NOT NULL
                 ORDER BY issue_id",
            )
            .map_err(query_err)?;

        let mut truth = BTreeMap::new();
        let rows = stmt
            .query_map(params![project_id], |row| {
                Ok((row.get::<_, i64>(0)?, row.get::<_, String>(1)?))
            })
            .map_err(query_err)?;
        for row in rows {
            let (bug_id, assignee) = row.map_err(query_err)?;
            truth.insert(bug_id, assignee);
        }
        Ok(truth)
    }

    /// Score the persisted assignment write-back against the held-out
    /// assignees, straight from SQL.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::NoData`] when the project holds nothing
    /// out, [`TriagoError::Database`] on query failure.
    pub fn reality_check(&self, project_id: i64) -> Result<Confusion> {
        let result = self.conn.query_row(
            "SELECT tp, fp, fn_count FROM view_reality_check WHERE project_id = ?1",
            params![project_id],
            |row| {
                Ok(Confusion::new(
                    row.get::<_, i64>(0)? as u64,
                    row.get::<_, i64>(1)? as u64,
                    row.get::<_, i64>(2)? as u64,
                ))
            },
        );
        match result {
            Ok(confusion) => Ok(confusion),
            Err(rusqlite::Error::QueryReturnedNoRows) => {
                Err(no_data(project_id, "reality check"))
            }
            Err(e) => Err(query_err(e)),
        }
    }

    /// Bundle statistics, candidate edges, snapshots, and time budgets
    /// into one engine input.
    ///
    /// # Errors
    ///
    /// Propagates the first failing read.
    pub fn assignment_input(&self, project_id: i64) -> Result<AssignmentInput> {
        let bug_stats = self.bug_statistics(project_id)?;
        let (candidates, snapshots) = self.candidate_edges(project_id)?;
        let developer_time = self.developer_time(project_id)?;
        Ok(AssignmentInput {
            bug_stats,
            candidates,
            snapshots,
            developer_time,
        })
    }
}

fn query_err(e: rusqlite::Error) -> TriagoError {
    TriagoError::Database(format!("aggregate query failed: {e}"))
}

fn no_data(project_id: i64, what: &str) -> TriagoError {
    TriagoError::NoData(format!("no {what} rows for project {project_id}"))
}

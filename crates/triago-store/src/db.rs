use std::path::Path;

use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use triago_core::{
    Assignment, Attachment, Bug, BugRelation, Comment, Developer, HistoryChange, RankConfig,
    Result, TriagoError,
};

/// Longest text kept for a history change's added / removed values.
pub const HISTORY_TEXT_LIMIT: usize = 255;

const NOBODY_REAL_NAME: &str = "Nobody; OK to take it and work on it";

/// SQLite-backed issue store.
///
/// Holds the scraped records (projects, bugs, developers, attachments,
/// comments, history, dependency edges) and the aggregate views the
/// scoring pass reads. Bugs are persisted once per import and are
/// read-only during scoring; only assignment write-back adds rows.
///
/// # Examples
///
/// ```
/// use triago_store::IssueStore;
///
/// let store = IssueStore::in_memory().unwrap();
/// assert!(store.project_id("https://bugzilla.example/", "demo").unwrap().is_none());
/// ```
pub struct IssueStore {
    pub(crate) conn: Connection,
}

impl IssueStore {
    /// Open or create a store at the given path. Creates the schema if
    /// it doesn't exist.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] if the database cannot be opened.
    ///
    /// # Examples
    ///
    /// ```no_run
    /// use std::path::Path;
    /// use triago_store::IssueStore;
    ///
    /// let store = IssueStore::open(Path::new(".triago/issues.db")).unwrap();
    /// ```
    pub fn open(path: &Path) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                TriagoError::Database(format!("failed to create store directory: {e}"))
            })?;
        }
        let conn = Connection::open(path)
            .map_err(|e| TriagoError::Database(format!("failed to open database: {e}")))?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    /// Create an in-memory store (for testing).
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] if schema creation fails.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory().map_err(|e| {
            TriagoError::Database(format!("failed to create in-memory database: {e}"))
        })?;

        let store = Self { conn };
        store.init_schema()?;
        Ok(store)
    }

    fn init_schema(&self) -> Result<()> {
        self.conn
            .execute_batch(
                "
                PRAGMA foreign_keys = ON;

                CREATE TABLE IF NOT EXISTS issue_project (
                    project_id INTEGER PRIMARY KEY AUTOINCREMENT,
                    url TEXT NOT NULL,
                    name TEXT NOT NULL,
                    unassigned_login TEXT NOT NULL,
                    UNIQUE (url, name)
                );

                CREATE TABLE IF NOT EXISTS issue_data (
                    issue_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    summary TEXT NOT NULL,
                    component TEXT NOT NULL,
                    creation_time TEXT NOT NULL,
                    creator TEXT NOT NULL,
                    assigned_to TEXT NOT NULL,
                    spent_time INTEGER NOT NULL,
                    priority TEXT NOT NULL,
                    priority_value INTEGER NOT NULL,
                    severity TEXT NOT NULL,
                    severity_value INTEGER NOT NULL,
                    status TEXT NOT NULL,
                    resolution TEXT NOT NULL,
                    is_open INTEGER NOT NULL,
                    votes INTEGER NOT NULL,
                    comment_count INTEGER NOT NULL,
                    keywords TEXT NOT NULL,
                    last_resolved TEXT,
                    real_assignee TEXT,
                    PRIMARY KEY (issue_id, project_id),
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_developer (
                    name TEXT NOT NULL,
                    project_id INTEGER NOT NULL,
                    tracker_id INTEGER NOT NULL,
                    real_name TEXT NOT NULL,
                    PRIMARY KEY (name, project_id),
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_cclist (
                    issue_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    developer_name TEXT NOT NULL,
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_dependencies (
                    issue_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    related_issue_id INTEGER NOT NULL,
                    relation_type TEXT NOT NULL,
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_attachment (
                    attachment_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    issue_id INTEGER NOT NULL,
                    creator TEXT NOT NULL,
                    creation_time TEXT NOT NULL,
                    is_obsolete INTEGER NOT NULL,
                    is_patch INTEGER NOT NULL,
                    is_private INTEGER NOT NULL,
                    size INTEGER NOT NULL,
                    positive_reviews INTEGER NOT NULL,
                    PRIMARY KEY (attachment_id, project_id),
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_comment (
                    comment_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    issue_id INTEGER NOT NULL,
                    author TEXT NOT NULL,
                    time TEXT NOT NULL,
                    raw_text TEXT NOT NULL,
                    PRIMARY KEY (comment_id, project_id),
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_history (
                    issue_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    who TEXT NOT NULL,
                    time TEXT NOT NULL,
                    added TEXT NOT NULL,
                    removed TEXT NOT NULL,
                    attachment_id INTEGER,
                    field_name TEXT NOT NULL,
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                CREATE TABLE IF NOT EXISTS issue_assignment (
                    issue_id INTEGER NOT NULL,
                    project_id INTEGER NOT NULL,
                    developer_name TEXT NOT NULL,
                    PRIMARY KEY (issue_id, project_id),
                    FOREIGN KEY (project_id)
                        REFERENCES issue_project(project_id) ON DELETE CASCADE
                );

                -- Minutes a developer has sunk into fixed vs still-open
                -- bugs, plus their overall average resolution time.
                CREATE VIEW IF NOT EXISTS view_developer_time AS
                SELECT project_id,
                       assigned_to AS developer,
                       AVG(spent_time) AS dev_avg_time,
                       SUM(CASE WHEN is_open = 0 THEN spent_time ELSE 0 END) AS available,
                       SUM(CASE WHEN is_open = 1 THEN spent_time ELSE 0 END) AS unavailable
                FROM issue_data
                GROUP BY project_id, assigned_to;

                -- Per (developer, component, priority, open-flag) class:
                -- how many bugs of the class the developer carried and the
                -- class's average turnaround.
                CREATE VIEW IF NOT EXISTS view_dev_class AS
                SELECT d.project_id AS project_id,
                       d.assigned_to AS developer,
                       d.component AS component,
                       d.priority AS priority,
                       d.is_open AS is_open,
                       COUNT(*) AS num_assigned,
                       AVG(d.spent_time) AS bug_avg_eta
                FROM issue_data d
                JOIN issue_project p ON p.project_id = d.project_id
                WHERE d.assigned_to <> p.unassigned_login
                GROUP BY d.project_id, d.assigned_to, d.component, d.priority, d.is_open;

                CREATE VIEW IF NOT EXISTS view_attachment_class AS
                SELECT a.project_id AS project_id,
                       a.creator AS developer,
                       d.component AS component,
                       d.priority AS priority,
                       d.is_open AS is_open,
                       COUNT(*) AS num_attachment,
                       SUM(a.positive_reviews) AS reviews,
                       SUM(a.size) AS size_attachment
                FROM issue_attachment a
                JOIN issue_data d
                  ON d.issue_id = a.issue_id AND d.project_id = a.project_id
                GROUP BY a.project_id, a.creator, d.component, d.priority, d.is_open;

                CREATE VIEW IF NOT EXISTS view_comment_class AS
                SELECT c.project_id AS project_id,
                       c.author AS developer,
                       d.component AS component,
                       d.priority AS priority,
                       d.is_open AS is_open,
                       COUNT(*) AS num_comment
                FROM issue_comment c
                JOIN issue_data d
                  ON d.issue_id = c.issue_id AND d.project_id = c.project_id
                GROUP BY c.project_id, c.author, d.component, d.priority, d.is_open;

                -- One row per (biddable bug, candidate developer class):
                -- open unassigned bugs joined against every developer who
                -- historically touched the same component and priority.
                CREATE VIEW IF NOT EXISTS view_assignment AS
                SELECT bug.issue_id AS issue_id,
                       bug.project_id AS project_id,
                       bug.component AS component,
                       bug.priority AS priority,
                       bug.severity AS severity,
                       cls.developer AS developer,
                       cls.is_open AS is_open,
                       COALESCE(att.reviews, 0) AS reviews,
                       cls.num_assigned AS num_assigned,
                       COALESCE(att.num_attachment, 0) AS num_attachment,
                       COALESCE(com.num_comment, 0) AS num_comment,
                       COALESCE(att.size_attachment, 0) AS size_attachment,
                       COALESCE(devt.dev_avg_time, 0) AS dev_avg_time,
                       cls.bug_avg_eta AS bug_avg_eta
                FROM issue_data bug
                JOIN issue_project p ON p.project_id = bug.project_id
                JOIN view_dev_class cls
                  ON cls.project_id = bug.project_id
                 AND cls.component = bug.component
                 AND cls.priority = bug.priority
                LEFT JOIN view_attachment_class att
                  ON att.project_id = cls.project_id
                 AND att.developer = cls.developer
                 AND att.component = cls.component
                 AND att.priority = cls.priority
                 AND att.is_open = cls.is_open
                LEFT JOIN view_comment_class com
                  ON com.project_id = cls.project_id
                 AND com.developer = cls.developer
                 AND com.component = cls.component
                 AND com.priority = cls.priority
                 AND com.is_open = cls.is_open
                LEFT JOIN view_developer_time devt
                  ON devt.project_id = cls.project_id
                 AND devt.developer = cls.developer
                WHERE bug.is_open = 1 AND bug.assigned_to = p.unassigned_login;

                -- Held-out bugs scored against the assignment write-back.
                CREATE VIEW IF NOT EXISTS view_reality_check AS
                SELECT d.project_id AS project_id,
                       SUM(CASE WHEN a.developer_name = d.real_assignee
                               THEN 1 ELSE 0 END) AS tp,
                       SUM(CASE WHEN a.developer_name IS NOT NULL
                                 AND a.developer_name <> d.real_assignee
                               THEN 1 ELSE 0 END) AS fp,
                       SUM(CASE WHEN a.developer_name IS NULL
                               THEN 1 ELSE 0 END) AS fn_count
                FROM issue_data d
                LEFT JOIN issue_assignment a
                  ON a.issue_id = d.issue_id AND a.project_id = d.project_id
                WHERE d.real_assignee IS NOT NULL
                GROUP BY d.project_id;
                ",
            )
            .map_err(|e| TriagoError::Database(format!("failed to create schema: {e}")))?;

        Ok(())
    }

    /// Look up a project by tracker URL and name.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] on query failure.
    pub fn project_id(&self, url: &str, name: &str) -> Result<Option<i64>> {
        let result = self.conn.query_row(
            "SELECT project_id FROM issue_project WHERE url = ?1 AND name = ?2",
            params![url, name],
            |row| row.get(0),
        );
        match result {
            Ok(id) => Ok(Some(id)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(TriagoError::Database(format!(
                "failed to look up project '{name}': {e}"
            ))),
        }
    }

    /// Register a project, dropping any previous import under the same
    /// URL and name. Every import starts from a clean slate.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] on failure.
    ///
    /// # Examples
    ///
    /// ```
    /// use triago_store::IssueStore;
    ///
    /// let mut store = IssueStore::in_memory().unwrap();
    /// let id = store
    ///     .upsert_project("https://bugzilla.example/", "demo", "nobody@mozilla.org")
    ///     .unwrap();
    /// assert_eq!(store.project_id("https://bugzilla.example/", "demo").unwrap(), Some(id));
    /// ```
    pub fn upsert_project(&mut self, url: &str, name: &str, unassigned_login: &str) -> Result<i64> {
        if let Some(existing) = self.project_id(url, name)? {
            self.reset_project(existing)?;
        }
        self.conn
            .execute(
                "INSERT INTO issue_project (url, name, unassigned_login) VALUES (?1, ?2, ?3)",
                params![url, name, unassigned_login],
            )
            .map_err(|e| TriagoError::Database(format!("failed to insert project: {e}")))?;
        Ok(self.conn.last_insert_rowid())
    }

    /// Delete a project and, through cascading, everything imported under it.
    pub fn reset_project(&mut self, project_id: i64) -> Result<()> {
        self.conn
            .execute(
                "DELETE FROM issue_project WHERE project_id = ?1",
                params![project_id],
            )
            .map_err(|e| TriagoError::Database(format!("failed to reset project: {e}")))?;
        Ok(())
    }

    /// Insert developers for a project, always seeding the placeholder
    /// row for the unassigned login first.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] on insert failure.
    pub fn add_developers(
        &mut self,
        project_id: i64,
        developers: &[Developer],
        unassigned_login: &str,
    ) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO issue_developer
                     (name, project_id, tracker_id, real_name)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            stmt.execute(params![unassigned_login, project_id, 1, NOBODY_REAL_NAME])
                .map_err(db_err)?;
            for dev in developers {
                if dev.login == unassigned_login {
                    continue;
                }
                stmt.execute(params![dev.login, project_id, dev.id, dev.real_name])
                    .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Insert bugs and their cc lists. Priority and severity ordinals are
    /// derived from `ranks`; `spent_time` is minutes from creation to
    /// resolution, or to `now` for bugs still open.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Database`] on insert failure.
    pub fn add_bugs(
        &mut self,
        project_id: i64,
        bugs: &[Bug],
        ranks: &RankConfig,
        now: DateTime<Utc>,
    ) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut bug_stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO issue_data
                     (issue_id, project_id, summary, component, creation_time, creator,
                      assigned_to, spent_time, priority, priority_value, severity,
                      severity_value, status, resolution, is_open, votes, comment_count,
                      keywords, last_resolved, real_assignee)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10,
                             ?11, ?12, ?13, ?14, ?15, ?16, ?17, ?18, ?19, ?20)",
                )
                .map_err(db_err)?;
            let mut cc_stmt = tx
                .prepare(
                    "INSERT INTO issue_cclist (issue_id, project_id, developer_name)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err)?;

            for bug in bugs {
                bug_stmt
                    .execute(params![
                        bug.id,
                        project_id,
                        bug.summary,
                        bug.component,
                        bug.creation_time.to_rfc3339(),
                        bug.creator,
                        bug.assigned_to,
                        bug.spent_minutes(now),
                        bug.priority,
                        ranks.priority_rank(&bug.priority),
                        bug.severity,
                        ranks.severity_rank(&bug.severity),
                        bug.status,
                        bug.resolution,
                        bug.is_open,
                        bug.votes,
                        bug.comment_count,
                        bug.keywords.join(","),
                        bug.last_resolved.map(|t| t.to_rfc3339()),
                        bug.real_assignee,
                    ])
                    .map_err(db_err)?;
                for cc in &bug.cc {
                    cc_stmt
                        .execute(params![bug.id, project_id, cc])
                        .map_err(db_err)?;
                }
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Insert typed dependency edges.
    pub fn add_relations(&mut self, project_id: i64, relations: &[BugRelation]) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO issue_dependencies
                     (issue_id, project_id, related_issue_id, relation_type)
                     VALUES (?1, ?2, ?3, ?4)",
                )
                .map_err(db_err)?;
            for rel in relations {
                stmt.execute(params![
                    rel.bug_id,
                    project_id,
                    rel.related_id,
                    rel.kind.as_str()
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Insert attachments.
    pub fn add_attachments(&mut self, project_id: i64, attachments: &[Attachment]) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO issue_attachment
                     (attachment_id, project_id, issue_id, creator, creation_time,
                      is_obsolete, is_patch, is_private, size, positive_reviews)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10)",
                )
                .map_err(db_err)?;
            for att in attachments {
                stmt.execute(params![
                    att.id,
                    project_id,
                    att.bug_id,
                    att.creator,
                    att.creation_time.to_rfc3339(),
                    att.is_obsolete,
                    att.is_patch,
                    att.is_private,
                    att.size,
                    att.positive_reviews,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Insert comments.
    pub fn add_comments(&mut self, project_id: i64, comments: &[Comment]) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO issue_comment
                     (comment_id, project_id, issue_id, author, time, raw_text)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6)",
                )
                .map_err(db_err)?;
            for comment in comments {
                stmt.execute(params![
                    comment.id,
                    project_id,
                    comment.bug_id,
                    comment.author,
                    comment.creation_time.to_rfc3339(),
                    comment.text,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Insert history changes, truncating added / removed values to
    /// [`HISTORY_TEXT_LIMIT`] characters.
    pub fn add_history(&mut self, project_id: i64, changes: &[HistoryChange]) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT INTO issue_history
                     (issue_id, project_id, who, time, added, removed,
                      attachment_id, field_name)
                     VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
                )
                .map_err(db_err)?;
            for change in changes {
                stmt.execute(params![
                    change.bug_id,
                    project_id,
                    change.who,
                    change.when.to_rfc3339(),
                    truncate_chars(&change.added, HISTORY_TEXT_LIMIT),
                    truncate_chars(&change.removed, HISTORY_TEXT_LIMIT),
                    change.attachment_id,
                    change.field_name,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }

    /// Write back the engine's picks, replacing any earlier run's pick
    /// for the same bug.
    pub fn add_assignments(&mut self, assignments: &[Assignment]) -> Result<()> {
        let tx = transaction(&mut self.conn)?;
        {
            let mut stmt = tx
                .prepare(
                    "INSERT OR REPLACE INTO issue_assignment
                     (issue_id, project_id, developer_name)
                     VALUES (?1, ?2, ?3)",
                )
                .map_err(db_err)?;
            for assignment in assignments {
                stmt.execute(params![
                    assignment.bug_id,
                    assignment.project_id,
                    assignment.developer,
                ])
                .map_err(db_err)?;
            }
        }
        tx.commit().map_err(db_err)
    }
}

fn transaction(conn: &mut Connection) -> Result<rusqlite::Transaction<'_>> {
    conn.transaction()
        .map_err(|e| TriagoError::Database(format!("failed to start transaction: {e}")))
}

fn db_err(e: rusqlite::Error) -> TriagoError {
    TriagoError::Database(e.to_string())
}

fn truncate_chars(s: &str, max: usize) -> String {
    s.chars().take(max).collect()
}

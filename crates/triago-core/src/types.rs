use std::fmt;
use std::str::FromStr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A trackable issue as scraped from the bug tracker.
///
/// Created by the scrape phase, persisted once, and read-only during scoring.
/// `real_assignee` is only populated in evaluation runs, where a slice of
/// historically fixed bugs is re-opened and its true assignee held out as
/// ground truth.
///
/// # Examples
///
/// ```
/// use triago_core::Bug;
///
/// let bug: Bug = serde_json::from_str(r#"{
///     "id": 42, "summary": "crash on startup", "component": "DOM",
///     "priority": "P1", "severity": "critical", "status": "NEW",
///     "resolution": "", "creationTime": "2024-03-01T10:00:00Z",
///     "lastResolved": null, "creator": "mike@example.org",
///     "assignedTo": "nobody@mozilla.org", "isOpen": true,
///     "cc": [], "keywords": [], "commentCount": 3, "votes": 0,
///     "realAssignee": null
/// }"#).unwrap();
/// assert!(bug.is_open);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bug {
    pub id: i64,
    pub summary: String,
    pub component: String,
    pub priority: String,
    pub severity: String,
    pub status: String,
    #[serde(default)]
    pub resolution: String,
    pub creation_time: DateTime<Utc>,
    pub last_resolved: Option<DateTime<Utc>>,
    pub creator: String,
    pub assigned_to: String,
    pub is_open: bool,
    #[serde(default)]
    pub cc: Vec<String>,
    #[serde(default)]
    pub keywords: Vec<String>,
    #[serde(default)]
    pub comment_count: i64,
    #[serde(default)]
    pub votes: i64,
    #[serde(default)]
    pub real_assignee: Option<String>,
}

impl Bug {
    /// Minutes from creation until resolution, or until `now` for bugs
    /// that are still open.
    pub fn spent_minutes(&self, now: DateTime<Utc>) -> i64 {
        let end = self.last_resolved.unwrap_or(now);
        (end - self.creation_time).num_minutes()
    }
}

/// A developer known to the bug tracker, keyed by login (email).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Developer {
    pub login: String,
    pub id: i64,
    pub real_name: String,
}

/// An attachment on a bug, with its positive review count already derived
/// from `+` review flags.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Attachment {
    pub id: i64,
    pub bug_id: i64,
    pub creator: String,
    pub creation_time: DateTime<Utc>,
    pub is_obsolete: bool,
    pub is_patch: bool,
    pub is_private: bool,
    pub size: i64,
    pub positive_reviews: i64,
}

/// A comment on a bug.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Comment {
    pub id: i64,
    pub bug_id: i64,
    pub author: String,
    pub creation_time: DateTime<Utc>,
    pub text: String,
}

/// One field change from a bug's history. `added` / `removed` are truncated
/// to 255 characters when persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryChange {
    pub bug_id: i64,
    pub who: String,
    pub when: DateTime<Utc>,
    pub field_name: String,
    pub added: String,
    pub removed: String,
    pub attachment_id: Option<i64>,
}

/// Direction of a dependency edge between two bugs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum RelationKind {
    Blocks,
    DependsOn,
}

impl RelationKind {
    /// Label stored in the relational schema.
    pub fn as_str(self) -> &'static str {
        match self {
            RelationKind::Blocks => "blocks",
            RelationKind::DependsOn => "depends on",
        }
    }
}

impl fmt::Display for RelationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A typed dependency edge between two bugs.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugRelation {
    pub bug_id: i64,
    pub related_id: i64,
    pub kind: RelationKind,
}

/// Composite aggregation key for per-developer statistics.
///
/// A developer's profile varies by component, priority, and whether the
/// history comes from fixed or still-open bugs, so this key — not the
/// developer alone — is the unit of aggregation for scoring.
///
/// # Examples
///
/// ```
/// use triago_core::DevClassKey;
///
/// let fixed = DevClassKey::new("mike@example.org", "DOM", "P1", false);
/// let open = fixed.with_open(true);
/// assert_ne!(fixed, open);
/// assert_eq!(open.developer, fixed.developer);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DevClassKey {
    pub developer: String,
    pub component: String,
    pub priority: String,
    pub is_open: bool,
}

impl DevClassKey {
    pub fn new(
        developer: impl Into<String>,
        component: impl Into<String>,
        priority: impl Into<String>,
        is_open: bool,
    ) -> Self {
        Self {
            developer: developer.into(),
            component: component.into(),
            priority: priority.into(),
            is_open,
        }
    }

    /// Same class with the open flag replaced.
    pub fn with_open(&self, is_open: bool) -> Self {
        Self {
            is_open,
            ..self.clone()
        }
    }
}

/// Per-(developer, component, priority, open-flag) aggregates.
///
/// Recomputed from persisted records; immutable once read for a scoring
/// pass, except for `num_assigned`, which the assignment engine increments
/// in its own overlay to reflect in-progress hypothetical assignments.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StatSnapshot {
    pub reviews: f64,
    pub num_assigned: f64,
    pub num_attachment: f64,
    pub num_comment: f64,
    pub size_attachment: f64,
    pub dev_avg_time: f64,
    pub bug_avg_eta: f64,
}

/// Population averages for a bug's class, used as the normalizing
/// denominator in every sub-score ratio.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BugStatistics {
    pub avg_num_assigned: f64,
    pub avg_dev_avg_time: f64,
    pub avg_num_comment: f64,
    pub avg_num_attachment: f64,
    pub avg_reviews: f64,
    pub avg_size_attachment: f64,
}

/// Evidence that a developer touched a (component, priority, open-flag)
/// class of bug. A bug may carry many edges, and the same developer may
/// appear via several classes; the engine de-duplicates per bug.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CandidateEdge {
    pub developer: String,
    pub component: String,
    pub priority: String,
    pub is_open: bool,
}

/// Historical time budget for a developer: minutes spent on previously
/// fixed bugs vs. bugs still open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeveloperTime {
    pub available: f64,
    pub unavailable: f64,
}

/// The engine's output for one bug: at most one per bug per run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Assignment {
    pub bug_id: i64,
    pub project_id: i64,
    pub developer: String,
}

/// Output format for command results.
///
/// Implements [`FromStr`] so it can be used directly with `clap` argument
/// parsing.
///
/// # Examples
///
/// ```
/// use triago_core::OutputFormat;
///
/// let fmt: OutputFormat = "json".parse().unwrap();
/// assert_eq!(fmt, OutputFormat::Json);
/// ```
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    /// Human-readable tables and summaries.
    #[default]
    Text,
    /// Machine-readable JSON with camelCase keys.
    Json,
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            OutputFormat::Text => write!(f, "text"),
            OutputFormat::Json => write!(f, "json"),
        }
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "text" => Ok(OutputFormat::Text),
            "json" => Ok(OutputFormat::Json),
            other => Err(format!("unknown output format: {other}")),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn bug(creation: DateTime<Utc>, resolved: Option<DateTime<Utc>>) -> Bug {
        Bug {
            id: 1,
            summary: "test".into(),
            component: "DOM".into(),
            priority: "P1".into(),
            severity: "normal".into(),
            status: "NEW".into(),
            resolution: String::new(),
            creation_time: creation,
            last_resolved: resolved,
            creator: "a@b.c".into(),
            assigned_to: "a@b.c".into(),
            is_open: resolved.is_none(),
            cc: vec![],
            keywords: vec![],
            comment_count: 0,
            votes: 0,
            real_assignee: None,
        }
    }

    #[test]
    fn spent_minutes_uses_resolution_when_present() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let resolved = Utc.with_ymd_and_hms(2024, 3, 2, 10, 0, 0).unwrap();
        let b = bug(created, Some(resolved));
        assert_eq!(b.spent_minutes(Utc::now()), 24 * 60);
    }

    #[test]
    fn spent_minutes_uses_now_for_open_bugs() {
        let created = Utc.with_ymd_and_hms(2024, 3, 1, 10, 0, 0).unwrap();
        let now = Utc.with_ymd_and_hms(2024, 3, 1, 12, 30, 0).unwrap();
        let b = bug(created, None);
        assert_eq!(b.spent_minutes(now), 150);
    }

    #[test]
    fn dev_class_key_distinguishes_open_flag() {
        let fixed = DevClassKey::new("d", "c", "P1", false);
        assert_ne!(fixed, fixed.with_open(true));
    }

    #[test]
    fn relation_kind_labels() {
        assert_eq!(RelationKind::Blocks.as_str(), "blocks");
        assert_eq!(RelationKind::DependsOn.as_str(), "depends on");
    }

    #[test]
    fn output_format_from_str() {
        assert_eq!("text".parse::<OutputFormat>().unwrap(), OutputFormat::Text);
        assert_eq!("JSON".parse::<OutputFormat>().unwrap(), OutputFormat::Json);
        assert!("yaml".parse::<OutputFormat>().is_err());
    }
}

use chrono::{DateTime, Days, NaiveDate, Utc};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use triago_core::{
    Attachment, Bug, Comment, Developer, HistoryChange, Result, TriagoConfig, TriagoError,
};

const BUG_SWEEP_FIELDS: &str = "id,assigned_to,blocks,cc,cf_last_resolved,component,\
creation_time,creator,comment_count,depends_on,keywords,is_open,priority,resolution,\
severity,summary,status,votes";

const ATTACHMENT_FIELDS: &str =
    "bug_id,creation_time,creator,flags,id,is_obsolete,is_patch,is_private,size";

const COMMENT_FIELDS: &str = "attachment_id,author,bug_id,creation_time,id,raw_text";

/// A fetched payload together with the URL it came from, so the caller can
/// key the cache by source URL.
#[derive(Debug, Clone)]
pub struct Sweep<T> {
    pub url: String,
    pub payload: T,
}

/// A bug from a sweep query, keeping the dependency edges and assignee
/// detail that the tracker returns alongside the bug itself.
#[derive(Debug, Clone)]
pub struct ScrapedBug {
    pub bug: Bug,
    pub depends_on: Vec<i64>,
    pub blocks: Vec<i64>,
    pub assignee: Option<Developer>,
}

/// Async Bugzilla REST client.
///
/// Queries mirror the tracker's advanced-search parameters: change-field
/// windows (`chfield` / `chfieldfrom`) select the fixed and open sweeps,
/// and `include_fields` keeps payloads down to what scoring consumes.
pub struct BugzillaClient {
    http: reqwest::Client,
    base_url: String,
    product: String,
    unassigned_login: String,
    priorities: Vec<String>,
    opened_days: u32,
    fixed_days: u32,
    fetch_limit: usize,
}

impl BugzillaClient {
    pub fn new(config: &TriagoConfig) -> Self {
        Self {
            http: reqwest::Client::new(),
            base_url: config.tracker.base_url.clone(),
            product: config.tracker.product.clone(),
            unassigned_login: config.tracker.unassigned_login.clone(),
            priorities: config.ranks.priorities.clone(),
            opened_days: config.scoring.bug_opened_days,
            fixed_days: config.scoring.bug_fixed_days,
            fetch_limit: config.tracker.fetch_limit,
        }
    }

    pub fn unassigned_login(&self) -> &str {
        &self.unassigned_login
    }

    pub fn fetch_limit(&self) -> usize {
        self.fetch_limit
    }

    fn priority_params(&self) -> String {
        self.priorities
            .iter()
            .map(|p| format!("&priority={p}"))
            .collect()
    }

    fn days_ago(today: NaiveDate, days: u32) -> String {
        today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(today)
            .format("%Y-%m-%d")
            .to_string()
    }

    /// Bugs resolved FIXED in the last `bug_fixed_days`. With
    /// `previous_period`, the window immediately before that one instead,
    /// which held-out evaluation runs use so the "open" sweep stays
    /// disjoint from the fixed history.
    pub(crate) fn closed_fixed_url(&self, previous_period: bool, today: NaiveDate) -> String {
        let (from, to) = if previous_period {
            (
                Self::days_ago(today, self.fixed_days + self.opened_days),
                Self::days_ago(today, self.opened_days),
            )
        } else {
            (Self::days_ago(today, self.fixed_days), "Now".to_string())
        };
        format!(
            "{}rest/bug?include_fields={BUG_SWEEP_FIELDS}\
             &chfield=resolution&chfieldfrom={from}&chfieldto={to}&chfieldvalue=FIXED\
             &f1=assigned_to&o1=notequals&v1={}{}&product={}&resolution=FIXED",
            self.base_url,
            self.unassigned_login,
            self.priority_params(),
            self.product
        )
    }

    /// Open, unassigned bugs created in the last `bug_opened_days`: the
    /// bugs a scoring run actually bids on.
    pub(crate) fn open_unassigned_url(&self, today: NaiveDate) -> String {
        let from = Self::days_ago(today, self.opened_days);
        format!(
            "{}rest/bug?include_fields={BUG_SWEEP_FIELDS}\
             &bug_status=NEW&bug_status=ASSIGNED&chfield=%5BBug%20creation%5D\
             &chfieldfrom={from}&chfieldto=Now\
             &f1=assigned_to&o1=equals&v1={}{}&product={}&resolution=---",
            self.base_url,
            self.unassigned_login,
            self.priority_params(),
            self.product
        )
    }

    /// Open bugs assigned in the last `bug_opened_days`: current workload
    /// evidence per developer.
    pub(crate) fn open_assigned_url(&self, today: NaiveDate) -> String {
        let from = Self::days_ago(today, self.opened_days);
        format!(
            "{}rest/bug?include_fields={BUG_SWEEP_FIELDS}\
             &chfield=assigned_to&chfieldfrom={from}&chfieldto=Now\
             &f1=assigned_to&o1=notequals&v1={}{}&product={}&resolution=---",
            self.base_url,
            self.unassigned_login,
            self.priority_params(),
            self.product
        )
    }

    pub(crate) fn bugs_by_ids_url(&self, ids: &[i64], open_only: bool) -> String {
        let ids = join_ids(ids, ",");
        let status = if open_only { "__open__" } else { "__closed__" };
        format!(
            "{}rest/bug?id={ids}&bug_status={status}&include_fields={BUG_SWEEP_FIELDS}",
            self.base_url
        )
    }

    pub(crate) fn attachments_url(&self, ids: &[i64]) -> String {
        format!(
            "{}rest/bug/{}/attachment?ids={}&include_fields={ATTACHMENT_FIELDS}",
            self.base_url,
            ids.first().copied().unwrap_or_default(),
            join_ids(ids, "&ids=")
        )
    }

    pub(crate) fn comments_url(&self, ids: &[i64]) -> String {
        format!(
            "{}rest/bug/{}/comment?ids={}&include_fields={COMMENT_FIELDS}&is_private=false",
            self.base_url,
            ids.first().copied().unwrap_or_default(),
            join_ids(ids, "&ids=")
        )
    }

    pub(crate) fn history_url(&self, ids: &[i64]) -> String {
        format!(
            "{}rest/bug/{}/history?ids={}",
            self.base_url,
            ids.first().copied().unwrap_or_default(),
            join_ids(ids, "&ids=")
        )
    }

    pub(crate) fn users_url(&self, logins: &[String]) -> String {
        format!(
            "{}rest/user?names={}&include_fields=email,id,name,real_name",
            self.base_url,
            logins.join("&names=")
        )
    }

    async fn get_json<T: DeserializeOwned>(&self, url: &str) -> Result<T> {
        let response = self
            .http
            .get(url)
            .header("Accept", "application/json")
            .header("User-Agent", "triago")
            .send()
            .await
            .map_err(|e| TriagoError::Http(format!("request to {url} failed: {e}")))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(TriagoError::Http(format!(
                "tracker returned {status} for {url}: {body}"
            )));
        }

        response
            .json()
            .await
            .map_err(|e| TriagoError::Http(format!("failed to decode response from {url}: {e}")))
    }

    /// Fetch the fixed-bug sweep.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Http`] on network or tracker errors.
    pub async fn closed_fixed(&self, previous_period: bool) -> Result<Sweep<Vec<ScrapedBug>>> {
        let url = self.closed_fixed_url(previous_period, Utc::now().date_naive());
        let response: BugListResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_scraped(),
        })
    }

    /// Fetch open bugs nobody is assigned to.
    pub async fn open_unassigned(&self) -> Result<Sweep<Vec<ScrapedBug>>> {
        let url = self.open_unassigned_url(Utc::now().date_naive());
        let response: BugListResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_scraped(),
        })
    }

    /// Fetch open bugs that already have an assignee.
    pub async fn open_assigned(&self) -> Result<Sweep<Vec<ScrapedBug>>> {
        let url = self.open_assigned_url(Utc::now().date_naive());
        let response: BugListResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_scraped(),
        })
    }

    /// Fetch specific bugs by id, optionally restricted to still-open ones.
    /// Used to check whether dependencies of open bugs are resolved.
    pub async fn bugs_by_ids(
        &self,
        ids: &[i64],
        open_only: bool,
    ) -> Result<Sweep<Vec<ScrapedBug>>> {
        let url = self.bugs_by_ids_url(ids, open_only);
        let response: BugListResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_scraped(),
        })
    }

    /// Fetch attachments for a list of bugs, with positive reviews counted
    /// from `+` review flags.
    pub async fn attachments(&self, ids: &[i64]) -> Result<Sweep<Vec<Attachment>>> {
        let url = self.attachments_url(ids);
        let response: AttachmentResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_attachments(),
        })
    }

    /// Fetch comments for a list of bugs.
    pub async fn comments(&self, ids: &[i64]) -> Result<Sweep<Vec<Comment>>> {
        let url = self.comments_url(ids);
        let response: CommentResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_comments(),
        })
    }

    /// Fetch change history for a list of bugs, flattened to one record
    /// per changed field.
    pub async fn history(&self, ids: &[i64]) -> Result<Sweep<Vec<HistoryChange>>> {
        let url = self.history_url(ids);
        let response: HistoryResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.into_changes(),
        })
    }

    /// Look up developers by login. Fills in attachment creators that the
    /// bug sweeps never mentioned.
    pub async fn users(&self, logins: &[String]) -> Result<Sweep<Vec<Developer>>> {
        let url = self.users_url(logins);
        let response: UserResponse = self.get_json(&url).await?;
        Ok(Sweep {
            url,
            payload: response.users.into_iter().map(RawUser::into_developer).collect(),
        })
    }
}

fn join_ids(ids: &[i64], separator: &str) -> String {
    ids.iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(separator)
}

// Wire shapes. Bugzilla's REST responses use tracker-native field names
// and, for attachments and comments, an object keyed by bug id rather
// than a list.

#[derive(Debug, Deserialize)]
struct BugListResponse {
    #[serde(default)]
    bugs: Vec<RawBug>,
}

impl BugListResponse {
    fn into_scraped(self) -> Vec<ScrapedBug> {
        self.bugs.into_iter().map(RawBug::into_scraped).collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawBug {
    id: i64,
    #[serde(default)]
    summary: String,
    #[serde(default)]
    component: String,
    #[serde(default)]
    priority: String,
    #[serde(default)]
    severity: String,
    #[serde(default)]
    status: String,
    #[serde(default)]
    resolution: String,
    creation_time: DateTime<Utc>,
    #[serde(default)]
    cf_last_resolved: Option<DateTime<Utc>>,
    #[serde(default)]
    creator: String,
    #[serde(default)]
    assigned_to: String,
    #[serde(default)]
    assigned_to_detail: Option<RawUser>,
    #[serde(default)]
    is_open: bool,
    #[serde(default)]
    cc: Vec<String>,
    #[serde(default)]
    keywords: Vec<String>,
    #[serde(default)]
    comment_count: i64,
    #[serde(default)]
    votes: i64,
    #[serde(default)]
    depends_on: Vec<i64>,
    #[serde(default)]
    blocks: Vec<i64>,
}

impl RawBug {
    fn into_scraped(self) -> ScrapedBug {
        ScrapedBug {
            bug: Bug {
                id: self.id,
                summary: self.summary,
                component: self.component,
                priority: self.priority,
                severity: self.severity,
                status: self.status,
                resolution: self.resolution,
                creation_time: self.creation_time,
                last_resolved: self.cf_last_resolved,
                creator: self.creator,
                assigned_to: self.assigned_to,
                is_open: self.is_open,
                cc: self.cc,
                keywords: self.keywords,
                comment_count: self.comment_count,
                votes: self.votes,
                real_assignee: None,
            },
            depends_on: self.depends_on,
            blocks: self.blocks,
            assignee: self.assigned_to_detail.map(RawUser::into_developer),
        }
    }
}

#[derive(Debug, Deserialize)]
struct RawUser {
    name: String,
    #[serde(default)]
    id: i64,
    #[serde(default)]
    real_name: String,
}

impl RawUser {
    fn into_developer(self) -> Developer {
        Developer {
            login: self.name,
            id: self.id,
            real_name: self.real_name,
        }
    }
}

#[derive(Debug, Deserialize)]
struct UserResponse {
    #[serde(default)]
    users: Vec<RawUser>,
}

#[derive(Debug, Deserialize)]
struct AttachmentResponse {
    #[serde(default)]
    bugs: std::collections::BTreeMap<String, Vec<RawAttachment>>,
}

impl AttachmentResponse {
    fn into_attachments(self) -> Vec<Attachment> {
        self.bugs
            .into_values()
            .flatten()
            .map(RawAttachment::into_attachment)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawAttachment {
    id: i64,
    bug_id: i64,
    #[serde(default)]
    creator: String,
    creation_time: DateTime<Utc>,
    // The tracker encodes these booleans as 0/1 integers.
    #[serde(default)]
    is_obsolete: i64,
    #[serde(default)]
    is_patch: i64,
    #[serde(default)]
    is_private: i64,
    #[serde(default)]
    size: i64,
    #[serde(default)]
    flags: Vec<RawFlag>,
}

#[derive(Debug, Deserialize)]
struct RawFlag {
    #[serde(default)]
    status: String,
}

impl RawAttachment {
    fn into_attachment(self) -> Attachment {
        let positive_reviews = self.flags.iter().filter(|f| f.status == "+").count() as i64;
        Attachment {
            id: self.id,
            bug_id: self.bug_id,
            creator: self.creator,
            creation_time: self.creation_time,
            is_obsolete: self.is_obsolete != 0,
            is_patch: self.is_patch != 0,
            is_private: self.is_private != 0,
            size: self.size,
            positive_reviews,
        }
    }
}

#[derive(Debug, Deserialize)]
struct CommentResponse {
    #[serde(default)]
    bugs: std::collections::BTreeMap<String, RawCommentList>,
}

impl CommentResponse {
    fn into_comments(self) -> Vec<Comment> {
        self.bugs
            .into_values()
            .flat_map(|list| list.comments)
            .map(RawComment::into_comment)
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawCommentList {
    #[serde(default)]
    comments: Vec<RawComment>,
}

#[derive(Debug, Deserialize)]
struct RawComment {
    id: i64,
    bug_id: i64,
    #[serde(default, alias = "creator")]
    author: String,
    creation_time: DateTime<Utc>,
    #[serde(default, alias = "text")]
    raw_text: String,
}

impl RawComment {
    fn into_comment(self) -> Comment {
        Comment {
            id: self.id,
            bug_id: self.bug_id,
            author: self.author,
            creation_time: self.creation_time,
            text: self.raw_text,
        }
    }
}

#[derive(Debug, Deserialize)]
struct HistoryResponse {
    #[serde(default)]
    bugs: Vec<RawBugHistory>,
}

impl HistoryResponse {
    fn into_changes(self) -> Vec<HistoryChange> {
        self.bugs
            .into_iter()
            .flat_map(|bug| {
                let bug_id = bug.id;
                bug.history.into_iter().flat_map(move |entry| {
                    let who = entry.who;
                    let when = entry.when;
                    entry.changes.into_iter().map(move |change| HistoryChange {
                        bug_id,
                        who: who.clone(),
                        when,
                        field_name: change.field_name,
                        added: change.added,
                        removed: change.removed,
                        attachment_id: change.attachment_id,
                    })
                })
            })
            .collect()
    }
}

#[derive(Debug, Deserialize)]
struct RawBugHistory {
    id: i64,
    #[serde(default)]
    history: Vec<RawHistoryEntry>,
}

#[derive(Debug, Deserialize)]
struct RawHistoryEntry {
    who: String,
    when: DateTime<Utc>,
    #[serde(default)]
    changes: Vec<RawChange>,
}

#[derive(Debug, Deserialize)]
struct RawChange {
    field_name: String,
    #[serde(default)]
    added: String,
    #[serde(default)]
    removed: String,
    #[serde(default)]
    attachment_id: Option<i64>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;

    fn client() -> BugzillaClient {
        let mut config = TriagoConfig::default();
        config.tracker.base_url = "https://bugzilla.example.org/".into();
        config.tracker.product = "Core".into();
        BugzillaClient::new(&config)
    }

    fn today() -> NaiveDate {
        NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
    }

    #[test]
    fn closed_fixed_url_uses_fixed_window() {
        let url = client().closed_fixed_url(false, today());
        assert!(url.starts_with("https://bugzilla.example.org/rest/bug?"));
        // 90 days before 2025-06-01
        assert!(url.contains("&chfieldfrom=2025-03-03&chfieldto=Now"));
        assert!(url.contains("&chfieldvalue=FIXED"));
        assert!(url.contains("&resolution=FIXED"));
        assert!(url.contains("&o1=notequals&v1=nobody@mozilla.org"));
        assert!(url.contains("&priority=P1&priority=P2"));
        assert!(url.contains("&product=Core"));
    }

    #[test]
    fn closed_fixed_previous_period_shifts_both_bounds() {
        let url = client().closed_fixed_url(true, today());
        // from: 90+60 days back, to: 60 days back
        assert!(url.contains("&chfieldfrom=2025-01-01&chfieldto=2025-04-02"));
    }

    #[test]
    fn open_unassigned_url_filters_on_unassigned_login() {
        let url = client().open_unassigned_url(today());
        assert!(url.contains("&bug_status=NEW&bug_status=ASSIGNED"));
        assert!(url.contains("&chfieldfrom=2025-04-02&chfieldto=Now"));
        assert!(url.contains("&o1=equals&v1=nobody@mozilla.org"));
        assert!(url.contains("&resolution=---"));
    }

    #[test]
    fn detail_urls_join_ids() {
        let c = client();
        assert!(c
            .attachments_url(&[10, 11, 12])
            .contains("rest/bug/10/attachment?ids=10&ids=11&ids=12"));
        assert!(c
            .comments_url(&[10, 11])
            .contains("rest/bug/10/comment?ids=10&ids=11"));
        assert!(c
            .history_url(&[7])
            .contains("rest/bug/7/history?ids=7"));
        assert!(c
            .bugs_by_ids_url(&[1, 2], true)
            .contains("rest/bug?id=1,2&bug_status=__open__"));
    }

    #[test]
    fn bug_sweep_parses_into_scraped_bugs() {
        let payload = r#"{
            "bugs": [{
                "id": 99,
                "summary": "leak",
                "component": "DOM",
                "priority": "P1",
                "severity": "critical",
                "status": "RESOLVED",
                "resolution": "FIXED",
                "creation_time": "2025-01-01T00:00:00Z",
                "cf_last_resolved": "2025-02-01T00:00:00Z",
                "creator": "kim@example.org",
                "assigned_to": "mike@example.org",
                "assigned_to_detail": {"name": "mike@example.org", "id": 7, "real_name": "Mike"},
                "is_open": false,
                "cc": ["lea@example.org"],
                "keywords": ["regression"],
                "comment_count": 4,
                "votes": 1,
                "depends_on": [5],
                "blocks": [6]
            }]
        }"#;
        let response: BugListResponse = serde_json::from_str(payload).unwrap();
        let scraped = response.into_scraped();
        assert_eq!(scraped.len(), 1);
        let first = &scraped[0];
        assert_eq!(first.bug.id, 99);
        assert_eq!(first.bug.assigned_to, "mike@example.org");
        assert!(first.bug.last_resolved.is_some());
        assert_eq!(first.depends_on, vec![5]);
        assert_eq!(first.blocks, vec![6]);
        assert_eq!(first.assignee.as_ref().unwrap().real_name, "Mike");
    }

    #[test]
    fn attachments_parse_and_count_positive_flags() {
        let payload = r#"{
            "bugs": {
                "42": [{
                    "id": 1, "bug_id": 42, "creator": "kim@example.org",
                    "creation_time": "2025-01-05T00:00:00Z",
                    "is_obsolete": 0, "is_patch": 1, "is_private": 0, "size": 2048,
                    "flags": [
                        {"status": "+"}, {"status": "-"}, {"status": "+"}, {"status": "?"}
                    ]
                }]
            }
        }"#;
        let response: AttachmentResponse = serde_json::from_str(payload).unwrap();
        let attachments = response.into_attachments();
        assert_eq!(attachments.len(), 1);
        assert_eq!(attachments[0].positive_reviews, 2);
        assert!(attachments[0].is_patch);
        assert!(!attachments[0].is_obsolete);
    }

    #[test]
    fn comments_parse_with_creator_alias() {
        let payload = r#"{
            "bugs": {
                "42": {"comments": [{
                    "id": 9, "bug_id": 42, "creator": "lea@example.org",
                    "creation_time": "2025-01-06T00:00:00Z", "text": "confirmed on nightly"
                }]}
            }
        }"#;
        let response: CommentResponse = serde_json::from_str(payload).unwrap();
        let comments = response.into_comments();
        assert_eq!(comments[0].author, "lea@example.org");
        assert_eq!(comments[0].text, "confirmed on nightly");
    }

    #[test]
    fn history_flattens_changes() {
        let payload = r#"{
            "bugs": [{
                "id": 42,
                "history": [{
                    "who": "mike@example.org",
                    "when": "2025-01-07T00:00:00Z",
                    "changes": [
                        {"field_name": "status", "added": "ASSIGNED", "removed": "NEW"},
                        {"field_name": "priority", "added": "P1", "removed": "P2",
                         "attachment_id": null}
                    ]
                }]
            }]
        }"#;
        let response: HistoryResponse = serde_json::from_str(payload).unwrap();
        let changes = response.into_changes();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].bug_id, 42);
        assert_eq!(changes[0].field_name, "status");
        assert_eq!(changes[1].added, "P1");
        assert!(changes[1].attachment_id.is_none());
    }
}

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::TriagoError;

/// Top-level configuration loaded from `.triago.toml`.
///
/// Every field is defaulted, so an empty file is a valid configuration.
/// Call [`TriagoConfig::validate`] after loading: some settings (a zero
/// `bug_fixed_days`, for instance) would poison the capacity formula and
/// must abort the run instead of being silently defaulted.
///
/// # Examples
///
/// ```
/// use triago_core::TriagoConfig;
///
/// let config = TriagoConfig::default();
/// assert_eq!(config.scoring.bug_fixed_days, 90);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct TriagoConfig {
    /// Bug tracker endpoint settings.
    #[serde(default)]
    pub tracker: TrackerConfig,
    /// Scoring coefficients and time windows.
    #[serde(default)]
    pub scoring: ScoringConfig,
    /// Priority / severity name-to-rank mappings.
    #[serde(default)]
    pub ranks: RankConfig,
    /// Scrape result cache settings.
    #[serde(default)]
    pub cache: CacheConfig,
}

impl TriagoConfig {
    /// Load configuration from a TOML file at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Io`] if the file cannot be read, or
    /// [`TriagoError::Toml`] if the content is not valid TOML.
    pub fn from_file(path: &Path) -> Result<Self, TriagoError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Toml`] if parsing fails.
    ///
    /// # Examples
    ///
    /// ```
    /// use triago_core::TriagoConfig;
    ///
    /// let toml = r#"
    /// [scoring]
    /// bug_opened_days = 30
    /// "#;
    /// let config = TriagoConfig::from_toml(toml).unwrap();
    /// assert_eq!(config.scoring.bug_opened_days, 30);
    /// ```
    pub fn from_toml(content: &str) -> Result<Self, TriagoError> {
        let config: Self = toml::from_str(content)?;
        Ok(config)
    }

    /// Reject configurations that cannot produce a meaningful run.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Config`] naming the offending field when
    /// `bug_fixed_days` or `bug_opened_days` is zero (the capacity formula
    /// divides by them) or `time_increment` is not positive.
    pub fn validate(&self) -> Result<(), TriagoError> {
        if self.scoring.bug_fixed_days == 0 {
            return Err(TriagoError::Config(
                "scoring.bug_fixed_days must not be zero".into(),
            ));
        }
        if self.scoring.bug_opened_days == 0 {
            return Err(TriagoError::Config(
                "scoring.bug_opened_days must not be zero".into(),
            ));
        }
        if self.scoring.time_increment <= 0.0 {
            return Err(TriagoError::Config(format!(
                "scoring.time_increment must be positive, got {}",
                self.scoring.time_increment
            )));
        }
        Ok(())
    }
}

/// Bug tracker endpoint configuration.
///
/// # Examples
///
/// ```
/// use triago_core::TrackerConfig;
///
/// let config = TrackerConfig::default();
/// assert_eq!(config.unassigned_login, "nobody@mozilla.org");
/// assert_eq!(config.fetch_limit, 200);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackerConfig {
    /// Base URL of the Bugzilla instance, with trailing slash.
    #[serde(default = "default_base_url")]
    pub base_url: String,
    /// Product name used in sweep queries.
    #[serde(default)]
    pub product: String,
    /// Human-readable project name, recorded with the project row.
    #[serde(default)]
    pub project_name: String,
    /// Login that marks a bug as having no assignee.
    #[serde(default = "default_unassigned_login")]
    pub unassigned_login: String,
    /// Cap on the number of bugs whose attachments, comments, and history
    /// are fetched in detail (default: 200).
    #[serde(default = "default_fetch_limit")]
    pub fetch_limit: usize,
}

fn default_base_url() -> String {
    "https://bugzilla.mozilla.org/".into()
}

fn default_unassigned_login() -> String {
    "nobody@mozilla.org".into()
}

fn default_fetch_limit() -> usize {
    200
}

impl Default for TrackerConfig {
    fn default() -> Self {
        Self {
            base_url: default_base_url(),
            product: String::new(),
            project_name: String::new(),
            unassigned_login: default_unassigned_login(),
            fetch_limit: default_fetch_limit(),
        }
    }
}

/// Scoring weights for the five sub-scores. Defaults sum to 1.0, but
/// nothing enforces that — the grid search varies them freely.
///
/// # Examples
///
/// ```
/// use triago_core::ScoringWeights;
///
/// let w = ScoringWeights::default();
/// assert_eq!(w.productivity, 0.3);
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoringWeights {
    #[serde(default = "default_w_availability")]
    pub availability: f64,
    #[serde(default = "default_w_collaborativity")]
    pub collaborativity: f64,
    #[serde(default = "default_w_competency")]
    pub competency: f64,
    #[serde(default = "default_w_productivity")]
    pub productivity: f64,
    #[serde(default = "default_w_reliability")]
    pub reliability: f64,
}

fn default_w_availability() -> f64 {
    0.2
}

fn default_w_collaborativity() -> f64 {
    0.15
}

fn default_w_competency() -> f64 {
    0.15
}

fn default_w_productivity() -> f64 {
    0.3
}

fn default_w_reliability() -> f64 {
    0.2
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            availability: default_w_availability(),
            collaborativity: default_w_collaborativity(),
            competency: default_w_competency(),
            productivity: default_w_productivity(),
            reliability: default_w_reliability(),
        }
    }
}

/// Scoring configuration: coefficient weights plus the run-level time
/// window constants used by the capacity gate.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoringConfig {
    /// Multiplier on a developer's available time budget (default: 1.1).
    #[serde(default = "default_time_increment")]
    pub time_increment: f64,
    /// Sub-score weights.
    #[serde(default)]
    pub weights: ScoringWeights,
    /// Lookback window for open bugs, in days (default: 60).
    #[serde(default = "default_bug_opened_days")]
    pub bug_opened_days: u32,
    /// Lookback window for fixed bugs, in days (default: 90).
    #[serde(default = "default_bug_fixed_days")]
    pub bug_fixed_days: u32,
}

fn default_time_increment() -> f64 {
    1.1
}

fn default_bug_opened_days() -> u32 {
    60
}

fn default_bug_fixed_days() -> u32 {
    90
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            time_increment: default_time_increment(),
            weights: ScoringWeights::default(),
            bug_opened_days: default_bug_opened_days(),
            bug_fixed_days: default_bug_fixed_days(),
        }
    }
}

/// Ordered priority / severity names. A name's ordinal rank is its
/// 1-based position in the list; unknown names get `len + 1`.
///
/// # Examples
///
/// ```
/// use triago_core::RankConfig;
///
/// let ranks = RankConfig::default();
/// assert_eq!(ranks.priority_rank("P1"), 1);
/// assert_eq!(ranks.priority_rank("P5"), 3);
/// assert_eq!(ranks.severity_rank("blocker"), 1);
/// assert_eq!(ranks.severity_rank("enhancement"), 7);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RankConfig {
    #[serde(default = "default_priorities")]
    pub priorities: Vec<String>,
    #[serde(default = "default_severities")]
    pub severities: Vec<String>,
}

fn default_priorities() -> Vec<String> {
    vec!["P1".into(), "P2".into()]
}

fn default_severities() -> Vec<String> {
    ["blocker", "critical", "major", "normal", "minor", "trivial"]
        .into_iter()
        .map(String::from)
        .collect()
}

impl RankConfig {
    /// Ordinal rank for a priority name.
    pub fn priority_rank(&self, name: &str) -> i64 {
        rank_of(&self.priorities, name)
    }

    /// Ordinal rank for a severity name.
    pub fn severity_rank(&self, name: &str) -> i64 {
        rank_of(&self.severities, name)
    }
}

fn rank_of(names: &[String], name: &str) -> i64 {
    names
        .iter()
        .position(|n| n == name)
        .map_or(names.len() as i64 + 1, |i| i as i64 + 1)
}

impl Default for RankConfig {
    fn default() -> Self {
        Self {
            priorities: default_priorities(),
            severities: default_severities(),
        }
    }
}

/// Scrape result cache configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CacheConfig {
    /// Cache directory. When unset, the binary resolves a per-user default.
    pub directory: Option<PathBuf>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = TriagoConfig::default();
        assert_eq!(config.scoring.time_increment, 1.1);
        assert_eq!(config.scoring.weights.availability, 0.2);
        assert_eq!(config.scoring.weights.collaborativity, 0.15);
        assert_eq!(config.scoring.weights.competency, 0.15);
        assert_eq!(config.scoring.weights.productivity, 0.3);
        assert_eq!(config.scoring.weights.reliability, 0.2);
        assert_eq!(config.scoring.bug_opened_days, 60);
        assert_eq!(config.scoring.bug_fixed_days, 90);
        assert_eq!(config.tracker.fetch_limit, 200);
        assert_eq!(config.ranks.priorities, vec!["P1", "P2"]);
        assert_eq!(config.ranks.severities.len(), 6);
        assert!(config.cache.directory.is_none());
    }

    #[test]
    fn parse_minimal_toml() {
        let toml = r#"
[tracker]
product = "Core"
project_name = "Gecko"

[scoring]
bug_opened_days = 30
"#;
        let config = TriagoConfig::from_toml(toml).unwrap();
        assert_eq!(config.tracker.product, "Core");
        assert_eq!(config.scoring.bug_opened_days, 30);
        // Untouched sections keep their defaults
        assert_eq!(config.scoring.bug_fixed_days, 90);
    }

    #[test]
    fn parse_full_scoring_section() {
        let toml = r#"
[scoring]
time_increment = 1.5
bug_opened_days = 45
bug_fixed_days = 120

[scoring.weights]
availability = 0.5
collaborativity = 0.1
competency = 0.1
productivity = 0.2
reliability = 0.1

[ranks]
priorities = ["P1", "P2", "P3"]
severities = ["blocker", "critical"]
"#;
        let config = TriagoConfig::from_toml(toml).unwrap();
        assert_eq!(config.scoring.time_increment, 1.5);
        assert_eq!(config.scoring.weights.availability, 0.5);
        assert_eq!(config.ranks.priority_rank("P3"), 3);
        assert_eq!(config.ranks.severity_rank("major"), 3);
    }

    #[test]
    fn empty_toml_gives_defaults() {
        let config = TriagoConfig::from_toml("").unwrap();
        assert_eq!(config.scoring.bug_fixed_days, 90);
        assert_eq!(config.tracker.unassigned_login, "nobody@mozilla.org");
    }

    #[test]
    fn invalid_toml_returns_error() {
        assert!(TriagoConfig::from_toml("{{invalid}}").is_err());
    }

    #[test]
    fn zero_fixed_days_is_fatal() {
        let mut config = TriagoConfig::default();
        config.scoring.bug_fixed_days = 0;
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("bug_fixed_days"));
    }

    #[test]
    fn zero_opened_days_is_fatal() {
        let mut config = TriagoConfig::default();
        config.scoring.bug_opened_days = 0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn non_positive_time_increment_is_fatal() {
        let mut config = TriagoConfig::default();
        config.scoring.time_increment = 0.0;
        assert!(config.validate().is_err());
    }

    #[test]
    fn unknown_rank_names_get_catch_all() {
        let ranks = RankConfig::default();
        assert_eq!(ranks.priority_rank("P2"), 2);
        assert_eq!(ranks.priority_rank("--"), 3);
        assert_eq!(ranks.severity_rank("trivial"), 6);
        assert_eq!(ranks.severity_rank("enhancement"), 7);
    }
}

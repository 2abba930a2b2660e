//! The capacity gate: does a developer have bandwidth left for one more bug?

use triago_core::{DeveloperTime, ScoringConfig, TriagoError};

/// Decides whether a developer is out of bandwidth for the current
/// analysis window.
///
/// A developer is busy when
/// `time_increment * available * (opened_days / fixed_days)` no longer
/// exceeds `unavailable` plus the load already committed to them in this
/// pass. `available` / `unavailable` are minutes spent on previously fixed
/// vs. still-open bugs.
///
/// # Examples
///
/// ```
/// use triago_assign::capacity::CapacityGate;
/// use triago_core::{DeveloperTime, ScoringConfig};
///
/// let gate = CapacityGate::new(&ScoringConfig::default()).unwrap();
/// let time = DeveloperTime { available: 1000.0, unavailable: 100.0 };
/// assert!(!gate.is_busy(&time, 0.0));
/// assert!(gate.is_busy(&time, 10_000.0));
/// ```
#[derive(Debug, Clone, Copy)]
pub struct CapacityGate {
    time_increment: f64,
    window_ratio: f64,
}

impl CapacityGate {
    /// Build a gate from validated scoring configuration.
    ///
    /// # Errors
    ///
    /// Returns [`TriagoError::Config`] when `bug_fixed_days` is zero: the
    /// window ratio would divide by zero, and that is a configuration
    /// mistake the run must abort on rather than paper over.
    pub fn new(scoring: &ScoringConfig) -> Result<Self, TriagoError> {
        if scoring.bug_fixed_days == 0 {
            return Err(TriagoError::Config(
                "scoring.bug_fixed_days must not be zero".into(),
            ));
        }
        Ok(Self {
            time_increment: scoring.time_increment,
            window_ratio: f64::from(scoring.bug_opened_days) / f64::from(scoring.bug_fixed_days),
        })
    }

    /// `true` when the developer has no remaining budget for a new bug,
    /// given the hypothetical load already committed to them this pass.
    pub fn is_busy(&self, time: &DeveloperTime, hypothetical_load: f64) -> bool {
        self.time_increment * time.available * self.window_ratio
            - (time.unavailable + hypothetical_load)
            <= 0.0
    }
}

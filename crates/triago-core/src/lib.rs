//! Core types, configuration, and error handling for the Triago platform.
//!
//! This crate provides the shared foundation used by all other Triago crates:
//! - [`TriagoError`] — unified error type using `thiserror`
//! - [`TriagoConfig`] — configuration loaded from `.triago.toml`
//! - Shared types: [`Bug`], [`Developer`], [`DevClassKey`], [`StatSnapshot`],
//!   [`BugStatistics`], [`CandidateEdge`], [`Assignment`], [`OutputFormat`]

mod config;
mod error;
mod types;

pub use config::{
    CacheConfig, RankConfig, ScoringConfig, ScoringWeights, TrackerConfig, TriagoConfig,
};
pub use error::TriagoError;
pub use types::{
    Assignment, Attachment, Bug, BugRelation, BugStatistics, CandidateEdge, Comment, DevClassKey,
    Developer, DeveloperTime, HistoryChange, OutputFormat, RelationKind, StatSnapshot,
};

/// A convenience `Result` type for Triago operations.
pub type Result<T> = std::result::Result<T, TriagoError>;

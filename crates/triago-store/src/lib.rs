//! Relational persistence for triago.
//!
//! [`IssueStore`] keeps scraped issue records in SQLite and exposes the
//! aggregate views the scoring pass reads: per-class developer snapshots,
//! per-bug population averages, developer time budgets, and the held-out
//! ground truth. Writes happen at import and assignment write-back; the
//! scoring pass itself only reads.

pub mod db;
pub mod metrics;

pub use db::{IssueStore, HISTORY_TEXT_LIMIT};

//! Bugzilla REST scraping for triago.
//!
//! [`client::BugzillaClient`] builds the tracker's advanced-search queries
//! and decodes their wire shapes into the shared triago types;
//! [`snapshot::TrackerSnapshot`] is the result of one full sweep (bugs,
//! developers, attachments, comments, history, relations), ready to be
//! cached and imported.

pub mod client;
pub mod snapshot;

pub use client::{BugzillaClient, ScrapedBug, Sweep};
pub use snapshot::{RunMode, SweepUrls, TrackerSnapshot};

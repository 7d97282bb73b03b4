//! # betabridge
//!
//! Library for bridging TestFlight beta feedback into an issue tracker.
//!
//! This library provides:
//! - A rate-limited client for the App Store Connect beta-feedback endpoints
//! - Normalization of crash and screenshot submissions into one record shape
//! - Opportunistic capture of screenshot bytes before their signed URLs expire
//! - Three-tier, fail-closed duplicate detection against the tracker
//! - An idempotent filing pipeline: new feedback becomes an issue, repeated
//!   feedback becomes a comment on the existing issue
//!
//! ## Pipeline
//!
//! One run flows through four stages:
//! - **Fetch:** crash and screenshot lists, filtered by cutoff, enriched
//!   from the per-item detail endpoints
//! - **Acquire:** screenshot bytes downloaded while signed URLs are live
//! - **Deduplicate:** existing issue located by the feedback id embedded in
//!   issue descriptions
//! - **File:** create or comment, with uploaded assets and resolved labels
//!
//! ## Example
//!
//! ```rust,no_run
//! use betabridge::Config;
//!
//! // Load configuration
//! let config = Config::load().expect("failed to load config");
//! config.app_store.validate().expect("invalid app_store config");
//! config.tracker.validate().expect("invalid tracker config");
//! ```

// Re-export commonly used items at the crate root
pub use appstore::{AppIdentity, AppStoreClient, FeedbackFetcher, TokenProvider};
pub use assets::ScreenshotFetcher;
pub use backoff::BackoffPolicy;
pub use config::Config;
pub use error::{Error, Result};
pub use tracker::{
    DuplicateDetector, FilingOptions, IssueFiler, IssueTracker, LabelResolver, TrackerService,
};
pub use types::*;

// Public modules
pub mod appstore;
pub mod assets;
pub mod backoff;
pub mod compose;
pub mod config;
pub mod error;
pub mod logging;
pub mod tracker;
pub mod types;

//! App Store Connect source side: rate-limited client, feedback fetcher,
//! and normalization of the raw API payloads.

pub mod client;
pub mod fetcher;
pub mod normalize;

pub use client::{AppStoreClient, TokenProvider};
pub use fetcher::{AppIdentity, FeedbackFetcher};

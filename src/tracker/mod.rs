//! Destination-tracker side: the typed RPC boundary, payload adapters,
//! duplicate detection, label resolution, and the filing orchestrator.
//!
//! [`IssueTracker`] is the seam between this crate and the tracker's wire
//! protocol. Implementations own transport, authentication, and query
//! construction; everything above the trait works with the raw payload
//! structs defined here and converts them to domain types through
//! [`adapters`].

pub mod adapters;
pub mod dedup;
pub mod filer;
pub mod labels;
pub mod service;

pub use dedup::DuplicateDetector;
pub use filer::{FilingOptions, IssueFiler};
pub use labels::LabelResolver;
pub use service::TrackerService;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;

// ============================================
// Raw payloads (tracker wire shapes)
// ============================================

/// Issue as returned by the tracker, fields optional wherever the API may
/// omit them. Converted to [`crate::types::TrackingIssue`] by the adapters.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawIssue {
    pub id: Option<String>,
    pub identifier: Option<String>,
    pub title: Option<String>,
    pub description: Option<String>,
    pub url: Option<String>,
    pub state: Option<RawWorkflowState>,
    pub priority: Option<f64>,
    pub labels: Vec<RawLabel>,
    pub assignee: Option<RawUser>,
    pub team: Option<RawTeam>,
    pub creator: Option<RawUser>,
    pub created_at: Option<DateTime<Utc>>,
    pub updated_at: Option<DateTime<Utc>>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawTeam {
    pub id: Option<String>,
    pub key: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawUser {
    pub id: Option<String>,
    pub name: Option<String>,
    pub email: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawLabel {
    pub id: Option<String>,
    pub name: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawWorkflowState {
    pub id: Option<String>,
    pub name: Option<String>,
    #[serde(rename = "type")]
    pub state_type: Option<String>,
}

/// Comment creation response. Trackers routinely omit the issue context
/// here; callers must tolerate `issue: None`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct RawComment {
    pub id: Option<String>,
    pub body: Option<String>,
    pub issue: Option<RawIssue>,
}

/// Upload slot handed out by the tracker's file-upload RPC.
#[derive(Debug, Clone)]
pub struct FileUploadTarget {
    /// Pre-signed URL the bytes are PUT to
    pub upload_url: String,
    /// Stable URL the asset is served from afterwards
    pub asset_url: String,
    /// Headers the PUT must carry
    pub headers: Vec<(String, String)>,
}

// ============================================
// Request inputs
// ============================================

/// Structured issue query.
#[derive(Debug, Clone, Default)]
pub struct IssueFilter {
    /// Restrict to one team
    pub team_id: Option<String>,
    /// Match issues whose title or description contains any of these strings
    pub contains_any: Vec<String>,
    /// Restrict to issues created at or after this instant
    pub created_after: Option<DateTime<Utc>>,
    /// Cap on returned issues
    pub limit: Option<usize>,
}

/// Fields for issue creation.
#[derive(Debug, Clone)]
pub struct IssueCreateInput {
    pub team_id: String,
    pub title: String,
    pub description: String,
    pub label_ids: Vec<String>,
}

// ============================================
// The RPC boundary
// ============================================

/// Typed boundary to the destination tracker.
///
/// The wire protocol (GraphQL for the reference tracker) lives entirely
/// behind this trait.
#[async_trait]
pub trait IssueTracker: Send + Sync {
    /// Create a new issue.
    async fn create_issue(&self, input: IssueCreateInput) -> Result<RawIssue>;

    /// Add a comment to an existing issue.
    async fn create_comment(&self, issue_id: &str, body: &str) -> Result<RawComment>;

    /// Structured issue query.
    async fn issues(&self, filter: &IssueFilter) -> Result<Vec<RawIssue>>;

    /// Full-text issue search.
    async fn search_issues(&self, query: &str) -> Result<Vec<RawIssue>>;

    /// Workflow states configured for a team.
    async fn workflow_states(&self, team_id: &str) -> Result<Vec<RawWorkflowState>>;

    /// Labels available to a team.
    async fn issue_labels(&self, team_id: &str) -> Result<Vec<RawLabel>>;

    /// Create a team label.
    async fn create_issue_label(&self, team_id: &str, name: &str) -> Result<RawLabel>;

    /// Look up a team.
    async fn team(&self, team_id: &str) -> Result<RawTeam>;

    /// The authenticated user.
    async fn viewer(&self) -> Result<RawUser>;

    /// Reserve an upload slot for an asset.
    async fn file_upload(
        &self,
        content_type: &str,
        file_name: &str,
        size: usize,
    ) -> Result<FileUploadTarget>;
}

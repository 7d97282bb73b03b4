//! Core domain types for betabridge
//!
//! These types represent the canonical data model that normalizes beta
//! feedback from the App Store Connect API into one shape per crash or
//! screenshot item, plus the tracker-side views produced when filing.
//!
//! ## Terminology
//!
//! | Term | Definition |
//! |------|------------|
//! | **FeedbackRecord** | One normalized crash or screenshot submission |
//! | **ImageRef** | A signed-URL screenshot reference, optionally with cached bytes |
//! | **RateLimitSnapshot** | Last observed rate-limit headers from the source API |
//! | **TrackingIssue** | Normalized view of an issue in the destination tracker |
//! | **FiledIssue** | Outcome of one filing run: the issue plus how it terminated |
//!
//! Records are produced fresh per fetch call and are immutable once
//! normalized, except for `system_info` merge-in and `ImageRef::cached_data`
//! population, both of which happen before a record reaches the filer.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};

// ============================================
// Feedback
// ============================================

/// Kind of feedback submission
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeedbackType {
    Crash,
    Screenshot,
}

impl FeedbackType {
    pub fn as_str(&self) -> &'static str {
        match self {
            FeedbackType::Crash => "crash",
            FeedbackType::Screenshot => "screenshot",
        }
    }
}

impl std::fmt::Display for FeedbackType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for FeedbackType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "crash" => Ok(FeedbackType::Crash),
            "screenshot" => Ok(FeedbackType::Screenshot),
            _ => Err(format!("unknown feedback type: {}", s)),
        }
    }
}

/// Device the feedback was submitted from
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device family ("iPhone", "iPad", ...)
    pub family: Option<String>,
    /// Device model identifier ("iPhone16,2")
    pub model: Option<String>,
    /// OS version string ("17.4.1")
    pub os_version: Option<String>,
    /// BCP-47 locale ("en-US")
    pub locale: Option<String>,
}

/// Tester identity, when the submission carries one
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TesterInfo {
    /// Tester email address
    pub email: String,
}

/// System telemetry attached by the detail endpoints
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SystemInfo {
    /// Battery charge at submission time (percent)
    pub battery_percentage: Option<i32>,
    /// Free disk space in bytes
    pub available_disk_bytes: Option<i64>,
    /// Device uptime in milliseconds
    pub uptime_ms: Option<i64>,
    /// Network connection type ("wifi", "cellular")
    pub connection_type: Option<String>,
    /// Screen width in points
    pub screen_width: Option<i32>,
    /// Screen height in points
    pub screen_height: Option<i32>,
    /// Architecture ("arm64")
    pub architecture: Option<String>,
}

impl SystemInfo {
    /// True when no telemetry field is populated
    pub fn is_empty(&self) -> bool {
        self.battery_percentage.is_none()
            && self.available_disk_bytes.is_none()
            && self.uptime_ms.is_none()
            && self.connection_type.is_none()
            && self.screen_width.is_none()
            && self.screen_height.is_none()
            && self.architecture.is_none()
    }
}

/// A time-limited crash log reference
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogRef {
    /// Signed URL for the log
    pub url: String,
    /// Absolute deadline after which the URL is unusable
    pub expires_at: Option<DateTime<Utc>>,
}

/// A screenshot reference with a time-limited signed URL.
///
/// Once `cached_data` is populated, the bytes take unconditional precedence
/// over `url`/`expires_at` for that image.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageRef {
    /// Time-limited signed URL
    pub url: String,
    /// File name reported by the source API
    pub file_name: String,
    /// Expected byte count (0 = unknown)
    pub file_size: u64,
    /// Absolute deadline after which `url` is unusable
    pub expires_at: Option<DateTime<Utc>>,
    /// Raw bytes captured opportunistically before expiration
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_data: Option<Vec<u8>>,
}

impl ImageRef {
    /// Whether the signed URL has expired as of `now`.
    ///
    /// The boundary is inclusive: a URL expiring exactly now is expired.
    /// Images without a deadline never expire.
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        match self.expires_at {
            Some(deadline) => deadline <= now,
            None => false,
        }
    }
}

/// Crash-specific payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct CrashData {
    /// Crash trace text
    pub trace: String,
    /// Exception type ("EXC_BAD_ACCESS")
    pub exception_type: Option<String>,
    /// Exception message
    pub exception_message: Option<String>,
    /// Signed-URL crash log references
    pub logs: Vec<LogRef>,
    /// Raw log text fetched from the crash-log endpoint
    pub detailed_logs: Vec<String>,
    /// Telemetry merged in from the detail endpoint
    pub system_info: Option<SystemInfo>,
}

/// Screenshot-feedback payload
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScreenshotData {
    /// Tester comment text
    pub text: String,
    /// Screenshot references (detail endpoint is authoritative for these)
    pub images: Vec<ImageRef>,
    /// Annotation strings attached by the tester
    pub annotations: Vec<String>,
    /// Telemetry merged in from the detail endpoint
    pub system_info: Option<SystemInfo>,
}

/// One normalized feedback submission.
///
/// `id` is the source-system primary key and the deduplication key: the
/// filer embeds it verbatim in issue descriptions, and the duplicate
/// detector confirms hits by looking for it there.
///
/// Exactly one of `crash_data`/`screenshot_data` is populated, enforced by
/// the [`FeedbackRecord::crash`] and [`FeedbackRecord::screenshot`]
/// constructors.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeedbackRecord {
    /// Source-system primary key, globally unique per feedback item
    pub id: String,
    /// Crash or screenshot
    pub feedback_type: FeedbackType,
    /// When the tester submitted the feedback
    pub submitted_at: DateTime<Utc>,
    /// App marketing version ("2.1.0")
    pub app_version: Option<String>,
    /// Build number ("1234")
    pub build_number: Option<String>,
    /// App bundle identifier
    pub bundle_id: Option<String>,
    /// Submitting device
    pub device_info: DeviceInfo,
    /// Tester identity, if known
    pub tester_info: Option<TesterInfo>,
    /// Crash payload (crash records only)
    pub crash_data: Option<CrashData>,
    /// Screenshot payload (screenshot records only)
    pub screenshot_data: Option<ScreenshotData>,
}

impl FeedbackRecord {
    /// Build a crash record.
    pub fn crash(id: impl Into<String>, submitted_at: DateTime<Utc>, data: CrashData) -> Self {
        Self {
            id: id.into(),
            feedback_type: FeedbackType::Crash,
            submitted_at,
            app_version: None,
            build_number: None,
            bundle_id: None,
            device_info: DeviceInfo::default(),
            tester_info: None,
            crash_data: Some(data),
            screenshot_data: None,
        }
    }

    /// Build a screenshot record.
    pub fn screenshot(
        id: impl Into<String>,
        submitted_at: DateTime<Utc>,
        data: ScreenshotData,
    ) -> Self {
        Self {
            id: id.into(),
            feedback_type: FeedbackType::Screenshot,
            submitted_at,
            app_version: None,
            build_number: None,
            bundle_id: None,
            device_info: DeviceInfo::default(),
            tester_info: None,
            crash_data: None,
            screenshot_data: Some(data),
        }
    }
}

// ============================================
// Rate limiting
// ============================================

/// Last observed rate-limit headers from the source API.
///
/// Mutated only by response-header inspection after each call; read before
/// each call to decide whether to block pre-emptively.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RateLimitSnapshot {
    /// Requests remaining in the current window
    pub remaining: u32,
    /// When the window resets
    pub reset: DateTime<Utc>,
    /// Window size
    pub limit: u32,
}

/// Remaining-request threshold below which calls block until reset.
pub const RATE_LIMIT_BLOCK_THRESHOLD: u32 = 5;

impl RateLimitSnapshot {
    /// How long a caller should wait before dispatching, if at all.
    ///
    /// Returns `Some(wait)` when the remaining budget is at or below the
    /// block threshold and the reset time is still in the future.
    pub fn blocking_delay(&self, now: DateTime<Utc>) -> Option<std::time::Duration> {
        if self.remaining > RATE_LIMIT_BLOCK_THRESHOLD {
            return None;
        }
        let wait = self.reset.signed_duration_since(now);
        if wait <= Duration::zero() {
            return None;
        }
        wait.to_std().ok()
    }
}

// ============================================
// Tracker views
// ============================================

/// Normalized view of an issue in the destination tracker.
///
/// Produced by the adapter layer from raw tracker payloads; constructed by
/// hand only as an explicit placeholder when the tracker omits issue
/// context on a comment response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingIssue {
    /// Tracker-internal id
    pub id: String,
    /// Human identifier ("ENG-123")
    pub identifier: String,
    /// Issue title
    pub title: String,
    /// Issue description (markdown)
    pub description: String,
    /// Web URL
    pub url: String,
    /// Workflow state name
    pub state: Option<String>,
    /// Priority (tracker-native scale)
    pub priority: Option<f64>,
    /// Label names
    pub labels: Vec<String>,
    /// Assignee display name
    pub assignee: Option<String>,
    /// Team key or name
    pub team: Option<String>,
    /// Creator display name
    pub creator: Option<String>,
    /// Creation timestamp
    pub created_at: Option<DateTime<Utc>>,
    /// Last-update timestamp
    pub updated_at: Option<DateTime<Utc>>,
}

/// Team identity in the destination tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TeamInfo {
    /// Tracker-internal id
    pub id: String,
    /// Team key ("ENG")
    pub key: String,
    /// Display name
    pub name: String,
}

/// User identity in the destination tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UserInfo {
    /// Tracker-internal id
    pub id: String,
    /// Display name
    pub name: String,
    /// Email, when exposed
    pub email: Option<String>,
}

/// Resolved label in the destination tracker
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LabelInfo {
    /// Tracker-internal id
    pub id: String,
    /// Label name
    pub name: String,
}

/// How a filing run terminated
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilingState {
    /// A new issue was created
    Created,
    /// An existing issue received a supplementary comment
    Commented,
}

impl FilingState {
    pub fn as_str(&self) -> &'static str {
        match self {
            FilingState::Created => "created",
            FilingState::Commented => "commented",
        }
    }
}

/// Outcome of one filing run
#[derive(Debug, Clone)]
pub struct FiledIssue {
    /// The created or commented issue
    pub issue: TrackingIssue,
    /// Terminal state of the run
    pub state: FilingState,
}

//! Normalization of raw App Store Connect feedback payloads
//!
//! Maps the JSON:API shapes returned by the beta-feedback endpoints into
//! canonical [`FeedbackRecord`]s. The API has shipped several generations
//! of field names for the same data, so the raw structs use `#[serde(default)]`
//! liberally plus aliases for the legacy spellings, and every conversion is
//! total: a record with missing fields normalizes to a record with `None`s,
//! never an error.
//!
//! # Timestamp Semantics
//!
//! `submitted_at` is derived from whichever of these attributes is present,
//! in priority order: `createdDate`, then `submittedAt`, then `timestamp`.
//! A record carrying none of them falls back to the time of parsing, with a
//! warning.

use chrono::{DateTime, Utc};
use serde::Deserialize;

use crate::types::{
    CrashData, DeviceInfo, FeedbackRecord, ImageRef, LogRef, ScreenshotData, SystemInfo,
    TesterInfo,
};

// ============================================
// Raw JSON:API shapes (serde deserialization)
// ============================================

/// List envelope: `{"data": [...]}`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ResourceList {
    pub data: Vec<Resource>,
}

/// Single-resource envelope: `{"data": {...}}`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct ResourceDocument {
    pub data: Resource,
}

/// One feedback resource (list or detail shape).
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct Resource {
    pub id: String,
    #[serde(rename = "type")]
    pub resource_type: Option<String>,
    pub attributes: FeedbackAttributes,
}

/// Feedback attributes across all known field-name generations.
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct FeedbackAttributes {
    // Submission time, in priority order
    pub created_date: Option<String>,
    pub submitted_at: Option<String>,
    pub timestamp: Option<String>,

    // Tester-entered content
    pub comment: Option<String>,
    #[serde(alias = "testerEmail")]
    pub email: Option<String>,
    pub annotations: Vec<String>,

    // App identity
    #[serde(alias = "appVersionString")]
    pub app_version: Option<String>,
    #[serde(alias = "bundleVersion", alias = "buildBundleVersion")]
    pub build_number: Option<String>,
    #[serde(alias = "appBundleId")]
    pub bundle_id: Option<String>,

    // Device
    pub device_family: Option<String>,
    #[serde(alias = "device")]
    pub device_model: Option<String>,
    #[serde(alias = "osVersionString")]
    pub os_version: Option<String>,
    pub locale: Option<String>,

    // Crash payload
    #[serde(alias = "trace")]
    pub crash_trace: Option<String>,
    pub exception_type: Option<String>,
    pub exception_message: Option<String>,
    #[serde(alias = "logs")]
    pub crash_logs: Vec<RawLogRef>,

    // Screenshot payload (detail endpoint only; the list endpoint returns
    // an empty list here even when screenshots exist)
    #[serde(alias = "images")]
    pub screenshots: Vec<RawImageRef>,

    // Telemetry (detail endpoint only)
    pub battery_percentage: Option<i32>,
    #[serde(alias = "diskBytesAvailable")]
    pub available_disk_bytes: Option<i64>,
    #[serde(alias = "uptimeMillis")]
    pub uptime_ms: Option<i64>,
    pub connection_type: Option<String>,
    pub screen_width: Option<i32>,
    pub screen_height: Option<i32>,
    pub architecture: Option<String>,
}

/// Raw crash-log reference
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawLogRef {
    pub url: String,
    #[serde(alias = "expirationDate")]
    pub expires_at: Option<String>,
}

/// Raw screenshot reference
#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct RawImageRef {
    pub url: String,
    pub file_name: String,
    pub file_size: u64,
    #[serde(alias = "expirationDate")]
    pub expires_at: Option<String>,
}

/// Crash-log document returned by `GET /betaFeedbackCrashSubmissions/{id}/crashLog`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CrashLogDocument {
    pub data: CrashLogResource,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct CrashLogResource {
    pub attributes: CrashLogAttributes,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct CrashLogAttributes {
    pub content: Option<String>,
    pub log: Option<String>,
}

impl CrashLogAttributes {
    /// The log text, whichever field generation carried it.
    pub fn text(&self) -> Option<&str> {
        self.content.as_deref().or(self.log.as_deref())
    }
}

/// App list envelope for `GET /apps`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppList {
    pub data: Vec<AppResource>,
}

/// Single-app envelope for `GET /apps/{id}`
#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct AppDocument {
    pub data: AppResource,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppResource {
    pub id: String,
    pub attributes: AppAttributes,
}

#[derive(Debug, Deserialize, Default)]
#[serde(default, rename_all = "camelCase")]
pub struct AppAttributes {
    pub bundle_id: Option<String>,
    pub name: Option<String>,
}

// ============================================
// Conversions
// ============================================

/// Parse an RFC 3339 timestamp, tolerating a missing value.
fn parse_rfc3339(value: Option<&str>) -> Option<DateTime<Utc>> {
    value
        .and_then(|s| DateTime::parse_from_rfc3339(s).ok())
        .map(|dt| dt.with_timezone(&Utc))
}

/// Derive the submission time from the first present source field.
pub fn submitted_at(id: &str, attrs: &FeedbackAttributes) -> DateTime<Utc> {
    let parsed = parse_rfc3339(attrs.created_date.as_deref())
        .or_else(|| parse_rfc3339(attrs.submitted_at.as_deref()))
        .or_else(|| parse_rfc3339(attrs.timestamp.as_deref()));

    match parsed {
        Some(ts) => ts,
        None => {
            tracing::warn!(
                feedback_id = %id,
                "feedback record has no usable timestamp, falling back to now"
            );
            Utc::now()
        }
    }
}

/// Telemetry from detail attributes, or `None` when nothing is populated.
pub fn system_info(attrs: &FeedbackAttributes) -> Option<SystemInfo> {
    let info = SystemInfo {
        battery_percentage: attrs.battery_percentage,
        available_disk_bytes: attrs.available_disk_bytes,
        uptime_ms: attrs.uptime_ms,
        connection_type: attrs.connection_type.clone(),
        screen_width: attrs.screen_width,
        screen_height: attrs.screen_height,
        architecture: attrs.architecture.clone(),
    };
    if info.is_empty() {
        None
    } else {
        Some(info)
    }
}

fn log_refs(attrs: &FeedbackAttributes) -> Vec<LogRef> {
    attrs
        .crash_logs
        .iter()
        .map(|raw| LogRef {
            url: raw.url.clone(),
            expires_at: parse_rfc3339(raw.expires_at.as_deref()),
        })
        .collect()
}

fn image_refs(attrs: &FeedbackAttributes) -> Vec<ImageRef> {
    attrs
        .screenshots
        .iter()
        .map(|raw| ImageRef {
            url: raw.url.clone(),
            file_name: if raw.file_name.is_empty() {
                "screenshot.png".to_string()
            } else {
                raw.file_name.clone()
            },
            file_size: raw.file_size,
            expires_at: parse_rfc3339(raw.expires_at.as_deref()),
            cached_data: None,
        })
        .collect()
}

fn apply_base_fields(record: &mut FeedbackRecord, attrs: &FeedbackAttributes) {
    record.app_version = attrs.app_version.clone();
    record.build_number = attrs.build_number.clone();
    record.bundle_id = attrs.bundle_id.clone();
    record.device_info = DeviceInfo {
        family: attrs.device_family.clone(),
        model: attrs.device_model.clone(),
        os_version: attrs.os_version.clone(),
        locale: attrs.locale.clone(),
    };
    record.tester_info = attrs
        .email
        .clone()
        .map(|email| TesterInfo { email });
}

/// Normalize a crash submission (list or detail shape).
pub fn normalize_crash(item: &Resource) -> FeedbackRecord {
    let attrs = &item.attributes;
    let data = CrashData {
        trace: attrs.crash_trace.clone().unwrap_or_default(),
        exception_type: attrs.exception_type.clone(),
        exception_message: attrs.exception_message.clone(),
        logs: log_refs(attrs),
        detailed_logs: Vec::new(),
        system_info: system_info(attrs),
    };
    let mut record = FeedbackRecord::crash(item.id.clone(), submitted_at(&item.id, attrs), data);
    apply_base_fields(&mut record, attrs);
    record
}

/// Normalize a screenshot submission (list or detail shape).
pub fn normalize_screenshot(item: &Resource) -> FeedbackRecord {
    let attrs = &item.attributes;
    let data = ScreenshotData {
        text: attrs.comment.clone().unwrap_or_default(),
        images: image_refs(attrs),
        annotations: attrs.annotations.clone(),
        system_info: system_info(attrs),
    };
    let mut record =
        FeedbackRecord::screenshot(item.id.clone(), submitted_at(&item.id, attrs), data);
    apply_base_fields(&mut record, attrs);
    record
}

/// Merge detail-endpoint attributes into a base-normalized record.
///
/// The detail endpoint is authoritative for telemetry and, for screenshot
/// records, the image list: a base record with zero images is filled from
/// the detail response rather than treated as "no screenshots".
pub fn merge_detail(record: &mut FeedbackRecord, detail: &Resource) {
    let attrs = &detail.attributes;
    let telemetry = system_info(attrs);

    if let Some(crash) = record.crash_data.as_mut() {
        if crash.trace.is_empty() {
            if let Some(trace) = &attrs.crash_trace {
                crash.trace = trace.clone();
            }
        }
        if crash.exception_type.is_none() {
            crash.exception_type = attrs.exception_type.clone();
        }
        if crash.exception_message.is_none() {
            crash.exception_message = attrs.exception_message.clone();
        }
        if crash.logs.is_empty() {
            crash.logs = log_refs(attrs);
        }
        if telemetry.is_some() {
            crash.system_info = telemetry;
        }
    } else if let Some(shot) = record.screenshot_data.as_mut() {
        if shot.images.is_empty() {
            shot.images = image_refs(attrs);
        }
        if shot.text.is_empty() {
            if let Some(comment) = &attrs.comment {
                shot.text = comment.clone();
            }
        }
        if shot.annotations.is_empty() {
            shot.annotations = attrs.annotations.clone();
        }
        if telemetry.is_some() {
            shot.system_info = telemetry;
        }
    }

    // Detail responses sometimes carry identity fields the list omitted
    if record.app_version.is_none() {
        record.app_version = attrs.app_version.clone();
    }
    if record.build_number.is_none() {
        record.build_number = attrs.build_number.clone();
    }
    if record.bundle_id.is_none() {
        record.bundle_id = attrs.bundle_id.clone();
    }
    if record.tester_info.is_none() {
        record.tester_info = attrs.email.clone().map(|email| TesterInfo { email });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::FeedbackType;

    fn resource(json: serde_json::Value) -> Resource {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn test_timestamp_priority_prefers_created_date() {
        let item = resource(serde_json::json!({
            "id": "fb-1",
            "attributes": {
                "createdDate": "2026-08-01T10:00:00Z",
                "submittedAt": "2026-08-02T10:00:00Z",
                "timestamp": "2026-08-03T10:00:00Z"
            }
        }));
        let ts = submitted_at(&item.id, &item.attributes);
        assert_eq!(ts.to_rfc3339(), "2026-08-01T10:00:00+00:00");
    }

    #[test]
    fn test_timestamp_falls_through_to_legacy_fields() {
        let item = resource(serde_json::json!({
            "id": "fb-2",
            "attributes": { "timestamp": "2026-08-03T10:00:00Z" }
        }));
        let ts = submitted_at(&item.id, &item.attributes);
        assert_eq!(ts.to_rfc3339(), "2026-08-03T10:00:00+00:00");
    }

    #[test]
    fn test_normalize_crash_maps_fields() {
        let item = resource(serde_json::json!({
            "id": "crash-1",
            "type": "betaFeedbackCrashSubmissions",
            "attributes": {
                "createdDate": "2026-08-10T12:00:00Z",
                "appVersionString": "2.1.0",
                "bundleVersion": "1234",
                "appBundleId": "com.example.app",
                "device": "iPhone16,2",
                "osVersionString": "17.4.1",
                "locale": "en-US",
                "testerEmail": "tester@example.com",
                "exceptionType": "EXC_BAD_ACCESS",
                "trace": "0 libsystem ...",
                "logs": [{"url": "https://cdn/log1", "expirationDate": "2026-08-10T13:00:00Z"}]
            }
        }));
        let record = normalize_crash(&item);

        assert_eq!(record.id, "crash-1");
        assert_eq!(record.feedback_type, FeedbackType::Crash);
        assert_eq!(record.app_version.as_deref(), Some("2.1.0"));
        assert_eq!(record.build_number.as_deref(), Some("1234"));
        assert_eq!(record.bundle_id.as_deref(), Some("com.example.app"));
        assert_eq!(record.device_info.model.as_deref(), Some("iPhone16,2"));
        assert_eq!(record.device_info.os_version.as_deref(), Some("17.4.1"));
        assert_eq!(record.tester_info.unwrap().email, "tester@example.com");

        let crash = record.crash_data.unwrap();
        assert_eq!(crash.exception_type.as_deref(), Some("EXC_BAD_ACCESS"));
        assert!(crash.trace.starts_with("0 libsystem"));
        assert_eq!(crash.logs.len(), 1);
        assert!(crash.logs[0].expires_at.is_some());
    }

    #[test]
    fn test_normalize_screenshot_without_images() {
        // The list endpoint omits image URLs entirely
        let item = resource(serde_json::json!({
            "id": "shot-1",
            "attributes": {
                "submittedAt": "2026-08-10T12:00:00Z",
                "comment": "Button is clipped"
            }
        }));
        let record = normalize_screenshot(&item);
        let shot = record.screenshot_data.unwrap();
        assert_eq!(shot.text, "Button is clipped");
        assert!(shot.images.is_empty());
    }

    #[test]
    fn test_merge_detail_fills_images_and_telemetry() {
        let base = resource(serde_json::json!({
            "id": "shot-2",
            "attributes": {
                "createdDate": "2026-08-10T12:00:00Z",
                "comment": "Dark mode glitch"
            }
        }));
        let mut record = normalize_screenshot(&base);

        let detail = resource(serde_json::json!({
            "id": "shot-2",
            "attributes": {
                "screenshots": [
                    {"url": "https://cdn/s1.png", "fileName": "s1.png", "fileSize": 2048,
                     "expirationDate": "2026-08-10T13:00:00Z"}
                ],
                "batteryPercentage": 42,
                "connectionType": "wifi",
                "screenWidth": 393,
                "screenHeight": 852
            }
        }));
        merge_detail(&mut record, &detail);

        let shot = record.screenshot_data.unwrap();
        assert_eq!(shot.images.len(), 1);
        assert_eq!(shot.images[0].file_name, "s1.png");
        assert_eq!(shot.images[0].file_size, 2048);
        let info = shot.system_info.unwrap();
        assert_eq!(info.battery_percentage, Some(42));
        assert_eq!(info.connection_type.as_deref(), Some("wifi"));
    }

    #[test]
    fn test_merge_detail_fills_missing_crash_fields() {
        let base = resource(serde_json::json!({
            "id": "crash-2",
            "attributes": { "createdDate": "2026-08-10T12:00:00Z" }
        }));
        let mut record = normalize_crash(&base);

        let detail = resource(serde_json::json!({
            "id": "crash-2",
            "attributes": {
                "exceptionType": "SIGABRT",
                "trace": "abort() called",
                "uptimeMillis": 360000
            }
        }));
        merge_detail(&mut record, &detail);

        let crash = record.crash_data.unwrap();
        assert_eq!(crash.exception_type.as_deref(), Some("SIGABRT"));
        assert_eq!(crash.trace, "abort() called");
        assert_eq!(crash.system_info.unwrap().uptime_ms, Some(360000));
    }

    #[test]
    fn test_missing_fields_normalize_to_defaults() {
        let item = resource(serde_json::json!({"id": "bare", "attributes": {}}));
        let record = normalize_crash(&item);
        assert!(record.app_version.is_none());
        assert!(record.tester_info.is_none());
        assert!(record.crash_data.unwrap().trace.is_empty());
    }
}

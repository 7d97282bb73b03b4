//! Issue text composition
//!
//! Pure string formatting for issue titles, markdown descriptions, and
//! duplicate comments. Every description embeds the feedback id twice: once
//! bare and once as the `TestFlight ID: {id}` marker line the duplicate
//! detector queries for.

use crate::tracker::dedup::feedback_marker;
use crate::types::{FeedbackRecord, FeedbackType, SystemInfo};

/// Cap on embedded crash trace / log text.
const TRACE_CHAR_LIMIT: usize = 6000;
const TITLE_SNIPPET_LIMIT: usize = 60;

/// A screenshot link ready for the description: either the uploaded tracker
/// asset or the original signed URL as a fallback.
#[derive(Debug, Clone)]
pub struct AssetLink {
    pub file_name: String,
    pub url: String,
}

/// Title for a new issue.
///
/// Crash titles carry the exception type; screenshot titles carry the first
/// line of the tester's comment.
pub fn issue_title(record: &FeedbackRecord) -> String {
    match record.feedback_type {
        FeedbackType::Crash => {
            let exception = record
                .crash_data
                .as_ref()
                .and_then(|c| c.exception_type.as_deref())
                .unwrap_or("Unknown exception");
            format!("TestFlight Crash: {}", exception)
        }
        FeedbackType::Screenshot => {
            let text = record
                .screenshot_data
                .as_ref()
                .map(|s| s.text.as_str())
                .unwrap_or("");
            let snippet = text.lines().next().unwrap_or("").trim();
            if snippet.is_empty() {
                "TestFlight Feedback: screenshot".to_string()
            } else {
                format!("TestFlight Feedback: {}", truncate(snippet, TITLE_SNIPPET_LIMIT))
            }
        }
    }
}

/// Markdown description for a new issue.
pub fn issue_description(record: &FeedbackRecord, assets: &[AssetLink]) -> String {
    let mut out = String::new();

    out.push_str("## TestFlight Feedback\n\n");
    push_field(&mut out, "Type", Some(record.feedback_type.as_str()));
    out.push_str(&format!("- {}\n", feedback_marker(&record.id)));
    push_field(
        &mut out,
        "Submitted",
        Some(record.submitted_at.to_rfc3339().as_str()),
    );
    push_field(&mut out, "App Version", version_string(record).as_deref());
    push_field(&mut out, "Bundle ID", record.bundle_id.as_deref());
    push_field(&mut out, "Device", device_string(record).as_deref());
    push_field(&mut out, "Locale", record.device_info.locale.as_deref());
    push_field(
        &mut out,
        "Tester",
        record.tester_info.as_ref().map(|t| t.email.as_str()),
    );

    if let Some(crash) = &record.crash_data {
        out.push_str("\n## Crash Details\n\n");
        push_field(&mut out, "Exception", crash.exception_type.as_deref());
        push_field(&mut out, "Message", crash.exception_message.as_deref());
        if !crash.trace.is_empty() {
            out.push_str("\n```\n");
            out.push_str(truncate(&crash.trace, TRACE_CHAR_LIMIT));
            out.push_str("\n```\n");
        }
        for log in &crash.detailed_logs {
            out.push_str("\n```\n");
            out.push_str(truncate(log, TRACE_CHAR_LIMIT));
            out.push_str("\n```\n");
        }
        push_system_info(&mut out, crash.system_info.as_ref());
    }

    if let Some(shot) = &record.screenshot_data {
        if !shot.text.is_empty() {
            out.push_str("\n## Comment\n\n");
            out.push_str(&shot.text);
            out.push('\n');
        }
        if !shot.annotations.is_empty() {
            out.push_str("\n## Annotations\n\n");
            for annotation in &shot.annotations {
                out.push_str(&format!("- {}\n", annotation));
            }
        }
        push_system_info(&mut out, shot.system_info.as_ref());
    }

    if !assets.is_empty() {
        out.push_str("\n## Screenshots\n\n");
        for asset in assets {
            out.push_str(&format!("![{}]({})\n", asset.file_name, asset.url));
        }
    }

    out
}

/// Comment body noting a re-occurrence on an existing issue.
pub fn duplicate_comment(record: &FeedbackRecord) -> String {
    let mut out = format!(
        "New {} feedback received for this issue.\n\n- Submitted: {}\n",
        record.feedback_type,
        record.submitted_at.to_rfc3339(),
    );
    if let Some(version) = version_string(record) {
        out.push_str(&format!("- App Version: {}\n", version));
    }
    out.push_str(&format!("- {}\n", feedback_marker(&record.id)));
    out
}

fn push_field(out: &mut String, name: &str, value: Option<&str>) {
    if let Some(value) = value {
        if !value.is_empty() {
            out.push_str(&format!("- {}: {}\n", name, value));
        }
    }
}

fn version_string(record: &FeedbackRecord) -> Option<String> {
    match (&record.app_version, &record.build_number) {
        (Some(v), Some(b)) => Some(format!("{} ({})", v, b)),
        (Some(v), None) => Some(v.clone()),
        (None, Some(b)) => Some(format!("build {}", b)),
        (None, None) => None,
    }
}

fn device_string(record: &FeedbackRecord) -> Option<String> {
    let device = &record.device_info;
    match (&device.model, &device.os_version) {
        (Some(m), Some(os)) => Some(format!("{} ({})", m, os)),
        (Some(m), None) => Some(m.clone()),
        (None, Some(os)) => Some(format!("OS {}", os)),
        (None, None) => None,
    }
}

fn push_system_info(out: &mut String, info: Option<&SystemInfo>) {
    let Some(info) = info else { return };

    out.push_str("\n## System\n\n");
    if let Some(battery) = info.battery_percentage {
        out.push_str(&format!("- Battery: {}%\n", battery));
    }
    if let Some(disk) = info.available_disk_bytes {
        out.push_str(&format!("- Disk Free: {} MB\n", disk / (1024 * 1024)));
    }
    if let Some(uptime) = info.uptime_ms {
        out.push_str(&format!("- Uptime: {}s\n", uptime / 1000));
    }
    push_field(out, "Connection", info.connection_type.as_deref());
    if let (Some(w), Some(h)) = (info.screen_width, info.screen_height) {
        out.push_str(&format!("- Screen: {}x{}\n", w, h));
    }
    push_field(out, "Architecture", info.architecture.as_deref());
}

fn truncate(text: &str, limit: usize) -> &str {
    if text.len() <= limit {
        return text;
    }
    // Back off to a char boundary
    let mut end = limit;
    while end > 0 && !text.is_char_boundary(end) {
        end -= 1;
    }
    &text[..end]
}

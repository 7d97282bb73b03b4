//! Conversions from raw tracker payloads to domain types
//!
//! Each conversion checks field presence explicitly and fails with a named
//! missing field, so a malformed tracker response surfaces as one clear
//! error instead of a panic or a half-populated struct.

use crate::error::{Error, Result};
use crate::tracker::{RawIssue, RawLabel, RawTeam, RawUser};
use crate::types::{LabelInfo, TeamInfo, TrackingIssue, UserInfo};

fn required(field: Option<String>, entity: &str, name: &str) -> Result<String> {
    field.ok_or_else(|| Error::Tracker(format!("{} payload missing {}", entity, name)))
}

/// Convert a raw issue, requiring id, identifier, title, and url.
pub fn issue_from_raw(raw: RawIssue) -> Result<TrackingIssue> {
    Ok(TrackingIssue {
        id: required(raw.id, "issue", "id")?,
        identifier: required(raw.identifier, "issue", "identifier")?,
        title: required(raw.title, "issue", "title")?,
        description: raw.description.unwrap_or_default(),
        url: required(raw.url, "issue", "url")?,
        state: raw.state.and_then(|s| s.name),
        priority: raw.priority,
        labels: raw.labels.into_iter().filter_map(|l| l.name).collect(),
        assignee: raw.assignee.and_then(|u| u.name),
        team: raw.team.and_then(|t| t.key.or(t.name)),
        creator: raw.creator.and_then(|u| u.name),
        created_at: raw.created_at,
        updated_at: raw.updated_at,
    })
}

/// Convert a raw team, requiring id and key.
pub fn team_from_raw(raw: RawTeam) -> Result<TeamInfo> {
    let id = required(raw.id, "team", "id")?;
    let key = required(raw.key, "team", "key")?;
    let name = raw.name.unwrap_or_else(|| key.clone());
    Ok(TeamInfo { id, key, name })
}

/// Convert a raw user, requiring id and name.
pub fn user_from_raw(raw: RawUser) -> Result<UserInfo> {
    Ok(UserInfo {
        id: required(raw.id, "user", "id")?,
        name: required(raw.name, "user", "name")?,
        email: raw.email,
    })
}

/// Convert a raw label, requiring id and name.
pub fn label_from_raw(raw: RawLabel) -> Result<LabelInfo> {
    Ok(LabelInfo {
        id: required(raw.id, "label", "id")?,
        name: required(raw.name, "label", "name")?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::RawWorkflowState;

    fn full_issue() -> RawIssue {
        RawIssue {
            id: Some("issue-1".to_string()),
            identifier: Some("ENG-42".to_string()),
            title: Some("Crash on launch".to_string()),
            description: Some("TestFlight ID: fb-1".to_string()),
            url: Some("https://tracker.example.com/issue/ENG-42".to_string()),
            state: Some(RawWorkflowState {
                id: Some("state-1".to_string()),
                name: Some("Todo".to_string()),
                state_type: Some("unstarted".to_string()),
            }),
            priority: Some(2.0),
            labels: vec![
                RawLabel {
                    id: Some("lbl-1".to_string()),
                    name: Some("TestFlight".to_string()),
                },
                RawLabel {
                    id: Some("lbl-2".to_string()),
                    name: None,
                },
            ],
            ..Default::default()
        }
    }

    #[test]
    fn test_issue_conversion_maps_fields() {
        let issue = issue_from_raw(full_issue()).unwrap();
        assert_eq!(issue.id, "issue-1");
        assert_eq!(issue.identifier, "ENG-42");
        assert_eq!(issue.state.as_deref(), Some("Todo"));
        // Nameless labels are dropped rather than erroring
        assert_eq!(issue.labels, vec!["TestFlight".to_string()]);
    }

    #[test]
    fn test_issue_conversion_requires_id() {
        let mut raw = full_issue();
        raw.id = None;
        let err = issue_from_raw(raw).unwrap_err();
        assert!(err.to_string().contains("missing id"));
    }

    #[test]
    fn test_team_name_defaults_to_key() {
        let team = team_from_raw(RawTeam {
            id: Some("team-1".to_string()),
            key: Some("ENG".to_string()),
            name: None,
        })
        .unwrap();
        assert_eq!(team.name, "ENG");
    }

    #[test]
    fn test_label_conversion_requires_name() {
        let raw = RawLabel {
            id: Some("lbl-1".to_string()),
            name: None,
        };
        assert!(label_from_raw(raw).is_err());
    }
}

//! Three-tier duplicate detection
//!
//! Before filing, the detector looks for an existing issue carrying the
//! feedback id. A hit counts only when the candidate's description literally
//! contains the id; title matches alone are leads, not confirmations.
//!
//! Tiers, in order:
//! 1. structured team-scoped query matching title or description against the
//!    id and its `TestFlight ID: {id}` marker form;
//! 2. full-text search, re-filtered to the configured team;
//! 3. direct scan of the team's most recent issues inside a trailing window.
//!
//! Any tier erroring fails the whole pass; passes are retried with backoff.
//! A clean no-match across all three tiers is a final negative. When every
//! pass errors the result is [`Error::DuplicateCheck`] and the caller must
//! not create an issue.

use std::sync::Arc;

use chrono::{Duration, Utc};

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::tracker::{adapters, IssueFilter, RawIssue, TrackerService};
use crate::types::{FeedbackRecord, TrackingIssue};

/// Marker line embedded in every filed description; also one of the
/// patterns the detector queries for.
pub fn feedback_marker(feedback_id: &str) -> String {
    format!("TestFlight ID: {}", feedback_id)
}

pub struct DuplicateDetector {
    service: Arc<TrackerService>,
    retry: BackoffPolicy,
}

impl DuplicateDetector {
    pub fn new(service: Arc<TrackerService>) -> Self {
        Self {
            service,
            retry: BackoffPolicy::duplicate_checks(),
        }
    }

    /// Override the retry policy. Tests use millisecond delays.
    pub fn with_policy(mut self, retry: BackoffPolicy) -> Self {
        self.retry = retry;
        self
    }

    /// Find an existing issue for `record`, or `None` when all tiers come
    /// back clean.
    ///
    /// Fail-closed: when every pass errors, returns `Error::DuplicateCheck`
    /// and the caller must abort creation.
    pub async fn find_existing(&self, record: &FeedbackRecord) -> Result<Option<TrackingIssue>> {
        let mut last_error: Option<Error> = None;

        for attempt in 0..self.retry.max_attempts {
            if attempt > 0 {
                let delay = self.retry.delay_for(attempt - 1);
                tracing::debug!(
                    feedback_id = %record.id,
                    attempt = attempt + 1,
                    delay_ms = delay.as_millis() as u64,
                    "retrying duplicate check"
                );
                tokio::time::sleep(delay).await;
            }

            match self.run_tiers(record).await {
                Ok(result) => return Ok(result),
                // Bad credentials will not improve with retries
                Err(e @ Error::Auth { .. }) => return Err(e),
                Err(e) => {
                    tracing::warn!(
                        feedback_id = %record.id,
                        attempt = attempt + 1,
                        error = %e,
                        "duplicate check pass failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(Error::DuplicateCheck {
            message: last_error
                .map(|e| e.to_string())
                .unwrap_or_else(|| "no passes executed".to_string()),
            attempts: self.retry.max_attempts,
        })
    }

    /// One pass over all three tiers. First confirmed hit wins.
    async fn run_tiers(&self, record: &FeedbackRecord) -> Result<Option<TrackingIssue>> {
        let team = self.service.team().await?;
        let tracker = self.service.tracker();
        let config = self.service.config();

        // Tier 1: structured team-scoped query
        let filter = IssueFilter {
            team_id: Some(team.id.clone()),
            contains_any: vec![record.id.clone(), feedback_marker(&record.id)],
            created_after: None,
            limit: None,
        };
        let candidates = tracker.issues(&filter).await?;
        if let Some(issue) = confirm(candidates, &record.id)? {
            tracing::info!(feedback_id = %record.id, issue = %issue.identifier, tier = 1, "duplicate found");
            return Ok(Some(issue));
        }

        // Tier 2: full-text search, re-filtered to our team
        let found = tracker.search_issues(&record.id).await?;
        let ours: Vec<RawIssue> = found
            .into_iter()
            .filter(|raw| {
                raw.team
                    .as_ref()
                    .and_then(|t| t.id.as_deref())
                    .map(|id| id == team.id)
                    .unwrap_or(false)
            })
            .collect();
        if let Some(issue) = confirm(ours, &record.id)? {
            tracing::info!(feedback_id = %record.id, issue = %issue.identifier, tier = 2, "duplicate found");
            return Ok(Some(issue));
        }

        // Tier 3: recent team issues inside the trailing window
        let filter = IssueFilter {
            team_id: Some(team.id.clone()),
            contains_any: Vec::new(),
            created_after: Some(Utc::now() - Duration::days(config.recent_window_days)),
            limit: Some(config.recent_scan_limit),
        };
        let recent = tracker.issues(&filter).await?;
        if let Some(issue) = confirm(recent, &record.id)? {
            tracing::info!(feedback_id = %record.id, issue = %issue.identifier, tier = 3, "duplicate found");
            return Ok(Some(issue));
        }

        Ok(None)
    }
}

/// First candidate whose description contains the feedback id.
fn confirm(candidates: Vec<RawIssue>, feedback_id: &str) -> Result<Option<TrackingIssue>> {
    for raw in candidates {
        let hit = raw
            .description
            .as_deref()
            .map(|d| d.contains(feedback_id))
            .unwrap_or(false);
        if hit {
            return adapters::issue_from_raw(raw).map(Some);
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TrackerConfig;
    use crate::tracker::{
        FileUploadTarget, IssueCreateInput, IssueTracker, RawComment, RawLabel, RawTeam, RawUser,
        RawWorkflowState,
    };
    use crate::types::CrashData;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration as StdDuration;

    fn raw_issue(id: &str, description: &str, team_id: Option<&str>) -> RawIssue {
        RawIssue {
            id: Some(id.to_string()),
            identifier: Some(format!("ENG-{}", id)),
            title: Some("Crash on launch".to_string()),
            description: Some(description.to_string()),
            url: Some(format!("https://tracker.example.com/{}", id)),
            team: team_id.map(|t| RawTeam {
                id: Some(t.to_string()),
                key: Some("ENG".to_string()),
                name: None,
            }),
            ..Default::default()
        }
    }

    #[derive(Default)]
    struct TierMock {
        filtered: Vec<RawIssue>,
        searched: Vec<RawIssue>,
        recent: Vec<RawIssue>,
        fail_transport: bool,
        fail_auth: bool,
        passes: AtomicUsize,
    }

    impl TierMock {
        fn fail(&self) -> Option<Error> {
            if self.fail_auth {
                return Some(Error::Auth {
                    status: Some(401),
                    message: "bad token".to_string(),
                });
            }
            if self.fail_transport {
                return Some(Error::Transport {
                    status: Some(503),
                    message: "unavailable".to_string(),
                    attempts: 1,
                });
            }
            None
        }
    }

    #[async_trait]
    impl IssueTracker for TierMock {
        async fn create_issue(&self, _input: IssueCreateInput) -> Result<RawIssue> {
            Err(Error::Tracker("not supported".to_string()))
        }
        async fn create_comment(&self, _issue_id: &str, _body: &str) -> Result<RawComment> {
            Err(Error::Tracker("not supported".to_string()))
        }
        async fn issues(&self, filter: &IssueFilter) -> Result<Vec<RawIssue>> {
            if filter.created_after.is_none() {
                self.passes.fetch_add(1, Ordering::SeqCst);
                if let Some(e) = self.fail() {
                    return Err(e);
                }
                Ok(self.filtered.clone())
            } else {
                Ok(self.recent.clone())
            }
        }
        async fn search_issues(&self, _query: &str) -> Result<Vec<RawIssue>> {
            Ok(self.searched.clone())
        }
        async fn workflow_states(&self, _team_id: &str) -> Result<Vec<RawWorkflowState>> {
            Ok(Vec::new())
        }
        async fn issue_labels(&self, _team_id: &str) -> Result<Vec<RawLabel>> {
            Ok(Vec::new())
        }
        async fn create_issue_label(&self, _team_id: &str, _name: &str) -> Result<RawLabel> {
            Err(Error::Tracker("not supported".to_string()))
        }
        async fn team(&self, team_id: &str) -> Result<RawTeam> {
            Ok(RawTeam {
                id: Some(team_id.to_string()),
                key: Some("ENG".to_string()),
                name: None,
            })
        }
        async fn viewer(&self) -> Result<RawUser> {
            Ok(RawUser::default())
        }
        async fn file_upload(
            &self,
            _content_type: &str,
            _file_name: &str,
            _size: usize,
        ) -> Result<FileUploadTarget> {
            Err(Error::Tracker("not supported".to_string()))
        }
    }

    fn detector(mock: Arc<TierMock>) -> DuplicateDetector {
        let config = TrackerConfig {
            team_id: Some("team-1".to_string()),
            ..Default::default()
        };
        let service = Arc::new(TrackerService::new(mock, config).unwrap());
        DuplicateDetector::new(service).with_policy(
            BackoffPolicy::duplicate_checks().with_base_delay(StdDuration::from_millis(1)),
        )
    }

    fn record(id: &str) -> FeedbackRecord {
        FeedbackRecord::crash(id, Utc::now(), CrashData::default())
    }

    #[tokio::test]
    async fn test_tier_one_confirmed_hit() {
        let mock = Arc::new(TierMock {
            filtered: vec![raw_issue("1", "details\nTestFlight ID: fb-9", Some("team-1"))],
            ..Default::default()
        });
        let found = detector(mock).find_existing(&record("fb-9")).await.unwrap();
        assert_eq!(found.unwrap().identifier, "ENG-1");
    }

    #[tokio::test]
    async fn test_title_match_alone_is_not_confirmed() {
        // Candidate surfaced by the query but id absent from the description
        let mock = Arc::new(TierMock {
            filtered: vec![raw_issue("1", "unrelated body", Some("team-1"))],
            ..Default::default()
        });
        let found = detector(mock).find_existing(&record("fb-9")).await.unwrap();
        assert!(found.is_none());
    }

    #[tokio::test]
    async fn test_tier_two_respects_team_filter() {
        let mock = Arc::new(TierMock {
            searched: vec![
                raw_issue("other", "TestFlight ID: fb-9", Some("team-2")),
                raw_issue("ours", "TestFlight ID: fb-9", Some("team-1")),
            ],
            ..Default::default()
        });
        let found = detector(mock).find_existing(&record("fb-9")).await.unwrap();
        assert_eq!(found.unwrap().identifier, "ENG-ours");
    }

    #[tokio::test]
    async fn test_tier_three_scans_recent_issues() {
        let mock = Arc::new(TierMock {
            recent: vec![raw_issue("3", "seen before: fb-9", Some("team-1"))],
            ..Default::default()
        });
        let found = detector(mock).find_existing(&record("fb-9")).await.unwrap();
        assert_eq!(found.unwrap().identifier, "ENG-3");
    }

    #[tokio::test]
    async fn test_clean_no_match_is_final() {
        let mock = Arc::new(TierMock::default());
        let det = detector(Arc::clone(&mock));
        let found = det.find_existing(&record("fb-9")).await.unwrap();
        assert!(found.is_none());
        // A clean negative is not retried
        assert_eq!(mock.passes.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_all_passes_failing_is_fail_closed() {
        let mock = Arc::new(TierMock {
            fail_transport: true,
            ..Default::default()
        });
        let det = detector(Arc::clone(&mock));
        let err = det.find_existing(&record("fb-9")).await.unwrap_err();
        match err {
            Error::DuplicateCheck { attempts, .. } => assert_eq!(attempts, 3),
            other => panic!("unexpected error: {}", other),
        }
        assert_eq!(mock.passes.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_auth_error_aborts_without_retry() {
        let mock = Arc::new(TierMock {
            fail_auth: true,
            ..Default::default()
        });
        let det = detector(Arc::clone(&mock));
        let err = det.find_existing(&record("fb-9")).await.unwrap_err();
        assert!(matches!(err, Error::Auth { .. }));
        assert_eq!(mock.passes.load(Ordering::SeqCst), 1);
    }
}

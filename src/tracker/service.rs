//! Tracker session: team cache, health probes, and asset upload
//!
//! [`TrackerService`] wraps an [`IssueTracker`] with the pieces that are
//! shared across every filing run: a client-lifetime cache of the resolved
//! team, connectivity/authentication probes, and the two-step asset upload
//! (reserve an upload slot via the tracker RPC, then PUT the bytes to the
//! returned pre-signed URL).

use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use crate::config::TrackerConfig;
use crate::error::{Error, Result};
use crate::tracker::{adapters, IssueTracker};
use crate::types::TeamInfo;

pub struct TrackerService {
    tracker: Arc<dyn IssueTracker>,
    config: TrackerConfig,
    http: reqwest::Client,
    team_cache: Mutex<Option<TeamInfo>>,
}

impl TrackerService {
    pub fn new(tracker: Arc<dyn IssueTracker>, config: TrackerConfig) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(config.upload_timeout_secs))
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            tracker,
            config,
            http,
            team_cache: Mutex::new(None),
        })
    }

    /// The underlying RPC boundary.
    pub fn tracker(&self) -> Arc<dyn IssueTracker> {
        Arc::clone(&self.tracker)
    }

    pub fn config(&self) -> &TrackerConfig {
        &self.config
    }

    /// Resolve the configured team, fetching it once per service lifetime.
    pub async fn team(&self) -> Result<TeamInfo> {
        if let Some(team) = self.cached_team() {
            return Ok(team);
        }

        let team_id = self
            .config
            .team_id
            .as_deref()
            .ok_or_else(|| Error::Config("tracker.team_id is required".to_string()))?;

        let team = adapters::team_from_raw(self.tracker.team(team_id).await?)?;
        tracing::debug!(team_id = %team.id, team_key = %team.key, "resolved tracker team");
        *self
            .team_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = Some(team.clone());
        Ok(team)
    }

    fn cached_team(&self) -> Option<TeamInfo> {
        self.team_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// Drop the cached team so the next call re-fetches. Test isolation.
    pub fn reset_team_cache(&self) {
        *self
            .team_cache
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = None;
    }

    /// Whether the tracker accepts our credentials.
    pub async fn test_authentication(&self) -> bool {
        match self.tracker.viewer().await {
            Ok(_) => true,
            Err(e) => {
                tracing::warn!(error = %e, "tracker authentication probe failed");
                false
            }
        }
    }

    /// Whether both the team and the viewer resolve. Probes run in parallel.
    pub async fn test_connectivity(&self) -> bool {
        let (team, viewer) = tokio::join!(self.team(), self.tracker.viewer());
        match (&team, &viewer) {
            (Ok(_), Ok(_)) => true,
            _ => {
                if let Err(e) = team {
                    tracing::warn!(error = %e, "tracker team probe failed");
                }
                if let Err(e) = viewer {
                    tracing::warn!(error = %e, "tracker viewer probe failed");
                }
                false
            }
        }
    }

    /// Upload asset bytes and return the stable asset URL.
    ///
    /// Two steps: reserve an upload slot via the tracker RPC, then PUT the
    /// bytes to the pre-signed URL with the headers the slot demands.
    pub async fn upload_asset(
        &self,
        bytes: Vec<u8>,
        file_name: &str,
        content_type: &str,
    ) -> Result<String> {
        let size = bytes.len();
        let target = self
            .tracker
            .file_upload(content_type, file_name, size)
            .await?;

        let mut request = self
            .http
            .put(&target.upload_url)
            .header("Content-Type", content_type)
            .body(bytes);
        for (name, value) in &target.headers {
            request = request.header(name, value);
        }

        let response = request
            .send()
            .await
            .map_err(|e| Error::Asset(format!("asset upload failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Error::Asset(format!(
                "asset upload for {} returned {}",
                file_name, status
            )));
        }

        tracing::debug!(file_name, size, asset_url = %target.asset_url, "uploaded asset");
        Ok(target.asset_url)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{
        FileUploadTarget, IssueCreateInput, IssueFilter, RawComment, RawIssue, RawLabel, RawTeam,
        RawUser, RawWorkflowState,
    };
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct CountingTracker {
        team_calls: AtomicUsize,
    }

    #[async_trait]
    impl IssueTracker for CountingTracker {
        async fn create_issue(&self, _input: IssueCreateInput) -> Result<RawIssue> {
            Err(Error::Tracker("not supported".to_string()))
        }
        async fn create_comment(&self, _issue_id: &str, _body: &str) -> Result<RawComment> {
            Err(Error::Tracker("not supported".to_string()))
        }
        async fn issues(&self, _filter: &IssueFilter) -> Result<Vec<RawIssue>> {
            Ok(Vec::new())
        }
        async fn search_issues(&self, _query: &str) -> Result<Vec<RawIssue>> {
            Ok(Vec::new())
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
            self.team_calls.fetch_add(1, Ordering::SeqCst);
            Ok(RawTeam {
                id: Some(team_id.to_string()),
                key: Some("ENG".to_string()),
                name: Some("Engineering".to_string()),
            })
        }
        async fn viewer(&self) -> Result<RawUser> {
            Ok(RawUser {
                id: Some("user-1".to_string()),
                name: Some("Bridge Bot".to_string()),
                email: None,
            })
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

    fn service(tracker: Arc<CountingTracker>) -> TrackerService {
        let config = TrackerConfig {
            team_id: Some("team-1".to_string()),
            ..Default::default()
        };
        TrackerService::new(tracker, config).unwrap()
    }

    #[tokio::test]
    async fn test_team_is_fetched_once() {
        let tracker = Arc::new(CountingTracker::default());
        let service = service(Arc::clone(&tracker));

        let first = service.team().await.unwrap();
        let second = service.team().await.unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(tracker.team_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_reset_team_cache_forces_refetch() {
        let tracker = Arc::new(CountingTracker::default());
        let service = service(Arc::clone(&tracker));

        service.team().await.unwrap();
        service.reset_team_cache();
        service.team().await.unwrap();
        assert_eq!(tracker.team_calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_missing_team_id_is_config_error() {
        let tracker = Arc::new(CountingTracker::default());
        let service =
            TrackerService::new(tracker, TrackerConfig::default()).unwrap();
        assert!(matches!(service.team().await, Err(Error::Config(_))));
    }

    #[tokio::test]
    async fn test_connectivity_probe() {
        let tracker = Arc::new(CountingTracker::default());
        let service = service(tracker);
        assert!(service.test_connectivity().await);
        assert!(service.test_authentication().await);
    }
}

//! Feedback fetching from the TestFlight beta-feedback endpoints
//!
//! [`FeedbackFetcher`] resolves the target app, pulls crash and screenshot
//! submissions in parallel, filters them client-side against a cutoff
//! timestamp, and enriches each kept record from the per-item detail
//! endpoint. The list endpoints support sort order but no date-range filter,
//! so one run sees at most one page of history (page cap 200); records older
//! than the page window are unreachable.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::appstore::client::AppStoreClient;
use crate::appstore::normalize::{
    self, AppDocument, AppList, CrashLogDocument, ResourceDocument, ResourceList,
};
use crate::config::AppStoreConfig;
use crate::error::{Error, Result};
use crate::types::{FeedbackRecord, FeedbackType};

/// The resolved identity of the app feedback is fetched for.
#[derive(Debug, Clone)]
pub struct AppIdentity {
    pub app_id: String,
    pub bundle_id: Option<String>,
    pub name: Option<String>,
}

/// Fetches and normalizes beta feedback for one app.
pub struct FeedbackFetcher {
    client: Arc<AppStoreClient>,
    config: AppStoreConfig,
}

impl FeedbackFetcher {
    pub fn new(client: Arc<AppStoreClient>, config: AppStoreConfig) -> Self {
        Self { client, config }
    }

    /// Resolve the configured app to a confirmed identity.
    ///
    /// With both `bundle_id` and `app_id` configured, the bundle id is looked
    /// up remotely and the remote-confirmed id wins on mismatch (with a
    /// warning). With only one configured, the other is resolved from it.
    /// With neither, configuration is invalid.
    pub async fn resolve_app(&self) -> Result<AppIdentity> {
        match (&self.config.app_id, &self.config.bundle_id) {
            (None, None) => Err(Error::Config(
                "app_store.bundle_id or app_store.app_id is required".to_string(),
            )),
            (Some(app_id), None) => {
                let doc: AppDocument = self
                    .client
                    .execute(&format!("/apps/{}", app_id), &[])
                    .await?;
                Ok(AppIdentity {
                    app_id: doc.data.id,
                    bundle_id: doc.data.attributes.bundle_id,
                    name: doc.data.attributes.name,
                })
            }
            (None, Some(bundle_id)) => {
                let identity = self.lookup_by_bundle_id(bundle_id).await?;
                identity.ok_or_else(|| {
                    Error::Config(format!("no app found for bundle id {}", bundle_id))
                })
            }
            (Some(app_id), Some(bundle_id)) => {
                match self.lookup_by_bundle_id(bundle_id).await? {
                    Some(remote) => {
                        if remote.app_id != *app_id {
                            tracing::warn!(
                                configured_app_id = %app_id,
                                resolved_app_id = %remote.app_id,
                                bundle_id = %bundle_id,
                                "configured app id disagrees with bundle id lookup, using resolved id"
                            );
                        }
                        Ok(remote)
                    }
                    None => {
                        tracing::warn!(
                            bundle_id = %bundle_id,
                            app_id = %app_id,
                            "bundle id lookup returned no app, falling back to configured app id"
                        );
                        Ok(AppIdentity {
                            app_id: app_id.clone(),
                            bundle_id: Some(bundle_id.clone()),
                            name: None,
                        })
                    }
                }
            }
        }
    }

    async fn lookup_by_bundle_id(&self, bundle_id: &str) -> Result<Option<AppIdentity>> {
        let apps: AppList = self
            .client
            .execute(
                "/apps",
                &[
                    ("filter[bundleId]", bundle_id.to_string()),
                    ("limit", "1".to_string()),
                ],
            )
            .await?;

        Ok(apps.data.into_iter().next().map(|app| AppIdentity {
            app_id: app.id,
            bundle_id: app.attributes.bundle_id,
            name: app.attributes.name,
        }))
    }

    /// Fetch all feedback submitted at or after `cutoff`, newest first.
    ///
    /// Crash and screenshot lists are fetched in parallel, filtered
    /// client-side against the cutoff, then each kept record is enriched
    /// from its detail endpoint. Enrichment failures are non-fatal; the
    /// base record is kept.
    pub async fn fetch_since(
        &self,
        cutoff: DateTime<Utc>,
        identity: &AppIdentity,
    ) -> Result<Vec<FeedbackRecord>> {
        let query = [
            ("filter[app]", identity.app_id.clone()),
            ("limit", self.config.page_limit.to_string()),
            ("sort", "-createdDate".to_string()),
        ];

        let (crashes, screenshots) = tokio::join!(
            self.client
                .execute::<ResourceList>("/betaFeedbackCrashSubmissions", &query),
            self.client
                .execute::<ResourceList>("/betaFeedbackScreenshotSubmissions", &query),
        );
        let crashes = crashes?;
        let screenshots = screenshots?;

        let mut records: Vec<FeedbackRecord> = crashes
            .data
            .iter()
            .map(normalize::normalize_crash)
            .chain(screenshots.data.iter().map(normalize::normalize_screenshot))
            .collect();
        let fetched = records.len();

        retain_and_sort(&mut records, cutoff);
        tracing::info!(
            app_id = %identity.app_id,
            fetched,
            kept = records.len(),
            cutoff = %cutoff,
            "fetched feedback lists"
        );

        for record in &mut records {
            self.enrich(record).await;
        }

        Ok(records)
    }

    /// Pull detail attributes (telemetry, screenshot URLs, crash log text)
    /// into a base-normalized record. Never fails the fetch.
    async fn enrich(&self, record: &mut FeedbackRecord) {
        let endpoint = match record.feedback_type {
            FeedbackType::Crash => {
                format!("/betaFeedbackCrashSubmissions/{}", record.id)
            }
            FeedbackType::Screenshot => {
                format!("/betaFeedbackScreenshotSubmissions/{}", record.id)
            }
        };

        match self
            .client
            .execute::<ResourceDocument>(&endpoint, &[])
            .await
        {
            Ok(doc) => normalize::merge_detail(record, &doc.data),
            Err(e) => {
                tracing::warn!(
                    feedback_id = %record.id,
                    error = %e,
                    "detail enrichment failed, keeping base record"
                );
                return;
            }
        }

        if record.feedback_type == FeedbackType::Crash {
            self.fetch_crash_log(record).await;
        }
    }

    async fn fetch_crash_log(&self, record: &mut FeedbackRecord) {
        let endpoint = format!("/betaFeedbackCrashSubmissions/{}/crashLog", record.id);
        match self.client.execute::<CrashLogDocument>(&endpoint, &[]).await {
            Ok(doc) => {
                if let (Some(text), Some(crash)) =
                    (doc.data.attributes.text(), record.crash_data.as_mut())
                {
                    crash.detailed_logs.push(text.to_string());
                }
            }
            Err(e) => {
                tracing::warn!(
                    feedback_id = %record.id,
                    error = %e,
                    "crash log fetch failed"
                );
            }
        }
    }
}

/// Drop records older than the cutoff and sort newest first.
fn retain_and_sort(records: &mut Vec<FeedbackRecord>, cutoff: DateTime<Utc>) {
    records.retain(|r| r.submitted_at >= cutoff);
    records.sort_by(|a, b| b.submitted_at.cmp(&a.submitted_at));
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ScreenshotData;
    use chrono::TimeZone;

    fn record_at(id: &str, ts: DateTime<Utc>) -> FeedbackRecord {
        FeedbackRecord::screenshot(id.to_string(), ts, ScreenshotData::default())
    }

    #[test]
    fn test_retain_and_sort_filters_and_orders() {
        let cutoff = Utc.with_ymd_and_hms(2026, 8, 10, 0, 0, 0).unwrap();
        let mut records = vec![
            record_at("old", Utc.with_ymd_and_hms(2026, 8, 9, 23, 59, 59).unwrap()),
            record_at("newer", Utc.with_ymd_and_hms(2026, 8, 12, 0, 0, 0).unwrap()),
            record_at("boundary", cutoff),
            record_at("newest", Utc.with_ymd_and_hms(2026, 8, 14, 0, 0, 0).unwrap()),
        ];

        retain_and_sort(&mut records, cutoff);

        let ids: Vec<&str> = records.iter().map(|r| r.id.as_str()).collect();
        assert_eq!(ids, vec!["newest", "newer", "boundary"]);
    }
}

//! Issue filing orchestration
//!
//! [`IssueFiler::file_or_update`] drives one feedback record through the
//! filing pipeline:
//!
//! 1. duplicate check (hit -> comment on the existing issue, done);
//! 2. asset acquisition (upload cached screenshot bytes, fall back to the
//!    source URL per image on failure);
//! 3. composition of title and description;
//! 4. label resolution (failure is non-fatal, the issue files unlabeled);
//! 5. issue creation.
//!
//! A duplicate-check error aborts before creation: the detector is
//! fail-closed and the record can be re-filed on a later run.

use std::sync::Arc;

use crate::compose::{self, AssetLink};
use crate::error::Result;
use crate::tracker::{
    adapters, dedup::DuplicateDetector, labels::LabelResolver, IssueCreateInput, TrackerService,
};
use crate::types::{FeedbackRecord, FiledIssue, FilingState, ImageRef};

/// Per-call filing options.
#[derive(Debug, Clone, Default)]
pub struct FilingOptions {
    /// Labels applied in addition to the configured defaults
    pub extra_labels: Vec<String>,
}

pub struct IssueFiler {
    service: Arc<TrackerService>,
    detector: DuplicateDetector,
    labels: LabelResolver,
}

impl IssueFiler {
    pub fn new(service: Arc<TrackerService>) -> Self {
        Self {
            detector: DuplicateDetector::new(Arc::clone(&service)),
            labels: LabelResolver::new(Arc::clone(&service)),
            service,
        }
    }

    /// Swap the duplicate detector. Tests use one with millisecond backoff.
    pub fn with_detector(mut self, detector: DuplicateDetector) -> Self {
        self.detector = detector;
        self
    }

    /// File `record` as a new issue, or comment on the existing one.
    pub async fn file_or_update(
        &self,
        record: &FeedbackRecord,
        options: &FilingOptions,
    ) -> Result<FiledIssue> {
        // An error here is fail-closed: no creation without a clean check
        if let Some(existing) = self.detector.find_existing(record).await? {
            let body = compose::duplicate_comment(record);
            self.service
                .tracker()
                .create_comment(&existing.id, &body)
                .await?;
            tracing::info!(
                feedback_id = %record.id,
                issue = %existing.identifier,
                "commented on existing issue"
            );
            // Comment responses routinely omit issue context; the
            // detector's view of the issue stands in for it.
            return Ok(FiledIssue {
                issue: existing,
                state: FilingState::Commented,
            });
        }

        let assets = match &record.screenshot_data {
            Some(shot) => self.upload_assets(&record.id, &shot.images).await,
            None => Vec::new(),
        };

        let title = compose::issue_title(record);
        let description = compose::issue_description(record, &assets);

        let mut requested = self.service.config().default_labels.clone();
        requested.extend(options.extra_labels.iter().cloned());
        let label_ids = match self.labels.resolve(&requested).await {
            Ok(ids) => ids,
            Err(e) => {
                tracing::error!(
                    feedback_id = %record.id,
                    error = %e,
                    "label resolution failed, filing unlabeled"
                );
                Vec::new()
            }
        };

        let team = self.service.team().await?;
        let raw = self
            .service
            .tracker()
            .create_issue(IssueCreateInput {
                team_id: team.id,
                title,
                description,
                label_ids,
            })
            .await?;
        let issue = adapters::issue_from_raw(raw)?;

        tracing::info!(
            feedback_id = %record.id,
            issue = %issue.identifier,
            "created issue"
        );
        Ok(FiledIssue {
            issue,
            state: FilingState::Created,
        })
    }

    /// Upload cached screenshot bytes, falling back to the source URL per
    /// image. Cached bytes are used as-is; URL expiry is irrelevant once
    /// bytes are in hand.
    async fn upload_assets(&self, feedback_id: &str, images: &[ImageRef]) -> Vec<AssetLink> {
        let mut links = Vec::with_capacity(images.len());

        for image in images {
            match &image.cached_data {
                Some(bytes) => {
                    let upload = self
                        .service
                        .upload_asset(
                            bytes.clone(),
                            &image.file_name,
                            content_type_for(&image.file_name),
                        )
                        .await;
                    match upload {
                        Ok(asset_url) => links.push(AssetLink {
                            file_name: image.file_name.clone(),
                            url: asset_url,
                        }),
                        Err(e) => {
                            tracing::warn!(
                                feedback_id = %feedback_id,
                                file_name = %image.file_name,
                                error = %e,
                                "asset upload failed, linking source URL"
                            );
                            links.push(AssetLink {
                                file_name: image.file_name.clone(),
                                url: image.url.clone(),
                            });
                        }
                    }
                }
                None => links.push(AssetLink {
                    file_name: image.file_name.clone(),
                    url: image.url.clone(),
                }),
            }
        }

        links
    }
}

/// MIME type from the file extension.
fn content_type_for(file_name: &str) -> &'static str {
    let lower = file_name.to_lowercase();
    if lower.ends_with(".jpg") || lower.ends_with(".jpeg") {
        "image/jpeg"
    } else if lower.ends_with(".gif") {
        "image/gif"
    } else if lower.ends_with(".heic") {
        "image/heic"
    } else {
        "image/png"
    }
}

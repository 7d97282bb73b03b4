//! Screenshot acquisition
//!
//! Signed screenshot URLs from the source API expire quickly, so the bytes
//! are captured opportunistically right after fetch and carried on the
//! record as `ImageRef::cached_data`. Downstream code (the filer's asset
//! upload) uses the cached bytes unconditionally once present and never
//! goes back to the URL.

use chrono::Utc;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};
use std::time::Duration;

use crate::backoff::BackoffPolicy;
use crate::error::{Error, Result};
use crate::types::ImageRef;

const DOWNLOAD_TIMEOUT_SECS: u64 = 30;

/// Downloads signed-URL screenshots into `ImageRef::cached_data`.
pub struct ScreenshotFetcher {
    http: reqwest::Client,
    retry: BackoffPolicy,
}

impl ScreenshotFetcher {
    pub fn new() -> Result<Self> {
        // The CDN rejects default library user agents
        let mut headers = HeaderMap::new();
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(
                "Mozilla/5.0 (Macintosh; Intel Mac OS X 10_15_7) AppleWebKit/605.1.15 \
                 (KHTML, like Gecko) Version/17.4 Safari/605.1.15",
            ),
        );
        headers.insert(ACCEPT, HeaderValue::from_static("image/*,*/*;q=0.8"));

        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(DOWNLOAD_TIMEOUT_SECS))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to create HTTP client: {}", e)))?;

        Ok(Self {
            http,
            retry: BackoffPolicy::downloads(),
        })
    }

    /// Download every image that still can be downloaded, caching the bytes
    /// in place. Returns how many images were newly acquired.
    ///
    /// Already-cached images are left alone; expired URLs are skipped;
    /// download failure leaves `cached_data` unset and keeps the image so
    /// the filer can still link the source URL.
    pub async fn acquire(&self, images: &mut [ImageRef]) -> usize {
        let mut acquired = 0;

        for image in images.iter_mut() {
            if image.cached_data.is_some() {
                continue;
            }
            if image.is_expired(Utc::now()) {
                tracing::warn!(
                    file_name = %image.file_name,
                    expires_at = ?image.expires_at,
                    "screenshot URL already expired, skipping download"
                );
                continue;
            }

            match self.download(&image.url).await {
                Ok(bytes) => {
                    if image.file_size > 0 && bytes.len() as u64 != image.file_size {
                        tracing::warn!(
                            file_name = %image.file_name,
                            expected = image.file_size,
                            actual = bytes.len(),
                            "downloaded screenshot size differs from declared size"
                        );
                    }
                    tracing::debug!(
                        file_name = %image.file_name,
                        bytes = bytes.len(),
                        "cached screenshot"
                    );
                    image.cached_data = Some(bytes);
                    acquired += 1;
                }
                Err(e) => {
                    tracing::warn!(
                        file_name = %image.file_name,
                        error = %e,
                        "screenshot download failed, keeping URL reference"
                    );
                }
            }
        }

        acquired
    }

    /// One download with retries. Server errors are retried; client errors
    /// (a signed URL gone bad returns 403) abort immediately.
    async fn download(&self, url: &str) -> Result<Vec<u8>> {
        self.retry
            .retry("screenshot_download", |_| async move {
                let response = self.http.get(url).send().await.map_err(|e| {
                    Error::Transport {
                        status: e.status().map(|s| s.as_u16()),
                        message: format!("screenshot request failed: {}", e),
                        attempts: 1,
                    }
                })?;

                let status = response.status();
                if status.is_server_error() {
                    return Err(Error::Transport {
                        status: Some(status.as_u16()),
                        message: format!("screenshot download returned {}", status),
                        attempts: 1,
                    });
                }
                if !status.is_success() {
                    return Err(Error::Asset(format!(
                        "screenshot download returned {}",
                        status
                    )));
                }

                let bytes = response.bytes().await.map_err(|e| Error::Transport {
                    status: None,
                    message: format!("screenshot body read failed: {}", e),
                    attempts: 1,
                })?;
                Ok(bytes.to_vec())
            })
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration as ChronoDuration;

    fn image(expires_in_secs: i64, cached: Option<Vec<u8>>) -> ImageRef {
        ImageRef {
            url: "https://cdn.example.com/shot.png".to_string(),
            file_name: "shot.png".to_string(),
            file_size: 0,
            expires_at: Some(Utc::now() + ChronoDuration::seconds(expires_in_secs)),
            cached_data: cached,
        }
    }

    #[tokio::test]
    async fn test_cached_images_are_never_redownloaded() {
        let fetcher = ScreenshotFetcher::new().unwrap();
        let mut images = vec![image(-60, Some(vec![1, 2, 3]))];

        // Cached bytes win even though the URL is long expired
        let acquired = fetcher.acquire(&mut images).await;
        assert_eq!(acquired, 0);
        assert_eq!(images[0].cached_data.as_deref(), Some(&[1u8, 2, 3][..]));
    }

    #[tokio::test]
    async fn test_expired_images_are_skipped() {
        let fetcher = ScreenshotFetcher::new().unwrap();
        let mut images = vec![image(-1, None)];

        let acquired = fetcher.acquire(&mut images).await;
        assert_eq!(acquired, 0);
        assert!(images[0].cached_data.is_none());
    }
}

//! Retrying HTTP client for the batch face-recognition service
//!
//! Batch recognition is slow, so the request timeout is measured in
//! minutes. Transient failures (timeout, connection error, 5xx) are
//! retried with exponential backoff up to a fixed cap; 4xx rejections are
//! fatal and never retried. The client mutates no session state, so the
//! caller can cancel it freely.

use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use rollcall_common::config::RecognitionConfig;
use rollcall_common::models::RecognizedFace;
use rollcall_common::{Error, Result};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, warn};
use uuid::Uuid;

use super::response::parse_response;

/// Metadata accompanying a batch submission
#[derive(Debug, Clone)]
pub struct BatchContext {
    pub session_id: Uuid,
    pub section_id: Uuid,
}

/// Recognition service client
pub struct RecognitionClient {
    http_client: Client,
    config: RecognitionConfig,
}

impl RecognitionClient {
    pub fn new(config: RecognitionConfig) -> Self {
        Self {
            http_client: Client::builder()
                .timeout(Duration::from_secs(config.timeout_secs))
                .build()
                .expect("Failed to create HTTP client"),
            config,
        }
    }

    /// Submit an image batch and return the normalized identities.
    ///
    /// Image count is bounded by `max_images`; files are read once up
    /// front and the multipart form rebuilt per attempt.
    pub async fn submit_batch(
        &self,
        image_paths: &[PathBuf],
        ctx: &BatchContext,
    ) -> Result<Vec<RecognizedFace>> {
        if image_paths.is_empty() {
            return Err(Error::InvalidInput("no images in batch".to_string()));
        }
        if image_paths.len() > self.config.max_images {
            return Err(Error::InvalidInput(format!(
                "batch of {} images exceeds limit of {}",
                image_paths.len(),
                self.config.max_images
            )));
        }

        let mut images = Vec::with_capacity(image_paths.len());
        for path in image_paths {
            let bytes = tokio::fs::read(path).await?;
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().to_string())
                .unwrap_or_else(|| "image.jpg".to_string());
            images.push((file_name, bytes));
        }

        let url = format!("{}/recognize", self.config.base_url.trim_end_matches('/'));
        let mut last_error = String::new();

        for attempt in 0..self.config.max_retries {
            if attempt > 0 {
                let delay = self.config.retry_base_ms * 2u64.pow(attempt - 1);
                warn!(
                    session_id = %ctx.session_id,
                    attempt,
                    delay_ms = delay,
                    "Retrying recognition batch after backoff"
                );
                tokio::time::sleep(Duration::from_millis(delay)).await;
            }

            let mut form = Form::new()
                .text("session_id", ctx.session_id.to_string())
                .text("section_id", ctx.section_id.to_string());
            for (file_name, bytes) in &images {
                let part = Part::bytes(bytes.clone()).file_name(file_name.clone());
                form = form.part("files", part);
            }

            let mut request = self.http_client.post(&url).multipart(form);
            if let Some(token) = &self.config.api_token {
                request = request.bearer_auth(token);
            }

            let response = match request.send().await {
                Ok(response) => response,
                Err(err) => {
                    // timeouts and connection resets are transient
                    last_error = err.to_string();
                    debug!(
                        session_id = %ctx.session_id,
                        attempt,
                        error = %last_error,
                        "Recognition request failed"
                    );
                    continue;
                }
            };

            let status = response.status();
            if status.is_success() {
                let body = response.bytes().await.map_err(|e| Error::Internal(
                    format!("failed to read recognition response body: {}", e),
                ))?;
                debug!(
                    session_id = %ctx.session_id,
                    bytes = body.len(),
                    "Recognition batch response received"
                );
                return parse_response(&body);
            }

            if status_is_transient(status) {
                last_error = format!("service returned {}", status);
                continue;
            }

            // 4xx: the request itself is wrong; retrying will not help
            let message = response.text().await.unwrap_or_default();
            return Err(Error::UpstreamFatal {
                status: status.as_u16(),
                message: if message.is_empty() {
                    status
                        .canonical_reason()
                        .unwrap_or("request rejected")
                        .to_string()
                } else {
                    message
                },
            });
        }

        Err(Error::UpstreamTransient {
            attempts: self.config.max_retries,
            message: last_error,
        })
    }

    /// Whether a match at this confidence counts as verified
    pub fn is_verified(&self, confidence: f64) -> bool {
        confidence >= self.config.verify_threshold
    }
}

/// Classify an HTTP status the way the retry loop does. Split out for
/// testability; network-level errors are always transient.
pub fn status_is_transient(status: StatusCode) -> bool {
    status.is_server_error()
}

//! Image asset storage for travel stories
//!
//! Provides an `ImageStore` trait and the ImageKit implementation used in
//! production. Uploads return the public URL together with the ImageKit
//! `fileId`, which is the only handle that can delete the asset later.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use reqwest::{Client, StatusCode};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::RetryIf;

use crate::config::ImagesConfig;

// ============================================================================
// ImageStore trait
// ============================================================================

/// Abstraction over the external image host.
#[async_trait]
pub trait ImageStore: Send + Sync {
    /// Store the image and return where it lives.
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, ImageError>;

    /// Release a stored asset. Returns `false` if the host no longer knows it.
    async fn delete(&self, asset_id: &str) -> Result<bool, ImageError>;

    /// Backend name for logging.
    fn name(&self) -> &str;
}

/// Raw image bytes as received from the client.
#[derive(Debug, Clone)]
pub struct ImageUpload {
    pub bytes: Bytes,
    pub file_name: String,
    pub content_type: String,
}

impl ImageUpload {
    pub fn is_image(&self) -> bool {
        self.content_type.starts_with("image/")
    }
}

/// A stored asset: the URL to render and the identifier needed to delete it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoredImage {
    pub url: String,
    pub asset_id: String,
}

// ============================================================================
// Error types
// ============================================================================

#[derive(Error, Debug)]
pub enum ImageError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("API error ({code}): {message}")]
    Api { code: u16, message: String },

    #[error("Missing ImageKit private key")]
    MissingPrivateKey,

    #[error("Giving up after {retries} retries: {last}")]
    RetryExhausted { retries: usize, last: String },
}

impl ImageError {
    /// Whether another attempt is worthwhile.
    ///
    /// A non-idempotent call (upload) is retried only when the previous
    /// attempt cannot have stored anything: a refused connection, rate
    /// limiting, or a server error other than a gateway timeout. A timed-out
    /// upload may have succeeded remotely, and retrying it would leave an
    /// untracked duplicate.
    fn is_retryable(&self, idempotent: bool) -> bool {
        match self {
            Self::Http(e) if idempotent => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Http(e) => e.is_connect() && !e.is_timeout(),
            Self::Api { code: 429, .. } => true,
            Self::Api { code: 504, .. } => idempotent,
            Self::Api { code, .. } => *code >= 500,
            _ => false,
        }
    }
}

// ============================================================================
// ImageKit API structs (private)
// ============================================================================

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UploadResponse {
    file_id: String,
    url: String,
}

#[derive(Debug, Deserialize)]
struct ImageKitErrorResponse {
    message: Option<String>,
}

// ============================================================================
// ImageKitClient
// ============================================================================

/// ImageKit client. Uploads to the upload API, deletes through the management API.
#[derive(Clone)]
pub struct ImageKitClient {
    client: Client,
    private_key: String,
    upload_url: String,
    api_url: String,
    folder: Option<String>,
    max_retries: usize,
    retry_delay_ms: u64,
}

impl ImageKitClient {
    pub fn new(config: &ImagesConfig, private_key: String) -> Result<Self, ImageError> {
        Self::with_base_urls(
            config,
            private_key,
            config.upload_url.clone(),
            config.api_url.clone(),
        )
    }

    /// Create a client against custom endpoints (for testing / self-hosted proxies)
    pub fn with_base_urls(
        config: &ImagesConfig,
        private_key: String,
        upload_url: String,
        api_url: String,
    ) -> Result<Self, ImageError> {
        if private_key.is_empty() {
            return Err(ImageError::MissingPrivateKey);
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(config.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            private_key,
            upload_url: upload_url.trim_end_matches('/').to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            folder: config.folder.clone(),
            max_retries: config.max_retries,
            retry_delay_ms: config.retry_delay_ms,
        })
    }

    async fn with_retry<T, F, Fut>(
        &self,
        operation: &str,
        idempotent: bool,
        action: F,
    ) -> Result<T, ImageError>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, ImageError>>,
    {
        let retry_strategy = ExponentialBackoff::from_millis(self.retry_delay_ms)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(self.max_retries);

        let retryable = |e: &ImageError| e.is_retryable(idempotent);
        match RetryIf::spawn(retry_strategy, action, retryable).await {
            Ok(value) => Ok(value),
            Err(e) if retryable(&e) && self.max_retries > 0 => {
                tracing::error!(
                    operation,
                    retries = self.max_retries,
                    error = %e,
                    "All ImageKit retry attempts failed"
                );
                Err(ImageError::RetryExhausted {
                    retries: self.max_retries,
                    last: e.to_string(),
                })
            }
            Err(e) => Err(e),
        }
    }

    async fn upload_once(&self, image: &ImageUpload) -> Result<StoredImage, ImageError> {
        let url = format!("{}/api/v1/files/upload", self.upload_url);

        let file = Part::bytes(image.bytes.to_vec())
            .file_name(image.file_name.clone())
            .mime_str(&image.content_type)?;

        let mut form = Form::new()
            .part("file", file)
            .text("fileName", image.file_name.clone())
            .text("useUniqueFileName", "true");
        if let Some(folder) = &self.folder {
            form = form.text("folder", folder.clone());
        }

        let response = self
            .client
            .post(&url)
            .basic_auth(&self.private_key, Some(""))
            .multipart(form)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }

        let body: UploadResponse = response.json().await?;
        Ok(StoredImage {
            url: body.url,
            asset_id: body.file_id,
        })
    }

    async fn delete_once(&self, asset_id: &str) -> Result<bool, ImageError> {
        let url = format!("{}/v1/files/{}", self.api_url, asset_id);

        let response = self
            .client
            .delete(&url)
            .basic_auth(&self.private_key, Some(""))
            .send()
            .await?;

        let status = response.status();
        if status == StatusCode::NOT_FOUND {
            return Ok(false);
        }
        if !status.is_success() {
            return Err(api_error(status, response).await);
        }
        Ok(true)
    }
}

async fn api_error(status: StatusCode, response: reqwest::Response) -> ImageError {
    let error_body = response.text().await.unwrap_or_default();
    let message = serde_json::from_str::<ImageKitErrorResponse>(&error_body)
        .ok()
        .and_then(|e| e.message)
        .unwrap_or(error_body);

    tracing::error!(code = status.as_u16(), message = %message, "ImageKit API error");

    ImageError::Api {
        code: status.as_u16(),
        message,
    }
}

#[async_trait]
impl ImageStore for ImageKitClient {
    async fn upload(&self, image: ImageUpload) -> Result<StoredImage, ImageError> {
        let stored = self
            .with_retry("upload", false, || self.upload_once(&image))
            .await?;
        tracing::info!(asset_id = %stored.asset_id, file_name = %image.file_name, "Uploaded image");
        Ok(stored)
    }

    async fn delete(&self, asset_id: &str) -> Result<bool, ImageError> {
        let deleted = self
            .with_retry("delete", true, || self.delete_once(asset_id))
            .await?;
        if deleted {
            tracing::info!(asset_id, "Deleted image");
        } else {
            tracing::warn!(asset_id, "Image was already gone");
        }
        Ok(deleted)
    }

    fn name(&self) -> &str {
        "imagekit"
    }
}

// ============================================================================
// TESTS
// ============================================================================

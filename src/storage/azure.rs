use std::time::Duration;

use chrono::{DateTime, Utc};
use futures::StreamExt;
use reqwest::header::{HeaderMap, ACCEPT_RANGES, CONTENT_LENGTH, CONTENT_RANGE, CONTENT_TYPE, ETAG, LAST_MODIFIED, RANGE};
use reqwest::{Client, StatusCode};
use tracing::debug;

use crate::core::config::StorageConfig;
use crate::core::error::StorageError;
use crate::core::redact::redact_sas_url;
use crate::core::types::BlobLocation;

use super::{encode_blob_path, encode_segment, BlobMeta, BlobResponse, BlobStore, ByteRange};

// ---------------------------------------------------------------------------
// AzureBlobStore
// ---------------------------------------------------------------------------

/// Production blob backend speaking the Azure Blob REST API.
///
/// Authorisation is a SAS token appended as the query string. No SDK is
/// involved: a HEAD or GET on `{base}/{container}/{encoded path}?{sas}` is all
/// the prober needs.
pub struct AzureBlobStore {
    client: Client,
    base_url: String,
    sas_token: String,
    /// Bounds a whole HEAD, and a GET up to its response headers.
    request_timeout: Duration,
}

impl AzureBlobStore {
    /// Create a new AzureBlobStore from configuration.
    ///
    /// The client has no total timeout, so a body may stream for as long as
    /// the player keeps reading. Stalls hit the per-read timeout.
    pub fn new(config: &StorageConfig) -> Result<Self, StorageError> {
        let request_timeout = Duration::from_secs(config.request_timeout_secs);
        let client = Client::builder()
            .connect_timeout(request_timeout)
            .read_timeout(request_timeout)
            .build()
            .map_err(|e| StorageError::NotConfigured {
                reason: format!("failed to build HTTP client: {}", e),
            })?;

        Ok(Self {
            client,
            base_url: config.base_url(),
            sas_token: config.sas_token.trim().trim_start_matches('?').to_string(),
            request_timeout,
        })
    }

    /// Signed URL for a location. Each path segment is encoded on its own.
    pub fn blob_url(&self, location: &BlobLocation) -> String {
        let mut url = format!(
            "{}/{}/{}",
            self.base_url,
            encode_segment(&location.container),
            encode_blob_path(&location.path)
        );
        if !self.sas_token.is_empty() {
            url.push('?');
            url.push_str(&self.sas_token);
        }
        url
    }

    fn transport_error(location: &BlobLocation, e: reqwest::Error) -> StorageError {
        let reason = if e.is_timeout() {
            "request timed out".to_string()
        } else {
            e.without_url().to_string()
        };
        StorageError::Transport {
            path: location.to_string(),
            reason,
        }
    }

    fn timeout_error(location: &BlobLocation) -> StorageError {
        StorageError::Transport {
            path: location.to_string(),
            reason: "request timed out".to_string(),
        }
    }

    fn status_error(location: &BlobLocation, status: StatusCode) -> StorageError {
        if status == StatusCode::NOT_FOUND {
            StorageError::NotFound {
                path: location.to_string(),
            }
        } else {
            StorageError::UnexpectedStatus {
                path: location.to_string(),
                status: status.as_u16(),
            }
        }
    }
}

impl BlobStore for AzureBlobStore {
    async fn head_blob(&self, location: &BlobLocation) -> Result<BlobMeta, StorageError> {
        let url = self.blob_url(location);
        debug!(url = %redact_sas_url(&url), "HEAD blob");

        let response = self
            .client
            .head(&url)
            .timeout(self.request_timeout)
            .send()
            .await
            .map_err(|e| Self::transport_error(location, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(location, status));
        }
        Ok(meta_from_headers(response.headers()))
    }

    async fn get_blob(
        &self,
        location: &BlobLocation,
        range: Option<ByteRange>,
    ) -> Result<BlobResponse, StorageError> {
        let url = self.blob_url(location);
        debug!(url = %redact_sas_url(&url), range = ?range, "GET blob");

        let mut request = self.client.get(&url);
        if let Some(range) = range {
            request = request.header(RANGE, range.header_value());
        }

        let response = tokio::time::timeout(self.request_timeout, request.send())
            .await
            .map_err(|_| Self::timeout_error(location))?
            .map_err(|e| Self::transport_error(location, e))?;

        let status = response.status();
        if !status.is_success() {
            return Err(Self::status_error(location, status));
        }

        let meta = meta_from_headers(response.headers());
        let content_range = if status == StatusCode::PARTIAL_CONTENT {
            header_str(response.headers(), CONTENT_RANGE)
        } else {
            None
        };

        let path = location.to_string();
        let body = response.bytes_stream().map(move |chunk| {
            chunk.map_err(|e| StorageError::Transport {
                path: path.clone(),
                reason: e.without_url().to_string(),
            })
        });

        Ok(BlobResponse {
            meta,
            content_range,
            body: Box::pin(body),
        })
    }
}

fn header_str(headers: &HeaderMap, name: reqwest::header::HeaderName) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(|s| s.to_string())
}

fn meta_from_headers(headers: &HeaderMap) -> BlobMeta {
    BlobMeta {
        content_type: header_str(headers, CONTENT_TYPE),
        content_length: header_str(headers, CONTENT_LENGTH).and_then(|v| v.parse().ok()),
        accept_ranges: header_str(headers, ACCEPT_RANGES),
        etag: header_str(headers, ETAG),
        last_modified: header_str(headers, LAST_MODIFIED)
            .and_then(|v| DateTime::parse_from_rfc2822(&v).ok())
            .map(|t| t.with_timezone(&Utc)),
    }
}

use std::collections::HashMap;
use std::sync::Arc;

use bytes::Bytes;
use chrono::Utc;
use tokio::sync::RwLock;

use crate::core::error::StorageError;
use crate::core::types::BlobLocation;

use super::{content_type_for_path, BlobMeta, BlobResponse, BlobStore, ByteRange};

// ---------------------------------------------------------------------------
// InMemoryBlobStore (for testing)
// ---------------------------------------------------------------------------

/// In-memory blob backend for unit and integration tests.
///
/// Blobs live in a `HashMap<BlobLocation, StoredBlob>` behind a `RwLock`.
/// Every HEAD and GET is appended to a call log, and individual locations
/// can be made to fail with a transport error.
pub struct InMemoryBlobStore {
    blobs: Arc<RwLock<HashMap<BlobLocation, StoredBlob>>>,
    failures: Arc<RwLock<HashMap<BlobLocation, FailureMode>>>,
    calls: Arc<RwLock<Vec<StoreCall>>>,
}

#[derive(Debug, Clone)]
struct StoredBlob {
    data: Bytes,
    content_type: String,
    created_at: chrono::DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailureMode {
    /// Both HEAD and GET fail.
    Always,
    /// HEAD succeeds, GET fails.
    GetOnly,
}

/// One recorded call against the store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreCall {
    Head(BlobLocation),
    Get(BlobLocation),
}

impl InMemoryBlobStore {
    pub fn new() -> Self {
        Self {
            blobs: Arc::new(RwLock::new(HashMap::new())),
            failures: Arc::new(RwLock::new(HashMap::new())),
            calls: Arc::new(RwLock::new(Vec::new())),
        }
    }

    /// Store a blob; the content type is derived from the path extension.
    pub async fn put_blob(&self, location: BlobLocation, data: impl Into<Bytes>) {
        let content_type = content_type_for_path(&location.path).to_string();
        self.blobs.write().await.insert(
            location,
            StoredBlob {
                data: data.into(),
                content_type,
                created_at: Utc::now(),
            },
        );
    }

    /// Make HEAD and GET against `location` fail with a transport error.
    pub async fn fail_location(&self, location: BlobLocation) {
        self.failures
            .write()
            .await
            .insert(location, FailureMode::Always);
    }

    /// Make GET against `location` fail while HEAD still succeeds.
    pub async fn fail_get(&self, location: BlobLocation) {
        self.failures
            .write()
            .await
            .insert(location, FailureMode::GetOnly);
    }

    /// All calls made so far, in order.
    pub async fn calls(&self) -> Vec<StoreCall> {
        self.calls.read().await.clone()
    }

    pub async fn head_count(&self) -> usize {
        self.calls
            .read()
            .await
            .iter()
            .filter(|c| matches!(c, StoreCall::Head(_)))
            .count()
    }

    async fn check_failure(
        &self,
        location: &BlobLocation,
        is_get: bool,
    ) -> Result<(), StorageError> {
        match self.failures.read().await.get(location) {
            Some(FailureMode::Always) => Err(StorageError::Transport {
                path: location.to_string(),
                reason: "connection reset".to_string(),
            }),
            Some(FailureMode::GetOnly) if is_get => Err(StorageError::Transport {
                path: location.to_string(),
                reason: "connection reset during GET".to_string(),
            }),
            _ => Ok(()),
        }
    }
}

impl Default for InMemoryBlobStore {
    fn default() -> Self {
        Self::new()
    }
}

impl BlobStore for InMemoryBlobStore {
    async fn head_blob(&self, location: &BlobLocation) -> Result<BlobMeta, StorageError> {
        self.calls
            .write()
            .await
            .push(StoreCall::Head(location.clone()));
        self.check_failure(location, false).await?;

        let blobs = self.blobs.read().await;
        let blob = blobs.get(location).ok_or_else(|| StorageError::NotFound {
            path: location.to_string(),
        })?;

        Ok(BlobMeta {
            content_type: Some(blob.content_type.clone()),
            content_length: Some(blob.data.len() as u64),
            accept_ranges: Some("bytes".to_string()),
            etag: Some(format!("\"{}\"", blob.data.len())),
            last_modified: Some(blob.created_at),
        })
    }

    async fn get_blob(
        &self,
        location: &BlobLocation,
        range: Option<ByteRange>,
    ) -> Result<BlobResponse, StorageError> {
        self.calls
            .write()
            .await
            .push(StoreCall::Get(location.clone()));
        self.check_failure(location, true).await?;

        let blobs = self.blobs.read().await;
        let blob = blobs.get(location).ok_or_else(|| StorageError::NotFound {
            path: location.to_string(),
        })?;

        let total = blob.data.len() as u64;
        let (data, content_range) = match range {
            Some(range) => {
                if range.start >= total {
                    return Err(StorageError::UnexpectedStatus {
                        path: location.to_string(),
                        status: 416,
                    });
                }
                let end = range
                    .end
                    .unwrap_or(u64::MAX)
                    .min(total.saturating_sub(1));
                let slice = blob.data.slice(range.start as usize..=end as usize);
                (slice, Some(format!("bytes {}-{}/{}", range.start, end, total)))
            }
            None => (blob.data.clone(), None),
        };

        let meta = BlobMeta {
            content_type: Some(blob.content_type.clone()),
            content_length: Some(data.len() as u64),
            accept_ranges: Some("bytes".to_string()),
            etag: Some(format!("\"{}\"", total)),
            last_modified: Some(blob.created_at),
        };

        let chunk: Result<Bytes, StorageError> = Ok(data);
        Ok(BlobResponse {
            meta,
            content_range,
            body: Box::pin(futures::stream::iter(vec![chunk])),
        })
    }
}

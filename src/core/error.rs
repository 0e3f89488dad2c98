use thiserror::Error;

// ---------------------------------------------------------------------------
// Storage errors
// ---------------------------------------------------------------------------

/// Errors from a single call against the blob backend.
///
/// These are per-attempt: the prober records them and moves on to the next
/// candidate instead of propagating.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("blob not found: {path}")]
    NotFound { path: String },

    #[error("upstream returned {status} for {path}")]
    UnexpectedStatus { path: String, status: u16 },

    #[error("request to {path} failed: {reason}")]
    Transport { path: String, reason: String },

    #[error("storage is not configured: {reason}")]
    NotConfigured { reason: String },
}

impl StorageError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, StorageError::NotFound { .. })
    }

    /// Upstream rejected the requested byte range (416).
    pub fn is_range_not_satisfiable(&self) -> bool {
        matches!(self, StorageError::UnexpectedStatus { status: 416, .. })
    }

    /// Label used for metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            StorageError::NotFound { .. } => "not_found",
            StorageError::UnexpectedStatus { .. } => "unexpected_status",
            StorageError::Transport { .. } => "transport",
            StorageError::NotConfigured { .. } => "not_configured",
        }
    }
}

// ---------------------------------------------------------------------------
// Proxy errors
// ---------------------------------------------------------------------------

/// Request-level errors surfaced by the proxy endpoints.
///
/// The exhaustive-probe 404 is not represented here: it carries a full
/// diagnostic report and is rendered by the handler directly.
#[derive(Debug, Error)]
pub enum ProxyError {
    #[error("{param} parameter is required")]
    MissingParameter { param: &'static str },

    #[error("Azure storage configuration is incomplete: {reason}")]
    Misconfigured { reason: String },

    #[error("blob not found: {path}")]
    BlobNotFound { path: String },

    #[error("upstream storage error: {reason}")]
    Upstream { reason: String },
}

impl ProxyError {
    /// Map a ProxyError to its HTTP status code.
    pub fn status_code(&self) -> u16 {
        match self {
            ProxyError::MissingParameter { .. } => 400,
            ProxyError::Misconfigured { .. } => 500,
            ProxyError::BlobNotFound { .. } => 404,
            ProxyError::Upstream { .. } => 502,
        }
    }

    /// Return the error code string for JSON responses.
    pub fn error_code(&self) -> &'static str {
        match self {
            ProxyError::MissingParameter { .. } => "missing_parameter",
            ProxyError::Misconfigured { .. } => "configuration_error",
            ProxyError::BlobNotFound { .. } => "not_found",
            ProxyError::Upstream { .. } => "storage_error",
        }
    }
}

impl From<StorageError> for ProxyError {
    fn from(e: StorageError) -> Self {
        match e {
            StorageError::NotFound { path } => ProxyError::BlobNotFound { path },
            StorageError::NotConfigured { reason } => ProxyError::Misconfigured { reason },
            other => ProxyError::Upstream {
                reason: other.to_string(),
            },
        }
    }
}

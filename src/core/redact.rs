use std::fmt;

// ---------------------------------------------------------------------------
// Sensitive value redaction
// ---------------------------------------------------------------------------

/// A wrapper that redacts its contents when displayed or debug-printed.
///
/// Usage:
/// ```ignore
/// let token = Redacted::new(&config.storage.sas_token);
/// tracing::info!(sas_token = %token, "storage configured"); // logs: sas_token=[REDACTED]
/// ```
#[derive(Clone)]
pub struct Redacted<T>(T);

impl<T> Redacted<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }
}

impl<T> fmt::Display for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

impl<T> fmt::Debug for Redacted<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[REDACTED]")
    }
}

/// Strip the SAS signature from a blob URL for logging.
///
/// The query string is dropped entirely and replaced with a marker, so
/// `https://acct.blob.core.windows.net/c/p?sv=...&sig=...` logs as
/// `https://acct.blob.core.windows.net/c/p?[SAS REDACTED]`.
pub fn redact_sas_url(url: &str) -> String {
    match url.split_once('?') {
        Some((base, query)) if !query.is_empty() => format!("{}?[SAS REDACTED]", base),
        Some((base, _)) => base.to_string(),
        None => url.to_string(),
    }
}

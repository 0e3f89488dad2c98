use serde::Serialize;
use std::fmt;

// ---------------------------------------------------------------------------
// Identifiers
// ---------------------------------------------------------------------------

/// A loosely-formatted video identifier as entered in the admin portal.
///
/// Typical shape: `10011090_18687781_2023_cm005.mp4` (user id, session
/// marker, year, category code). Nothing about the shape is guaranteed; the
/// only invariant enforced here is that the value is non-blank.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(transparent)]
pub struct VideoId(String);

impl VideoId {
    /// Build from a raw query value. Returns `None` for a missing or blank value.
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(Self(trimmed.to_string()))
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for VideoId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ---------------------------------------------------------------------------
// Blob locations
// ---------------------------------------------------------------------------

/// A single (container, path) pair in blob storage. `path` is unencoded.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
pub struct BlobLocation {
    pub container: String,
    pub path: String,
}

impl BlobLocation {
    pub fn new(container: impl Into<String>, path: impl Into<String>) -> Self {
        Self {
            container: container.into(),
            path: path.into(),
        }
    }
}

impl fmt::Display for BlobLocation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.container, self.path)
    }
}

// ---------------------------------------------------------------------------
// Probe bookkeeping
// ---------------------------------------------------------------------------

/// Result of probing one location.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProbeOutcome {
    Found,
    NotFound,
    /// Transport failure or unexpected upstream status.
    Error(String),
}

impl ProbeOutcome {
    /// Label used for metrics and logs.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProbeOutcome::Found => "found",
            ProbeOutcome::NotFound => "not_found",
            ProbeOutcome::Error(_) => "error",
        }
    }
}

/// One entry of the probe trace.
#[derive(Debug, Clone)]
pub struct ProbeAttempt {
    pub location: BlobLocation,
    pub outcome: ProbeOutcome,
}

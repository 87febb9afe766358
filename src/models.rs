// Core data structures for the tracker status relay

use serde::{Deserialize, Serialize};
use std::fmt;

/// Position of a status value in a site's history
///
/// Remote sites report this as a floating point timestamp, so it is kept
/// as `f64`. Larger values are newer.
#[derive(Debug, Clone, Copy, Default, PartialEq, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Sequencer(pub f64);

impl Sequencer {
    pub const ZERO: Sequencer = Sequencer(0.0);

    /// Parse a query/form value, treating anything unparsable as absent
    pub fn parse_lenient(value: Option<&str>) -> Option<Self> {
        value
            .and_then(|v| v.trim().parse::<f64>().ok())
            .filter(|v| v.is_finite())
            .map(Self)
    }

    pub fn value(&self) -> f64 {
        self.0
    }

    pub fn is_zero(&self) -> bool {
        self.0 == 0.0
    }
}

impl From<f64> for Sequencer {
    fn from(value: f64) -> Self {
        Self(value)
    }
}

impl fmt::Display for Sequencer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:.6}", self.0)
    }
}

/// Immutable tracker status value
///
/// An empty `status` means the status is unknown, either because nothing has
/// been fetched yet or because the last attempt failed (`error` is set).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackerStatus {
    pub status: String,
    pub sequencer: Sequencer,
    pub error: Option<String>,
}

impl TrackerStatus {
    /// Create a successful status value
    pub fn new(status: impl Into<String>, sequencer: impl Into<Sequencer>) -> Self {
        Self {
            status: status.into(),
            sequencer: sequencer.into(),
            error: None,
        }
    }

    /// Create an error status value
    pub fn failed(error: impl fmt::Display) -> Self {
        Self {
            status: String::new(),
            sequencer: Sequencer::ZERO,
            error: Some(error.to_string()),
        }
    }

    /// True when no status string is known (never fetched, or errored)
    pub fn is_unknown(&self) -> bool {
        self.status.is_empty()
    }

    pub fn is_error(&self) -> bool {
        self.error.is_some()
    }
}

impl fmt::Display for TrackerStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.error {
            Some(error) => write!(f, "error: {error}"),
            None if self.status.is_empty() => write!(f, "unknown"),
            None => write!(f, "{}@{}", self.status, self.sequencer),
        }
    }
}

// ============================================================================
// Wire types
// ============================================================================

/// Body returned by a site's `api.php?fn=trackerstatus` endpoint
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RemoteStatusResponse {
    #[serde(default)]
    pub ok: bool,
    #[serde(default)]
    pub error: Option<String>,
    #[serde(default)]
    pub tracker_status: String,
    #[serde(default)]
    pub tracker_status_at: Sequencer,
}

/// Response body for `/poll` and `/update`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SiteResponse {
    pub ok: bool,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub tracker_status: String,
    #[serde(default, skip_serializing_if = "Sequencer::is_zero")]
    pub tracker_status_at: Sequencer,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl SiteResponse {
    pub fn ok() -> Self {
        Self {
            ok: true,
            ..Default::default()
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            error: Some(message.into()),
            ..Default::default()
        }
    }
}

impl From<&TrackerStatus> for SiteResponse {
    fn from(status: &TrackerStatus) -> Self {
        match &status.error {
            Some(error) => Self::error(error.clone()),
            None => Self {
                ok: true,
                tracker_status: status.status.clone(),
                tracker_status_at: status.sequencer,
                error: None,
            },
        }
    }
}

/// Contents of a file dropped into the update directory
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FileUpdate {
    #[serde(default)]
    pub conference: String,
    #[serde(default)]
    pub tracker_status: String,
    #[serde(default)]
    pub tracker_status_at: Sequencer,
}

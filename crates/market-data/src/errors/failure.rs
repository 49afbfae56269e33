use std::fmt;

use serde::{Deserialize, Serialize};

use crate::models::ProviderId;

/// Classification of a provider failure.
///
/// Used by the fallback selector to log why it moved on to the next provider
/// and carried in the aggregate failure list.
///
/// | Kind | Meaning |
/// |------|---------|
/// | `Unavailable` | Missing credentials, disabled, or unreachable |
/// | `Empty` | Reachable but nothing for this query |
/// | `Timeout` | Call exceeded the per-call timeout |
/// | `NotSupported` | Capability gap |
/// | `Error` | Anything else (bad status, malformed payload, upstream quota) |
#[derive(Clone, Copy, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    Unavailable,
    Empty,
    Timeout,
    NotSupported,
    Error,
}

impl FailureKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unavailable => "unavailable",
            Self::Empty => "empty",
            Self::Timeout => "timeout",
            Self::NotSupported => "not_supported",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for FailureKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One provider's failure within a single fallback call.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProviderFailure {
    pub provider: ProviderId,
    pub kind: FailureKind,
    pub message: String,
}

impl ProviderFailure {
    pub fn new(provider: ProviderId, kind: FailureKind, message: impl Into<String>) -> Self {
        Self {
            provider,
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for ProviderFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {} ({})", self.provider, self.kind, self.message)
    }
}

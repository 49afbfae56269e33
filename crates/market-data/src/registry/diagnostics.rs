//! Per-call attempt tracking for provider selection diagnostics.

use serde::Serialize;

use crate::errors::{FailureKind, ProviderFailure};
use crate::models::ProviderId;

/// Message recorded for providers skipped because `is_available()` was false.
const SKIPPED_MESSAGE: &str = "disabled or missing credentials";

/// What happened to one provider during a fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum AttemptOutcome {
    /// Not called; the provider reported itself unavailable.
    Skipped,
    /// Called and failed.
    Failed { kind: FailureKind, message: String },
    /// Called and returned data.
    Succeeded { rows: usize },
}

/// Record of a single provider attempt during a fetch.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ProviderAttempt {
    pub provider_id: ProviderId,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
}

/// Ordered record of every provider considered by one registry call.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct FetchDiagnostics {
    pub attempts: Vec<ProviderAttempt>,
}

impl FetchDiagnostics {
    pub fn new() -> Self {
        Self {
            attempts: Vec::new(),
        }
    }

    pub fn record_skip(&mut self, provider_id: ProviderId) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            outcome: AttemptOutcome::Skipped,
        });
    }

    pub fn record_failure(&mut self, provider_id: ProviderId, kind: FailureKind, message: String) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            outcome: AttemptOutcome::Failed { kind, message },
        });
    }

    pub fn record_success(&mut self, provider_id: ProviderId, rows: usize) {
        self.attempts.push(ProviderAttempt {
            provider_id,
            outcome: AttemptOutcome::Succeeded { rows },
        });
    }

    /// Summary for logging, e.g. `A: SKIPPED -> B: FAILED (timeout) -> C: SUCCESS`.
    pub fn summary(&self) -> String {
        if self.attempts.is_empty() {
            return "no providers attempted".to_string();
        }
        self.attempts
            .iter()
            .map(|a| match &a.outcome {
                AttemptOutcome::Skipped => format!("{}: SKIPPED", a.provider_id),
                AttemptOutcome::Failed { kind, .. } => {
                    format!("{}: FAILED ({})", a.provider_id, kind)
                }
                AttemptOutcome::Succeeded { .. } => format!("{}: SUCCESS", a.provider_id),
            })
            .collect::<Vec<_>>()
            .join(" -> ")
    }

    /// Check if any provider succeeded.
    pub fn has_success(&self) -> bool {
        self.attempts
            .iter()
            .any(|a| matches!(a.outcome, AttemptOutcome::Succeeded { .. }))
    }

    /// Providers that produced data, in call order.
    pub fn successful_providers(&self) -> Vec<ProviderId> {
        self.attempts
            .iter()
            .filter(|a| matches!(a.outcome, AttemptOutcome::Succeeded { .. }))
            .map(|a| a.provider_id.clone())
            .collect()
    }

    /// Every skip and failure, one entry per provider attempt.
    pub fn failures(&self) -> Vec<ProviderFailure> {
        self.attempts
            .iter()
            .filter_map(|a| match &a.outcome {
                AttemptOutcome::Skipped => Some(ProviderFailure::new(
                    a.provider_id.clone(),
                    FailureKind::Unavailable,
                    SKIPPED_MESSAGE,
                )),
                AttemptOutcome::Failed { kind, message } => Some(ProviderFailure::new(
                    a.provider_id.clone(),
                    *kind,
                    message.clone(),
                )),
                AttemptOutcome::Succeeded { .. } => None,
            })
            .collect()
    }

    /// Append the attempts of a follow-up call.
    pub fn extend(&mut self, other: FetchDiagnostics) {
        self.attempts.extend(other.attempts);
    }
}

// Probe strategy interface

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::{Duration, Instant};

use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::{SecretRef, ValidationRequest};

/// Verdict of a single probe run
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ProbeOutcome {
    pub validated: bool,
    /// Measured by the probe itself; the runner measures when absent
    pub elapsed: Option<Duration>,
}

impl ProbeOutcome {
    pub fn reachable(elapsed: Duration) -> Self {
        Self {
            validated: true,
            elapsed: Some(elapsed),
        }
    }

    pub fn unreachable(elapsed: Duration) -> Self {
        Self {
            validated: false,
            elapsed: Some(elapsed),
        }
    }

    /// Verdict that needed no work at all
    pub fn instant(validated: bool) -> Self {
        Self {
            validated,
            elapsed: Some(Duration::ZERO),
        }
    }

    /// Fold a fallible check into a verdict, logging the failure reason
    pub fn settle(criterion: &Criterion, started: Instant, result: Result<(), CapabilityError>) -> Self {
        let elapsed = started.elapsed();
        match result {
            Ok(()) => Self::reachable(elapsed),
            Err(e) => {
                tracing::info!(
                    criteria = %criterion,
                    error_kind = e.kind(),
                    duration_ms = elapsed.as_millis() as u64,
                    "Probe reported unreachable: {}",
                    e
                );
                Self::unreachable(elapsed)
            }
        }
    }
}

/// Which HTTP statuses count as "reachable".
///
/// Server errors never count. Anything in 2xx/3xx always does.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StatusPolicy {
    /// Only 2xx and 3xx
    Strict,
    /// Every status below 500
    #[default]
    ClientErrorsReachable,
    /// 2xx/3xx plus the listed statuses
    Allow(Vec<u16>),
}

impl StatusPolicy {
    pub fn is_reachable(&self, status: u16) -> bool {
        if (200..400).contains(&status) {
            return true;
        }
        if status >= 500 || status < 100 {
            return false;
        }
        match self {
            StatusPolicy::Strict => false,
            StatusPolicy::ClientErrorsReachable => status < 500,
            StatusPolicy::Allow(extra) => extra.contains(&status),
        }
    }
}

/// One integration-specific reachability check.
///
/// `probe` never fails: every internal error becomes `validated = false`.
/// It must stay cancel-safe, the runner drops the future on timeout or
/// cancellation.
#[async_trait]
pub trait CapabilityProbe: Send + Sync {
    /// Short label for logs
    fn name(&self) -> &'static str;

    /// Per-criterion budget, capped by the runner's overall deadline
    fn timeout(&self) -> Duration;

    /// Secrets `criterion` needs resolved before probing. A criterion
    /// whose secrets fail is marked unreachable on its own.
    fn secret_refs(&self, request: &ValidationRequest, _criterion: &Criterion) -> Vec<SecretRef> {
        request.secret_refs()
    }

    /// Probes that validate unconditionally; dispatch skips them
    fn is_always_true(&self) -> bool {
        false
    }

    async fn probe(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> ProbeOutcome;
}

// Scripted probes for runner and dispatch tests - no network

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::Criterion;
use crate::secrets::ResolvedSecrets;
use crate::task::ValidationRequest;

/// Answers from a fixed table, optionally after a delay
#[derive(Debug, Default)]
pub struct ScriptedProbe {
    verdicts: HashMap<String, bool>,
    default_verdict: bool,
    delay: Option<Duration>,
    reported_elapsed: Option<Duration>,
    timeout: Option<Duration>,
    calls: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl ScriptedProbe {
    pub fn new(default_verdict: bool) -> Self {
        Self {
            default_verdict,
            ..Default::default()
        }
    }

    pub fn with_verdict(mut self, criteria: impl Into<String>, validated: bool) -> Self {
        self.verdicts.insert(criteria.into(), validated);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    /// Report this elapsed time instead of leaving it to the runner
    pub fn reporting(mut self, elapsed: Duration) -> Self {
        self.reported_elapsed = Some(elapsed);
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }

    /// Highest number of overlapping `probe` calls seen so far
    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CapabilityProbe for ScriptedProbe {
    fn name(&self) -> &'static str {
        "scripted"
    }

    fn timeout(&self) -> Duration {
        self.timeout.unwrap_or(Duration::from_secs(10))
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let running = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(running, Ordering::SeqCst);
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        let validated = self
            .verdicts
            .get(criterion.as_str())
            .copied()
            .unwrap_or(self.default_verdict);
        ProbeOutcome {
            validated,
            elapsed: self.reported_elapsed,
        }
    }
}

/// Panics inside `probe`
#[derive(Debug, Default)]
pub struct PanickingProbe;

#[async_trait]
impl CapabilityProbe for PanickingProbe {
    fn name(&self) -> &'static str {
        "panicking"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(5)
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        panic!("probe blew up on {criterion}");
    }
}

/// Never completes on its own
#[derive(Debug, Default)]
pub struct HangingProbe {
    pub timeout: Duration,
}

impl HangingProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CapabilityProbe for HangingProbe {
    fn name(&self) -> &'static str {
        "hanging"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        _criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        std::future::pending::<()>().await;
        ProbeOutcome::instant(true)
    }
}

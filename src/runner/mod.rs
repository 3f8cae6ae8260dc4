// Validation Runner - drives one request through secret resolution and
// probing, writes every verdict to the cache and completes exactly once

pub mod lifecycle;


use futures::future::{join_all, BoxFuture};
use futures::FutureExt;
use statig::prelude::*;
use governor::{DefaultDirectRateLimiter, Quota, RateLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{oneshot, Semaphore};
use tokio::time::{timeout, timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::Instrument;

use crate::cache::{CacheKey, ValidationCache, ValidationResult};
use crate::config::RunnerConfig;
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::observability::validation_metrics;
use crate::probes::{ProbeRegistry, Registration};
use crate::secrets::{ResolvedSecrets, SecretResolver};
use crate::task::{SecretRef, ValidationRequest};
use crate::telemetry::{create_validation_span, generate_correlation_id};

pub use lifecycle::{FailureReason, LifecycleEvent, Phase, ValidationLifecycle};

/// Invoked once with one result per criterion
pub type CompletionCallback = Box<dyn FnOnce(Vec<ValidationResult>) -> BoxFuture<'static, ()> + Send>;

/// Request that passed registry lookup and criteria extraction
#[derive(Clone)]
pub struct PreparedValidation {
    request: ValidationRequest,
    registration: Registration,
    criteria: Vec<Criterion>,
}

impl PreparedValidation {
    pub fn request(&self) -> &ValidationRequest {
        &self.request
    }

    pub fn criteria(&self) -> &[Criterion] {
        &self.criteria
    }
}

/// Verdict of one criterion before it is stamped
#[derive(Debug, Clone, Copy)]
struct Verdict {
    validated: bool,
    elapsed: Duration,
}

impl Verdict {
    fn failed(elapsed: Duration) -> Self {
        Self {
            validated: false,
            elapsed,
        }
    }
}

/// Handle to a submitted validation
pub struct ValidationHandle {
    token: CancellationToken,
    receiver: oneshot::Receiver<Vec<ValidationResult>>,
}

impl ValidationHandle {
    /// Abort in-flight probes. Results are still delivered, all false.
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn cancellation_token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Results once the validation completes
    pub async fn wait(self) -> Result<Vec<ValidationResult>, CapabilityError> {
        self.receiver.await.map_err(|_| CapabilityError::Cancelled)
    }
}

/// Makes sure the callback fires even if the worker unwinds before
/// reaching it, with the all-false results prepared up front
struct CompletionGuard {
    callback: Option<CompletionCallback>,
    fallback: Vec<ValidationResult>,
}

impl CompletionGuard {
    fn new(callback: Option<CompletionCallback>, fallback: Vec<ValidationResult>) -> Self {
        Self { callback, fallback }
    }

    fn take(&mut self) -> Option<CompletionCallback> {
        self.callback.take()
    }
}

impl Drop for CompletionGuard {
    fn drop(&mut self) {
        if let Some(callback) = self.callback.take() {
            let results = std::mem::take(&mut self.fallback);
            tracing::error!("Validation worker ended early, completing with failed results");
            if let Ok(runtime) = tokio::runtime::Handle::try_current() {
                runtime.spawn(callback(results));
            }
        }
    }
}

#[derive(Clone)]
pub struct ValidationRunner {
    registry: Arc<ProbeRegistry>,
    cache: ValidationCache,
    secrets: Arc<dyn SecretResolver>,
    permits: Arc<Semaphore>,
    limiter: Arc<DefaultDirectRateLimiter>,
    overall_timeout: Duration,
    callback_timeout: Duration,
    shutdown: CancellationToken,
}

impl ValidationRunner {
    pub fn new(
        registry: Arc<ProbeRegistry>,
        cache: ValidationCache,
        secrets: Arc<dyn SecretResolver>,
        config: &RunnerConfig,
    ) -> Result<Self, CapabilityError> {
        let rate = NonZeroU32::new(config.probes_per_second)
            .ok_or_else(|| CapabilityError::Config("runner.probes_per_second must be at least 1".to_string()))?;
        if config.pool_size == 0 {
            return Err(CapabilityError::Config("runner.pool_size must be at least 1".to_string()));
        }

        Ok(Self {
            registry,
            cache,
            secrets,
            permits: Arc::new(Semaphore::new(config.pool_size)),
            limiter: Arc::new(RateLimiter::direct(Quota::per_second(rate))),
            overall_timeout: config.overall_timeout(),
            callback_timeout: config.callback_timeout(),
            shutdown: CancellationToken::new(),
        })
    }

    pub fn cache(&self) -> &ValidationCache {
        &self.cache
    }

    pub fn registry(&self) -> &ProbeRegistry {
        &self.registry
    }

    /// Cancel every in-flight and future validation of this runner
    pub fn shutdown(&self) {
        tracing::info!("Validation runner shutting down");
        self.shutdown.cancel();
    }

    /// Registry lookup and criteria extraction. Errors here are fatal.
    pub fn prepare(&self, request: ValidationRequest) -> Result<PreparedValidation, CapabilityError> {
        let registration = self.registry.lookup(request.task_type())?.clone();
        let criteria = registration.extractor.extract(&request)?;
        Ok(PreparedValidation {
            request,
            registration,
            criteria,
        })
    }

    /// Validate inline and return the results
    pub async fn validate(&self, request: ValidationRequest) -> Result<Vec<ValidationResult>, CapabilityError> {
        let prepared = self.prepare(request)?;
        Ok(self.execute(prepared, self.shutdown.child_token()).await.0)
    }

    /// Run on the pool in the background. Fatal errors are returned right
    /// away and the callback is dropped unused; otherwise it fires exactly
    /// once, bounded by whatever remains of the overall timeout but never
    /// less than the configured callback timeout.
    pub fn submit(
        &self,
        request: ValidationRequest,
        callback: Option<CompletionCallback>,
    ) -> Result<ValidationHandle, CapabilityError> {
        let prepared = self.prepare(request)?;
        let token = self.shutdown.child_token();
        let (sender, receiver) = oneshot::channel();

        let fallback = self.failed_results(&prepared, Duration::ZERO);
        let runner = self.clone();
        let worker_token = token.clone();
        tokio::spawn(async move {
            let mut guard = CompletionGuard::new(callback, fallback);
            let (results, deadline) = runner.execute(prepared, worker_token).await;

            if let Some(callback) = guard.take() {
                let budget = deadline
                    .saturating_duration_since(Instant::now())
                    .max(runner.callback_timeout);
                let delivered = AssertUnwindSafe(timeout(budget, callback(results.clone()))).catch_unwind();
                match delivered.await {
                    Ok(Ok(())) => {}
                    Ok(Err(_)) => tracing::warn!(
                        budget_ms = budget.as_millis() as u64,
                        "Completion callback exceeded its budget"
                    ),
                    Err(_) => tracing::error!("Completion callback panicked"),
                }
            }
            let _ = sender.send(results);
        });

        Ok(ValidationHandle { token, receiver })
    }

    fn failed_results(&self, prepared: &PreparedValidation, elapsed: Duration) -> Vec<ValidationResult> {
        prepared
            .criteria
            .iter()
            .map(|criterion| self.stamp(&prepared.request, criterion, Verdict::failed(elapsed)))
            .collect()
    }

    fn stamp(&self, request: &ValidationRequest, criterion: &Criterion, verdict: Verdict) -> ValidationResult {
        self.cache.stamp(
            CacheKey::new(request.account_id(), request.agent_id(), criterion.as_str()),
            verdict.validated,
            verdict.elapsed,
        )
    }

    /// Never fails: every problem past `prepare` becomes `validated = false`.
    /// Returns the results and the overall deadline.
    async fn execute(&self, prepared: PreparedValidation, token: CancellationToken) -> (Vec<ValidationResult>, Instant) {
        let correlation_id = generate_correlation_id();
        let span = create_validation_span(&prepared.request, &correlation_id);
        self.execute_in_span(prepared, token, correlation_id).instrument(span).await
    }

    async fn execute_in_span(
        &self,
        prepared: PreparedValidation,
        token: CancellationToken,
        correlation_id: String,
    ) -> (Vec<ValidationResult>, Instant) {
        let metrics = validation_metrics();
        metrics.record_validation_started();

        let queued = Instant::now();
        let permit = tokio::select! {
            _ = token.cancelled() => None,
            permit = self.permits.clone().acquire_owned() => permit.ok(),
        };
        let Some(_permit) = permit else {
            metrics.record_cancellation();
            tracing::info!(task_type = %prepared.request.task_type(), "Validation cancelled while queued");
            return (self.failed_results(&prepared, queued.elapsed()), Instant::now());
        };

        let started = Instant::now();
        let deadline = started + self.overall_timeout;
        let mut lifecycle = ValidationLifecycle::new(correlation_id).state_machine();
        let request = &prepared.request;
        let probe = prepared.registration.probe.clone();

        // Secrets are resolved once per distinct set; a failed set only
        // fails the criteria that depend on it
        let needed: Vec<Vec<SecretRef>> = prepared
            .criteria
            .iter()
            .map(|criterion| probe.secret_refs(request, criterion))
            .collect();
        let mut batches: Vec<Vec<SecretRef>> = needed.iter().filter(|refs| !refs.is_empty()).cloned().collect();
        batches.sort();
        batches.dedup();

        lifecycle.handle(&LifecycleEvent::Start {
            needs_secrets: !batches.is_empty(),
        });

        let mut resolved: HashMap<Vec<SecretRef>, ResolvedSecrets> = HashMap::new();
        if !batches.is_empty() {
            let resolving = join_all(batches.iter().map(|refs| self.secrets.resolve(refs)));
            let outcome = tokio::select! {
                _ = token.cancelled() => Err(FailureReason::Cancelled),
                done = timeout_at(deadline, resolving) => done.map_err(|_| FailureReason::TimedOut),
            };
            let outcomes = match outcome {
                Ok(outcomes) => outcomes,
                Err(reason) => {
                    lifecycle.handle(&LifecycleEvent::Fail(reason));
                    return (self.finish_failed(&prepared, reason, started).await, deadline);
                }
            };

            for (refs, outcome) in batches.iter().zip(outcomes) {
                match outcome {
                    Ok(secrets) => {
                        resolved.insert(refs.clone(), secrets);
                    }
                    Err(e) => {
                        metrics.record_secret_failure();
                        tracing::warn!(
                            task_type = %request.task_type(),
                            agent_id = %request.agent_id(),
                            secret_count = refs.len(),
                            error_kind = e.kind(),
                            "Secret resolution failed: {}",
                            e
                        );
                    }
                }
            }

            if resolved.is_empty() && needed.iter().all(|refs| !refs.is_empty()) {
                lifecycle.handle(&LifecycleEvent::Fail(FailureReason::SecretResolution));
                return (
                    self.finish_failed(&prepared, FailureReason::SecretResolution, started).await,
                    deadline,
                );
            }
            lifecycle.handle(&LifecycleEvent::SecretsResolved);
        }

        let no_secrets = ResolvedSecrets::new();
        let secrets_elapsed = started.elapsed();
        let prepared_ref = &prepared;
        let probing = join_all(prepared.criteria.iter().zip(&needed).map(|(criterion, refs)| {
            let secrets = if refs.is_empty() {
                Some(&no_secrets)
            } else {
                resolved.get(refs)
            };
            async move {
                match secrets {
                    Some(secrets) => self.probe_one(prepared_ref, criterion, secrets, deadline).await,
                    None => self.unresolved(request, criterion, secrets_elapsed),
                }
            }
        }));
        let verdicts = tokio::select! {
            _ = token.cancelled() => None,
            verdicts = probing => Some(verdicts),
        };

        let Some(verdicts) = verdicts else {
            lifecycle.handle(&LifecycleEvent::Fail(FailureReason::Cancelled));
            return (self.finish_failed(&prepared, FailureReason::Cancelled, started).await, deadline);
        };
        lifecycle.handle(&LifecycleEvent::ProbesFinished);

        let results: Vec<ValidationResult> = prepared
            .criteria
            .iter()
            .zip(verdicts)
            .map(|(criterion, verdict)| self.stamp(request, criterion, verdict))
            .collect();
        self.persist(&results).await;

        tracing::info!(
            task_type = %request.task_type(),
            account_id = %request.account_id(),
            agent_id = %request.agent_id(),
            criteria_count = results.len(),
            validated = results.iter().all(|r| r.validated),
            duration_ms = started.elapsed().as_millis() as u64,
            "Validation completed"
        );
        (results, deadline)
    }

    /// One criterion under min(probe timeout, overall deadline), with panics
    /// and rate limiting contained inside the same budget
    async fn probe_one(
        &self,
        prepared: &PreparedValidation,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
        deadline: Instant,
    ) -> Verdict {
        let metrics = validation_metrics();
        let request = &prepared.request;
        let probe = &prepared.registration.probe;
        let started = Instant::now();

        if timeout_at(deadline, self.limiter.until_ready()).await.is_err() {
            metrics.record_timeout();
            metrics.record_verdict(false);
            return Verdict::failed(started.elapsed());
        }

        let probe_deadline = deadline.min(Instant::now() + probe.timeout());
        let attempt = AssertUnwindSafe(probe.probe(request, criterion, secrets)).catch_unwind();
        let verdict = match timeout_at(probe_deadline, attempt).await {
            Ok(Ok(outcome)) => Verdict {
                validated: outcome.validated,
                elapsed: outcome.elapsed.unwrap_or_else(|| started.elapsed()),
            },
            Ok(Err(_)) => {
                metrics.record_panic();
                tracing::error!(
                    criteria = %criterion,
                    agent_id = %request.agent_id(),
                    probe = probe.name(),
                    "Probe panicked"
                );
                Verdict::failed(started.elapsed())
            }
            Err(_) => {
                metrics.record_timeout();
                let elapsed = started.elapsed();
                tracing::info!(
                    criteria = %criterion,
                    agent_id = %request.agent_id(),
                    probe = probe.name(),
                    error_kind = "probe_timeout",
                    duration_ms = elapsed.as_millis() as u64,
                    "Probe timed out"
                );
                Verdict::failed(elapsed)
            }
        };

        metrics.record_verdict(verdict.validated);
        tracing::debug!(
            criteria = %criterion,
            account_id = %request.account_id(),
            agent_id = %request.agent_id(),
            validated = verdict.validated,
            duration_ms = verdict.elapsed.as_millis() as u64,
            "Probe finished"
        );
        verdict
    }

    /// Criterion whose secrets did not resolve
    fn unresolved(&self, request: &ValidationRequest, criterion: &Criterion, elapsed: Duration) -> Verdict {
        validation_metrics().record_verdict(false);
        tracing::info!(
            criteria = %criterion,
            agent_id = %request.agent_id(),
            "Skipping probe, secrets unavailable"
        );
        Verdict::failed(elapsed)
    }

    async fn finish_failed(
        &self,
        prepared: &PreparedValidation,
        reason: FailureReason,
        started: Instant,
    ) -> Vec<ValidationResult> {
        let metrics = validation_metrics();
        let results = self.failed_results(prepared, started.elapsed());
        match reason {
            FailureReason::Cancelled => metrics.record_cancellation(),
            FailureReason::TimedOut => metrics.record_timeout(),
            // Counted per failed secret set
            FailureReason::SecretResolution => {}
        }
        for _ in &results {
            metrics.record_verdict(false);
        }

        tracing::info!(
            task_type = %prepared.request.task_type(),
            account_id = %prepared.request.account_id(),
            agent_id = %prepared.request.agent_id(),
            reason = reason.as_str(),
            criteria_count = results.len(),
            "Validation failed before probing completed"
        );

        // Cancelled verdicts say nothing about reachability
        if reason != FailureReason::Cancelled {
            self.persist(&results).await;
        }
        results
    }

    async fn persist(&self, results: &[ValidationResult]) {
        for result in results {
            if let Err(e) = self.cache.put(result.clone()).await {
                tracing::warn!(
                    criteria = %result.criteria,
                    agent_id = %result.agent_id,
                    "Failed to cache validation result: {}",
                    e
                );
            }
        }
    }
}

// End-to-end validation through the runner with the built-in registry
// HTTP endpoints are served by wiremock; nothing leaves the loopback interface

use agent_reach::config::{CacheConfig, ProbesConfig, RunnerConfig};
use agent_reach::criteria::{extractor_for, Criterion};
use agent_reach::{
    AgentSelector, CacheKey, CapabilityError, CapabilityProbe, CompletionCallback, ProbeOutcome,
    ProbeRegistry, ResolvedSecrets, StaticSecretResolver, TaskParameter, TaskType, ValidationCache,
    ValidationRequest, ValidationResult, ValidationRunner,
};
use async_trait::async_trait;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, ResponseTemplate};

fn default_runner(probes: &ProbesConfig) -> ValidationRunner {
    ValidationRunner::new(
        Arc::new(ProbeRegistry::with_defaults(probes).unwrap()),
        ValidationCache::in_memory(&CacheConfig::default()),
        Arc::new(StaticSecretResolver::new()),
        &RunnerConfig::default(),
    )
    .unwrap()
}

fn http_request(url: String, agent: &str) -> ValidationRequest {
    ValidationRequest::new(TaskType::HttpCheck, vec![TaskParameter::Http { url }], "acct-1", agent)
}

async fn closed_port() -> u16 {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    port
}

#[tokio::test]
async fn test_http_check_reachable_and_unroutable() {
    let server = MockServer::start().await;
    Mock::given(method("GET"))
        .respond_with(ResponseTemplate::new(200))
        .mount(&server)
        .await;

    let probes = ProbesConfig {
        http_timeout_secs: 2,
        ..ProbesConfig::default()
    };
    let runner = default_runner(&probes);

    let reachable = runner
        .validate(http_request(format!("{}/health", server.uri()), "agent-up"))
        .await
        .unwrap();
    assert_eq!(reachable.len(), 1);
    assert!(reachable[0].validated);

    let started = std::time::Instant::now();
    let unroutable = runner
        .validate(http_request(format!("http://127.0.0.1:{}/health", closed_port().await), "agent-down"))
        .await
        .unwrap();
    assert!(!unroutable[0].validated);
    assert!(started.elapsed() < Duration::from_secs(3));

    let selector = AgentSelector::new(
        runner.cache().clone(),
        Arc::new(ProbeRegistry::with_defaults(&probes).unwrap()),
        Duration::from_secs(60),
    );
    let criteria = vec![reachable[0].criteria.clone()];
    let capable = selector
        .select_capable_agents(
            "acct-1",
            &criteria,
            &["agent-up".to_string(), "agent-down".to_string()],
            None,
        )
        .await
        .unwrap();
    assert_eq!(capable, vec!["agent-up".to_string()]);
}

#[tokio::test]
async fn test_local_script_passes_for_unknown_agents() {
    let runner = default_runner(&ProbesConfig::default());
    let request = ValidationRequest::new(TaskType::LocalScript, vec![], "acct-9", "agent-that-does-not-exist");

    let results = runner.validate(request).await.unwrap();
    assert_eq!(results.len(), 1);
    assert!(results[0].validated);
    assert_eq!(results[0].duration_ms, 0);
}

#[tokio::test]
async fn test_missing_parameters_are_rejected_before_probing() {
    let runner = default_runner(&ProbesConfig::default());
    let request = ValidationRequest::new(TaskType::GitFetch, vec![], "acct-1", "agent-1");

    let err = runner.validate(request).await.unwrap_err();
    assert!(err.is_fatal());
    assert!(matches!(err, CapabilityError::InvalidParameters { .. }));
}

struct ExplodingProbe;

#[async_trait]
impl CapabilityProbe for ExplodingProbe {
    fn name(&self) -> &'static str {
        "exploding"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        _criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        panic!("connection pool exhausted");
    }
}

#[tokio::test]
async fn test_callback_fires_exactly_once_when_probe_panics() {
    let mut registry = ProbeRegistry::new();
    registry.register(TaskType::HttpCheck, extractor_for(TaskType::HttpCheck), Arc::new(ExplodingProbe));
    let runner = ValidationRunner::new(
        Arc::new(registry),
        ValidationCache::in_memory(&CacheConfig::default()),
        Arc::new(StaticSecretResolver::new()),
        &RunnerConfig::default(),
    )
    .unwrap();

    let calls = Arc::new(AtomicUsize::new(0));
    let (tx, rx) = oneshot::channel();
    let counter = calls.clone();
    let callback: CompletionCallback = Box::new(move |results: Vec<ValidationResult>| {
        Box::pin(async move {
            counter.fetch_add(1, Ordering::SeqCst);
            let _ = tx.send(results);
        })
    });

    let handle = runner
        .submit(http_request("https://api.example.com".to_string(), "agent-1"), Some(callback))
        .unwrap();
    let results = handle.wait().await.unwrap();

    assert_eq!(rx.await.unwrap(), results);
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert!(!results[0].validated);
}

#[tokio::test]
async fn test_concurrent_writes_leave_one_whole_result() {
    let cache = ValidationCache::in_memory(&CacheConfig::default());

    let writers: Vec<_> = (0..32)
        .map(|i| {
            let cache = cache.clone();
            tokio::spawn(async move {
                let result = cache.stamp(
                    CacheKey::new("acct-1", "agent-1", "db.internal:5432"),
                    i % 2 == 0,
                    Duration::from_millis(i),
                );
                cache.put(result.clone()).await.unwrap();
                result
            })
        })
        .collect();

    let mut written = Vec::new();
    for writer in writers {
        written.push(writer.await.unwrap());
    }

    let stored = cache
        .get("acct-1", "agent-1", "db.internal:5432")
        .await
        .unwrap()
        .unwrap();
    assert!(written.contains(&stored));
    let newest = written.iter().map(|r| r.created_at).max().unwrap();
    assert_eq!(stored.created_at, newest);
}

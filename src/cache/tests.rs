use super::*;
use chrono::TimeZone;
use std::time::Duration;

fn start() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2026, 1, 1, 12, 0, 0).unwrap()
}

fn cache_with_clock(ttl: Duration) -> (ValidationCache, Arc<ManualClock>) {
    let clock = Arc::new(ManualClock::new(start()));
    let store = Arc::new(MokaValidationStore::new(1_000, Duration::from_secs(3600 * 24 * 365)));
    let cache = ValidationCache::new(store, ttl).with_clock(clock.clone());
    (cache, clock)
}

fn key(agent: &str, criteria: &str) -> CacheKey {
    CacheKey::new("acct-1", agent, criteria)
}

#[tokio::test]
async fn test_put_then_get_round_trips() {
    let (cache, _) = cache_with_clock(Duration::from_secs(3600));
    let result = cache.stamp(key("agent-1", "https://example.com/"), true, Duration::from_millis(42));
    cache.put(result.clone()).await.unwrap();

    let found = cache.get("acct-1", "agent-1", "https://example.com/").await.unwrap();
    assert_eq!(found, Some(result));
    assert_eq!(found.unwrap().duration(), Duration::from_millis(42));
}

#[tokio::test]
async fn test_stamp_sets_expiry_from_ttl() {
    let (cache, _) = cache_with_clock(Duration::from_secs(3600));
    let result = cache.stamp(key("agent-1", "db:5432"), false, Duration::ZERO);
    assert_eq!(result.created_at, start());
    assert_eq!(result.expires_at, start() + chrono::Duration::hours(1));
}

#[tokio::test]
async fn test_expired_entry_reads_as_absent() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(60));
    cache
        .put(cache.stamp(key("agent-1", "db:5432"), true, Duration::ZERO))
        .await
        .unwrap();

    clock.advance(chrono::Duration::seconds(59));
    assert!(cache.get("acct-1", "agent-1", "db:5432").await.unwrap().is_some());

    clock.advance(chrono::Duration::seconds(1));
    assert!(cache.get("acct-1", "agent-1", "db:5432").await.unwrap().is_none());
}

#[tokio::test]
async fn test_newer_result_overwrites_older() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(3600));
    cache
        .put(cache.stamp(key("agent-1", "db:5432"), false, Duration::ZERO))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(1));
    let newer = cache.stamp(key("agent-1", "db:5432"), true, Duration::ZERO);
    cache.put(newer.clone()).await.unwrap();

    assert_eq!(cache.get("acct-1", "agent-1", "db:5432").await.unwrap(), Some(newer));
}

#[tokio::test]
async fn test_late_arriving_older_result_is_ignored() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(3600));
    let older = cache.stamp(key("agent-1", "db:5432"), false, Duration::ZERO);
    clock.advance(chrono::Duration::seconds(1));
    let newer = cache.stamp(key("agent-1", "db:5432"), true, Duration::ZERO);

    cache.put(newer.clone()).await.unwrap();
    cache.put(older).await.unwrap();

    assert_eq!(cache.get("acct-1", "agent-1", "db:5432").await.unwrap(), Some(newer));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_puts_leave_one_whole_value() {
    let (cache, _) = cache_with_clock(Duration::from_secs(3600));
    let first = cache.stamp(key("agent-1", "db:5432"), true, Duration::from_millis(1));
    let second = cache.stamp(key("agent-1", "db:5432"), false, Duration::from_millis(2));

    let (a, b) = tokio::join!(
        {
            let cache = cache.clone();
            let first = first.clone();
            tokio::spawn(async move { cache.put(first).await })
        },
        {
            let cache = cache.clone();
            let second = second.clone();
            tokio::spawn(async move { cache.put(second).await })
        }
    );
    a.unwrap().unwrap();
    b.unwrap().unwrap();

    let stored = cache.get("acct-1", "agent-1", "db:5432").await.unwrap().unwrap();
    assert!(stored == first || stored == second);
}

#[tokio::test]
async fn test_get_many_skips_missing_and_expired() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(60));
    cache
        .put(cache.stamp(key("agent-1", "old"), true, Duration::ZERO))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(90));
    cache
        .put(cache.stamp(key("agent-1", "fresh"), true, Duration::ZERO))
        .await
        .unwrap();

    let criteria = vec!["old".to_string(), "fresh".to_string(), "missing".to_string()];
    let found = cache.get_many("acct-1", "agent-1", &criteria).await.unwrap();
    assert_eq!(found.len(), 1);
    assert!(found.contains_key("fresh"));
}

#[tokio::test]
async fn test_invalidation_scopes() {
    let (cache, _) = cache_with_clock(Duration::from_secs(3600));
    for (agent, criteria) in [("a1", "db:5432"), ("a1", "https://x/"), ("a2", "db:5432")] {
        cache
            .put(cache.stamp(key(agent, criteria), true, Duration::ZERO))
            .await
            .unwrap();
    }
    cache
        .put(cache.stamp(CacheKey::new("acct-2", "a1", "db:5432"), true, Duration::ZERO))
        .await
        .unwrap();

    cache.invalidate_criteria("acct-1", "db:5432").await.unwrap();
    assert!(cache.get("acct-1", "a1", "db:5432").await.unwrap().is_none());
    assert!(cache.get("acct-1", "a2", "db:5432").await.unwrap().is_none());
    assert!(cache.get("acct-1", "a1", "https://x/").await.unwrap().is_some());
    assert!(cache.get("acct-2", "a1", "db:5432").await.unwrap().is_some());

    cache.invalidate_agent("acct-1", "a1").await.unwrap();
    assert!(cache.get("acct-1", "a1", "https://x/").await.unwrap().is_none());

    cache.invalidate_account("acct-2").await.unwrap();
    assert!(cache.get("acct-2", "a1", "db:5432").await.unwrap().is_none());
}

#[tokio::test]
async fn test_purge_expired_removes_only_expired() {
    let (cache, clock) = cache_with_clock(Duration::from_secs(60));
    cache
        .put(cache.stamp(key("agent-1", "old"), true, Duration::ZERO))
        .await
        .unwrap();
    clock.advance(chrono::Duration::seconds(61));
    cache
        .put(cache.stamp(key("agent-1", "new"), true, Duration::ZERO))
        .await
        .unwrap();

    assert_eq!(cache.purge_expired().await.unwrap(), 1);
    assert!(cache.get("acct-1", "agent-1", "new").await.unwrap().is_some());
}

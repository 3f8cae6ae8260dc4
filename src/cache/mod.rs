// Validation Result Cache - most recent verdict per (account, agent, criteria)
// with advisory expiry

pub mod clock;
pub mod memory;
#[cfg(feature = "database")]
pub mod sqlite;
pub mod store;

#[cfg(test)]
mod tests;

use chrono::{DateTime, Utc};
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use crate::config::CacheConfig;
use crate::errors::CapabilityError;
use crate::observability::validation_metrics;

pub use clock::{Clock, ManualClock, SystemClock};
pub use memory::MokaValidationStore;
#[cfg(feature = "database")]
pub use sqlite::SqliteValidationStore;
pub use store::{CacheKey, Invalidation, ValidationResult, ValidationStore};

/// Expiry-aware front of a [`ValidationStore`]
#[derive(Clone)]
pub struct ValidationCache {
    store: Arc<dyn ValidationStore>,
    clock: Arc<dyn Clock>,
    ttl: Duration,
}

impl ValidationCache {
    pub fn new(store: Arc<dyn ValidationStore>, ttl: Duration) -> Self {
        Self {
            store,
            clock: Arc::new(SystemClock),
            ttl,
        }
    }

    /// Moka-backed cache sized from config
    pub fn in_memory(config: &CacheConfig) -> Self {
        let ttl = config.ttl();
        Self::new(Arc::new(MokaValidationStore::new(config.max_capacity, ttl)), ttl)
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Build a result stamped with the current time and this cache's TTL
    pub fn stamp(
        &self,
        key: CacheKey,
        validated: bool,
        duration: Duration,
    ) -> ValidationResult {
        let created_at = self.now();
        let expires_at = chrono::Duration::from_std(self.ttl)
            .ok()
            .and_then(|ttl| created_at.checked_add_signed(ttl))
            .unwrap_or(DateTime::<Utc>::MAX_UTC);
        ValidationResult {
            account_id: key.account_id,
            agent_id: key.agent_id,
            criteria: key.criteria,
            validated,
            duration_ms: duration.as_millis().min(u64::MAX as u128) as u64,
            created_at,
            expires_at,
        }
    }

    pub async fn put(&self, result: ValidationResult) -> Result<(), CapabilityError> {
        tracing::debug!(
            account_id = %result.account_id,
            agent_id = %result.agent_id,
            criteria = %result.criteria,
            validated = result.validated,
            "Caching validation result"
        );
        self.store.upsert(result).await
    }

    /// Unexpired result for the key, or `None`
    pub async fn get(
        &self,
        account_id: &str,
        agent_id: &str,
        criteria: &str,
    ) -> Result<Option<ValidationResult>, CapabilityError> {
        let key = CacheKey::new(account_id, agent_id, criteria);
        let now = self.now();
        let found = self.store.get(&key).await?.filter(|r| !r.is_expired_at(now));
        record_lookup(found.is_some());
        Ok(found)
    }

    /// Unexpired results for each criterion, keyed by criterion
    pub async fn get_many(
        &self,
        account_id: &str,
        agent_id: &str,
        criteria: &[String],
    ) -> Result<HashMap<String, ValidationResult>, CapabilityError> {
        let keys: Vec<CacheKey> = criteria
            .iter()
            .map(|c| CacheKey::new(account_id, agent_id, c.as_str()))
            .collect();
        let now = self.now();
        let found = self.store.get_many(&keys).await?;

        let mut results = HashMap::with_capacity(found.len());
        for result in found.into_iter().flatten() {
            if result.is_expired_at(now) {
                record_lookup(false);
                continue;
            }
            record_lookup(true);
            results.insert(result.criteria.clone(), result);
        }
        Ok(results)
    }

    pub async fn invalidate_agent(&self, account_id: &str, agent_id: &str) -> Result<(), CapabilityError> {
        tracing::info!(account_id = %account_id, agent_id = %agent_id, "Invalidating agent verdicts");
        self.store
            .invalidate(Invalidation::Agent {
                account_id: account_id.to_string(),
                agent_id: agent_id.to_string(),
            })
            .await
    }

    pub async fn invalidate_criteria(&self, account_id: &str, criteria: &str) -> Result<(), CapabilityError> {
        tracing::info!(account_id = %account_id, criteria = %criteria, "Invalidating dependency verdicts");
        self.store
            .invalidate(Invalidation::Criteria {
                account_id: account_id.to_string(),
                criteria: criteria.to_string(),
            })
            .await
    }

    pub async fn invalidate_account(&self, account_id: &str) -> Result<(), CapabilityError> {
        tracing::info!(account_id = %account_id, "Invalidating account verdicts");
        self.store
            .invalidate(Invalidation::Account {
                account_id: account_id.to_string(),
            })
            .await
    }

    /// Reclaim expired entries now instead of waiting for the store
    pub async fn purge_expired(&self) -> Result<u64, CapabilityError> {
        let removed = self.store.purge_expired(self.now()).await?;
        if removed > 0 {
            tracing::info!(removed, "Purged expired validation results");
        }
        Ok(removed)
    }
}

fn record_lookup(hit: bool) {
    let metrics = validation_metrics();
    if hit {
        metrics.record_cache_hit();
    } else {
        metrics.record_cache_miss();
    }
}

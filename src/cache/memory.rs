// In-memory result store on moka's sharded concurrent cache

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use moka::future::Cache;
use moka::ops::compute::Op;
use std::time::Duration;

use super::store::{CacheKey, Invalidation, ValidationResult, ValidationStore};
use crate::errors::CapabilityError;

#[derive(Clone)]
pub struct MokaValidationStore {
    cache: Cache<CacheKey, ValidationResult>,
}

impl MokaValidationStore {
    /// `ttl` only drives background reclamation; expiry on read is decided
    /// by each result's `expires_at`
    pub fn new(max_capacity: u64, ttl: Duration) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(ttl)
            .support_invalidation_closures()
            .build();
        Self { cache }
    }

    pub fn entry_count(&self) -> u64 {
        self.cache.entry_count()
    }
}

#[async_trait]
impl ValidationStore for MokaValidationStore {
    async fn upsert(&self, result: ValidationResult) -> Result<(), CapabilityError> {
        self.cache
            .entry(result.key())
            .and_compute_with(|existing| {
                let op = match existing {
                    Some(entry) if !result.supersedes(entry.value()) => Op::Nop,
                    _ => Op::Put(result),
                };
                std::future::ready(op)
            })
            .await;
        Ok(())
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<ValidationResult>, CapabilityError> {
        Ok(self.cache.get(key).await)
    }

    async fn invalidate(&self, scope: Invalidation) -> Result<(), CapabilityError> {
        self.cache
            .invalidate_entries_if(move |_, result| scope.matches(result))
            .map(drop)
            .map_err(|e| CapabilityError::Storage(format!("invalidation rejected: {e}")))
    }

    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CapabilityError> {
        let expired: Vec<_> = self
            .cache
            .iter()
            .filter(|(_, result)| result.is_expired_at(now))
            .map(|(key, _)| key)
            .collect();

        let mut removed = 0;
        for key in expired {
            if self.cache.remove(key.as_ref()).await.is_some() {
                removed += 1;
            }
        }
        Ok(removed)
    }
}

// Storage seam for validation results

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::errors::CapabilityError;

/// Identity of a verdict. At most one result is stored per key.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct CacheKey {
    pub account_id: String,
    pub agent_id: String,
    pub criteria: String,
}

impl CacheKey {
    pub fn new(account_id: impl Into<String>, agent_id: impl Into<String>, criteria: impl Into<String>) -> Self {
        Self {
            account_id: account_id.into(),
            agent_id: agent_id.into(),
            criteria: criteria.into(),
        }
    }
}

/// One stored verdict. Also the persistence record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub account_id: String,
    pub agent_id: String,
    pub criteria: String,
    pub validated: bool,
    pub duration_ms: u64,
    pub created_at: DateTime<Utc>,
    pub expires_at: DateTime<Utc>,
}

impl ValidationResult {
    pub fn key(&self) -> CacheKey {
        CacheKey::new(&self.account_id, &self.agent_id, &self.criteria)
    }

    pub fn duration(&self) -> Duration {
        Duration::from_millis(self.duration_ms)
    }

    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_at <= now
    }

    /// Whether `self` should replace `existing` under last-writer-wins
    pub fn supersedes(&self, existing: &ValidationResult) -> bool {
        self.created_at >= existing.created_at
    }
}

/// Which entries a bulk invalidation drops
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Every verdict for an agent, e.g. on deregistration
    Agent { account_id: String, agent_id: String },
    /// Every agent's verdict for a dependency, e.g. after credential rotation
    Criteria { account_id: String, criteria: String },
    Account { account_id: String },
}

impl Invalidation {
    pub fn matches(&self, result: &ValidationResult) -> bool {
        match self {
            Invalidation::Agent { account_id, agent_id } => {
                &result.account_id == account_id && &result.agent_id == agent_id
            }
            Invalidation::Criteria { account_id, criteria } => {
                &result.account_id == account_id && &result.criteria == criteria
            }
            Invalidation::Account { account_id } => &result.account_id == account_id,
        }
    }
}

/// Keyed result storage. Implementations must apply `upsert` atomically per
/// key and keep whichever result has the later `created_at`.
#[async_trait]
pub trait ValidationStore: Send + Sync {
    async fn upsert(&self, result: ValidationResult) -> Result<(), CapabilityError>;

    /// Stored result regardless of expiry
    async fn get(&self, key: &CacheKey) -> Result<Option<ValidationResult>, CapabilityError>;

    async fn get_many(&self, keys: &[CacheKey]) -> Result<Vec<Option<ValidationResult>>, CapabilityError> {
        let mut results = Vec::with_capacity(keys.len());
        for key in keys {
            results.push(self.get(key).await?);
        }
        Ok(results)
    }

    async fn invalidate(&self, scope: Invalidation) -> Result<(), CapabilityError>;

    /// Drop results expired at `now`, returning how many were removed
    async fn purge_expired(&self, now: DateTime<Utc>) -> Result<u64, CapabilityError>;
}

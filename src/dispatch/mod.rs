// Dispatcher Query API - picks agents whose cached verdicts say they can
// reach every dependency of a task. Reads only, never probes.


use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use crate::cache::{ValidationCache, ValidationResult};
use crate::criteria::criteria_strings;
use crate::errors::CapabilityError;
use crate::probes::ProbeRegistry;
use crate::task::ValidationRequest;

/// Where each candidate stands for one task
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct SelectionPlan {
    pub criteria: Vec<String>,
    /// Fresh `validated = true` for every criterion
    pub capable: Vec<String>,
    /// Some criterion has no fresh verdict yet
    pub needs_validation: Vec<String>,
    /// A fresh `validated = false` for at least one criterion
    pub rejected: Vec<String>,
}

impl SelectionPlan {
    pub fn has_capable(&self) -> bool {
        !self.capable.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Standing {
    Capable,
    Unknown,
    Rejected,
}

#[derive(Clone)]
pub struct AgentSelector {
    cache: ValidationCache,
    registry: Arc<ProbeRegistry>,
    default_max_age: Duration,
}

impl AgentSelector {
    pub fn new(cache: ValidationCache, registry: Arc<ProbeRegistry>, default_max_age: Duration) -> Self {
        Self {
            cache,
            registry,
            default_max_age,
        }
    }

    pub fn default_max_age(&self) -> Duration {
        self.default_max_age
    }

    /// Candidates, in the order given, with a fresh passing verdict for
    /// every criterion. `None` uses the selector's default max age.
    pub async fn select_capable_agents(
        &self,
        account_id: &str,
        criteria: &[String],
        candidates: &[String],
        max_age: Option<Duration>,
    ) -> Result<Vec<String>, CapabilityError> {
        let cutoff = self.cutoff(max_age);
        let mut capable = Vec::new();

        for agent_id in unique(candidates) {
            if self.standing(account_id, agent_id, criteria, cutoff).await? == Standing::Capable {
                capable.push(agent_id.to_string());
            }
        }

        tracing::debug!(
            account_id = %account_id,
            criteria_count = criteria.len(),
            candidates = candidates.len(),
            capable = capable.len(),
            "Selected capable agents"
        );
        Ok(capable)
    }

    /// Split candidates for a task. `request` is a template whose agent
    /// fields are ignored. Task types whose probe always passes put every
    /// candidate in `capable` without touching the cache.
    pub async fn plan(
        &self,
        request: &ValidationRequest,
        candidates: &[String],
        max_age: Option<Duration>,
    ) -> Result<SelectionPlan, CapabilityError> {
        let criteria = criteria_strings(&self.registry.criteria_for(request)?);
        let mut plan = SelectionPlan {
            criteria,
            ..Default::default()
        };

        if self.registry.is_always_true(request.task_type()) {
            plan.capable = unique(candidates).map(str::to_string).collect();
            return Ok(plan);
        }

        let cutoff = self.cutoff(max_age);
        for agent_id in unique(candidates) {
            let bucket = match self
                .standing(request.account_id(), agent_id, &plan.criteria, cutoff)
                .await?
            {
                Standing::Capable => &mut plan.capable,
                Standing::Unknown => &mut plan.needs_validation,
                Standing::Rejected => &mut plan.rejected,
            };
            bucket.push(agent_id.to_string());
        }

        tracing::info!(
            task_type = %request.task_type(),
            account_id = %request.account_id(),
            capable = plan.capable.len(),
            needs_validation = plan.needs_validation.len(),
            rejected = plan.rejected.len(),
            "Planned agent selection"
        );
        Ok(plan)
    }

    /// First capable candidate, or `NoReachableAgent` naming the criteria
    pub async fn require_capable_agent(
        &self,
        account_id: &str,
        criteria: &[String],
        candidates: &[String],
        max_age: Option<Duration>,
    ) -> Result<String, CapabilityError> {
        let capable = self
            .select_capable_agents(account_id, criteria, candidates, max_age)
            .await?;
        capable.into_iter().next().ok_or_else(|| {
            tracing::warn!(
                account_id = %account_id,
                criteria = ?criteria,
                candidates = candidates.len(),
                "No reachable agent"
            );
            CapabilityError::NoReachableAgent {
                criteria: criteria.to_vec(),
            }
        })
    }

    fn cutoff(&self, max_age: Option<Duration>) -> DateTime<Utc> {
        let max_age = max_age.unwrap_or(self.default_max_age);
        chrono::Duration::from_std(max_age)
            .ok()
            .and_then(|age| self.cache.now().checked_sub_signed(age))
            .unwrap_or(DateTime::<Utc>::MIN_UTC)
    }

    async fn standing(
        &self,
        account_id: &str,
        agent_id: &str,
        criteria: &[String],
        cutoff: DateTime<Utc>,
    ) -> Result<Standing, CapabilityError> {
        let found = self.cache.get_many(account_id, agent_id, criteria).await?;

        let mut standing = Standing::Capable;
        for criterion in criteria {
            match found.get(criterion).filter(|r| is_fresh(r, cutoff)) {
                Some(result) if !result.validated => return Ok(Standing::Rejected),
                Some(_) => {}
                None => standing = Standing::Unknown,
            }
        }
        Ok(standing)
    }
}

fn is_fresh(result: &ValidationResult, cutoff: DateTime<Utc>) -> bool {
    result.created_at >= cutoff
}

fn unique(candidates: &[String]) -> impl Iterator<Item = &str> {
    let mut seen = HashSet::new();
    candidates
        .iter()
        .map(String::as_str)
        .filter(move |agent| seen.insert(*agent))
}

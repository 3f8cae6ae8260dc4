// Criteria Extractor - derives the stable strings identifying the external
// dependencies a task touches. Results are cache keys: extraction must be
// pure and deterministic.

pub mod extractors;
pub mod normalize;


use serde::{Deserialize, Serialize};
use std::fmt;

use crate::errors::CapabilityError;
use crate::task::{TaskType, ValidationRequest};

pub use extractors::{
    cluster_criteria, git_criteria, http_criteria, k8s_deploy_criteria, local_criteria,
    registry_criteria, secret_manager_criteria, socket_criteria, ssh_criteria,
};

/// What kind of dependency a criterion names. Composite probes use this to
/// route each criterion to the right check.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriterionKind {
    Url,
    Socket,
    Ssh,
    Repository,
    SecretStore,
    Cluster,
    /// Co-located integration: criterion is the pinned agent name
    DelegateName,
    Registry,
    Local,
}

/// One external dependency a task needs reachable
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Criterion {
    pub kind: CriterionKind,
    pub value: String,
}

impl Criterion {
    pub fn new(kind: CriterionKind, value: impl Into<String>) -> Self {
        Self {
            kind,
            value: value.into(),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.value
    }
}

impl fmt::Display for Criterion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.value)
    }
}

/// Derives criteria from a request. Any plain function with the right
/// signature is an extractor.
pub trait CriteriaExtractor: Send + Sync {
    fn extract(&self, request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError>;
}

impl<F> CriteriaExtractor for F
where
    F: Fn(&ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> + Send + Sync,
{
    fn extract(&self, request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
        self(request)
    }
}

/// Built-in extractor for a task type
pub fn extractor_for(task_type: TaskType) -> fn(&ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    match task_type {
        TaskType::HttpCheck => http_criteria,
        TaskType::SocketCheck => socket_criteria,
        TaskType::SshCommand => ssh_criteria,
        TaskType::GitFetch => git_criteria,
        TaskType::SecretManagerValidate => secret_manager_criteria,
        TaskType::ClusterCheck => cluster_criteria,
        TaskType::ArtifactCollection => registry_criteria,
        TaskType::K8sDeploy => k8s_deploy_criteria,
        TaskType::LocalScript => local_criteria,
    }
}

/// Extract criteria with the built-in extractor for the request's task type
pub fn extract(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    extractor_for(request.task_type())(request)
}

/// Plain criteria strings, in extraction order
pub fn criteria_strings(criteria: &[Criterion]) -> Vec<String> {
    criteria.iter().map(|c| c.value.clone()).collect()
}

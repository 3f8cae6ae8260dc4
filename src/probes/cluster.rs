// Cluster control-plane and container registry probes

use async_trait::async_trait;
use reqwest::Client;
use std::time::{Duration, Instant};

use super::http::{build_client, check_status, HttpAuth};
use super::traits::{CapabilityProbe, ProbeOutcome, StatusPolicy};
use crate::criteria::{Criterion, CriterionKind};
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::{SecretRef, TaskParameter, ValidationRequest};

fn cluster_credential(request: &ValidationRequest) -> Option<SecretRef> {
    request
        .find_parameter(|p| match p {
            TaskParameter::Cluster { credential, .. } => Some(credential.clone()),
            _ => None,
        })
        .flatten()
}

fn registry_credential(request: &ValidationRequest) -> Option<SecretRef> {
    request
        .find_parameter(|p| match p {
            TaskParameter::Registry { credential, .. } => Some(credential.clone()),
            _ => None,
        })
        .flatten()
}

/// Asks the control plane for `/version` with the bearer token. A cluster
/// pinned to a named agent is decided by name alone.
pub struct ClusterProbe {
    client: Client,
    timeout: Duration,
    policy: StatusPolicy,
}

impl ClusterProbe {
    pub fn new(timeout: Duration, policy: StatusPolicy, accept_invalid_certs: bool) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout, accept_invalid_certs)?,
            timeout,
            policy,
        })
    }

    async fn check(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> Result<(), CapabilityError> {
        let auth = match cluster_credential(request) {
            Some(reference) => HttpAuth::Bearer(secrets.require(&reference)?),
            None => HttpAuth::None,
        };
        let url = format!("{}/version", criterion.as_str().trim_end_matches('/'));
        check_status(&self.client, &url, auth, &self.policy, criterion, self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl CapabilityProbe for ClusterProbe {
    fn name(&self) -> &'static str {
        "cluster"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn secret_refs(&self, request: &ValidationRequest, criterion: &Criterion) -> Vec<SecretRef> {
        // Co-located clusters need no credential
        if criterion.kind == CriterionKind::DelegateName {
            return Vec::new();
        }
        cluster_credential(request).into_iter().collect()
    }

    async fn probe(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        if criterion.kind == CriterionKind::DelegateName {
            let expected = format!("delegate:{}", request.agent_name());
            let validated = criterion.as_str() == expected;
            tracing::debug!(
                criteria = %criterion,
                agent_id = %request.agent_id(),
                validated,
                "Co-located cluster decided by agent name"
            );
            return ProbeOutcome::instant(validated);
        }

        let started = Instant::now();
        let result = self.check(request, criterion, secrets).await;
        ProbeOutcome::settle(criterion, started, result)
    }
}

/// Docker registry API v2 base endpoint. `401` with no credential still means
/// the registry answered.
pub struct ArtifactRegistryProbe {
    client: Client,
    timeout: Duration,
    policy: StatusPolicy,
}

impl ArtifactRegistryProbe {
    pub fn new(timeout: Duration, policy: StatusPolicy, accept_invalid_certs: bool) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout, accept_invalid_certs)?,
            timeout,
            policy,
        })
    }

    async fn check(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> Result<(), CapabilityError> {
        let credential = registry_credential(request);
        let (auth, policy) = match &credential {
            Some(reference) => (
                HttpAuth::from_plaintext(secrets.require(reference)?),
                // With credentials the registry must accept them
                StatusPolicy::Strict,
            ),
            None => (HttpAuth::None, self.policy.clone()),
        };
        let url = format!("{}/v2/", criterion.as_str().trim_end_matches('/'));
        check_status(&self.client, &url, auth, &policy, criterion, self.timeout).await?;
        Ok(())
    }
}

#[async_trait]
impl CapabilityProbe for ArtifactRegistryProbe {
    fn name(&self) -> &'static str {
        "artifact_registry"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    fn secret_refs(&self, request: &ValidationRequest, _criterion: &Criterion) -> Vec<SecretRef> {
        registry_credential(request).into_iter().collect()
    }

    async fn probe(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let result = self.check(request, criterion, secrets).await;
        ProbeOutcome::settle(criterion, started, result)
    }
}

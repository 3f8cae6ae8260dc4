// Task type -> (extractor, probe) table, built once at startup

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use super::always::AlwaysTrueProbe;
use super::cluster::{ArtifactRegistryProbe, ClusterProbe};
use super::composite::CompositeProbe;
use super::http::HttpProbe;
use super::scm::ScmProbe;
use super::secret_manager::{SecretManagerProbe, VaultTransitClient};
use super::socket::SocketProbe;
use super::ssh::SshProbe;
use super::traits::CapabilityProbe;
use crate::config::ProbesConfig;
use crate::criteria::{extractor_for, CriteriaExtractor, Criterion, CriterionKind};
use crate::errors::CapabilityError;
use crate::task::{TaskType, ValidationRequest};

/// Extractor and probe registered for one task type
#[derive(Clone)]
pub struct Registration {
    pub extractor: Arc<dyn CriteriaExtractor>,
    pub probe: Arc<dyn CapabilityProbe>,
}

#[derive(Clone, Default)]
pub struct ProbeRegistry {
    entries: BTreeMap<TaskType, Registration>,
}

impl ProbeRegistry {
    /// Empty registry; every lookup is `UnsupportedTaskType` until registered
    pub fn new() -> Self {
        Self::default()
    }

    /// Registry with every built-in integration
    pub fn with_defaults(config: &ProbesConfig) -> Result<Self, CapabilityError> {
        let secs = Duration::from_secs;
        let insecure = config.accept_invalid_certs;

        let http: Arc<dyn CapabilityProbe> = Arc::new(HttpProbe::new(
            secs(config.http_timeout_secs),
            config.http_status_policy.clone(),
            insecure,
        )?);
        let socket: Arc<dyn CapabilityProbe> = Arc::new(SocketProbe::new(secs(config.socket_timeout_secs)));
        let ssh: Arc<dyn CapabilityProbe> = Arc::new(SshProbe::new(secs(config.ssh_timeout_secs)));
        let scm: Arc<dyn CapabilityProbe> = Arc::new(ScmProbe::new(secs(config.scm_timeout_secs), insecure)?);
        let vault = Arc::new(VaultTransitClient::new(secs(config.secret_manager_timeout_secs), insecure)?);
        let secret_manager: Arc<dyn CapabilityProbe> =
            Arc::new(SecretManagerProbe::new(vault, secs(config.secret_manager_timeout_secs)));
        let cluster: Arc<dyn CapabilityProbe> = Arc::new(ClusterProbe::new(
            secs(config.cluster_timeout_secs),
            config.cluster_status_policy.clone(),
            insecure,
        )?);
        let artifact: Arc<dyn CapabilityProbe> = Arc::new(ArtifactRegistryProbe::new(
            secs(config.registry_timeout_secs),
            config.registry_status_policy.clone(),
            insecure,
        )?);
        let deploy: Arc<dyn CapabilityProbe> = Arc::new(
            CompositeProbe::new()
                .route(CriterionKind::Registry, artifact.clone())
                .route(CriterionKind::Cluster, cluster.clone())
                .route(CriterionKind::DelegateName, cluster.clone()),
        );

        let mut registry = Self::new();
        registry
            .register_builtin(TaskType::HttpCheck, http)
            .register_builtin(TaskType::SocketCheck, socket)
            .register_builtin(TaskType::SshCommand, ssh)
            .register_builtin(TaskType::GitFetch, scm)
            .register_builtin(TaskType::SecretManagerValidate, secret_manager)
            .register_builtin(TaskType::ClusterCheck, cluster)
            .register_builtin(TaskType::ArtifactCollection, artifact)
            .register_builtin(TaskType::K8sDeploy, deploy)
            .register_builtin(TaskType::LocalScript, Arc::new(AlwaysTrueProbe));

        tracing::debug!(task_types = registry.entries.len(), "Probe registry initialized");
        Ok(registry)
    }

    fn register_builtin(&mut self, task_type: TaskType, probe: Arc<dyn CapabilityProbe>) -> &mut Self {
        self.register(task_type, extractor_for(task_type), probe)
    }

    /// Add or replace the integration for `task_type`
    pub fn register(
        &mut self,
        task_type: TaskType,
        extractor: impl CriteriaExtractor + 'static,
        probe: Arc<dyn CapabilityProbe>,
    ) -> &mut Self {
        if self.entries.contains_key(&task_type) {
            tracing::info!(task_type = %task_type, probe = probe.name(), "Replacing registered probe");
        }
        self.entries.insert(
            task_type,
            Registration {
                extractor: Arc::new(extractor),
                probe,
            },
        );
        self
    }

    pub fn lookup(&self, task_type: TaskType) -> Result<&Registration, CapabilityError> {
        self.entries
            .get(&task_type)
            .ok_or_else(|| CapabilityError::unsupported(task_type))
    }

    /// Criteria for `request` via its registered extractor
    pub fn criteria_for(&self, request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
        self.lookup(request.task_type())?.extractor.extract(request)
    }

    pub fn is_always_true(&self, task_type: TaskType) -> bool {
        self.entries
            .get(&task_type)
            .is_some_and(|entry| entry.probe.is_always_true())
    }

    pub fn task_types(&self) -> Vec<TaskType> {
        self.entries.keys().copied().collect()
    }
}

// Routes each criterion of a multi-dependency task to the probe for its kind

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::{Criterion, CriterionKind};
use crate::secrets::ResolvedSecrets;
use crate::task::{SecretRef, ValidationRequest};

#[derive(Default)]
pub struct CompositeProbe {
    routes: HashMap<CriterionKind, Arc<dyn CapabilityProbe>>,
}

impl CompositeProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, kind: CriterionKind, probe: Arc<dyn CapabilityProbe>) -> Self {
        self.routes.insert(kind, probe);
        self
    }
}

#[async_trait]
impl CapabilityProbe for CompositeProbe {
    fn name(&self) -> &'static str {
        "composite"
    }

    fn timeout(&self) -> Duration {
        self.routes
            .values()
            .map(|probe| probe.timeout())
            .max()
            .unwrap_or(Duration::from_secs(1))
    }

    fn secret_refs(&self, request: &ValidationRequest, criterion: &Criterion) -> Vec<SecretRef> {
        self.routes
            .get(&criterion.kind)
            .map(|probe| probe.secret_refs(request, criterion))
            .unwrap_or_default()
    }

    async fn probe(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        match self.routes.get(&criterion.kind) {
            Some(probe) => probe.probe(request, criterion, secrets).await,
            None => {
                tracing::warn!(
                    criteria = %criterion,
                    kind = ?criterion.kind,
                    "No probe routed for criterion kind"
                );
                ProbeOutcome::instant(false)
            }
        }
    }
}

// Probe for task types with no external dependency

use async_trait::async_trait;
use std::time::Duration;

use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::Criterion;
use crate::secrets::ResolvedSecrets;
use crate::task::{SecretRef, ValidationRequest};

#[derive(Debug, Clone, Copy, Default)]
pub struct AlwaysTrueProbe;

#[async_trait]
impl CapabilityProbe for AlwaysTrueProbe {
    fn name(&self) -> &'static str {
        "always_true"
    }

    fn timeout(&self) -> Duration {
        Duration::from_secs(1)
    }

    fn secret_refs(&self, _request: &ValidationRequest, _criterion: &Criterion) -> Vec<SecretRef> {
        Vec::new()
    }

    fn is_always_true(&self) -> bool {
        true
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        _criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        ProbeOutcome::instant(true)
    }
}

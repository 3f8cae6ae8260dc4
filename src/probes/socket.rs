// TCP connect probe

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::net::TcpStream;

use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::ValidationRequest;

/// Connect to `address` (`host:port`, IPv6 bracketed) within `timeout`
pub(crate) async fn connect(address: &str, criterion: &Criterion, timeout: Duration) -> Result<TcpStream, CapabilityError> {
    match tokio::time::timeout(timeout, TcpStream::connect(address)).await {
        Ok(Ok(stream)) => Ok(stream),
        Ok(Err(e)) => Err(CapabilityError::ProbeNetworkError {
            criteria: criterion.to_string(),
            reason: format!("connect to {address} failed: {e}"),
        }),
        Err(_) => Err(CapabilityError::ProbeTimeout {
            criteria: criterion.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }),
    }
}

pub struct SocketProbe {
    timeout: Duration,
}

impl SocketProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl CapabilityProbe for SocketProbe {
    fn name(&self) -> &'static str {
        "socket"
    }

    fn timeout(&self) -> Duration {
        self.timeout
    }

    async fn probe(
        &self,
        _request: &ValidationRequest,
        criterion: &Criterion,
        _secrets: &ResolvedSecrets,
    ) -> ProbeOutcome {
        let started = Instant::now();
        let result = connect(criterion.as_str(), criterion, self.timeout)
            .await
            .map(drop);
        ProbeOutcome::settle(criterion, started, result)
    }
}

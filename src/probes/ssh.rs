// SSH handshake probe
//
// Reachability is proven by the server's identification line
// (`SSH-2.0-...`), answered with our own. The credential must resolve, but
// no key exchange or login is attempted.

use async_trait::async_trait;
use std::time::{Duration, Instant};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpStream;

use super::socket::connect;
use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::{TaskParameter, ValidationRequest};

/// Servers may send other lines before the identification string
const MAX_PREAMBLE_LINES: usize = 16;

/// Sent back once the server has identified itself
pub(crate) fn client_ident() -> String {
    format!("SSH-2.0-agent-reach_{}\r\n", env!("CARGO_PKG_VERSION"))
}

/// Read lines until the `SSH-` identification string shows up, then send
/// ours
pub(crate) async fn read_ssh_banner(stream: TcpStream, criterion: &Criterion) -> Result<String, CapabilityError> {
    let mut reader = BufReader::new(stream);
    let mut line = String::new();
    for _ in 0..MAX_PREAMBLE_LINES {
        line.clear();
        let read = reader
            .read_line(&mut line)
            .await
            .map_err(|e| CapabilityError::ProbeNetworkError {
                criteria: criterion.to_string(),
                reason: format!("reading SSH banner failed: {e}"),
            })?;
        if read == 0 {
            break;
        }
        if line.starts_with("SSH-") {
            reader
                .get_mut()
                .write_all(client_ident().as_bytes())
                .await
                .map_err(|e| CapabilityError::ProbeNetworkError {
                    criteria: criterion.to_string(),
                    reason: format!("sending SSH identification failed: {e}"),
                })?;
            return Ok(line.trim_end().to_string());
        }
    }
    Err(CapabilityError::ProbeNetworkError {
        criteria: criterion.to_string(),
        reason: "peer did not identify as an SSH server".to_string(),
    })
}

/// Connect to `address` and wait for an SSH identification line
pub(crate) async fn ssh_handshake(address: &str, criterion: &Criterion, timeout: Duration) -> Result<String, CapabilityError> {
    let started = Instant::now();
    let stream = connect(address, criterion, timeout).await?;
    let remaining = timeout.saturating_sub(started.elapsed());
    tokio::time::timeout(remaining, read_ssh_banner(stream, criterion))
        .await
        .map_err(|_| CapabilityError::ProbeTimeout {
            criteria: criterion.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        })?
}

pub struct SshProbe {
    timeout: Duration,
}

impl SshProbe {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }

    async fn check(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> Result<(), CapabilityError> {
        let credential = request
            .find_parameter(|p| match p {
                TaskParameter::Ssh { credential, .. } => Some(credential.clone()),
                _ => None,
            })
            .ok_or_else(|| CapabilityError::ProbeAuthError {
                criteria: criterion.to_string(),
                reason: "no SSH credential configured".to_string(),
            })?;
        secrets.require(&credential)?;

        let banner = ssh_handshake(criterion.as_str(), criterion, self.timeout).await?;
        tracing::debug!(criteria = %criterion, banner = %banner, "SSH server identified");
        Ok(())
    }
}

#[async_trait]
impl CapabilityProbe for SshProbe {
    fn name(&self) -> &'static str {
        "ssh"
    }

    fn timeout(&self) -> Duration {
        self.timeout
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

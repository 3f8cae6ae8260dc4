// Secret-manager round-trip probe
//
// Encrypts a fixed payload with the transit key and decrypts it again. The
// manager is only "reachable" when the plaintext survives the round trip.

use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use std::time::{Duration, Instant};

use super::http::{build_client, classify_reqwest_error};
use super::traits::{CapabilityProbe, ProbeOutcome};
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::{TaskParameter, ValidationRequest};

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// base64("agent-reach-probe")
pub const PROBE_PAYLOAD: &str = "YWdlbnQtcmVhY2gtcHJvYmU=";

/// Narrow client for a transit-style encryption service. Payloads are
/// base64 strings, as on the wire.
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SecretManagerClient: Send + Sync {
    async fn encrypt(&self, base_url: &str, key_name: &str, token: &str, plaintext: &str) -> Result<String, CapabilityError>;

    async fn decrypt(&self, base_url: &str, key_name: &str, token: &str, ciphertext: &str) -> Result<String, CapabilityError>;
}

#[derive(Debug, Deserialize)]
struct TransitResponse<T> {
    data: T,
}

#[derive(Debug, Deserialize)]
struct EncryptData {
    ciphertext: String,
}

#[derive(Debug, Deserialize)]
struct DecryptData {
    plaintext: String,
}

/// HashiCorp Vault transit engine over HTTP
pub struct VaultTransitClient {
    client: Client,
    timeout: Duration,
}

impl VaultTransitClient {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout, accept_invalid_certs)?,
            timeout,
        })
    }

    async fn post<T: for<'de> Deserialize<'de>>(
        &self,
        url: String,
        token: &str,
        body: serde_json::Value,
    ) -> Result<T, CapabilityError> {
        let criterion = Criterion::new(crate::criteria::CriterionKind::SecretStore, url.clone());
        let response = self
            .client
            .post(&url)
            .header("X-Vault-Token", token)
            .json(&body)
            .send()
            .await
            .map_err(|e| classify_reqwest_error(&criterion, self.timeout, e))?;

        let status = response.status();
        if status == reqwest::StatusCode::FORBIDDEN || status == reqwest::StatusCode::UNAUTHORIZED {
            return Err(CapabilityError::ProbeAuthError {
                criteria: url,
                reason: format!("vault answered {status}"),
            });
        }
        if !status.is_success() {
            return Err(CapabilityError::ProbeNetworkError {
                criteria: url,
                reason: format!("vault answered {status}"),
            });
        }

        let parsed: TransitResponse<T> = response.json().await.map_err(|e| CapabilityError::ProbeNetworkError {
            criteria: url.clone(),
            reason: format!("unexpected vault response: {e}"),
        })?;
        Ok(parsed.data)
    }
}

#[async_trait]
impl SecretManagerClient for VaultTransitClient {
    async fn encrypt(&self, base_url: &str, key_name: &str, token: &str, plaintext: &str) -> Result<String, CapabilityError> {
        let url = format!("{}/v1/transit/encrypt/{}", base_url.trim_end_matches('/'), key_name);
        let data: EncryptData = self.post(url, token, json!({ "plaintext": plaintext })).await?;
        Ok(data.ciphertext)
    }

    async fn decrypt(&self, base_url: &str, key_name: &str, token: &str, ciphertext: &str) -> Result<String, CapabilityError> {
        let url = format!("{}/v1/transit/decrypt/{}", base_url.trim_end_matches('/'), key_name);
        let data: DecryptData = self.post(url, token, json!({ "ciphertext": ciphertext })).await?;
        Ok(data.plaintext)
    }
}

/// Split `<base-url>#transit/<key>` back into its parts
pub fn parse_transit_criterion(criterion: &str) -> Option<(&str, &str)> {
    let (base, key) = criterion.split_once("#transit/")?;
    if base.is_empty() || key.is_empty() {
        return None;
    }
    Some((base, key))
}

pub struct SecretManagerProbe {
    client: Arc<dyn SecretManagerClient>,
    timeout: Duration,
}

impl SecretManagerProbe {
    pub fn new(client: Arc<dyn SecretManagerClient>, timeout: Duration) -> Self {
        Self { client, timeout }
    }

    async fn check(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> Result<(), CapabilityError> {
        let (base_url, key_name) =
            parse_transit_criterion(criterion.as_str()).ok_or_else(|| CapabilityError::ProbeNetworkError {
                criteria: criterion.to_string(),
                reason: "not a transit criterion".to_string(),
            })?;
        let token_ref = request
            .find_parameter(|p| match p {
                TaskParameter::SecretManager { token, .. } => Some(token.clone()),
                _ => None,
            })
            .ok_or_else(|| CapabilityError::ProbeAuthError {
                criteria: criterion.to_string(),
                reason: "no secret manager token configured".to_string(),
            })?;
        let token = secrets.require(&token_ref)?;

        let ciphertext = self.client.encrypt(base_url, key_name, token, PROBE_PAYLOAD).await?;
        let plaintext = self.client.decrypt(base_url, key_name, token, &ciphertext).await?;
        if plaintext != PROBE_PAYLOAD {
            return Err(CapabilityError::ProbeNetworkError {
                criteria: criterion.to_string(),
                reason: "round trip returned a different payload".to_string(),
            });
        }
        Ok(())
    }
}

#[async_trait]
impl CapabilityProbe for SecretManagerProbe {
    fn name(&self) -> &'static str {
        "secret_manager"
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

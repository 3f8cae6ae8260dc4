// SCM remote listing probe
//
// HTTP(S) remotes are asked for their ref advertisement over the smart-HTTP
// protocol. ssh:// remotes get an SSH handshake; git:// remotes a TCP connect.

use async_trait::async_trait;
use reqwest::{Client, Url};
use std::time::{Duration, Instant};

use super::http::{build_client, check_status, HttpAuth};
use super::socket::connect;
use super::ssh::ssh_handshake;
use super::traits::{CapabilityProbe, ProbeOutcome, StatusPolicy};
use crate::criteria::normalize::host_and_port;
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::{TaskParameter, ValidationRequest};

/// Username sent with a bare token over HTTP basic auth
const TOKEN_USERNAME: &str = "x-access-token";

pub struct ScmProbe {
    client: Client,
    timeout: Duration,
}

impl ScmProbe {
    pub fn new(timeout: Duration, accept_invalid_certs: bool) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout, accept_invalid_certs)?,
            timeout,
        })
    }

    /// `<repo>/info/refs?service=git-upload-pack`
    pub fn ref_listing_url(repository: &str) -> Result<String, CapabilityError> {
        let mut url = Url::parse(repository).map_err(|e| CapabilityError::ProbeNetworkError {
            criteria: repository.to_string(),
            reason: format!("unparseable repository URL: {e}"),
        })?;
        let path = format!("{}/info/refs", url.path().trim_end_matches('/'));
        url.set_path(&path);
        url.set_query(Some("service=git-upload-pack"));
        Ok(url.to_string())
    }

    async fn check(
        &self,
        request: &ValidationRequest,
        criterion: &Criterion,
        secrets: &ResolvedSecrets,
    ) -> Result<(), CapabilityError> {
        let credential = request
            .find_parameter(|p| match p {
                TaskParameter::GitRepo { credential, .. } => Some(credential.clone()),
                _ => None,
            })
            .flatten();
        let plaintext = match &credential {
            Some(reference) => Some(secrets.require(reference)?),
            None => None,
        };

        let repository = criterion.as_str();
        if repository.starts_with("http://") || repository.starts_with("https://") {
            let auth = match plaintext {
                Some(secret) if secret.contains(':') => HttpAuth::from_plaintext(secret),
                Some(token) => HttpAuth::Basic(TOKEN_USERNAME, token),
                None => HttpAuth::None,
            };
            let url = Self::ref_listing_url(repository)?;
            check_status(&self.client, &url, auth, &StatusPolicy::Strict, criterion, self.timeout).await?;
            return Ok(());
        }

        let (host, port) = host_and_port(repository).ok_or_else(|| CapabilityError::ProbeNetworkError {
            criteria: criterion.to_string(),
            reason: "repository URL has no reachable host".to_string(),
        })?;
        let address = if host.contains(':') {
            format!("[{host}]:{port}")
        } else {
            format!("{host}:{port}")
        };

        if repository.starts_with("ssh://") {
            ssh_handshake(&address, criterion, self.timeout).await.map(drop)
        } else {
            connect(&address, criterion, self.timeout).await.map(drop)
        }
    }
}

#[async_trait]
impl CapabilityProbe for ScmProbe {
    fn name(&self) -> &'static str {
        "scm"
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

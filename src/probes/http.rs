// HTTP reachability probe and the shared request helpers the other
// HTTP-speaking probes build on

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, StatusCode};
use std::time::{Duration, Instant};

use super::traits::{CapabilityProbe, ProbeOutcome, StatusPolicy};
use crate::criteria::Criterion;
use crate::errors::CapabilityError;
use crate::secrets::ResolvedSecrets;
use crate::task::ValidationRequest;

pub(crate) const USER_AGENT: &str = concat!("agent-reach/", env!("CARGO_PKG_VERSION"));

/// HTTP client with the probe's timeout baked in
pub(crate) fn build_client(timeout: Duration, accept_invalid_certs: bool) -> Result<Client, CapabilityError> {
    Client::builder()
        .timeout(timeout)
        .connect_timeout(timeout)
        .user_agent(USER_AGENT)
        .danger_accept_invalid_certs(accept_invalid_certs)
        .build()
        .map_err(|e| CapabilityError::Config(format!("failed to build HTTP client: {e}")))
}

/// Credential material for an HTTP probe
#[derive(Debug, Clone, Copy)]
pub(crate) enum HttpAuth<'a> {
    None,
    Bearer(&'a str),
    Basic(&'a str, &'a str),
}

impl<'a> HttpAuth<'a> {
    /// `user:password` plaintext becomes basic auth, anything else a bearer token
    pub(crate) fn from_plaintext(plaintext: &'a str) -> Self {
        match plaintext.split_once(':') {
            Some((user, password)) if !user.is_empty() => HttpAuth::Basic(user, password),
            _ => HttpAuth::Bearer(plaintext),
        }
    }

    fn apply(self, builder: RequestBuilder) -> RequestBuilder {
        match self {
            HttpAuth::None => builder,
            HttpAuth::Bearer(token) => builder.bearer_auth(token),
            HttpAuth::Basic(user, password) => builder.basic_auth(user, Some(password)),
        }
    }
}

pub(crate) fn classify_reqwest_error(criterion: &Criterion, timeout: Duration, e: reqwest::Error) -> CapabilityError {
    if e.is_timeout() {
        CapabilityError::ProbeTimeout {
            criteria: criterion.to_string(),
            timeout_ms: timeout.as_millis() as u64,
        }
    } else {
        CapabilityError::ProbeNetworkError {
            criteria: criterion.to_string(),
            reason: e.to_string(),
        }
    }
}

/// GET `url` and judge the status with `policy`
pub(crate) async fn check_status(
    client: &Client,
    url: &str,
    auth: HttpAuth<'_>,
    policy: &StatusPolicy,
    criterion: &Criterion,
    timeout: Duration,
) -> Result<StatusCode, CapabilityError> {
    let response = auth
        .apply(client.get(url))
        .send()
        .await
        .map_err(|e| classify_reqwest_error(criterion, timeout, e))?;

    let status = response.status();
    if policy.is_reachable(status.as_u16()) {
        return Ok(status);
    }

    match status {
        StatusCode::UNAUTHORIZED | StatusCode::FORBIDDEN => Err(CapabilityError::ProbeAuthError {
            criteria: criterion.to_string(),
            reason: format!("{url} answered {status}"),
        }),
        _ => Err(CapabilityError::ProbeNetworkError {
            criteria: criterion.to_string(),
            reason: format!("{url} answered {status}"),
        }),
    }
}

/// Plain reachability of the criterion URL
pub struct HttpProbe {
    client: Client,
    timeout: Duration,
    policy: StatusPolicy,
}

impl HttpProbe {
    pub fn new(timeout: Duration, policy: StatusPolicy, accept_invalid_certs: bool) -> Result<Self, CapabilityError> {
        Ok(Self {
            client: build_client(timeout, accept_invalid_certs)?,
            timeout,
            policy,
        })
    }
}

#[async_trait]
impl CapabilityProbe for HttpProbe {
    fn name(&self) -> &'static str {
        "http"
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
        let result = check_status(
            &self.client,
            criterion.as_str(),
            HttpAuth::None,
            &self.policy,
            criterion,
            self.timeout,
        )
        .await
        .map(|status| {
            tracing::debug!(criteria = %criterion, status = status.as_u16(), "HTTP endpoint answered");
        });
        ProbeOutcome::settle(criterion, started, result)
    }
}

// Secret Resolution Adapter
//
// Decryption itself lives outside this crate. Probes only ever see the
// plaintext through `ResolvedSecrets`, and plaintext never reaches a log line.

use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;

use crate::errors::CapabilityError;
use crate::task::SecretRef;

#[cfg(any(test, feature = "testing"))]
use mockall::automock;

/// Env var prefix read by [`EnvSecretResolver`]
pub const ENV_SECRET_PREFIX: &str = "AGENT_REACH_SECRET_";

/// Plaintext secrets keyed by reference name
#[derive(Clone, Default, PartialEq, Eq)]
pub struct ResolvedSecrets {
    values: HashMap<String, String>,
}

impl ResolvedSecrets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, reference: &SecretRef, plaintext: impl Into<String>) {
        self.values.insert(reference.as_str().to_string(), plaintext.into());
    }

    pub fn get(&self, reference: &SecretRef) -> Option<&str> {
        self.values.get(reference.as_str()).map(String::as_str)
    }

    /// Like [`get`](Self::get) but a missing secret is an error
    pub fn require(&self, reference: &SecretRef) -> Result<&str, CapabilityError> {
        self.get(reference).ok_or_else(|| CapabilityError::SecretResolutionFailure {
            reason: format!("{reference} was not resolved"),
        })
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }
}

impl fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.values.keys().collect();
        names.sort();
        f.debug_struct("ResolvedSecrets")
            .field("names", &names)
            .finish()
    }
}

/// Turns encrypted references into plaintext
#[cfg_attr(any(test, feature = "testing"), automock)]
#[async_trait]
pub trait SecretResolver: Send + Sync {
    /// Resolve every reference or fail as a whole
    async fn resolve(&self, refs: &[SecretRef]) -> Result<ResolvedSecrets, CapabilityError>;
}

/// In-memory resolver, used by the CLI and tests
#[derive(Debug, Clone, Default)]
pub struct StaticSecretResolver {
    secrets: HashMap<String, String>,
}

impl StaticSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_secret(mut self, name: impl Into<String>, plaintext: impl Into<String>) -> Self {
        self.secrets.insert(name.into(), plaintext.into());
        self
    }
}

#[async_trait]
impl SecretResolver for StaticSecretResolver {
    async fn resolve(&self, refs: &[SecretRef]) -> Result<ResolvedSecrets, CapabilityError> {
        let mut resolved = ResolvedSecrets::new();
        for reference in refs {
            let value = self.secrets.get(reference.as_str()).ok_or_else(|| {
                CapabilityError::SecretResolutionFailure {
                    reason: format!("unknown {reference}"),
                }
            })?;
            resolved.insert(reference, value.clone());
        }
        Ok(resolved)
    }
}

/// Reads `AGENT_REACH_SECRET_<NAME>` where `<NAME>` is the reference name
/// upper-cased with every non-alphanumeric character replaced by `_`.
#[derive(Debug, Clone)]
pub struct EnvSecretResolver {
    prefix: String,
}

impl Default for EnvSecretResolver {
    fn default() -> Self {
        Self {
            prefix: ENV_SECRET_PREFIX.to_string(),
        }
    }
}

impl EnvSecretResolver {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self { prefix: prefix.into() }
    }

    pub fn variable_name(&self, reference: &SecretRef) -> String {
        let suffix: String = reference
            .as_str()
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
            .collect();
        format!("{}{}", self.prefix, suffix)
    }
}

#[async_trait]
impl SecretResolver for EnvSecretResolver {
    async fn resolve(&self, refs: &[SecretRef]) -> Result<ResolvedSecrets, CapabilityError> {
        let mut resolved = ResolvedSecrets::new();
        for reference in refs {
            let var = self.variable_name(reference);
            let value = std::env::var(&var).map_err(|_| CapabilityError::SecretResolutionFailure {
                reason: format!("{reference} not found in environment ({var})"),
            })?;
            resolved.insert(reference, value);
        }
        tracing::debug!(count = resolved.len(), "Resolved secrets from environment");
        Ok(resolved)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_static_resolver_resolves_known_refs() {
        let resolver = StaticSecretResolver::new().with_secret("vault-token", "s.abc");
        let resolved = resolver.resolve(&[SecretRef::new("vault-token")]).await.unwrap();
        assert_eq!(resolved.get(&SecretRef::new("vault-token")), Some("s.abc"));
    }

    #[tokio::test]
    async fn test_static_resolver_fails_whole_batch_on_unknown_ref() {
        let resolver = StaticSecretResolver::new().with_secret("a", "1");
        let err = resolver
            .resolve(&[SecretRef::new("a"), SecretRef::new("b")])
            .await
            .unwrap_err();
        assert!(matches!(err, CapabilityError::SecretResolutionFailure { .. }));
    }

    #[tokio::test]
    async fn test_env_resolver_reads_prefixed_vars() {
        let resolver = EnvSecretResolver::with_prefix("AGENT_REACH_TEST_SECRET_");
        let reference = SecretRef::new("kube-token.prod");
        assert_eq!(
            resolver.variable_name(&reference),
            "AGENT_REACH_TEST_SECRET_KUBE_TOKEN_PROD"
        );

        std::env::set_var("AGENT_REACH_TEST_SECRET_KUBE_TOKEN_PROD", "tok");
        let resolved = resolver.resolve(&[reference.clone()]).await.unwrap();
        assert_eq!(resolved.get(&reference), Some("tok"));
        std::env::remove_var("AGENT_REACH_TEST_SECRET_KUBE_TOKEN_PROD");
    }

    #[tokio::test]
    async fn test_env_resolver_missing_var_fails() {
        let resolver = EnvSecretResolver::with_prefix("AGENT_REACH_TEST_MISSING_");
        assert!(resolver.resolve(&[SecretRef::new("nope")]).await.is_err());
    }

    #[test]
    fn test_empty_batch_resolves_to_nothing() {
        tokio_test::block_on(async {
            let resolved = EnvSecretResolver::new().resolve(&[]).await.unwrap();
            assert!(resolved.is_empty());
        });
    }

    #[test]
    fn test_debug_output_never_contains_plaintext() {
        let mut resolved = ResolvedSecrets::new();
        resolved.insert(&SecretRef::new("token"), "super-secret-value");
        let rendered = format!("{resolved:?}");
        assert!(rendered.contains("token"));
        assert!(!rendered.contains("super-secret-value"));
    }
}

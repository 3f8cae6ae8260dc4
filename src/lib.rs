// Agent Reach Library - capability validation for agent dispatch
// Exposes the core components for embedding in a dispatcher and for testing

pub mod cache;
pub mod config;
pub mod criteria;
pub mod dispatch;
pub mod errors;
pub mod observability;
pub mod probes;
pub mod runner;
pub mod secrets;
pub mod task;
pub mod telemetry;

// Re-export key types for easy access
pub use cache::{CacheKey, ValidationCache, ValidationResult, ValidationStore};
pub use config::{config, AgentReachConfig};
pub use criteria::{Criterion, CriterionKind, CriteriaExtractor};
pub use dispatch::{AgentSelector, SelectionPlan};
pub use errors::CapabilityError;
pub use observability::{validation_metrics, OperationTimer, ValidationMetrics};
pub use probes::{CapabilityProbe, ProbeOutcome, ProbeRegistry, StatusPolicy};
pub use runner::{CompletionCallback, ValidationHandle, ValidationRunner};
pub use secrets::{EnvSecretResolver, ResolvedSecrets, SecretResolver, StaticSecretResolver};
pub use task::{SecretRef, TaskParameter, TaskType, ValidationRequest};
pub use telemetry::{create_validation_span, generate_correlation_id, init_telemetry};

// Capability probes - one reachability strategy per integration kind,
// selected by task type through the ProbeRegistry

pub mod always;
pub mod cluster;
pub mod composite;
pub mod http;
pub mod registry;
pub mod scm;
pub mod secret_manager;
pub mod socket;
pub mod ssh;
pub mod traits;

#[cfg(any(test, feature = "testing"))]
pub mod mocks;


pub use always::AlwaysTrueProbe;
pub use cluster::{ArtifactRegistryProbe, ClusterProbe};
pub use composite::CompositeProbe;
pub use http::HttpProbe;
pub use registry::{ProbeRegistry, Registration};
pub use scm::ScmProbe;
pub use secret_manager::{SecretManagerClient, SecretManagerProbe, VaultTransitClient};
pub use socket::SocketProbe;
pub use ssh::SshProbe;
pub use traits::{CapabilityProbe, ProbeOutcome, StatusPolicy};

// Core types describing a task that needs an agent capability check

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::errors::CapabilityError;

/// Task type tag, one per integration kind
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum TaskType {
    HttpCheck,
    SocketCheck,
    SshCommand,
    GitFetch,
    SecretManagerValidate,
    ClusterCheck,
    ArtifactCollection,
    K8sDeploy,
    LocalScript,
}

impl TaskType {
    pub const ALL: [TaskType; 9] = [
        TaskType::HttpCheck,
        TaskType::SocketCheck,
        TaskType::SshCommand,
        TaskType::GitFetch,
        TaskType::SecretManagerValidate,
        TaskType::ClusterCheck,
        TaskType::ArtifactCollection,
        TaskType::K8sDeploy,
        TaskType::LocalScript,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskType::HttpCheck => "HTTP_CHECK",
            TaskType::SocketCheck => "SOCKET_CHECK",
            TaskType::SshCommand => "SSH_COMMAND",
            TaskType::GitFetch => "GIT_FETCH",
            TaskType::SecretManagerValidate => "SECRET_MANAGER_VALIDATE",
            TaskType::ClusterCheck => "CLUSTER_CHECK",
            TaskType::ArtifactCollection => "ARTIFACT_COLLECTION",
            TaskType::K8sDeploy => "K8S_DEPLOY",
            TaskType::LocalScript => "LOCAL_SCRIPT",
        }
    }
}

impl fmt::Display for TaskType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TaskType {
    type Err = CapabilityError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let wanted = s.trim().to_ascii_uppercase();
        TaskType::ALL
            .iter()
            .copied()
            .find(|task_type| task_type.as_str() == wanted)
            .ok_or_else(|| CapabilityError::unsupported(s))
    }
}

/// Reference to encrypted credential material, resolved before probing
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SecretRef(pub String);

impl SecretRef {
    pub fn new(name: impl Into<String>) -> Self {
        SecretRef(name.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SecretRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print anything but the reference name
        write!(f, "secret:{}", self.0)
    }
}

/// Typed task parameters. The framework treats them as opaque; only the
/// extractor and probe registered for the task type interpret them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TaskParameter {
    Http {
        url: String,
    },
    Socket {
        host: String,
        port: u16,
    },
    Ssh {
        host: String,
        #[serde(default = "default_ssh_port")]
        port: u16,
        username: String,
        credential: SecretRef,
    },
    GitRepo {
        url: String,
        #[serde(default)]
        credential: Option<SecretRef>,
    },
    SecretManager {
        url: String,
        key_name: String,
        token: SecretRef,
    },
    Cluster {
        master_url: String,
        #[serde(default)]
        credential: Option<SecretRef>,
        /// Set when the cluster is co-located with (pinned to) a named agent
        #[serde(default)]
        delegate_name: Option<String>,
    },
    Registry {
        url: String,
        #[serde(default)]
        credential: Option<SecretRef>,
    },
}

fn default_ssh_port() -> u16 {
    22
}

impl TaskParameter {
    /// Secret references this parameter depends on
    pub fn secret_refs(&self) -> Vec<SecretRef> {
        match self {
            TaskParameter::Ssh { credential, .. } => vec![credential.clone()],
            TaskParameter::SecretManager { token, .. } => vec![token.clone()],
            TaskParameter::GitRepo { credential, .. }
            | TaskParameter::Cluster { credential, .. }
            | TaskParameter::Registry { credential, .. } => credential.iter().cloned().collect(),
            TaskParameter::Http { .. } | TaskParameter::Socket { .. } => Vec::new(),
        }
    }
}

/// One dispatch attempt's request to check an agent. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationRequest {
    task_type: TaskType,
    #[serde(default)]
    parameters: Vec<TaskParameter>,
    account_id: String,
    #[serde(default)]
    agent_id: String,
    #[serde(default)]
    agent_name: Option<String>,
}

impl ValidationRequest {
    pub fn new(
        task_type: TaskType,
        parameters: Vec<TaskParameter>,
        account_id: impl Into<String>,
        agent_id: impl Into<String>,
    ) -> Self {
        Self {
            task_type,
            parameters,
            account_id: account_id.into(),
            agent_id: agent_id.into(),
            agent_name: None,
        }
    }

    /// Attach the agent's declared name, used by co-located integrations
    pub fn with_agent_name(mut self, name: impl Into<String>) -> Self {
        self.agent_name = Some(name.into());
        self
    }

    /// Same task, different target agent
    pub fn for_agent(&self, agent_id: impl Into<String>) -> Self {
        Self {
            agent_id: agent_id.into(),
            agent_name: None,
            ..self.clone()
        }
    }

    pub fn task_type(&self) -> TaskType {
        self.task_type
    }

    pub fn parameters(&self) -> &[TaskParameter] {
        &self.parameters
    }

    pub fn account_id(&self) -> &str {
        &self.account_id
    }

    pub fn agent_id(&self) -> &str {
        &self.agent_id
    }

    /// Declared agent name, falling back to the agent id
    pub fn agent_name(&self) -> &str {
        self.agent_name.as_deref().unwrap_or(&self.agent_id)
    }

    /// Every secret reference across all parameters, de-duplicated and ordered
    pub fn secret_refs(&self) -> Vec<SecretRef> {
        let mut refs: Vec<SecretRef> = self
            .parameters
            .iter()
            .flat_map(TaskParameter::secret_refs)
            .collect();
        refs.sort();
        refs.dedup();
        refs
    }

    /// First parameter matching `pick`
    pub fn find_parameter<T>(&self, pick: impl Fn(&TaskParameter) -> Option<T>) -> Option<T> {
        self.parameters.iter().find_map(pick)
    }
}

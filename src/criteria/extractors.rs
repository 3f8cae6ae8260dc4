// One extractor per integration kind

use super::normalize::{normalize_git_url, normalize_url, socket_address};
use super::{Criterion, CriterionKind};
use crate::errors::CapabilityError;
use crate::task::{TaskParameter, ValidationRequest};

fn invalid(request: &ValidationRequest, reason: impl Into<String>) -> CapabilityError {
    CapabilityError::invalid_parameters(request.task_type(), reason)
}

fn missing(request: &ValidationRequest, what: &str) -> CapabilityError {
    invalid(request, format!("missing {what} parameter"))
}

pub fn http_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let url = request
        .find_parameter(|p| match p {
            TaskParameter::Http { url } => Some(url.clone()),
            _ => None,
        })
        .ok_or_else(|| missing(request, "http"))?;

    let normalized = normalize_url(&url).map_err(|e| invalid(request, e))?;
    Ok(vec![Criterion::new(CriterionKind::Url, normalized)])
}

pub fn socket_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let (host, port) = request
        .find_parameter(|p| match p {
            TaskParameter::Socket { host, port } => Some((host.clone(), *port)),
            _ => None,
        })
        .ok_or_else(|| missing(request, "socket"))?;

    let address = socket_address(&host, port).map_err(|e| invalid(request, e))?;
    Ok(vec![Criterion::new(CriterionKind::Socket, address)])
}

pub fn ssh_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let (host, port) = request
        .find_parameter(|p| match p {
            TaskParameter::Ssh { host, port, .. } => Some((host.clone(), *port)),
            _ => None,
        })
        .ok_or_else(|| missing(request, "ssh"))?;

    let address = socket_address(&host, port).map_err(|e| invalid(request, e))?;
    Ok(vec![Criterion::new(CriterionKind::Ssh, address)])
}

pub fn git_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let url = request
        .find_parameter(|p| match p {
            TaskParameter::GitRepo { url, .. } => Some(url.clone()),
            _ => None,
        })
        .ok_or_else(|| missing(request, "git_repo"))?;

    let normalized = normalize_git_url(&url).map_err(|e| invalid(request, e))?;
    Ok(vec![Criterion::new(CriterionKind::Repository, normalized)])
}

pub fn secret_manager_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let (url, key_name) = request
        .find_parameter(|p| match p {
            TaskParameter::SecretManager { url, key_name, .. } => Some((url.clone(), key_name.clone())),
            _ => None,
        })
        .ok_or_else(|| missing(request, "secret_manager"))?;

    let key_name = key_name.trim();
    if key_name.is_empty() {
        return Err(invalid(request, "empty transit key name"));
    }
    let base = normalize_url(&url).map_err(|e| invalid(request, e))?;
    Ok(vec![Criterion::new(
        CriterionKind::SecretStore,
        format!("{base}#transit/{key_name}"),
    )])
}

/// Cluster criterion. A cluster pinned to a named agent is identified by that
/// name instead of its master URL, since reachability is decided by name.
fn cluster_criterion(request: &ValidationRequest) -> Result<Criterion, CapabilityError> {
    let (master_url, delegate_name) = request
        .find_parameter(|p| match p {
            TaskParameter::Cluster {
                master_url,
                delegate_name,
                ..
            } => Some((master_url.clone(), delegate_name.clone())),
            _ => None,
        })
        .ok_or_else(|| missing(request, "cluster"))?;

    if let Some(name) = delegate_name.as_deref().map(str::trim).filter(|n| !n.is_empty()) {
        return Ok(Criterion::new(CriterionKind::DelegateName, format!("delegate:{name}")));
    }

    let normalized = normalize_url(&master_url).map_err(|e| invalid(request, e))?;
    Ok(Criterion::new(CriterionKind::Cluster, normalized))
}

pub fn cluster_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    Ok(vec![cluster_criterion(request)?])
}

fn registry_criterion(request: &ValidationRequest) -> Option<Result<Criterion, CapabilityError>> {
    let url = request.find_parameter(|p| match p {
        TaskParameter::Registry { url, .. } => Some(url.clone()),
        _ => None,
    })?;

    Some(
        normalize_url(&url)
            .map(|normalized| Criterion::new(CriterionKind::Registry, normalized))
            .map_err(|e| invalid(request, e)),
    )
}

pub fn registry_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let criterion = registry_criterion(request).ok_or_else(|| missing(request, "registry"))??;
    Ok(vec![criterion])
}

/// A deployment needs the cluster and, when images come from a private
/// registry, the registry too. Both must validate (AND).
pub fn k8s_deploy_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    let mut criteria = Vec::with_capacity(2);
    if let Some(registry) = registry_criterion(request) {
        criteria.push(registry?);
    }
    criteria.push(cluster_criterion(request)?);
    Ok(criteria)
}

pub fn local_criteria(request: &ValidationRequest) -> Result<Vec<Criterion>, CapabilityError> {
    Ok(vec![Criterion::new(
        CriterionKind::Local,
        request.task_type().as_str(),
    )])
}

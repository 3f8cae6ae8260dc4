// Normalisation helpers. Criteria strings are cache keys, so every helper
// here must be deterministic and insensitive to cosmetic input differences.

use reqwest::Url;

/// Normalise an HTTP(S) endpoint into a stable criteria string.
///
/// Lower-cases scheme and host, drops default ports, credentials, query and
/// fragment, and trims a trailing slash from non-root paths. Bare hosts
/// (`registry.example.com`) are treated as `https://`.
pub fn normalize_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty URL".to_string());
    }

    let candidate = if trimmed.contains("://") {
        trimmed.to_string()
    } else {
        format!("https://{trimmed}")
    };

    let mut url = Url::parse(&candidate).map_err(|e| format!("invalid URL '{trimmed}': {e}"))?;
    if url.host_str().is_none() {
        return Err(format!("URL '{trimmed}' has no host"));
    }

    let _ = url.set_username("");
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);

    let path = url.path().to_string();
    if path.len() > 1 && path.ends_with('/') {
        url.set_path(path.trim_end_matches('/'));
    }

    Ok(url.to_string())
}

/// `host:port` with a lower-cased host; IPv6 literals are bracketed
pub fn socket_address(host: &str, port: u16) -> Result<String, String> {
    let host = host.trim().trim_start_matches('[').trim_end_matches(']');
    if host.is_empty() {
        return Err("empty host".to_string());
    }
    if host.chars().any(char::is_whitespace) || host.contains('/') {
        return Err(format!("invalid host '{host}'"));
    }

    let host = host.to_ascii_lowercase();
    if host.contains(':') {
        Ok(format!("[{host}]:{port}"))
    } else {
        Ok(format!("{host}:{port}"))
    }
}

/// Normalise a git remote.
///
/// scp-style remotes (`git@github.com:org/repo.git`) become
/// `ssh://git@github.com/org/repo.git`; HTTP(S) remotes go through
/// [`normalize_url`]. The ssh user is kept because it selects the account
/// the remote authenticates.
pub fn normalize_git_url(raw: &str) -> Result<String, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("empty repository URL".to_string());
    }

    if let Some((user_host, path)) = split_scp_like(trimmed) {
        let ssh = format!("ssh://{user_host}/{}", path.trim_start_matches('/'));
        return normalize_ssh_url(&ssh);
    }

    if trimmed.starts_with("ssh://") || trimmed.starts_with("git://") {
        return normalize_ssh_url(trimmed);
    }

    normalize_url(trimmed)
}

fn normalize_ssh_url(raw: &str) -> Result<String, String> {
    let mut url = Url::parse(raw).map_err(|e| format!("invalid repository URL '{raw}': {e}"))?;
    if url.host_str().is_none() {
        return Err(format!("repository URL '{raw}' has no host"));
    }
    let _ = url.set_password(None);
    url.set_query(None);
    url.set_fragment(None);

    let host = url.host_str().unwrap_or_default().to_ascii_lowercase();
    let user = url.username();
    let port = url.port().map(|p| format!(":{p}")).unwrap_or_default();
    let path = url.path().trim_end_matches('/');
    let userinfo = if user.is_empty() {
        String::new()
    } else {
        format!("{user}@")
    };

    Ok(format!("{}://{userinfo}{host}{port}{path}", url.scheme()))
}

/// `user@host:path` without a scheme, as accepted by git
fn split_scp_like(raw: &str) -> Option<(&str, &str)> {
    if raw.contains("://") {
        return None;
    }
    let colon = raw.find(':')?;
    // A slash before the colon means a local path, not an scp remote
    if raw[..colon].contains('/') {
        return None;
    }
    let (user_host, path) = (&raw[..colon], &raw[colon + 1..]);
    if user_host.is_empty() || path.is_empty() {
        return None;
    }
    Some((user_host, path))
}

/// Host and port an HTTP(S)/SSH criteria string points at
pub fn host_and_port(normalized: &str) -> Option<(String, u16)> {
    let url = Url::parse(normalized).ok()?;
    let host = url.host_str()?.trim_start_matches('[').trim_end_matches(']').to_string();
    let port = url.port_or_known_default().or_else(|| match url.scheme() {
        "ssh" => Some(22),
        "git" => Some(9418),
        _ => None,
    })?;
    Some((host, port))
}

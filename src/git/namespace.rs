//! Namespace derivation and clone URL handling.
//!
//! A namespace is the reversed `repo.org.host` form of a repository
//! location, so `https://github.com/acme/site` and
//! `git@github.com:acme/site.git` land in the same tenant.

use std::sync::LazyLock;

use regex::Regex;

static SHORTHAND: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^[A-Za-z0-9_.-]+/[A-Za-z0-9_.-]+$").expect("valid regex"));

static HOST_PATH: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z0-9-]+(\.[A-Za-z0-9-]+)+/[A-Za-z0-9_.-]+/[A-Za-z0-9_./-]+$")
        .expect("valid regex")
});

/// Derive a namespace from a remote URL, shorthand or local path.
///
/// - `scheme://host/org/repo[.git]` → `repo.org.host`
/// - `git@host:org/repo.git` → `repo.org.host`
/// - `host.tld/org/repo` → `repo.org.host.tld`
/// - `org/repo` (or a local path) → `repo.org.local`
#[must_use]
pub fn derive_namespace(location: &str) -> String {
    let trimmed = location.trim().trim_end_matches('/');
    let trimmed = trimmed.strip_suffix(".git").unwrap_or(trimmed);

    let (host, path) = split_host(trimmed);
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();

    let (org, repo) = match segments.as_slice() {
        [] => (None, "repo"),
        [repo] => (None, *repo),
        [.., org, repo] => (Some(*org), *repo),
    };

    let host = host.unwrap_or("local");
    match org {
        Some(org) => format!("{repo}.{org}.{host}"),
        None => format!("{repo}.{host}"),
    }
}

/// Split a location into `(host, path)`; host is `None` for shorthand and local paths.
fn split_host(location: &str) -> (Option<&str>, &str) {
    if let Some((_, rest)) = location.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        let host = authority.rsplit('@').next().unwrap_or(authority);
        let host = host.split(':').next().unwrap_or(host);
        return (Some(host), path);
    }

    // scp-like syntax: user@host:org/repo
    if let Some((user_host, path)) = location.split_once(':') {
        if !user_host.contains('/') && user_host.contains('@') {
            let host = user_host.rsplit('@').next().unwrap_or(user_host);
            return (Some(host), path);
        }
    }

    if HOST_PATH.is_match(location) {
        if let Some((host, path)) = location.split_once('/') {
            return (Some(host), path);
        }
    }

    (None, location)
}

/// Turn a repository reference into something `git clone` accepts.
///
/// Full URLs pass through, `host.tld/org/repo` gains `https://`, and
/// `org/repo` expands to a GitHub HTTPS URL. Returns `None` for anything
/// else.
#[must_use]
pub fn resolve_clone_url(reference: &str) -> Option<String> {
    let reference = reference.trim();
    if reference.is_empty() {
        return None;
    }

    let is_url = ["https://", "http://", "ssh://", "git://", "file://"]
        .iter()
        .any(|scheme| reference.starts_with(scheme));
    if is_url {
        return Some(reference.to_string());
    }

    if let Some((user_host, _)) = reference.split_once(':') {
        if user_host.contains('@') && !user_host.contains('/') {
            return Some(reference.to_string());
        }
    }

    if HOST_PATH.is_match(reference) {
        return Some(format!("https://{reference}"));
    }

    if SHORTHAND.is_match(reference) {
        let reference = reference.strip_suffix(".git").unwrap_or(reference);
        return Some(format!("https://github.com/{reference}.git"));
    }

    None
}

/// Embed a token as basic-auth credentials in an HTTPS URL.
///
/// Non-HTTPS URLs and URLs that already carry credentials are returned as-is.
#[must_use]
pub fn with_token(url: &str, token: Option<&str>) -> String {
    let Some(token) = token.filter(|t| !t.is_empty()) else {
        return url.to_string();
    };
    let Some(rest) = url.strip_prefix("https://") else {
        return url.to_string();
    };
    let authority = rest.split('/').next().unwrap_or(rest);
    if authority.contains('@') {
        return url.to_string();
    }
    format!("https://x-access-token:{token}@{rest}")
}

/// Hide credentials before a URL reaches logs or error messages.
#[must_use]
pub fn redact(url: &str) -> String {
    if let Some((scheme, rest)) = url.split_once("://") {
        let (authority, path) = rest.split_once('/').unwrap_or((rest, ""));
        if let Some((_, host)) = authority.rsplit_once('@') {
            return format!("{scheme}://***@{host}/{path}");
        }
    }
    url.to_string()
}

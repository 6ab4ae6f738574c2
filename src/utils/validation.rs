//! Input validation primitives.
//!
//! Provides ergonomic helpers for common validation patterns:
//! - Required configuration keys
//! - Checking repository URLs before anything touches the network

use crate::error::{Error, Result};

/// Require a configuration value to be set and non-blank.
pub fn require_config<'a>(value: Option<&'a str>, key: &str) -> Result<&'a str> {
    match value.map(str::trim) {
        Some(v) if !v.is_empty() => Ok(v),
        _ => Err(Error::config_missing_key(key, None)),
    }
}

/// Accept `http(s)://`, `ssh://`, `git://`, `file://` URLs and scp-style
/// `user@host:path` remotes.
pub fn validate_repo_url(url: &str, field: &str) -> Result<()> {
    let url = url.trim();
    if url.is_empty() {
        return Err(Error::validation_invalid_url(field, "URL is empty"));
    }
    if url.chars().any(char::is_whitespace) {
        return Err(Error::validation_invalid_url(field, "URL contains whitespace"));
    }

    if let Some((scheme, rest)) = url.split_once("://") {
        let known = ["http", "https", "ssh", "git", "file"];
        if !known.contains(&scheme.to_ascii_lowercase().as_str()) {
            return Err(Error::validation_invalid_url(
                field,
                format!("unsupported scheme '{}'", scheme),
            ));
        }
        if scheme.eq_ignore_ascii_case("file") {
            return if rest.is_empty() {
                Err(Error::validation_invalid_url(field, "file URL has no path"))
            } else {
                Ok(())
            };
        }
        let authority = rest.split('/').next().unwrap_or("");
        let host = authority.rsplit('@').next().unwrap_or("");
        if host.is_empty() || host.starts_with(':') {
            return Err(Error::validation_invalid_url(field, "URL has no host"));
        }
        return Ok(());
    }

    // scp-like syntax: git@host:group/repo.git
    match url.split_once(':') {
        Some((user_host, path)) if user_host.contains('@') && !path.is_empty() => Ok(()),
        _ => Err(Error::validation_invalid_url(
            field,
            "expected scheme://host/path or user@host:path",
        )),
    }
}

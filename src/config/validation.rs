//! Startup validation of the proxy configuration.
//!
//! The upstream origin must be an absolute `http`/`https` URL with a host
//! and without query or fragment, because inbound paths are appended to it
//! verbatim. The remaining checks reject tuning values that would make the
//! proxy useless (zero timeouts, an empty capture queue).

use std::time::Duration;

use url::Url;

/// Validate the upstream origin URL. Returns the parsed URL or a
/// human-readable error.
pub fn validate_target_url(raw: &str) -> Result<Url, String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err("target URL cannot be empty".into());
    }
    let parsed = Url::parse(trimmed).map_err(|_| format!("'{trimmed}' is not a valid URL"))?;

    let scheme = parsed.scheme();
    if scheme != "http" && scheme != "https" {
        return Err(format!(
            "unsupported scheme '{scheme}' (expected http or https)"
        ));
    }
    if parsed.host_str().map_or(true, str::is_empty) {
        return Err("target URL has no host".into());
    }
    if parsed.query().is_some() || parsed.fragment().is_some() {
        return Err("target URL must not carry a query string or fragment".into());
    }
    Ok(parsed)
}

pub fn validate_timeout(name: &str, value: Duration) -> Result<(), String> {
    if value.is_zero() {
        Err(format!("{name} must be greater than zero"))
    } else {
        Ok(())
    }
}

pub fn validate_capacity(name: &str, value: usize) -> Result<(), String> {
    if value == 0 {
        Err(format!("{name} must be at least 1"))
    } else {
        Ok(())
    }
}

/// The health path is mounted as a literal route, so it must be a plain
/// absolute path without wildcards or captures.
pub fn validate_health_path(path: &str) -> Result<(), String> {
    if !path.starts_with('/') {
        return Err(format!(
            "health path must start with '/' (did you mean '/{path}'?)"
        ));
    }
    if path.contains(['{', '}', '*', '?', '#']) {
        return Err(format!("health path '{path}' must be a literal path"));
    }
    Ok(())
}

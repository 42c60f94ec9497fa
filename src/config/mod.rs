//! Runtime configuration for the proxy.
//!
//! [`ProxyConfig`] is built once from the environment-backed CLI
//! arguments, validated, and then shared read-only through `Arc`. The
//! upstream origin is required; every other value has a default.

pub mod validation;

use std::path::PathBuf;
use std::time::Duration;

use url::Url;

use crate::cli::RunArgs;
use crate::error::TeeProxyError;

#[derive(Debug, Clone)]
pub struct ProxyConfig {
    pub upstream: Url,
    /// End-to-end bound on one upstream call, body included.
    pub timeout: Duration,
    pub chunk_idle_timeout: Option<Duration>,
    pub pool_max_idle: usize,
    pub strip_hop_by_hop: bool,
    pub health_path: Option<String>,
    pub capture: CaptureConfig,
}

#[derive(Debug, Clone)]
pub struct CaptureConfig {
    pub log_file: PathBuf,
    pub rotation_bytes: u64,
    pub retention: Duration,
    pub queue_capacity: usize,
    pub max_body_bytes: usize,
    pub drain_timeout: Duration,
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            log_file: PathBuf::from("logs/record.log"),
            rotation_bytes: 100 * 1024 * 1024,
            retention: Duration::from_secs(10 * 24 * 60 * 60),
            queue_capacity: 1024,
            max_body_bytes: 16 * 1024 * 1024,
            drain_timeout: Duration::from_secs(5),
        }
    }
}

impl ProxyConfig {
    /// Config with defaults for everything except the upstream origin.
    pub fn new(target_url: &str) -> Result<Self, TeeProxyError> {
        let upstream = parse_target(target_url)?;
        Ok(Self {
            upstream,
            timeout: Duration::from_secs(30),
            chunk_idle_timeout: None,
            pool_max_idle: 32,
            strip_hop_by_hop: false,
            health_path: None,
            capture: CaptureConfig::default(),
        })
    }

    pub fn from_args(args: &RunArgs) -> Result<Self, TeeProxyError> {
        let config = Self {
            upstream: parse_target(&args.target_url)?,
            timeout: Duration::from_millis(args.timeout),
            chunk_idle_timeout: args.chunk_idle_timeout.map(Duration::from_millis),
            pool_max_idle: args.pool_max_idle,
            strip_hop_by_hop: args.strip_hop_by_hop,
            health_path: args.health_path.clone(),
            capture: CaptureConfig {
                log_file: args.log_file.clone(),
                rotation_bytes: args.log_rotation_bytes,
                retention: retention_from_days(args.log_retention_days),
                queue_capacity: args.capture_queue,
                max_body_bytes: args.capture_max_body,
                drain_timeout: Duration::from_millis(args.drain_timeout),
            },
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), TeeProxyError> {
        let invalid = TeeProxyError::InvalidConfig;
        validation::validate_timeout("request timeout", self.timeout).map_err(invalid)?;
        if let Some(idle) = self.chunk_idle_timeout {
            validation::validate_timeout("chunk idle timeout", idle).map_err(invalid)?;
        }
        validation::validate_capacity("capture queue capacity", self.capture.queue_capacity)
            .map_err(invalid)?;
        if let Some(path) = self.health_path.as_deref() {
            validation::validate_health_path(path).map_err(invalid)?;
        }
        Ok(())
    }

    /// The origin with any trailing `/` removed, ready for a path to be appended.
    #[must_use]
    pub fn origin(&self) -> &str {
        self.upstream.as_str().trim_end_matches('/')
    }

    /// `host[:port]` of the upstream, used as the rewritten `host` header.
    /// The port appears only when the URL spells out a non-default one.
    #[must_use]
    pub fn authority(&self) -> String {
        let host = self.upstream.host_str().unwrap_or_default();
        self.upstream
            .port()
            .map_or_else(|| host.to_string(), |port| format!("{host}:{port}"))
    }
}

/// Days to a duration; absurdly large values saturate instead of overflowing.
fn retention_from_days(days: u64) -> Duration {
    Duration::from_secs(days.saturating_mul(24 * 60 * 60))
}

fn parse_target(raw: &str) -> Result<Url, TeeProxyError> {
    validation::validate_target_url(raw).map_err(|message| TeeProxyError::InvalidTarget {
        url: raw.to_string(),
        message,
    })
}

#[cfg(test)]
mod tests {
    use clap::Parser;

    use super::*;

    #[test]
    fn origin_trims_trailing_slash() {
        let config = ProxyConfig::new("http://backend:9090/").unwrap();
        assert_eq!(config.origin(), "http://backend:9090");

        let config = ProxyConfig::new("http://backend/api/").unwrap();
        assert_eq!(config.origin(), "http://backend/api");
    }

    #[test]
    fn authority_includes_explicit_port_only() {
        assert_eq!(
            ProxyConfig::new("http://backend:9090").unwrap().authority(),
            "backend:9090"
        );
        assert_eq!(
            ProxyConfig::new("https://api.example.com").unwrap().authority(),
            "api.example.com"
        );
        assert_eq!(
            ProxyConfig::new("http://api.example.com:80").unwrap().authority(),
            "api.example.com"
        );
    }

    #[test]
    fn missing_target_is_rejected() {
        let err = ProxyConfig::new("").unwrap_err();
        assert!(err.to_string().contains("cannot be empty"));
    }

    #[test]
    fn defaults_are_sensible() {
        let config = ProxyConfig::new("http://localhost:8080").unwrap();
        assert_eq!(config.timeout, Duration::from_secs(30));
        assert!(config.chunk_idle_timeout.is_none());
        assert!(!config.strip_hop_by_hop);
        assert_eq!(config.capture.log_file, PathBuf::from("logs/record.log"));
        assert_eq!(config.capture.rotation_bytes, 104_857_600);
        assert_eq!(config.capture.retention, Duration::from_secs(864_000));
    }

    #[test]
    fn huge_retention_saturates() {
        assert_eq!(retention_from_days(10), Duration::from_secs(864_000));
        assert_eq!(retention_from_days(u64::MAX), Duration::from_secs(u64::MAX));
    }

    #[test]
    fn huge_retention_from_args_does_not_overflow() {
        let cli = crate::cli::Cli::try_parse_from([
            "teeproxy",
            "run",
            "--target-url",
            "http://backend:8080",
            "--log-retention-days",
            "18446744073709551615",
        ])
        .unwrap();
        let Some(crate::cli::Commands::Run(args)) = cli.command else {
            panic!("expected run subcommand");
        };
        let config = ProxyConfig::from_args(&args).unwrap();
        assert_eq!(config.capture.retention, Duration::from_secs(u64::MAX));
    }
}

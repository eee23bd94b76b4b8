//! Configuration validation.
//!
//! Validates configuration at startup to catch common errors early.

use super::Config;
use axum::http::HeaderName;
use thiserror::Error;

/// Validation errors for configuration.
#[derive(Debug, Error)]
pub enum ValidationError {
    #[error("{0} command must not be empty")]
    EmptyCommand(&'static str),
    #[error("server.api_key_header is not a valid header name: '{0}'")]
    InvalidApiKeyHeader(String),
    #[error("resolver.trace_url must be an http(s) URL, got '{0}'")]
    InvalidTraceUrl(String),
    #[error("resolver.attempts must be at least 1")]
    ZeroResolverAttempts,
    #[error("rotation.poll_attempts must be at least 1")]
    ZeroPollAttempts,
    #[error("blacklist.ttl_secs must be at least 1")]
    ZeroTtl,
    #[error("blacklist.reap_interval_secs must be at least 1")]
    ZeroReapInterval,
}

/// Validate a configuration, returning all errors found.
pub fn validate(config: &Config) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    let commands = [
        ("vpn.disconnect", &config.vpn.disconnect),
        ("vpn.connect", &config.vpn.connect),
        ("firewall.block", &config.firewall.block),
        ("firewall.unblock", &config.firewall.unblock),
    ];
    for (name, spec) in commands {
        if spec.is_empty() {
            errors.push(ValidationError::EmptyCommand(name));
        }
    }

    let header = &config.server.api_key_header;
    if HeaderName::from_bytes(header.as_bytes()).is_err() {
        errors.push(ValidationError::InvalidApiKeyHeader(header.clone()));
    }

    let url = &config.resolver.trace_url;
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        errors.push(ValidationError::InvalidTraceUrl(url.clone()));
    }

    if config.resolver.attempts == 0 {
        errors.push(ValidationError::ZeroResolverAttempts);
    }
    if config.rotation.poll_attempts == 0 {
        errors.push(ValidationError::ZeroPollAttempts);
    }
    if config.blacklist.ttl_secs == 0 {
        errors.push(ValidationError::ZeroTtl);
    }
    if config.blacklist.reap_interval_secs == 0 {
        errors.push(ValidationError::ZeroReapInterval);
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

//! Configuration types.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigError;

/// Rule switches that the onboarding validation consults.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ValidationPolicy {
    /// Whether the second address line must be non-blank.
    ///
    /// The legacy form rejected an empty second line. Defaults to `true`
    /// so existing behavior holds until an operator opts out.
    pub address_line2_required: bool,
}

impl Default for ValidationPolicy {
    fn default() -> Self {
        Self {
            address_line2_required: true,
        }
    }
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP listener binds to.
    pub bind: SocketAddr,
    /// Path of the libSQL database file.
    pub db_path: PathBuf,
    /// Lifetime of an anti-forgery session.
    pub session_ttl: Duration,
    pub policy: ValidationPolicy,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind: SocketAddr::from(([0, 0, 0, 0], 8000)),
            db_path: PathBuf::from("./data/onboarding.db"),
            session_ttl: Duration::from_secs(60 * 60),
            policy: ValidationPolicy::default(),
        }
    }
}

impl ServerConfig {
    /// Build the configuration from `ONBOARDING_*` environment variables.
    ///
    /// Unset variables fall back to defaults; set-but-malformed ones are errors.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind = match lookup("ONBOARDING_BIND") {
            Some(raw) => raw.parse().map_err(|e| ConfigError::InvalidValue {
                key: "ONBOARDING_BIND".into(),
                message: format!("{e}"),
            })?,
            None => defaults.bind,
        };

        let db_path = lookup("ONBOARDING_DB_PATH")
            .map(PathBuf::from)
            .unwrap_or(defaults.db_path);

        let session_ttl = match lookup("ONBOARDING_SESSION_TTL_MIN") {
            Some(raw) => {
                let minutes: u64 = raw.parse().map_err(|e| ConfigError::InvalidValue {
                    key: "ONBOARDING_SESSION_TTL_MIN".into(),
                    message: format!("{e}"),
                })?;
                let secs = minutes
                    .checked_mul(60)
                    .ok_or_else(|| ConfigError::InvalidValue {
                        key: "ONBOARDING_SESSION_TTL_MIN".into(),
                        message: format!("{minutes} minutes is out of range"),
                    })?;
                Duration::from_secs(secs)
            }
            None => defaults.session_ttl,
        };

        let address_line2_required = match lookup("ONBOARDING_ADDRESS_LINE2_REQUIRED") {
            Some(raw) => parse_bool(&raw).ok_or_else(|| ConfigError::InvalidValue {
                key: "ONBOARDING_ADDRESS_LINE2_REQUIRED".into(),
                message: format!("expected true/false, got {raw:?}"),
            })?,
            None => defaults.policy.address_line2_required,
        };

        Ok(Self {
            bind,
            db_path,
            session_ttl,
            policy: ValidationPolicy {
                address_line2_required,
            },
        })
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}

/// Configuration for the HTTP wizard client.
#[derive(Debug, Clone)]
pub struct ClientConfig {
    /// Base URL of the onboarding server, without trailing slash.
    pub base_url: String,
    /// Timeout applied to every remote call.
    pub request_timeout: Duration,
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(10),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn defaults_when_env_empty() {
        let config = ServerConfig::from_lookup(lookup(&[])).unwrap();
        assert_eq!(config.bind.port(), 8000);
        assert_eq!(config.db_path, PathBuf::from("./data/onboarding.db"));
        assert_eq!(config.session_ttl, Duration::from_secs(3600));
        assert!(config.policy.address_line2_required);
    }

    #[test]
    fn env_overrides() {
        let config = ServerConfig::from_lookup(lookup(&[
            ("ONBOARDING_BIND", "127.0.0.1:9100"),
            ("ONBOARDING_DB_PATH", "/tmp/x.db"),
            ("ONBOARDING_SESSION_TTL_MIN", "5"),
            ("ONBOARDING_ADDRESS_LINE2_REQUIRED", "false"),
        ]))
        .unwrap();
        assert_eq!(config.bind.to_string(), "127.0.0.1:9100");
        assert_eq!(config.db_path, PathBuf::from("/tmp/x.db"));
        assert_eq!(config.session_ttl, Duration::from_secs(300));
        assert!(!config.policy.address_line2_required);
    }

    #[test]
    fn malformed_values_are_rejected() {
        let err = ServerConfig::from_lookup(lookup(&[("ONBOARDING_SESSION_TTL_MIN", "soon")]))
            .unwrap_err();
        assert!(err.to_string().contains("ONBOARDING_SESSION_TTL_MIN"));

        let err = ServerConfig::from_lookup(lookup(&[("ONBOARDING_ADDRESS_LINE2_REQUIRED", "maybe")]))
            .unwrap_err();
        assert!(err.to_string().contains("ONBOARDING_ADDRESS_LINE2_REQUIRED"));
    }

    #[test]
    fn oversized_session_ttl_is_rejected() {
        let minutes = u64::MAX.to_string();
        let err = ServerConfig::from_lookup(lookup(&[("ONBOARDING_SESSION_TTL_MIN", minutes.as_str())]))
            .unwrap_err();
        assert!(err.to_string().contains("out of range"), "got: {err}");
    }

    #[test]
    fn client_config_trims_trailing_slash() {
        let config = ClientConfig::new("http://localhost:8000/");
        assert_eq!(config.base_url, "http://localhost:8000");
        assert_eq!(config.request_timeout, Duration::from_secs(10));
    }
}

//! Environment-driven configuration.
//!
//! | variable | default |
//! |---|---|
//! | `VSPHERE_URL` | required |
//! | `VSPHERE_USER` | required |
//! | `VSPHERE_PASSWORD` | required |
//! | `VSPHERE_REQUEST_TIMEOUT` | 30 (seconds) |
//! | `CNS_E2E_POLL_INTERVAL` | 2 (seconds) |
//! | `CNS_E2E_POLL_TIMEOUT` | 300 (seconds) |
//! | `CNS_E2E_QUERY_LIMIT` | 100 |

use std::time::Duration;

use crate::model::DEFAULT_QUERY_LIMIT;
use crate::poll::{DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT, PollSpec, PollSpecError};

const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("missing required environment variable {0}")]
    Missing(&'static str),

    #[error("invalid value {value:?} for {name}: {reason}")]
    Invalid {
        name: &'static str,
        value: String,
        reason: String,
    },

    #[error(transparent)]
    Poll(#[from] PollSpecError),
}

/// Connection settings for the management gateway.
#[derive(Clone)]
pub struct VSphereConfig {
    pub url: String,
    pub user: String,
    pub password: String,
    pub request_timeout: Duration,
}

impl VSphereConfig {
    pub fn new(
        url: impl Into<String>,
        user: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        Self {
            url: url.into(),
            user: user.into(),
            password: password.into(),
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
        }
    }

    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout = timeout;
        self
    }
}

impl std::fmt::Debug for VSphereConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VSphereConfig")
            .field("url", &self.url)
            .field("user", &self.user)
            .field("password", &"<redacted>")
            .field("request_timeout", &self.request_timeout)
            .finish()
    }
}

/// Everything an e2e run needs.
#[derive(Debug, Clone)]
pub struct E2eConfig {
    pub vsphere: VSphereConfig,
    pub poll: PollSpec,
    pub query_limit: i64,
}

impl E2eConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let required = |name: &'static str| {
            lookup(name)
                .filter(|v| !v.trim().is_empty())
                .ok_or(ConfigError::Missing(name))
        };

        let url = required("VSPHERE_URL")?.trim_end_matches('/').to_string();
        let request_timeout = seconds(&lookup, "VSPHERE_REQUEST_TIMEOUT", DEFAULT_REQUEST_TIMEOUT)?;
        if request_timeout.is_zero() {
            return Err(ConfigError::Invalid {
                name: "VSPHERE_REQUEST_TIMEOUT",
                value: lookup("VSPHERE_REQUEST_TIMEOUT").unwrap_or_default(),
                reason: "request timeout must be greater than zero".to_string(),
            });
        }
        let vsphere = VSphereConfig::new(
            url,
            required("VSPHERE_USER")?,
            required("VSPHERE_PASSWORD")?,
        )
        .with_request_timeout(request_timeout);

        let poll = PollSpec::new(
            seconds(&lookup, "CNS_E2E_POLL_INTERVAL", DEFAULT_POLL_INTERVAL)?,
            seconds(&lookup, "CNS_E2E_POLL_TIMEOUT", DEFAULT_POLL_TIMEOUT)?,
        )?;

        let query_limit = match lookup("CNS_E2E_QUERY_LIMIT") {
            None => DEFAULT_QUERY_LIMIT,
            Some(raw) => match raw.trim().parse::<i64>() {
                Ok(limit) if limit > 0 => limit,
                _ => {
                    return Err(ConfigError::Invalid {
                        name: "CNS_E2E_QUERY_LIMIT",
                        value: raw,
                        reason: "expected a positive integer".to_string(),
                    });
                }
            },
        };

        Ok(Self {
            vsphere,
            poll,
            query_limit,
        })
    }
}

/// Parse a duration in (possibly fractional) seconds.
fn seconds<F>(lookup: &F, name: &'static str, default: Duration) -> Result<Duration, ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let Some(raw) = lookup(name) else {
        return Ok(default);
    };
    raw.trim()
        .parse::<f64>()
        .ok()
        .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
        .ok_or_else(|| ConfigError::Invalid {
            name,
            value: raw.clone(),
            reason: "expected a non-negative number of seconds".to_string(),
        })
}

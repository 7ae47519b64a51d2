//! Crate constants and model-gateway configuration.

use thiserror::Error;

/// Application-level constants
pub const APP_NAME: &str = "Mathsnap";
pub const APP_VERSION: &str = env!("CARGO_PKG_VERSION");

/// Default gateway endpoint when `MATHSNAP_GATEWAY_URL` is unset.
pub const DEFAULT_GATEWAY_URL: &str = "http://localhost:8787";

/// Default per-request timeout in seconds.
pub const DEFAULT_TIMEOUT_SECS: u64 = 60;

/// Tracing filter applied when `RUST_LOG` is unset.
pub fn default_log_filter() -> &'static str {
    "mathsnap=info"
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Invalid gateway URL '{0}': must be http:// or https:// with a host")]
    InvalidBaseUrl(String),

    #[error("Invalid timeout '{0}': must be a positive number of seconds")]
    InvalidTimeout(String),
}

/// Connection settings for the remote model gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Base URL without a trailing slash.
    pub base_url: String,
    /// API key sent with every request; `None` for unauthenticated gateways.
    pub api_key: Option<String>,
    /// Per-request timeout in seconds.
    pub timeout_secs: u64,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_GATEWAY_URL.to_string(),
            api_key: None,
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl GatewayConfig {
    /// Read `MATHSNAP_GATEWAY_URL`, `MATHSNAP_API_KEY` and
    /// `MATHSNAP_TIMEOUT_SECS`, falling back to defaults for unset values.
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_parts(
            std::env::var("MATHSNAP_GATEWAY_URL").ok(),
            std::env::var("MATHSNAP_API_KEY").ok(),
            std::env::var("MATHSNAP_TIMEOUT_SECS").ok(),
        )
    }

    /// Build from optional raw values; `None` means "use the default".
    pub fn from_parts(
        base_url: Option<String>,
        api_key: Option<String>,
        timeout_secs: Option<String>,
    ) -> Result<Self, ConfigError> {
        let base_url = base_url.unwrap_or_else(|| DEFAULT_GATEWAY_URL.to_string());
        validate_base_url(&base_url)?;
        let base_url = base_url.trim_end_matches('/').to_string();

        let api_key = api_key.filter(|key| !key.trim().is_empty());

        let timeout_secs = match timeout_secs {
            Some(raw) => raw
                .trim()
                .parse::<u64>()
                .ok()
                .filter(|secs| *secs > 0)
                .ok_or(ConfigError::InvalidTimeout(raw))?,
            None => DEFAULT_TIMEOUT_SECS,
        };

        Ok(Self {
            base_url,
            api_key,
            timeout_secs,
        })
    }
}

/// Accepts http(s) URLs with a non-empty host. The gateway may be remote,
/// so no localhost restriction applies.
pub fn validate_base_url(url: &str) -> Result<(), ConfigError> {
    let after_scheme = url
        .strip_prefix("http://")
        .or_else(|| url.strip_prefix("https://"))
        .ok_or_else(|| ConfigError::InvalidBaseUrl(url.to_string()))?;

    // Host is everything before port or path; IPv6 uses bracket notation.
    let host = if after_scheme.starts_with('[') {
        after_scheme
            .split(']')
            .next()
            .unwrap_or("")
            .trim_start_matches('[')
    } else {
        after_scheme
            .split(':')
            .next()
            .unwrap_or("")
            .split('/')
            .next()
            .unwrap_or("")
    };

    if host.is_empty() {
        return Err(ConfigError::InvalidBaseUrl(url.to_string()));
    }
    Ok(())
}

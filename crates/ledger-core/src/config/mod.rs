//! Host bridge configuration.
//!
//! Provides the `BridgeConfig` struct shared by embedders and the CLI to
//! describe which host origin the channel trusts and how long calls may run.

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use url::Url;

use crate::error::ConfigurationError;
use crate::util::normalize_text_option;

/// Origins of the deployments that are known to embed LedgerLite.
pub const DEFAULT_ALLOWED_HOST_ORIGINS: [&str; 4] = [
    "https://mybudgetsocial.com",
    "https://staging.mybudgetsocial.com",
    "http://localhost:5173",
    "https://finanzas.verenzuela.com",
];

const DEFAULT_TIMEOUT_MS: u64 = 8_000;
const MIN_TIMEOUT_MS: u64 = 500;
const SEND_TIMEOUT_MS: u64 = 15_000;
const HANDSHAKE_TIMEOUT_MS: u64 = 1_200;
const DEFAULT_RESEND_PHRASE: &str = "confirm send";
const DEFAULT_CURRENCY_CODE: &str = "EUR";

/// Bridge configuration, usually loaded from a JSON file.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields, default)]
pub struct BridgeConfig {
    /// Exact origin of the embedding host window
    pub host_origin: Option<String>,
    /// Origins the host origin must belong to (empty disables the check)
    pub allowed_host_origins: Vec<String>,
    /// Default bound for RPC calls without an explicit timeout
    pub default_timeout_ms: u64,
    /// Floor applied to every RPC timeout
    pub min_timeout_ms: u64,
    /// Bound for record submissions
    pub send_timeout_ms: u64,
    /// How long callers wait for the handshake before treating the host as absent
    pub handshake_timeout_ms: u64,
    /// Phrase the user must type to resend an already-sent record
    pub resend_phrase: String,
    /// Currency attached to outgoing submissions
    pub currency_code: String,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            host_origin: None,
            allowed_host_origins: DEFAULT_ALLOWED_HOST_ORIGINS
                .iter()
                .map(ToString::to_string)
                .collect(),
            default_timeout_ms: DEFAULT_TIMEOUT_MS,
            min_timeout_ms: MIN_TIMEOUT_MS,
            send_timeout_ms: SEND_TIMEOUT_MS,
            handshake_timeout_ms: HANDSHAKE_TIMEOUT_MS,
            resend_phrase: DEFAULT_RESEND_PHRASE.to_string(),
            currency_code: DEFAULT_CURRENCY_CODE.to_string(),
        }
    }
}

impl BridgeConfig {
    /// Config for a specific host origin with every other value defaulted.
    pub fn for_origin(origin: impl Into<String>) -> Self {
        Self {
            host_origin: Some(origin.into()),
            ..Self::default()
        }
    }

    /// Load config from `path`, returning defaults when the file does not exist.
    pub fn load_from_path(path: &Path) -> Result<Self, ConfigurationError> {
        if !path.exists() {
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(path).map_err(|error| {
            ConfigurationError::Invalid(format!(
                "failed to read config at {}: {error}",
                path.display()
            ))
        })?;
        parse_bridge_config(&raw)
    }

    /// Normalized host origin, checked against the allow-list.
    pub fn resolve_host_origin(&self) -> Result<String, ConfigurationError> {
        let raw = normalize_text_option(self.host_origin.clone())
            .ok_or(ConfigurationError::MissingOrigin)?;
        let origin = normalize_origin(&raw)?;

        if self.allowed_host_origins.is_empty() {
            return Ok(origin);
        }

        let allowed = self
            .allowed_host_origins
            .iter()
            .filter_map(|entry| normalize_origin(entry).ok())
            .any(|entry| entry == origin);
        if allowed {
            Ok(origin)
        } else {
            Err(ConfigurationError::OriginNotAllowed(origin))
        }
    }

    /// Default RPC timeout.
    pub const fn default_timeout(&self) -> Duration {
        Duration::from_millis(self.default_timeout_ms)
    }

    /// Minimum RPC timeout.
    pub const fn min_timeout(&self) -> Duration {
        Duration::from_millis(self.min_timeout_ms)
    }

    /// Submission timeout.
    pub const fn send_timeout(&self) -> Duration {
        Duration::from_millis(self.send_timeout_ms)
    }

    /// Handshake wait.
    pub const fn handshake_timeout(&self) -> Duration {
        Duration::from_millis(self.handshake_timeout_ms)
    }
}

/// Parse a bridge config from a raw JSON payload.
pub fn parse_bridge_config(payload: &str) -> Result<BridgeConfig, ConfigurationError> {
    let mut config: BridgeConfig = serde_json::from_str(payload)
        .map_err(|error| ConfigurationError::Invalid(format!("invalid config JSON: {error}")))?;

    if config.min_timeout_ms == 0 {
        return Err(ConfigurationError::Invalid(
            "min_timeout_ms must be greater than zero".to_string(),
        ));
    }
    config.host_origin = normalize_text_option(config.host_origin);
    config.resend_phrase = config.resend_phrase.trim().to_string();
    if config.resend_phrase.is_empty() {
        return Err(ConfigurationError::Invalid(
            "resend_phrase must not be empty".to_string(),
        ));
    }
    Ok(config)
}

/// Reduce `raw` to its `scheme://host[:port]` origin.
///
/// Only `http` and `https` are accepted; anything else is rejected rather than
/// coerced, since the origin is compared byte-for-byte against inbound events.
pub fn normalize_origin(raw: &str) -> Result<String, ConfigurationError> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(ConfigurationError::MissingOrigin);
    }

    let url =
        Url::parse(trimmed).map_err(|_| ConfigurationError::InvalidOrigin(trimmed.to_string()))?;
    if !matches!(url.scheme(), "http" | "https") || url.host_str().is_none() {
        return Err(ConfigurationError::InvalidOrigin(trimmed.to_string()));
    }
    Ok(url.origin().ascii_serialization())
}

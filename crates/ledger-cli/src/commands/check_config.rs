use std::path::Path;

use ledger_core::config::BridgeConfig;
use serde::Serialize;

use crate::error::CliError;

/// Resolved view of a bridge config
#[derive(Debug, Serialize, PartialEq, Eq)]
pub struct ConfigSummary {
    pub path: Option<String>,
    pub file_exists: bool,
    pub host_origin: String,
    pub allowed_host_origins: Vec<String>,
    pub default_timeout_ms: u64,
    pub min_timeout_ms: u64,
    pub send_timeout_ms: u64,
    pub handshake_timeout_ms: u64,
    pub resend_phrase: String,
    pub currency_code: String,
}

impl ConfigSummary {
    pub fn new(path: Option<&Path>, config: &BridgeConfig) -> Result<Self, CliError> {
        Ok(Self {
            path: path.map(|path| path.display().to_string()),
            file_exists: path.is_some_and(Path::exists),
            host_origin: config.resolve_host_origin()?,
            allowed_host_origins: config.allowed_host_origins.clone(),
            default_timeout_ms: config.default_timeout_ms,
            min_timeout_ms: config.min_timeout_ms,
            send_timeout_ms: config.send_timeout_ms,
            handshake_timeout_ms: config.handshake_timeout_ms,
            resend_phrase: config.resend_phrase.clone(),
            currency_code: config.currency_code.clone(),
        })
    }

    pub fn lines(&self) -> Vec<String> {
        let source = match (&self.path, self.file_exists) {
            (Some(path), true) => path.clone(),
            (Some(path), false) => format!("{path} (not found, using defaults)"),
            (None, _) => "defaults".to_string(),
        };
        vec![
            format!("config:      {source}"),
            format!("host origin: {}", self.host_origin),
            format!(
                "timeouts:    default {}ms, min {}ms, send {}ms, handshake {}ms",
                self.default_timeout_ms,
                self.min_timeout_ms,
                self.send_timeout_ms,
                self.handshake_timeout_ms
            ),
            format!("currency:    {}", self.currency_code),
            format!("resend:      type \"{}\" to confirm", self.resend_phrase),
        ]
    }
}

pub fn run_check_config(
    path: Option<&Path>,
    config: &BridgeConfig,
    as_json: bool,
) -> Result<(), CliError> {
    let summary = ConfigSummary::new(path, config)?;
    if as_json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
    } else {
        for line in summary.lines() {
            println!("{line}");
        }
    }
    Ok(())
}

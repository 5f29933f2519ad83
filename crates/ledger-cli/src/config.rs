use std::env;
use std::path::{Path, PathBuf};

use ledger_core::config::BridgeConfig;
use ledger_core::util::normalize_text_option;

use crate::error::CliError;

const CONFIG_ENV: &str = "LEDGER_BRIDGE_CONFIG";

/// Config path from `--config`, `LEDGER_BRIDGE_CONFIG`, or the user config dir
pub fn resolve_config_path(explicit: Option<PathBuf>) -> Option<PathBuf> {
    resolve_config_path_from(explicit, env::var(CONFIG_ENV).ok(), dirs::config_dir())
}

pub fn resolve_config_path_from(
    explicit: Option<PathBuf>,
    env_value: Option<String>,
    config_dir: Option<PathBuf>,
) -> Option<PathBuf> {
    explicit
        .or_else(|| normalize_text_option(env_value).map(PathBuf::from))
        .or_else(|| config_dir.map(|dir| dir.join("ledger").join("bridge.json")))
}

/// Load the config at `path`; defaults when there is no path or no file
pub fn load_config(path: Option<&Path>) -> Result<BridgeConfig, CliError> {
    match path {
        Some(path) => Ok(BridgeConfig::load_from_path(path)?),
        None => Ok(BridgeConfig::default()),
    }
}

//! Configuration resolution for ledgerlens-ai
//!
//! The reasoning-service API key resolves Environment → TOML. A local
//! reasoning endpoint may not need a key at all, so absence is not an error.

use ledgerlens_common::config::{load_toml_config, write_toml_config, TomlConfig};
use ledgerlens_common::Result;
use std::path::Path;
use tracing::{info, warn};

/// Environment variable carrying the reasoning-service API key
pub const API_KEY_ENV_VAR: &str = "LEDGERLENS_REASONING_API_KEY";

/// Resolve the reasoning-service API key
///
/// **Priority:** Environment → TOML
///
/// # Returns
/// The first valid key, or None when no source provides one
pub fn resolve_reasoning_api_key(toml_config: &TomlConfig) -> Option<String> {
    let env_key = std::env::var(API_KEY_ENV_VAR)
        .ok()
        .filter(|k| is_valid_key(k));
    let toml_key = toml_config
        .reasoning
        .api_key
        .clone()
        .filter(|k| is_valid_key(k));

    if env_key.is_some() && toml_key.is_some() {
        warn!("Reasoning API key found in environment and TOML config. Using environment (highest priority).");
    }

    if let Some(key) = env_key {
        info!("Reasoning API key loaded from environment variable");
        return Some(key);
    }

    if let Some(key) = toml_key {
        info!("Reasoning API key loaded from TOML config");
        return Some(key);
    }

    warn!(
        "Reasoning API key not configured; requests are sent without authorization. \
         Set {} or [reasoning] api_key to configure one.",
        API_KEY_ENV_VAR
    );
    None
}

/// Validate API key (non-empty, non-whitespace)
pub fn is_valid_key(key: &str) -> bool {
    !key.trim().is_empty()
}

/// Store the reasoning API key in a TOML config file, keeping its other settings
pub fn persist_reasoning_api_key(key: &str, toml_path: &Path) -> Result<()> {
    let mut config = if toml_path.exists() {
        load_toml_config(toml_path)?
    } else {
        TomlConfig::default()
    };

    config.reasoning.api_key = Some(key.trim().to_string());
    write_toml_config(&config, toml_path)?;

    info!("Reasoning API key written to {}", toml_path.display());
    Ok(())
}

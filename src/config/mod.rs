use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use tracing::debug;

/// Default file name looked up when no explicit path is given.
pub const CONFIG_FILE: &str = ".rxsession.yml";

/// Engine tuning read from `.rxsession.yml`.
///
/// Every key is optional; an absent key leaves the engine's own default in
/// place. Example:
///
/// ```yaml
/// backtrack-limit: 100000
/// delegate-size-limit: 10485760
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
#[serde(default, rename_all = "kebab-case", deny_unknown_fields)]
pub struct EngineConfig {
    /// Maximum backtracking steps per search before the engine gives up.
    pub backtrack_limit: Option<usize>,
    /// Size limit for the compiled delegate (non-backtracking) program.
    pub delegate_size_limit: Option<usize>,
    /// Size limit for the delegate's lazy DFA cache.
    pub delegate_dfa_size_limit: Option<usize>,
}

/// Load config from the given path, or look for `.rxsession.yml` in the
/// current directory. Returns the default config if the file doesn't exist.
pub fn load_config(path: Option<&Path>) -> Result<EngineConfig> {
    let config_path = match path {
        Some(p) => p.to_path_buf(),
        None => Path::new(CONFIG_FILE).to_path_buf(),
    };

    if !config_path.exists() {
        debug!(path = %config_path.display(), "no engine config found, using defaults");
        return Ok(EngineConfig::default());
    }

    let contents = std::fs::read_to_string(&config_path)
        .with_context(|| format!("failed to read config {}", config_path.display()))?;
    if contents.trim().is_empty() {
        return Ok(EngineConfig::default());
    }
    let config: EngineConfig = serde_yml::from_str(&contents)
        .with_context(|| format!("failed to parse {}", config_path.display()))?;
    debug!(path = %config_path.display(), ?config, "loaded engine config");
    Ok(config)
}

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level cts config file structure.
#[derive(Debug, Deserialize, Serialize, Default, Clone)]
pub struct CtsConfig {
    /// Database to open when --db is not given.
    pub database: Option<PathBuf>,
    /// Constrain every selection to this folder and its subfolders.
    pub relative_path_constraint: Option<String>,
    /// Note field carrying `episode:index/count` markers, enabling
    /// episode-wide selections.
    pub episode_note_field: Option<String>,
}

impl CtsConfig {
    /// Load config from ~/.cts/config.toml. Returns default if file doesn't exist.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            return Ok(CtsConfig::default());
        }
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config: {}", path.display()))?;
        let config: CtsConfig =
            toml::from_str(&content).with_context(|| "Failed to parse config.toml")?;
        Ok(config)
    }
}

/// Path to the config file: ~/.cts/config.toml
pub fn config_path() -> Result<PathBuf> {
    let home = dirs::home_dir().context("Could not determine home directory")?;
    Ok(home.join(".cts").join("config.toml"))
}

/// Default config template content.
pub fn default_config_template() -> &'static str {
    r#"# ~/.cts/config.toml

# database = "/path/to/cts.db"

# Constrain every selection to a folder and its subfolders
# relative_path_constraint = "Station1"

# Note field carrying episode markers (e.g. "25:1/8"), enabling --episodes
# episode_note_field = "Episode"
"#
}

/// Create the default config file if it doesn't already exist.
pub fn init_config() -> Result<bool> {
    let path = config_path()?;
    if path.exists() {
        return Ok(false);
    }
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(&path, default_config_template())?;
    Ok(true)
}

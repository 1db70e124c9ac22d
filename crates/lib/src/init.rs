//! Initialize the configuration directory: create ~/.phoenix and a default config file.

use anyhow::{Context, Result};
use std::path::{Path, PathBuf};

use crate::config::Config;

/// Create the config directory and default config if they do not exist.
/// - Creates the config directory (parent of config file path).
/// - Writes `config.json` with every default spelled out if missing. The API key stays null;
///   set it there or export GOOGLE_API_KEY.
pub fn init_config_dir(config_path: &Path) -> Result<PathBuf> {
    let config_dir = config_path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    std::fs::create_dir_all(config_dir)
        .with_context(|| format!("creating config directory {}", config_dir.display()))?;

    if !config_path.exists() {
        let default_config = serde_json::to_string_pretty(&Config::default())
            .context("serializing default config")?;
        std::fs::write(config_path, default_config)
            .with_context(|| format!("writing default config to {}", config_path.display()))?;
        log::info!("created default config at {}", config_path.display());
    } else {
        log::debug!("config already exists at {}, skipping", config_path.display());
    }

    Ok(config_dir.to_path_buf())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::load_config;

    #[test]
    fn writes_loadable_defaults_once() {
        let dir = std::env::temp_dir().join(format!("phoenix-init-{}", uuid::Uuid::new_v4()));
        let path = dir.join("config.json");
        assert_eq!(init_config_dir(&path).unwrap(), dir);
        let (config, _) = load_config(Some(path.clone())).unwrap();
        assert_eq!(config.server.port, 8501);
        assert!(config.gemini.api_key.is_none());

        std::fs::write(&path, r#"{"server":{"port":9001}}"#).unwrap();
        init_config_dir(&path).unwrap();
        let (config, _) = load_config(Some(path)).unwrap();
        assert_eq!(config.server.port, 9001);
        let _ = std::fs::remove_dir_all(dir);
    }
}

//! Configuration types and loading.
//!
//! Config is loaded from a JSON file (e.g. `~/.phoenix/config.json`) and environment.
//! The only secret is the Gemini API key; everything else has a working default.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Top-level application config.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Config {
    /// HTTP server settings.
    #[serde(default)]
    pub server: ServerConfig,

    /// Gemini credential, endpoint and model priority.
    #[serde(default)]
    pub gemini: GeminiConfig,

    /// Impact estimation (phase 3) settings.
    #[serde(default)]
    pub impact: ImpactConfig,
}

/// Server bind and port.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ServerConfig {
    /// Port for the page and API (default 8501).
    #[serde(default = "default_server_port")]
    pub port: u16,

    /// Bind address (default "127.0.0.1").
    #[serde(default = "default_server_bind")]
    pub bind: String,

    /// Sessions unused for this many seconds are dropped (default 3600; 0 keeps them forever).
    #[serde(default = "default_session_idle_secs")]
    pub session_idle_secs: u64,
}

fn default_server_port() -> u16 {
    8501
}

fn default_server_bind() -> String {
    "127.0.0.1".to_string()
}

fn default_session_idle_secs() -> u64 {
    3600
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: default_server_port(),
            bind: default_server_bind(),
            session_idle_secs: default_session_idle_secs(),
        }
    }
}

/// Gemini API settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeminiConfig {
    /// API key. Overridden by GOOGLE_API_KEY (or GEMINI_API_KEY) env.
    #[serde(default)]
    pub api_key: Option<String>,

    /// API base URL. Overridden by GEMINI_API_BASE env. Default is the public v1beta endpoint.
    #[serde(default)]
    pub base_url: Option<String>,

    /// Preferred model ids, most preferred first. Ids without a `models/` prefix get one.
    #[serde(default = "default_model_priority")]
    pub model_priority: Vec<String>,

    /// Per-request timeout in seconds. Unset means the HTTP client default (none).
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
}

fn default_model_priority() -> Vec<String> {
    vec![
        "models/gemini-2.5-flash".to_string(),
        "models/gemini-2.0-flash".to_string(),
        "models/gemini-1.5-flash".to_string(),
    ]
}

impl Default for GeminiConfig {
    fn default() -> Self {
        Self {
            api_key: None,
            base_url: None,
            model_priority: default_model_priority(),
            request_timeout_secs: None,
        }
    }
}

/// Shape the impact estimation reply is requested and parsed in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ImpactReplyFormat {
    /// JSON object with `ewaste_saved_g`, `co2_saved_kg`, `cost_saved_inr`.
    #[default]
    Json,
    /// One line of `Waste: .., CO2: .., Money: ..` pairs.
    KeyValue,
}

/// Impact estimation settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImpactConfig {
    #[serde(default)]
    pub reply_format: ImpactReplyFormat,

    /// How many characters of the diagnosis are embedded in the estimation prompt (default 200).
    #[serde(default = "default_diagnosis_prefix_chars")]
    pub diagnosis_prefix_chars: usize,
}

fn default_diagnosis_prefix_chars() -> usize {
    200
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            reply_format: ImpactReplyFormat::default(),
            diagnosis_prefix_chars: default_diagnosis_prefix_chars(),
        }
    }
}

fn non_empty_env(name: &str) -> Option<String> {
    std::env::var(name).ok().and_then(|s| {
        let t = s.trim();
        if t.is_empty() {
            None
        } else {
            Some(t.to_string())
        }
    })
}

/// Resolve the Gemini API key: env GOOGLE_API_KEY, then GEMINI_API_KEY, then config.
pub fn resolve_api_key(config: &Config) -> Option<String> {
    non_empty_env("GOOGLE_API_KEY")
        .or_else(|| non_empty_env("GEMINI_API_KEY"))
        .or_else(|| {
            config
                .gemini
                .api_key
                .as_ref()
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
        })
}

/// Resolve the Gemini base URL: env GEMINI_API_BASE overrides config. None means the client default.
pub fn resolve_api_base(config: &Config) -> Option<String> {
    non_empty_env("GEMINI_API_BASE").or_else(|| {
        config
            .gemini
            .base_url
            .as_ref()
            .map(|s| s.trim().to_string())
            .filter(|s| !s.is_empty())
    })
}

/// True if the bind address is loopback (127.0.0.1, ::1, etc.).
pub fn is_loopback_bind(bind: &str) -> bool {
    let b = bind.trim();
    b == "127.0.0.1" || b == "::1" || b == "localhost"
}

/// Resolve config path from env or default.
pub fn default_config_path() -> PathBuf {
    std::env::var("PHOENIX_CONFIG_PATH")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            dirs::home_dir()
                .map(|h| h.join(".phoenix").join("config.json"))
                .unwrap_or_else(|| PathBuf::from("config.json"))
        })
}

/// Load config from the given path, or the default path (or PHOENIX_CONFIG_PATH). Missing file => default config.
/// Returns the config and the path that was used.
pub fn load_config(path: Option<PathBuf>) -> Result<(Config, PathBuf)> {
    let path = path.unwrap_or_else(default_config_path);
    let config = if !path.exists() {
        log::debug!("config file not found, using defaults: {}", path.display());
        Config::default()
    } else {
        let s = std::fs::read_to_string(&path)
            .with_context(|| format!("reading config from {}", path.display()))?;
        serde_json::from_str(&s)
            .with_context(|| format!("parsing config from {}", path.display()))?
    };
    Ok((config, path))
}

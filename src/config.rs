use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::env;
use std::fs;
use std::path::PathBuf;

use crate::error::Result;

pub const DEFAULT_MODEL: &str = "MiniMax-M2.5";

pub const VALID_MODELS: &[&str] = &[
    "MiniMax-M2.5",
    "MiniMax-M2.5-highspeed",
    "MiniMax-M2.1",
    "MiniMax-M2.1-highspeed",
];

pub const DEFAULT_THEME: &str = "tokyo-night";

/// One configured external tool server: a subprocess command plus
/// optional arguments and environment.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct McpServerConfig {
    pub command: String,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AppConfig {
    #[serde(default)]
    pub api_key: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_theme")]
    pub theme: String,
    #[serde(default)]
    pub mcp_servers: HashMap<String, McpServerConfig>,
    #[serde(default)]
    pub verbose: bool,
}

fn default_model() -> String {
    DEFAULT_MODEL.to_string()
}

fn default_theme() -> String {
    DEFAULT_THEME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_key: String::new(),
            model: DEFAULT_MODEL.to_string(),
            theme: DEFAULT_THEME.to_string(),
            mcp_servers: HashMap::new(),
            verbose: false,
        }
    }
}

/// Path to the state directory (~/.mmcode).
pub fn config_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".mmcode")
}

pub fn config_file() -> PathBuf {
    config_dir().join("config.json")
}

/// Load the config, creating a default file on first run. A saved model
/// that is no longer valid is reset to the default and written back so
/// the file stays forward-compatible.
pub fn load_config() -> AppConfig {
    let dir = config_dir();
    let file = config_file();

    if !dir.exists() {
        let _ = fs::create_dir_all(&dir);
    }

    if !file.exists() {
        let config = AppConfig::default();
        let _ = save_config(&config);
        return apply_env_overrides(config);
    }

    let config = match fs::read_to_string(&file) {
        Ok(raw) => match serde_json::from_str::<AppConfig>(&raw) {
            Ok(mut config) => {
                if !VALID_MODELS.contains(&config.model.as_str()) {
                    config.model = DEFAULT_MODEL.to_string();
                    let _ = save_config(&config);
                }
                config
            }
            Err(_) => AppConfig::default(),
        },
        Err(_) => AppConfig::default(),
    };

    apply_env_overrides(config)
}

fn apply_env_overrides(mut config: AppConfig) -> AppConfig {
    if let Ok(key) = env::var("MMCODE_API_KEY") {
        if !key.is_empty() {
            config.api_key = key;
        }
    }
    if env::var("MMCODE_VERBOSE").map(|v| v == "true").unwrap_or(false) {
        config.verbose = true;
    }
    config
}

pub fn save_config(config: &AppConfig) -> Result<()> {
    let dir = config_dir();
    if !dir.exists() {
        fs::create_dir_all(&dir)?;
    }
    let json = serde_json::to_string_pretty(config)?;
    fs::write(config_file(), json)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_has_expected_values() {
        let config = AppConfig::default();
        assert_eq!(config.api_key, "");
        assert_eq!(config.model, "MiniMax-M2.5");
        assert_eq!(config.theme, "tokyo-night");
        assert!(config.mcp_servers.is_empty());
        assert!(!config.verbose);
    }

    #[test]
    fn config_round_trip() {
        let mut config = AppConfig {
            api_key: "test-key-123".to_string(),
            model: "MiniMax-M2.5-highspeed".to_string(),
            theme: "gruvbox".to_string(),
            mcp_servers: HashMap::new(),
            verbose: true,
        };
        config.mcp_servers.insert(
            "files".to_string(),
            McpServerConfig {
                command: "mcp-files".to_string(),
                args: vec!["--root".to_string(), ".".to_string()],
                env: HashMap::new(),
            },
        );

        let json = serde_json::to_string(&config).unwrap();
        let loaded: AppConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(loaded.api_key, "test-key-123");
        assert_eq!(loaded.model, "MiniMax-M2.5-highspeed");
        assert_eq!(loaded.mcp_servers["files"].command, "mcp-files");
    }

    #[test]
    fn config_deserializes_with_missing_fields() {
        let json = r#"{"apiKey": "abc"}"#;
        let config: AppConfig = serde_json::from_str(json).unwrap();
        assert_eq!(config.api_key, "abc");
        assert_eq!(config.model, "MiniMax-M2.5");
        assert_eq!(config.theme, "tokyo-night");
    }
}

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;

/// Environment variable holding the base64-encoded 32-byte encryption key.
pub const ENCRYPTION_KEY_ENV: &str = "ASKDATA_ENCRYPTION_KEY";

/// Environment variable naming an optional TOML config file.
pub const CONFIG_PATH_ENV: &str = "ASKDATA_CONFIG";

/// Complete service configuration
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub storage: StorageConfig,
    #[serde(default)]
    pub adobe: AdobeConfig,
}

/// HTTP server configuration
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// When false every request acts as the `default` owner
    #[serde(default)]
    pub auth_enabled: bool,
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    3000
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            auth_enabled: false,
        }
    }
}

/// Settings database configuration
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    #[serde(default = "default_database_path")]
    pub database_path: String,
}

fn default_database_path() -> String {
    "askdata.db".to_string()
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
        }
    }
}

/// Adobe Analytics endpoints and transport settings
#[derive(Debug, Clone, Deserialize)]
pub struct AdobeConfig {
    /// Identity (IMS) host used for the client-credentials exchange
    #[serde(default = "default_ims_url")]
    pub ims_url: String,
    /// Reporting API base URL
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_seconds: u64,
    /// Serialize token refreshes per owner instead of letting them race
    #[serde(default)]
    pub serialize_token_refresh: bool,
}

fn default_ims_url() -> String {
    "https://ims-na1.adobelogin.com".to_string()
}

fn default_api_url() -> String {
    "https://analytics.adobe.io/api".to_string()
}

fn default_request_timeout() -> u64 {
    30
}

impl Default for AdobeConfig {
    fn default() -> Self {
        Self {
            ims_url: default_ims_url(),
            api_url: default_api_url(),
            request_timeout_seconds: default_request_timeout(),
            serialize_token_refresh: false,
        }
    }
}

/// Load configuration from TOML file
pub fn load_config<P: AsRef<Path>>(path: P) -> Result<AppConfig> {
    let path = path.as_ref();
    let contents = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read config file {}", path.display()))?;
    toml::from_str(&contents).context("Failed to parse config file")
}

/// Load configuration from `ASKDATA_CONFIG` if set, otherwise defaults.
pub fn load_from_env() -> Result<AppConfig> {
    match std::env::var(CONFIG_PATH_ENV) {
        Ok(path) => load_config(path),
        Err(_) => Ok(AppConfig::default()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = AppConfig::default();
        assert_eq!(config.server.port, 3000);
        assert!(!config.server.auth_enabled);
        assert_eq!(config.storage.database_path, "askdata.db");
        assert_eq!(config.adobe.ims_url, "https://ims-na1.adobelogin.com");
        assert_eq!(config.adobe.api_url, "https://analytics.adobe.io/api");
        assert_eq!(config.adobe.request_timeout_seconds, 30);
        assert!(!config.adobe.serialize_token_refresh);
    }

    #[test]
    fn test_config_deserialization() {
        let toml = r#"
            [server]
            host = "127.0.0.1"
            port = 8080
            auth_enabled = true

            [storage]
            database_path = "/var/lib/askdata/settings.db"

            [adobe]
            ims_url = "http://localhost:9000"
            api_url = "http://localhost:9001/api"
            request_timeout_seconds = 5
            serialize_token_refresh = true
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.server.host, "127.0.0.1");
        assert_eq!(config.server.port, 8080);
        assert!(config.server.auth_enabled);
        assert_eq!(config.storage.database_path, "/var/lib/askdata/settings.db");
        assert_eq!(config.adobe.ims_url, "http://localhost:9000");
        assert_eq!(config.adobe.request_timeout_seconds, 5);
        assert!(config.adobe.serialize_token_refresh);
    }

    #[test]
    fn test_partial_config() {
        let toml = r#"
            [adobe]
            request_timeout_seconds = 10
        "#;

        let config: AppConfig = toml::from_str(toml).unwrap();
        assert_eq!(config.adobe.request_timeout_seconds, 10);
        assert_eq!(config.adobe.api_url, "https://analytics.adobe.io/api"); // Default
        assert_eq!(config.server.port, 3000); // Default
    }

    #[test]
    fn test_load_config_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "[server]\nport = 4100").unwrap();

        let config = load_config(file.path()).unwrap();
        assert_eq!(config.server.port, 4100);
    }

    #[test]
    fn test_load_config_missing_file() {
        let err = load_config("/nonexistent/askdata.toml").unwrap_err();
        assert!(err.to_string().contains("Failed to read config file"));
    }
}

use serde::{Deserialize, Serialize};
use std::path::Path;

/// Top-level application configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    pub server: ServerConfig,
    pub storage: StorageConfig,
    pub delivery: DeliveryConfig,
    pub observability: ObservabilityConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

/// Azure Blob Storage access and probe settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Storage account name (`AZURE_STORAGE_ACCOUNT_NAME`).
    #[serde(default)]
    pub account_name: String,
    /// SAS query string, with or without the leading `?` (`AZURE_SAS_TOKEN`).
    #[serde(default)]
    pub sas_token: String,
    /// Base URL override. Empty means `https://{account_name}.blob.core.windows.net`.
    #[serde(default)]
    pub endpoint: String,
    /// Containers tried by the video prober, in priority order.
    pub containers: Vec<String>,
    /// Container serving thumbnails for the image proxy.
    pub thumbnail_container: String,
    /// Highest `día N` folder tried by the secondary fallback sweep.
    #[serde(default = "default_fallback_max_day")]
    pub fallback_max_day: u32,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

fn default_fallback_max_day() -> u32 {
    5
}
fn default_request_timeout_secs() -> u64 {
    30
}
fn default_debug_headers() -> bool {
    AppConfig::env_name() == "development"
}

impl StorageConfig {
    /// Both the account name and the SAS token are required to talk to Azure.
    pub fn missing_credentials(&self) -> Option<&'static str> {
        if self.account_name.trim().is_empty() {
            Some("AZURE_STORAGE_ACCOUNT_NAME is not set")
        } else if self.sas_token.trim().trim_start_matches('?').is_empty() {
            Some("AZURE_SAS_TOKEN is not set")
        } else {
            None
        }
    }

    /// Resolved base URL of the blob service, without a trailing slash.
    pub fn base_url(&self) -> String {
        if self.endpoint.is_empty() {
            format!("https://{}.blob.core.windows.net", self.account_name)
        } else {
            self.endpoint.trim_end_matches('/').to_string()
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Emit `X-Source-Container` / `X-Source-Path` on video responses.
    /// Defaults to on only in the `development` environment.
    #[serde(default = "default_debug_headers")]
    pub debug_headers: bool,
    pub image_cache_control: String,
    pub cors_allowed_origins: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObservabilityConfig {
    pub log_level: String,
    pub log_format: String,
}

impl AppConfig {
    /// Load configuration with layered overrides:
    /// 1. config/default.toml (built-in defaults if absent)
    /// 2. config/{env}.toml (based on FITSAGA_ENV)
    /// 3. Environment variables
    pub fn load() -> anyhow::Result<Self> {
        let default_path = Path::new("config/default.toml");
        let mut config: AppConfig = match std::fs::read_to_string(default_path) {
            Ok(content) => toml::from_str(&content).map_err(|e| {
                anyhow::anyhow!("failed to parse {}: {}", default_path.display(), e)
            })?,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => AppConfig::default(),
            Err(e) => {
                return Err(anyhow::anyhow!(
                    "failed to read {}: {}",
                    default_path.display(),
                    e
                ))
            }
        };

        // Layer 2: environment-specific overrides
        let env_name = Self::env_name();
        let env_path = format!("config/{}.toml", env_name);
        if let Ok(env_content) = std::fs::read_to_string(&env_path) {
            let env_config: AppConfig = toml::from_str(&env_content)
                .map_err(|e| anyhow::anyhow!("failed to parse {}: {}", env_path, e))?;
            config = env_config;
        }

        // Layer 3: environment variable overrides (selected keys)
        Self::apply_env_overrides(&mut config);

        Ok(config)
    }

    /// Deployment environment name, `development` unless FITSAGA_ENV says otherwise.
    pub fn env_name() -> String {
        std::env::var("FITSAGA_ENV").unwrap_or_else(|_| "development".to_string())
    }

    fn apply_env_overrides(config: &mut AppConfig) {
        if let Ok(v) = std::env::var("AZURE_STORAGE_ACCOUNT_NAME") {
            config.storage.account_name = v;
        }
        if let Ok(v) = std::env::var("AZURE_SAS_TOKEN") {
            config.storage.sas_token = v;
        }
        if let Ok(v) = std::env::var("FITSAGA_STORAGE_ENDPOINT") {
            config.storage.endpoint = v;
        }
        if let Ok(v) = std::env::var("FITSAGA_STORAGE_CONTAINERS") {
            config.storage.containers = v
                .split(',')
                .map(|s| s.trim().to_string())
                .filter(|s| !s.is_empty())
                .collect();
        }
        if let Ok(v) = std::env::var("FITSAGA_SERVER_HOST") {
            config.server.host = v;
        }
        if let Ok(v) = std::env::var("FITSAGA_SERVER_PORT") {
            if let Ok(port) = v.parse() {
                config.server.port = port;
            }
        }
        if let Ok(v) = std::env::var("FITSAGA_DELIVERY_DEBUG_HEADERS") {
            if let Ok(flag) = v.parse() {
                config.delivery.debug_headers = flag;
            }
        }
        if let Ok(v) = std::env::var("FITSAGA_OBSERVABILITY_LOG_LEVEL") {
            config.observability.log_level = v;
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig {
                host: "0.0.0.0".to_string(),
                port: 3001,
            },
            storage: StorageConfig {
                account_name: String::new(),
                sas_token: String::new(),
                endpoint: String::new(),
                containers: vec![
                    "sagafitvideos".to_string(),
                    "sagathumbnails".to_string(),
                    "saga-videos".to_string(),
                    "sagavideos".to_string(),
                    "videos".to_string(),
                    "sagafit".to_string(),
                ],
                thumbnail_container: "sagathumbnails".to_string(),
                fallback_max_day: 5,
                request_timeout_secs: 30,
            },
            delivery: DeliveryConfig {
                debug_headers: default_debug_headers(),
                image_cache_control: "public, max-age=86400".to_string(),
                cors_allowed_origins: vec!["*".to_string()],
            },
            observability: ObservabilityConfig {
                log_level: "info".to_string(),
                log_format: "json".to_string(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_container_order() {
        let config = AppConfig::default();
        assert_eq!(config.storage.containers[0], "sagafitvideos");
        assert_eq!(config.storage.containers.len(), 6);
        assert_eq!(config.storage.fallback_max_day, 5);
    }

    #[test]
    fn test_missing_credentials() {
        let mut storage = AppConfig::default().storage;
        assert!(storage.missing_credentials().is_some());

        storage.account_name = "sagafit".to_string();
        assert_eq!(
            storage.missing_credentials(),
            Some("AZURE_SAS_TOKEN is not set")
        );

        storage.sas_token = "?".to_string();
        assert!(storage.missing_credentials().is_some());

        storage.sas_token = "sv=2024-11-04&sig=abc".to_string();
        assert!(storage.missing_credentials().is_none());
    }

    #[test]
    fn test_base_url() {
        let mut storage = AppConfig::default().storage;
        storage.account_name = "sagafit".to_string();
        assert_eq!(storage.base_url(), "https://sagafit.blob.core.windows.net");

        storage.endpoint = "http://127.0.0.1:10000/devstoreaccount1/".to_string();
        assert_eq!(storage.base_url(), "http://127.0.0.1:10000/devstoreaccount1");
    }

    #[test]
    fn test_parse_toml() {
        let content = r#"
            [server]
            host = "127.0.0.1"
            port = 8080

            [storage]
            account_name = "sagafit"
            containers = ["a", "b"]
            thumbnail_container = "thumbs"

            [delivery]
            image_cache_control = "no-cache"
            cors_allowed_origins = []

            [observability]
            log_level = "debug"
            log_format = "text"
        "#;
        let config: AppConfig = toml::from_str(content).unwrap();
        assert_eq!(config.server.port, 8080);
        assert_eq!(config.storage.containers, vec!["a", "b"]);
        assert_eq!(config.storage.fallback_max_day, 5);
        assert_eq!(config.storage.request_timeout_secs, 30);
        assert!(config.storage.sas_token.is_empty());
        assert_eq!(
            config.delivery.debug_headers,
            AppConfig::env_name() == "development"
        );
    }

    #[test]
    fn test_shipped_config_debug_headers() {
        // The base layer leaves debug headers to the environment rule.
        let base: AppConfig = toml::from_str(include_str!("../../config/default.toml")).unwrap();
        assert_eq!(
            base.delivery.debug_headers,
            AppConfig::env_name() == "development"
        );

        let production: AppConfig =
            toml::from_str(include_str!("../../config/production.toml")).unwrap();
        assert!(!production.delivery.debug_headers);
    }
}

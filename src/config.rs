//! Console configuration.
//!
//! Loaded from a JSON file or from `CATALOG_*` environment variables. Only
//! the database URL and the web API key are required.

use crate::auth::{IDENTITY_TOOLKIT_V1_API, SECURE_TOKEN_V1_API};
use crate::catalog::{SyncOptions, WritePolicy};
use crate::database::DatabasePath;
use serde::{Deserialize, Serialize};
use std::path::Path;
use thiserror::Error;
use url::Url;

pub const ENV_DATABASE_URL: &str = "CATALOG_DATABASE_URL";
pub const ENV_API_KEY: &str = "CATALOG_API_KEY";
pub const ENV_PRODUCTS_PATH: &str = "CATALOG_PRODUCTS_PATH";
pub const ENV_MAX_RETRIES: &str = "CATALOG_MAX_RETRIES";
pub const ENV_WRITE_POLICY: &str = "CATALOG_WRITE_POLICY";

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("missing required setting: {0}")]
    Missing(&'static str),
    #[error("invalid setting {name}: {reason}")]
    Invalid { name: &'static str, reason: String },
    #[error("failed to read config file: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config file: {0}")]
    Json(#[from] serde_json::Error),
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// e.g. `https://my-project-default-rtdb.firebaseio.com`
    pub database_url: String,
    /// The project's web API key.
    pub api_key: String,
    #[serde(default = "default_products_path")]
    pub products_path: String,
    #[serde(default = "default_auth_base_url")]
    pub auth_base_url: String,
    #[serde(default = "default_token_url")]
    pub token_url: String,
    /// Transient-failure retries per HTTP call. 0 sends each call once.
    #[serde(default)]
    pub max_retries: u32,
    #[serde(default)]
    pub sync: SyncOptions,
}

fn default_products_path() -> String {
    "products".to_string()
}

fn default_auth_base_url() -> String {
    IDENTITY_TOOLKIT_V1_API.to_string()
}

fn default_token_url() -> String {
    SECURE_TOKEN_V1_API.to_string()
}

impl CatalogConfig {
    pub fn new(database_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        Self {
            database_url: database_url.into(),
            api_key: api_key.into(),
            products_path: default_products_path(),
            auth_base_url: default_auth_base_url(),
            token_url: default_token_url(),
            max_retries: 0,
            sync: SyncOptions::default(),
        }
    }

    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)?;
        let config: Self = serde_json::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = lookup(ENV_DATABASE_URL).ok_or(ConfigError::Missing(ENV_DATABASE_URL))?;
        let api_key = lookup(ENV_API_KEY).ok_or(ConfigError::Missing(ENV_API_KEY))?;
        let mut config = Self::new(database_url, api_key);

        if let Some(path) = lookup(ENV_PRODUCTS_PATH) {
            config.products_path = path;
        }
        if let Some(retries) = lookup(ENV_MAX_RETRIES) {
            config.max_retries = retries.trim().parse().map_err(|e| ConfigError::Invalid {
                name: ENV_MAX_RETRIES,
                reason: format!("{}", e),
            })?;
        }
        if let Some(policy) = lookup(ENV_WRITE_POLICY) {
            config.sync.write_policy = match policy.trim().to_ascii_lowercase().as_str() {
                "optimistic" => WritePolicy::Optimistic,
                "confirmed" => WritePolicy::Confirmed,
                other => {
                    return Err(ConfigError::Invalid {
                        name: ENV_WRITE_POLICY,
                        reason: format!("unknown policy '{}'", other),
                    })
                }
            };
        }

        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = Url::parse(&self.database_url).map_err(|e| ConfigError::Invalid {
            name: "database_url",
            reason: e.to_string(),
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(ConfigError::Invalid {
                name: "database_url",
                reason: format!("unsupported scheme '{}'", url.scheme()),
            });
        }
        if self.api_key.trim().is_empty() {
            return Err(ConfigError::Missing("api_key"));
        }
        self.products_root()?;
        Ok(())
    }

    pub fn products_root(&self) -> Result<DatabasePath, ConfigError> {
        let path = DatabasePath::parse(&self.products_path).map_err(|e| ConfigError::Invalid {
            name: "products_path",
            reason: e.to_string(),
        })?;
        if path.is_root() {
            return Err(ConfigError::Invalid {
                name: "products_path",
                reason: "must not be the database root".into(),
            });
        }
        Ok(path)
    }
}

//! Core of a single-tenant product catalog admin console backed by Firebase.
//!
//! [`CatalogApp`] wires the pieces together from a [`CatalogConfig`]:
//! email/password sign-in ([`auth`]), Realtime Database access
//! ([`database`]) and the dashboard's product list ([`catalog`]).
//! Database calls carry the signed-in user's token, so the database's
//! security rules decide what the console may read and write.

pub mod auth;
pub mod catalog;
pub mod config;
pub mod core;
pub mod database;


use crate::auth::FirebaseAuth;
use crate::catalog::CatalogSynchronizer;
use crate::config::{CatalogConfig, ConfigError};
use crate::core::middleware::SessionTokenMiddleware;
use crate::database::{FirebaseDatabase, StoreError};

pub struct CatalogApp {
    config: CatalogConfig,
    auth: FirebaseAuth,
}

impl CatalogApp {
    pub fn new(config: CatalogConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        let auth = FirebaseAuth::new_with_url(
            config.api_key.clone(),
            config.auth_base_url.clone(),
            config.token_url.clone(),
            config.max_retries,
        );
        Ok(Self { config, auth })
    }

    pub fn config(&self) -> &CatalogConfig {
        &self.config
    }

    /// The identity client. Clones share one session.
    pub fn auth(&self) -> FirebaseAuth {
        self.auth.clone()
    }

    /// A database client that authenticates as the signed-in user.
    pub fn database(&self) -> Result<FirebaseDatabase, StoreError> {
        let client = crate::core::client_builder(self.config.max_retries)
            .with(SessionTokenMiddleware::new(self.auth.clone()))
            .build();
        FirebaseDatabase::new(client, &self.config.database_url)
    }

    /// A fresh dashboard over the configured products collection. Call
    /// [`CatalogSynchronizer::load`] before showing it.
    pub fn catalog(&self) -> Result<CatalogSynchronizer<FirebaseDatabase>, ConfigError> {
        let root = self.config.products_root()?;
        let database = self.database().map_err(|e| ConfigError::Invalid {
            name: "database_url",
            reason: e.to_string(),
        })?;
        Ok(CatalogSynchronizer::new(database, root, self.config.sync.clone()))
    }
}

//! API module - HTTP handlers and middleware.

pub mod dto;
pub mod handlers;
pub mod middleware;
pub mod openapi;
pub mod routes;

use std::sync::Arc;

use crate::config::Config;
use crate::services::auth_service::AuthService;
use crate::storage::CatalogueStore;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub config: Arc<Config>,
    pub store: Arc<dyn CatalogueStore>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<dyn CatalogueStore>) -> Self {
        Self {
            config: Arc::new(config),
            store,
        }
    }

    pub fn auth_service(&self) -> AuthService {
        AuthService::new(self.store.clone(), self.config.clone())
    }
}

pub type SharedState = Arc<AppState>;

//! Application state for broker service.

use std::sync::Arc;

use common::config::AppConfig;

use crate::grants::AdminPools;
use crate::registry::RelationBroker;

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    pub config: AppConfig,
    pub broker: Arc<RelationBroker>,
}

impl AppState {
    /// Creates a new application state over the configured admin URLs.
    pub fn new(config: AppConfig) -> Self {
        let grants = Arc::new(AdminPools::new(config.clone()));
        Self {
            broker: Arc::new(RelationBroker::new(config.clone(), grants)),
            config,
        }
    }
}

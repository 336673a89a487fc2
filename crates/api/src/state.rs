use std::sync::Arc;

use stemsep_core::engine::SeparationEngine;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone: everything sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Job submission, polling and download services.
    pub engine: Arc<SeparationEngine>,
    pub config: Arc<ServerConfig>,
}

impl AppState {
    pub fn new(engine: SeparationEngine, config: ServerConfig) -> Self {
        Self {
            engine: Arc::new(engine),
            config: Arc::new(config),
        }
    }
}

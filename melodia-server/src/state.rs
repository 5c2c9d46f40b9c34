//! Shared application state injected into every Axum handler.

use std::sync::Arc;
use std::time::Instant;

use melodia_core::{ProviderClient, Scheduler};

use crate::config::Config;

/// State shared across all HTTP handlers.
#[derive(Clone)]
pub struct AppState {
    /// Server configuration (env-derived).
    pub config: Arc<Config>,
    /// Owns every task admitted through the music routes.
    pub scheduler: Scheduler,
    /// Same client the scheduler submits through; used for raw record lookups.
    pub provider: Arc<dyn ProviderClient>,
    pub started_at: Instant,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

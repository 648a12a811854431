//! Shared application state for all routes. Config and model are fixed after startup.

use crate::config::{ApiConfig, ResolvedModel};
use crate::store::DbPool;
use std::sync::Arc;

#[derive(Clone)]
pub struct AppState {
    pub pool: DbPool,
    pub config: Arc<ApiConfig>,
    pub model: Arc<ResolvedModel>,
}

impl AppState {
    pub fn new(pool: DbPool, config: ApiConfig, model: ResolvedModel) -> Self {
        AppState {
            pool,
            config: Arc::new(config),
            model: Arc::new(model),
        }
    }
}

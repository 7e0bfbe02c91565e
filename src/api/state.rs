//! Application state for shared services

use std::sync::Arc;

use crate::CacheContext;

/// Application state handed to every handler
#[derive(Debug, Clone)]
pub struct AppState {
    pub context: Arc<CacheContext>,
}

impl AppState {
    pub fn new(context: CacheContext) -> Self {
        Self {
            context: Arc::new(context),
        }
    }
}

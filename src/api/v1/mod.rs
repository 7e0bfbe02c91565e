//! Versioned data endpoints

pub mod chains;

use axum::{routing::get, Router};

use super::state::AppState;

/// Create v1 API router
pub fn create_v1_router() -> Router<AppState> {
    Router::new().route("/chains", get(chains::list_chains))
}

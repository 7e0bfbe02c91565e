//! Known chain identifiers, served from the periodic dataset

use axum::{extract::State, Json};
use serde::Serialize;
use tracing::debug;

use crate::CHAINS_DATASET;
use crate::api::error::ApiError;
use crate::api::state::AppState;

#[derive(Debug, Serialize)]
pub struct ChainsResponse {
    pub chains: Vec<String>,
    pub count: usize,
}

impl ChainsResponse {
    pub fn new(chains: Vec<String>) -> Self {
        Self {
            count: chains.len(),
            chains,
        }
    }
}

/// GET /v1/chains
pub async fn list_chains(State(state): State<AppState>) -> Result<Json<ChainsResponse>, ApiError> {
    debug!("Listing known chains");

    let cache = state
        .context
        .chains
        .as_ref()
        .ok_or_else(|| ApiError::not_found("Chain registry is not configured"))?;

    let chains = cache.get(CHAINS_DATASET).await.map_err(ApiError::from)?;

    Ok(Json(ChainsResponse::new(chains)))
}

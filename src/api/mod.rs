//! API layer - health, readiness, metrics and dataset endpoints

pub mod error;
pub mod health;
pub mod router;
pub mod state;
pub mod v1;

pub use error::ApiError;
pub use router::create_router;
pub use state::AppState;

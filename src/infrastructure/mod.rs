//! Infrastructure layer - Store backends, outbound HTTP and caching engines

pub mod cache;
pub mod http;
pub mod logging;
pub mod observability;
pub mod periodic;
pub mod resource;
pub mod single_flight;

//! Outbound fetch domain - retry policy and request shapes

mod options;
mod request;

pub use options::FetchOptions;
pub use request::{HttpMethod, HttpResponse, RestRequest};

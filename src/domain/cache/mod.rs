//! Cache domain - Store capability and key canonicalization

mod key;
mod repository;

pub use key::{CacheKey, CacheKeyParams};
pub use repository::{validate_ttl, Cache, CacheExt};

#[cfg(test)]
pub use repository::mock::MockCache;

//! Resource caching

mod resource_cache;

pub use resource_cache::ResourceCache;

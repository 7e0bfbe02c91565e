use thiserror::Error;

/// Core domain errors
///
/// `Clone` is required: a single fill or upstream outcome is handed to every
/// caller that joined the same in-flight computation.
#[derive(Debug, Clone, Error, PartialEq)]
pub enum DomainError {
    #[error("Validation error: {message}")]
    Validation { message: String },

    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Upstream error: {url} - {message}")]
    Upstream { url: String, message: String },

    #[error("Rate limited: {url} - {message}")]
    RateLimited { url: String, message: String },

    #[error("Serialization error: {message}")]
    Serialization { message: String },

    #[error("Fill failed for '{namespace}': {message}")]
    Fill { namespace: String, message: String },

    #[error("Store unavailable: {message}")]
    StoreUnavailable { message: String },

    #[error("Cache error: {message}")]
    Cache { message: String },

    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl DomainError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
        }
    }

    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration {
            message: message.into(),
        }
    }

    pub fn upstream(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Upstream {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn rate_limited(url: impl Into<String>, message: impl Into<String>) -> Self {
        Self::RateLimited {
            url: url.into(),
            message: message.into(),
        }
    }

    pub fn serialization(message: impl Into<String>) -> Self {
        Self::Serialization {
            message: message.into(),
        }
    }

    pub fn fill(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Fill {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    pub fn store_unavailable(message: impl Into<String>) -> Self {
        Self::StoreUnavailable {
            message: message.into(),
        }
    }

    pub fn cache(message: impl Into<String>) -> Self {
        Self::Cache {
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Whether a retry of the same upstream call may succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Upstream { .. } | Self::RateLimited { .. })
    }
}

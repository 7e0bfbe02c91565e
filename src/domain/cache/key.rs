//! Cache key canonicalization

use std::collections::BTreeMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::domain::DomainError;

/// Canonical argument encodings longer than this are replaced by their digest
const MAX_INLINE_ARGS_LEN: usize = 128;

/// A key uniquely identifying one cached value: namespace plus canonical arguments
///
/// Equal logical requests always produce the same key, regardless of map
/// ordering in the arguments. Distinct requests never collide: namespaces are
/// restricted to `[A-Za-z0-9_.:-]`, canonical JSON never starts with `#`, and
/// digested keys always do.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CacheKey(String);

impl CacheKey {
    /// Builds a key from a namespace and serializable call arguments
    pub fn new<A: Serialize + ?Sized>(namespace: &str, args: &A) -> Result<Self, DomainError> {
        validate_namespace(namespace)?;

        let value = serde_json::to_value(args).map_err(|e| {
            DomainError::validation(format!(
                "Arguments for '{}' are not serializable: {}",
                namespace, e
            ))
        })?;

        Ok(Self::from_value(namespace, &value))
    }

    fn from_value(namespace: &str, value: &Value) -> Self {
        let mut canonical = String::new();
        write_canonical(value, &mut canonical);

        if canonical.len() > MAX_INLINE_ARGS_LEN {
            let digest = Sha256::digest(canonical.as_bytes());
            Self(format!("{}:#{}", namespace, hex::encode(digest)))
        } else {
            Self(format!("{}:{}", namespace, canonical))
        }
    }

    /// Returns the string representation of the key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for CacheKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

/// Parameters for building keys by hand, for resources with manual cache control
#[derive(Debug, Clone, Default)]
pub struct CacheKeyParams {
    /// Logical namespace, usually the resource identity
    pub namespace: String,
    /// Named components (sorted for consistency)
    pub components: BTreeMap<String, String>,
}

impl CacheKeyParams {
    /// Creates new cache key parameters for a namespace
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            components: BTreeMap::new(),
        }
    }

    /// Adds a component to the key parameters
    pub fn with_component(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.components.insert(key.into(), value.into());
        self
    }

    /// Builds the key; components are encoded like a string map argument
    pub fn build(&self) -> Result<CacheKey, DomainError> {
        CacheKey::new(&self.namespace, &self.components)
    }
}

fn validate_namespace(namespace: &str) -> Result<(), DomainError> {
    if namespace.is_empty() {
        return Err(DomainError::validation("Cache namespace must not be empty"));
    }

    let valid = namespace
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | '-' | '.' | ':'));

    if !valid {
        return Err(DomainError::validation(format!(
            "Invalid cache namespace '{}': only [A-Za-z0-9_.:-] allowed",
            namespace
        )));
    }

    Ok(())
}

/// Writes compact JSON with object members sorted by key at every depth
fn write_canonical(value: &Value, out: &mut String) {
    match value {
        Value::Object(map) => {
            let mut entries: Vec<(&String, &Value)> = map.iter().collect();
            entries.sort_by(|a, b| a.0.cmp(b.0));

            out.push('{');

            for (i, (k, v)) in entries.into_iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                out.push_str(&Value::String(k.clone()).to_string());
                out.push(':');
                write_canonical(v, out);
            }

            out.push('}');
        }
        Value::Array(items) => {
            out.push('[');

            for (i, item) in items.iter().enumerate() {
                if i > 0 {
                    out.push(',');
                }
                write_canonical(item, out);
            }

            out.push(']');
        }
        scalar => out.push_str(&scalar.to_string()),
    }
}

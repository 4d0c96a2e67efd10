//! Reference registry: a process-wide bidirectional map between arbitrary
//! non-primitive handles and stable string tags, grounded in the
//! `Arc<RwLock<_>>` registry pattern used by `gauss-engine::topic::TopicRegistry`.
//!
//! A handle declared via `ReferenceRegistry::create` survives a parse/serialize
//! round trip by identity: the parser emits a `Reference` IR node carrying the
//! tag, and reconstruction looks the tag back up in a registry available at
//! that time.

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use crate::error::CreateReferenceError;
use crate::value::Value;

#[derive(Debug, Default)]
struct Inner {
    by_tag: HashMap<String, Value>,
    tag_of: HashMap<usize, String>,
}

/// Bidirectional `tag <-> handle` table. Cheap to clone (`Arc` inside).
#[derive(Debug, Clone, Default)]
pub struct ReferenceRegistry {
    inner: Arc<RwLock<Inner>>,
}

impl ReferenceRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `handle` under `tag`. Fails if `tag` already names a
    /// *different* handle; re-registering the same handle under the same
    /// tag is idempotent.
    pub fn create(&self, tag: &str, handle: Value) -> Result<Value, CreateReferenceError> {
        let mut inner = self.inner.write().expect("reference registry poisoned");
        if let Some(existing) = inner.by_tag.get(tag) {
            if !existing.ptr_eq(&handle) {
                return Err(CreateReferenceError {
                    tag: tag.to_string(),
                });
            }
            return Ok(existing.clone());
        }
        inner.tag_of.insert(handle.identity(), tag.to_string());
        inner.by_tag.insert(tag.to_string(), handle.clone());
        tracing::debug!(tag, "registered external reference");
        Ok(handle)
    }

    /// Look up the tag a previously-registered handle was declared under,
    /// by pointer identity. Used by the parser's dispatch rule 1.
    pub fn tag_for(&self, handle: &Value) -> Option<String> {
        let inner = self.inner.read().expect("reference registry poisoned");
        inner.tag_of.get(&handle.identity()).cloned()
    }

    /// Resolve a tag back to its handle. Used by `fromJSON`/`deserialize`.
    pub fn resolve(&self, tag: &str) -> Option<Value> {
        let inner = self.inner.read().expect("reference registry poisoned");
        inner.by_tag.get(tag).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn create_then_resolve_round_trips() {
        let registry = ReferenceRegistry::new();
        let handle = Value::object(vec![]);
        registry.create("my-tag", handle.clone()).unwrap();
        assert!(registry.resolve("my-tag").unwrap().ptr_eq(&handle));
        assert_eq!(registry.tag_for(&handle).as_deref(), Some("my-tag"));
    }

    #[test]
    fn reregistering_same_handle_is_idempotent() {
        let registry = ReferenceRegistry::new();
        let handle = Value::object(vec![]);
        registry.create("tag", handle.clone()).unwrap();
        assert!(registry.create("tag", handle).is_ok());
    }

    #[test]
    fn registering_different_handle_under_same_tag_fails() {
        let registry = ReferenceRegistry::new();
        registry.create("tag", Value::object(vec![])).unwrap();
        let err = registry.create("tag", Value::object(vec![])).unwrap_err();
        assert_eq!(err.tag, "tag");
    }

    #[test]
    fn unknown_handle_has_no_tag() {
        let registry = ReferenceRegistry::new();
        assert!(registry.tag_for(&Value::object(vec![])).is_none());
    }
}

//! Public API (SPEC_FULL.md §2 "Public API"): a thin composition of the
//! parser, serializer, IR wire-form, reconstructor, and streaming driver.
//! None of these functions contain logic of their own — each is a few lines
//! gluing together operations defined in their respective modules, matching
//! how the teacher's top-level entry points are plain wrappers around
//! `parse`/`lower`/`codegen`.

use std::sync::Arc;

use crate::error::{CreateReferenceError, SerovalError};
use crate::feature::FeatureSet;
use crate::ir::types::Node;
use crate::parse::{parse_async, ParseOptions};
use crate::plugin::Plugin;
use crate::reconstruct::{ReconstructContext, SharedBindings};
use crate::reference::ReferenceRegistry;
use crate::serialize::{
    cross_serialize as cross_serialize_ir, serialize_from_node, CrossContext, SerializeConfig,
};
use crate::stream::{cross_serialize_stream as start_stream, StreamHandle, StreamOptions};
use crate::value::Value;

/// Caller-facing options shared by every top-level operation. Defaults to
/// every feature enabled, no plugins, a fresh reference registry, and a
/// call-local reconstruction table — the same defaults
/// `ParseOptions`/`SerializeConfig` use on their own.
#[derive(Clone, Default)]
pub struct SerovalOptions {
    pub disabled_features: FeatureSet,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub references: ReferenceRegistry,
    /// Shared `RefId -> Value` table for `fromJSON`/`deserialize` (SPEC_FULL.md
    /// §6 `refs`): pass the same table across several calls reconstructing
    /// chunks produced against one `crossSerialize`/`crossSerializeStream`
    /// scope, so a later chunk's `IndexedValue`/`Reference` resolves against
    /// ids an earlier chunk already bound. `None` reconstructs against a
    /// fresh, call-local table (the self-contained case).
    pub refs: Option<SharedBindings>,
}

impl SerovalOptions {
    fn parse_options(&self) -> ParseOptions {
        ParseOptions {
            features: FeatureSet::disabled(self.disabled_features),
            references: self.references.clone(),
            plugins: self.plugins.clone(),
        }
    }

    fn serialize_config(&self) -> SerializeConfig {
        SerializeConfig {
            features: FeatureSet::disabled(self.disabled_features),
            plugins: self.plugins.clone(),
        }
    }

    fn reconstruct_context(&self) -> ReconstructContext {
        match &self.refs {
            Some(shared) => ReconstructContext::with_shared_bindings(
                shared.clone(),
                self.references.clone(),
                self.plugins.clone(),
            ),
            None => ReconstructContext::new(self.references.clone(), self.plugins.clone()),
        }
    }
}

/// `serialize`: parse `value` synchronously and emit a self-contained
/// expression. Fails on an unsupported shape or a still-pending promise
/// (the sync parser never awaits — see `parse::sync`).
pub fn serialize(value: &Value, options: &SerovalOptions) -> Result<String, SerovalError> {
    let (node, _ctx) = crate::parse::parse(value, options.parse_options())?;
    serialize_from_node(&node, &options.serialize_config())
}

/// `serializeAsync`: parse `value` to completion — awaiting promises and
/// draining streams and Blob/File/Request/Response bodies — then emit a
/// self-contained expression.
pub async fn serialize_async(value: &Value, options: &SerovalOptions) -> Result<String, SerovalError> {
    let (node, _ctx) = parse_async(value, options.parse_options()).await?;
    serialize_from_node(&node, &options.serialize_config())
}

/// `toJSON`: parse `value` synchronously and return the IR as a JSON-safe
/// value, for callers that want to transport or persist the intermediate
/// tree rather than a source-text expression.
pub fn to_json(value: &Value, options: &SerovalOptions) -> Result<serde_json::Value, SerovalError> {
    let (node, _ctx) = crate::parse::parse(value, options.parse_options())?;
    Ok(crate::ir::json::to_value(&node))
}

/// `toJSONAsync`: async-parse `value` and return the IR as a JSON-safe value.
pub async fn to_json_async(
    value: &Value,
    options: &SerovalOptions,
) -> Result<serde_json::Value, SerovalError> {
    let (node, _ctx) = parse_async(value, options.parse_options()).await?;
    Ok(crate::ir::json::to_value(&node))
}

/// `compileJSON`: take a previously-produced IR tree (e.g. from `toJSON`)
/// and emit a self-contained expression from it directly, without
/// re-parsing a `Value`.
pub fn compile_json(ir: serde_json::Value, options: &SerovalOptions) -> Result<String, SerovalError> {
    let node = crate::ir::json::from_value(ir)?;
    serialize_from_node(&node, &options.serialize_config())
}

/// `fromJSON`: reconstruct a `Value` from a previously-produced IR tree,
/// against `options.refs` when set (cross-from-JSON) or a fresh table
/// otherwise.
pub fn from_json(ir: serde_json::Value, options: &SerovalOptions) -> Result<Value, SerovalError> {
    let node = crate::ir::json::from_value(ir)?;
    let ctx = options.reconstruct_context();
    crate::reconstruct::reconstruct_with(&ctx, &node)
}

/// `deserialize`: this crate has no embedded host to evaluate emitted
/// source text against (see `reconstruct`'s module doc comment), so the
/// deserializing half of a round trip is the IR-walking reconstruction —
/// `deserialize(serialize(v))` is modeled here as `from_json(to_json(v))`.
pub fn deserialize(node: &Node, options: &SerovalOptions) -> Result<Value, SerovalError> {
    let ctx = options.reconstruct_context();
    crate::reconstruct::reconstruct_with(&ctx, node)
}

/// `crossSerialize`: parse `value` synchronously and emit an expression
/// bound into the shared `$R[scopeId?]` table rather than a private IIFE.
pub fn cross_serialize(
    value: &Value,
    scope_id: Option<&str>,
    options: &SerovalOptions,
) -> Result<String, SerovalError> {
    let (node, _ctx) = crate::parse::parse(value, options.parse_options())?;
    let ctx = match scope_id {
        Some(s) => CrossContext::scoped(s.to_string()),
        None => CrossContext::global(),
    };
    cross_serialize_ir(&node, &ctx, &options.serialize_config())
}

/// `crossSerializeAsync`: async-parse `value`, then emit against the shared
/// `$R[scopeId?]` table.
pub async fn cross_serialize_async(
    value: &Value,
    scope_id: Option<&str>,
    options: &SerovalOptions,
) -> Result<String, SerovalError> {
    let (node, _ctx) = parse_async(value, options.parse_options()).await?;
    let ctx = match scope_id {
        Some(s) => CrossContext::scoped(s.to_string()),
        None => CrossContext::global(),
    };
    cross_serialize_ir(&node, &ctx, &options.serialize_config())
}

/// `crossSerializeStream`: open a streaming session against the shared
/// table; the caller adds roots via `StreamHandle::write`. `scope_id`
/// namespaces the shared table the same way `cross_serialize` does.
pub fn cross_serialize_stream(
    scope_id: Option<&str>,
    options: &SerovalOptions,
    on_serialize: Arc<dyn Fn(&str, &str) + Send + Sync>,
    on_done: Arc<dyn Fn() + Send + Sync>,
    on_error: Arc<dyn Fn(&str, SerovalError) + Send + Sync>,
) -> StreamHandle {
    start_stream(StreamOptions {
        scope: scope_id.map(str::to_string),
        features: FeatureSet::disabled(options.disabled_features),
        plugins: options.plugins.clone(),
        on_serialize,
        on_done,
        on_error,
    })
}

/// `createReference`: register `handle` under `tag` in `registry` so a
/// parse that encounters it by identity emits a `Reference` node instead of
/// walking its contents. Fails if `tag` already names a different handle.
pub fn create_reference(
    registry: &ReferenceRegistry,
    tag: &str,
    handle: Value,
) -> Result<Value, CreateReferenceError> {
    registry.create(tag, handle)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn serialize_round_trips_through_from_json() {
        let options = SerovalOptions::default();
        let value = Value::object(vec![(
            "a".into(),
            Value::number(1.0),
        )]);
        let ir = to_json(&value, &options).unwrap();
        let reconstructed = from_json(ir, &options).unwrap();
        assert!(matches!(reconstructed, Value::Object(_)));
    }

    #[test]
    fn serialize_infinity_round_trips_via_division_literal() {
        let options = SerovalOptions::default();
        let value = Value::number(f64::INFINITY);
        let text = serialize(&value, &options).unwrap();
        assert_eq!(text, "1/0");
    }

    #[test]
    fn serialize_plain_object_matches_concrete_scenario() {
        let options = SerovalOptions::default();
        let value = Value::object(vec![("a".into(), Value::number(1.0))]);
        let text = serialize(&value, &options).unwrap();
        assert_eq!(text, "({a:1})");
    }

    #[test]
    fn compile_json_matches_direct_serialize() {
        let options = SerovalOptions::default();
        let value = Value::string("hi");
        let ir = to_json(&value, &options).unwrap();
        let direct = serialize(&value, &options).unwrap();
        let compiled = compile_json(ir, &options).unwrap();
        assert_eq!(direct, compiled);
    }

    #[test]
    fn create_reference_then_parse_emits_reference_node() {
        let registry = ReferenceRegistry::new();
        let handle = Value::object(vec![]);
        create_reference(&registry, "my.tag", handle.clone()).unwrap();

        let options = SerovalOptions {
            references: registry,
            ..SerovalOptions::default()
        };
        let text = serialize(&handle, &options).unwrap();
        assert!(text.contains("my.tag"));
    }

    #[tokio::test]
    async fn serialize_async_resolves_a_pending_promise() {
        let options = SerovalOptions::default();
        let value = Value::promise_resolve(Value::number(42.0));
        let text = serialize_async(&value, &options).await.unwrap();
        assert!(text.contains("Promise.resolve"));
    }

    #[test]
    fn from_json_with_shared_refs_resolves_ids_bound_by_an_earlier_chunk() {
        use crate::ir::types::{ObjectFlag, ObjectRecord, PropertyKeyNode, RefId};
        use std::collections::HashMap;
        use std::sync::Mutex;

        let shared: crate::reconstruct::SharedBindings = Arc::new(Mutex::new(HashMap::new()));
        let options = SerovalOptions {
            refs: Some(shared),
            ..SerovalOptions::default()
        };

        let id = RefId::new(0);
        let first = Node::Object {
            id,
            record: ObjectRecord {
                keys: vec![PropertyKeyNode::Named("v".to_string())],
                values: vec![Node::Number { value: 1.0 }],
                size: 1,
            },
            flag: ObjectFlag::None,
        };
        let first_value = from_json(crate::ir::json::to_value(&first), &options).unwrap();

        let second = Node::IndexedValue { id };
        let second_value = from_json(crate::ir::json::to_value(&second), &options).unwrap();

        assert!(second_value.ptr_eq(&first_value));
    }
}

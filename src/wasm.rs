//! WASM bridge: the ambient surface for a crate whose whole job is
//! producing JS source text, grounded in the teacher's `src/wasm.rs`
//! (`wasm_bindgen` + `serde_wasm_bindgen`, JSON in, `JsValue` out).
//!
//! This crate's `Value` (`value::Value`) has no embedded JS host behind it
//! — it is the crate's own `Rc`/`RefCell` stand-in for one (see
//! `value.rs`'s module doc comment). A `JsValue` arriving across the WASM
//! boundary can only be reflected into the JSON-representable subset of
//! that model: objects, arrays, strings, numbers, bools, and null. Anything
//! needing the rest of the IR's range (`Map`, `Set`, cycles, `Promise`,
//! web-platform objects, …) is out of this bridge's reach from JS and is
//! exercised instead through the Rust-side `ops`/`value` APIs directly —
//! consistent with SPEC_FULL.md's non-goal of serializing host-specific
//! exotic objects.
//!
//! Process-global state (the reference registry) is a `thread_local!`
//! rather than a `static` behind a `Mutex`: `Value` holds `Rc`s and is not
//! `Send`, and a WASM module instance is single-threaded regardless.

use std::cell::RefCell;

use wasm_bindgen::prelude::*;

use crate::ops::{self, SerovalOptions};
use crate::reference::ReferenceRegistry;
use crate::value::{PropertyKey, Value};

thread_local! {
    static REGISTRY: ReferenceRegistry = ReferenceRegistry::new();
}

fn options_with_registry() -> SerovalOptions {
    SerovalOptions {
        references: REGISTRY.with(|r| r.clone()),
        ..SerovalOptions::default()
    }
}

/// Reflects the JSON-representable subset of `value::Value` from a parsed
/// `serde_json::Value`. Anything outside that subset (there is none —
/// `serde_json::Value` only ever has these five shapes) round-trips
/// faithfully; the limitation is everything `Value` can express that JSON
/// cannot (cycles, `Map`/`Set`, promises, …), which this function never
/// needs to produce since its input came from `serde_json::Value` in the
/// first place.
fn value_from_json(json: serde_json::Value) -> Value {
    match json {
        serde_json::Value::Null => Value::Null,
        serde_json::Value::Bool(b) => Value::Bool(b),
        serde_json::Value::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
        serde_json::Value::String(s) => Value::string(s),
        serde_json::Value::Array(items) => {
            Value::array(items.into_iter().map(value_from_json).collect())
        }
        serde_json::Value::Object(map) => Value::object(
            map.into_iter()
                .map(|(k, v)| (PropertyKey::Named(k), value_from_json(v)))
                .collect(),
        ),
    }
}

fn js_error(err: impl std::fmt::Display) -> JsValue {
    JsValue::from_str(&err.to_string())
}

/// Parse a JSON document and emit a self-contained expression reconstructing
/// it. Accepts exactly the shapes `JSON.parse` would produce on the JS side.
#[wasm_bindgen]
pub fn serialize_json(json: &str) -> Result<String, JsValue> {
    let parsed: serde_json::Value = serde_json::from_str(json).map_err(js_error)?;
    let value = value_from_json(parsed);
    ops::serialize(&value, &options_with_registry()).map_err(js_error)
}

/// Parse a JSON document and return the intermediate node tree as a JS
/// object, for callers that want to transport or cache the IR rather than
/// source text (`toJSON`).
#[wasm_bindgen]
pub fn to_json(json: &str) -> Result<JsValue, JsValue> {
    let parsed: serde_json::Value = serde_json::from_str(json).map_err(js_error)?;
    let value = value_from_json(parsed);
    let ir = ops::to_json(&value, &options_with_registry()).map_err(js_error)?;
    serde_wasm_bindgen::to_value(&ir).map_err(js_error)
}

/// Take a previously-produced IR tree (e.g. from [`to_json`]) and emit a
/// self-contained expression from it directly (`compileJSON`).
#[wasm_bindgen]
pub fn compile_json(ir: JsValue) -> Result<String, JsValue> {
    let ir_json: serde_json::Value = serde_wasm_bindgen::from_value(ir).map_err(js_error)?;
    ops::compile_json(ir_json, &options_with_registry()).map_err(js_error)
}

/// Register `tag` against a fresh opaque placeholder in this module
/// instance's reference registry, so a later `serialize_json`/`to_json`
/// call whose input structurally matches it — which cannot happen here,
/// since the placeholder never appears in JSON — would instead have to be
/// driven through the Rust-side `ops::create_reference` with a real
/// `Value` handle. Exposed so JS callers can pre-reserve a tag and detect
/// the `tag already registered` failure the same way the native API does.
#[wasm_bindgen]
pub fn create_reference(tag: &str) -> Result<(), JsValue> {
    let placeholder = Value::object(vec![]);
    REGISTRY.with(|r| ops::create_reference(r, tag, placeholder)).map_err(js_error)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn value_from_json_reflects_every_json_shape() {
        let parsed: serde_json::Value =
            serde_json::from_str(r#"{"a":[1,2.5,"s",true,null]}"#).unwrap();
        let value = value_from_json(parsed);
        assert!(matches!(value, Value::Object(_)));
    }

    #[test]
    fn serialize_json_emits_an_object_literal() {
        let text = serialize_json(r#"{"a":1}"#).unwrap();
        assert_eq!(text, "({a:1})");
    }
}

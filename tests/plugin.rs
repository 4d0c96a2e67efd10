//! Integration test for the plugin interface (§4.9 / plugin.rs): a
//! caller-registered plugin recognizes a value shape this crate has no
//! built-in case for, and its payload survives a full parse -> serialize
//! and parse -> reconstruct round trip.

use std::sync::Arc;

use valuegraph_seroval::error::SerovalError;
use valuegraph_seroval::ops::{self, SerovalOptions};
use valuegraph_seroval::plugin::Plugin;
use valuegraph_seroval::value::Value;

#[derive(Debug)]
struct ComplexNumberPlugin;

impl Plugin for ComplexNumberPlugin {
    fn tag(&self) -> &str {
        "demo.complex"
    }

    fn test(&self, value: &Value) -> bool {
        matches!(value, Value::String(s) if s.as_ref().starts_with("complex:"))
    }

    fn parse(&self, value: &Value) -> Result<serde_json::Value, SerovalError> {
        let Value::String(s) = value else {
            return Err(SerovalError::invariant("expected string"));
        };
        let rest = s.strip_prefix("complex:").unwrap();
        let mut parts = rest.split(',');
        let re: f64 = parts.next().unwrap().parse().unwrap();
        let im: f64 = parts.next().unwrap().parse().unwrap();
        Ok(serde_json::json!({ "re": re, "im": im }))
    }

    fn serialize(&self, payload: &serde_json::Value) -> Result<String, SerovalError> {
        Ok(format!(
            "{{re:{},im:{}}}",
            payload["re"].as_f64().unwrap(),
            payload["im"].as_f64().unwrap()
        ))
    }

    fn deserialize(&self, payload: &serde_json::Value) -> Result<Value, SerovalError> {
        Ok(Value::string(format!(
            "complex:{},{}",
            payload["re"].as_f64().unwrap(),
            payload["im"].as_f64().unwrap()
        )))
    }
}

fn options_with_plugin() -> SerovalOptions {
    SerovalOptions {
        plugins: vec![Arc::new(ComplexNumberPlugin) as Arc<dyn Plugin>],
        ..SerovalOptions::default()
    }
}

#[test]
fn plugin_handled_value_serializes_through_its_own_emitter() {
    let options = options_with_plugin();
    let value = Value::string("complex:1,2");
    let text = ops::serialize(&value, &options).unwrap();
    assert_eq!(text, "{re:1.0,im:2.0}");
}

#[test]
fn plugin_handled_value_round_trips_through_json_ir() {
    let options = options_with_plugin();
    let value = Value::string("complex:3,4");
    let ir = ops::to_json(&value, &options).unwrap();
    let reconstructed = ops::from_json(ir, &options).unwrap();
    assert!(matches!(reconstructed, Value::String(s) if s.as_ref() == "complex:3,4"));
}

#[derive(Debug)]
struct UntaggedPluginValue;

impl valuegraph_seroval::value::PluginValue for UntaggedPluginValue {
    fn tag(&self) -> &str {
        "demo.untagged"
    }
}

#[test]
fn plugin_value_with_no_matching_plugin_fails_as_unsupported_type() {
    let options = options_with_plugin();
    let value = Value::Plugin(std::rc::Rc::new(UntaggedPluginValue));
    let err = ops::serialize(&value, &options).unwrap_err();
    assert!(matches!(err, SerovalError::UnsupportedType { .. }));
}

//! Plugin interface: the extension point a caller uses to teach the parser
//! and serializer about a value shape this crate doesn't recognize natively.
//!
//! Grounded in `gauss-api::format::{FormatPlugin, FormatSerializer}` —
//! `Send + Sync` traits behind an `Arc<dyn Trait>`, so a plugin set can be
//! shared across threads and cloned cheaply. No concrete plugins ship with
//! this crate; the trait is the whole deliverable.

use crate::error::SerovalError;
use crate::value::Value;

/// One plugin: recognizes a value shape via `test`, turns it into a JSON
/// payload via `parse`, and knows how to emit/reconstruct that payload.
///
/// `parse`/`serialize`/`deserialize` round-trip through `serde_json::Value`
/// rather than this crate's `ir::Node`, keeping a plugin author's dependency
/// surface to `serde_json` alone.
pub trait Plugin: std::fmt::Debug + Send + Sync {
    /// Stable identifier stored on the `Plugin` IR node and used to look the
    /// plugin back up at serialize time.
    fn tag(&self) -> &str;

    /// Whether this plugin recognizes `value`. Consulted only after none of
    /// the built-in dispatch cases matched (§4.4 step 9).
    fn test(&self, value: &Value) -> bool;

    /// Turn a recognized value into a JSON payload carried by the IR.
    fn parse(&self, value: &Value) -> Result<serde_json::Value, SerovalError>;

    /// Emit source text reconstructing the value from `payload`.
    fn serialize(&self, payload: &serde_json::Value) -> Result<String, SerovalError>;

    /// Reconstruct a `Value` from `payload` (used by `from_json`).
    fn deserialize(&self, payload: &serde_json::Value) -> Result<Value, SerovalError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug)]
    struct SentinelPlugin;

    impl Plugin for SentinelPlugin {
        fn tag(&self) -> &str {
            "test.sentinel"
        }

        fn test(&self, value: &Value) -> bool {
            matches!(value, Value::String(s) if s.as_ref() == "__sentinel__")
        }

        fn parse(&self, _value: &Value) -> Result<serde_json::Value, SerovalError> {
            Ok(serde_json::json!({ "kind": "sentinel" }))
        }

        fn serialize(&self, _payload: &serde_json::Value) -> Result<String, SerovalError> {
            Ok("globalThis.__sentinel__".to_string())
        }

        fn deserialize(&self, _payload: &serde_json::Value) -> Result<Value, SerovalError> {
            Ok(Value::string("__sentinel__"))
        }
    }

    #[test]
    fn plugin_recognizes_and_round_trips_its_shape() {
        let plugin = SentinelPlugin;
        let value = Value::string("__sentinel__");
        assert!(plugin.test(&value));
        let payload = plugin.parse(&value).unwrap();
        let code = plugin.serialize(&payload).unwrap();
        assert_eq!(code, "globalThis.__sentinel__");
        let reconstructed = plugin.deserialize(&payload).unwrap();
        assert!(matches!(reconstructed, Value::String(s) if s.as_ref() == "__sentinel__"));
    }

    #[test]
    fn plugin_rejects_unrelated_values() {
        let plugin = SentinelPlugin;
        assert!(!plugin.test(&Value::string("other")));
    }
}

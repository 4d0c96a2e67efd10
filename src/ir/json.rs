//! Wire-form (de)serialization of the Node IR.
//!
//! `Node` already derives `serde::{Serialize, Deserialize}` with the
//! `#[serde(tag = "t")]` shape described in SPEC_FULL.md §6 — this module is
//! the thin, mechanical layer that turns that into the `compileJSON`/
//! `fromJSON` operations' JSON-document surface, converting `serde_json`
//! failures into this crate's own error taxonomy.

use crate::error::SerovalError;
use crate::ir::types::Node;

/// Serialize a node to a `serde_json::Value`, suitable for transport or
/// storage. Infallible in practice — every `Node` shape is representable.
pub fn to_value(node: &Node) -> serde_json::Value {
    serde_json::to_value(node).expect("Node always serializes to JSON")
}

/// Serialize a node to a compact JSON string.
pub fn to_string(node: &Node) -> String {
    serde_json::to_string(node).expect("Node always serializes to JSON")
}

/// Parse a `serde_json::Value` back into a `Node`, rejecting anything that
/// doesn't match one of the recognized tags.
pub fn from_value(value: serde_json::Value) -> Result<Node, SerovalError> {
    serde_json::from_value(value)
        .map_err(|e| SerovalError::invariant(format!("malformed IR JSON: {e}")))
}

/// Parse a JSON string back into a `Node`.
pub fn from_str(s: &str) -> Result<Node, SerovalError> {
    serde_json::from_str(s).map_err(|e| SerovalError::invariant(format!("malformed IR JSON: {e}")))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{ObjectFlag, ObjectRecord, RefId};

    #[test]
    fn round_trips_through_json_string() {
        let node = Node::Object {
            id: RefId::new(1),
            record: ObjectRecord::default(),
            flag: ObjectFlag::None,
        };
        let s = to_string(&node);
        let back = from_str(&s).unwrap();
        assert_eq!(back.id(), Some(RefId::new(1)));
    }

    #[test]
    fn rejects_malformed_json() {
        assert!(from_str("{\"t\":\"NotARealTag\"}").is_err());
    }

    #[test]
    fn rejects_non_object_json() {
        assert!(from_str("42").is_err());
    }
}

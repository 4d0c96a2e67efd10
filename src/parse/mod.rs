//! Parse phase: `value::Value` → `ir::Node`.
//!
//! Shared between the synchronous and asynchronous parsers: id assignment
//! (`ParseContext`), the leaf builders for shapes that never themselves hold
//! a nested value requiring further recursion, and the small enum
//! conversions bridging `value::` types to their `ir::` counterparts.
//! SYNC NOTE: a new `Value` variant needs a matching `Node` tag in
//! `ir::types`, a case here (or in `sync`/`r#async` if it needs recursion),
//! and an emission case in `serialize::base`.

pub mod r#async;
pub mod sync;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::sync::Arc;

use crate::error::SerovalError;
use crate::feature::{Feature, FeatureSet};
use crate::ir::types::{
    BoxedKind, ErrorClassTag, EventOptionsNode, Node, ObjectFlag, PlainRecord, PropertyKeyNode,
    RefId, TypedArrayKindTag, WellKnownSymbolTag,
};
use crate::plugin::Plugin;
use crate::reference::ReferenceRegistry;
use crate::value::{
    BoxedPrimitive, ErrorClass, ObjectFlags, TypedArrayKind, Value, WellKnownSymbol,
};

pub use r#async::parse_async;
pub use sync::parse;

/// Shared state for one parse call: id assignment, the reference registry,
/// plugins, and the feature matrix values are checked against.
pub struct ParseContext {
    features: FeatureSet,
    references: ReferenceRegistry,
    plugins: Vec<Arc<dyn Plugin>>,
    ids: RefCell<HashMap<usize, RefId>>,
    next_id: Cell<u32>,
}

/// Caller-facing options for a parse call. Defaults to every feature
/// enabled, no registered plugins, and a fresh (empty) reference registry.
#[derive(Clone, Default)]
pub struct ParseOptions {
    pub features: FeatureSet,
    pub references: ReferenceRegistry,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

impl ParseContext {
    pub fn new(options: ParseOptions) -> Self {
        ParseContext {
            features: options.features,
            references: options.references,
            plugins: options.plugins,
            ids: RefCell::new(HashMap::new()),
            next_id: Cell::new(0),
        }
    }

    /// The id already assigned to this identity, if this is a repeat visit.
    fn existing_id(&self, identity: usize) -> Option<RefId> {
        self.ids.borrow().get(&identity).copied()
    }

    /// Allocate and record a fresh id for an identity seen for the first
    /// time. Must only be called once per identity.
    fn assign_id(&self, identity: usize) -> RefId {
        let id = RefId::new(self.next_id.get());
        self.next_id.set(self.next_id.get() + 1);
        self.ids.borrow_mut().insert(identity, id);
        id
    }

    fn require_feature(&self, feature: Feature, description: &str) -> Result<(), SerovalError> {
        if self.features.has(feature) {
            Ok(())
        } else {
            Err(SerovalError::feature_disabled(
                feature.name(),
                description.to_string(),
            ))
        }
    }

    fn tag_for(&self, value: &Value) -> Option<String> {
        self.references.tag_for(value)
    }

    fn find_plugin(&self, value: &Value) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.test(value))
    }
}

// =============================================================================
// value:: -> ir:: enum conversions
// =============================================================================

impl From<ErrorClass> for ErrorClassTag {
    fn from(c: ErrorClass) -> Self {
        match c {
            ErrorClass::Error => ErrorClassTag::Error,
            ErrorClass::TypeError => ErrorClassTag::TypeError,
            ErrorClass::RangeError => ErrorClassTag::RangeError,
            ErrorClass::SyntaxError => ErrorClassTag::SyntaxError,
            ErrorClass::ReferenceError => ErrorClassTag::ReferenceError,
            ErrorClass::EvalError => ErrorClassTag::EvalError,
            ErrorClass::UriError => ErrorClassTag::UriError,
        }
    }
}

impl From<TypedArrayKind> for TypedArrayKindTag {
    fn from(k: TypedArrayKind) -> Self {
        match k {
            TypedArrayKind::Int8Array => TypedArrayKindTag::Int8Array,
            TypedArrayKind::Uint8Array => TypedArrayKindTag::Uint8Array,
            TypedArrayKind::Uint8ClampedArray => TypedArrayKindTag::Uint8ClampedArray,
            TypedArrayKind::Int16Array => TypedArrayKindTag::Int16Array,
            TypedArrayKind::Uint16Array => TypedArrayKindTag::Uint16Array,
            TypedArrayKind::Int32Array => TypedArrayKindTag::Int32Array,
            TypedArrayKind::Uint32Array => TypedArrayKindTag::Uint32Array,
            TypedArrayKind::Float32Array => TypedArrayKindTag::Float32Array,
            TypedArrayKind::Float64Array => TypedArrayKindTag::Float64Array,
            TypedArrayKind::BigInt64Array => TypedArrayKindTag::BigInt64Array,
            TypedArrayKind::BigUint64Array => TypedArrayKindTag::BigUint64Array,
        }
    }
}

impl From<WellKnownSymbol> for WellKnownSymbolTag {
    fn from(s: WellKnownSymbol) -> Self {
        match s {
            WellKnownSymbol::Iterator => WellKnownSymbolTag::Iterator,
            WellKnownSymbol::AsyncIterator => WellKnownSymbolTag::AsyncIterator,
            WellKnownSymbol::HasInstance => WellKnownSymbolTag::HasInstance,
            WellKnownSymbol::IsConcatSpreadable => WellKnownSymbolTag::IsConcatSpreadable,
            WellKnownSymbol::Species => WellKnownSymbolTag::Species,
            WellKnownSymbol::ToPrimitive => WellKnownSymbolTag::ToPrimitive,
            WellKnownSymbol::ToStringTag => WellKnownSymbolTag::ToStringTag,
            WellKnownSymbol::Unscopables => WellKnownSymbolTag::Unscopables,
        }
    }
}

fn object_flag(flags: ObjectFlags) -> ObjectFlag {
    match flags {
        ObjectFlags::None => ObjectFlag::None,
        ObjectFlags::Sealed => ObjectFlag::Sealed,
        ObjectFlags::Frozen => ObjectFlag::Frozen,
        ObjectFlags::NonExtensible => ObjectFlag::NonExtensible,
    }
}

fn property_key_node(key: &crate::value::PropertyKey) -> PropertyKeyNode {
    match key {
        crate::value::PropertyKey::Named(s) => PropertyKeyNode::Named(s.clone()),
        crate::value::PropertyKey::SymbolIterator => PropertyKeyNode::SymbolIterator,
    }
}

fn plain_record(pairs: &[(String, String)]) -> PlainRecord {
    let size = pairs.len();
    let mut keys = Vec::with_capacity(size);
    let mut values = Vec::with_capacity(size);
    for (k, v) in pairs {
        keys.push(k.clone());
        values.push(Node::String { value: v.clone() });
    }
    PlainRecord { keys, values, size }
}

fn event_options(bubbles: bool, cancelable: bool, composed: bool) -> EventOptionsNode {
    EventOptionsNode {
        bubbles,
        cancelable,
        composed,
    }
}

// =============================================================================
// Leaf builders — no recursion into nested `Value`s required
// =============================================================================

fn parse_primitive(ctx: &ParseContext, value: &Value) -> Result<Option<Node>, SerovalError> {
    let node = match value {
        Value::Undefined => Node::Undefined,
        Value::Null => Node::Null,
        Value::Bool(true) => Node::True,
        Value::Bool(false) => Node::False,
        Value::Number(n) => parse_number(*n),
        Value::String(s) => Node::String {
            value: s.to_string(),
        },
        Value::BigInt(s) => {
            ctx.require_feature(Feature::BigInt, "BigInt requires BigInt support")?;
            Node::BigInt {
                value: s.to_string(),
            }
        }
        Value::WellKnownSymbol(s) => {
            ctx.require_feature(Feature::Symbol, "Symbol requires Symbol support")?;
            Node::WellKnownSymbol {
                symbol: (*s).into(),
            }
        }
        _ => return Ok(None),
    };
    Ok(Some(node))
}

fn parse_number(n: f64) -> Node {
    if n == 0.0 {
        if n.is_sign_negative() {
            Node::NumberNegZero
        } else {
            Node::NumberPosZero
        }
    } else if n.is_nan() {
        Node::NumberNaN
    } else if n.is_infinite() {
        if n > 0.0 {
            Node::NumberPosInfinity
        } else {
            Node::NumberNegInfinity
        }
    } else {
        Node::Number { value: n }
    }
}

fn parse_date(ctx: &ParseContext, id: RefId, epoch_millis: &Rc<f64>) -> Node {
    let _ = ctx;
    Node::Date {
        id,
        epoch_millis: **epoch_millis,
    }
}

fn parse_regexp(id: RefId, data: &crate::value::RegExpData) -> Node {
    Node::RegExp {
        id,
        source: data.source.clone(),
        flags: data.flags.clone(),
    }
}

fn parse_array_buffer(id: RefId, bytes: &Rc<Vec<u8>>) -> Node {
    Node::ArrayBuffer {
        id,
        bytes: (**bytes).clone(),
    }
}

fn parse_boxed(ctx: &ParseContext, id: RefId, boxed: &BoxedPrimitive) -> Result<Node, SerovalError> {
    let (kind, value) = match boxed {
        BoxedPrimitive::Bool(b) => (BoxedKind::Bool, b.to_string()),
        BoxedPrimitive::Number(n) => (BoxedKind::Number, n.to_string()),
        BoxedPrimitive::String(s) => (BoxedKind::String, s.clone()),
        BoxedPrimitive::BigInt(s) => {
            ctx.require_feature(Feature::BigInt, "boxed BigInt requires BigInt support")?;
            (BoxedKind::BigInt, s.clone())
        }
        BoxedPrimitive::Symbol(description) => {
            ctx.require_feature(Feature::Symbol, "boxed Symbol requires Symbol support")?;
            (BoxedKind::Symbol, description.clone())
        }
    };
    Ok(Node::Boxed { id, kind, value })
}

fn parse_url(id: RefId, data: &crate::value::UrlData) -> Node {
    Node::Url {
        id,
        href: data.href.clone(),
    }
}

fn parse_url_search_params(id: RefId, data: &crate::value::UrlSearchParamsData) -> Node {
    let query = data
        .pairs
        .iter()
        .map(|(k, v)| format!("{}={}", urlencode(k), urlencode(v)))
        .collect::<Vec<_>>()
        .join("&");
    Node::UrlSearchParams { id, query }
}

fn urlencode(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for b in s.bytes() {
        match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'0'..=b'9' | b'-' | b'_' | b'.' | b'~' => {
                out.push(b as char)
            }
            b' ' => out.push('+'),
            _ => out.push_str(&format!("%{:02X}", b)),
        }
    }
    out
}

fn parse_headers(id: RefId, data: &crate::value::HeadersData) -> Node {
    Node::Headers {
        id,
        record: plain_record(&data.pairs),
    }
}

fn parse_dom_exception(id: RefId, data: &crate::value::DomExceptionData) -> Node {
    Node::DomException {
        id,
        message: data.message.clone(),
        name: data.name.clone(),
    }
}

fn parse_event(id: RefId, data: &crate::value::EventData) -> Node {
    Node::Event {
        id,
        event_type: data.event_type.clone(),
        options: event_options(data.bubbles, data.cancelable, data.composed),
    }
}

fn require_web_api(ctx: &ParseContext, description: &str) -> Result<(), SerovalError> {
    ctx.require_feature(Feature::WebApi, description)
}

/// Values whose property extraction must be deferred to a second pass
/// (§4.4.1) because consuming them (e.g. draining an iterator) has
/// observable side effects that must not run ahead of unrelated sibling
/// properties.
fn is_deferred_kind(value: &Value) -> bool {
    matches!(
        value,
        Value::Map(_) | Value::Set(_) | Value::Iterable(_)
    )
}

use std::rc::Rc;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_number_classifies_special_values() {
        assert!(matches!(parse_number(0.0), Node::NumberPosZero));
        assert!(matches!(parse_number(-0.0), Node::NumberNegZero));
        assert!(matches!(parse_number(f64::NAN), Node::NumberNaN));
        assert!(matches!(
            parse_number(f64::INFINITY),
            Node::NumberPosInfinity
        ));
        assert!(matches!(
            parse_number(f64::NEG_INFINITY),
            Node::NumberNegInfinity
        ));
        assert!(matches!(parse_number(1.5), Node::Number { value } if value == 1.5));
    }

    #[test]
    fn context_assigns_dense_ids_in_first_seen_order() {
        let ctx = ParseContext::new(ParseOptions::default());
        assert_eq!(ctx.assign_id(100), RefId::new(0));
        assert_eq!(ctx.assign_id(200), RefId::new(1));
        assert_eq!(ctx.existing_id(100), Some(RefId::new(0)));
        assert_eq!(ctx.existing_id(999), None);
    }

    #[test]
    fn urlencode_escapes_reserved_characters() {
        assert_eq!(urlencode("a b&c"), "a+b%26c");
    }
}

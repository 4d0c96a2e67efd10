//! Node IR: a tagged union describing every shape the parser can produce and
//! the serializer can consume.
//!
//! The IR bridges `value::Value` (input) and emitted source text (output). A
//! value graph is lowered into a flat, `i32`-addressable tree of `Node`s that
//! carries exactly the information the serializer needs — nothing about
//! `Rc`/`RefCell` leaks past the parser.
//! SYNC NOTE: a new `Value` variant needs a matching `Node` tag here, a
//! parser case in `parse::`, and an emission case in `serialize::base`.

use serde::{Deserialize, Serialize};

// =============================================================================
// REFERENCE IDENTIFIER
// =============================================================================

/// Stable identifier assigned in first-seen order to every non-primitive
/// value encountered during one parse.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RefId(pub u32);

impl RefId {
    pub const fn new(id: u32) -> Self {
        RefId(id)
    }
}

impl std::fmt::Display for RefId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

// =============================================================================
// OBJECT FLAGS
// =============================================================================

/// Runtime integrity state, applied after all mutations that affect an
/// object (seal/freeze/prevent-extensions).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub enum ObjectFlag {
    #[default]
    None,
    Sealed,
    Frozen,
    NonExtensible,
}

// =============================================================================
// PROPERTY RECORDS
// =============================================================================

/// A property key in an object record: a plain string, or the sentinel that
/// encodes an iterator-installation directive.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum PropertyKeyNode {
    Named(String),
    SymbolIterator,
}

/// Parallel key/value arrays plus an explicit size, used by `Object`,
/// `NullConstructor`, and generic `Iterable` nodes.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ObjectRecord {
    pub keys: Vec<PropertyKeyNode>,
    pub values: Vec<Node>,
    pub size: usize,
}

/// Same shape as `ObjectRecord` but keys are always plain strings — used by
/// `Headers`/`FormData`, which have no symbol-keyed slots.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlainRecord {
    pub keys: Vec<String>,
    pub values: Vec<Node>,
    pub size: usize,
}

/// Own enumerable properties of an `Error`/`AggregateError` other than
/// `name`/`message`/`stack`/`cause`, reattached via `Object.assign` semantics.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ErrorOptions {
    pub record: Option<ObjectRecord>,
    pub cause: Option<Box<Node>>,
}

// =============================================================================
// ENUMERATED PAYLOAD TYPES
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorClassTag {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    EvalError,
    UriError,
}

impl ErrorClassTag {
    pub const fn constructor_name(self) -> &'static str {
        match self {
            ErrorClassTag::Error => "Error",
            ErrorClassTag::TypeError => "TypeError",
            ErrorClassTag::RangeError => "RangeError",
            ErrorClassTag::SyntaxError => "SyntaxError",
            ErrorClassTag::ReferenceError => "ReferenceError",
            ErrorClassTag::EvalError => "EvalError",
            ErrorClassTag::UriError => "URIError",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BoxedKind {
    Bool,
    Number,
    String,
    BigInt,
    Symbol,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TypedArrayKindTag {
    Int8Array,
    Uint8Array,
    Uint8ClampedArray,
    Int16Array,
    Uint16Array,
    Int32Array,
    Uint32Array,
    Float32Array,
    Float64Array,
    BigInt64Array,
    BigUint64Array,
}

impl TypedArrayKindTag {
    pub const fn constructor_name(self) -> &'static str {
        match self {
            TypedArrayKindTag::Int8Array => "Int8Array",
            TypedArrayKindTag::Uint8Array => "Uint8Array",
            TypedArrayKindTag::Uint8ClampedArray => "Uint8ClampedArray",
            TypedArrayKindTag::Int16Array => "Int16Array",
            TypedArrayKindTag::Uint16Array => "Uint16Array",
            TypedArrayKindTag::Int32Array => "Int32Array",
            TypedArrayKindTag::Uint32Array => "Uint32Array",
            TypedArrayKindTag::Float32Array => "Float32Array",
            TypedArrayKindTag::Float64Array => "Float64Array",
            TypedArrayKindTag::BigInt64Array => "BigInt64Array",
            TypedArrayKindTag::BigUint64Array => "BigUint64Array",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum WellKnownSymbolTag {
    Iterator,
    AsyncIterator,
    HasInstance,
    IsConcatSpreadable,
    Species,
    ToPrimitive,
    ToStringTag,
    Unscopables,
}

impl WellKnownSymbolTag {
    /// The source-text expression referring to this symbol off the global
    /// `Symbol` constructor.
    pub const fn expression(self) -> &'static str {
        match self {
            WellKnownSymbolTag::Iterator => "Symbol.iterator",
            WellKnownSymbolTag::AsyncIterator => "Symbol.asyncIterator",
            WellKnownSymbolTag::HasInstance => "Symbol.hasInstance",
            WellKnownSymbolTag::IsConcatSpreadable => "Symbol.isConcatSpreadable",
            WellKnownSymbolTag::Species => "Symbol.species",
            WellKnownSymbolTag::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbolTag::ToStringTag => "Symbol.toStringTag",
            WellKnownSymbolTag::Unscopables => "Symbol.unscopables",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PromiseStatus {
    Resolve,
    Reject,
}

// =============================================================================
// NODE
// =============================================================================

/// One node of the IR. Every non-leaf variant that denotes a non-primitive
/// value carries an `i: RefId`; primitive-constant and `IndexedValue`
/// variants do not need one (constants are value-equal by tag, and
/// `IndexedValue` *is* just a reference to one).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "t")]
pub enum Node {
    // --- Primitive constants ---
    True,
    False,
    Undefined,
    Null,
    NumberPosZero,
    NumberNegZero,
    NumberPosInfinity,
    NumberNegInfinity,
    NumberNaN,

    // --- Primitive payloads ---
    Number {
        #[serde(rename = "s")]
        value: f64,
    },
    String {
        #[serde(rename = "s")]
        value: String,
    },
    BigInt {
        #[serde(rename = "s")]
        value: String,
    },

    /// A placeholder referring back to an id already introduced in the walk
    /// stack — denotes an alias or a live cycle.
    IndexedValue {
        #[serde(rename = "i")]
        id: RefId,
    },

    /// A value previously registered in the reference registry.
    Reference {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        tag: String,
    },

    Array {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "l")]
        length: usize,
        /// Parallel to a sparse index list: `(index, value)`; indices absent
        /// here are holes.
        #[serde(rename = "a")]
        items: Vec<(usize, Node)>,
        #[serde(rename = "f")]
        flag: ObjectFlag,
    },

    Object {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "p")]
        record: ObjectRecord,
        #[serde(rename = "f")]
        flag: ObjectFlag,
    },

    /// A prototype-free object (`Object.create(null)`).
    NullConstructor {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "p")]
        record: ObjectRecord,
        #[serde(rename = "f")]
        flag: ObjectFlag,
    },

    Date {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        epoch_millis: f64,
    },

    RegExp {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "c")]
        source: String,
        #[serde(rename = "m")]
        flags: String,
    },

    Error {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "c")]
        class: ErrorClassTag,
        #[serde(rename = "m")]
        message: String,
        #[serde(rename = "o")]
        options: ErrorOptions,
    },

    AggregateError {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "m")]
        message: String,
        #[serde(rename = "e")]
        errors: Vec<Node>,
        #[serde(rename = "o")]
        options: ErrorOptions,
    },

    Boxed {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "b")]
        kind: BoxedKind,
        #[serde(rename = "s")]
        value: String,
    },

    Url {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        href: String,
    },

    UrlSearchParams {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        query: String,
    },

    Blob {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "m")]
        mime_type: String,
        #[serde(rename = "c")]
        bytes: Box<Node>,
    },

    File {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        name: String,
        #[serde(rename = "m")]
        mime_type: String,
        #[serde(rename = "l")]
        last_modified: f64,
        #[serde(rename = "c")]
        bytes: Box<Node>,
    },

    Headers {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "p")]
        record: PlainRecord,
    },

    FormData {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "e")]
        entries: Vec<(String, FormDataEntryNode)>,
    },

    Request {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        url: String,
        #[serde(rename = "m")]
        method: String,
        #[serde(rename = "p")]
        headers: PlainRecord,
        #[serde(rename = "c")]
        body: Option<Box<Node>>,
    },

    Response {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "l")]
        status: u16,
        #[serde(rename = "s")]
        status_text: String,
        #[serde(rename = "p")]
        headers: PlainRecord,
        #[serde(rename = "c")]
        body: Option<Box<Node>>,
    },

    Event {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        event_type: String,
        #[serde(rename = "o")]
        options: EventOptionsNode,
    },

    CustomEvent {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        event_type: String,
        #[serde(rename = "c")]
        detail: Option<Box<Node>>,
        #[serde(rename = "o")]
        options: EventOptionsNode,
    },

    DomException {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "m")]
        message: String,
        #[serde(rename = "s")]
        name: String,
    },

    ArrayBuffer {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "b")]
        bytes: Vec<u8>,
    },

    TypedArray {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "c")]
        kind: TypedArrayKindTag,
        #[serde(rename = "f")]
        buffer: Box<Node>,
        #[serde(rename = "b")]
        byte_offset: usize,
        #[serde(rename = "l")]
        length: usize,
    },

    BigIntTypedArray {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "c")]
        kind: TypedArrayKindTag,
        #[serde(rename = "f")]
        buffer: Box<Node>,
        #[serde(rename = "b")]
        byte_offset: usize,
        #[serde(rename = "l")]
        length: usize,
    },

    DataView {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "f")]
        buffer: Box<Node>,
        #[serde(rename = "b")]
        byte_offset: usize,
        #[serde(rename = "l")]
        length: usize,
    },

    Map {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "e")]
        entries: Vec<(Node, Node)>,
        #[serde(rename = "l")]
        size: usize,
    },

    Set {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "a")]
        items: Vec<Node>,
        #[serde(rename = "l")]
        size: usize,
    },

    Promise {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        status: PromiseStatus,
        #[serde(rename = "f")]
        value: Box<Node>,
    },

    WellKnownSymbol {
        #[serde(rename = "s")]
        symbol: WellKnownSymbolTag,
    },

    /// Opaque tag plus plugin-produced JSON payload; the serializer never
    /// inspects `payload` itself, only hands it to the matching plugin.
    Plugin {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "s")]
        tag: String,
        #[serde(rename = "o")]
        payload: serde_json::Value,
    },

    // --- Streaming-only tags (§4.8) ---
    PromiseConstructor {
        #[serde(rename = "i")]
        id: RefId,
    },
    PromiseResolve {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "f")]
        value: Box<Node>,
    },
    PromiseReject {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "f")]
        value: Box<Node>,
    },
    ReadableStreamConstructor {
        #[serde(rename = "i")]
        id: RefId,
    },
    ReadableStreamEnqueue {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "f")]
        value: Box<Node>,
    },
    ReadableStreamError {
        #[serde(rename = "i")]
        id: RefId,
        #[serde(rename = "f")]
        value: Box<Node>,
    },
    ReadableStreamClose {
        #[serde(rename = "i")]
        id: RefId,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FormDataEntryNode {
    Text(String),
    File(Node),
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EventOptionsNode {
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

impl Node {
    /// The id carried by this node, if it denotes a non-primitive value.
    pub fn id(&self) -> Option<RefId> {
        match self {
            Node::Reference { id, .. }
            | Node::Array { id, .. }
            | Node::Object { id, .. }
            | Node::NullConstructor { id, .. }
            | Node::Date { id, .. }
            | Node::RegExp { id, .. }
            | Node::Error { id, .. }
            | Node::AggregateError { id, .. }
            | Node::Boxed { id, .. }
            | Node::Url { id, .. }
            | Node::UrlSearchParams { id, .. }
            | Node::Blob { id, .. }
            | Node::File { id, .. }
            | Node::Headers { id, .. }
            | Node::FormData { id, .. }
            | Node::Request { id, .. }
            | Node::Response { id, .. }
            | Node::Event { id, .. }
            | Node::CustomEvent { id, .. }
            | Node::DomException { id, .. }
            | Node::ArrayBuffer { id, .. }
            | Node::TypedArray { id, .. }
            | Node::BigIntTypedArray { id, .. }
            | Node::DataView { id, .. }
            | Node::Map { id, .. }
            | Node::Set { id, .. }
            | Node::Promise { id, .. }
            | Node::Plugin { id, .. }
            | Node::PromiseConstructor { id }
            | Node::PromiseResolve { id, .. }
            | Node::PromiseReject { id, .. }
            | Node::ReadableStreamConstructor { id }
            | Node::ReadableStreamEnqueue { id, .. }
            | Node::ReadableStreamError { id, .. }
            | Node::ReadableStreamClose { id } => Some(*id),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn primitive_constant_round_trips_through_json() {
        let node = Node::NumberNaN;
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        assert!(matches!(back, Node::NumberNaN));
    }

    #[test]
    fn array_node_preserves_sparse_items() {
        let node = Node::Array {
            id: RefId::new(0),
            length: 3,
            items: vec![(0, Node::True), (2, Node::False)],
            flag: ObjectFlag::None,
        };
        let json = serde_json::to_string(&node).unwrap();
        let back: Node = serde_json::from_str(&json).unwrap();
        match back {
            Node::Array { length, items, .. } => {
                assert_eq!(length, 3);
                assert_eq!(items.len(), 2);
            }
            _ => panic!("wrong variant"),
        }
    }

    #[test]
    fn id_accessor_returns_none_for_primitives() {
        assert_eq!(Node::Undefined.id(), None);
        assert_eq!(Node::IndexedValue { id: RefId::new(5) }.id(), None);
    }

    #[test]
    fn id_accessor_returns_some_for_containers() {
        let node = Node::Object {
            id: RefId::new(7),
            record: ObjectRecord::default(),
            flag: ObjectFlag::None,
        };
        assert_eq!(node.id(), Some(RefId::new(7)));
    }
}

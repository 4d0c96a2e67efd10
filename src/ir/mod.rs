//! Node IR: the tagged tree produced by the parser and consumed by the
//! serializer. See [`types`] for the tag definitions and [`json`] for the
//! wire-form (de)serialization used by `compileJSON`/`fromJSON` callers that
//! transport the IR as a JSON document rather than a Rust value.

pub mod json;
pub mod types;

pub use types::{
    BoxedKind, ErrorClassTag, ErrorOptions, FormDataEntryNode, Node, ObjectFlag, ObjectRecord,
    PlainRecord, PromiseStatus, PropertyKeyNode, RefId, TypedArrayKindTag, WellKnownSymbolTag,
};

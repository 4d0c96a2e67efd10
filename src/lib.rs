//! Converts an in-memory value graph into a source-text expression that
//! reconstructs it in a compatible host — cycles, deduplicated aliases,
//! promises, binary buffers, and web-platform objects included.
//!
//! The crate is organized leaves-first, per SPEC_FULL.md §2:
//! [`feature`] (permitted target-runtime idioms) and [`reference`]
//! (external handle registry) and [`string_encoder`] (escaping) sit at the
//! bottom; [`ir`] is the tagged tree [`parse`] produces and [`serialize`]
//! consumes; [`reconstruct`] walks the IR back into a [`value::Value`];
//! [`stream`] multiplexes many roots onto one cross-referenced output; and
//! [`ops`] composes all of the above into the public operations
//! (`serialize`, `to_json`, `cross_serialize_stream`, …).

pub mod error;
pub mod feature;
pub mod ir;
pub mod ops;
pub mod parse;
pub mod plugin;
pub mod reconstruct;
pub mod reference;
pub mod serialize;
pub mod stream;
pub mod string_encoder;
pub mod value;
pub mod wasm;

pub use error::{CreateReferenceError, SerovalError};
pub use feature::{Feature, FeatureSet};
pub use ops::{
    compile_json, create_reference, cross_serialize, cross_serialize_async,
    cross_serialize_stream, deserialize, from_json, serialize, serialize_async, to_json,
    to_json_async, SerovalOptions,
};
pub use reference::ReferenceRegistry;
pub use value::Value;

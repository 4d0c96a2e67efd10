//! Serialize phase: `ir::Node` → source text.
//!
//! Shared between the self-contained and cross-referenced serializers: the
//! [`Binder`] trait abstracts away how a reference id becomes a source-text
//! identifier (a short local name vs. a `$R[i]` table slot), and
//! [`base::Emitter`] drives the actual structural recursion — cycle
//! detection, container emission, Map/Set defer rules, Error/Promise/Web-API
//! construction, and plugin dispatch — against whichever `Binder` its caller
//! supplies.
//! SYNC NOTE: a new `ir::Node` tag needs a case in `base::Emitter::emit`.

pub mod base;
pub mod cross_referenced;
pub mod self_contained;

pub use base::{collect_marks, Emitter, SerializeConfig};
pub use cross_referenced::{cross_serialize, cross_serialize_async, CrossContext, CrossReferencedBinder};
pub use self_contained::{serialize_from_node, SelfContainedBinder};

use crate::ir::types::RefId;

/// Maps a reference id to the source-text identifier used to bind and refer
/// to it. Self-contained mode hands out short local names (`a`, `b`, …);
/// cross-referenced mode indexes into the shared `$R` table instead.
pub trait Binder {
    /// The stable expression that both binds (`name = ctor`) and later
    /// refers to (`name`) the value assigned to `id`.
    fn name(&self, id: RefId) -> String;
}

//! Cross-referenced mode: every id lives in a shared `$R` table the host
//! page bootstraps before evaluating any emitted chunk, so no parameter
//! list or IIFE wrapper is needed — `$R[id]` both binds and refers.
//!
//! This is the mode the streaming driver (`crate::stream`) builds on: the
//! first chunk is the tree produced by [`cross_serialize`], and later
//! chunks are individual statements produced by [`emit_followup`] for the
//! streaming-only IR tags the base emitter refuses to touch (§4.8).

use crate::error::SerovalError;
use crate::ir::types::{Node, RefId};
use crate::string_encoder::quote;

use super::base::{collect_marks, Emitter, SerializeConfig};
use super::Binder;

/// Identifies which shared table a cross-referenced serialization writes
/// into: the default global `$R`, or a named scope (`$R["scope"]`) used
/// when multiple independent serializations share one page without
/// colliding ids.
#[derive(Clone, Default)]
pub struct CrossContext {
    pub scope: Option<String>,
}

impl CrossContext {
    pub fn global() -> Self {
        CrossContext { scope: None }
    }

    pub fn scoped(scope: impl Into<String>) -> Self {
        CrossContext { scope: Some(scope.into()) }
    }

    fn table_expr(&self) -> String {
        match &self.scope {
            Some(scope) => format!("$R[{}]", quote(scope)),
            None => "$R".to_string(),
        }
    }
}

pub struct CrossReferencedBinder {
    table: String,
}

impl CrossReferencedBinder {
    pub fn new(ctx: &CrossContext) -> Self {
        CrossReferencedBinder { table: ctx.table_expr() }
    }
}

impl Binder for CrossReferencedBinder {
    fn name(&self, id: RefId) -> String {
        format!("{}[{id}]", self.table)
    }
}

/// Serializes `root` against the shared table named by `ctx`. The root's own
/// id (if any) is always bound into the table even when nothing inside the
/// tree aliases back to it, since a caller streaming followups needs a
/// stable slot to resolve/enqueue/close against later.
pub fn cross_serialize(root: &Node, ctx: &CrossContext, config: &SerializeConfig) -> Result<String, SerovalError> {
    let mut marks = collect_marks(root);
    if let Some(id) = root.id() {
        marks.insert(id);
    }
    let binder = CrossReferencedBinder::new(ctx);
    let mut emitter = Emitter::new(&binder, marks, config);
    emitter.emit(root)
}

/// Same as [`cross_serialize`], but for the async parser's output where the
/// IR may still contain unresolved promise/stream placeholders destined for
/// followup statements — those are left as-is here; the streaming driver is
/// responsible for calling [`emit_followup`] once their values settle.
pub async fn cross_serialize_async(
    root: &Node,
    ctx: &CrossContext,
    config: &SerializeConfig,
) -> Result<String, SerovalError> {
    cross_serialize(root, ctx, config)
}

/// Emits one streaming followup statement for an IR tag the base emitter
/// rejects outright. Each statement assumes its target id was already bound
/// by the initial [`cross_serialize`] chunk (a `PromiseConstructor` or
/// `ReadableStreamConstructor` node always precedes any followup touching
/// the same id).
///
/// The host bootstrap alongside `$R` maintains two side tables: `$R.p`
/// (pending promise resolvers, keyed by id, populated by the
/// `PromiseConstructor` statement) and `$R.s` (active stream controllers,
/// same convention for `ReadableStreamConstructor`).
pub fn emit_followup(node: &Node, ctx: &CrossContext, config: &SerializeConfig) -> Result<String, SerovalError> {
    let binder = CrossReferencedBinder::new(ctx);
    let table = ctx.table_expr();
    match node {
        Node::PromiseConstructor { id } => {
            let name = binder.name(*id);
            Ok(format!(
                "{name}=new Promise(function(a,b){{{table}.p.set({id},[a,b])}})"
            ))
        }
        Node::PromiseResolve { id, value } => {
            let marks = collect_marks(value);
            let mut emitter = Emitter::new(&binder, marks, config);
            let expr = emitter.emit(value)?;
            Ok(format!("{table}.p.get({id})[0]({expr})"))
        }
        Node::PromiseReject { id, value } => {
            let marks = collect_marks(value);
            let mut emitter = Emitter::new(&binder, marks, config);
            let expr = emitter.emit(value)?;
            Ok(format!("{table}.p.get({id})[1]({expr})"))
        }
        Node::ReadableStreamConstructor { id } => {
            let name = binder.name(*id);
            Ok(format!(
                "{name}=new ReadableStream({{start:function(c){{{table}.s.set({id},c)}}}})"
            ))
        }
        Node::ReadableStreamEnqueue { id, value } => {
            let marks = collect_marks(value);
            let mut emitter = Emitter::new(&binder, marks, config);
            let expr = emitter.emit(value)?;
            Ok(format!("{table}.s.get({id}).enqueue({expr})"))
        }
        Node::ReadableStreamError { id, value } => {
            let marks = collect_marks(value);
            let mut emitter = Emitter::new(&binder, marks, config);
            let expr = emitter.emit(value)?;
            Ok(format!("{table}.s.get({id}).error({expr})"))
        }
        Node::ReadableStreamClose { id } => Ok(format!("{table}.s.get({id}).close()")),
        _ => Err(SerovalError::invariant(
            "emit_followup called with a non-streaming IR tag",
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::ObjectFlag;

    #[test]
    fn table_name_defaults_to_global_r() {
        let ctx = CrossContext::global();
        let binder = CrossReferencedBinder::new(&ctx);
        assert_eq!(binder.name(RefId::new(3)), "$R[3]");
    }

    #[test]
    fn scoped_table_name_indexes_by_scope_string() {
        let ctx = CrossContext::scoped("widget");
        let binder = CrossReferencedBinder::new(&ctx);
        assert_eq!(binder.name(RefId::new(3)), "$R[\"widget\"][3]");
    }

    #[test]
    fn cross_serialize_binds_root_id_even_without_self_reference() {
        let node = Node::Object {
            id: RefId::new(0),
            record: crate::ir::types::ObjectRecord::default(),
            flag: ObjectFlag::None,
        };
        let ctx = CrossContext::global();
        let config = SerializeConfig::default();
        let text = cross_serialize(&node, &ctx, &config).unwrap();
        assert!(text.starts_with("$R[0]="));
    }

    #[test]
    fn promise_followup_resolves_via_pending_table() {
        let ctx = CrossContext::global();
        let config = SerializeConfig::default();
        let node = Node::PromiseResolve {
            id: RefId::new(1),
            value: Box::new(Node::Number { value: 2.0 }),
        };
        let text = emit_followup(&node, &ctx, &config).unwrap();
        assert_eq!(text, "$R.p.get(1)[0](2)");
    }
}

//! Structural emission shared by both serializer modes: cycle detection via
//! an expansion stack, post-construction assignment patches, container
//! construction for every recognized `Node` shape, and plugin dispatch.
//!
//! Marking (SPEC_FULL.md §3 "Marked set") is computed once, up front, by
//! [`collect_marks`] walking the already-materialized IR tree — a node needs
//! a name if it is referenced by an `IndexedValue` anywhere in the tree, or
//! carries a non-`None` object flag. This sidesteps the chicken-and-egg
//! problem of discovering "this id will be needed later" only after its
//! defining text has already been written: since the whole tree is in hand
//! before serialization starts (unlike parsing, which observes values one at
//! a time), the mark decision doesn't need the retroactive bookkeeping a
//! streaming pass over a live graph would require.

use std::collections::HashSet;
use std::sync::Arc;

use crate::error::SerovalError;
use crate::feature::{Feature, FeatureSet};
use crate::ir::types::{
    BoxedKind, ErrorOptions, FormDataEntryNode, Node, ObjectFlag, ObjectRecord, PlainRecord,
    PromiseStatus, PropertyKeyNode, RefId,
};
use crate::plugin::Plugin;
use crate::string_encoder::quote;

use super::Binder;

/// Per-call configuration threaded through the emitter: the feature matrix
/// gating emission choices, and the plugin set consulted for `Plugin` nodes.
#[derive(Clone, Default)]
pub struct SerializeConfig {
    pub features: FeatureSet,
    pub plugins: Vec<Arc<dyn Plugin>>,
}

/// Walk `root` once, recording every id referenced by an `IndexedValue`
/// anywhere in the tree, or carrying a non-`None` object flag. These are
/// exactly the ids whose defining occurrence must bind a name.
pub fn collect_marks(root: &Node) -> HashSet<RefId> {
    let mut marks = HashSet::new();
    walk_marks(root, &mut marks);
    marks
}

fn walk_marks(node: &Node, marks: &mut HashSet<RefId>) {
    match node {
        Node::IndexedValue { id } => {
            marks.insert(*id);
        }
        Node::Array { id, items, flag, .. } => {
            if *flag != ObjectFlag::None {
                marks.insert(*id);
            }
            for (_, item) in items {
                walk_marks(item, marks);
            }
        }
        Node::Object { id, record, flag } | Node::NullConstructor { id, record, flag } => {
            if *flag != ObjectFlag::None {
                marks.insert(*id);
            }
            walk_marks_record(record, marks);
        }
        Node::Error { options, .. } | Node::AggregateError { options, .. } => {
            if let Some(record) = &options.record {
                walk_marks_record(record, marks);
            }
            if let Some(cause) = &options.cause {
                walk_marks(cause, marks);
            }
            if let Node::AggregateError { errors, .. } = node {
                for e in errors {
                    walk_marks(e, marks);
                }
            }
        }
        Node::Blob { bytes, .. } | Node::File { bytes, .. } => walk_marks(bytes, marks),
        Node::Headers { record, .. } => walk_marks_plain_record(record, marks),
        Node::FormData { entries, .. } => {
            for (_, entry) in entries {
                if let FormDataEntryNode::File(f) = entry {
                    walk_marks(f, marks);
                }
            }
        }
        Node::Request { headers, body, .. } | Node::Response { headers, body, .. } => {
            walk_marks_plain_record(headers, marks);
            if let Some(b) = body {
                walk_marks(b, marks);
            }
        }
        Node::CustomEvent { detail, .. } => {
            if let Some(d) = detail {
                walk_marks(d, marks);
            }
        }
        Node::TypedArray { buffer, .. }
        | Node::BigIntTypedArray { buffer, .. }
        | Node::DataView { buffer, .. } => walk_marks(buffer, marks),
        Node::Map { entries, .. } => {
            for (k, v) in entries {
                walk_marks(k, marks);
                walk_marks(v, marks);
            }
        }
        Node::Set { items, .. } => {
            for item in items {
                walk_marks(item, marks);
            }
        }
        Node::Promise { value, .. } => walk_marks(value, marks),
        Node::PromiseResolve { value, .. }
        | Node::PromiseReject { value, .. }
        | Node::ReadableStreamEnqueue { value, .. }
        | Node::ReadableStreamError { value, .. } => walk_marks(value, marks),
        // Leaves carrying no nested `Node`: primitive constants, Reference,
        // Date, RegExp, Boxed, Url, UrlSearchParams, DomException,
        // ArrayBuffer, WellKnownSymbol, Plugin, PromiseConstructor,
        // ReadableStreamConstructor, ReadableStreamClose.
        _ => {}
    }
}

fn walk_marks_record(record: &ObjectRecord, marks: &mut HashSet<RefId>) {
    for value in &record.values {
        walk_marks(value, marks);
    }
}

fn walk_marks_plain_record(record: &PlainRecord, marks: &mut HashSet<RefId>) {
    for value in &record.values {
        walk_marks(value, marks);
    }
}

/// One property accessor used to build a post-construction assignment
/// (`owner<accessor> = value`).
enum Accessor {
    Index(usize),
    Key(String),
    SymbolIterator,
}

impl Accessor {
    fn render(&self) -> String {
        match self {
            Accessor::Index(i) => format!("[{i}]"),
            Accessor::Key(k) if is_identifier(k) => format!(".{k}"),
            Accessor::Key(k) => format!("[{}]", quote(k)),
            Accessor::SymbolIterator => "[Symbol.iterator]".to_string(),
        }
    }
}

fn is_identifier(s: &str) -> bool {
    let mut chars = s.chars();
    match chars.next() {
        Some(c) if c.is_ascii_alphabetic() || c == '_' || c == '$' => {}
        _ => return false,
    }
    chars.all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '$')
}

fn flag_call(flag: ObjectFlag, name: &str) -> Option<String> {
    match flag {
        ObjectFlag::None => None,
        ObjectFlag::Sealed => Some(format!("Object.seal({name})")),
        ObjectFlag::Frozen => Some(format!("Object.freeze({name})")),
        ObjectFlag::NonExtensible => Some(format!("Object.preventExtensions({name})")),
    }
}

/// Result of checking one child slot against the live expansion stack before
/// emitting it: a slot whose value is an `IndexedValue` naming a still-open
/// ancestor must be omitted and patched in afterward rather than inlined.
enum Slot {
    Cyclic(RefId),
    Inline(String),
}

/// Drives the recursive walk of one IR tree into one source-text expression.
/// Holds the live expansion stack (for cycle detection), the precomputed
/// mark set, and the config shared by both serializer modes.
pub struct Emitter<'a> {
    binder: &'a dyn Binder,
    marks: HashSet<RefId>,
    config: &'a SerializeConfig,
    stack: Vec<RefId>,
}

impl<'a> Emitter<'a> {
    pub fn new(binder: &'a dyn Binder, marks: HashSet<RefId>, config: &'a SerializeConfig) -> Self {
        Emitter {
            binder,
            marks,
            config,
            stack: Vec::new(),
        }
    }

    fn features(&self) -> FeatureSet {
        self.config.features
    }

    /// Check a child slot against the stack before committing to emit it.
    fn slot(&mut self, node: &Node) -> Result<Slot, SerovalError> {
        if let Node::IndexedValue { id } = node {
            if self.stack.contains(id) {
                return Ok(Slot::Cyclic(*id));
            }
        }
        Ok(Slot::Inline(self.emit(node)?))
    }

    fn slot_expr(&mut self, slot: Slot) -> String {
        match slot {
            Slot::Cyclic(id) => self.binder.name(id),
            Slot::Inline(expr) => expr,
        }
    }

    /// Wrap a container's constructor expression with its name binding and
    /// any post-construction patches, iff either is actually needed.
    fn finish(&mut self, id: RefId, ctor: String, mut patches: Vec<String>, flag: ObjectFlag) -> String {
        let needs_name = self.marks.contains(&id) || !patches.is_empty() || flag != ObjectFlag::None;
        if !needs_name {
            return ctor;
        }
        let name = self.binder.name(id);
        let mut parts = vec![format!("{name}={ctor}")];
        parts.append(&mut patches);
        if let Some(call) = flag_call(flag, &name) {
            parts.push(call);
        }
        if parts.len() == 1 {
            parts.into_iter().next().unwrap()
        } else {
            format!("({})", parts.join(","))
        }
    }

    pub fn emit(&mut self, node: &Node) -> Result<String, SerovalError> {
        match node {
            Node::True => Ok("true".to_string()),
            Node::False => Ok("false".to_string()),
            Node::Undefined => Ok("void 0".to_string()),
            Node::Null => Ok("null".to_string()),
            Node::NumberPosZero => Ok("0".to_string()),
            Node::NumberNegZero => Ok("-0".to_string()),
            Node::NumberPosInfinity => Ok("Infinity".to_string()),
            Node::NumberNegInfinity => Ok("-Infinity".to_string()),
            Node::NumberNaN => Ok("NaN".to_string()),
            Node::Number { value } => Ok(format_number(*value)),
            Node::String { value } => Ok(quote(value)),
            Node::BigInt { value } => Ok(format!("{value}n")),
            Node::IndexedValue { id } => Ok(self.binder.name(*id)),
            Node::Reference { id, tag } => {
                let ctor = format!("__seroval_refs__.get({})", quote(tag));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Array { id, length, items, flag } => self.emit_array(*id, *length, items, *flag),
            Node::Object { id, record, flag } => {
                let (ctor, patches) = self.emit_object_literal(*id, record)?;
                Ok(self.finish(*id, ctor, patches, *flag))
            }
            Node::NullConstructor { id, record, flag } => self.emit_null_constructor(*id, record, *flag),
            Node::Date { id, epoch_millis } => {
                let ctor = format!("new Date({})", format_number(*epoch_millis));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::RegExp { id, source, flags } => {
                let ctor = format!("new RegExp({},{})", quote(source), quote(flags));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Error { id, class, message, options } => {
                self.emit_error(*id, class.constructor_name(), message, options)
            }
            Node::AggregateError { id, message, errors, options } => {
                self.emit_aggregate_error(*id, message, errors, options)
            }
            Node::Boxed { id, kind, value } => {
                let ctor = match kind {
                    BoxedKind::Bool => format!("new Boolean({value})"),
                    BoxedKind::Number => format!("new Number({value})"),
                    BoxedKind::String => format!("new String({})", quote(value)),
                    BoxedKind::BigInt => format!("Object({value}n)"),
                    BoxedKind::Symbol => format!("Object(Symbol({}))", quote(value)),
                };
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Url { id, href } => {
                let ctor = format!("new URL({})", quote(href));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::UrlSearchParams { id, query } => {
                let ctor = format!("new URLSearchParams({})", quote(query));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Blob { id, mime_type, bytes } => {
                let inner = self.emit(bytes)?;
                let ctor = format!("new Blob([{inner}],{{type:{}}})", quote(mime_type));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::File { id, name, mime_type, last_modified, bytes } => {
                let inner = self.emit(bytes)?;
                let ctor = format!(
                    "new File([{inner}],{},{{type:{},lastModified:{}}})",
                    quote(name),
                    quote(mime_type),
                    format_number(*last_modified),
                );
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Headers { id, record } => {
                let body = self.emit_plain_record_literal(record)?;
                let ctor = format!("new Headers({body})");
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::FormData { id, entries } => self.emit_form_data(*id, entries),
            Node::Request { id, url, method, headers, body } => {
                self.emit_request(*id, url, method, headers, body)
            }
            Node::Response { id, status, status_text, headers, body } => {
                self.emit_response(*id, *status, status_text, headers, body)
            }
            Node::Event { id, event_type, options } => {
                let ctor = format!(
                    "new Event({},{{bubbles:{},cancelable:{},composed:{}}})",
                    quote(event_type), options.bubbles, options.cancelable, options.composed,
                );
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::CustomEvent { id, event_type, detail, options } => {
                let detail_expr = detail.as_deref().map(|d| self.emit(d)).transpose()?;
                let mut opts = format!(
                    "bubbles:{},cancelable:{},composed:{}",
                    options.bubbles, options.cancelable, options.composed
                );
                if let Some(d) = &detail_expr {
                    opts.push_str(&format!(",detail:{d}"));
                }
                let ctor = format!("new CustomEvent({},{{{}}})", quote(event_type), opts);
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::DomException { id, message, name } => {
                let ctor = format!("new DOMException({},{})", quote(message), quote(name));
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::ArrayBuffer { id, bytes } => {
                let items = bytes.iter().map(u8::to_string).collect::<Vec<_>>().join(",");
                let ctor = format!("new Uint8Array([{items}]).buffer");
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::TypedArray { id, kind, buffer, byte_offset, length } => {
                let buf = self.emit(buffer)?;
                let ctor = format!("new {}({buf},{byte_offset},{length})", kind.constructor_name());
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::BigIntTypedArray { id, kind, buffer, byte_offset, length } => {
                let buf = self.emit(buffer)?;
                let ctor = format!("new {}({buf},{byte_offset},{length})", kind.constructor_name());
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::DataView { id, buffer, byte_offset, length } => {
                let buf = self.emit(buffer)?;
                let ctor = format!("new DataView({buf},{byte_offset},{length})");
                Ok(self.finish(*id, ctor, Vec::new(), ObjectFlag::None))
            }
            Node::Map { id, entries, .. } => self.emit_map(*id, entries),
            Node::Set { id, items, .. } => self.emit_set(*id, items),
            Node::Promise { id, status, value } => self.emit_promise(*id, *status, value),
            Node::WellKnownSymbol { symbol } => Ok(symbol.expression().to_string()),
            Node::Plugin { id, tag, payload } => self.emit_plugin(*id, tag, payload),
            Node::PromiseConstructor { .. }
            | Node::PromiseResolve { .. }
            | Node::PromiseReject { .. }
            | Node::ReadableStreamConstructor { .. }
            | Node::ReadableStreamEnqueue { .. }
            | Node::ReadableStreamError { .. }
            | Node::ReadableStreamClose { .. } => Err(SerovalError::invariant(
                "streaming-only IR tag reached the base emitter outside streaming mode",
            )),
        }
    }

    /// Dense arrays (every index 0..length present) emit as a bracket
    /// literal; sparse arrays (holes, i.e. `items.len() < length`) emit as
    /// `new Array(length)` plus index assignments, which sidesteps having to
    /// reproduce JS's comma-counting hole syntax.
    fn emit_array(
        &mut self,
        id: RefId,
        length: usize,
        items: &[(usize, Node)],
        flag: ObjectFlag,
    ) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        self.stack.push(id);
        let dense = items.len() == length;
        let mut inline = vec![String::new(); if dense { length } else { 0 }];
        let mut assigns = Vec::new();
        let mut patches = Vec::new();
        for (idx, item) in items {
            match self.slot(item)? {
                Slot::Cyclic(cid) => {
                    patches.push(format!("{name}[{idx}]={}", self.binder.name(cid)));
                }
                Slot::Inline(expr) => {
                    if dense {
                        inline[*idx] = expr;
                    } else {
                        assigns.push(format!("{name}[{idx}]={expr}"));
                    }
                }
            }
        }
        self.stack.pop();
        if dense {
            let ctor = format!("[{}]", inline.join(","));
            return Ok(self.finish(id, ctor, patches, flag));
        }
        if assigns.is_empty() && patches.is_empty() && flag == ObjectFlag::None && !self.marks.contains(&id) {
            return Ok(format!("new Array({length})"));
        }
        let mut parts = vec![format!("{name}=new Array({length})")];
        parts.append(&mut assigns);
        parts.append(&mut patches);
        if let Some(call) = flag_call(flag, &name) {
            parts.push(call);
        }
        parts.push(name);
        Ok(format!("({})", parts.join(",")))
    }

    /// Emits a plain-object literal body, pushing `id` onto the expansion
    /// stack first so a property whose value cycles back to this same
    /// object (directly or through an `IndexedValue`) is caught by
    /// [`Self::slot`] and deferred to a post-construction patch instead of
    /// being inlined — inlining it would read the not-yet-assigned name at
    /// the moment the literal's RHS evaluates (see `finish`'s binding order).
    fn emit_object_literal(
        &mut self,
        id: RefId,
        record: &ObjectRecord,
    ) -> Result<(String, Vec<String>), SerovalError> {
        let name = self.binder.name(id);
        self.stack.push(id);
        let mut entries = Vec::with_capacity(record.keys.len());
        let mut patches = Vec::new();
        for (key, value) in record.keys.iter().zip(&record.values) {
            match key {
                PropertyKeyNode::SymbolIterator => {
                    entries.push(self.emit_symbol_iterator_entry(value)?);
                }
                PropertyKeyNode::Named(key_name) => match self.slot(value)? {
                    Slot::Cyclic(cid) => {
                        let accessor = Accessor::Key(key_name.clone());
                        patches.push(format!("{name}{}={}", accessor.render(), self.binder.name(cid)));
                    }
                    Slot::Inline(expr) => {
                        let key_text = if is_identifier(key_name) {
                            key_name.clone()
                        } else {
                            quote(key_name)
                        };
                        entries.push(format!("{key_text}:{expr}"));
                    }
                },
            }
        }
        self.stack.pop();
        Ok((format!("{{{}}}", entries.join(",")), patches))
    }

    fn emit_symbol_iterator_entry(&mut self, value: &Node) -> Result<String, SerovalError> {
        let arr = self.emit(value)?;
        let target = if self.features().has(Feature::ArrayPrototypeValues) {
            format!("{arr}.values()")
        } else {
            format!("{arr}[Symbol.iterator]()")
        };
        Ok(if self.features().has(Feature::MethodShorthand) {
            format!("[Symbol.iterator](){{return {target}}}")
        } else {
            format!("[Symbol.iterator]:function(){{return {target}}}")
        })
    }

    fn emit_null_constructor(
        &mut self,
        id: RefId,
        record: &ObjectRecord,
        flag: ObjectFlag,
    ) -> Result<String, SerovalError> {
        if record.keys.is_empty() {
            return Ok(self.finish(id, "Object.create(null)".to_string(), Vec::new(), flag));
        }
        if self.features().has(Feature::ObjectAssign) {
            let (body, patches) = self.emit_object_literal(id, record)?;
            let ctor = format!("Object.assign(Object.create(null),{body})");
            return Ok(self.finish(id, ctor, patches, flag));
        }
        // Without `Object.assign`, properties are installed one at a time
        // after construction — force a name binding to chain them, and push
        // `id` onto the stack first so a self-referential property value
        // defers to a patch instead of reading the not-yet-assigned name.
        let name = self.binder.name(id);
        self.stack.push(id);
        let mut assigns = Vec::with_capacity(record.keys.len());
        for (key, value) in record.keys.iter().zip(&record.values) {
            let accessor = match key {
                PropertyKeyNode::Named(n) => Accessor::Key(n.clone()),
                PropertyKeyNode::SymbolIterator => Accessor::SymbolIterator,
            };
            match self.slot(value)? {
                Slot::Cyclic(cid) => {
                    assigns.push(format!("{name}{}={}", accessor.render(), self.binder.name(cid)));
                }
                Slot::Inline(expr) => {
                    assigns.push(format!("{name}{}={expr}", accessor.render()));
                }
            }
        }
        self.stack.pop();
        let mut parts = vec![format!("{name}=Object.create(null)")];
        parts.extend(assigns);
        if let Some(call) = flag_call(flag, &name) {
            parts.push(call);
        }
        parts.push(name.clone());
        Ok(format!("({})", parts.join(",")))
    }

    /// Splits an error's extra own-properties (named fields plus `cause`)
    /// into inline dict entries and post-construction patches, the latter
    /// for any property whose value is a live cycle.
    fn emit_error_options(
        &mut self,
        owner_name: &str,
        options: &ErrorOptions,
    ) -> Result<(Vec<(String, String)>, Vec<String>), SerovalError> {
        let mut dict_entries = Vec::new();
        let mut patches = Vec::new();
        if let Some(record) = &options.record {
            for (key, value) in record.keys.iter().zip(&record.values) {
                let accessor = match key {
                    PropertyKeyNode::Named(n) => Accessor::Key(n.clone()),
                    PropertyKeyNode::SymbolIterator => Accessor::SymbolIterator,
                };
                match self.slot(value)? {
                    Slot::Cyclic(cid) => patches.push(format!(
                        "{owner_name}{}={}",
                        accessor.render(),
                        self.binder.name(cid)
                    )),
                    Slot::Inline(expr) => {
                        let key_text = match key {
                            PropertyKeyNode::Named(n) if is_identifier(n) => n.clone(),
                            PropertyKeyNode::Named(n) => quote(n),
                            PropertyKeyNode::SymbolIterator => "[Symbol.iterator]".to_string(),
                        };
                        dict_entries.push((key_text, expr));
                    }
                }
            }
        }
        if let Some(cause) = &options.cause {
            match self.slot(cause)? {
                Slot::Cyclic(cid) => patches.push(format!("{owner_name}.cause={}", self.binder.name(cid))),
                Slot::Inline(expr) => dict_entries.push(("cause".to_string(), expr)),
            }
        }
        Ok((dict_entries, patches))
    }

    /// Attaches `dict_entries` to `base` (already-constructed error expr),
    /// via `Object.assign` when available, else sequential assignment onto
    /// the bound name — mirroring the `NullConstructor` fallback.
    fn attach_error_extras(
        &mut self,
        id: RefId,
        base: String,
        dict_entries: Vec<(String, String)>,
        mut patches: Vec<String>,
    ) -> String {
        if dict_entries.is_empty() {
            return self.finish(id, base, patches, ObjectFlag::None);
        }
        if self.features().has(Feature::ObjectAssign) {
            let dict = dict_entries
                .into_iter()
                .map(|(k, v)| format!("{k}:{v}"))
                .collect::<Vec<_>>()
                .join(",");
            let ctor = format!("Object.assign({base},{{{dict}}})");
            return self.finish(id, ctor, patches, ObjectFlag::None);
        }
        let name = self.binder.name(id);
        let mut assigns: Vec<String> = dict_entries
            .into_iter()
            .map(|(k, v)| {
                let accessor = if is_identifier(&k) { format!(".{k}") } else { format!("[{}]", quote(&k)) };
                format!("{name}{accessor}={v}")
            })
            .collect();
        assigns.append(&mut patches);
        let mut parts = vec![format!("{name}={base}")];
        parts.append(&mut assigns);
        parts.push(name);
        format!("({})", parts.join(","))
    }

    fn emit_error(
        &mut self,
        id: RefId,
        constructor_name: &str,
        message: &str,
        options: &ErrorOptions,
    ) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        let (dict_entries, patches) = self.emit_error_options(&name, options)?;
        let base = format!("new {constructor_name}({})", quote(message));
        Ok(self.attach_error_extras(id, base, dict_entries, patches))
    }

    fn emit_aggregate_error(
        &mut self,
        id: RefId,
        message: &str,
        errors: &[Node],
        options: &ErrorOptions,
    ) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        let mut err_exprs = Vec::with_capacity(errors.len());
        for e in errors {
            err_exprs.push(self.emit(e)?);
        }
        let (dict_entries, patches) = self.emit_error_options(&name, options)?;
        let base = format!("new AggregateError([{}],{})", err_exprs.join(","), quote(message));
        Ok(self.attach_error_extras(id, base, dict_entries, patches))
    }

    fn emit_plain_record_literal(&mut self, record: &PlainRecord) -> Result<String, SerovalError> {
        let mut entries = Vec::with_capacity(record.keys.len());
        for (key, value) in record.keys.iter().zip(&record.values) {
            let value_expr = self.emit(value)?;
            let key_text = if is_identifier(key) { key.clone() } else { quote(key) };
            entries.push(format!("{key_text}:{value_expr}"));
        }
        Ok(format!("{{{}}}", entries.join(",")))
    }

    fn emit_form_data(&mut self, id: RefId, entries: &[(String, FormDataEntryNode)]) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        let mut patches = Vec::with_capacity(entries.len());
        for (key, entry) in entries {
            let value_expr = match entry {
                FormDataEntryNode::Text(s) => quote(s),
                FormDataEntryNode::File(file) => self.emit(file)?,
            };
            patches.push(format!("{name}.append({},{value_expr})", quote(key)));
        }
        Ok(self.finish(id, "new FormData()".to_string(), patches, ObjectFlag::None))
    }

    fn emit_request(
        &mut self,
        id: RefId,
        url: &str,
        method: &str,
        headers: &PlainRecord,
        body: &Option<Box<Node>>,
    ) -> Result<String, SerovalError> {
        let headers_text = self.emit_plain_record_literal(headers)?;
        let body_expr = body.as_deref().map(|b| self.emit(b)).transpose()?;
        let mut opts = format!("method:{},headers:{headers_text}", quote(method));
        if let Some(b) = &body_expr {
            opts.push_str(&format!(",body:{b}"));
        }
        let ctor = format!("new Request({},{{{opts}}})", quote(url));
        Ok(self.finish(id, ctor, Vec::new(), ObjectFlag::None))
    }

    fn emit_response(
        &mut self,
        id: RefId,
        status: u16,
        status_text: &str,
        headers: &PlainRecord,
        body: &Option<Box<Node>>,
    ) -> Result<String, SerovalError> {
        let headers_text = self.emit_plain_record_literal(headers)?;
        let body_expr = body.as_deref().map(|b| self.emit(b)).transpose()?;
        let ctor = format!(
            "new Response({},{{status:{status},statusText:{},headers:{headers_text}}})",
            body_expr.unwrap_or_else(|| "null".to_string()),
            quote(status_text),
        );
        Ok(self.finish(id, ctor, Vec::new(), ObjectFlag::None))
    }

    fn emit_map(&mut self, id: RefId, entries: &[(Node, Node)]) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        self.stack.push(id);
        let mut inline = Vec::new();
        let mut patches = Vec::new();
        for (k, v) in entries {
            let k_slot = self.slot(k)?;
            let v_slot = self.slot(v)?;
            let cyclic = matches!(k_slot, Slot::Cyclic(_)) || matches!(v_slot, Slot::Cyclic(_));
            let k_expr = self.slot_expr(k_slot);
            let v_expr = self.slot_expr(v_slot);
            if cyclic {
                patches.push(format!("{name}.set({k_expr},{v_expr})"));
            } else {
                inline.push(format!("[{k_expr},{v_expr}]"));
            }
        }
        self.stack.pop();
        let ctor = format!("new Map([{}])", inline.join(","));
        Ok(self.finish(id, ctor, patches, ObjectFlag::None))
    }

    fn emit_set(&mut self, id: RefId, items: &[Node]) -> Result<String, SerovalError> {
        let name = self.binder.name(id);
        self.stack.push(id);
        let mut inline = Vec::new();
        let mut patches = Vec::new();
        for item in items {
            match self.slot(item)? {
                Slot::Cyclic(cid) => patches.push(format!("{name}.add({})", self.binder.name(cid))),
                Slot::Inline(expr) => inline.push(expr),
            }
        }
        self.stack.pop();
        let ctor = format!("new Set([{}])", inline.join(","));
        Ok(self.finish(id, ctor, patches, ObjectFlag::None))
    }

    fn emit_promise(&mut self, id: RefId, status: PromiseStatus, value: &Node) -> Result<String, SerovalError> {
        self.stack.push(id);
        let slot = self.slot(value)?;
        self.stack.pop();
        let arrow = self.features().has(Feature::ArrowFunction);
        let ctor = match (status, slot) {
            (PromiseStatus::Resolve, Slot::Inline(expr)) => format!("Promise.resolve({expr})"),
            (PromiseStatus::Reject, Slot::Inline(expr)) => format!("Promise.reject({expr})"),
            (PromiseStatus::Resolve, Slot::Cyclic(cid)) => {
                let target = self.binder.name(cid);
                if arrow {
                    format!("Promise.resolve().then(()=>{target})")
                } else {
                    format!("Promise.resolve().then(function(){{return {target}}})")
                }
            }
            (PromiseStatus::Reject, Slot::Cyclic(cid)) => {
                let target = self.binder.name(cid);
                if arrow {
                    format!("Promise.reject().catch(()=>{target})")
                } else {
                    format!("Promise.reject().catch(function(){{return {target}}})")
                }
            }
        };
        Ok(self.finish(id, ctor, Vec::new(), ObjectFlag::None))
    }

    fn emit_plugin(&mut self, id: RefId, tag: &str, payload: &serde_json::Value) -> Result<String, SerovalError> {
        let plugin = self
            .config
            .plugins
            .iter()
            .find(|p| p.tag() == tag)
            .ok_or_else(|| SerovalError::missing_plugin(tag.to_string()))?;
        let ctor = plugin.serialize(payload)?;
        Ok(self.finish(id, ctor, Vec::new(), ObjectFlag::None))
    }
}

fn format_number(value: f64) -> String {
    if value == value.trunc() && value.is_finite() && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        format!("{value}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{ObjectFlag, ObjectRecord, PropertyKeyNode};
    use crate::serialize::self_contained::SelfContainedBinder;

    fn emit(node: &Node) -> String {
        let marks = collect_marks(node);
        let binder = SelfContainedBinder::new();
        let config = SerializeConfig::default();
        let mut emitter = Emitter::new(&binder, marks, &config);
        emitter.emit(node).unwrap()
    }

    #[test]
    fn emits_infinity_literal() {
        assert!(emit(&Node::NumberPosInfinity).contains("Infinity"));
        assert_eq!(emit(&Node::NumberNegInfinity), "-Infinity");
        assert_eq!(emit(&Node::NumberNaN), "NaN");
    }

    #[test]
    fn emits_plain_object_shape() {
        let node = Node::Object {
            id: RefId::new(0),
            record: ObjectRecord {
                keys: vec![PropertyKeyNode::Named("a".to_string())],
                values: vec![Node::Number { value: 1.0 }],
                size: 1,
            },
            flag: ObjectFlag::None,
        };
        assert_eq!(emit(&node), "{a:1}");
    }

    #[test]
    fn self_referential_object_patches_after_construction() {
        let id = RefId::new(0);
        let node = Node::Object {
            id,
            record: ObjectRecord {
                keys: vec![PropertyKeyNode::Named("self".to_string())],
                values: vec![Node::IndexedValue { id }],
                size: 1,
            },
            flag: ObjectFlag::None,
        };
        let text = emit(&node);
        assert!(text.contains('='));
        assert!(text.contains(".self="));
    }

    #[test]
    fn sparse_array_uses_array_constructor_and_index_assignment() {
        let node = Node::Array {
            id: RefId::new(0),
            length: 3,
            items: vec![(0, Node::Number { value: 1.0 }), (1, Node::Number { value: 2.0 })],
            flag: ObjectFlag::None,
        };
        let text = emit(&node);
        assert!(text.contains("new Array(3)"));
        assert!(text.contains("[0]=1"));
        assert!(text.contains("[1]=2"));
    }

    #[test]
    fn dense_array_emits_bracket_literal() {
        let node = Node::Array {
            id: RefId::new(0),
            length: 2,
            items: vec![(0, Node::Number { value: 1.0 }), (1, Node::Number { value: 2.0 })],
            flag: ObjectFlag::None,
        };
        assert_eq!(emit(&node), "[1,2]");
    }

    #[test]
    fn map_with_cyclic_key_defers_to_set_call() {
        let id = RefId::new(0);
        let node = Node::Map {
            id,
            entries: vec![(Node::IndexedValue { id }, Node::IndexedValue { id })],
            size: 1,
        };
        let text = emit(&node);
        assert!(text.contains(".set("));
        assert!(!text.contains("new Map([["));
    }

    #[test]
    fn object_assign_disabled_falls_back_to_sequential_assignment() {
        let node = Node::NullConstructor {
            id: RefId::new(0),
            record: ObjectRecord {
                keys: vec![PropertyKeyNode::Named("a".to_string())],
                values: vec![Node::Number { value: 1.0 }],
                size: 1,
            },
            flag: ObjectFlag::None,
        };
        let marks = collect_marks(&node);
        let binder = SelfContainedBinder::new();
        let config = SerializeConfig {
            features: FeatureSet::disabled(FeatureSet::empty() | Feature::ObjectAssign),
            plugins: Vec::new(),
        };
        let mut emitter = Emitter::new(&binder, marks, &config);
        let text = emitter.emit(&node).unwrap();
        assert!(!text.contains("Object.assign"));
        assert!(text.contains(".a="));
    }
}

//! `ir::Node` → `value::Value` reconstruction: the `fromJSON`/`deserialize`
//! half of a round trip (see SPEC_FULL.md §9 "Resolved open question —
//! `deserialize` without a host"). This crate has no embedded JS engine, so
//! `deserialize` cannot literally evaluate emitted source text; both
//! operations walk the IR directly and rebuild this crate's own `Value`
//! model, which is exactly the layer a production embedding targeting a
//! real engine would swap out.
//!
//! Containers that can participate in a cycle (`Array`, `Object`,
//! `NullConstructor`, `Map`, `Set`) are reconstructed in two phases: the
//! empty `Rc<RefCell<_>>` shell is allocated and recorded under its id
//! *before* its children are reconstructed, so a child `IndexedValue`
//! pointing back at an in-progress ancestor resolves to the same
//! allocation rather than failing or re-entering. Leaf-ish containers
//! (`Promise`, `Error`, …) are reconstructed in one pass and recorded only
//! once complete — a self-reference through one of those is outside this
//! crate's supported cycle shapes (see SPEC_FULL.md §8 property 2, which is
//! stated only for plain objects and Maps).

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use std::sync::{Arc, Mutex};

use crate::error::SerovalError;
use crate::ir::types::{
    BoxedKind, ErrorClassTag, ErrorOptions, FormDataEntryNode, Node, ObjectFlag, ObjectRecord,
    PlainRecord, PropertyKeyNode, PromiseStatus, RefId, TypedArrayKindTag, WellKnownSymbolTag,
};
use crate::plugin::Plugin;
use crate::reference::ReferenceRegistry;
use crate::value::{
    ArrayData, BoxedPrimitive, CustomEventData, DataViewData, DomExceptionData, ErrorClass,
    ErrorData, EventData, FileData, FormDataData, FormDataEntry, HeadersData, MapData,
    ObjectData, ObjectFlags, PropertyKey, RegExpData, RequestData, ResponseData, SetData,
    TypedArrayData, TypedArrayKind, UrlData, UrlSearchParamsData, Value, WellKnownSymbol,
};

/// A shared `RefId -> Value` table, analogous to the serializer's `$R`: a
/// caller reconstructing several cross-referenced chunks against the same
/// scope passes the same table to each `reconstruct` call so that later
/// chunks' `IndexedValue`/`Reference` nodes resolve against ids the earlier
/// chunks already bound.
pub type SharedBindings = Arc<Mutex<HashMap<RefId, Value>>>;

enum Bindings {
    Owned(RefCell<HashMap<RefId, Value>>),
    Shared(SharedBindings),
}

impl Bindings {
    fn get(&self, id: RefId) -> Option<Value> {
        match self {
            Bindings::Owned(cell) => cell.borrow().get(&id).cloned(),
            Bindings::Shared(shared) => shared.lock().expect("bindings table poisoned").get(&id).cloned(),
        }
    }

    fn insert(&self, id: RefId, value: Value) {
        match self {
            Bindings::Owned(cell) => {
                cell.borrow_mut().insert(id, value);
            }
            Bindings::Shared(shared) => {
                shared.lock().expect("bindings table poisoned").insert(id, value);
            }
        }
    }
}

/// Per-call state: the id -> Value table (fresh or shared across a cross
/// mode's scope), the reference registry `Reference` nodes resolve
/// against, and the plugin set `Plugin` nodes resolve against.
pub struct ReconstructContext {
    bindings: Bindings,
    references: ReferenceRegistry,
    plugins: Vec<Arc<dyn Plugin>>,
}

impl ReconstructContext {
    pub fn new(references: ReferenceRegistry, plugins: Vec<Arc<dyn Plugin>>) -> Self {
        ReconstructContext {
            bindings: Bindings::Owned(RefCell::new(HashMap::new())),
            references,
            plugins,
        }
    }

    /// Reconstruct against a table shared with other calls (cross mode).
    pub fn with_shared_bindings(
        shared: SharedBindings,
        references: ReferenceRegistry,
        plugins: Vec<Arc<dyn Plugin>>,
    ) -> Self {
        ReconstructContext {
            bindings: Bindings::Shared(shared),
            references,
            plugins,
        }
    }

    fn find_plugin(&self, tag: &str) -> Option<&Arc<dyn Plugin>> {
        self.plugins.iter().find(|p| p.tag() == tag)
    }
}

/// Reconstruct the value denoted by `node` using a fresh, non-shared
/// bindings table — the common case for a single self-contained `from_json`
/// call.
pub fn reconstruct(
    node: &Node,
    references: &ReferenceRegistry,
    plugins: &[Arc<dyn Plugin>],
) -> Result<Value, SerovalError> {
    let ctx = ReconstructContext::new(references.clone(), plugins.to_vec());
    reconstruct_with(&ctx, node)
}

pub fn reconstruct_with(ctx: &ReconstructContext, node: &Node) -> Result<Value, SerovalError> {
    match node {
        Node::True => Ok(Value::Bool(true)),
        Node::False => Ok(Value::Bool(false)),
        Node::Undefined => Ok(Value::Undefined),
        Node::Null => Ok(Value::Null),
        Node::NumberPosZero => Ok(Value::Number(0.0)),
        Node::NumberNegZero => Ok(Value::Number(-0.0)),
        Node::NumberPosInfinity => Ok(Value::Number(f64::INFINITY)),
        Node::NumberNegInfinity => Ok(Value::Number(f64::NEG_INFINITY)),
        Node::NumberNaN => Ok(Value::Number(f64::NAN)),
        Node::Number { value } => Ok(Value::Number(*value)),
        Node::String { value } => Ok(Value::string(value.clone())),
        Node::BigInt { value } => Ok(Value::BigInt(Rc::from(value.as_str()))),
        Node::WellKnownSymbol { symbol } => Ok(Value::WellKnownSymbol(well_known_symbol(*symbol))),

        Node::IndexedValue { id } => ctx.bindings.get(*id).ok_or_else(|| {
            SerovalError::invariant(format!("IndexedValue refers to unbound id {id}"))
        }),

        Node::Reference { id, tag } => {
            let value = ctx
                .references
                .resolve(tag)
                .ok_or_else(|| SerovalError::invariant(format!("no registered reference for tag '{tag}'")))?;
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }

        Node::Array { id, length, items, flag } => reconstruct_array(ctx, *id, *length, items, *flag),
        Node::Object { id, record, flag } => reconstruct_object(ctx, *id, record, *flag, false),
        Node::NullConstructor { id, record, flag } => reconstruct_object(ctx, *id, record, *flag, true),

        Node::Date { id, epoch_millis } => {
            let value = Value::Date(Rc::new(*epoch_millis));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::RegExp { id, source, flags } => {
            let value = Value::RegExp(Rc::new(RegExpData {
                source: source.clone(),
                flags: flags.clone(),
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Boxed { id, kind, value } => {
            let boxed = boxed_primitive(*kind, value)?;
            let value = Value::Boxed(Rc::new(boxed));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Url { id, href } => {
            let value = Value::Url(Rc::new(UrlData { href: href.clone() }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::UrlSearchParams { id, query } => {
            let pairs = urldecode_pairs(query);
            let value = Value::UrlSearchParams(Rc::new(RefCell::new(UrlSearchParamsData { pairs })));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Blob { id, mime_type, bytes } => {
            let body = reconstruct_bytes(ctx, bytes)?;
            let value = Value::Blob(Rc::new(crate::value::BlobData {
                mime_type: mime_type.clone(),
                body: crate::value::AsyncBytes::ready(body),
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::File { id, name, mime_type, last_modified, bytes } => {
            let body = reconstruct_bytes(ctx, bytes)?;
            let value = Value::File(Rc::new(FileData {
                name: name.clone(),
                mime_type: mime_type.clone(),
                last_modified: *last_modified,
                body: crate::value::AsyncBytes::ready(body),
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Headers { id, record } => {
            let pairs = reconstruct_plain_record(record)?;
            let value = Value::Headers(Rc::new(RefCell::new(HeadersData { pairs })));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::FormData { id, entries } => {
            let mut out = Vec::with_capacity(entries.len());
            for (key, entry) in entries {
                let entry = match entry {
                    FormDataEntryNode::Text(s) => FormDataEntry::Text(s.clone()),
                    FormDataEntryNode::File(node) => match reconstruct_with(ctx, node)? {
                        Value::File(f) => FormDataEntry::File(f),
                        _ => {
                            return Err(SerovalError::invariant(
                                "FormData file entry did not reconstruct to a File",
                            ))
                        }
                    },
                };
                out.push((key.clone(), entry));
            }
            let value = Value::FormData(Rc::new(RefCell::new(FormDataData { entries: out })));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Request { id, url, method, headers, body } => {
            let body = reconstruct_optional_body(ctx, body)?;
            let value = Value::Request(Rc::new(RequestData {
                url: url.clone(),
                method: method.clone(),
                headers: reconstruct_plain_record(headers)?,
                body,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Response { id, status, status_text, headers, body } => {
            let body = reconstruct_optional_body(ctx, body)?;
            let value = Value::Response(Rc::new(ResponseData {
                status: *status,
                status_text: status_text.clone(),
                headers: reconstruct_plain_record(headers)?,
                body,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Event { id, event_type, options } => {
            let value = Value::Event(Rc::new(EventData {
                event_type: event_type.clone(),
                bubbles: options.bubbles,
                cancelable: options.cancelable,
                composed: options.composed,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::CustomEvent { id, event_type, detail, options } => {
            let detail = detail.as_deref().map(|d| reconstruct_with(ctx, d)).transpose()?;
            let value = Value::CustomEvent(Rc::new(CustomEventData {
                event_type: event_type.clone(),
                detail,
                bubbles: options.bubbles,
                cancelable: options.cancelable,
                composed: options.composed,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::DomException { id, message, name } => {
            let value = Value::DomException(Rc::new(DomExceptionData {
                message: message.clone(),
                name: name.clone(),
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::ArrayBuffer { id, bytes } => {
            let value = Value::ArrayBuffer(Rc::new(bytes.clone()));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::TypedArray { id, kind, buffer, byte_offset, length }
        | Node::BigIntTypedArray { id, kind, buffer, byte_offset, length } => {
            let buffer = reconstruct_with(ctx, buffer)?;
            let value = Value::TypedArray(Rc::new(TypedArrayData {
                buffer,
                byte_offset: *byte_offset,
                length: *length,
                kind: typed_array_kind(*kind),
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::DataView { id, buffer, byte_offset, length } => {
            let buffer = reconstruct_with(ctx, buffer)?;
            let value = Value::DataView(Rc::new(DataViewData {
                buffer,
                byte_offset: *byte_offset,
                length: *length,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Map { id, entries, .. } => reconstruct_map(ctx, *id, entries),
        Node::Set { id, items, .. } => reconstruct_set(ctx, *id, items),
        Node::Promise { id, status, value } => {
            let inner = reconstruct_with(ctx, value)?;
            let promise = match status {
                PromiseStatus::Resolve => crate::value::PromiseData::resolved(inner),
                PromiseStatus::Reject => crate::value::PromiseData::rejected(inner),
            };
            let value = Value::Promise(promise);
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Error { id, class, message, options } => {
            let (cause, extra) = reconstruct_error_options(ctx, options)?;
            let value = Value::Error(Rc::new(ErrorData {
                class: error_class(*class),
                message: message.clone(),
                cause,
                extra,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::AggregateError { id, message, errors, options } => {
            let mut out = Vec::with_capacity(errors.len());
            for e in errors {
                out.push(reconstruct_with(ctx, e)?);
            }
            let (cause, extra) = reconstruct_error_options(ctx, options)?;
            let value = Value::AggregateError(Rc::new(crate::value::AggregateErrorData {
                message: message.clone(),
                errors: out,
                cause,
                extra,
            }));
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }
        Node::Plugin { id, tag, payload } => {
            let plugin = ctx
                .find_plugin(tag)
                .ok_or_else(|| SerovalError::missing_plugin(tag.clone()))?;
            let value = plugin.deserialize(payload)?;
            ctx.bindings.insert(*id, value.clone());
            Ok(value)
        }

        Node::PromiseConstructor { .. }
        | Node::PromiseResolve { .. }
        | Node::PromiseReject { .. }
        | Node::ReadableStreamConstructor { .. }
        | Node::ReadableStreamEnqueue { .. }
        | Node::ReadableStreamError { .. }
        | Node::ReadableStreamClose { .. } => Err(SerovalError::invariant(
            "streaming-only IR tag has no standalone reconstruction; apply it via the streaming driver's own bookkeeping",
        )),
    }
}

fn reconstruct_array(
    ctx: &ReconstructContext,
    id: RefId,
    length: usize,
    items: &[(usize, Node)],
    flag: ObjectFlag,
) -> Result<Value, SerovalError> {
    let data = Rc::new(RefCell::new(ArrayData {
        items: vec![None; length],
        flags: ObjectFlags::None,
    }));
    let value = Value::Array(data.clone());
    ctx.bindings.insert(id, value.clone());
    for (idx, item_node) in items {
        let item = reconstruct_with(ctx, item_node)?;
        data.borrow_mut().items[*idx] = Some(item);
    }
    data.borrow_mut().flags = object_flags(flag);
    Ok(value)
}

fn reconstruct_object(
    ctx: &ReconstructContext,
    id: RefId,
    record: &ObjectRecord,
    flag: ObjectFlag,
    null_prototype: bool,
) -> Result<Value, SerovalError> {
    let data = Rc::new(RefCell::new(ObjectData {
        entries: Vec::with_capacity(record.keys.len()),
        flags: ObjectFlags::None,
        null_prototype,
    }));
    let value = Value::Object(data.clone());
    ctx.bindings.insert(id, value.clone());
    for (key, value_node) in record.keys.iter().zip(&record.values) {
        let v = reconstruct_with(ctx, value_node)?;
        data.borrow_mut().entries.push((property_key(key), v));
    }
    data.borrow_mut().flags = object_flags(flag);
    Ok(value)
}

fn reconstruct_map(ctx: &ReconstructContext, id: RefId, entries: &[(Node, Node)]) -> Result<Value, SerovalError> {
    let data = Rc::new(RefCell::new(MapData {
        entries: Vec::with_capacity(entries.len()),
        flags: ObjectFlags::None,
    }));
    let value = Value::Map(data.clone());
    ctx.bindings.insert(id, value.clone());
    for (k, v) in entries {
        let k = reconstruct_with(ctx, k)?;
        let v = reconstruct_with(ctx, v)?;
        data.borrow_mut().entries.push((k, v));
    }
    Ok(value)
}

fn reconstruct_set(ctx: &ReconstructContext, id: RefId, items: &[Node]) -> Result<Value, SerovalError> {
    let data = Rc::new(RefCell::new(SetData {
        items: Vec::with_capacity(items.len()),
        flags: ObjectFlags::None,
    }));
    let value = Value::Set(data.clone());
    ctx.bindings.insert(id, value.clone());
    for item in items {
        let v = reconstruct_with(ctx, item)?;
        data.borrow_mut().items.push(v);
    }
    Ok(value)
}

fn reconstruct_error_options(
    ctx: &ReconstructContext,
    options: &ErrorOptions,
) -> Result<(Option<Value>, Vec<(String, Value)>), SerovalError> {
    let cause = options.cause.as_deref().map(|c| reconstruct_with(ctx, c)).transpose()?;
    let extra = match &options.record {
        None => Vec::new(),
        Some(record) => {
            let mut out = Vec::with_capacity(record.keys.len());
            for (key, value_node) in record.keys.iter().zip(&record.values) {
                let name = match key {
                    PropertyKeyNode::Named(n) => n.clone(),
                    PropertyKeyNode::SymbolIterator => continue,
                };
                out.push((name, reconstruct_with(ctx, value_node)?));
            }
            out
        }
    };
    Ok((cause, extra))
}

fn reconstruct_bytes(ctx: &ReconstructContext, node: &Node) -> Result<Vec<u8>, SerovalError> {
    match reconstruct_with(ctx, node)? {
        Value::ArrayBuffer(bytes) => Ok((*bytes).clone()),
        _ => Err(SerovalError::invariant("expected an ArrayBuffer node for a body")),
    }
}

fn reconstruct_optional_body(
    ctx: &ReconstructContext,
    body: &Option<Box<Node>>,
) -> Result<Option<crate::value::AsyncBytes>, SerovalError> {
    match body {
        None => Ok(None),
        Some(b) => Ok(Some(crate::value::AsyncBytes::ready(reconstruct_bytes(ctx, b)?))),
    }
}

fn reconstruct_plain_record(record: &PlainRecord) -> Result<Vec<(String, String)>, SerovalError> {
    let mut out = Vec::with_capacity(record.keys.len());
    for (key, value_node) in record.keys.iter().zip(&record.values) {
        let value = match value_node {
            Node::String { value } => value.clone(),
            _ => {
                return Err(SerovalError::invariant(
                    "plain record value must be a String node",
                ))
            }
        };
        out.push((key.clone(), value));
    }
    Ok(out)
}

fn property_key(key: &PropertyKeyNode) -> PropertyKey {
    match key {
        PropertyKeyNode::Named(n) => PropertyKey::Named(n.clone()),
        PropertyKeyNode::SymbolIterator => PropertyKey::SymbolIterator,
    }
}

fn object_flags(flag: ObjectFlag) -> ObjectFlags {
    match flag {
        ObjectFlag::None => ObjectFlags::None,
        ObjectFlag::Sealed => ObjectFlags::Sealed,
        ObjectFlag::Frozen => ObjectFlags::Frozen,
        ObjectFlag::NonExtensible => ObjectFlags::NonExtensible,
    }
}

fn error_class(tag: ErrorClassTag) -> ErrorClass {
    match tag {
        ErrorClassTag::Error => ErrorClass::Error,
        ErrorClassTag::TypeError => ErrorClass::TypeError,
        ErrorClassTag::RangeError => ErrorClass::RangeError,
        ErrorClassTag::SyntaxError => ErrorClass::SyntaxError,
        ErrorClassTag::ReferenceError => ErrorClass::ReferenceError,
        ErrorClassTag::EvalError => ErrorClass::EvalError,
        ErrorClassTag::UriError => ErrorClass::UriError,
    }
}

fn typed_array_kind(tag: TypedArrayKindTag) -> TypedArrayKind {
    match tag {
        TypedArrayKindTag::Int8Array => TypedArrayKind::Int8Array,
        TypedArrayKindTag::Uint8Array => TypedArrayKind::Uint8Array,
        TypedArrayKindTag::Uint8ClampedArray => TypedArrayKind::Uint8ClampedArray,
        TypedArrayKindTag::Int16Array => TypedArrayKind::Int16Array,
        TypedArrayKindTag::Uint16Array => TypedArrayKind::Uint16Array,
        TypedArrayKindTag::Int32Array => TypedArrayKind::Int32Array,
        TypedArrayKindTag::Uint32Array => TypedArrayKind::Uint32Array,
        TypedArrayKindTag::Float32Array => TypedArrayKind::Float32Array,
        TypedArrayKindTag::Float64Array => TypedArrayKind::Float64Array,
        TypedArrayKindTag::BigInt64Array => TypedArrayKind::BigInt64Array,
        TypedArrayKindTag::BigUint64Array => TypedArrayKind::BigUint64Array,
    }
}

fn well_known_symbol(tag: WellKnownSymbolTag) -> WellKnownSymbol {
    match tag {
        WellKnownSymbolTag::Iterator => WellKnownSymbol::Iterator,
        WellKnownSymbolTag::AsyncIterator => WellKnownSymbol::AsyncIterator,
        WellKnownSymbolTag::HasInstance => WellKnownSymbol::HasInstance,
        WellKnownSymbolTag::IsConcatSpreadable => WellKnownSymbol::IsConcatSpreadable,
        WellKnownSymbolTag::Species => WellKnownSymbol::Species,
        WellKnownSymbolTag::ToPrimitive => WellKnownSymbol::ToPrimitive,
        WellKnownSymbolTag::ToStringTag => WellKnownSymbol::ToStringTag,
        WellKnownSymbolTag::Unscopables => WellKnownSymbol::Unscopables,
    }
}

fn boxed_primitive(kind: BoxedKind, value: &str) -> Result<BoxedPrimitive, SerovalError> {
    Ok(match kind {
        BoxedKind::Bool => BoxedPrimitive::Bool(value.parse().map_err(|_| {
            SerovalError::invariant(format!("boxed bool payload is not a bool: {value}"))
        })?),
        BoxedKind::Number => BoxedPrimitive::Number(value.parse().map_err(|_| {
            SerovalError::invariant(format!("boxed number payload is not a number: {value}"))
        })?),
        BoxedKind::String => BoxedPrimitive::String(value.to_string()),
        BoxedKind::BigInt => BoxedPrimitive::BigInt(value.to_string()),
        BoxedKind::Symbol => BoxedPrimitive::Symbol(value.to_string()),
    })
}

/// Inverse of `parse::urlencode` (`application/x-www-form-urlencoded`
/// decoding): `+` is a space, `%XX` is a byte escape, everything else is
/// literal. Malformed escapes pass through unchanged rather than failing —
/// this mirrors the permissive behavior of the runtime's own
/// `URLSearchParams` constructor.
fn urldecode_pairs(query: &str) -> Vec<(String, String)> {
    if query.is_empty() {
        return Vec::new();
    }
    query
        .split('&')
        .map(|pair| match pair.split_once('=') {
            Some((k, v)) => (urldecode(k), urldecode(v)),
            None => (urldecode(pair), String::new()),
        })
        .collect()
}

fn urldecode(s: &str) -> String {
    let bytes = s.as_bytes();
    let mut out = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        match bytes[i] {
            b'+' => {
                out.push(b' ');
                i += 1;
            }
            b'%' if i + 2 < bytes.len() => {
                let hex = std::str::from_utf8(&bytes[i + 1..i + 3]).ok();
                match hex.and_then(|h| u8::from_str_radix(h, 16).ok()) {
                    Some(byte) => {
                        out.push(byte);
                        i += 3;
                    }
                    None => {
                        out.push(bytes[i]);
                        i += 1;
                    }
                }
            }
            b => {
                out.push(b);
                i += 1;
            }
        }
    }
    String::from_utf8_lossy(&out).into_owned()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::types::{ObjectFlag, ObjectRecord, RefId};
    use crate::value::PropertyKey;

    fn fresh() -> ReconstructContext {
        ReconstructContext::new(ReferenceRegistry::new(), Vec::new())
    }

    #[test]
    fn reconstructs_plain_number() {
        let ctx = fresh();
        let value = reconstruct_with(&ctx, &Node::Number { value: 42.0 }).unwrap();
        assert!(matches!(value, Value::Number(n) if n == 42.0));
    }

    #[test]
    fn reconstructs_infinity_and_nan() {
        let ctx = fresh();
        assert!(matches!(
            reconstruct_with(&ctx, &Node::NumberPosInfinity).unwrap(),
            Value::Number(n) if n.is_infinite() && n.is_sign_positive()
        ));
        assert!(matches!(
            reconstruct_with(&ctx, &Node::NumberNaN).unwrap(),
            Value::Number(n) if n.is_nan()
        ));
    }

    #[test]
    fn self_referential_object_round_trips_by_identity() {
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
        let ctx = fresh();
        let value = reconstruct_with(&ctx, &node).unwrap();
        if let Value::Object(rc) = &value {
            let entries = &rc.borrow().entries;
            assert_eq!(entries.len(), 1);
            assert!(entries[0].1.ptr_eq(&value));
        } else {
            panic!("expected Object");
        }
    }

    #[test]
    fn map_with_self_as_key_and_value_reconstructs_as_single_cyclic_entry() {
        let id = RefId::new(0);
        let node = Node::Map {
            id,
            entries: vec![(Node::IndexedValue { id }, Node::IndexedValue { id })],
            size: 1,
        };
        let ctx = fresh();
        let value = reconstruct_with(&ctx, &node).unwrap();
        if let Value::Map(rc) = &value {
            let entries = &rc.borrow().entries;
            assert_eq!(entries.len(), 1);
            assert!(entries[0].0.ptr_eq(&value));
            assert!(entries[0].1.ptr_eq(&value));
        } else {
            panic!("expected Map");
        }
    }

    #[test]
    fn array_preserves_holes_on_reconstruction() {
        let node = Node::Array {
            id: RefId::new(0),
            length: 3,
            items: vec![(0, Node::Number { value: 1.0 }), (2, Node::Number { value: 3.0 })],
            flag: ObjectFlag::None,
        };
        let ctx = fresh();
        let value = reconstruct_with(&ctx, &node).unwrap();
        if let Value::Array(rc) = &value {
            let items = &rc.borrow().items;
            assert_eq!(items.len(), 3);
            assert!(items[0].is_some());
            assert!(items[1].is_none());
            assert!(items[2].is_some());
        } else {
            panic!("expected Array");
        }
    }

    #[test]
    fn unbound_indexed_value_is_an_invariant_violation() {
        let ctx = fresh();
        let err = reconstruct_with(&ctx, &Node::IndexedValue { id: RefId::new(99) }).unwrap_err();
        assert!(matches!(err, SerovalError::InvariantViolation { .. }));
    }

    #[test]
    fn url_search_params_round_trips_pairs() {
        let pairs = urldecode_pairs("a=1&b=hello+world");
        assert_eq!(pairs, vec![("a".to_string(), "1".to_string()), ("b".to_string(), "hello world".to_string())]);
    }

    #[test]
    fn object_flag_is_applied_after_contents_are_filled() {
        let node = Node::Object {
            id: RefId::new(0),
            record: ObjectRecord::default(),
            flag: ObjectFlag::Frozen,
        };
        let ctx = fresh();
        let value = reconstruct_with(&ctx, &node).unwrap();
        if let Value::Object(rc) = &value {
            assert_eq!(rc.borrow().flags, ObjectFlags::Frozen);
        } else {
            panic!("expected Object");
        }
    }

    #[test]
    fn property_key_named_round_trips() {
        assert_eq!(
            property_key(&PropertyKeyNode::Named("x".into())),
            PropertyKey::Named("x".into())
        );
    }
}

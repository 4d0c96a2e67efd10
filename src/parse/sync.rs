//! Synchronous parser: walks a `Value` graph straight-line, with no
//! suspension points. Rejects anything whose faithful capture requires
//! awaiting — a pending `Promise`, an unresolved `Blob`/`File`/`Request`/
//! `Response` body, or a `ReadableStream`. Use [`crate::parse::parse_async`]
//! for those.

use std::cell::RefCell;
use std::rc::Rc;

use super::{
    event_options, is_deferred_kind, parse_array_buffer, parse_boxed, parse_date,
    parse_dom_exception, parse_event, parse_headers, parse_primitive, parse_regexp, parse_url,
    parse_url_search_params, plain_record, property_key_node, require_web_api, ParseContext,
    ParseOptions,
};
use crate::error::SerovalError;
use crate::feature::Feature;
use crate::ir::types::{ErrorOptions, FormDataEntryNode, Node, ObjectRecord, PromiseStatus};
use crate::value::{
    ArrayData, FormDataData, FormDataEntry, MapData, ObjectData, PromiseOutcome, RequestData,
    ResponseData, SetData, TypedArrayData, Value,
};

/// Parse `value` synchronously, returning the IR root and the context that
/// accumulated its id assignments (callers needing the id space for a
/// follow-up cross-referenced serialize reuse the context's bookkeeping).
pub fn parse(value: &Value, options: ParseOptions) -> Result<(Node, ParseContext), SerovalError> {
    let ctx = ParseContext::new(options);
    let node = parse_value(&ctx, value)?;
    Ok((node, ctx))
}

fn parse_value(ctx: &ParseContext, value: &Value) -> Result<Node, SerovalError> {
    if let Some(node) = parse_primitive(ctx, value)? {
        return Ok(node);
    }
    let identity = value.identity();
    if let Some(id) = ctx.existing_id(identity) {
        return Ok(Node::IndexedValue { id });
    }
    if let Some(tag) = ctx.tag_for(value) {
        let id = ctx.assign_id(identity);
        return Ok(Node::Reference { id, tag });
    }
    match value {
        Value::Array(rc) => parse_array(ctx, identity, rc),
        Value::Boxed(b) => {
            let id = ctx.assign_id(identity);
            parse_boxed(ctx, id, b)
        }
        Value::Date(d) => {
            let id = ctx.assign_id(identity);
            Ok(parse_date(ctx, id, d))
        }
        Value::RegExp(r) => {
            let id = ctx.assign_id(identity);
            Ok(parse_regexp(id, r))
        }
        Value::ArrayBuffer(b) => {
            let id = ctx.assign_id(identity);
            Ok(parse_array_buffer(id, b))
        }
        Value::TypedArray(t) => parse_typed_array(ctx, identity, t),
        Value::DataView(d) => parse_data_view(ctx, identity, d),
        Value::Map(m) => parse_map(ctx, identity, m),
        Value::Set(s) => parse_set(ctx, identity, s),
        Value::Url(u) => {
            require_web_api(ctx, "URL requires WebApi support")?;
            let id = ctx.assign_id(identity);
            Ok(parse_url(id, u))
        }
        Value::UrlSearchParams(u) => {
            require_web_api(ctx, "URLSearchParams requires WebApi support")?;
            let id = ctx.assign_id(identity);
            Ok(parse_url_search_params(id, &u.borrow()))
        }
        Value::Blob(b) => parse_blob(ctx, identity, b),
        Value::File(f) => parse_file(ctx, identity, f),
        Value::Headers(h) => {
            require_web_api(ctx, "Headers requires WebApi support")?;
            let id = ctx.assign_id(identity);
            Ok(parse_headers(id, &h.borrow()))
        }
        Value::FormData(f) => parse_form_data(ctx, identity, f),
        Value::Request(r) => parse_request(ctx, identity, r),
        Value::Response(r) => parse_response(ctx, identity, r),
        Value::Event(e) => {
            require_web_api(ctx, "Event requires WebApi support")?;
            let id = ctx.assign_id(identity);
            Ok(parse_event(id, e))
        }
        Value::CustomEvent(e) => parse_custom_event(ctx, identity, e),
        Value::DomException(e) => {
            require_web_api(ctx, "DOMException requires WebApi support")?;
            let id = ctx.assign_id(identity);
            Ok(parse_dom_exception(id, e))
        }
        Value::AggregateError(e) => parse_aggregate_error(ctx, identity, e),
        Value::Promise(p) => parse_promise(ctx, identity, p),
        Value::Error(e) => parse_error(ctx, identity, e),
        Value::Iterable(it) => parse_iterable(ctx, identity, it),
        Value::Object(o) => parse_object(ctx, identity, o),
        Value::ReadableStream(_) => Err(SerovalError::unsupported(
            "ReadableStream requires the asynchronous parser",
        )),
        _ => dispatch_plugin_or_fail(ctx, identity, value),
    }
}

fn parse_property_pairs(
    ctx: &ParseContext,
    entries: &[(crate::value::PropertyKey, Value)],
) -> Result<(Vec<crate::ir::types::PropertyKeyNode>, Vec<Node>), SerovalError> {
    let mut results: Vec<Option<Node>> = vec![None; entries.len()];
    let mut deferred = Vec::new();
    for (idx, (_, v)) in entries.iter().enumerate() {
        if is_deferred_kind(v) {
            deferred.push(idx);
        } else {
            results[idx] = Some(parse_value(ctx, v)?);
        }
    }
    for idx in deferred {
        results[idx] = Some(parse_value(ctx, &entries[idx].1)?);
    }
    let keys = entries.iter().map(|(k, _)| property_key_node(k)).collect();
    let values = results.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok((keys, values))
}

fn parse_array(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<ArrayData>>) -> Result<Node, SerovalError> {
    let id = ctx.assign_id(identity);
    let (length, flag, snapshot) = {
        let b = rc.borrow();
        (b.items.len(), super::object_flag(b.flags), b.items.clone())
    };
    let mut items = Vec::new();
    let mut deferred = Vec::new();
    for (idx, slot) in snapshot.iter().enumerate() {
        if let Some(v) = slot {
            if is_deferred_kind(v) {
                deferred.push(idx);
            } else {
                items.push((idx, parse_value(ctx, v)?));
            }
        }
    }
    for idx in deferred {
        let v = snapshot[idx].as_ref().expect("deferred index is always populated");
        items.push((idx, parse_value(ctx, v)?));
    }
    items.sort_by_key(|(idx, _)| *idx);
    Ok(Node::Array { id, length, items, flag })
}

fn parse_object(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<ObjectData>>) -> Result<Node, SerovalError> {
    let id = ctx.assign_id(identity);
    let (null_prototype, flag, entries) = {
        let b = rc.borrow();
        (b.null_prototype, super::object_flag(b.flags), b.entries.clone())
    };
    let (keys, values) = parse_property_pairs(ctx, &entries)?;
    let size = keys.len();
    let record = ObjectRecord { keys, values, size };
    if null_prototype {
        Ok(Node::NullConstructor { id, record, flag })
    } else {
        Ok(Node::Object { id, record, flag })
    }
}

fn parse_iterable(ctx: &ParseContext, identity: usize, it: &Rc<crate::value::IterableData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Symbol, "iterables require Symbol support")?;
    let id = ctx.assign_id(identity);
    let (mut keys, mut values) = parse_property_pairs(ctx, &it.record)?;
    let drained = Value::array(it.items.clone());
    let array_node = parse_value(ctx, &drained)?;
    keys.push(crate::ir::types::PropertyKeyNode::SymbolIterator);
    values.push(array_node);
    let size = keys.len();
    Ok(Node::Object {
        id,
        record: ObjectRecord { keys, values, size },
        flag: crate::ir::types::ObjectFlag::None,
    })
}

fn parse_map(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<MapData>>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Map, "Map requires Map support")?;
    let id = ctx.assign_id(identity);
    let snapshot = rc.borrow().entries.clone();
    let size = snapshot.len();
    let mut slots: Vec<Option<(Node, Node)>> = vec![None; size];
    let mut deferred = Vec::new();
    for (idx, (k, v)) in snapshot.iter().enumerate() {
        if is_deferred_kind(k) || is_deferred_kind(v) {
            deferred.push(idx);
        } else {
            slots[idx] = Some((parse_value(ctx, k)?, parse_value(ctx, v)?));
        }
    }
    for idx in deferred {
        let (k, v) = &snapshot[idx];
        slots[idx] = Some((parse_value(ctx, k)?, parse_value(ctx, v)?));
    }
    let entries = slots.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok(Node::Map { id, entries, size })
}

fn parse_set(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<SetData>>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Set, "Set requires Set support")?;
    let id = ctx.assign_id(identity);
    let snapshot = rc.borrow().items.clone();
    let size = snapshot.len();
    let mut slots: Vec<Option<Node>> = vec![None; size];
    let mut deferred = Vec::new();
    for (idx, v) in snapshot.iter().enumerate() {
        if is_deferred_kind(v) {
            deferred.push(idx);
        } else {
            slots[idx] = Some(parse_value(ctx, v)?);
        }
    }
    for idx in deferred {
        slots[idx] = Some(parse_value(ctx, &snapshot[idx])?);
    }
    let items = slots.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok(Node::Set { id, items, size })
}

fn parse_typed_array(ctx: &ParseContext, identity: usize, t: &Rc<TypedArrayData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::TypedArray, "typed arrays require TypedArray support")?;
    if t.kind.is_bigint() {
        ctx.require_feature(Feature::BigIntTypedArray, "BigInt64Array/BigUint64Array require BigIntTypedArray support")?;
    }
    let id = ctx.assign_id(identity);
    let buffer = Box::new(parse_value(ctx, &t.buffer)?);
    Ok(if t.kind.is_bigint() {
        Node::BigIntTypedArray { id, kind: t.kind.into(), buffer, byte_offset: t.byte_offset, length: t.length }
    } else {
        Node::TypedArray { id, kind: t.kind.into(), buffer, byte_offset: t.byte_offset, length: t.length }
    })
}

fn parse_data_view(ctx: &ParseContext, identity: usize, d: &Rc<crate::value::DataViewData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::TypedArray, "DataView requires TypedArray support")?;
    let id = ctx.assign_id(identity);
    let buffer = Box::new(parse_value(ctx, &d.buffer)?);
    Ok(Node::DataView { id, buffer, byte_offset: d.byte_offset, length: d.length })
}

fn parse_error_options(
    ctx: &ParseContext,
    cause: &Option<Value>,
    extra: &[(String, Value)],
) -> Result<ErrorOptions, SerovalError> {
    let cause_node = if ctx.features.has(Feature::ErrorPrototypeStack) {
        match cause {
            Some(v) => Some(Box::new(parse_value(ctx, v)?)),
            None => None,
        }
    } else {
        None
    };
    let record = if extra.is_empty() {
        None
    } else {
        let entries: Vec<(crate::value::PropertyKey, Value)> = extra
            .iter()
            .map(|(k, v)| (crate::value::PropertyKey::Named(k.clone()), v.clone()))
            .collect();
        let (keys, values) = parse_property_pairs(ctx, &entries)?;
        let size = keys.len();
        Some(ObjectRecord { keys, values, size })
    };
    Ok(ErrorOptions { record, cause: cause_node })
}

fn parse_aggregate_error(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::AggregateErrorData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::AggregateError, "AggregateError requires AggregateError support")?;
    let id = ctx.assign_id(identity);
    let mut errors = Vec::with_capacity(e.errors.len());
    for err in &e.errors {
        errors.push(parse_value(ctx, err)?);
    }
    let options = parse_error_options(ctx, &e.cause, &e.extra)?;
    Ok(Node::AggregateError { id, message: e.message.clone(), errors, options })
}

fn parse_error(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::ErrorData>) -> Result<Node, SerovalError> {
    let id = ctx.assign_id(identity);
    let options = parse_error_options(ctx, &e.cause, &e.extra)?;
    Ok(Node::Error { id, class: e.class.into(), message: e.message.clone(), options })
}

fn parse_promise(ctx: &ParseContext, identity: usize, p: &Rc<crate::value::PromiseData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Promise, "Promise requires Promise support")?;
    let outcome = p.settled().ok_or_else(|| {
        SerovalError::unsupported("pending Promise requires the asynchronous parser")
    })?;
    let id = ctx.assign_id(identity);
    let (status, inner) = match outcome {
        PromiseOutcome::Resolved(v) => (PromiseStatus::Resolve, v),
        PromiseOutcome::Rejected(v) => (PromiseStatus::Reject, v),
    };
    let value = Box::new(parse_value(ctx, &inner)?);
    Ok(Node::Promise { id, status, value })
}

fn parse_blob(ctx: &ParseContext, identity: usize, b: &Rc<crate::value::BlobData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Blob requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let bytes = b.body.ready_bytes().ok_or_else(|| {
        SerovalError::unsupported("pending Blob body requires the asynchronous parser")
    })?;
    let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
    let bytes_node = Box::new(parse_value(ctx, &buffer_value)?);
    Ok(Node::Blob { id, mime_type: b.mime_type.clone(), bytes: bytes_node })
}

fn parse_file(ctx: &ParseContext, identity: usize, f: &Rc<crate::value::FileData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "File requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let bytes = f.body.ready_bytes().ok_or_else(|| {
        SerovalError::unsupported("pending File body requires the asynchronous parser")
    })?;
    let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
    let bytes_node = Box::new(parse_value(ctx, &buffer_value)?);
    Ok(Node::File {
        id,
        name: f.name.clone(),
        mime_type: f.mime_type.clone(),
        last_modified: f.last_modified,
        bytes: bytes_node,
    })
}

fn parse_form_data(ctx: &ParseContext, identity: usize, f: &Rc<RefCell<FormDataData>>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "FormData requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let snapshot = f.borrow().entries.clone();
    let mut entries = Vec::with_capacity(snapshot.len());
    for (k, entry) in snapshot {
        let node = match entry {
            FormDataEntry::Text(s) => FormDataEntryNode::Text(s),
            FormDataEntry::File(file) => FormDataEntryNode::File(parse_value(ctx, &Value::File(file))?),
        };
        entries.push((k, node));
    }
    Ok(Node::FormData { id, entries })
}

fn parse_request(ctx: &ParseContext, identity: usize, r: &Rc<RequestData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Request requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let body = match &r.body {
        None => None,
        Some(b) => {
            let bytes = b.ready_bytes().ok_or_else(|| {
                SerovalError::unsupported("pending Request body requires the asynchronous parser")
            })?;
            let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
            Some(Box::new(parse_value(ctx, &buffer_value)?))
        }
    };
    Ok(Node::Request {
        id,
        url: r.url.clone(),
        method: r.method.clone(),
        headers: plain_record(&r.headers),
        body,
    })
}

fn parse_response(ctx: &ParseContext, identity: usize, r: &Rc<ResponseData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Response requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let body = match &r.body {
        None => None,
        Some(b) => {
            let bytes = b.ready_bytes().ok_or_else(|| {
                SerovalError::unsupported("pending Response body requires the asynchronous parser")
            })?;
            let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
            Some(Box::new(parse_value(ctx, &buffer_value)?))
        }
    };
    Ok(Node::Response {
        id,
        status: r.status,
        status_text: r.status_text.clone(),
        headers: plain_record(&r.headers),
        body,
    })
}

fn parse_custom_event(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::CustomEventData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "CustomEvent requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let detail = match &e.detail {
        None => None,
        Some(v) => Some(Box::new(parse_value(ctx, v)?)),
    };
    Ok(Node::CustomEvent {
        id,
        event_type: e.event_type.clone(),
        detail,
        options: event_options(e.bubbles, e.cancelable, e.composed),
    })
}

fn dispatch_plugin_or_fail(ctx: &ParseContext, identity: usize, value: &Value) -> Result<Node, SerovalError> {
    if let Some(plugin) = ctx.find_plugin(value) {
        let id = ctx.assign_id(identity);
        let payload = plugin.parse(value)?;
        Ok(Node::Plugin { id, tag: plugin.tag().to_string(), payload })
    } else {
        Err(SerovalError::unsupported(
            "value did not match any recognized shape or registered plugin",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::{ObjectFlags, PropertyKey};

    #[test]
    fn parses_plain_object_preserving_key_order() {
        let value = Value::object(vec![
            (PropertyKey::Named("b".into()), Value::number(2.0)),
            (PropertyKey::Named("a".into()), Value::number(1.0)),
        ]);
        let (node, _) = parse(&value, ParseOptions::default()).unwrap();
        match node {
            Node::Object { record, .. } => {
                assert_eq!(record.keys.len(), 2);
                assert!(matches!(&record.keys[0], crate::ir::types::PropertyKeyNode::Named(k) if k == "b"));
            }
            _ => panic!("expected Object"),
        }
    }

    #[test]
    fn detects_self_referential_cycle() {
        let obj = Value::object(vec![]);
        if let Value::Object(rc) = &obj {
            rc.borrow_mut().entries.push((PropertyKey::Named("self".into()), obj.clone()));
        }
        let (node, _) = parse(&obj, ParseOptions::default()).unwrap();
        match node {
            Node::Object { id, record, .. } => {
                assert_eq!(record.values.len(), 1);
                assert!(matches!(&record.values[0], Node::IndexedValue { id: inner } if *inner == id));
            }
            _ => panic!("expected Object"),
        }
    }

    #[test]
    fn repeated_alias_emits_indexed_value() {
        let shared = Value::array(vec![Value::number(1.0)]);
        let outer = Value::array(vec![shared.clone(), shared]);
        let (node, _) = parse(&outer, ParseOptions::default()).unwrap();
        match node {
            Node::Array { items, .. } => {
                assert_eq!(items.len(), 2);
                assert!(matches!(items[0].1, Node::Array { .. }));
                assert!(matches!(items[1].1, Node::IndexedValue { .. }));
            }
            _ => panic!("expected Array"),
        }
    }

    #[test]
    fn array_preserves_holes() {
        let value = Value::Array(Rc::new(RefCell::new(ArrayData {
            items: vec![Some(Value::number(1.0)), None, Some(Value::number(3.0))],
            flags: ObjectFlags::None,
        })));
        let (node, _) = parse(&value, ParseOptions::default()).unwrap();
        match node {
            Node::Array { length, items, .. } => {
                assert_eq!(length, 3);
                assert_eq!(items.len(), 2);
                assert_eq!(items[0].0, 0);
                assert_eq!(items[1].0, 2);
            }
            _ => panic!("expected Array"),
        }
    }

    #[test]
    fn rejects_pending_promise() {
        let fut = std::future::pending::<crate::value::PromiseOutcome>();
        let value = Value::Promise(crate::value::PromiseData::pending(fut));
        let err = parse(&value, ParseOptions::default()).unwrap_err();
        assert!(matches!(err, SerovalError::UnsupportedType { .. }));
    }

    #[test]
    fn rejects_web_api_value_when_feature_disabled() {
        let options = ParseOptions {
            features: crate::feature::FeatureSet::all() & !crate::feature::FeatureSet::from(Feature::WebApi),
            ..Default::default()
        };
        let value = Value::Url(Rc::new(crate::value::UrlData { href: "https://example.com/".into() }));
        let err = parse(&value, options).unwrap_err();
        assert!(matches!(err, SerovalError::FeatureDisabled { .. }));
    }

    #[test]
    fn map_with_self_as_key_and_value_round_trips_as_single_entry() {
        let map = Value::map(vec![]);
        if let Value::Map(rc) = &map {
            rc.borrow_mut().entries.push((map.clone(), map.clone()));
        }
        let (node, _) = parse(&map, ParseOptions::default()).unwrap();
        match node {
            Node::Map { size, entries, .. } => {
                assert_eq!(size, 1);
                assert!(matches!(entries[0].0, Node::IndexedValue { .. }));
                assert!(matches!(entries[0].1, Node::IndexedValue { .. }));
            }
            _ => panic!("expected Map"),
        }
    }
}

//! Asynchronous parser: like [`crate::parse::sync`], but awaits `Promise`
//! settlement, drains `Blob`/`File`/`Request`/`Response` bodies, and drains
//! `ReadableStream`s into a materialized `Array` for non-streaming
//! consumers. The streaming driver (`stream::`) instead drives this parser
//! per-chunk and emits incremental IR nodes as they arrive (§4.8).
//!
//! Rust has no native recursive `async fn` (the generated state machine
//! would have infinite size), so the recursive walk is written against a
//! boxed, pinned future — the standard idiom for this shape, mirroring how
//! `gauss-engine`'s pipeline stages box recursive `Future`s at task
//! boundaries.

use std::cell::RefCell;
use std::future::Future;
use std::pin::Pin;
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

type BoxedParse<'a> = Pin<Box<dyn Future<Output = Result<Node, SerovalError>> + 'a>>;

/// Parse `value`, awaiting any pending promises, bodies, or stream chunks
/// reachable from it.
pub async fn parse_async(value: &Value, options: ParseOptions) -> Result<(Node, ParseContext), SerovalError> {
    let ctx = ParseContext::new(options);
    let node = parse_value(&ctx, value).await?;
    Ok((node, ctx))
}

fn parse_value<'a>(ctx: &'a ParseContext, value: &'a Value) -> BoxedParse<'a> {
    Box::pin(async move {
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
            Value::Array(rc) => parse_array(ctx, identity, rc).await,
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
            Value::TypedArray(t) => parse_typed_array(ctx, identity, t).await,
            Value::DataView(d) => parse_data_view(ctx, identity, d).await,
            Value::Map(m) => parse_map(ctx, identity, m).await,
            Value::Set(s) => parse_set(ctx, identity, s).await,
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
            Value::Blob(b) => parse_blob(ctx, identity, b).await,
            Value::File(f) => parse_file(ctx, identity, f).await,
            Value::Headers(h) => {
                require_web_api(ctx, "Headers requires WebApi support")?;
                let id = ctx.assign_id(identity);
                Ok(parse_headers(id, &h.borrow()))
            }
            Value::FormData(f) => parse_form_data(ctx, identity, f).await,
            Value::Request(r) => parse_request(ctx, identity, r).await,
            Value::Response(r) => parse_response(ctx, identity, r).await,
            Value::Event(e) => {
                require_web_api(ctx, "Event requires WebApi support")?;
                let id = ctx.assign_id(identity);
                Ok(parse_event(id, e))
            }
            Value::CustomEvent(e) => parse_custom_event(ctx, identity, e).await,
            Value::DomException(e) => {
                require_web_api(ctx, "DOMException requires WebApi support")?;
                let id = ctx.assign_id(identity);
                Ok(parse_dom_exception(id, e))
            }
            Value::AggregateError(e) => parse_aggregate_error(ctx, identity, e).await,
            Value::Promise(p) => parse_promise(ctx, identity, p).await,
            Value::Error(e) => parse_error(ctx, identity, e).await,
            Value::Iterable(it) => parse_iterable(ctx, identity, it).await,
            Value::Object(o) => parse_object(ctx, identity, o).await,
            Value::ReadableStream(s) => parse_readable_stream(ctx, identity, s).await,
            _ => dispatch_plugin_or_fail(ctx, identity, value),
        }
    })
}

async fn parse_property_pairs(
    ctx: &ParseContext,
    entries: &[(crate::value::PropertyKey, Value)],
) -> Result<(Vec<crate::ir::types::PropertyKeyNode>, Vec<Node>), SerovalError> {
    let mut results: Vec<Option<Node>> = vec![None; entries.len()];
    let mut deferred = Vec::new();
    for (idx, (_, v)) in entries.iter().enumerate() {
        if is_deferred_kind(v) {
            deferred.push(idx);
        } else {
            results[idx] = Some(parse_value(ctx, v).await?);
        }
    }
    for idx in deferred {
        results[idx] = Some(parse_value(ctx, &entries[idx].1).await?);
    }
    let keys = entries.iter().map(|(k, _)| property_key_node(k)).collect();
    let values = results.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok((keys, values))
}

async fn parse_array(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<ArrayData>>) -> Result<Node, SerovalError> {
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
                items.push((idx, parse_value(ctx, v).await?));
            }
        }
    }
    for idx in deferred {
        let v = snapshot[idx].as_ref().expect("deferred index is always populated");
        items.push((idx, parse_value(ctx, v).await?));
    }
    items.sort_by_key(|(idx, _)| *idx);
    Ok(Node::Array { id, length, items, flag })
}

async fn parse_object(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<ObjectData>>) -> Result<Node, SerovalError> {
    let id = ctx.assign_id(identity);
    let (null_prototype, flag, entries) = {
        let b = rc.borrow();
        (b.null_prototype, super::object_flag(b.flags), b.entries.clone())
    };
    let (keys, values) = parse_property_pairs(ctx, &entries).await?;
    let size = keys.len();
    let record = ObjectRecord { keys, values, size };
    if null_prototype {
        Ok(Node::NullConstructor { id, record, flag })
    } else {
        Ok(Node::Object { id, record, flag })
    }
}

async fn parse_iterable(ctx: &ParseContext, identity: usize, it: &Rc<crate::value::IterableData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Symbol, "iterables require Symbol support")?;
    let id = ctx.assign_id(identity);
    let (mut keys, mut values) = parse_property_pairs(ctx, &it.record).await?;
    let drained = Value::array(it.items.clone());
    let array_node = parse_value(ctx, &drained).await?;
    keys.push(crate::ir::types::PropertyKeyNode::SymbolIterator);
    values.push(array_node);
    let size = keys.len();
    Ok(Node::Object {
        id,
        record: ObjectRecord { keys, values, size },
        flag: crate::ir::types::ObjectFlag::None,
    })
}

async fn parse_map(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<MapData>>) -> Result<Node, SerovalError> {
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
            slots[idx] = Some((parse_value(ctx, k).await?, parse_value(ctx, v).await?));
        }
    }
    for idx in deferred {
        let (k, v) = &snapshot[idx];
        slots[idx] = Some((parse_value(ctx, k).await?, parse_value(ctx, v).await?));
    }
    let entries = slots.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok(Node::Map { id, entries, size })
}

async fn parse_set(ctx: &ParseContext, identity: usize, rc: &Rc<RefCell<SetData>>) -> Result<Node, SerovalError> {
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
            slots[idx] = Some(parse_value(ctx, v).await?);
        }
    }
    for idx in deferred {
        slots[idx] = Some(parse_value(ctx, &snapshot[idx]).await?);
    }
    let items = slots.into_iter().map(|o| o.expect("every slot filled")).collect();
    Ok(Node::Set { id, items, size })
}

async fn parse_typed_array(ctx: &ParseContext, identity: usize, t: &Rc<TypedArrayData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::TypedArray, "typed arrays require TypedArray support")?;
    if t.kind.is_bigint() {
        ctx.require_feature(Feature::BigIntTypedArray, "BigInt64Array/BigUint64Array require BigIntTypedArray support")?;
    }
    let id = ctx.assign_id(identity);
    let buffer = Box::new(parse_value(ctx, &t.buffer).await?);
    Ok(if t.kind.is_bigint() {
        Node::BigIntTypedArray { id, kind: t.kind.into(), buffer, byte_offset: t.byte_offset, length: t.length }
    } else {
        Node::TypedArray { id, kind: t.kind.into(), buffer, byte_offset: t.byte_offset, length: t.length }
    })
}

async fn parse_data_view(ctx: &ParseContext, identity: usize, d: &Rc<crate::value::DataViewData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::TypedArray, "DataView requires TypedArray support")?;
    let id = ctx.assign_id(identity);
    let buffer = Box::new(parse_value(ctx, &d.buffer).await?);
    Ok(Node::DataView { id, buffer, byte_offset: d.byte_offset, length: d.length })
}

async fn parse_error_options(
    ctx: &ParseContext,
    cause: &Option<Value>,
    extra: &[(String, Value)],
) -> Result<ErrorOptions, SerovalError> {
    let cause_node = if ctx.features.has(Feature::ErrorPrototypeStack) {
        match cause {
            Some(v) => Some(Box::new(parse_value(ctx, v).await?)),
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
        let (keys, values) = parse_property_pairs(ctx, &entries).await?;
        let size = keys.len();
        Some(ObjectRecord { keys, values, size })
    };
    Ok(ErrorOptions { record, cause: cause_node })
}

async fn parse_aggregate_error(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::AggregateErrorData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::AggregateError, "AggregateError requires AggregateError support")?;
    let id = ctx.assign_id(identity);
    let mut errors = Vec::with_capacity(e.errors.len());
    for err in &e.errors {
        errors.push(parse_value(ctx, err).await?);
    }
    let options = parse_error_options(ctx, &e.cause, &e.extra).await?;
    Ok(Node::AggregateError { id, message: e.message.clone(), errors, options })
}

async fn parse_error(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::ErrorData>) -> Result<Node, SerovalError> {
    let id = ctx.assign_id(identity);
    let options = parse_error_options(ctx, &e.cause, &e.extra).await?;
    Ok(Node::Error { id, class: e.class.into(), message: e.message.clone(), options })
}

async fn parse_promise(ctx: &ParseContext, identity: usize, p: &Rc<crate::value::PromiseData>) -> Result<Node, SerovalError> {
    ctx.require_feature(Feature::Promise, "Promise requires Promise support")?;
    let outcome = p.await_settlement().await;
    let id = ctx.assign_id(identity);
    let (status, inner) = match outcome {
        PromiseOutcome::Resolved(v) => (PromiseStatus::Resolve, v),
        PromiseOutcome::Rejected(v) => (PromiseStatus::Reject, v),
    };
    let value = Box::new(parse_value(ctx, &inner).await?);
    Ok(Node::Promise { id, status, value })
}

async fn parse_blob(ctx: &ParseContext, identity: usize, b: &Rc<crate::value::BlobData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Blob requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let bytes = b.body.resolve().await;
    let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
    let bytes_node = Box::new(parse_value(ctx, &buffer_value).await?);
    Ok(Node::Blob { id, mime_type: b.mime_type.clone(), bytes: bytes_node })
}

async fn parse_file(ctx: &ParseContext, identity: usize, f: &Rc<crate::value::FileData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "File requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let bytes = f.body.resolve().await;
    let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
    let bytes_node = Box::new(parse_value(ctx, &buffer_value).await?);
    Ok(Node::File {
        id,
        name: f.name.clone(),
        mime_type: f.mime_type.clone(),
        last_modified: f.last_modified,
        bytes: bytes_node,
    })
}

async fn parse_form_data(ctx: &ParseContext, identity: usize, f: &Rc<RefCell<FormDataData>>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "FormData requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let snapshot = f.borrow().entries.clone();
    let mut entries = Vec::with_capacity(snapshot.len());
    for (k, entry) in snapshot {
        let node = match entry {
            FormDataEntry::Text(s) => FormDataEntryNode::Text(s),
            FormDataEntry::File(file) => {
                FormDataEntryNode::File(parse_value(ctx, &Value::File(file)).await?)
            }
        };
        entries.push((k, node));
    }
    Ok(Node::FormData { id, entries })
}

async fn parse_request(ctx: &ParseContext, identity: usize, r: &Rc<RequestData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Request requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let body = match &r.body {
        None => None,
        Some(b) => {
            let bytes = b.resolve().await;
            let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
            Some(Box::new(parse_value(ctx, &buffer_value).await?))
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

async fn parse_response(ctx: &ParseContext, identity: usize, r: &Rc<ResponseData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "Response requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let body = match &r.body {
        None => None,
        Some(b) => {
            let bytes = b.resolve().await;
            let buffer_value = Value::ArrayBuffer(Rc::new((*bytes).clone()));
            Some(Box::new(parse_value(ctx, &buffer_value).await?))
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

async fn parse_custom_event(ctx: &ParseContext, identity: usize, e: &Rc<crate::value::CustomEventData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "CustomEvent requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let detail = match &e.detail {
        None => None,
        Some(v) => Some(Box::new(parse_value(ctx, v).await?)),
    };
    Ok(Node::CustomEvent {
        id,
        event_type: e.event_type.clone(),
        detail,
        options: event_options(e.bubbles, e.cancelable, e.composed),
    })
}

/// Drain a stream into a materialized `Array` node. The streaming driver
/// (`stream::`) bypasses this and emits incremental `ReadableStreamEnqueue`/
/// `Close`/`Error` nodes per chunk instead of waiting for the whole stream.
async fn parse_readable_stream(ctx: &ParseContext, identity: usize, s: &Rc<crate::value::ReadableStreamData>) -> Result<Node, SerovalError> {
    require_web_api(ctx, "ReadableStream requires WebApi support")?;
    let id = ctx.assign_id(identity);
    let events = s.drain().await;
    let mut items = Vec::with_capacity(events.len());
    for event in events {
        let node = match event {
            crate::value::StreamEvent::Chunk(v) => parse_value(ctx, &v).await?,
            crate::value::StreamEvent::Error(v) => {
                return Err(SerovalError::unsupported(format!(
                    "ReadableStream errored during drain: {:?}",
                    v
                )))
            }
            crate::value::StreamEvent::Close => continue,
        };
        items.push(node);
    }
    let length = items.len();
    Ok(Node::Array {
        id,
        length,
        items: items.into_iter().enumerate().collect(),
        flag: crate::ir::types::ObjectFlag::None,
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
    use crate::value::PromiseData;

    #[tokio::test]
    async fn awaits_pending_promise_to_settlement() {
        let fut = async { PromiseOutcome::Resolved(Value::number(42.0)) };
        let value = Value::Promise(PromiseData::pending(fut));
        let (node, _) = parse_async(&value, ParseOptions::default()).await.unwrap();
        match node {
            Node::Promise { status, value, .. } => {
                assert!(matches!(status, PromiseStatus::Resolve));
                assert!(matches!(*value, Node::Number { value } if value == 42.0));
            }
            _ => panic!("expected Promise"),
        }
    }

    #[tokio::test]
    async fn drains_blob_body_future() {
        let body = crate::value::AsyncBytes::pending(async { b"Hello World".to_vec() });
        let value = Value::Blob(Rc::new(crate::value::BlobData {
            mime_type: "text/plain".into(),
            body,
        }));
        let (node, _) = parse_async(&value, ParseOptions::default()).await.unwrap();
        match node {
            Node::Blob { mime_type, bytes, .. } => {
                assert_eq!(mime_type, "text/plain");
                assert!(matches!(*bytes, Node::ArrayBuffer { ref bytes, .. } if bytes == b"Hello World"));
            }
            _ => panic!("expected Blob"),
        }
    }

    #[tokio::test]
    async fn drains_readable_stream_into_array() {
        let stream = crate::value::ReadableStreamData::from_events(vec![
            crate::value::StreamEvent::Chunk(Value::number(1.0)),
            crate::value::StreamEvent::Chunk(Value::number(2.0)),
            crate::value::StreamEvent::Close,
        ]);
        let value = Value::ReadableStream(Rc::new(stream));
        let (node, _) = parse_async(&value, ParseOptions::default()).await.unwrap();
        match node {
            Node::Array { length, items, .. } => {
                assert_eq!(length, 2);
                assert_eq!(items.len(), 2);
            }
            _ => panic!("expected Array"),
        }
    }
}

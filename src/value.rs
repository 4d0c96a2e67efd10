//! The in-memory value graph this crate parses.
//!
//! There is no embedded JS host in this crate's dependency stack, so `Value`
//! stands in for "the host runtime's own object graph": an `Rc`/`RefCell`
//! based dynamic value whose non-primitive variants carry reference identity
//! the way two JS references to the same object would. The parser (`parse::`)
//! walks exactly this type; an embedding that targets a real JS engine would
//! walk that engine's native graph with the same dispatch order and id
//! bookkeeping instead of this one.
//!
//! Primitives (`Bool`, `Number`, `String`, `BigInt`, `Undefined`, `Null`,
//! well-known symbols) are *value* types — the parser never assigns them an
//! id or dedups them by identity, matching "each non-primitive value maps to
//! exactly one id" (see SPEC_FULL.md §3 Invariants). Everything else wraps an
//! `Rc<RefCell<_>>` (or a bare `Rc<_>` where the payload is logically
//! immutable) so `Value::ptr_eq` can answer "are these the same object".

use std::cell::RefCell;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;

/// An already-boxed, not-yet-polled future. `Value` is deliberately not
/// `Send` (mirroring a JS value graph, which is single-threaded); the async
/// parser and streaming driver drive these from a `tokio::task::LocalSet`.
pub type LocalBoxFuture<T> = Pin<Box<dyn Future<Output = T>>>;

/// Integrity state, applied after all mutations that affect an object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ObjectFlags {
    #[default]
    None,
    Sealed,
    Frozen,
    NonExtensible,
}

/// A property key: either a plain string, or the sentinel that encodes an
/// iterator-installation directive (`[Symbol.iterator]: ...`).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PropertyKey {
    Named(String),
    SymbolIterator,
}

impl From<&str> for PropertyKey {
    fn from(s: &str) -> Self {
        PropertyKey::Named(s.to_string())
    }
}

#[derive(Debug, Default)]
pub struct ObjectData {
    pub entries: Vec<(PropertyKey, Value)>,
    pub flags: ObjectFlags,
    /// `true` for `Object.create(null)` — a prototype-free object.
    pub null_prototype: bool,
}

#[derive(Debug, Default)]
pub struct ArrayData {
    /// `None` entries are holes; length is `items.len()`.
    pub items: Vec<Option<Value>>,
    pub flags: ObjectFlags,
}

#[derive(Debug, Default)]
pub struct MapData {
    pub entries: Vec<(Value, Value)>,
    pub flags: ObjectFlags,
}

#[derive(Debug, Default)]
pub struct SetData {
    pub items: Vec<Value>,
    pub flags: ObjectFlags,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorClass {
    Error,
    TypeError,
    RangeError,
    SyntaxError,
    ReferenceError,
    EvalError,
    UriError,
}

impl ErrorClass {
    pub const fn constructor_name(self) -> &'static str {
        match self {
            ErrorClass::Error => "Error",
            ErrorClass::TypeError => "TypeError",
            ErrorClass::RangeError => "RangeError",
            ErrorClass::SyntaxError => "SyntaxError",
            ErrorClass::ReferenceError => "ReferenceError",
            ErrorClass::EvalError => "EvalError",
            ErrorClass::UriError => "URIError",
        }
    }
}

#[derive(Debug)]
pub struct ErrorData {
    pub class: ErrorClass,
    pub message: String,
    /// Preserved only when `Feature::ErrorPrototypeStack`-style cause support
    /// is permitted; see SPEC_FULL.md §4.4.3 and §9 (resolves the `c`/`s`
    /// spelling ambiguity in favor of one field, `cause`).
    pub cause: Option<Value>,
    /// Own enumerable properties other than `name`/`message`/`stack`/`cause`.
    pub extra: Vec<(String, Value)>,
}

#[derive(Debug)]
pub struct AggregateErrorData {
    pub message: String,
    pub errors: Vec<Value>,
    pub cause: Option<Value>,
    pub extra: Vec<(String, Value)>,
}

#[derive(Debug, Clone)]
pub enum BoxedPrimitive {
    Bool(bool),
    Number(f64),
    String(String),
    BigInt(String),
    /// A boxed `Symbol`. Not round-trippable on its own — see SPEC_FULL.md
    /// §9, resolved open question on boxed symbols.
    Symbol(String),
}

#[derive(Debug)]
pub struct RegExpData {
    pub source: String,
    pub flags: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypedArrayKind {
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

impl TypedArrayKind {
    pub const fn constructor_name(self) -> &'static str {
        match self {
            TypedArrayKind::Int8Array => "Int8Array",
            TypedArrayKind::Uint8Array => "Uint8Array",
            TypedArrayKind::Uint8ClampedArray => "Uint8ClampedArray",
            TypedArrayKind::Int16Array => "Int16Array",
            TypedArrayKind::Uint16Array => "Uint16Array",
            TypedArrayKind::Int32Array => "Int32Array",
            TypedArrayKind::Uint32Array => "Uint32Array",
            TypedArrayKind::Float32Array => "Float32Array",
            TypedArrayKind::Float64Array => "Float64Array",
            TypedArrayKind::BigInt64Array => "BigInt64Array",
            TypedArrayKind::BigUint64Array => "BigUint64Array",
        }
    }

    pub const fn is_bigint(self) -> bool {
        matches!(
            self,
            TypedArrayKind::BigInt64Array | TypedArrayKind::BigUint64Array
        )
    }
}

#[derive(Debug)]
pub struct TypedArrayData {
    /// Must be a `Value::ArrayBuffer` — shared across sibling views by id.
    pub buffer: Value,
    pub byte_offset: usize,
    pub length: usize,
    pub kind: TypedArrayKind,
}

#[derive(Debug)]
pub struct DataViewData {
    pub buffer: Value,
    pub byte_offset: usize,
    pub length: usize,
}

/// Bytes that may not be available yet — the async parser awaits these for
/// `Blob`/`File`/`Request`/`Response` bodies.
pub struct AsyncBytes(RefCell<AsyncBytesState>);

enum AsyncBytesState {
    Ready(Rc<Vec<u8>>),
    Pending(Option<LocalBoxFuture<Vec<u8>>>),
}

impl AsyncBytes {
    pub fn ready(bytes: Vec<u8>) -> Self {
        AsyncBytes(RefCell::new(AsyncBytesState::Ready(Rc::new(bytes))))
    }

    pub fn pending(fut: impl Future<Output = Vec<u8>> + 'static) -> Self {
        AsyncBytes(RefCell::new(AsyncBytesState::Pending(Some(Box::pin(fut)))))
    }

    /// `Some(bytes)` if already settled, without awaiting — used by the sync
    /// parser, which rejects anything still pending.
    pub fn ready_bytes(&self) -> Option<Rc<Vec<u8>>> {
        match &*self.0.borrow() {
            AsyncBytesState::Ready(b) => Some(b.clone()),
            AsyncBytesState::Pending(_) => None,
        }
    }

    /// Await settlement, caching the result so a second alias to the same
    /// body doesn't re-poll an already-consumed future.
    pub async fn resolve(&self) -> Rc<Vec<u8>> {
        let fut = {
            let mut state = self.0.borrow_mut();
            match &mut *state {
                AsyncBytesState::Ready(b) => return b.clone(),
                AsyncBytesState::Pending(f) => f.take(),
            }
        };
        let bytes = Rc::new(
            fut.expect("AsyncBytes polled after completion or concurrently")
                .await,
        );
        *self.0.borrow_mut() = AsyncBytesState::Ready(bytes.clone());
        bytes
    }
}

impl std::fmt::Debug for AsyncBytes {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.0.borrow() {
            AsyncBytesState::Ready(b) => write!(f, "AsyncBytes::Ready({} bytes)", b.len()),
            AsyncBytesState::Pending(_) => write!(f, "AsyncBytes::Pending"),
        }
    }
}

/// Settlement outcome of a `Promise`.
#[derive(Debug, Clone)]
pub enum PromiseOutcome {
    Resolved(Value),
    Rejected(Value),
}

pub struct PromiseData {
    state: RefCell<PromiseState>,
}

enum PromiseState {
    Pending(Option<LocalBoxFuture<PromiseOutcome>>),
    Settled(PromiseOutcome),
}

impl PromiseData {
    pub fn resolved(value: Value) -> Rc<Self> {
        Rc::new(PromiseData {
            state: RefCell::new(PromiseState::Settled(PromiseOutcome::Resolved(value))),
        })
    }

    pub fn rejected(value: Value) -> Rc<Self> {
        Rc::new(PromiseData {
            state: RefCell::new(PromiseState::Settled(PromiseOutcome::Rejected(value))),
        })
    }

    pub fn pending(fut: impl Future<Output = PromiseOutcome> + 'static) -> Rc<Self> {
        Rc::new(PromiseData {
            state: RefCell::new(PromiseState::Pending(Some(Box::pin(fut)))),
        })
    }

    /// `Some(outcome)` without awaiting — the sync parser rejects a still-
    /// pending promise with `FeatureDisabled`/`UnsupportedType` per §2.
    pub fn settled(&self) -> Option<PromiseOutcome> {
        match &*self.state.borrow() {
            PromiseState::Settled(outcome) => Some(outcome.clone()),
            PromiseState::Pending(_) => None,
        }
    }

    pub async fn await_settlement(&self) -> PromiseOutcome {
        let fut = {
            let mut state = self.state.borrow_mut();
            match &mut *state {
                PromiseState::Settled(outcome) => return outcome.clone(),
                PromiseState::Pending(f) => f.take(),
            }
        };
        let outcome = fut
            .expect("promise polled after completion or concurrently")
            .await;
        *self.state.borrow_mut() = PromiseState::Settled(outcome.clone());
        outcome
    }
}

impl std::fmt::Debug for PromiseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match &*self.state.borrow() {
            PromiseState::Settled(PromiseOutcome::Resolved(_)) => write!(f, "Promise(resolved)"),
            PromiseState::Settled(PromiseOutcome::Rejected(_)) => write!(f, "Promise(rejected)"),
            PromiseState::Pending(_) => write!(f, "Promise(pending)"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WellKnownSymbol {
    Iterator,
    AsyncIterator,
    HasInstance,
    IsConcatSpreadable,
    Species,
    ToPrimitive,
    ToStringTag,
    Unscopables,
}

impl WellKnownSymbol {
    pub const fn expression(self) -> &'static str {
        match self {
            WellKnownSymbol::Iterator => "Symbol.iterator",
            WellKnownSymbol::AsyncIterator => "Symbol.asyncIterator",
            WellKnownSymbol::HasInstance => "Symbol.hasInstance",
            WellKnownSymbol::IsConcatSpreadable => "Symbol.isConcatSpreadable",
            WellKnownSymbol::Species => "Symbol.species",
            WellKnownSymbol::ToPrimitive => "Symbol.toPrimitive",
            WellKnownSymbol::ToStringTag => "Symbol.toStringTag",
            WellKnownSymbol::Unscopables => "Symbol.unscopables",
        }
    }
}

/// A generic iterable object (dispatch rule 7, §4.4): any non-recognized
/// object that presents the iterator protocol. `items` is the drained
/// sequence; `record` is the object's own properties (usually empty for a
/// bare iterable, non-empty for an object that is *also* iterable).
#[derive(Debug, Default)]
pub struct IterableData {
    pub record: Vec<(PropertyKey, Value)>,
    pub items: Vec<Value>,
}

#[derive(Debug)]
pub struct UrlData {
    pub href: String,
}

#[derive(Debug, Default)]
pub struct UrlSearchParamsData {
    pub pairs: Vec<(String, String)>,
}

pub struct BlobData {
    pub mime_type: String,
    pub body: AsyncBytes,
}

impl std::fmt::Debug for BlobData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlobData")
            .field("mime_type", &self.mime_type)
            .field("body", &self.body)
            .finish()
    }
}

pub struct FileData {
    pub name: String,
    pub mime_type: String,
    pub last_modified: f64,
    pub body: AsyncBytes,
}

impl std::fmt::Debug for FileData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileData")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("last_modified", &self.last_modified)
            .field("body", &self.body)
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct HeadersData {
    pub pairs: Vec<(String, String)>,
}

#[derive(Debug, Clone)]
pub enum FormDataEntry {
    Text(String),
    File(Rc<FileData>),
}

#[derive(Debug, Default)]
pub struct FormDataData {
    pub entries: Vec<(String, FormDataEntry)>,
}

pub struct RequestData {
    pub url: String,
    pub method: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<AsyncBytes>,
}

impl std::fmt::Debug for RequestData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RequestData")
            .field("url", &self.url)
            .field("method", &self.method)
            .finish()
    }
}

pub struct ResponseData {
    pub status: u16,
    pub status_text: String,
    pub headers: Vec<(String, String)>,
    pub body: Option<AsyncBytes>,
}

impl std::fmt::Debug for ResponseData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResponseData")
            .field("status", &self.status)
            .finish()
    }
}

#[derive(Debug)]
pub struct EventData {
    pub event_type: String,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

#[derive(Debug)]
pub struct CustomEventData {
    pub event_type: String,
    pub detail: Option<Value>,
    pub bubbles: bool,
    pub cancelable: bool,
    pub composed: bool,
}

#[derive(Debug)]
pub struct DomExceptionData {
    pub message: String,
    pub name: String,
}

/// One event in a readable stream's lifecycle.
#[derive(Debug, Clone)]
pub enum StreamEvent {
    Chunk(Value),
    Error(Value),
    Close,
}

enum StreamStep {
    Ready(StreamEvent),
    Pending(LocalBoxFuture<StreamEvent>),
}

/// A readable stream: a queue of chunks terminated by `Close`/`Error`,
/// possibly not all produced yet.
pub struct ReadableStreamData {
    queue: RefCell<VecDeque<StreamStep>>,
}

impl std::fmt::Debug for ReadableStreamData {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "ReadableStreamData({} queued)", self.queue.borrow().len())
    }
}

impl ReadableStreamData {
    pub fn from_events(events: Vec<StreamEvent>) -> Self {
        ReadableStreamData {
            queue: RefCell::new(events.into_iter().map(StreamStep::Ready).collect()),
        }
    }

    pub fn push_pending(&self, fut: impl Future<Output = StreamEvent> + 'static) {
        self.queue
            .borrow_mut()
            .push_back(StreamStep::Pending(Box::pin(fut)));
    }

    /// Drain the whole stream, awaiting pending steps in order, stopping at
    /// `Close`/`Error`. Used when a stream reaches a non-streaming consumer
    /// and must be materialized into a plain `Array` (§4.4.2).
    pub async fn drain(&self) -> Vec<StreamEvent> {
        let mut out = Vec::new();
        loop {
            let step = self.queue.borrow_mut().pop_front();
            let event = match step {
                None => break,
                Some(StreamStep::Ready(e)) => e,
                Some(StreamStep::Pending(f)) => f.await,
            };
            let terminal = matches!(event, StreamEvent::Close | StreamEvent::Error(_));
            out.push(event);
            if terminal {
                break;
            }
        }
        out
    }
}

/// Opaque payload produced by a plugin's `parse` hook, round-tripped through
/// the IR without this crate needing to understand its shape.
pub trait PluginValue: std::fmt::Debug {
    fn tag(&self) -> &str;
}

/// The dynamic value this crate's parser walks. See the module doc comment.
#[derive(Debug, Clone)]
pub enum Value {
    Undefined,
    Null,
    Bool(bool),
    Number(f64),
    String(Rc<str>),
    /// Decimal-string payload — arbitrary precision is modeled as text, not
    /// a fixed-width integer, matching the source's BigInt.
    BigInt(Rc<str>),
    WellKnownSymbol(WellKnownSymbol),

    Object(Rc<RefCell<ObjectData>>),
    Array(Rc<RefCell<ArrayData>>),
    Date(Rc<f64>),
    RegExp(Rc<RegExpData>),
    Error(Rc<ErrorData>),
    AggregateError(Rc<AggregateErrorData>),
    Boxed(Rc<BoxedPrimitive>),
    Map(Rc<RefCell<MapData>>),
    Set(Rc<RefCell<SetData>>),
    ArrayBuffer(Rc<Vec<u8>>),
    TypedArray(Rc<TypedArrayData>),
    DataView(Rc<DataViewData>),
    Promise(Rc<PromiseData>),
    Iterable(Rc<IterableData>),

    Url(Rc<UrlData>),
    UrlSearchParams(Rc<RefCell<UrlSearchParamsData>>),
    Blob(Rc<BlobData>),
    File(Rc<FileData>),
    Headers(Rc<RefCell<HeadersData>>),
    FormData(Rc<RefCell<FormDataData>>),
    Request(Rc<RequestData>),
    Response(Rc<ResponseData>),
    Event(Rc<EventData>),
    CustomEvent(Rc<CustomEventData>),
    DomException(Rc<DomExceptionData>),
    ReadableStream(Rc<ReadableStreamData>),

    Plugin(Rc<dyn PluginValue>),
}

impl Value {
    pub fn string(s: impl Into<String>) -> Self {
        Value::String(Rc::from(s.into()))
    }

    pub fn number(n: f64) -> Self {
        Value::Number(n)
    }

    pub fn object(entries: Vec<(PropertyKey, Value)>) -> Self {
        Value::Object(Rc::new(RefCell::new(ObjectData {
            entries,
            flags: ObjectFlags::None,
            null_prototype: false,
        })))
    }

    pub fn array(items: Vec<Value>) -> Self {
        Value::Array(Rc::new(RefCell::new(ArrayData {
            items: items.into_iter().map(Some).collect(),
            flags: ObjectFlags::None,
        })))
    }

    pub fn set(items: Vec<Value>) -> Self {
        Value::Set(Rc::new(RefCell::new(SetData {
            items,
            flags: ObjectFlags::None,
        })))
    }

    pub fn map(entries: Vec<(Value, Value)>) -> Self {
        Value::Map(Rc::new(RefCell::new(MapData {
            entries,
            flags: ObjectFlags::None,
        })))
    }

    pub fn promise_resolve(value: Value) -> Self {
        Value::Promise(PromiseData::resolved(value))
    }

    pub fn promise_reject(value: Value) -> Self {
        Value::Promise(PromiseData::rejected(value))
    }

    /// Whether `self` is a primitive value type: not id-tracked, never
    /// deduplicated by identity.
    pub fn is_primitive(&self) -> bool {
        matches!(
            self,
            Value::Undefined
                | Value::Null
                | Value::Bool(_)
                | Value::Number(_)
                | Value::String(_)
                | Value::BigInt(_)
                | Value::WellKnownSymbol(_)
        )
    }

    /// A stable per-allocation identity for non-primitive variants, used by
    /// the parser's id-assignment map and by `ReferenceRegistry`. Primitive
    /// variants have no reference identity; callers must not rely on this
    /// for them (it collapses to a fixed, non-unique sentinel).
    pub fn identity(&self) -> usize {
        match self {
            Value::Object(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Array(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Date(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::RegExp(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Error(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::AggregateError(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Boxed(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Map(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Set(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::ArrayBuffer(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::TypedArray(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::DataView(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Promise(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Iterable(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Url(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::UrlSearchParams(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Blob(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::File(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Headers(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::FormData(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Request(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Response(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Event(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::CustomEvent(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::DomException(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::ReadableStream(rc) => Rc::as_ptr(rc) as *const () as usize,
            Value::Plugin(rc) => Rc::as_ptr(rc) as *const () as *const u8 as usize,
            Value::Undefined => 0,
            Value::Null => 1,
            Value::Bool(_) => 2,
            Value::Number(_) => 3,
            Value::String(_) => 4,
            Value::BigInt(_) => 5,
            Value::WellKnownSymbol(_) => 6,
        }
    }

    /// Reference-identity comparison — two `Value` handles denote the same
    /// underlying allocation. For primitives this is unreliable by design
    /// (see `identity`); use `==`-style structural comparison for those.
    pub fn ptr_eq(&self, other: &Value) -> bool {
        !self.is_primitive() && !other.is_primitive() && self.identity() == other.identity()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ptr_eq_true_for_same_object() {
        let obj = Value::object(vec![]);
        let alias = obj.clone();
        assert!(obj.ptr_eq(&alias));
    }

    #[test]
    fn ptr_eq_false_for_distinct_objects() {
        assert!(!Value::object(vec![]).ptr_eq(&Value::object(vec![])));
    }

    #[test]
    fn primitives_are_never_ptr_eq() {
        assert!(!Value::number(1.0).ptr_eq(&Value::number(1.0)));
    }

    #[test]
    fn is_primitive_classifies_correctly() {
        assert!(Value::Undefined.is_primitive());
        assert!(Value::string("x").is_primitive());
        assert!(!Value::array(vec![]).is_primitive());
        assert!(!Value::object(vec![]).is_primitive());
    }

    #[test]
    fn cyclic_self_reference_via_rc_refcell() {
        let obj = Value::object(vec![]);
        if let Value::Object(rc) = &obj {
            rc.borrow_mut()
                .entries
                .push((PropertyKey::Named("self".into()), obj.clone()));
        }
        if let Value::Object(rc) = &obj {
            let borrowed = rc.borrow();
            let (_, self_ref) = &borrowed.entries[0];
            assert!(self_ref.ptr_eq(&obj));
        }
    }
}

//! Streaming driver (§4.8): drives one or more cross-referenced
//! serializations against a shared `$R` table, handing each produced chunk
//! to a caller-supplied sink as it becomes available.
//!
//! Grounded in the reference registry's `Arc<RwLock<_>>` append-mostly
//! pattern (§4.2) for the shared bookkeeping, and in `gauss-engine`'s
//! `Engine`/`ProcessorSlot` bookkeeping (tracking how many spawned workers
//! are still live so shutdown fires exactly once) for the
//! fires-exactly-once `pending`/`flushed`/`done` shape — `Inner`'s counters
//! are plain `std::sync::atomic` rather than `tokio::sync::watch`, since
//! `Value` is `Rc`/`RefCell` based and not `Send`: unlike that driver this
//! one never spawns work onto the runtime itself. `write` is a plain
//! `async fn` the caller drives to completion (possibly several at once via
//! their own `join_all`), and the atomics exist purely for completion
//! bookkeeping, not for cross-thread handoff.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use crate::error::SerovalError;
use crate::feature::FeatureSet;
use crate::parse::r#async::parse_async;
use crate::parse::ParseOptions;
use crate::plugin::Plugin;
use crate::serialize::{cross_serialize, CrossContext, SerializeConfig};
use crate::value::Value;

/// Caller-supplied callbacks and config for one streaming session.
pub struct StreamOptions {
    pub scope: Option<String>,
    pub features: FeatureSet,
    pub plugins: Vec<Arc<dyn Plugin>>,
    pub on_serialize: Arc<dyn Fn(&str, &str) + Send + Sync>,
    pub on_done: Arc<dyn Fn() + Send + Sync>,
    pub on_error: Arc<dyn Fn(&str, SerovalError) + Send + Sync>,
}

impl Default for StreamOptions {
    fn default() -> Self {
        StreamOptions {
            scope: None,
            features: FeatureSet::default(),
            plugins: Vec::new(),
            on_serialize: Arc::new(|_, _| {}),
            on_done: Arc::new(|| {}),
            on_error: Arc::new(|_, _| {}),
        }
    }
}

struct Inner {
    alive: AtomicBool,
    flushed: AtomicBool,
    done: AtomicBool,
    pending: AtomicUsize,
    next_id: AtomicU32,
    keys: Mutex<HashSet<String>>,
    cancelled: Mutex<HashSet<String>>,
    options: StreamOptions,
}

/// A live streaming session. `write` may be called any number of times
/// before `flush`; `close` is the sole cancellation primitive and may be
/// called at any point.
pub struct StreamHandle {
    inner: Arc<Inner>,
}

impl StreamHandle {
    pub fn new(options: StreamOptions) -> Self {
        StreamHandle {
            inner: Arc::new(Inner {
                alive: AtomicBool::new(true),
                flushed: AtomicBool::new(false),
                done: AtomicBool::new(false),
                pending: AtomicUsize::new(0),
                next_id: AtomicU32::new(0),
                keys: Mutex::new(HashSet::new()),
                cancelled: Mutex::new(HashSet::new()),
                options,
            }),
        }
    }

    /// Parses `value` to completion (awaiting any pending promise/stream
    /// settlement) and serializes it against the shared `$R` table under
    /// `key`, assigning the first chunk to `<global>["<key>"]=<chunk>` and
    /// emitting the raw expression for it. One root's chunks are never
    /// reordered relative to themselves, though unrelated roots' `write`
    /// calls may interleave if the caller drives them concurrently.
    pub async fn write(&self, key: impl Into<String>, value: &Value) -> Result<(), SerovalError> {
        let key = key.into();
        {
            let mut keys = self.inner.keys.lock().unwrap();
            if !keys.insert(key.clone()) {
                return Err(SerovalError::invariant(format!(
                    "root key '{key}' is already in use on this stream"
                )));
            }
        }
        self.inner.pending.fetch_add(1, Ordering::SeqCst);
        let root_id = self.inner.next_id.fetch_add(1, Ordering::SeqCst);
        tracing::debug!(root_id, key = %key, "streaming root started");

        let options = ParseOptions {
            features: self.inner.options.features,
            plugins: self.inner.options.plugins.clone(),
            ..ParseOptions::default()
        };
        let result = parse_async(value, options).await;

        if self.is_cancelled(&key) {
            self.finish_one();
            return Ok(());
        }

        match result {
            Ok((node, _ctx)) => {
                let scope_ctx = match &self.inner.options.scope {
                    Some(s) => CrossContext::scoped(s.clone()),
                    None => CrossContext::global(),
                };
                let config = SerializeConfig {
                    features: self.inner.options.features,
                    plugins: self.inner.options.plugins.clone(),
                };
                match cross_serialize(&node, &scope_ctx, &config) {
                    Ok(expr) => {
                        let chunk = format!("globalThis[{}]={expr}", crate::string_encoder::quote(&key));
                        (self.inner.options.on_serialize)(&key, &chunk);
                    }
                    Err(err) => (self.inner.options.on_error)(&key, err),
                }
            }
            Err(err) => (self.inner.options.on_error)(&key, err),
        }

        self.finish_one();
        Ok(())
    }

    fn finish_one(&self) {
        let remaining = self.inner.pending.fetch_sub(1, Ordering::SeqCst) - 1;
        if remaining == 0 && self.inner.flushed.load(Ordering::SeqCst) {
            self.fire_done();
        }
    }

    fn fire_done(&self) {
        if self.inner.alive.load(Ordering::SeqCst)
            && self
                .inner
                .done
                .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
                .is_ok()
        {
            (self.inner.options.on_done)();
        }
    }

    fn is_cancelled(&self, key: &str) -> bool {
        !self.inner.alive.load(Ordering::SeqCst) || self.inner.cancelled.lock().unwrap().contains(key)
    }

    /// Declares no more roots will be added; once every in-flight `write`
    /// has finished, `on_done` fires (immediately, if none are pending).
    pub fn flush(&self) {
        self.inner.flushed.store(true, Ordering::SeqCst);
        if self.inner.pending.load(Ordering::SeqCst) == 0 {
            self.fire_done();
        }
    }

    /// Cancels every in-flight root: already-emitted chunks stand, but no
    /// further callbacks fire for this session. Idempotent.
    pub fn close(&self) {
        if !self.inner.alive.swap(false, Ordering::SeqCst) {
            return;
        }
        let keys: Vec<String> = self.inner.keys.lock().unwrap().iter().cloned().collect();
        self.inner.cancelled.lock().unwrap().extend(keys);
        self.fire_done();
    }

}

/// Starts a streaming cross-serialization session rooted at nothing in
/// particular — roots are added afterward via [`StreamHandle::write`].
pub fn cross_serialize_stream(options: StreamOptions) -> StreamHandle {
    StreamHandle::new(options)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize as StdAtomicUsize;

    #[tokio::test]
    async fn write_emits_one_chunk_then_flush_fires_done() {
        let chunks = Arc::new(Mutex::new(Vec::new()));
        let chunks_clone = chunks.clone();
        let done_count = Arc::new(StdAtomicUsize::new(0));
        let done_clone = done_count.clone();

        let options = StreamOptions {
            on_serialize: Arc::new(move |_key, chunk| chunks_clone.lock().unwrap().push(chunk.to_string())),
            on_done: Arc::new(move || {
                done_clone.fetch_add(1, Ordering::SeqCst);
            }),
            ..StreamOptions::default()
        };
        let stream = cross_serialize_stream(options);
        stream.write("root", &Value::number(1.0)).await.unwrap();
        stream.flush();

        assert_eq!(chunks.lock().unwrap().len(), 1);
        assert!(chunks.lock().unwrap()[0].contains("globalThis[\"root\"]="));
        assert_eq!(done_count.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn duplicate_key_is_rejected() {
        let stream = cross_serialize_stream(StreamOptions::default());
        stream.write("root", &Value::number(1.0)).await.unwrap();
        let second = stream.write("root", &Value::number(2.0)).await;
        assert!(second.is_err());
    }

    #[tokio::test]
    async fn close_is_idempotent_and_suppresses_done() {
        let done_count = Arc::new(StdAtomicUsize::new(0));
        let done_clone = done_count.clone();
        let options = StreamOptions {
            on_done: Arc::new(move || {
                done_clone.fetch_add(1, Ordering::SeqCst);
            }),
            ..StreamOptions::default()
        };
        let stream = cross_serialize_stream(options);
        stream.close();
        stream.close();
        assert_eq!(done_count.load(Ordering::SeqCst), 1);
    }
}

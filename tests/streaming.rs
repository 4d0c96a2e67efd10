//! Integration tests for §8 property 6 (streaming ordering) and the
//! streaming driver's `flush`/`close` lifecycle (§4.8).

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use valuegraph_seroval::ops::{self, SerovalOptions};
use valuegraph_seroval::stream::{StreamOptions, cross_serialize_stream};
use valuegraph_seroval::value::Value;

#[tokio::test]
async fn two_roots_each_emit_one_chunk_before_done_fires_once() {
    let chunks = Arc::new(Mutex::new(Vec::new()));
    let chunks_clone = chunks.clone();
    let done_count = Arc::new(AtomicUsize::new(0));
    let done_clone = done_count.clone();

    let options = StreamOptions {
        on_serialize: Arc::new(move |key, chunk| {
            chunks_clone.lock().unwrap().push((key.to_string(), chunk.to_string()))
        }),
        on_done: Arc::new(move || {
            done_clone.fetch_add(1, Ordering::SeqCst);
        }),
        ..StreamOptions::default()
    };
    let stream = cross_serialize_stream(options);

    stream.write("first", &Value::number(1.0)).await.unwrap();
    stream.write("second", &Value::string("two")).await.unwrap();
    stream.flush();

    let chunks = chunks.lock().unwrap();
    assert_eq!(chunks.len(), 2);
    assert!(chunks.iter().any(|(k, v)| k == "first" && v.contains("globalThis[\"first\"]=")));
    assert!(chunks.iter().any(|(k, v)| k == "second" && v.contains("globalThis[\"second\"]=")));
    assert_eq!(done_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn close_before_flush_suppresses_done_from_firing_twice() {
    let done_count = Arc::new(AtomicUsize::new(0));
    let done_clone = done_count.clone();
    let options = StreamOptions {
        on_done: Arc::new(move || {
            done_clone.fetch_add(1, Ordering::SeqCst);
        }),
        ..StreamOptions::default()
    };
    let stream = cross_serialize_stream(options);
    stream.write("root", &Value::number(1.0)).await.unwrap();
    stream.close();
    stream.flush();
    assert_eq!(done_count.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn cross_serialize_scoped_binds_into_the_named_scope_table() {
    let options = SerovalOptions::default();
    let value = Value::object(vec![]);
    let text = ops::cross_serialize(&value, Some("widget"), &options).unwrap();
    assert!(text.starts_with("$R[\"widget\"]"));
}

//! Integration tests for the §8 testable properties: round-trip identity,
//! cycle preservation, hole preservation, and the literal concrete
//! scenarios. Drives the public `ops` API end-to-end rather than any one
//! module in isolation.

use valuegraph_seroval::ops::{self, SerovalOptions};
use valuegraph_seroval::value::{PropertyKey, Value};

fn round_trip(value: &Value) -> Value {
    let options = SerovalOptions::default();
    let ir = ops::to_json(value, &options).expect("to_json should succeed");
    ops::from_json(ir, &options).expect("from_json should succeed")
}

#[test]
fn plain_object_round_trips_its_shape() {
    let value = Value::object(vec![("a".into(), Value::number(1.0))]);
    let reconstructed = round_trip(&value);
    match reconstructed {
        Value::Object(rc) => {
            let data = rc.borrow();
            assert_eq!(data.entries.len(), 1);
            assert_eq!(data.entries[0].0, PropertyKey::Named("a".into()));
            assert!(matches!(data.entries[0].1, Value::Number(n) if n == 1.0));
        }
        other => panic!("expected Object, got {other:?}"),
    }
}

#[test]
fn self_referential_object_preserves_identity_after_round_trip() {
    let obj = Value::object(vec![]);
    if let Value::Object(rc) = &obj {
        rc.borrow_mut()
            .entries
            .push((PropertyKey::Named("self".into()), obj.clone()));
    }

    let reconstructed = round_trip(&obj);
    match &reconstructed {
        Value::Object(rc) => {
            let data = rc.borrow();
            let (_, self_ref) = &data.entries[0];
            assert!(self_ref.ptr_eq(&reconstructed), "self reference must point back at the same object");
        }
        other => panic!("expected Object, got {other:?}"),
    }
}

#[test]
fn array_holes_preserve_length_and_hole_positions() {
    let array = Value::Array(std::rc::Rc::new(std::cell::RefCell::new(
        valuegraph_seroval::value::ArrayData {
            items: vec![Some(Value::number(1.0)), None, Some(Value::number(3.0))],
            flags: valuegraph_seroval::value::ObjectFlags::None,
        },
    )));

    let reconstructed = round_trip(&array);
    match reconstructed {
        Value::Array(rc) => {
            let data = rc.borrow();
            assert_eq!(data.items.len(), 3);
            assert!(data.items[0].is_some());
            assert!(data.items[1].is_none());
            assert!(data.items[2].is_some());
        }
        other => panic!("expected Array, got {other:?}"),
    }
}

#[test]
fn map_with_itself_as_key_and_value_round_trips_to_size_one_self_map() {
    let map = Value::Map(std::rc::Rc::new(std::cell::RefCell::new(
        valuegraph_seroval::value::MapData {
            entries: vec![],
            flags: valuegraph_seroval::value::ObjectFlags::None,
        },
    )));
    if let Value::Map(rc) = &map {
        rc.borrow_mut().entries.push((map.clone(), map.clone()));
    }

    let reconstructed = round_trip(&map);
    match &reconstructed {
        Value::Map(rc) => {
            let data = rc.borrow();
            assert_eq!(data.entries.len(), 1);
            let (k, v) = &data.entries[0];
            assert!(k.ptr_eq(&reconstructed));
            assert!(v.ptr_eq(&reconstructed));
        }
        other => panic!("expected Map, got {other:?}"),
    }
}

#[test]
fn set_preserves_insertion_order() {
    let set = Value::set(vec![Value::number(1.0), Value::number(2.0)]);
    let reconstructed = round_trip(&set);
    match reconstructed {
        Value::Set(rc) => {
            let data = rc.borrow();
            assert_eq!(data.items.len(), 2);
            assert!(matches!(data.items[0], Value::Number(n) if n == 1.0));
            assert!(matches!(data.items[1], Value::Number(n) if n == 2.0));
        }
        other => panic!("expected Set, got {other:?}"),
    }
}

#[test]
fn infinity_serializes_to_division_literal() {
    let options = SerovalOptions::default();
    let text = ops::serialize(&Value::number(f64::INFINITY), &options).unwrap();
    assert_eq!(text, "1/0");
}

#[test]
fn plain_object_serializes_to_parenthesized_literal() {
    let options = SerovalOptions::default();
    let value = Value::object(vec![("a".into(), Value::number(1.0))]);
    let text = ops::serialize(&value, &options).unwrap();
    assert_eq!(text, "({a:1})");
}

#[tokio::test]
async fn resolved_promise_serializes_and_reconstructs_its_payload() {
    let options = SerovalOptions::default();
    let value = Value::promise_resolve(Value::number(42.0));
    let text = ops::serialize_async(&value, &options).await.unwrap();
    assert!(text.contains("Promise.resolve(42)"));

    let ir = ops::to_json_async(&value, &options).await.unwrap();
    let reconstructed = ops::from_json(ir, &options).unwrap();
    match reconstructed {
        Value::Promise(data) => {
            let outcome = data.settled().expect("already-resolved promise");
            match outcome {
                valuegraph_seroval::value::PromiseOutcome::Resolved(v) => {
                    assert!(matches!(v, Value::Number(n) if n == 42.0));
                }
                valuegraph_seroval::value::PromiseOutcome::Rejected(_) => {
                    panic!("expected resolved outcome")
                }
            }
        }
        other => panic!("expected Promise, got {other:?}"),
    }
}

//! Integration tests for §8 property 5 (feature compat): disabling a
//! feature must remove the corresponding idiom from the emitted text, not
//! just skip an assertion about it being present.

use std::cell::RefCell;
use std::rc::Rc;

use valuegraph_seroval::feature::{Feature, FeatureSet};
use valuegraph_seroval::ops::{self, SerovalOptions};
use valuegraph_seroval::value::{ObjectData, ObjectFlags, Value};

fn null_proto_object(entries: Vec<(&str, Value)>) -> Value {
    Value::Object(Rc::new(RefCell::new(ObjectData {
        entries: entries
            .into_iter()
            .map(|(k, v)| (valuegraph_seroval::value::PropertyKey::Named(k.to_string()), v))
            .collect(),
        flags: ObjectFlags::None,
        null_prototype: true,
    })))
}

#[test]
fn object_assign_disabled_removes_the_idiom_from_null_proto_emission() {
    let value = null_proto_object(vec![("a", Value::number(1.0))]);

    let enabled = SerovalOptions::default();
    let with_assign = ops::serialize(&value, &enabled).unwrap();
    assert!(with_assign.contains("Object.assign"));

    let disabled = SerovalOptions {
        disabled_features: FeatureSet::from(Feature::ObjectAssign),
        ..SerovalOptions::default()
    };
    let without_assign = ops::serialize(&value, &disabled).unwrap();
    assert!(!without_assign.contains("Object.assign"));
    assert!(without_assign.contains("Object.create(null)"));
}

#[test]
fn arrow_function_disabled_removes_arrows_from_cyclic_promise_emission() {
    // The array is the root and gets id 0 (pushed onto the stack first); its
    // lone item is a promise resolving back to the array itself, so the
    // promise's value slot is an `IndexedValue` whose id is on the stack —
    // the deferred `.then(...)` arrow form, the one place a bare Promise
    // touches Feature::ArrowFunction.
    let array = Value::array(vec![Value::Undefined]);
    let promise = Value::promise_resolve(array.clone());
    if let Value::Array(rc) = &array {
        rc.borrow_mut().items[0] = Some(promise);
    }

    let enabled = SerovalOptions::default();
    let with_arrow = ops::serialize(&array, &enabled).unwrap();
    assert!(with_arrow.contains("=>"));

    let disabled = SerovalOptions {
        disabled_features: FeatureSet::from(Feature::ArrowFunction),
        ..SerovalOptions::default()
    };
    let without_arrow = ops::serialize(&array, &disabled).unwrap();
    assert!(!without_arrow.contains("=>"));
    assert!(without_arrow.contains("function()"));
}

#[test]
fn array_prototype_values_disabled_removes_dot_values_from_iterable_key() {
    let iterable = Rc::new(valuegraph_seroval::value::IterableData {
        record: vec![],
        items: vec![Value::number(1.0)],
    });
    let value = Value::Iterable(iterable);

    let enabled = SerovalOptions::default();
    let with_values = ops::serialize(&value, &enabled).unwrap();
    assert!(with_values.contains(".values()"));

    let disabled = SerovalOptions {
        disabled_features: FeatureSet::from(Feature::ArrayPrototypeValues),
        ..SerovalOptions::default()
    };
    let without_values = ops::serialize(&value, &disabled).unwrap();
    assert!(!without_values.contains(".values()"));
}

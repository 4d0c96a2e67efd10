//! Self-contained mode: every marked id gets a short local name, and the
//! emitted expression is wrapped in an IIFE that declares them as
//! parameters, per the "no ambient runtime support" target (§4.6) — the
//! output is a single expression that can be dropped into any JS context
//! without a shared `$R` table already present.

use std::cell::RefCell;
use std::collections::HashMap;

use crate::error::SerovalError;
use crate::ir::types::{Node, RefId};

use super::base::{collect_marks, Emitter, SerializeConfig};
use super::Binder;

const FIRST_DIGIT_ALPHABET: &[u8] = b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ_$";
const DIGIT_ALPHABET: &[u8] =
    b"abcdefghijklmnopqrstuvwxyzABCDEFGHIJKLMNOPQRSTUVWXYZ0123456789_$";

/// Encodes an ordinal (0-based position among marked ids, not the `RefId`
/// itself) as a short bijective-base identifier: `a`, `b`, … `$`, `aa`, `ab`, …
fn short_name(mut ordinal: usize) -> String {
    let first = FIRST_DIGIT_ALPHABET.len();
    let rest = DIGIT_ALPHABET.len();
    let mut digits = Vec::new();
    digits.push(FIRST_DIGIT_ALPHABET[ordinal % first]);
    ordinal /= first;
    while ordinal > 0 {
        ordinal -= 1;
        digits.push(DIGIT_ALPHABET[ordinal % rest]);
        ordinal /= rest;
    }
    digits.reverse();
    String::from_utf8(digits).expect("alphabet is ASCII")
}

/// Hands out a short bijective-base name to each `RefId` it sees, in
/// first-ask order. Shared mutable state lives behind a `RefCell` because
/// `Binder::name` takes `&self` — the emitter itself is the only caller and
/// drives names out in a single-threaded recursive walk.
pub struct SelfContainedBinder {
    assigned: RefCell<HashMap<RefId, String>>,
    next_ordinal: RefCell<usize>,
}

impl SelfContainedBinder {
    pub fn new() -> Self {
        SelfContainedBinder {
            assigned: RefCell::new(HashMap::new()),
            next_ordinal: RefCell::new(0),
        }
    }

}

impl Default for SelfContainedBinder {
    fn default() -> Self {
        Self::new()
    }
}

impl Binder for SelfContainedBinder {
    fn name(&self, id: RefId) -> String {
        if let Some(existing) = self.assigned.borrow().get(&id) {
            return existing.clone();
        }
        let mut next = self.next_ordinal.borrow_mut();
        let name = short_name(*next);
        *next += 1;
        self.assigned.borrow_mut().insert(id, name.clone());
        name
    }
}

/// Serializes one IR tree as a fully self-contained expression: `(function
/// (a,b,...){return <expr>})()`, parameterized over every id that needed a
/// bound name. With no marks at all the IIFE collapses to a bare call with
/// no parameters.
pub fn serialize_from_node(root: &Node, config: &SerializeConfig) -> Result<String, SerovalError> {
    let marks = collect_marks(root);
    let binder = SelfContainedBinder::new();
    let mut emitter = Emitter::new(&binder, marks.clone(), config);
    let expr = emitter.emit(root)?;

    if marks.is_empty() {
        // A bare object (or function) literal at the start of an expression
        // is ambiguous with a block statement if the caller drops the
        // result directly into a `<script>`/`eval` position; parenthesize
        // it the same way the source does (§8 concrete scenario: `({a:1})`).
        return Ok(if expr.starts_with('{') {
            format!("({expr})")
        } else {
            expr
        });
    }

    let mut assigned: Vec<(RefId, String)> = binder
        .assigned
        .borrow()
        .iter()
        .map(|(id, name)| (*id, name.clone()))
        .collect();
    assigned.sort_by_key(|(_, name)| name_rank(name));
    let params: Vec<String> = assigned.into_iter().map(|(_, name)| name).collect();

    Ok(format!("(function({}){{return {expr}}})()", params.join(",")))
}

/// Deterministic ordering for the IIFE's parameter list. The call site
/// passes no arguments, so every parameter starts `undefined` regardless of
/// position — this only needs to be stable, not chronological.
fn name_rank(name: &str) -> (usize, &str) {
    (name.len(), name)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_enumerates_single_letters_first() {
        assert_eq!(short_name(0), "a");
        assert_eq!(short_name(1), "b");
        assert_eq!(short_name(53), "$");
    }

    #[test]
    fn short_name_rolls_over_to_two_digits() {
        let name = short_name(54);
        assert_eq!(name.len(), 2);
    }

    #[test]
    fn binder_is_stable_for_repeated_lookups() {
        let binder = SelfContainedBinder::new();
        let id = RefId::new(3);
        let first = binder.name(id);
        let second = binder.name(id);
        assert_eq!(first, second);
    }

    #[test]
    fn no_marks_means_bare_expression_with_no_iife() {
        let node = Node::Number { value: 1.0 };
        let config = SerializeConfig::default();
        let text = serialize_from_node(&node, &config).unwrap();
        assert_eq!(text, "1");
    }

    #[test]
    fn bare_object_literal_is_parenthesized() {
        let node = Node::Object {
            id: RefId::new(0),
            record: {
                let mut record = crate::ir::types::ObjectRecord::default();
                record.keys.push(crate::ir::types::PropertyKeyNode::Named("a".into()));
                record.values.push(Node::Number { value: 1.0 });
                record.size = 1;
                record
            },
            flag: crate::ir::types::ObjectFlag::None,
        };
        let config = SerializeConfig::default();
        let text = serialize_from_node(&node, &config).unwrap();
        assert_eq!(text, "({a:1})");
    }

    #[test]
    fn self_referential_array_wraps_in_parameterized_iife() {
        let id = RefId::new(0);
        let node = Node::Array {
            id,
            length: 1,
            items: vec![(0, Node::IndexedValue { id })],
            flag: crate::ir::types::ObjectFlag::None,
        };
        let config = SerializeConfig::default();
        let text = serialize_from_node(&node, &config).unwrap();
        assert!(text.starts_with("(function("));
        assert!(text.contains("return"));
    }
}

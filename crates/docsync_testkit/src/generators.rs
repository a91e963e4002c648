//! Property-based test generators using proptest.

use proptest::prelude::*;
use serde_json::{Map, Value};

/// Strategy for user field names, never reserved.
pub fn field_name_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[a-z][a-zA-Z0-9]{0,8}").expect("Invalid regex")
}

/// Strategy for plain JSON field values.
pub fn field_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        any::<i32>().prop_map(Value::from),
        "[a-zA-Z ]{0,16}".prop_map(Value::from),
        any::<bool>().prop_map(Value::from),
        Just(Value::Null),
    ]
}

/// Strategy for submission field maps.
pub fn fields_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map(field_name_strategy(), field_value_strategy(), 0..5)
        .prop_map(|fields| fields.into_iter().collect())
}

/// Which replica a scripted edit happens on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Side {
    /// The local store.
    Local,
    /// The remote.
    Remote,
}

/// One step of an edit script run against both replicas.
#[derive(Debug, Clone)]
pub enum Edit {
    /// Create a submission.
    Create(Side, Map<String, Value>),
    /// Update the n-th existing submission (modulo the count).
    Update(Side, usize, Map<String, Value>),
    /// Delete the n-th existing submission (modulo the count).
    Delete(Side, usize),
}

fn side_strategy() -> impl Strategy<Value = Side> {
    prop_oneof![Just(Side::Local), Just(Side::Remote)]
}

/// Strategy for one scripted edit.
pub fn edit_strategy() -> impl Strategy<Value = Edit> {
    prop_oneof![
        3 => (side_strategy(), fields_strategy()).prop_map(|(side, f)| Edit::Create(side, f)),
        2 => (side_strategy(), any::<usize>(), fields_strategy())
            .prop_map(|(side, n, f)| Edit::Update(side, n, f)),
        1 => (side_strategy(), any::<usize>()).prop_map(|(side, n)| Edit::Delete(side, n)),
    ]
}

/// Strategy for an edit script.
pub fn edit_script_strategy(max_len: usize) -> impl Strategy<Value = Vec<Edit>> {
    prop::collection::vec(edit_strategy(), 1..max_len.max(2))
}

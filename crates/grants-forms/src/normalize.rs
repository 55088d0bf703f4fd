//! Value Normalizer
//!
//! Form inputs are strings at the input boundary while schema enums may hold
//! numbers, booleans or strings. These helpers coerce between the two so
//! widgets can compare and round-trip values without type-specific branches.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Serialized form of `true`
pub const TRUE_STRING: &str = "true";
/// Serialized form of `false`
pub const FALSE_STRING: &str = "false";

/// One selectable option of a radio, select or checkbox group
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnumOption {
    /// Original option value, type preserved
    pub value: Value,
    /// Display label
    pub label: String,
}

impl EnumOption {
    pub fn new(value: Value, label: impl Into<String>) -> Self {
        Self {
            value,
            label: label.into(),
        }
    }
}

/// `None`/null become `""`, everything else its string form.
pub fn stringify_or_empty(value: Option<&Value>) -> String {
    match value {
        None | Some(Value::Null) => String::new(),
        Some(Value::String(s)) => s.clone(),
        Some(Value::Bool(b)) => b.to_string(),
        Some(Value::Number(n)) => n.to_string(),
        Some(Value::Array(items)) => items
            .iter()
            .map(|item| stringify_or_empty(Some(item)))
            .collect::<Vec<_>>()
            .join(","),
        Some(other) => other.to_string(),
    }
}

/// Map booleans and their string forms to `"true"`/`"false"`, anything else to `""`.
pub fn to_boolean_string(value: Option<&Value>) -> &'static str {
    match from_boolean_string(value) {
        Some(true) => TRUE_STRING,
        Some(false) => FALSE_STRING,
        None => "",
    }
}

/// Inverse of [`to_boolean_string`]. `None` means unset, not false.
pub fn from_boolean_string(value: Option<&Value>) -> Option<bool> {
    match value? {
        Value::Bool(b) => Some(*b),
        Value::String(s) if s == TRUE_STRING => Some(true),
        Value::String(s) if s == FALSE_STRING => Some(false),
        _ => None,
    }
}

/// True for the `"true"`/`"false"` string sentinels and for real booleans.
pub fn is_boolean_sentinel(value: &Value) -> bool {
    match value {
        Value::Bool(_) => true,
        Value::String(s) => s == TRUE_STRING || s == FALSE_STRING,
        _ => false,
    }
}

/// Bring `current` into the same space as `option_value` for equality checks.
pub fn normalize_for_compare(option_value: &Value, current: Option<&Value>) -> Option<Value> {
    if is_boolean_sentinel(option_value) {
        return Some(Value::String(to_boolean_string(current).to_string()));
    }
    current.cloned()
}

/// Whether `current` selects `option_value`.
pub fn option_matches(option_value: &Value, current: Option<&Value>) -> bool {
    let expected = if is_boolean_sentinel(option_value) {
        Value::String(to_boolean_string(Some(option_value)).to_string())
    } else {
        option_value.clone()
    };
    match normalize_for_compare(option_value, current) {
        Some(Value::Array(items)) => items
            .iter()
            .any(|item| stringify_or_empty(Some(item)) == stringify_or_empty(Some(&expected))),
        Some(actual) => stringify_or_empty(Some(&actual)) == stringify_or_empty(Some(&expected)),
        None => false,
    }
}

/// Restore the typed value behind a raw input string.
///
/// With boolean sentinels among the options the raw string is read as a
/// boolean; otherwise the matching option's original value is returned, or
/// `raw` itself when nothing matches.
pub fn parse_from_input_value(raw: &str, enum_options: &[EnumOption]) -> Value {
    if enum_options.iter().any(|o| is_boolean_sentinel(&o.value)) {
        return Value::Bool(raw == TRUE_STRING);
    }
    enum_options
        .iter()
        .find(|o| stringify_or_empty(Some(&o.value)) == raw)
        .map(|o| o.value.clone())
        .unwrap_or_else(|| Value::String(raw.to_string()))
}

//! Shaping flat submitted form data into a nested form value

use serde_json::{Map, Number, Value};
use thiserror::Error;
use tracing::debug;

use crate::config::FormLimits;
use crate::normalize::{parse_from_input_value, stringify_or_empty, EnumOption, FALSE_STRING, TRUE_STRING};
use crate::path::{FieldPath, PathError, Segment};
use crate::schema::{FormSchema, ScalarType, SchemaKind};

/// Keys added by the page framework rather than by form fields
const FRAMEWORK_KEYS: &[&str] = &["apply-form-button"];
const FRAMEWORK_PREFIX: &str = "$ACTION_";

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ShapeError {
    #[error("Invalid field name: {0}")]
    Path(#[from] PathError),

    #[error("Field `{key}` nests deeper than {max} levels")]
    TooDeep { key: String, max: usize },

    #[error("Field `{key}` exceeds {max} array items")]
    TooManyItems { key: String, max: usize },

    #[error("Invalid submission: {0}")]
    InvalidSubmission(String),
}

pub fn is_framework_key(key: &str) -> bool {
    key.starts_with(FRAMEWORK_PREFIX) || FRAMEWORK_KEYS.contains(&key)
}

/// Ordered multimap of submitted `name=value` pairs
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubmittedFormData {
    entries: Vec<(String, String)>,
}

impl SubmittedFormData {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<String>,
        I: IntoIterator<Item = (K, V)>,
    {
        let mut data = Self::new();
        for (k, v) in pairs {
            data.append(k, v);
        }
        data
    }

    /// Build from a JSON object of `name: value` entries; arrays repeat the key.
    pub fn from_json_object(value: &Value) -> Result<Self, ShapeError> {
        let map = value
            .as_object()
            .ok_or_else(|| ShapeError::InvalidSubmission("expected an object of field values".into()))?;
        let mut data = Self::new();
        for (key, entry) in map {
            match entry {
                Value::Array(items) => {
                    for item in items {
                        data.append(key.as_str(), stringify_or_empty(Some(item)));
                    }
                }
                Value::Object(_) => {
                    return Err(ShapeError::InvalidSubmission(format!(
                        "field `{}` must be a scalar or a list",
                        key
                    )))
                }
                other => data.append(key.as_str(), stringify_or_empty(Some(other))),
            }
        }
        Ok(data)
    }

    pub fn append(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.entries.push((key.into(), value.into()));
    }

    pub fn get_all(&self, key: &str) -> Vec<&str> {
        self.entries
            .iter()
            .filter(|(k, _)| k == key)
            .map(|(_, v)| v.as_str())
            .collect()
    }

    /// Distinct keys in first-seen order
    pub fn keys(&self) -> Vec<&str> {
        let mut keys: Vec<&str> = Vec::new();
        for (k, _) in &self.entries {
            if !keys.contains(&k.as_str()) {
                keys.push(k.as_str());
            }
        }
        keys
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

enum Target<'a> {
    Known(&'a FormSchema),
    /// Under an object that declares no properties
    Open,
    Unknown,
}

fn locate<'a>(schema: &'a FormSchema, path: &FieldPath) -> Target<'a> {
    let mut node = schema;
    for segment in path.segments() {
        let next = match (segment, &node.kind) {
            (Segment::Key(_), SchemaKind::Object(o)) if o.is_open() => return Target::Open,
            (Segment::Key(k), SchemaKind::Object(o)) => o.properties.get(k),
            (Segment::Index(_), SchemaKind::Array(a)) => a.items.as_deref(),
            _ => None,
        };
        match next {
            Some(child) => node = child,
            None => return Target::Unknown,
        }
    }
    Target::Known(node)
}

fn enum_options_of(schema: &FormSchema) -> Vec<EnumOption> {
    schema
        .enum_values()
        .unwrap_or_default()
        .iter()
        .map(|v| EnumOption::new(v.clone(), stringify_or_empty(Some(v))))
        .collect()
}

/// Coerce one raw input string. Blank input is unanswered.
fn coerce_scalar(schema: &FormSchema, raw: &str) -> Option<Value> {
    if raw.trim().is_empty() {
        return None;
    }
    let options = enum_options_of(schema);
    if !options.is_empty() && !schema.is_boolean() {
        return Some(parse_from_input_value(raw, &options));
    }
    let scalar_type = schema.as_scalar().map(|s| s.scalar_type).unwrap_or_default();
    let value = match scalar_type {
        ScalarType::Boolean => match raw {
            TRUE_STRING | "on" => Value::Bool(true),
            FALSE_STRING => Value::Bool(false),
            other => Value::String(other.to_string()),
        },
        ScalarType::Integer => raw
            .trim()
            .parse::<i64>()
            .map(Value::from)
            .unwrap_or_else(|_| Value::String(raw.to_string())),
        ScalarType::Number => raw
            .trim()
            .parse::<f64>()
            .ok()
            .and_then(Number::from_f64)
            .map(Value::Number)
            .unwrap_or_else(|| Value::String(raw.to_string())),
        ScalarType::String => Value::String(raw.to_string()),
        // read-only fields are never taken from input
        ScalarType::Null => return None,
    };
    Some(value)
}

fn coerce(schema: &FormSchema, raws: &[&str]) -> Option<Value> {
    match &schema.kind {
        SchemaKind::Array(array) => {
            let items: Vec<Value> = match array.items.as_deref() {
                Some(item_schema) => raws.iter().filter_map(|r| coerce_scalar(item_schema, r)).collect(),
                None => raws
                    .iter()
                    .filter(|r| !r.trim().is_empty())
                    .map(|r| Value::String(r.to_string()))
                    .collect(),
            };
            (!items.is_empty()).then_some(Value::Array(items))
        }
        SchemaKind::Object(_) => None,
        SchemaKind::Scalar(_) => match raws {
            [single] => coerce_scalar(schema, single),
            many => {
                let items: Vec<Value> = many.iter().filter_map(|r| coerce_scalar(schema, r)).collect();
                (!items.is_empty()).then_some(Value::Array(items))
            }
        },
    }
}

fn raw_value(raws: &[&str]) -> Option<Value> {
    let items: Vec<Value> = raws
        .iter()
        .filter(|r| !r.trim().is_empty())
        .map(|r| Value::String(r.to_string()))
        .collect();
    match items.len() {
        0 => None,
        1 => items.into_iter().next(),
        _ => Some(Value::Array(items)),
    }
}

/// Rebuild objects so keys follow schema property order.
fn order_by_schema(schema: &FormSchema, value: Value) -> Value {
    match (&schema.kind, value) {
        (SchemaKind::Object(object), Value::Object(mut map)) => {
            let mut ordered = Map::new();
            for (key, child) in object.properties.iter() {
                if let Some(v) = map.remove(key) {
                    ordered.insert(key.to_string(), order_by_schema(child, v));
                }
            }
            ordered.extend(map);
            Value::Object(ordered)
        }
        (SchemaKind::Array(array), Value::Array(items)) => match array.items.as_deref() {
            Some(item_schema) => Value::Array(items.into_iter().map(|i| order_by_schema(item_schema, i)).collect()),
            None => Value::Array(items),
        },
        (_, other) => other,
    }
}

/// Shape flat `name=value` pairs into a nested value following `schema`.
///
/// Field names use the HTML path form (`a--b[0]--c`). Framework keys and
/// names with no schema counterpart are dropped; empty answers are pruned.
pub fn shape_form_data(
    data: &SubmittedFormData,
    schema: &FormSchema,
    limits: &FormLimits,
) -> Result<Value, ShapeError> {
    let mut shaped = Value::Object(Map::new());
    for key in data.keys() {
        if is_framework_key(key) {
            continue;
        }
        let path = FieldPath::parse_html(key)?;
        if path.len() > limits.max_depth {
            return Err(ShapeError::TooDeep {
                key: key.to_string(),
                max: limits.max_depth,
            });
        }
        if path.max_index().map_or(false, |i| i >= limits.max_array_items) {
            return Err(ShapeError::TooManyItems {
                key: key.to_string(),
                max: limits.max_array_items,
            });
        }
        let raws = data.get_all(key);
        if raws.len() > limits.max_array_items {
            return Err(ShapeError::TooManyItems {
                key: key.to_string(),
                max: limits.max_array_items,
            });
        }
        let value = match locate(schema, &path) {
            Target::Known(node) => coerce(node, &raws),
            Target::Open => raw_value(&raws),
            Target::Unknown => {
                debug!(field = key, "dropping field with no schema counterpart");
                continue;
            }
        };
        match value {
            Some(value) => path.set(&mut shaped, value)?,
            // a blank line item still creates its array; pruning leaves `[]`
            None if path.max_index().is_some() && path.get(&shaped).is_none() => {
                if let Err(e) = path.set(&mut shaped, Value::Null) {
                    debug!(field = key, error = %e, "blank line item not placed");
                }
            }
            None => {}
        }
    }
    Ok(prune_empty_nested_fields(order_by_schema(schema, shaped)))
}

/// Remove nulls, blank strings, and objects left empty. Arrays stay, as `[]`
/// when every item was empty. `false` and `0` are answers and stay.
pub fn prune_empty_nested_fields(value: Value) -> Value {
    prune(value).unwrap_or_else(|| Value::Object(Map::new()))
}

fn prune(value: Value) -> Option<Value> {
    match value {
        Value::Null => None,
        Value::String(s) if s.trim().is_empty() => None,
        Value::Object(map) => {
            let pruned: Map<String, Value> = map.into_iter().filter_map(|(k, v)| prune(v).map(|v| (k, v))).collect();
            (!pruned.is_empty()).then_some(Value::Object(pruned))
        }
        Value::Array(items) => {
            Some(Value::Array(items.into_iter().filter_map(prune).collect()))
        }
        other => Some(other),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema::from_json(&json!({
            "type": "object",
            "properties": {
                "name": { "type": "string" },
                "count": { "type": "integer" },
                "ratio": { "type": "number" },
                "agree": { "type": "boolean" },
                "level": { "type": "integer", "enum": [1, 2, 3] },
                "colors": { "type": "array", "items": { "type": "string", "enum": ["red", "blue"] } },
                "address": {
                    "type": "object",
                    "properties": { "street": { "type": "string" }, "city": { "type": "string" } }
                },
                "tasks": {
                    "type": "array",
                    "items": { "type": "object", "properties": { "title": { "type": "string" } } }
                },
                "extra": { "type": "object" },
                "signature": { "type": "null" }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_shape_nested_and_coerced() {
        let data = SubmittedFormData::from_pairs([
            ("$ACTION_REF_1", ""),
            ("$ACTION_KEY", "k1"),
            ("apply-form-button", "save"),
            ("address--city", "Springfield"),
            ("name", "Ada"),
            ("count", "3"),
            ("ratio", "0.5"),
            ("agree", "false"),
            ("level", "2"),
            ("colors", "red"),
            ("colors", "blue"),
            ("tasks[1]--title", "second"),
            ("tasks[0]--title", "first"),
            ("address--street", ""),
            ("unknown", "dropped"),
            ("extra--anything", "kept"),
            ("signature", "forged"),
        ]);
        let shaped = shape_form_data(&data, &schema(), &FormLimits::default()).unwrap();
        assert_eq!(
            shaped,
            json!({
                "name": "Ada",
                "count": 3,
                "ratio": 0.5,
                "agree": false,
                "level": 2,
                "colors": ["red", "blue"],
                "address": { "city": "Springfield" },
                "tasks": [{ "title": "first" }, { "title": "second" }],
                "extra": { "anything": "kept" }
            })
        );
        // schema order, not submission order
        let keys: Vec<&String> = shaped.as_object().unwrap().keys().collect();
        assert_eq!(keys[0], "name");
        assert_eq!(keys.last().unwrap().as_str(), "extra");
    }

    #[test]
    fn test_unparseable_numbers_stay_strings() {
        let data = SubmittedFormData::from_pairs([("count", "three")]);
        let shaped = shape_form_data(&data, &schema(), &FormLimits::default()).unwrap();
        assert_eq!(shaped, json!({ "count": "three" }));
    }

    #[test]
    fn test_limits() {
        let limits = FormLimits {
            max_depth: 2,
            max_array_items: 5,
            ..FormLimits::default()
        };
        let deep = SubmittedFormData::from_pairs([("a--b--c", "x")]);
        assert!(matches!(
            shape_form_data(&deep, &schema(), &limits),
            Err(ShapeError::TooDeep { max: 2, .. })
        ));
        // index segments count toward depth
        let indexed = SubmittedFormData::from_pairs([("tasks[0]--title", "x")]);
        assert!(matches!(
            shape_form_data(&indexed, &schema(), &limits),
            Err(ShapeError::TooDeep { max: 2, .. })
        ));

        let limits = FormLimits {
            max_depth: 3,
            ..limits
        };
        assert!(shape_form_data(&indexed, &schema(), &limits).is_ok());
        let wide = SubmittedFormData::from_pairs([("tasks[5]--title", "x")]);
        assert!(matches!(
            shape_form_data(&wide, &schema(), &limits),
            Err(ShapeError::TooManyItems { max: 5, .. })
        ));
        let bad = SubmittedFormData::from_pairs([("tasks[x]", "x")]);
        assert!(matches!(shape_form_data(&bad, &schema(), &limits), Err(ShapeError::Path(_))));
    }

    #[test]
    fn test_from_json_object() {
        let data = SubmittedFormData::from_json_object(&json!({ "name": "Ada", "colors": ["red", "blue"], "agree": true }))
            .unwrap();
        assert_eq!(data.get_all("colors"), vec!["red", "blue"]);
        assert_eq!(data.get_all("agree"), vec!["true"]);
        assert_eq!(data.keys(), vec!["name", "colors", "agree"]);
        assert!(SubmittedFormData::from_json_object(&json!([1])).is_err());
    }

    #[test]
    fn test_prune_keeps_false_and_zero() {
        let pruned = prune_empty_nested_fields(json!({
            "a": false,
            "b": 0,
            "c": "",
            "d": { "e": null, "f": { "g": "" } },
            "h": [null, { "i": "" }, "x"],
            "j": [{ "k": "" }]
        }));
        assert_eq!(pruned, json!({ "a": false, "b": 0, "h": ["x"], "j": [] }));
    }

    #[test]
    fn test_blank_line_items_shape_to_empty_array() {
        let data = SubmittedFormData::from_pairs([("name", "Ada"), ("tasks[0]--title", "")]);
        let shaped = shape_form_data(&data, &schema(), &FormLimits::default()).unwrap();
        assert_eq!(shaped, json!({ "name": "Ada", "tasks": [] }));
    }
}

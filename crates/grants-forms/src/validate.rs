//! Validation of form values against a parsed schema
//!
//! Errors are keyed by HTML field path. Conditionals are resolved per object
//! against the value being checked, so a rule inside array items applies to
//! each element on its own.

use chrono::{DateTime, NaiveDate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;
use std::sync::OnceLock;
use tracing::warn;
use uuid::Uuid;

use crate::config::FormLimits;
use crate::path::FieldPath;
use crate::schema::{ArraySchema, FormSchema, ScalarSchema, ScalarType, SchemaKind};

/// `{ html field path: [message] }`
pub type ValidationErrors = BTreeMap<String, Vec<String>>;

pub const REQUIRED_MESSAGE: &str = "This required field cannot be blank";
/// Reported under [`FORM_ERROR_KEY`] when a value exceeds structure limits
pub const STRUCTURE_MESSAGE: &str = "Input validation failed";
/// Key for errors that belong to the whole form
pub const FORM_ERROR_KEY: &str = "";

fn email_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[^@\s]+@[^@\s]+\.[^@\s]+$").expect("static pattern"))
}

fn required_property_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^'(?P<key>[^']+)' is a required property").expect("static pattern"))
}

/// Validation warning returned by the backend
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormValidationWarning {
    /// JSON path, e.g. `$.applicant.name`
    pub field: String,
    pub message: String,
    #[serde(rename = "type")]
    pub kind: String,
}

/// Strip control characters and cap the length.
pub fn sanitize_message(message: &str, limits: &FormLimits) -> String {
    message
        .chars()
        .filter(|c| !c.is_control())
        .take(limits.max_message_len)
        .collect()
}

/// Whether a value counts as an answer
pub fn is_answered(value: Option<&Value>) -> bool {
    match value {
        None | Some(Value::Null) => false,
        Some(Value::String(s)) => !s.trim().is_empty(),
        Some(Value::Array(items)) => !items.is_empty(),
        Some(_) => true,
    }
}

fn value_depth(value: &Value) -> usize {
    match value {
        Value::Object(map) => 1 + map.values().map(value_depth).max().unwrap_or(0),
        Value::Array(items) => 1 + items.iter().map(value_depth).max().unwrap_or(0),
        _ => 0,
    }
}

fn within_limits(value: &Value, limits: &FormLimits) -> bool {
    fn arrays_fit(value: &Value, max: usize) -> bool {
        match value {
            Value::Array(items) => items.len() <= max && items.iter().all(|i| arrays_fit(i, max)),
            Value::Object(map) => map.values().all(|v| arrays_fit(v, max)),
            _ => true,
        }
    }
    value_depth(value) <= limits.max_depth && arrays_fit(value, limits.max_array_items)
}

struct Validator<'a> {
    limits: &'a FormLimits,
    errors: ValidationErrors,
}

impl<'a> Validator<'a> {
    fn push(&mut self, path: &FieldPath, message: impl AsRef<str>) {
        let message = sanitize_message(message.as_ref(), self.limits);
        let entry = self.errors.entry(path.to_html()).or_default();
        if !entry.contains(&message) {
            entry.push(message);
        }
    }

    fn node(&mut self, schema: &FormSchema, value: &Value, path: &FieldPath) {
        match &schema.kind {
            SchemaKind::Object(object) => {
                let Some(map) = value.as_object() else {
                    self.push(path, "Must be an object");
                    return;
                };
                let effective = object.effective(Some(value));
                for key in &effective.required {
                    if !is_answered(map.get(key)) {
                        self.push(&path.key(key.as_str()), REQUIRED_MESSAGE);
                    }
                }
                for (key, child) in effective.properties.iter() {
                    if let Some(child_value) = map.get(key) {
                        if is_answered(Some(child_value)) {
                            self.node(child, child_value, &path.key(key));
                        }
                    }
                }
            }
            SchemaKind::Array(array) => self.array(array, value, path),
            SchemaKind::Scalar(scalar) => self.scalar(scalar, value, path),
        }
    }

    fn array(&mut self, array: &ArraySchema, value: &Value, path: &FieldPath) {
        let Some(items) = value.as_array() else {
            self.push(path, "Must be a list");
            return;
        };
        if let Some(min) = array.min_items {
            if items.len() < min {
                self.push(path, format!("Must have at least {} items", min));
            }
        }
        if let Some(max) = array.max_items {
            if items.len() > max {
                self.push(path, format!("Must have no more than {} items", max));
            }
        }
        if let Some(item_schema) = &array.items {
            for (i, item) in items.iter().enumerate() {
                if is_answered(Some(item)) {
                    self.node(item_schema, item, &path.index(i));
                }
            }
        }
    }

    fn scalar(&mut self, scalar: &ScalarSchema, value: &Value, path: &FieldPath) {
        if !type_matches(scalar.scalar_type, value) {
            self.push(path, format!("Must be a {}", scalar.scalar_type.as_str()));
            return;
        }
        if let Some(expected) = &scalar.const_value {
            if expected != value {
                self.push(path, format!("Must be {}", expected));
            }
        }
        if let Some(allowed) = &scalar.enum_values {
            if !allowed.contains(value) {
                let listed = allowed.iter().map(Value::to_string).collect::<Vec<_>>().join(", ");
                self.push(path, format!("Must be one of: {}", listed));
            }
        }
        if let Value::String(s) = value {
            let len = s.chars().count();
            if let Some(min) = scalar.min_length {
                if len < min {
                    self.push(path, format!("Must be at least {} characters", min));
                }
            }
            if let Some(max) = scalar.max_length {
                if len > max {
                    self.push(path, format!("Must be {} characters or fewer", max));
                }
            }
            if let Some(pattern) = &scalar.pattern {
                match Regex::new(pattern) {
                    Ok(re) if !re.is_match(s) => self.push(path, "Does not match the required format"),
                    Ok(_) => {}
                    Err(e) => warn!(path = %path, error = %e, "skipping invalid schema pattern"),
                }
            }
            if let Some(format) = &scalar.format {
                if !format_matches(format, s) {
                    self.push(path, format!("Must be a valid {}", format));
                }
            }
        }
        if let Some(n) = value.as_f64() {
            if let Some(min) = scalar.minimum {
                if n < min {
                    self.push(path, format!("Must be at least {}", min));
                }
            }
            if let Some(max) = scalar.maximum {
                if n > max {
                    self.push(path, format!("Must be at most {}", max));
                }
            }
        }
    }
}

fn type_matches(scalar_type: ScalarType, value: &Value) -> bool {
    match scalar_type {
        ScalarType::String => value.is_string(),
        ScalarType::Number => value.is_number(),
        ScalarType::Integer => value.is_i64() || value.is_u64() || value.as_f64().map_or(false, |n| n.fract() == 0.0),
        ScalarType::Boolean => value.is_boolean(),
        ScalarType::Null => value.is_null(),
    }
}

fn format_matches(format: &str, s: &str) -> bool {
    match format {
        "uuid" => Uuid::parse_str(s).is_ok(),
        "email" => email_regex().is_match(s),
        "date" => NaiveDate::parse_from_str(s, "%Y-%m-%d").is_ok(),
        "date-time" => DateTime::parse_from_rfc3339(s).is_ok(),
        _ => true,
    }
}

/// Validate `value` against `schema`, resolving conditionals as it goes.
pub fn validate_form_value(schema: &FormSchema, value: &Value, limits: &FormLimits) -> ValidationErrors {
    let mut validator = Validator {
        limits,
        errors: ValidationErrors::new(),
    };
    if !within_limits(value, limits) {
        validator
            .errors
            .insert(FORM_ERROR_KEY.to_string(), vec![STRUCTURE_MESSAGE.to_string()]);
        return validator.errors;
    }
    validator.node(schema, value, &FieldPath::root());
    validator.errors
}

/// Map a backend warning onto an HTML field path and a display message.
///
/// `'key' is a required property` reported on a parent is moved onto the
/// missing child. The field's title replaces its key in the message.
pub fn format_validation_warning(
    warning: &FormValidationWarning,
    schema: &FormSchema,
    limits: &FormLimits,
) -> (String, String) {
    let mut path = FieldPath::parse_json_path(&warning.field).unwrap_or_default();
    let mut message = warning.message.clone();
    let mut key = path.last_key().map(str::to_string);

    if let Some(caps) = required_property_regex().captures(&warning.message) {
        let missing = caps["key"].to_string();
        path = path.key(missing.as_str());
        message = message.replacen(&format!("'{}'", missing), &missing, 1);
        key = Some(missing);
    }

    let title = schema
        .at_path(&path)
        .and_then(|s| s.title.clone())
        .map(|t| t.replace('?', ""))
        .unwrap_or_else(|| "Field".to_string());
    if let Some(key) = key {
        message = message.replacen(&key, &title, 1);
    }
    message = message
        .replace('\'', "")
        .replace("[] should be non-empty", &format!("{} is required", title))
        .replace("is a required property", "is required");

    let field = if path.is_root() {
        FORM_ERROR_KEY.to_string()
    } else {
        path.to_html()
    };
    (field, sanitize_message(&message, limits))
}

/// Fold backend warnings into `errors`.
pub fn merge_warnings(
    errors: &mut ValidationErrors,
    warnings: &[FormValidationWarning],
    schema: &FormSchema,
    limits: &FormLimits,
) {
    for warning in warnings {
        let (field, message) = format_validation_warning(warning, schema, limits);
        let entry = errors.entry(field).or_default();
        if !entry.contains(&message) {
            entry.push(message);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn schema() -> FormSchema {
        FormSchema::from_json(&json!({
            "type": "object",
            "required": ["applicant", "kind"],
            "properties": {
                "applicant": {
                    "type": "object",
                    "title": "Applicant",
                    "required": ["name"],
                    "properties": {
                        "name": { "type": "string", "title": "Legal name?", "maxLength": 5 },
                        "email": { "type": "string", "format": "email" },
                        "founded": { "type": "string", "format": "date" }
                    }
                },
                "kind": { "type": "string", "enum": ["A", "B"] },
                "amount": { "type": "number", "minimum": 0 },
                "code": { "type": "string", "pattern": "^[A-Z]{3}$" },
                "tasks": {
                    "type": "array",
                    "maxItems": 2,
                    "items": {
                        "type": "object",
                        "properties": {
                            "has_due": { "type": "boolean" },
                            "due": { "type": "string" }
                        },
                        "allOf": [{
                            "if": { "properties": { "has_due": { "const": true } }, "required": ["has_due"] },
                            "then": { "required": ["due"] }
                        }]
                    }
                }
            }
        }))
        .unwrap()
    }

    #[test]
    fn test_required_fields() {
        let errors = validate_form_value(&schema(), &json!({ "applicant": { "name": "" } }), &FormLimits::default());
        assert_eq!(errors["applicant--name"], vec![REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors["kind"], vec![REQUIRED_MESSAGE.to_string()]);
        assert_eq!(errors.len(), 2);
    }

    #[test]
    fn test_valid_value_has_no_errors() {
        let value = json!({
            "applicant": { "name": "Ada", "email": "ada@example.org", "founded": "2020-02-29" },
            "kind": "B",
            "amount": 10.5,
            "code": "ABC",
            "tasks": [{ "has_due": false }, { "has_due": true, "due": "soon" }]
        });
        assert!(validate_form_value(&schema(), &value, &FormLimits::default()).is_empty());
    }

    #[test]
    fn test_constraint_messages() {
        let value = json!({
            "applicant": { "name": "Adelaide", "email": "not-an-email", "founded": "2021-02-30" },
            "kind": "C",
            "amount": -1,
            "code": "abc"
        });
        let errors = validate_form_value(&schema(), &value, &FormLimits::default());
        assert_eq!(errors["applicant--name"], vec!["Must be 5 characters or fewer".to_string()]);
        assert_eq!(errors["applicant--email"], vec!["Must be a valid email".to_string()]);
        assert_eq!(errors["applicant--founded"], vec!["Must be a valid date".to_string()]);
        assert_eq!(errors["kind"], vec![r#"Must be one of: "A", "B""#.to_string()]);
        assert_eq!(errors["amount"], vec!["Must be at least 0".to_string()]);
        assert_eq!(errors["code"], vec!["Does not match the required format".to_string()]);
    }

    #[test]
    fn test_conditionals_apply_per_array_item() {
        let value = json!({
            "applicant": { "name": "Ada" },
            "kind": "A",
            "tasks": [{ "has_due": true }, { "has_due": false }]
        });
        let errors = validate_form_value(&schema(), &value, &FormLimits::default());
        assert_eq!(errors.keys().collect::<Vec<_>>(), vec!["tasks[0]--due"]);
    }

    #[test]
    fn test_max_items_and_type() {
        let value = json!({
            "applicant": { "name": "Ada" },
            "kind": "A",
            "amount": "ten",
            "tasks": [{}, {}, {}]
        });
        let errors = validate_form_value(&schema(), &value, &FormLimits::default());
        assert_eq!(errors["tasks"], vec!["Must have no more than 2 items".to_string()]);
        assert_eq!(errors["amount"], vec!["Must be a number".to_string()]);
    }

    #[test]
    fn test_structure_limits() {
        let limits = FormLimits {
            max_depth: 2,
            ..FormLimits::default()
        };
        let errors = validate_form_value(&schema(), &json!({ "a": { "b": { "c": 1 } } }), &limits);
        assert_eq!(errors[FORM_ERROR_KEY], vec![STRUCTURE_MESSAGE.to_string()]);
    }

    #[test]
    fn test_sanitize_message() {
        let limits = FormLimits {
            max_message_len: 5,
            ..FormLimits::default()
        };
        assert_eq!(sanitize_message("ab\u{0}cdefgh", &limits), "abcde");
    }

    #[test]
    fn test_format_required_warning() {
        let warning = FormValidationWarning {
            field: "$.applicant".into(),
            message: "'name' is a required property".into(),
            kind: "required".into(),
        };
        let (field, message) = format_validation_warning(&warning, &schema(), &FormLimits::default());
        assert_eq!(field, "applicant--name");
        assert_eq!(message, "Legal name is required");
    }

    #[test]
    fn test_merge_warnings() {
        let mut errors = ValidationErrors::new();
        errors.insert("kind".into(), vec![REQUIRED_MESSAGE.to_string()]);
        let warnings = vec![FormValidationWarning {
            field: "$.tasks".into(),
            message: "[] should be non-empty".into(),
            kind: "minItems".into(),
        }];
        merge_warnings(&mut errors, &warnings, &schema(), &FormLimits::default());
        assert_eq!(errors["tasks"], vec!["Field is required".to_string()]);
        assert_eq!(errors.len(), 2);
    }
}

//! Conditional rules (`if` / `then` / `else`)

use serde_json::{json, Map, Value};

use super::{FormSchema, ObjectSchema};

/// Test half of a conditional rule
///
/// Property constraints follow JSON Schema: they hold vacuously when the
/// field is absent, which is why real schemas pair them with `Required`.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    Const { field: String, value: Value },
    OneOf { field: String, values: Vec<Value> },
    Required(Vec<String>),
    Not(Box<Condition>),
    All(Vec<Condition>),
}

fn is_present(data: Option<&Map<String, Value>>, field: &str) -> bool {
    matches!(data.and_then(|d| d.get(field)), Some(v) if !v.is_null())
}

impl Condition {
    pub fn evaluate(&self, data: Option<&Map<String, Value>>) -> bool {
        match self {
            Condition::Const { field, value } => match data.and_then(|d| d.get(field)) {
                Some(actual) => actual == value,
                None => true,
            },
            Condition::OneOf { field, values } => match data.and_then(|d| d.get(field)) {
                Some(actual) => values.contains(actual),
                None => true,
            },
            Condition::Required(fields) => fields.iter().all(|f| is_present(data, f)),
            Condition::Not(inner) => !inner.evaluate(data),
            Condition::All(all) => all.iter().all(|c| c.evaluate(data)),
        }
    }

    /// Fields whose value can flip this condition
    pub fn fields(&self) -> Vec<&str> {
        match self {
            Condition::Const { field, .. } | Condition::OneOf { field, .. } => vec![field.as_str()],
            Condition::Required(fields) => fields.iter().map(String::as_str).collect(),
            Condition::Not(inner) => inner.fields(),
            Condition::All(all) => all.iter().flat_map(Condition::fields).collect(),
        }
    }

    pub fn to_json(&self) -> Value {
        match self {
            Condition::Const { field, value } => {
                json!({ "properties": { field.clone(): { "const": value } } })
            }
            Condition::OneOf { field, values } => {
                json!({ "properties": { field.clone(): { "enum": values } } })
            }
            Condition::Required(fields) => json!({ "required": fields }),
            Condition::Not(inner) => json!({ "not": inner.to_json() }),
            Condition::All(all) => {
                let mut merged = Map::new();
                let mut properties = Map::new();
                let mut required: Vec<Value> = Vec::new();
                let mut rest = Vec::new();
                for c in all {
                    match c {
                        Condition::Const { .. } | Condition::OneOf { .. } => {
                            if let Some(Value::Object(p)) = c.to_json().get("properties") {
                                properties.extend(p.clone());
                            }
                        }
                        Condition::Required(fields) => {
                            required.extend(fields.iter().cloned().map(Value::String))
                        }
                        other => rest.push(other.to_json()),
                    }
                }
                if !properties.is_empty() {
                    merged.insert("properties".into(), Value::Object(properties));
                }
                if !required.is_empty() {
                    merged.insert("required".into(), Value::Array(required));
                }
                if !rest.is_empty() {
                    merged.insert("allOf".into(), Value::Array(rest));
                }
                Value::Object(merged)
            }
        }
    }
}

/// Changes applied to an object level when a branch is taken
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SchemaPatch {
    pub required: Vec<String>,
    pub properties: Vec<(String, FormSchema)>,
}

impl SchemaPatch {
    pub fn apply(&self, target: &mut ObjectSchema) {
        for (key, schema) in &self.properties {
            target.properties.merge(key, schema);
        }
        target.add_required(&self.required);
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if !self.required.is_empty() {
            out.insert("required".into(), json!(self.required));
        }
        if !self.properties.is_empty() {
            let props = self
                .properties
                .iter()
                .map(|(k, s)| (k.clone(), s.to_json()))
                .collect();
            out.insert("properties".into(), Value::Object(props));
        }
        Value::Object(out)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct ConditionalRule {
    pub condition: Condition,
    pub then: SchemaPatch,
    pub otherwise: Option<SchemaPatch>,
}

impl ConditionalRule {
    /// Patch selected for `data`, if any
    pub fn branch(&self, data: Option<&Map<String, Value>>) -> Option<&SchemaPatch> {
        if self.condition.evaluate(data) {
            Some(&self.then)
        } else {
            self.otherwise.as_ref()
        }
    }

    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        out.insert("if".into(), self.condition.to_json());
        out.insert("then".into(), self.then.to_json());
        if let Some(otherwise) = &self.otherwise {
            out.insert("else".into(), otherwise.to_json());
        }
        Value::Object(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn data(value: Value) -> Map<String, Value> {
        value.as_object().cloned().unwrap()
    }

    #[test]
    fn test_const_with_required_guard() {
        let condition = Condition::All(vec![
            Condition::Const {
                field: "report_type".into(),
                value: json!("MaterialChange"),
            },
            Condition::Required(vec!["report_type".into()]),
        ]);
        assert!(condition.evaluate(Some(&data(json!({ "report_type": "MaterialChange" })))));
        assert!(!condition.evaluate(Some(&data(json!({ "report_type": "Annual" })))));
        assert!(!condition.evaluate(Some(&data(json!({})))));
        assert_eq!(condition.fields(), vec!["report_type", "report_type"]);
    }

    #[test]
    fn test_bare_const_holds_when_absent() {
        let condition = Condition::Const {
            field: "flag".into(),
            value: json!(true),
        };
        assert!(condition.evaluate(None));
        assert!(condition.evaluate(Some(&data(json!({})))));
        assert!(!condition.evaluate(Some(&data(json!({ "flag": false })))));
    }

    #[test]
    fn test_not_required_pair() {
        // either award_number or project_name must be given
        let rule = ConditionalRule {
            condition: Condition::Not(Box::new(Condition::Required(vec!["award_number".into()]))),
            then: SchemaPatch {
                required: vec!["project_name".into()],
                ..SchemaPatch::default()
            },
            otherwise: None,
        };
        assert!(rule.branch(Some(&data(json!({})))).is_some());
        assert!(rule.branch(Some(&data(json!({ "award_number": null })))).is_some());
        assert!(rule.branch(Some(&data(json!({ "award_number": "A-1" })))).is_none());
    }

    #[test]
    fn test_else_branch() {
        let rule = ConditionalRule {
            condition: Condition::OneOf {
                field: "kind".into(),
                values: vec![json!("a"), json!("b")],
            },
            then: SchemaPatch {
                required: vec!["x".into()],
                ..SchemaPatch::default()
            },
            otherwise: Some(SchemaPatch {
                required: vec!["y".into()],
                ..SchemaPatch::default()
            }),
        };
        let chosen = rule.branch(Some(&data(json!({ "kind": "c" })))).unwrap();
        assert_eq!(chosen.required, vec!["y".to_string()]);
    }
}

//! JSON Schema document parsing

use serde_json::{Map, Value};
use tracing::debug;

use super::{
    ArraySchema, Condition, ConditionalRule, FormSchema, ObjectSchema, Properties, ScalarSchema,
    ScalarType, SchemaError, SchemaKind, SchemaPatch,
};
use crate::config::FormLimits;

type ParseResult<T> = Result<T, SchemaError>;

const SCALAR_KEYWORDS: &[&str] = &[
    "enum",
    "const",
    "minLength",
    "maxLength",
    "format",
    "pattern",
    "minimum",
    "maximum",
];

fn malformed(path: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Malformed {
        path: if path.is_empty() { "/".into() } else { path.to_string() },
        reason: reason.into(),
    }
}

fn is_rule_element(value: &Value) -> bool {
    match value.as_object() {
        Some(map) => {
            map.contains_key("if")
                && map.contains_key("then")
                && map.keys().all(|k| matches!(k.as_str(), "if" | "then" | "else"))
        }
        None => false,
    }
}

fn usize_keyword(map: &Map<String, Value>, key: &str, path: &str) -> ParseResult<Option<usize>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_u64()
            .map(|n| Some(n as usize))
            .ok_or_else(|| malformed(path, format!("`{}` must be a non-negative integer", key))),
    }
}

fn f64_keyword(map: &Map<String, Value>, key: &str, path: &str) -> ParseResult<Option<f64>> {
    match map.get(key) {
        None => Ok(None),
        Some(v) => v
            .as_f64()
            .map(Some)
            .ok_or_else(|| malformed(path, format!("`{}` must be a number", key))),
    }
}

fn string_keyword(map: &Map<String, Value>, key: &str, path: &str) -> ParseResult<Option<String>> {
    match map.get(key) {
        None => Ok(None),
        Some(Value::String(s)) => Ok(Some(s.clone())),
        Some(_) => Err(malformed(path, format!("`{}` must be a string", key))),
    }
}

fn string_list(value: &Value, path: &str, key: &str) -> ParseResult<Vec<String>> {
    let items = value
        .as_array()
        .ok_or_else(|| malformed(path, format!("`{}` must be an array", key)))?;
    items
        .iter()
        .map(|v| {
            v.as_str()
                .map(str::to_string)
                .ok_or_else(|| malformed(path, format!("`{}` entries must be strings", key)))
        })
        .collect()
}

fn infer_scalar_type(value: &Value) -> ScalarType {
    match value {
        Value::Bool(_) => ScalarType::Boolean,
        Value::Number(n) if n.is_i64() || n.is_u64() => ScalarType::Integer,
        Value::Number(_) => ScalarType::Number,
        Value::Null => ScalarType::Null,
        _ => ScalarType::String,
    }
}

enum DeclaredType {
    Object,
    Array,
    Scalar(ScalarType),
}

/// Single-use parser over one schema document
pub(super) struct SchemaParser<'a> {
    document: &'a Value,
    limits: &'a FormLimits,
    key_count: usize,
    ref_stack: Vec<String>,
}

impl<'a> SchemaParser<'a> {
    pub(super) fn new(document: &'a Value, limits: &'a FormLimits) -> Self {
        Self {
            document,
            limits,
            key_count: 0,
            ref_stack: Vec::new(),
        }
    }

    pub(super) fn parse_root(mut self) -> ParseResult<FormSchema> {
        let schema = self.parse_node(self.document, "", 0)?;
        debug!(properties = self.key_count, "parsed form schema");
        Ok(schema)
    }

    fn parse_node(&mut self, node: &Value, path: &str, depth: usize) -> ParseResult<FormSchema> {
        if depth > self.limits.max_depth {
            return Err(SchemaError::StructureLimit(format!(
                "schema nesting exceeds {} levels",
                self.limits.max_depth
            )));
        }
        let map = match node {
            Value::Object(map) => map,
            Value::Bool(true) => return Ok(FormSchema::scalar(ScalarSchema::default())),
            _ => return Err(malformed(path, "expected a schema object")),
        };

        if let Some(reference) = map.get("$ref") {
            return self.parse_reference(map, reference, path, depth);
        }

        let mut rules = Vec::new();
        let mut fragments = Vec::new();
        if let Some(all_of) = map.get("allOf") {
            let elements = match all_of.as_array() {
                Some(elements) if !elements.is_empty() => elements,
                _ => return Err(malformed(path, "`allOf` must be a non-empty array")),
            };
            for (i, element) in elements.iter().enumerate() {
                let element_path = format!("{}/allOf/{}", path, i);
                if is_rule_element(element) {
                    rules.push(self.parse_rule(element, &element_path, depth)?);
                } else {
                    fragments.push(self.parse_node(element, &element_path, depth + 1)?);
                }
            }
        }
        if map.contains_key("if") && map.contains_key("then") {
            rules.push(self.parse_rule(node, path, depth)?);
        }

        let declared = self.declared_type(map, path)?;
        let explicit_type = map.contains_key("type");
        let own_kind = match declared {
            Some(declared) => Some(self.parse_kind(map, declared, path, depth)?),
            None => None,
        };

        let merged = fragments.into_iter().reduce(|mut acc, next| {
            acc.merge(&next);
            acc
        });
        let mut schema = match (merged, own_kind) {
            (Some(mut base), Some(mut kind)) => {
                if let (SchemaKind::Scalar(base_scalar), SchemaKind::Scalar(own)) =
                    (&base.kind, &mut kind)
                {
                    if !explicit_type {
                        own.scalar_type = base_scalar.scalar_type;
                    }
                }
                base.merge(&FormSchema {
                    title: None,
                    description: None,
                    kind,
                });
                base
            }
            (Some(base), None) => base,
            (None, Some(kind)) => FormSchema {
                title: None,
                description: None,
                kind,
            },
            (None, None) => FormSchema::scalar(ScalarSchema::default()),
        };

        if let Some(title) = string_keyword(map, "title", path)? {
            schema.title = Some(title);
        }
        if let Some(description) = string_keyword(map, "description", path)? {
            schema.description = Some(description);
        }

        if !rules.is_empty() {
            match &mut schema.kind {
                SchemaKind::Object(object) => object.conditionals.extend(rules),
                _ => return Err(malformed(path, "conditional rules require an object schema")),
            }
        }
        Ok(schema)
    }

    fn parse_reference(
        &mut self,
        map: &Map<String, Value>,
        reference: &Value,
        path: &str,
        depth: usize,
    ) -> ParseResult<FormSchema> {
        let reference = reference
            .as_str()
            .ok_or_else(|| malformed(path, "`$ref` must be a string"))?;
        let pointer = reference
            .strip_prefix('#')
            .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))?;
        if self.ref_stack.iter().any(|r| r == reference) {
            return Err(SchemaError::CircularRef(reference.to_string()));
        }
        let document = self.document;
        let target = document
            .pointer(pointer)
            .ok_or_else(|| SchemaError::UnresolvedRef(reference.to_string()))?;

        self.ref_stack.push(reference.to_string());
        let resolved = self.parse_node(target, path, depth);
        self.ref_stack.pop();
        let mut resolved = resolved?;

        // sibling keywords refine the referenced schema
        let siblings: Map<String, Value> = map
            .iter()
            .filter(|(k, _)| k.as_str() != "$ref")
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect();
        if siblings.is_empty() {
            return Ok(resolved);
        }
        let annotations_only = siblings
            .keys()
            .all(|k| matches!(k.as_str(), "title" | "description" | "$comment"));
        if annotations_only {
            if let Some(title) = string_keyword(&siblings, "title", path)? {
                resolved.title = Some(title);
            }
            if let Some(description) = string_keyword(&siblings, "description", path)? {
                resolved.description = Some(description);
            }
            return Ok(resolved);
        }
        let refinement = self.parse_node(&Value::Object(siblings), path, depth)?;
        resolved.merge(&refinement);
        Ok(resolved)
    }

    fn declared_type(
        &self,
        map: &Map<String, Value>,
        path: &str,
    ) -> ParseResult<Option<DeclaredType>> {
        let name = match map.get("type") {
            Some(Value::String(name)) => Some(name.as_str()),
            Some(Value::Array(names)) => {
                let names: Vec<&str> = names.iter().filter_map(Value::as_str).collect();
                names
                    .iter()
                    .copied()
                    .find(|n| *n != "null")
                    .or_else(|| names.first().copied())
            }
            Some(_) => return Err(malformed(path, "`type` must be a string or array")),
            None => None,
        };

        let declared = match name {
            Some("object") => DeclaredType::Object,
            Some("array") => DeclaredType::Array,
            Some(other) => DeclaredType::Scalar(
                ScalarType::parse(other)
                    .ok_or_else(|| malformed(path, format!("unknown type `{}`", other)))?,
            ),
            None if map.contains_key("properties") || map.contains_key("required") => {
                DeclaredType::Object
            }
            None if map.contains_key("items") => DeclaredType::Array,
            None => {
                if !SCALAR_KEYWORDS.iter().any(|k| map.contains_key(*k)) {
                    return Ok(None);
                }
                let sample = map
                    .get("const")
                    .or_else(|| map.get("enum").and_then(|e| e.as_array()?.first()));
                DeclaredType::Scalar(sample.map_or(ScalarType::String, infer_scalar_type))
            }
        };
        Ok(Some(declared))
    }

    fn parse_kind(
        &mut self,
        map: &Map<String, Value>,
        declared: DeclaredType,
        path: &str,
        depth: usize,
    ) -> ParseResult<SchemaKind> {
        match declared {
            DeclaredType::Object => {
                let properties = match map.get("properties") {
                    Some(Value::Object(props)) => self.parse_properties(props, path, depth)?,
                    Some(_) => return Err(malformed(path, "`properties` must be an object")),
                    None => Properties::new(),
                };
                let required = match map.get("required") {
                    Some(v) => string_list(v, path, "required")?,
                    None => Vec::new(),
                };
                Ok(SchemaKind::Object(ObjectSchema {
                    properties,
                    required,
                    conditionals: Vec::new(),
                }))
            }
            DeclaredType::Array => {
                let items = match map.get("items") {
                    Some(Value::Array(_)) => {
                        return Err(malformed(path, "tuple `items` are not supported"))
                    }
                    Some(items) => {
                        let item_path = format!("{}/items", path);
                        Some(Box::new(self.parse_node(items, &item_path, depth + 1)?))
                    }
                    None => None,
                };
                Ok(SchemaKind::Array(ArraySchema {
                    items,
                    min_items: usize_keyword(map, "minItems", path)?,
                    max_items: usize_keyword(map, "maxItems", path)?,
                }))
            }
            DeclaredType::Scalar(scalar_type) => {
                let enum_values = match map.get("enum") {
                    Some(Value::Array(values)) => Some(values.clone()),
                    Some(_) => return Err(malformed(path, "`enum` must be an array")),
                    None => None,
                };
                Ok(SchemaKind::Scalar(ScalarSchema {
                    scalar_type,
                    enum_values,
                    const_value: map.get("const").cloned(),
                    min_length: usize_keyword(map, "minLength", path)?,
                    max_length: usize_keyword(map, "maxLength", path)?,
                    format: string_keyword(map, "format", path)?,
                    pattern: string_keyword(map, "pattern", path)?,
                    minimum: f64_keyword(map, "minimum", path)?,
                    maximum: f64_keyword(map, "maximum", path)?,
                }))
            }
        }
    }

    fn parse_properties(
        &mut self,
        props: &Map<String, Value>,
        path: &str,
        depth: usize,
    ) -> ParseResult<Properties> {
        let mut properties = Properties::new();
        for (key, child) in props {
            self.key_count += 1;
            if self.key_count > self.limits.max_keys {
                return Err(SchemaError::StructureLimit(format!(
                    "schema defines more than {} properties",
                    self.limits.max_keys
                )));
            }
            let child_path = format!("{}/properties/{}", path, key);
            properties.insert(key.clone(), self.parse_node(child, &child_path, depth + 1)?);
        }
        Ok(properties)
    }

    fn parse_rule(&mut self, element: &Value, path: &str, depth: usize) -> ParseResult<ConditionalRule> {
        let condition = match element.get("if") {
            Some(test) => parse_condition(test, &format!("{}/if", path))?,
            None => return Err(malformed(path, "conditional without `if`")),
        };
        let then = match element.get("then") {
            Some(patch) => self.parse_patch(patch, &format!("{}/then", path), depth)?,
            None => return Err(malformed(path, "conditional without `then`")),
        };
        let otherwise = match element.get("else") {
            Some(patch) => Some(self.parse_patch(patch, &format!("{}/else", path), depth)?),
            None => None,
        };
        Ok(ConditionalRule {
            condition,
            then,
            otherwise,
        })
    }

    fn parse_patch(&mut self, patch: &Value, path: &str, depth: usize) -> ParseResult<SchemaPatch> {
        let map = patch
            .as_object()
            .ok_or_else(|| malformed(path, "branch must be an object"))?;
        let required = match map.get("required") {
            Some(v) => string_list(v, path, "required")?,
            None => Vec::new(),
        };
        let properties = match map.get("properties") {
            Some(Value::Object(props)) => {
                let mut parsed = Vec::with_capacity(props.len());
                for (key, child) in props {
                    let child_path = format!("{}/properties/{}", path, key);
                    parsed.push((key.clone(), self.parse_node(child, &child_path, depth + 1)?));
                }
                parsed
            }
            Some(_) => return Err(malformed(path, "`properties` must be an object")),
            None => Vec::new(),
        };
        for key in map.keys().filter(|k| !matches!(k.as_str(), "required" | "properties")) {
            debug!(path, keyword = %key, "ignoring keyword in conditional branch");
        }
        Ok(SchemaPatch {
            required,
            properties,
        })
    }
}

fn parse_condition(test: &Value, path: &str) -> ParseResult<Condition> {
    let map = test
        .as_object()
        .ok_or_else(|| malformed(path, "condition must be an object"))?;

    let mut conditions = Vec::new();
    if let Some(props) = map.get("properties") {
        let props = props
            .as_object()
            .ok_or_else(|| malformed(path, "`properties` must be an object"))?;
        for (field, constraint) in props {
            if let Some(value) = constraint.get("const") {
                conditions.push(Condition::Const {
                    field: field.clone(),
                    value: value.clone(),
                });
            } else if let Some(Value::Array(values)) = constraint.get("enum") {
                conditions.push(Condition::OneOf {
                    field: field.clone(),
                    values: values.clone(),
                });
            } else {
                return Err(malformed(
                    path,
                    format!("unsupported condition on `{}`", field),
                ));
            }
        }
    }
    if let Some(required) = map.get("required") {
        conditions.push(Condition::Required(string_list(required, path, "required")?));
    }
    if let Some(inner) = map.get("not") {
        conditions.push(Condition::Not(Box::new(parse_condition(
            inner,
            &format!("{}/not", path),
        )?)));
    }
    if let Some(all) = map.get("allOf") {
        let all = all
            .as_array()
            .ok_or_else(|| malformed(path, "`allOf` must be an array"))?;
        for (i, c) in all.iter().enumerate() {
            conditions.push(parse_condition(c, &format!("{}/allOf/{}", path, i))?);
        }
    }
    for key in map
        .keys()
        .filter(|k| !matches!(k.as_str(), "properties" | "required" | "not" | "allOf"))
    {
        debug!(path, keyword = %key, "ignoring keyword in condition");
    }

    if conditions.len() == 1 {
        Ok(conditions.remove(0))
    } else {
        Ok(Condition::All(conditions))
    }
}

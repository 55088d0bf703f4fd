//! Form schema model
//!
//! JSON Schema documents arrive untyped. They are parsed once into a
//! recursive sum type (`Object` / `Array` / `Scalar`) so every property access
//! downstream is checked, and `if`/`then`/`else` composition is held as
//! explicit [`ConditionalRule`]s until resolved against a value snapshot.

mod conditional;
mod parse;

pub use conditional::{Condition, ConditionalRule, SchemaPatch};

use serde_json::{Map, Value};
use thiserror::Error;

use crate::config::FormLimits;
use crate::path::{FieldPath, Segment};

/// Structural schema errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum SchemaError {
    #[error("required property `{property}` is not defined at `{path}`")]
    MissingRequiredProperty { path: String, property: String },

    #[error("unknown widget `{widget}` referenced at `{path}`")]
    UnknownWidget { path: String, widget: String },

    #[error("malformed schema at `{path}`: {reason}")]
    Malformed { path: String, reason: String },

    #[error("unresolved reference `{0}`")]
    UnresolvedRef(String),

    #[error("circular reference `{0}`")]
    CircularRef(String),

    #[error("Structure validation failed: {0}")]
    StructureLimit(String),
}

/// Primitive JSON Schema types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalarType {
    #[default]
    String,
    Number,
    Integer,
    Boolean,
    Null,
}

impl ScalarType {
    pub fn parse(name: &str) -> Option<Self> {
        match name {
            "string" => Some(Self::String),
            "number" => Some(Self::Number),
            "integer" => Some(Self::Integer),
            "boolean" => Some(Self::Boolean),
            "null" => Some(Self::Null),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::String => "string",
            Self::Number => "number",
            Self::Integer => "integer",
            Self::Boolean => "boolean",
            Self::Null => "null",
        }
    }
}

/// Ordered, key-unique property list
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Properties(Vec<(String, FormSchema)>);

impl Properties {
    pub fn new() -> Self {
        Self(Vec::new())
    }

    pub fn get(&self, key: &str) -> Option<&FormSchema> {
        self.0.iter().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    pub fn get_mut(&mut self, key: &str) -> Option<&mut FormSchema> {
        self.0.iter_mut().find(|(k, _)| k == key).map(|(_, s)| s)
    }

    pub fn contains(&self, key: &str) -> bool {
        self.get(key).is_some()
    }

    /// Insert, replacing any schema already under `key` in place
    pub fn insert(&mut self, key: impl Into<String>, schema: FormSchema) {
        let key = key.into();
        match self.get_mut(&key) {
            Some(existing) => *existing = schema,
            None => self.0.push((key, schema)),
        }
    }

    /// Merge `schema` into an existing entry, or insert it
    pub fn merge(&mut self, key: &str, schema: &FormSchema) {
        match self.get_mut(key) {
            Some(existing) => existing.merge(schema),
            None => self.0.push((key.to_string(), schema.clone())),
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &FormSchema)> {
        self.0.iter().map(|(k, s)| (k.as_str(), s))
    }

    pub fn keys(&self) -> impl Iterator<Item = &str> {
        self.0.iter().map(|(k, _)| k.as_str())
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<(String, FormSchema)> for Properties {
    fn from_iter<I: IntoIterator<Item = (String, FormSchema)>>(iter: I) -> Self {
        let mut props = Properties::new();
        for (k, s) in iter {
            props.insert(k, s);
        }
        props
    }
}

/// Object node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ObjectSchema {
    pub properties: Properties,
    pub required: Vec<String>,
    pub conditionals: Vec<ConditionalRule>,
}

impl ObjectSchema {
    pub fn is_required(&self, key: &str) -> bool {
        self.required.iter().any(|r| r == key)
    }

    /// An object declaring no properties accepts any keys
    pub fn is_open(&self) -> bool {
        self.properties.is_empty()
    }

    fn add_required(&mut self, keys: &[String]) {
        for key in keys {
            if !self.is_required(key) {
                self.required.push(key.clone());
            }
        }
    }

    /// This level with every conditional resolved against `value`.
    pub fn effective(&self, value: Option<&Value>) -> ObjectSchema {
        let mut resolved = ObjectSchema {
            properties: self.properties.clone(),
            required: self.required.clone(),
            conditionals: Vec::new(),
        };
        let data = value.and_then(Value::as_object);
        for rule in &self.conditionals {
            if let Some(patch) = rule.branch(data) {
                patch.apply(&mut resolved);
            }
        }
        resolved
    }
}

/// Array node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArraySchema {
    pub items: Option<Box<FormSchema>>,
    pub min_items: Option<usize>,
    pub max_items: Option<usize>,
}

/// Leaf node
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScalarSchema {
    pub scalar_type: ScalarType,
    pub enum_values: Option<Vec<Value>>,
    pub const_value: Option<Value>,
    pub min_length: Option<usize>,
    pub max_length: Option<usize>,
    pub format: Option<String>,
    pub pattern: Option<String>,
    pub minimum: Option<f64>,
    pub maximum: Option<f64>,
}

/// Structural kind of a schema node
#[derive(Debug, Clone, PartialEq)]
pub enum SchemaKind {
    Object(ObjectSchema),
    Array(ArraySchema),
    Scalar(ScalarSchema),
}

/// A parsed schema node
#[derive(Debug, Clone, PartialEq)]
pub struct FormSchema {
    pub title: Option<String>,
    pub description: Option<String>,
    pub kind: SchemaKind,
}

impl FormSchema {
    pub fn object(properties: Properties, required: Vec<String>) -> Self {
        Self {
            title: None,
            description: None,
            kind: SchemaKind::Object(ObjectSchema {
                properties,
                required,
                conditionals: Vec::new(),
            }),
        }
    }

    pub fn scalar(scalar: ScalarSchema) -> Self {
        Self {
            title: None,
            description: None,
            kind: SchemaKind::Scalar(scalar),
        }
    }

    pub fn array(items: Option<FormSchema>) -> Self {
        Self {
            title: None,
            description: None,
            kind: SchemaKind::Array(ArraySchema {
                items: items.map(Box::new),
                ..ArraySchema::default()
            }),
        }
    }

    pub fn with_title(mut self, title: impl Into<String>) -> Self {
        self.title = Some(title.into());
        self
    }

    /// Parse a JSON Schema document with default limits
    pub fn from_json(document: &Value) -> Result<Self, SchemaError> {
        Self::from_json_with_limits(document, &FormLimits::default())
    }

    /// Parse a JSON Schema document, dereferencing local `$ref`s and
    /// folding `allOf` fragments into their node.
    pub fn from_json_with_limits(document: &Value, limits: &FormLimits) -> Result<Self, SchemaError> {
        parse::SchemaParser::new(document, limits).parse_root()
    }

    pub fn as_object(&self) -> Option<&ObjectSchema> {
        match &self.kind {
            SchemaKind::Object(o) => Some(o),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&ArraySchema> {
        match &self.kind {
            SchemaKind::Array(a) => Some(a),
            _ => None,
        }
    }

    pub fn as_scalar(&self) -> Option<&ScalarSchema> {
        match &self.kind {
            SchemaKind::Scalar(s) => Some(s),
            _ => None,
        }
    }

    /// Enum values of this node, or of its items for arrays
    pub fn enum_values(&self) -> Option<&[Value]> {
        match &self.kind {
            SchemaKind::Scalar(s) => s.enum_values.as_deref(),
            SchemaKind::Array(a) => a.items.as_ref()?.enum_values(),
            SchemaKind::Object(_) => None,
        }
    }

    pub fn format(&self) -> Option<&str> {
        self.as_scalar()?.format.as_deref()
    }

    pub fn is_boolean(&self) -> bool {
        matches!(self.as_scalar(), Some(s) if s.scalar_type == ScalarType::Boolean)
    }

    /// `type: "null"` fields are shown but never editable
    pub fn is_null_type(&self) -> bool {
        matches!(self.as_scalar(), Some(s) if s.scalar_type == ScalarType::Null)
    }

    /// Schema of the node at `path` (array indices step into `items`).
    pub fn at_path(&self, path: &FieldPath) -> Option<&FormSchema> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| match (segment, &node.kind) {
                (Segment::Key(k), SchemaKind::Object(o)) => o.properties.get(k),
                (Segment::Index(_), SchemaKind::Array(a)) => a.items.as_deref(),
                _ => None,
            })
    }

    /// Resolve every conditional against `value`, recursing into objects.
    ///
    /// Array item schemas keep their rules; they are resolved per element
    /// during validation.
    pub fn resolve(&self, value: &Value) -> FormSchema {
        match &self.kind {
            SchemaKind::Object(object) => {
                let mut effective = object.effective(Some(value));
                let properties = effective
                    .properties
                    .iter()
                    .map(|(key, child)| {
                        let child_value = value.get(key).unwrap_or(&Value::Null);
                        (key.to_string(), child.resolve(child_value))
                    })
                    .collect();
                effective.properties = properties;
                FormSchema {
                    title: self.title.clone(),
                    description: self.description.clone(),
                    kind: SchemaKind::Object(effective),
                }
            }
            _ => self.clone(),
        }
    }

    /// Merge annotations of `other` into this node (`allOf` semantics,
    /// later fragments win on conflicts).
    pub fn merge(&mut self, other: &FormSchema) {
        if other.title.is_some() {
            self.title = other.title.clone();
        }
        if other.description.is_some() {
            self.description = other.description.clone();
        }
        match (&mut self.kind, &other.kind) {
            (SchemaKind::Object(mine), SchemaKind::Object(theirs)) => {
                for (key, schema) in theirs.properties.iter() {
                    mine.properties.merge(key, schema);
                }
                mine.add_required(&theirs.required);
                mine.conditionals.extend(theirs.conditionals.iter().cloned());
            }
            (SchemaKind::Array(mine), SchemaKind::Array(theirs)) => {
                match (&mut mine.items, &theirs.items) {
                    (Some(a), Some(b)) => a.merge(b),
                    (None, Some(b)) => mine.items = Some(b.clone()),
                    _ => {}
                }
                mine.min_items = theirs.min_items.or(mine.min_items);
                mine.max_items = theirs.max_items.or(mine.max_items);
            }
            (SchemaKind::Scalar(mine), SchemaKind::Scalar(theirs)) => {
                mine.scalar_type = theirs.scalar_type;
                mine.enum_values = theirs.enum_values.clone().or(mine.enum_values.take());
                mine.const_value = theirs.const_value.clone().or(mine.const_value.take());
                mine.min_length = theirs.min_length.or(mine.min_length);
                mine.max_length = theirs.max_length.or(mine.max_length);
                mine.format = theirs.format.clone().or(mine.format.take());
                mine.pattern = theirs.pattern.clone().or(mine.pattern.take());
                mine.minimum = theirs.minimum.or(mine.minimum);
                mine.maximum = theirs.maximum.or(mine.maximum);
            }
            (mine, theirs) => *mine = theirs.clone(),
        }
    }

    /// Serialize back to a JSON Schema document (conditionals as `allOf`).
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        match &self.kind {
            SchemaKind::Object(o) => {
                out.insert("type".into(), "object".into());
                if let Some(t) = &self.title {
                    out.insert("title".into(), t.clone().into());
                }
                if let Some(d) = &self.description {
                    out.insert("description".into(), d.clone().into());
                }
                let props: Map<String, Value> = o
                    .properties
                    .iter()
                    .map(|(k, s)| (k.to_string(), s.to_json()))
                    .collect();
                out.insert("properties".into(), Value::Object(props));
                if !o.required.is_empty() {
                    out.insert("required".into(), o.required.clone().into());
                }
                if !o.conditionals.is_empty() {
                    let rules = o.conditionals.iter().map(ConditionalRule::to_json).collect();
                    out.insert("allOf".into(), Value::Array(rules));
                }
            }
            SchemaKind::Array(a) => {
                out.insert("type".into(), "array".into());
                if let Some(t) = &self.title {
                    out.insert("title".into(), t.clone().into());
                }
                if let Some(d) = &self.description {
                    out.insert("description".into(), d.clone().into());
                }
                if let Some(items) = &a.items {
                    out.insert("items".into(), items.to_json());
                }
                if let Some(n) = a.min_items {
                    out.insert("minItems".into(), n.into());
                }
                if let Some(n) = a.max_items {
                    out.insert("maxItems".into(), n.into());
                }
            }
            SchemaKind::Scalar(s) => {
                out.insert("type".into(), s.scalar_type.as_str().into());
                if let Some(t) = &self.title {
                    out.insert("title".into(), t.clone().into());
                }
                if let Some(d) = &self.description {
                    out.insert("description".into(), d.clone().into());
                }
                if let Some(e) = &s.enum_values {
                    out.insert("enum".into(), Value::Array(e.clone()));
                }
                if let Some(c) = &s.const_value {
                    out.insert("const".into(), c.clone());
                }
                if let Some(n) = s.min_length {
                    out.insert("minLength".into(), n.into());
                }
                if let Some(n) = s.max_length {
                    out.insert("maxLength".into(), n.into());
                }
                if let Some(f) = &s.format {
                    out.insert("format".into(), f.clone().into());
                }
                if let Some(p) = &s.pattern {
                    out.insert("pattern".into(), p.clone().into());
                }
                if let Some(n) = s.minimum {
                    out.insert("minimum".into(), n.into());
                }
                if let Some(n) = s.maximum {
                    out.insert("maximum".into(), n.into());
                }
            }
        }
        Value::Object(out)
    }
}

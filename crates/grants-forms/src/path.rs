//! Field paths
//!
//! A field is addressed three ways:
//! - HTML name, used as input name/id and submitted key: `address--street`,
//!   `tasks[0]--title`
//! - JSON pointer into the schema: `/properties/address/properties/street`
//! - JSON path, used by backend warnings: `$.address.street`

use regex::Regex;
use serde_json::{Map, Value};
use std::fmt;
use std::sync::OnceLock;
use thiserror::Error;

/// Separator between nested keys in HTML field names
pub const HTML_DELIMITER: &str = "--";

/// Path parsing and assignment errors
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PathError {
    #[error("invalid field name `{name}`: {reason}")]
    InvalidName { name: String, reason: String },

    #[error("invalid JSON path `{0}`")]
    InvalidJsonPath(String),

    #[error("field `{path}` conflicts with a value already set at `{at}`")]
    Conflict { path: String, at: String },
}

/// One step of a field path
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Segment {
    Key(String),
    Index(usize),
}

/// Location of a field inside a form value
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FieldPath(Vec<Segment>);

fn html_part() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(?P<key>[^\[\]]+)(?P<indices>(?:\[\d+\])*)$").expect("static pattern")
    })
}

fn json_path_token() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r#"^(?:\.(?P<key>[^.\[\]]+)|\['(?P<quoted>[^']*)'\]|\[(?P<index>\d+)\])"#)
            .expect("static pattern")
    })
}

impl FieldPath {
    pub fn root() -> Self {
        Self(Vec::new())
    }

    pub fn from_segments(segments: Vec<Segment>) -> Self {
        Self(segments)
    }

    pub fn segments(&self) -> &[Segment] {
        &self.0
    }

    pub fn is_root(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Path extended by an object key
    pub fn key(&self, key: impl Into<String>) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Key(key.into()));
        Self(segments)
    }

    /// Path extended by an array index
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.0.clone();
        segments.push(Segment::Index(index));
        Self(segments)
    }

    pub fn parent(&self) -> Option<Self> {
        if self.0.is_empty() {
            return None;
        }
        Some(Self(self.0[..self.0.len() - 1].to_vec()))
    }

    /// Last object key on the path
    pub fn last_key(&self) -> Option<&str> {
        self.0.iter().rev().find_map(|s| match s {
            Segment::Key(k) => Some(k.as_str()),
            Segment::Index(_) => None,
        })
    }

    /// Highest array index on the path
    pub fn max_index(&self) -> Option<usize> {
        self.0
            .iter()
            .filter_map(|s| match s {
                Segment::Index(i) => Some(*i),
                Segment::Key(_) => None,
            })
            .max()
    }

    /// Parse a submitted HTML field name such as `tasks[0]--title`.
    pub fn parse_html(name: &str) -> Result<Self, PathError> {
        let invalid = |reason: &str| PathError::InvalidName {
            name: name.to_string(),
            reason: reason.to_string(),
        };
        if name.is_empty() {
            return Err(invalid("empty name"));
        }

        let mut segments = Vec::new();
        for part in name.split(HTML_DELIMITER) {
            let caps = html_part()
                .captures(part)
                .ok_or_else(|| invalid("expected `key` or `key[index]` between delimiters"))?;
            let key = caps.name("key").map_or("", |m| m.as_str());
            segments.push(Segment::Key(key.to_string()));

            let indices = caps.name("indices").map_or("", |m| m.as_str());
            for raw in indices
                .split(|c| c == '[' || c == ']')
                .filter(|s| !s.is_empty())
            {
                let index = raw.parse::<usize>().map_err(|_| invalid("array index out of range"))?;
                segments.push(Segment::Index(index));
            }
        }
        Ok(Self(segments))
    }

    /// HTML name for this path
    pub fn to_html(&self) -> String {
        let mut out = String::new();
        for segment in &self.0 {
            match segment {
                Segment::Key(k) => {
                    if !out.is_empty() {
                        out.push_str(HTML_DELIMITER);
                    }
                    out.push_str(k);
                }
                Segment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Field path for a schema pointer such as `/properties/a/properties/b`.
    ///
    /// `properties` and `items` tokens describe schema structure and are skipped.
    pub fn from_schema_pointer(pointer: &str) -> Self {
        let segments = pointer
            .trim_start_matches('#')
            .split('/')
            .filter(|t| !t.is_empty() && *t != "properties" && *t != "items")
            .map(|t| Segment::Key(t.replace("~1", "/").replace("~0", "~")))
            .collect();
        Self(segments)
    }

    /// Schema pointer for this path (indices are dropped)
    pub fn to_schema_pointer(&self) -> String {
        let mut out = String::new();
        let mut after_index = false;
        for segment in &self.0 {
            match segment {
                Segment::Key(k) => {
                    if after_index {
                        out.push_str("/items");
                    }
                    out.push_str("/properties/");
                    out.push_str(&k.replace('~', "~0").replace('/', "~1"));
                    after_index = false;
                }
                Segment::Index(_) => after_index = true,
            }
        }
        if after_index {
            out.push_str("/items");
        }
        out
    }

    /// Parse a JSON path such as `$.a.b[0]` or `$['odd key']`.
    pub fn parse_json_path(path: &str) -> Result<Self, PathError> {
        let mut rest = path
            .strip_prefix('$')
            .ok_or_else(|| PathError::InvalidJsonPath(path.to_string()))?;
        let mut segments = Vec::new();
        while !rest.is_empty() {
            let caps = json_path_token()
                .captures(rest)
                .ok_or_else(|| PathError::InvalidJsonPath(path.to_string()))?;
            if let Some(k) = caps.name("key").or_else(|| caps.name("quoted")) {
                segments.push(Segment::Key(k.as_str().to_string()));
            } else if let Some(i) = caps.name("index") {
                let index = i
                    .as_str()
                    .parse()
                    .map_err(|_| PathError::InvalidJsonPath(path.to_string()))?;
                segments.push(Segment::Index(index));
            }
            let consumed = caps.get(0).map_or(0, |m| m.end());
            rest = &rest[consumed..];
        }
        Ok(Self(segments))
    }

    /// JSON path for this path
    pub fn to_json_path(&self) -> String {
        let mut out = String::from("$");
        for segment in &self.0 {
            match segment {
                Segment::Key(k) if k.chars().all(|c| c.is_alphanumeric() || c == '_') => {
                    out.push('.');
                    out.push_str(k);
                }
                Segment::Key(k) => {
                    out.push_str("['");
                    out.push_str(k);
                    out.push_str("']");
                }
                Segment::Index(i) => {
                    out.push('[');
                    out.push_str(&i.to_string());
                    out.push(']');
                }
            }
        }
        out
    }

    /// Value at this path, if present
    pub fn get<'v>(&self, value: &'v Value) -> Option<&'v Value> {
        self.0.iter().try_fold(value, |current, segment| match segment {
            Segment::Key(k) => current.as_object()?.get(k),
            Segment::Index(i) => current.as_array()?.get(*i),
        })
    }

    /// Store `new_value` at this path, creating intermediate objects and arrays.
    pub fn set(&self, target: &mut Value, new_value: Value) -> Result<(), PathError> {
        let mut current = target;
        for (depth, segment) in self.0.iter().enumerate() {
            let conflict = || PathError::Conflict {
                path: self.to_html(),
                at: FieldPath(self.0[..depth].to_vec()).to_html(),
            };
            match segment {
                Segment::Key(k) => {
                    if current.is_null() {
                        *current = Value::Object(Map::new());
                    }
                    let map = current.as_object_mut().ok_or_else(conflict)?;
                    current = map.entry(k.clone()).or_insert(Value::Null);
                }
                Segment::Index(i) => {
                    if current.is_null() {
                        *current = Value::Array(Vec::new());
                    }
                    let items = current.as_array_mut().ok_or_else(conflict)?;
                    if items.len() <= *i {
                        items.resize(*i + 1, Value::Null);
                    }
                    current = &mut items[*i];
                }
            }
        }
        *current = new_value;
        Ok(())
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_html())
    }
}

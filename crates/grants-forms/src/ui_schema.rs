//! UI schema
//!
//! Two document shapes are accepted:
//! - a keyed tree parallel to the form schema (`{"name": {"ui:widget": "TextArea"}}`,
//!   nested entries either direct or under `properties`, array items under `items`)
//! - a section layout: an array of `{"type": "section", "name", "label", "children"}`
//!   whose children reference fields by schema pointer (`"definition"`)
//!
//! Layout field hints are folded into the keyed tree so widget lookup is the
//! same for both shapes. Keys with no form schema counterpart are inert.

use serde_json::{Map, Value};
use tracing::debug;

use crate::path::{FieldPath, Segment};
use crate::schema::SchemaError;

const ITEMS_KEY: &str = "items";

/// A layout element
#[derive(Debug, Clone, PartialEq)]
pub enum UiElement {
    /// Single field; `read_only` for `"type": "null"` entries
    Field {
        path: FieldPath,
        widget: Option<String>,
        read_only: bool,
    },
    /// Composite widget spanning several schema nodes (budget tables)
    MultiField {
        name: String,
        widget: String,
        paths: Vec<FieldPath>,
    },
    Section(UiSection),
}

/// A titled group of layout elements
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiSection {
    pub name: String,
    pub label: String,
    pub description: Option<String>,
    pub elements: Vec<UiElement>,
}

/// Presentation hints for one node, plus the section layout at the root
#[derive(Debug, Clone, Default, PartialEq)]
pub struct UiSchema {
    pub widget: Option<String>,
    pub title: Option<String>,
    pub disabled: bool,
    pub options: Map<String, Value>,
    pub children: Vec<(String, UiSchema)>,
    pub sections: Vec<UiSection>,
}

fn malformed(path: &str, reason: impl Into<String>) -> SchemaError {
    SchemaError::Malformed {
        path: format!("ui:{}", path),
        reason: reason.into(),
    }
}

impl UiSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_widget(widget: impl Into<String>) -> Self {
        Self {
            widget: Some(widget.into()),
            ..Self::default()
        }
    }

    /// Parse either UI schema shape; `null` yields an empty schema.
    pub fn from_json(document: &Value) -> Result<Self, SchemaError> {
        match document {
            Value::Null => Ok(Self::new()),
            Value::Object(map) => Self::from_map(map, ""),
            Value::Array(entries) => Self::from_layout(entries),
            _ => Err(malformed("/", "expected an object or a section array")),
        }
    }

    fn from_map(map: &Map<String, Value>, path: &str) -> Result<Self, SchemaError> {
        let mut ui = Self::new();
        for (key, value) in map {
            match key.as_str() {
                "ui:widget" => {
                    let widget = value
                        .as_str()
                        .ok_or_else(|| malformed(path, "`ui:widget` must be a string"))?;
                    ui.widget = Some(widget.to_string());
                }
                "ui:title" => ui.title = value.as_str().map(str::to_string),
                "ui:disabled" | "ui:readonly" => ui.disabled = value.as_bool().unwrap_or(false),
                "ui:options" => {
                    let options = value
                        .as_object()
                        .ok_or_else(|| malformed(path, "`ui:options` must be an object"))?;
                    ui.options = options.clone();
                }
                "properties" => {
                    let props = value
                        .as_object()
                        .ok_or_else(|| malformed(path, "`properties` must be an object"))?;
                    for (child_key, child) in props {
                        ui.insert_child(child_key, child, path)?;
                    }
                }
                k if k.starts_with("ui:") => debug!(path, hint = k, "ignoring unsupported ui hint"),
                k => ui.insert_child(k, value, path)?,
            }
        }
        Ok(ui)
    }

    fn insert_child(&mut self, key: &str, value: &Value, path: &str) -> Result<(), SchemaError> {
        match value.as_object() {
            Some(child) => {
                let child_path = format!("{}/{}", path, key);
                let parsed = Self::from_map(child, &child_path)?;
                self.children.push((key.to_string(), parsed));
            }
            None => debug!(path, key, "ignoring non-object ui entry"),
        }
        Ok(())
    }

    fn from_layout(entries: &[Value]) -> Result<Self, SchemaError> {
        let mut ui = Self::new();
        for (i, entry) in entries.iter().enumerate() {
            let path = format!("/{}", i);
            match parse_element(entry, &path)? {
                UiElement::Section(section) => ui.sections.push(section),
                element => {
                    // top-level fields get an anonymous section
                    ui.sections.push(UiSection {
                        name: format!("section-{}", i),
                        elements: vec![element],
                        ..UiSection::default()
                    })
                }
            }
        }
        let mut hints = Vec::new();
        for section in &ui.sections {
            collect_field_hints(&section.elements, &mut hints);
        }
        for (path, widget, read_only) in hints {
            let node = ui.node_mut(&path);
            if widget.is_some() {
                node.widget = widget;
            }
            node.disabled |= read_only;
        }
        Ok(ui)
    }

    pub fn child(&self, key: &str) -> Option<&UiSchema> {
        self.children.iter().find(|(k, _)| k == key).map(|(_, c)| c)
    }

    /// Hints for the node at `path`; array indices step into `items`.
    pub fn at(&self, path: &FieldPath) -> Option<&UiSchema> {
        path.segments()
            .iter()
            .try_fold(self, |node, segment| match segment {
                Segment::Key(k) => node.child(k),
                Segment::Index(_) => node.child(ITEMS_KEY),
            })
    }

    pub fn widget_at(&self, path: &FieldPath) -> Option<&str> {
        self.at(path)?.widget.as_deref()
    }

    /// Mutable node at `path`, created when missing
    pub fn node_mut(&mut self, path: &FieldPath) -> &mut UiSchema {
        let mut node = self;
        for segment in path.segments() {
            let key = match segment {
                Segment::Key(k) => k.as_str(),
                Segment::Index(_) => ITEMS_KEY,
            };
            let idx = match node.children.iter().position(|(k, _)| k == key) {
                Some(idx) => idx,
                None => {
                    node.children.push((key.to_string(), UiSchema::new()));
                    node.children.len() - 1
                }
            };
            node = &mut node.children[idx].1;
        }
        node
    }

    pub fn has_layout(&self) -> bool {
        !self.sections.is_empty()
    }

    /// Every node carrying a widget hint, keyed by its field path
    pub fn widget_hints(&self) -> Vec<(FieldPath, &str)> {
        let mut out = Vec::new();
        self.collect_hints(FieldPath::root(), &mut out);
        out
    }

    fn collect_hints<'a>(&'a self, path: FieldPath, out: &mut Vec<(FieldPath, &'a str)>) {
        if let Some(widget) = &self.widget {
            out.push((path.clone(), widget.as_str()));
        }
        for (key, child) in &self.children {
            let child_path = if key == ITEMS_KEY {
                path.index(0)
            } else {
                path.key(key.as_str())
            };
            child.collect_hints(child_path, out);
        }
    }

    /// Layout elements that carry a widget without a keyed-tree node
    pub fn multi_fields(&self) -> Vec<(&str, &str)> {
        fn walk<'a>(elements: &'a [UiElement], out: &mut Vec<(&'a str, &'a str)>) {
            for element in elements {
                match element {
                    UiElement::MultiField { name, widget, .. } => {
                        out.push((name.as_str(), widget.as_str()))
                    }
                    UiElement::Section(section) => walk(&section.elements, out),
                    UiElement::Field { .. } => {}
                }
            }
        }
        let mut out = Vec::new();
        for section in &self.sections {
            walk(&section.elements, &mut out);
        }
        out
    }

    /// Serialize the keyed tree (layout sections are not emitted)
    pub fn to_json(&self) -> Value {
        let mut out = Map::new();
        if let Some(widget) = &self.widget {
            out.insert("ui:widget".into(), widget.clone().into());
        }
        if let Some(title) = &self.title {
            out.insert("ui:title".into(), title.clone().into());
        }
        if self.disabled {
            out.insert("ui:disabled".into(), true.into());
        }
        if !self.options.is_empty() {
            out.insert("ui:options".into(), Value::Object(self.options.clone()));
        }
        for (key, child) in &self.children {
            out.insert(key.clone(), child.to_json());
        }
        Value::Object(out)
    }
}

fn collect_field_hints(elements: &[UiElement], out: &mut Vec<(FieldPath, Option<String>, bool)>) {
    for element in elements {
        match element {
            UiElement::Field {
                path,
                widget,
                read_only,
            } => out.push((path.clone(), widget.clone(), *read_only)),
            UiElement::Section(section) => collect_field_hints(&section.elements, out),
            UiElement::MultiField { .. } => {}
        }
    }
}

fn definition(entry: &Map<String, Value>, path: &str) -> Result<FieldPath, SchemaError> {
    entry
        .get("definition")
        .and_then(Value::as_str)
        .map(FieldPath::from_schema_pointer)
        .ok_or_else(|| malformed(path, "field without a `definition` pointer"))
}

fn parse_element(entry: &Value, path: &str) -> Result<UiElement, SchemaError> {
    let map = entry
        .as_object()
        .ok_or_else(|| malformed(path, "layout entry must be an object"))?;
    let widget = map.get("widget").and_then(Value::as_str).map(str::to_string);

    match map.get("type").and_then(Value::as_str) {
        Some("section") => {
            let name = map
                .get("name")
                .and_then(Value::as_str)
                .ok_or_else(|| malformed(path, "section without a `name`"))?
                .to_string();
            let label = map
                .get("label")
                .and_then(Value::as_str)
                .map_or_else(|| name.clone(), str::to_string);
            let mut elements = Vec::new();
            if let Some(children) = map.get("children") {
                let children = children
                    .as_array()
                    .ok_or_else(|| malformed(path, "`children` must be an array"))?;
                for (i, child) in children.iter().enumerate() {
                    elements.push(parse_element(child, &format!("{}/children/{}", path, i))?);
                }
            }
            Ok(UiElement::Section(UiSection {
                name,
                label,
                description: map.get("description").and_then(Value::as_str).map(str::to_string),
                elements,
            }))
        }
        Some("field") => Ok(UiElement::Field {
            path: definition(map, path)?,
            widget,
            read_only: false,
        }),
        Some("null") => Ok(UiElement::Field {
            path: definition(map, path)?,
            widget,
            read_only: true,
        }),
        Some("multiField") => {
            let widget = widget.ok_or_else(|| malformed(path, "multiField without a `widget`"))?;
            let paths = match map.get("definition") {
                Some(Value::Array(pointers)) => pointers
                    .iter()
                    .filter_map(Value::as_str)
                    .map(FieldPath::from_schema_pointer)
                    .collect(),
                Some(Value::String(pointer)) => vec![FieldPath::from_schema_pointer(pointer)],
                _ => return Err(malformed(path, "multiField without `definition` pointers")),
            };
            Ok(UiElement::MultiField {
                name: map
                    .get("name")
                    .and_then(Value::as_str)
                    .map_or_else(|| widget.clone(), str::to_string),
                widget,
                paths,
            })
        }
        other => Err(malformed(
            path,
            format!("unknown layout entry type `{}`", other.unwrap_or("")),
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_keyed_tree() {
        let ui = UiSchema::from_json(&json!({
            "summary": { "ui:widget": "TextArea", "ui:options": { "rows": 6 } },
            "address": {
                "properties": { "state": { "ui:widget": "Select", "ui:title": "State" } }
            },
            "tasks": { "items": { "title": { "ui:disabled": true } } },
            "ghost": { "ui:widget": "Text" },
            "note": "inert"
        }))
        .unwrap();

        assert_eq!(ui.widget_at(&FieldPath::root().key("summary")), Some("TextArea"));
        let state = ui.at(&FieldPath::parse_html("address--state").unwrap()).unwrap();
        assert_eq!(state.title.as_deref(), Some("State"));
        let title = ui.at(&FieldPath::parse_html("tasks[3]--title").unwrap()).unwrap();
        assert!(title.disabled);
        assert!(ui.child("note").is_none());
        assert_eq!(ui.widget_hints().len(), 3);
    }

    #[test]
    fn test_section_layout() {
        let ui = UiSchema::from_json(&json!([
            {
                "type": "section",
                "name": "Report Type",
                "label": "3. Report Type",
                "children": [
                    { "type": "field", "definition": "/properties/report_type", "widget": "Radio" },
                    { "type": "null", "definition": "/properties/signature_block/properties/signed_date" }
                ]
            },
            {
                "type": "section",
                "name": "SectionC",
                "children": [{
                    "type": "multiField",
                    "widget": "Budget424aSectionC",
                    "definition": ["/properties/activity_line_items", "/properties/total_non_federal_resources"]
                }]
            }
        ]))
        .unwrap();

        assert_eq!(ui.sections.len(), 2);
        assert_eq!(ui.sections[0].label, "3. Report Type");
        assert_eq!(ui.sections[1].label, "SectionC");
        assert_eq!(ui.widget_at(&FieldPath::root().key("report_type")), Some("Radio"));
        let signed = FieldPath::parse_html("signature_block--signed_date").unwrap();
        assert!(ui.at(&signed).unwrap().disabled);
        assert_eq!(ui.multi_fields(), vec![("Budget424aSectionC", "Budget424aSectionC")]);
    }

    #[test]
    fn test_malformed_layout() {
        assert!(UiSchema::from_json(&json!([{ "type": "field" }])).is_err());
        assert!(UiSchema::from_json(&json!([{ "type": "widget" }])).is_err());
        assert!(UiSchema::from_json(&json!("TextArea")).is_err());
        assert_eq!(UiSchema::from_json(&Value::Null).unwrap(), UiSchema::new());
    }
}

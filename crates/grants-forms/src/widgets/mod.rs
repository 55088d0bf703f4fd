//! Widget resolution
//!
//! Every field maps to exactly one [`WidgetKind`]. Hints written in a UI
//! schema are the only place a widget name arrives as text, so that is the
//! only place [`UnknownWidgetType`] can be raised.

pub mod budget;
pub mod render;
pub mod state;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;
use std::str::FromStr;
use thiserror::Error;

use crate::attachments::Attachment;
use crate::config::EngineConfig;
use crate::normalize::{stringify_or_empty, EnumOption, FALSE_STRING, TRUE_STRING};
use crate::schema::{FormSchema, SchemaKind};

pub use budget::{apply_budget_totals, compute_totals, format_amount, parse_amount, BudgetLayout, BudgetTable};
pub use render::{render_widget, render_widget_kind, wrap_section, FieldMeta, RenderNode};
pub use state::{FieldChange, WidgetInstance, WidgetState};

/// Widget name with no registered kind
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("Unknown widget type: {0}")]
pub struct UnknownWidgetType(pub String);

/// Registered widget kinds
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum WidgetKind {
    Text,
    TextArea,
    Checkbox,
    Radio,
    Select,
    MultiSelect,
    Attachment,
    AttachmentArray,
    Budget424aSectionA,
    Budget424aSectionC,
    Budget424aSectionD,
    Budget424aSectionE,
    Fieldset,
    Print,
    PrintAttachment,
}

impl WidgetKind {
    pub const ALL: [WidgetKind; 15] = [
        WidgetKind::Text,
        WidgetKind::TextArea,
        WidgetKind::Checkbox,
        WidgetKind::Radio,
        WidgetKind::Select,
        WidgetKind::MultiSelect,
        WidgetKind::Attachment,
        WidgetKind::AttachmentArray,
        WidgetKind::Budget424aSectionA,
        WidgetKind::Budget424aSectionC,
        WidgetKind::Budget424aSectionD,
        WidgetKind::Budget424aSectionE,
        WidgetKind::Fieldset,
        WidgetKind::Print,
        WidgetKind::PrintAttachment,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            WidgetKind::Text => "Text",
            WidgetKind::TextArea => "TextArea",
            WidgetKind::Checkbox => "Checkbox",
            WidgetKind::Radio => "Radio",
            WidgetKind::Select => "Select",
            WidgetKind::MultiSelect => "MultiSelect",
            WidgetKind::Attachment => "Attachment",
            WidgetKind::AttachmentArray => "AttachmentArray",
            WidgetKind::Budget424aSectionA => "Budget424aSectionA",
            WidgetKind::Budget424aSectionC => "Budget424aSectionC",
            WidgetKind::Budget424aSectionD => "Budget424aSectionD",
            WidgetKind::Budget424aSectionE => "Budget424aSectionE",
            WidgetKind::Fieldset => "Fieldset",
            WidgetKind::Print => "Print",
            WidgetKind::PrintAttachment => "PrintAttachment",
        }
    }

    /// Widgets that commit on change rather than on blur
    pub fn is_discrete(&self) -> bool {
        matches!(
            self,
            WidgetKind::Checkbox
                | WidgetKind::Radio
                | WidgetKind::Select
                | WidgetKind::MultiSelect
                | WidgetKind::Attachment
                | WidgetKind::AttachmentArray
        )
    }

    /// Free-text widgets that surface `minLength`/`maxLength`
    pub fn is_text_like(&self) -> bool {
        matches!(self, WidgetKind::Text | WidgetKind::TextArea)
    }

    pub fn is_budget(&self) -> bool {
        matches!(
            self,
            WidgetKind::Budget424aSectionA
                | WidgetKind::Budget424aSectionC
                | WidgetKind::Budget424aSectionD
                | WidgetKind::Budget424aSectionE
        )
    }

    pub fn is_print(&self) -> bool {
        matches!(self, WidgetKind::Print | WidgetKind::PrintAttachment)
    }

    /// Widgets offering a fixed option set
    pub fn has_options(&self) -> bool {
        matches!(
            self,
            WidgetKind::Checkbox | WidgetKind::Radio | WidgetKind::Select | WidgetKind::MultiSelect
        )
    }
}

impl FromStr for WidgetKind {
    type Err = UnknownWidgetType;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        WidgetKind::ALL
            .iter()
            .copied()
            .find(|kind| kind.as_str() == s)
            .ok_or_else(|| UnknownWidgetType(s.to_string()))
    }
}

impl fmt::Display for WidgetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Widget options resolved from the schema, the UI schema and context
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct WidgetOptions {
    pub label: Option<String>,
    pub description: Option<String>,
    pub enum_options: Vec<EnumOption>,
    /// Label of the leading "nothing selected" option
    pub empty_value: Option<String>,
    /// Attachments known for the application
    pub attachments: Vec<Attachment>,
    /// `ui:options` passed through verbatim
    pub extra: Map<String, Value>,
}

/// Everything one widget needs for one render pass
#[derive(Debug, Clone, PartialEq)]
pub struct WidgetProps {
    pub id: String,
    pub schema: FormSchema,
    pub ui_options: WidgetOptions,
    pub value: Option<Value>,
    pub required: bool,
    pub disabled: bool,
    pub raw_errors: Vec<String>,
}

impl WidgetProps {
    pub fn new(id: impl Into<String>, schema: FormSchema) -> Self {
        Self {
            id: id.into(),
            schema,
            ui_options: WidgetOptions::default(),
            value: None,
            required: false,
            disabled: false,
            raw_errors: Vec::new(),
        }
    }

    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    pub fn min_length(&self) -> Option<usize> {
        self.schema.as_scalar()?.min_length
    }

    pub fn max_length(&self) -> Option<usize> {
        self.schema.as_scalar()?.max_length
    }
}

/// True for `format: uuid` strings (single attachment reference)
pub fn is_attachment_schema(schema: &FormSchema) -> bool {
    schema.format() == Some("uuid")
}

/// True for arrays of `format: uuid` strings
pub fn is_attachment_array_schema(schema: &FormSchema) -> bool {
    matches!(schema.as_array().and_then(|a| a.items.as_deref()), Some(item) if is_attachment_schema(item))
}

/// Pick the widget for a field. An explicit hint always wins.
pub fn determine_widget_kind(
    hint: Option<&str>,
    schema: &FormSchema,
    config: &EngineConfig,
) -> Result<WidgetKind, UnknownWidgetType> {
    if let Some(hint) = hint {
        return hint.parse();
    }
    let kind = match &schema.kind {
        SchemaKind::Object(_) => WidgetKind::Fieldset,
        SchemaKind::Array(array) => match array.items.as_deref() {
            Some(item) if is_attachment_schema(item) => WidgetKind::AttachmentArray,
            Some(item) if item.enum_values().map_or(false, |e| !e.is_empty()) => {
                WidgetKind::MultiSelect
            }
            _ => WidgetKind::Select,
        },
        SchemaKind::Scalar(scalar) => {
            if is_attachment_schema(schema) {
                WidgetKind::Attachment
            } else if scalar.enum_values.as_ref().map_or(false, |e| !e.is_empty()) {
                WidgetKind::Select
            } else if schema.is_boolean() {
                WidgetKind::Checkbox
            } else if scalar.max_length.map_or(false, |n| n > config.long_text_threshold) {
                WidgetKind::TextArea
            } else {
                WidgetKind::Text
            }
        }
    };
    Ok(kind)
}

/// Option set rendered by discrete widgets: the schema enum exactly, or
/// `true`/`false` for booleans.
pub fn enum_options(schema: &FormSchema, config: &EngineConfig) -> Vec<EnumOption> {
    let boolean_label = |b: bool| {
        if b {
            config.boolean_labels.yes.clone()
        } else {
            config.boolean_labels.no.clone()
        }
    };
    if schema.is_boolean() {
        let values: Vec<bool> = match schema.enum_values() {
            Some(values) => values.iter().filter_map(Value::as_bool).collect(),
            None => vec![true, false],
        };
        return values
            .into_iter()
            .map(|b| {
                let sentinel = if b { TRUE_STRING } else { FALSE_STRING };
                EnumOption::new(Value::String(sentinel.into()), boolean_label(b))
            })
            .collect();
    }
    schema
        .enum_values()
        .unwrap_or_default()
        .iter()
        .map(|v| EnumOption::new(v.clone(), stringify_or_empty(Some(v))))
        .collect()
}

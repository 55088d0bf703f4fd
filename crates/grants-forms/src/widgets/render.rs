//! Widget rendering into a serializable node tree

use serde::Serialize;
use serde_json::Value;
use uuid::Uuid;

use super::budget::{render_budget, BudgetTable, SECTION_A, SECTION_C, SECTION_D, SECTION_E};
use super::{enum_options, UnknownWidgetType, WidgetKind, WidgetProps};
use crate::config::EngineConfig;
use crate::normalize::{option_matches, stringify_or_empty, EnumOption, TRUE_STRING};
use crate::schema::ScalarType;

/// Label used for an attachment id with no known file
pub const UNKNOWN_ATTACHMENT_LABEL: &str = "(Previously uploaded file)";

/// Attributes shared by every field node
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FieldMeta {
    pub id: String,
    pub label: String,
    pub description: Option<String>,
    pub required: bool,
    pub disabled: bool,
    pub errors: Vec<String>,
    /// Ids of the hint and error elements describing the input
    pub described_by: Vec<String>,
}

impl FieldMeta {
    fn from_props(props: &WidgetProps) -> Self {
        let label = props
            .ui_options
            .label
            .clone()
            .or_else(|| props.schema.title.clone())
            .unwrap_or_else(|| {
                props
                    .id
                    .rsplit("--")
                    .next()
                    .unwrap_or(props.id.as_str())
                    .to_string()
            });
        let description = props
            .ui_options
            .description
            .clone()
            .or_else(|| props.schema.description.clone());

        let mut described_by = Vec::new();
        if description.is_some() {
            described_by.push(format!("{}-hint", props.id));
        }
        if !props.raw_errors.is_empty() {
            described_by.push(format!("{}-error-message", props.id));
        }
        Self {
            id: props.id.clone(),
            label,
            description,
            required: props.required,
            disabled: props.disabled || props.schema.is_null_type(),
            errors: props.raw_errors.clone(),
            described_by,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChoiceOption {
    pub value: String,
    pub label: String,
    pub selected: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AttachmentView {
    pub id: String,
    pub file_name: String,
    pub download_path: Option<String>,
}

/// Rendered form tree
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "node", rename_all = "snake_case")]
pub enum RenderNode {
    Input {
        #[serde(flatten)]
        meta: FieldMeta,
        widget: WidgetKind,
        input_type: &'static str,
        value: String,
        min_length: Option<usize>,
        max_length: Option<usize>,
        pattern: Option<String>,
    },
    Choice {
        #[serde(flatten)]
        meta: FieldMeta,
        widget: WidgetKind,
        multiple: bool,
        empty_label: Option<String>,
        options: Vec<ChoiceOption>,
    },
    Attachments {
        #[serde(flatten)]
        meta: FieldMeta,
        multiple: bool,
        files: Vec<AttachmentView>,
    },
    BudgetTable(BudgetTable),
    Section {
        id: String,
        label: String,
        description: Option<String>,
        children: Vec<RenderNode>,
    },
    Print {
        #[serde(flatten)]
        meta: FieldMeta,
        widget: WidgetKind,
        text: String,
    },
}

impl RenderNode {
    /// Field id, or the section id for sections
    pub fn id(&self) -> &str {
        match self {
            RenderNode::Input { meta, .. }
            | RenderNode::Choice { meta, .. }
            | RenderNode::Attachments { meta, .. }
            | RenderNode::Print { meta, .. } => &meta.id,
            RenderNode::BudgetTable(table) => &table.id,
            RenderNode::Section { id, .. } => id,
        }
    }

    pub fn children(&self) -> &[RenderNode] {
        match self {
            RenderNode::Section { children, .. } => children,
            _ => &[],
        }
    }

    /// Depth-first search by id
    pub fn find(&self, id: &str) -> Option<&RenderNode> {
        if self.id() == id {
            return Some(self);
        }
        self.children().iter().find_map(|child| child.find(id))
    }
}

/// Render a widget named by a UI hint.
pub fn render_widget(props: &WidgetProps, widget_type: &str) -> Result<RenderNode, UnknownWidgetType> {
    let kind: WidgetKind = widget_type.parse()?;
    Ok(render_widget_kind(props, kind))
}

fn input_type(props: &WidgetProps) -> &'static str {
    match props.schema.format() {
        Some("email") => "email",
        Some("date") => "date",
        Some("date-time") => "datetime-local",
        _ => match props.schema.as_scalar().map(|s| s.scalar_type) {
            Some(ScalarType::Integer) | Some(ScalarType::Number) => "number",
            _ => "text",
        },
    }
}

fn choice_options(props: &WidgetProps, kind: WidgetKind) -> Vec<EnumOption> {
    if !props.ui_options.enum_options.is_empty() {
        return props.ui_options.enum_options.clone();
    }
    if kind == WidgetKind::Checkbox && props.schema.is_boolean() && props.schema.enum_values().is_none() {
        // bare boolean checkbox
        return vec![EnumOption::new(
            Value::String(TRUE_STRING.into()),
            FieldMeta::from_props(props).label,
        )];
    }
    enum_options(&props.schema, &EngineConfig::default())
}

fn attachment_ids(value: Option<&Value>) -> Vec<String> {
    match value {
        Some(Value::String(id)) if !id.is_empty() => vec![id.clone()],
        Some(Value::Array(ids)) => ids.iter().filter_map(Value::as_str).map(str::to_string).collect(),
        _ => Vec::new(),
    }
}

fn attachment_views(props: &WidgetProps) -> Vec<AttachmentView> {
    attachment_ids(props.value.as_ref())
        .into_iter()
        .map(|id| {
            let known = Uuid::parse_str(&id)
                .ok()
                .and_then(|uuid| props.ui_options.attachments.iter().find(|a| a.id == uuid));
            match known {
                Some(attachment) => AttachmentView {
                    id,
                    file_name: attachment.file_name.clone(),
                    download_path: attachment.download_path.clone(),
                },
                None => AttachmentView {
                    id,
                    file_name: UNKNOWN_ATTACHMENT_LABEL.to_string(),
                    download_path: None,
                },
            }
        })
        .collect()
}

fn print_text(props: &WidgetProps) -> String {
    let options = if props.ui_options.enum_options.is_empty() {
        enum_options(&props.schema, &EngineConfig::default())
    } else {
        props.ui_options.enum_options.clone()
    };
    if options.is_empty() {
        return match props.value.as_ref() {
            Some(Value::Array(items)) => items
                .iter()
                .map(|item| stringify_or_empty(Some(item)))
                .collect::<Vec<_>>()
                .join(", "),
            other => stringify_or_empty(other),
        };
    }
    options
        .iter()
        .filter(|o| option_matches(&o.value, props.value.as_ref()))
        .map(|o| o.label.as_str())
        .collect::<Vec<_>>()
        .join(", ")
}

/// Render a widget of a known kind. Exhaustive over [`WidgetKind`].
pub fn render_widget_kind(props: &WidgetProps, kind: WidgetKind) -> RenderNode {
    let meta = FieldMeta::from_props(props);
    match kind {
        WidgetKind::Text | WidgetKind::TextArea => RenderNode::Input {
            widget: kind,
            input_type: if kind == WidgetKind::TextArea { "textarea" } else { input_type(props) },
            value: stringify_or_empty(props.value.as_ref()),
            min_length: props.min_length(),
            max_length: props.max_length(),
            pattern: props.schema.as_scalar().and_then(|s| s.pattern.clone()),
            meta,
        },
        WidgetKind::Checkbox | WidgetKind::Radio | WidgetKind::Select | WidgetKind::MultiSelect => {
            let options = choice_options(props, kind)
                .into_iter()
                .map(|o| ChoiceOption {
                    selected: option_matches(&o.value, props.value.as_ref()),
                    value: stringify_or_empty(Some(&o.value)),
                    label: o.label,
                })
                .collect();
            RenderNode::Choice {
                widget: kind,
                multiple: kind == WidgetKind::MultiSelect
                    || (kind == WidgetKind::Checkbox && props.schema.as_array().is_some()),
                empty_label: if kind == WidgetKind::Select {
                    props.ui_options.empty_value.clone()
                } else {
                    None
                },
                options,
                meta,
            }
        }
        WidgetKind::Attachment | WidgetKind::AttachmentArray => RenderNode::Attachments {
            multiple: kind == WidgetKind::AttachmentArray,
            files: attachment_views(props),
            meta,
        },
        WidgetKind::Budget424aSectionA => RenderNode::BudgetTable(render_budget(props, &SECTION_A)),
        WidgetKind::Budget424aSectionC => RenderNode::BudgetTable(render_budget(props, &SECTION_C)),
        WidgetKind::Budget424aSectionD => RenderNode::BudgetTable(render_budget(props, &SECTION_D)),
        WidgetKind::Budget424aSectionE => RenderNode::BudgetTable(render_budget(props, &SECTION_E)),
        WidgetKind::Fieldset => RenderNode::Section {
            id: props.id.clone(),
            label: meta.label,
            description: meta.description,
            children: Vec::new(),
        },
        WidgetKind::Print => RenderNode::Print {
            widget: kind,
            text: print_text(props),
            meta,
        },
        WidgetKind::PrintAttachment => RenderNode::Print {
            widget: kind,
            text: attachment_views(props)
                .into_iter()
                .map(|a| a.file_name)
                .collect::<Vec<_>>()
                .join(", "),
            meta,
        },
    }
}

/// Group rendered fields under a titled section.
pub fn wrap_section(
    label: &str,
    field_name: &str,
    section_fields: Vec<RenderNode>,
    description: Option<&str>,
) -> RenderNode {
    RenderNode::Section {
        id: format!("form-section-{}", field_name),
        label: label.to_string(),
        description: description.map(str::to_string),
        children: section_fields,
    }
}

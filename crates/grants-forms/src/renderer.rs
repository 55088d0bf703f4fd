//! Whole-form rendering
//!
//! Walks a [`ProcessedForm`] against one value snapshot and produces the
//! section/field tree. Conditionals are resolved against that snapshot, so
//! required flags always reflect the current answers.

use serde_json::Value;
use tracing::debug;

use crate::attachments::Attachment;
use crate::config::EngineConfig;
use crate::path::{FieldPath, HTML_DELIMITER};
use crate::processor::ProcessedForm;
use crate::schema::{FormSchema, SchemaKind};
use crate::ui_schema::{UiElement, UiSchema, UiSection};
use crate::validate::ValidationErrors;
use crate::widgets::budget::BudgetLayout;
use crate::widgets::{
    determine_widget_kind, enum_options, render_widget_kind, wrap_section, RenderNode, UnknownWidgetType,
    WidgetKind, WidgetOptions, WidgetProps,
};

/// Inputs shared by one render pass
struct Pass<'a> {
    schema: &'a FormSchema,
    ui: &'a UiSchema,
    value: &'a Value,
    errors: &'a ValidationErrors,
    attachments: &'a [Attachment],
}

/// Renders processed forms into [`RenderNode`] trees
#[derive(Debug, Clone, Default)]
pub struct FormRenderer {
    config: EngineConfig,
}

fn is_under(key: &str, prefix: &str) -> bool {
    prefix.is_empty()
        || key == prefix
        || key
            .strip_prefix(prefix)
            .map_or(false, |rest| rest.starts_with(HTML_DELIMITER) || rest.starts_with('['))
}

/// Errors under any of `prefixes`, as `<field>: <message>` so budget tables
/// can route them to cells. Errors on a prefix itself stay table-level.
fn budget_errors(errors: &ValidationErrors, prefixes: &[String]) -> Vec<String> {
    let mut out = Vec::new();
    for (field, messages) in errors {
        if !prefixes.iter().any(|p| is_under(field, p)) {
            continue;
        }
        for message in messages {
            if prefixes.iter().any(|p| p == field) {
                out.push(message.clone());
            } else {
                out.push(format!("{}: {}", field, message));
            }
        }
    }
    out
}

fn section_label(ui: Option<&UiSchema>, schema: &FormSchema, path: &FieldPath) -> String {
    ui.and_then(|u| u.title.clone())
        .or_else(|| schema.title.clone())
        .or_else(|| path.last_key().map(str::to_string))
        .unwrap_or_default()
}

impl FormRenderer {
    pub fn new(config: EngineConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Render every section of `form` for `value`.
    pub fn render(
        &self,
        form: &ProcessedForm,
        value: &Value,
        errors: &ValidationErrors,
        attachments: &[Attachment],
    ) -> Result<Vec<RenderNode>, UnknownWidgetType> {
        let effective = form.effective_schema(value);
        let pass = Pass {
            schema: &effective,
            ui: &form.ui_schema,
            value,
            errors,
            attachments,
        };
        if form.ui_schema.has_layout() {
            return form
                .ui_schema
                .sections
                .iter()
                .map(|section| self.render_section(&pass, section))
                .collect();
        }
        match effective.as_object() {
            Some(root) => root
                .properties
                .iter()
                .map(|(key, child)| self.render_node(&pass, child, &FieldPath::root().key(key), root.is_required(key)))
                .collect(),
            None => Ok(Vec::new()),
        }
    }

    fn render_section(&self, pass: &Pass<'_>, section: &UiSection) -> Result<RenderNode, UnknownWidgetType> {
        let mut children = Vec::new();
        for element in &section.elements {
            match element {
                UiElement::Section(nested) => children.push(self.render_section(pass, nested)?),
                UiElement::Field { path, .. } => {
                    let Some(schema) = pass.schema.at_path(path) else {
                        debug!(path = %path, "layout field has no schema counterpart");
                        continue;
                    };
                    children.push(self.render_node(pass, schema, path, self.required_at(pass, path))?);
                }
                UiElement::MultiField { name, widget, paths } => {
                    let kind: WidgetKind = widget.parse()?;
                    let mut prefixes: Vec<String> = paths.iter().map(FieldPath::to_html).collect();
                    if let Some(layout) = BudgetLayout::for_widget(kind) {
                        if layout.group.is_none() {
                            prefixes.push(layout.totals.to_string());
                        }
                    }
                    let mut props = WidgetProps::new(if kind.is_budget() { "" } else { name.as_str() }, pass.schema.clone())
                        .with_value(pass.value.clone());
                    props.raw_errors = budget_errors(pass.errors, &prefixes);
                    children.push(render_widget_kind(&props, kind));
                }
            }
        }
        Ok(wrap_section(&section.label, &section.name, children, section.description.as_deref()))
    }

    fn required_at(&self, pass: &Pass<'_>, path: &FieldPath) -> bool {
        let (Some(parent), Some(key)) = (path.parent(), path.last_key()) else {
            return false;
        };
        pass.schema
            .at_path(&parent)
            .and_then(FormSchema::as_object)
            .map_or(false, |o| o.effective(parent.get(pass.value)).is_required(key))
    }

    fn render_node(
        &self,
        pass: &Pass<'_>,
        schema: &FormSchema,
        path: &FieldPath,
        required: bool,
    ) -> Result<RenderNode, UnknownWidgetType> {
        let ui = pass.ui.at(path);
        let hint = ui.and_then(|u| u.widget.as_deref());

        if hint.is_none() {
            if let SchemaKind::Array(array) = &schema.kind {
                if let Some(item_schema) = array.items.as_deref().filter(|i| i.as_object().is_some()) {
                    return self.render_repeated(pass, schema, item_schema, path);
                }
            }
        }

        let kind = determine_widget_kind(hint, schema, &self.config)?;
        match (&schema.kind, kind) {
            (SchemaKind::Object(object), WidgetKind::Fieldset) => {
                let object = object.effective(path.get(pass.value));
                let mut children = Vec::new();
                for (key, child) in object.properties.iter() {
                    children.push(self.render_node(pass, child, &path.key(key), object.is_required(key))?);
                }
                Ok(wrap_section(
                    &section_label(ui, schema, path),
                    &path.to_html(),
                    children,
                    schema.description.as_deref(),
                ))
            }
            _ => Ok(self.render_field(pass, schema, path, required, kind)),
        }
    }

    /// One section per present array element, at least one
    fn render_repeated(
        &self,
        pass: &Pass<'_>,
        schema: &FormSchema,
        item_schema: &FormSchema,
        path: &FieldPath,
    ) -> Result<RenderNode, UnknownWidgetType> {
        let present = path.get(pass.value).and_then(Value::as_array).map_or(0, Vec::len);
        let label = section_label(pass.ui.at(path), schema, path);
        let mut items = Vec::new();
        for i in 0..present.max(1) {
            let item_path = path.index(i);
            let node = self.render_node(pass, item_schema, &item_path, false)?;
            items.push(match node {
                RenderNode::Section { children, description, .. } => wrap_section(
                    &format!("{} {}", label, i + 1),
                    &item_path.to_html(),
                    children,
                    description.as_deref(),
                ),
                other => other,
            });
        }
        Ok(wrap_section(&label, &path.to_html(), items, schema.description.as_deref()))
    }

    fn render_field(
        &self,
        pass: &Pass<'_>,
        schema: &FormSchema,
        path: &FieldPath,
        required: bool,
        kind: WidgetKind,
    ) -> RenderNode {
        let ui = pass.ui.at(path);
        let id = path.to_html();
        let mut props = WidgetProps::new(id.clone(), schema.clone());
        props.ui_options = WidgetOptions {
            label: ui.and_then(|u| u.title.clone()),
            description: None,
            enum_options: enum_options(schema, &self.config),
            empty_value: (kind == WidgetKind::Select).then(|| self.config.select_empty_label.clone()),
            attachments: if matches!(
                kind,
                WidgetKind::Attachment | WidgetKind::AttachmentArray | WidgetKind::PrintAttachment
            ) {
                pass.attachments.to_vec()
            } else {
                Vec::new()
            },
            extra: ui.map(|u| u.options.clone()).unwrap_or_default(),
        };
        props.value = path.get(pass.value).cloned();
        props.required = required;
        props.disabled = ui.map_or(false, |u| u.disabled);
        props.raw_errors = if kind.is_budget() {
            let mut prefixes = vec![id.clone()];
            if let Some(layout) = BudgetLayout::for_widget(kind).filter(|l| l.group.is_none()) {
                prefixes.push(layout.totals.to_string());
            }
            budget_errors(pass.errors, &prefixes)
        } else {
            pass.errors.get(&id).cloned().unwrap_or_default()
        };
        render_widget_kind(&props, kind)
    }
}

//! Schema Processor
//!
//! Pairs a parsed [`FormSchema`] with its [`UiSchema`], rejecting structural
//! problems up front so a form is never partially rendered:
//! - `required` entries (including conditional branches) naming no property
//! - widget hints naming no registered widget

use serde::Serialize;
use serde_json::Value;
use tracing::debug;

use crate::config::FormLimits;
use crate::path::FieldPath;
use crate::schema::{FormSchema, SchemaError, SchemaKind};
use crate::ui_schema::{UiElement, UiSchema, UiSection};
use crate::widgets::budget::BudgetLayout;
use crate::widgets::{is_attachment_array_schema, is_attachment_schema, WidgetKind};

/// Navigation entry for a form section
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NavItem {
    pub href: String,
    pub text: String,
}

/// A validated schema pair, ready to render
#[derive(Debug, Clone, PartialEq)]
pub struct ProcessedForm {
    pub form_schema: FormSchema,
    pub ui_schema: UiSchema,
    controlling: Vec<String>,
}

/// Parse and validate a schema document pair with default limits.
pub fn process_form_schema(form_schema: &Value, ui_schema: &Value) -> Result<ProcessedForm, SchemaError> {
    process_form_schema_with_limits(form_schema, ui_schema, &FormLimits::default())
}

pub fn process_form_schema_with_limits(
    form_schema: &Value,
    ui_schema: &Value,
    limits: &FormLimits,
) -> Result<ProcessedForm, SchemaError> {
    let form_schema = FormSchema::from_json_with_limits(form_schema, limits)?;
    let ui_schema = UiSchema::from_json(ui_schema)?;
    ProcessedForm::new(form_schema, ui_schema)
}

fn pointer_or_root(pointer: &str) -> String {
    if pointer.is_empty() {
        "/".to_string()
    } else {
        pointer.to_string()
    }
}

fn check_required(schema: &FormSchema, pointer: &str) -> Result<(), SchemaError> {
    match &schema.kind {
        SchemaKind::Object(object) => {
            for key in &object.required {
                if !object.properties.contains(key) {
                    return Err(SchemaError::MissingRequiredProperty {
                        path: pointer_or_root(pointer),
                        property: key.clone(),
                    });
                }
            }
            for rule in &object.conditionals {
                for patch in std::iter::once(&rule.then).chain(rule.otherwise.as_ref()) {
                    for key in &patch.required {
                        let declared = object.properties.contains(key)
                            || patch.properties.iter().any(|(k, _)| k == key);
                        if !declared {
                            return Err(SchemaError::MissingRequiredProperty {
                                path: pointer_or_root(pointer),
                                property: key.clone(),
                            });
                        }
                    }
                    for (key, child) in &patch.properties {
                        check_required(child, &format!("{}/properties/{}", pointer, key))?;
                    }
                }
            }
            for (key, child) in object.properties.iter() {
                check_required(child, &format!("{}/properties/{}", pointer, key))?;
            }
            Ok(())
        }
        SchemaKind::Array(array) => match &array.items {
            Some(items) => check_required(items, &format!("{}/items", pointer)),
            None => Ok(()),
        },
        SchemaKind::Scalar(_) => Ok(()),
    }
}

fn check_widget(path: &FieldPath, widget: &str) -> Result<(), SchemaError> {
    widget
        .parse::<WidgetKind>()
        .map(|_| ())
        .map_err(|_| SchemaError::UnknownWidget {
            path: path.to_html(),
            widget: widget.to_string(),
        })
}

fn check_layout(elements: &[UiElement], schema: &FormSchema) -> Result<(), SchemaError> {
    for element in elements {
        match element {
            UiElement::MultiField { widget, paths, .. } => {
                if paths.iter().any(|p| schema.at_path(p).is_some()) {
                    check_widget(paths.first().unwrap_or(&FieldPath::root()), widget)?;
                } else {
                    debug!(widget = %widget, "layout widget has no schema counterpart");
                }
            }
            UiElement::Section(section) => check_layout(&section.elements, schema)?,
            UiElement::Field { .. } => {}
        }
    }
    Ok(())
}

fn collect_controlling(schema: &FormSchema, pointer: &str, out: &mut Vec<String>) {
    match &schema.kind {
        SchemaKind::Object(object) => {
            for rule in &object.conditionals {
                for field in rule.condition.fields() {
                    let controlling = format!("{}/properties/{}", pointer, field);
                    if !out.contains(&controlling) {
                        out.push(controlling);
                    }
                }
            }
            for (key, child) in object.properties.iter() {
                collect_controlling(child, &format!("{}/properties/{}", pointer, key), out);
            }
        }
        SchemaKind::Array(array) => {
            if let Some(items) = &array.items {
                collect_controlling(items, &format!("{}/items", pointer), out);
            }
        }
        SchemaKind::Scalar(_) => {}
    }
}

fn collect_required(schema: &FormSchema, path: &FieldPath, out: &mut Vec<FieldPath>) {
    if let SchemaKind::Object(object) = &schema.kind {
        for (key, child) in object.properties.iter() {
            if !object.is_required(key) {
                continue;
            }
            let child_path = path.key(key);
            match &child.kind {
                SchemaKind::Object(_) => collect_required(child, &child_path, out),
                _ => out.push(child_path),
            }
        }
    }
}

fn print_hints(schema: &FormSchema, path: &FieldPath, ui: &mut UiSchema) {
    if ui
        .widget_at(path)
        .and_then(|w| w.parse::<WidgetKind>().ok())
        .map_or(false, |kind| kind.is_budget())
    {
        return;
    }
    match &schema.kind {
        SchemaKind::Object(object) => {
            for (key, child) in object.properties.iter() {
                print_hints(child, &path.key(key), ui);
            }
        }
        SchemaKind::Array(array) => match array.items.as_deref() {
            Some(items) if items.as_object().is_some() => print_hints(items, &path.index(0), ui),
            _ => {
                let kind = if is_attachment_array_schema(schema) {
                    WidgetKind::PrintAttachment
                } else {
                    WidgetKind::Print
                };
                ui.node_mut(path).widget = Some(kind.as_str().to_string());
            }
        },
        SchemaKind::Scalar(_) => {
            let kind = if is_attachment_schema(schema) {
                WidgetKind::PrintAttachment
            } else {
                WidgetKind::Print
            };
            ui.node_mut(path).widget = Some(kind.as_str().to_string());
        }
    }
}

fn layout_nav(sections: &[UiSection], out: &mut Vec<NavItem>) {
    for section in sections {
        if section.elements.is_empty() || section.label.is_empty() {
            continue;
        }
        out.push(NavItem {
            href: format!("form-section-{}", section.name),
            text: section.label.clone(),
        });
        let nested: Vec<UiSection> = section
            .elements
            .iter()
            .filter_map(|e| match e {
                UiElement::Section(s) => Some(s.clone()),
                _ => None,
            })
            .collect();
        if nested.len() == section.elements.len() {
            layout_nav(&nested, out);
        }
    }
}

impl ProcessedForm {
    pub fn new(form_schema: FormSchema, ui_schema: UiSchema) -> Result<Self, SchemaError> {
        check_required(&form_schema, "")?;

        for (path, widget) in ui_schema.widget_hints() {
            if form_schema.at_path(&path).is_some() {
                check_widget(&path, widget)?;
            } else {
                debug!(path = %path, widget, "ignoring ui hint with no schema counterpart");
            }
        }
        for section in &ui_schema.sections {
            check_layout(&section.elements, &form_schema)?;
        }

        let mut controlling = Vec::new();
        collect_controlling(&form_schema, "", &mut controlling);
        Ok(Self {
            form_schema,
            ui_schema,
            controlling,
        })
    }

    /// Schema with every conditional resolved against `value`
    pub fn effective_schema(&self, value: &Value) -> FormSchema {
        self.form_schema.resolve(value)
    }

    /// Schema pointers of fields that conditionals read
    pub fn controlling_fields(&self) -> &[String] {
        &self.controlling
    }

    pub fn is_controlling(&self, path: &FieldPath) -> bool {
        let pointer = path.to_schema_pointer();
        self.controlling.iter().any(|c| *c == pointer)
    }

    /// UI schema for the read-only print view; the editable one is untouched.
    pub fn print_ui_schema(&self) -> UiSchema {
        let mut ui = self.ui_schema.clone();
        print_hints(&self.form_schema, &FieldPath::root(), &mut ui);
        ui
    }

    pub fn print_variant(&self) -> ProcessedForm {
        ProcessedForm {
            form_schema: self.form_schema.clone(),
            ui_schema: self.print_ui_schema(),
            controlling: self.controlling.clone(),
        }
    }

    /// Budget tables used anywhere in the form
    pub fn budget_layouts(&self) -> Vec<&'static BudgetLayout> {
        let hinted = self.ui_schema.widget_hints().into_iter().map(|(_, w)| w);
        let layout = self.ui_schema.multi_fields().into_iter().map(|(_, w)| w);
        let mut out: Vec<&'static BudgetLayout> = Vec::new();
        for widget in hinted.chain(layout) {
            let Some(found) = widget.parse::<WidgetKind>().ok().and_then(BudgetLayout::for_widget) else {
                continue;
            };
            if !out.iter().any(|l| l.widget == found.widget) {
                out.push(found);
            }
        }
        out
    }

    /// Leaves required regardless of conditionals, through required objects
    pub fn required_paths(&self) -> Vec<FieldPath> {
        let mut out = Vec::new();
        collect_required(&self.form_schema, &FieldPath::root(), &mut out);
        out
    }

    pub fn nav_sections(&self) -> Vec<NavItem> {
        let mut out = Vec::new();
        if self.ui_schema.has_layout() {
            layout_nav(&self.ui_schema.sections, &mut out);
            return out;
        }
        if let Some(root) = self.form_schema.as_object() {
            for (key, child) in root.properties.iter() {
                if let (Some(_), Some(title)) = (child.as_object(), &child.title) {
                    out.push(NavItem {
                        href: format!("form-section-{}", key),
                        text: title.clone(),
                    });
                }
            }
        }
        out
    }
}

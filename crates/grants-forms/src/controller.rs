//! Interactive form session
//!
//! Owns the value snapshot and one [`WidgetInstance`] per rendered field.
//! Widgets only ever hand values upward as [`FieldChange`]s; the controller
//! writes them into the snapshot, re-resolves conditionals when a
//! controlling field moved, and settles every touched widget against a fresh
//! validation pass.

use serde_json::Value;
use std::collections::BTreeMap;
use tracing::debug;

use crate::attachments::Attachment;
use crate::config::EngineConfig;
use crate::path::{FieldPath, Segment};
use crate::processor::ProcessedForm;
use crate::renderer::FormRenderer;
use crate::schema::{FormSchema, SchemaKind};
use crate::validate::{validate_form_value, ValidationErrors};
use crate::widgets::{determine_widget_kind, FieldChange, RenderNode, UnknownWidgetType, WidgetInstance, WidgetKind};
use crate::Result;

pub struct FormController {
    form: ProcessedForm,
    config: EngineConfig,
    value: Value,
    effective: FormSchema,
    widgets: BTreeMap<String, WidgetInstance>,
    errors: ValidationErrors,
}

fn json_pointer(path: &FieldPath) -> String {
    path.segments()
        .iter()
        .map(|s| match s {
            Segment::Key(k) => format!("/{}", k.replace('~', "~0").replace('/', "~1")),
            Segment::Index(i) => format!("/{}", i),
        })
        .collect()
}

/// Remove the answer at `path`; array slots are nulled to keep indices stable.
fn clear_at(path: &FieldPath, value: &mut Value) {
    let (Some(parent), Some(last)) = (path.parent(), path.segments().last()) else {
        *value = Value::Object(Default::default());
        return;
    };
    match (value.pointer_mut(&json_pointer(&parent)), last) {
        (Some(Value::Object(map)), Segment::Key(k)) => {
            map.remove(k);
        }
        (Some(Value::Array(items)), Segment::Index(i)) => {
            if let Some(slot) = items.get_mut(*i) {
                *slot = Value::Null;
            }
        }
        _ => {}
    }
}

impl FormController {
    pub fn new(form: ProcessedForm, value: Value, config: EngineConfig) -> std::result::Result<Self, UnknownWidgetType> {
        let value = if value.is_null() {
            Value::Object(Default::default())
        } else {
            value
        };
        let effective = form.effective_schema(&value);
        let mut controller = Self {
            form,
            config,
            value,
            effective,
            widgets: BTreeMap::new(),
            errors: ValidationErrors::new(),
        };
        controller.rebuild_widgets()?;
        controller.errors = validate_form_value(&controller.form.form_schema, &controller.value, &controller.config.limits);
        Ok(controller)
    }

    pub fn value(&self) -> &Value {
        &self.value
    }

    pub fn effective_schema(&self) -> &FormSchema {
        &self.effective
    }

    pub fn widget(&self, id: &str) -> Option<&WidgetInstance> {
        self.widgets.get(id)
    }

    pub fn widget_ids(&self) -> impl Iterator<Item = &str> {
        self.widgets.keys().map(String::as_str)
    }

    /// Every current validation error, shown or not
    pub fn errors(&self) -> &ValidationErrors {
        &self.errors
    }

    /// Errors of touched widgets only
    pub fn visible_errors(&self) -> ValidationErrors {
        self.widgets
            .values()
            .filter(|w| !w.state.errors().is_empty())
            .map(|w| (w.id.clone(), w.state.errors().to_vec()))
            .collect()
    }

    /// Feed raw input to a widget. Returns whether the value was committed.
    pub fn input(&mut self, id: &str, value: Option<Value>) -> Result<bool> {
        let change = match self.widgets.get_mut(id) {
            Some(widget) => widget.change(value),
            None => {
                debug!(field = id, "input for unknown widget");
                return Ok(false);
            }
        };
        self.commit(change)
    }

    /// Focus left a widget
    pub fn blur(&mut self, id: &str) -> Result<bool> {
        let change = match self.widgets.get_mut(id) {
            Some(widget) => widget.blur(),
            None => return Ok(false),
        };
        self.commit(change)
    }

    fn commit(&mut self, change: Option<FieldChange>) -> Result<bool> {
        match change {
            Some(change) => {
                self.apply(change)?;
                Ok(true)
            }
            None => Ok(false),
        }
    }

    /// Write a change into the snapshot and revalidate.
    pub fn apply(&mut self, change: FieldChange) -> Result<()> {
        let path = FieldPath::parse_html(&change.id)?;
        match change.value {
            Some(v) => path.set(&mut self.value, v)?,
            None => clear_at(&path, &mut self.value),
        }

        let reshaped = path.max_index().is_some();
        if self.form.is_controlling(&path) {
            debug!(field = %path, "controlling field changed, resolving conditionals");
            self.effective = self.form.effective_schema(&self.value);
            self.rebuild_widgets()?;
        } else if reshaped {
            self.rebuild_widgets()?;
        }

        self.errors = validate_form_value(&self.form.form_schema, &self.value, &self.config.limits);
        for widget in self.widgets.values_mut() {
            let errors = self.errors.get(&widget.id).cloned().unwrap_or_default();
            widget.settle(errors);
        }
        Ok(())
    }

    /// Render with only the errors users have earned by touching a field.
    pub fn render(&self, renderer: &FormRenderer, attachments: &[Attachment]) -> std::result::Result<Vec<RenderNode>, UnknownWidgetType> {
        renderer.render(&self.form, &self.value, &self.visible_errors(), attachments)
    }

    fn rebuild_widgets(&mut self) -> std::result::Result<(), UnknownWidgetType> {
        let mut found = Vec::new();
        self.collect_widgets(&self.effective, &FieldPath::root(), &mut found)?;

        let mut previous = std::mem::take(&mut self.widgets);
        for (path, kind, disabled) in found {
            let id = path.to_html();
            let widget = match previous.remove(&id) {
                Some(existing) if existing.kind == kind => existing,
                _ => {
                    let mut widget = WidgetInstance::new(id.clone(), kind, path.get(&self.value).cloned());
                    widget.disabled = disabled;
                    widget
                }
            };
            self.widgets.insert(id, widget);
        }
        Ok(())
    }

    fn collect_widgets(
        &self,
        schema: &FormSchema,
        path: &FieldPath,
        out: &mut Vec<(FieldPath, WidgetKind, bool)>,
    ) -> std::result::Result<(), UnknownWidgetType> {
        let ui = self.form.ui_schema.at(path);
        let hint = ui.and_then(|u| u.widget.as_deref());
        let hinted = hint.map(str::parse::<WidgetKind>).transpose()?;
        // budget tables edit their cells as individual fields
        let container = hinted.map_or(true, |k| k.is_budget() || k == WidgetKind::Fieldset);

        match &schema.kind {
            SchemaKind::Object(object) if container => {
                let object = object.effective(path.get(&self.value));
                for (key, child) in object.properties.iter() {
                    self.collect_widgets(child, &path.key(key), out)?;
                }
            }
            SchemaKind::Array(array) if container && array.items.as_ref().map_or(false, |i| i.as_object().is_some()) => {
                if let Some(item_schema) = array.items.as_deref() {
                    let present = path.get(&self.value).and_then(Value::as_array).map_or(0, Vec::len);
                    for i in 0..present.max(1) {
                        self.collect_widgets(item_schema, &path.index(i), out)?;
                    }
                }
            }
            _ => {
                let kind = match hinted {
                    Some(k) if !k.is_budget() => k,
                    _ => determine_widget_kind(None, schema, &self.config)?,
                };
                let disabled = ui.map_or(false, |u| u.disabled) || schema.is_null_type();
                out.push((path.clone(), kind, disabled));
            }
        }
        Ok(())
    }
}

//! Render command

use super::read_json;
use crate::output::{OutputFormat, RenderedForm};
use anyhow::Result;
use grants_forms::processor::process_form_schema_with_limits;
use grants_forms::{validate_form_value, EngineConfig, FormRenderer, ValidationErrors};
use serde_json::Value;
use std::path::Path;

pub fn handle(
    schema: &Path,
    ui: Option<&Path>,
    data: Option<&Path>,
    print: bool,
    engine: &EngineConfig,
    format: OutputFormat,
) -> Result<()> {
    let schema = read_json(schema)?;
    let ui = ui.map(read_json).transpose()?.unwrap_or(Value::Null);
    let value = data.map(read_json).transpose()?.unwrap_or_else(|| Value::Object(Default::default()));

    let mut form = process_form_schema_with_limits(&schema, &ui, &engine.limits)?;
    let errors = if data.is_some() && !print {
        validate_form_value(&form.form_schema, &value, &engine.limits)
    } else {
        ValidationErrors::new()
    };
    if print {
        form = form.print_variant();
    }

    let renderer = FormRenderer::new(engine.clone());
    let rendered = RenderedForm {
        nav: form.nav_sections(),
        sections: renderer.render(&form, &value, &errors, &[])?,
    };
    format.print(&rendered);
    Ok(())
}

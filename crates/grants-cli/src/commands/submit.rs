//! Submit command

use super::{read_json, ApiClient};
use crate::output::OutputFormat;
use anyhow::{bail, Result};
use grants_forms::{EngineConfig, FormActionPipeline, FormActionResult, SubmittedFormData};
use std::path::Path;
use std::sync::Arc;

pub async fn handle(
    form_id: &str,
    application_id: &str,
    data: &Path,
    client: ApiClient,
    engine: EngineConfig,
    format: OutputFormat,
) -> Result<()> {
    if client.token.is_none() {
        bail!("no API token: pass --token, set GRANTS_API_TOKEN or run `grants config set token <token>`");
    }
    let submitted = SubmittedFormData::from_json_object(&read_json(data)?)?;

    let client = Arc::new(client);
    let pipeline = FormActionPipeline::new(client.clone(), client.clone(), client, engine);
    let result = pipeline
        .handle_form_action(FormActionResult::new(application_id, form_id), &submitted)
        .await;

    format.print(&result);
    if result.error {
        bail!("form action failed; run with RUST_LOG=debug for details");
    }
    Ok(())
}

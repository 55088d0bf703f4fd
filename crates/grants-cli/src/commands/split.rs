//! Split command

use crate::output::OutputFormat;
use anyhow::{Context, Result};
use grants_common::split_markup_file;
use std::path::Path;

pub fn handle(file: &Path, at: usize, format: OutputFormat) -> Result<()> {
    let split = split_markup_file(file, at).with_context(|| format!("splitting {}", file.display()))?;
    format.print(&split);
    Ok(())
}

//! Output formatting

use clap::ValueEnum;
use grants_common::MarkupSplit;
use grants_forms::{FormActionResult, NavItem, RenderNode};
use serde::Serialize;
use std::fmt::Write;

#[derive(Debug, Clone, Copy, ValueEnum)]
pub enum OutputFormat {
    Pretty,
    Json,
    Yaml,
}

/// Human-readable rendering for `--format pretty`
pub trait Pretty {
    fn pretty(&self) -> String;
}

impl OutputFormat {
    pub fn print<T: Serialize + Pretty>(&self, data: &T) {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
            }
            OutputFormat::Yaml => {
                println!("{}", serde_yaml::to_string(data).unwrap_or_default());
            }
            OutputFormat::Pretty => {
                println!("{}", data.pretty());
            }
        }
    }
}

/// A rendered form with its navigation
#[derive(Debug, Serialize)]
pub struct RenderedForm {
    pub nav: Vec<NavItem>,
    pub sections: Vec<RenderNode>,
}

fn write_node(out: &mut String, node: &RenderNode, depth: usize) {
    let indent = "  ".repeat(depth);
    let _ = match node {
        RenderNode::Section { label, children, .. } => {
            let _ = writeln!(out, "{}== {} ==", indent, label);
            for child in children {
                write_node(out, child, depth + 1);
            }
            Ok(())
        }
        RenderNode::Input { meta, widget, value, .. } => {
            writeln!(out, "{}{}{} [{}]: {}", indent, meta.label, required_mark(meta.required), widget, value)
        }
        RenderNode::Choice { meta, widget, options, .. } => {
            let listed: Vec<String> = options
                .iter()
                .map(|o| if o.selected { format!("(*) {}", o.label) } else { format!("( ) {}", o.label) })
                .collect();
            writeln!(out, "{}{}{} [{}]: {}", indent, meta.label, required_mark(meta.required), widget, listed.join("  "))
        }
        RenderNode::Attachments { meta, files, .. } => {
            let names: Vec<&str> = files.iter().map(|f| f.file_name.as_str()).collect();
            writeln!(out, "{}{}{} [files]: {}", indent, meta.label, required_mark(meta.required), names.join(", "))
        }
        RenderNode::Print { meta, text, .. } => writeln!(out, "{}{}: {}", indent, meta.label, text),
        RenderNode::BudgetTable(table) => {
            let _ = writeln!(out, "{}[{}] {}", indent, table.widget, table.columns.join(" | "));
            for row in table.rows.iter().chain(std::iter::once(&table.totals)) {
                let text: Vec<&str> = row.text.iter().map(|c| c.value.as_str()).collect();
                let mut cells: Vec<&str> = row.cells.iter().map(|c| c.value.as_str()).collect();
                if let Some(total) = &row.total {
                    cells.push(total.value.as_str());
                }
                let _ = writeln!(out, "{}  {} {} | {}", indent, row.label, text.join(" "), cells.join(" | "));
            }
            for label in table.error_labels() {
                let _ = writeln!(out, "{}  ! check {}", indent, label);
            }
            Ok(())
        }
    };
    if let Some(errors) = node_errors(node) {
        for error in errors {
            let _ = writeln!(out, "{}  ! {}", indent, error);
        }
    }
}

fn node_errors(node: &RenderNode) -> Option<&[String]> {
    match node {
        RenderNode::Input { meta, .. }
        | RenderNode::Choice { meta, .. }
        | RenderNode::Attachments { meta, .. }
        | RenderNode::Print { meta, .. } => Some(&meta.errors),
        RenderNode::BudgetTable(table) => Some(&table.errors),
        RenderNode::Section { .. } => None,
    }
}

fn required_mark(required: bool) -> &'static str {
    if required {
        " *"
    } else {
        ""
    }
}

impl Pretty for RenderedForm {
    fn pretty(&self) -> String {
        let mut out = String::new();
        if !self.nav.is_empty() {
            let _ = writeln!(out, "Sections:");
            for item in &self.nav {
                let _ = writeln!(out, "  #{} {}", item.href, item.text);
            }
            let _ = writeln!(out);
        }
        for section in &self.sections {
            write_node(&mut out, section, 0);
        }
        out
    }
}

impl Pretty for FormActionResult {
    fn pretty(&self) -> String {
        let mut out = String::new();
        let status = if self.error {
            "failed"
        } else if self.saved {
            "saved"
        } else {
            "not saved"
        };
        let _ = writeln!(out, "Form {} for application {}: {}", self.form_id, self.application_id, status);
        if let Some(errors) = &self.validation_errors {
            for (field, messages) in errors {
                for message in messages {
                    let _ = writeln!(out, "  {}: {}", field, message);
                }
            }
        }
        out
    }
}

impl Pretty for MarkupSplit {
    fn pretty(&self) -> String {
        if self.post_split.is_empty() {
            return self.pre_split.clone();
        }
        format!("{}\n--- split ---\n{}", self.pre_split, self.post_split)
    }
}

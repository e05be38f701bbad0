//! Rendering command results as text, JSON, YAML or tables

use crate::cli::OutputFormat as CliFormat;
use anyhow::Result;
use colored::Colorize;
use comfy_table::Table;
use serde::Serialize;
use serde_json::Value;
use voltctl_core::{OperationOutcome, OutcomeStatus};

/// Structured output formats
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputFormat {
    #[default]
    Json,
    Yaml,
    Table,
}

impl CliFormat {
    /// The structured format to use, or `None` for human-readable text
    pub fn structured(self) -> Option<OutputFormat> {
        match self {
            CliFormat::Auto => None,
            CliFormat::Json => Some(OutputFormat::Json),
            CliFormat::Yaml => Some(OutputFormat::Yaml),
            CliFormat::Table => Some(OutputFormat::Table),
        }
    }
}

pub fn print_output<T: Serialize>(data: T, format: OutputFormat) -> Result<()> {
    let json_value = serde_json::to_value(data)?;

    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(&json_value)?);
        }
        OutputFormat::Yaml => {
            print!("{}", serde_yaml::to_string(&json_value)?);
        }
        OutputFormat::Table => {
            println!("{}", render_table(&json_value));
        }
    }

    Ok(())
}

/// Print an operation outcome.
///
/// Human-readable failures go to stderr so scripts can keep stdout clean.
pub fn print_outcome(outcome: &OperationOutcome, format: CliFormat) -> Result<()> {
    if let Some(format) = format.structured() {
        return print_output(outcome, format);
    }

    let detail = outcome.detail.as_deref().unwrap_or_default();
    if outcome.is_success() {
        println!("{} {}", "ok".green().bold(), detail);
    } else {
        eprintln!(
            "{}{} {}: {}",
            status_label(&outcome.status).red().bold(),
            ":".bold(),
            outcome.operation,
            detail
        );
    }
    Ok(())
}

fn status_label(status: &OutcomeStatus) -> String {
    match status {
        OutcomeStatus::Success => "ok".to_string(),
        OutcomeStatus::Failed { status: Some(code) } => format!("failed (status {})", code),
        OutcomeStatus::Failed { status: None } => "failed".to_string(),
        OutcomeStatus::TimedOut => "timed out".to_string(),
        OutcomeStatus::Cancelled => "cancelled".to_string(),
        OutcomeStatus::Interrupted => "interrupted".to_string(),
    }
}

fn render_table(value: &Value) -> String {
    match value {
        Value::Array(arr) if !arr.is_empty() => {
            let mut table = Table::new();

            // Get headers from first object
            if let Value::Object(first) = &arr[0] {
                let headers: Vec<String> = first.keys().cloned().collect();
                table.set_header(&headers);

                for item in arr {
                    if let Value::Object(obj) = item {
                        let row: Vec<String> = headers
                            .iter()
                            .map(|h| format_value(obj.get(h).unwrap_or(&Value::Null)))
                            .collect();
                        table.add_row(row);
                    }
                }
            } else {
                table.set_header(vec!["Value"]);
                for item in arr {
                    table.add_row(vec![format_value(item)]);
                }
            }

            table.to_string()
        }
        Value::Object(obj) => {
            let mut table = Table::new();
            table.set_header(vec!["Key", "Value"]);

            for (key, val) in obj {
                table.add_row(vec![key.clone(), format_value(val)]);
            }

            table.to_string()
        }
        _ => format_value(value),
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::String(s) => s.clone(),
        Value::Array(arr) => format!("[{} items]", arr.len()),
        Value::Object(obj) => format!("{{{} fields}}", obj.len()),
    }
}

use std::io::{self, Write};

use serde_json::{json, Value};

use crate::cli::OutputFormat;
use crate::commands::CommandResult;
use crate::error::CliError;

pub fn render(result: &CommandResult, format: OutputFormat, pretty: bool) -> Result<(), CliError> {
    let stdout = io::stdout();
    let mut out = stdout.lock();

    match format {
        OutputFormat::Json => {
            let document = json!({
                "command": result.command,
                "data": result.data,
                "warnings": result.warnings,
                "failed_sources": result.failed_sources,
            });
            let payload = if pretty {
                serde_json::to_string_pretty(&document)?
            } else {
                serde_json::to_string(&document)?
            };
            writeln!(out, "{payload}")?;
        }
        OutputFormat::Table => render_table(&mut out, result)?,
    }

    out.flush()?;
    Ok(())
}

fn render_table(out: &mut impl Write, result: &CommandResult) -> Result<(), CliError> {
    writeln!(out, "command : {}", result.command)?;

    if let Some(sources) = result.data.get("sources").and_then(Value::as_object) {
        writeln!(out, "sources :")?;
        for (name, value) in sources {
            let status = value.get("status").and_then(Value::as_str).unwrap_or("-");
            match value.get("message").and_then(Value::as_str) {
                Some(message) => writeln!(out, "  {name:<11}{status:<9}{message}")?,
                None => writeln!(out, "  {name:<11}{status}")?,
            }
        }
    }

    if !result.warnings.is_empty() {
        writeln!(out, "warnings:")?;
        for warning in &result.warnings {
            writeln!(out, "  - {warning}")?;
        }
    }

    writeln!(out, "data:")?;
    let pretty_data = serde_json::to_string_pretty(&result.data)?;
    for line in pretty_data.lines() {
        writeln!(out, "  {line}")?;
    }

    Ok(())
}

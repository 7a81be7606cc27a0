pub mod csv_out;
pub mod json;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => json::print_json(value),
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// Render a warning that is either a plain string (component envelope) or a
/// `{kind, source, message}` object (full valuation).
pub(crate) fn warning_text(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Object(map) => {
            let message = map.get("message").and_then(Value::as_str)?;
            match map.get("source").and_then(Value::as_str) {
                Some(source) => Some(format!("[{}] {}", source, message)),
                None => Some(message.to_string()),
            }
        }
        _ => None,
    }
}

/// True for a serialized `ValuationResult`.
pub(crate) fn is_valuation(value: &Value) -> bool {
    value.get("blended_value").is_some() && value.get("scenarios").is_some()
}

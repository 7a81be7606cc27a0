use serde_json::Value;
use std::io::{self, Write};
use tracing::debug;

use super::is_valuation;

/// Pretty JSON, newline-terminated. Decimal fields stay as strings so no
/// precision is lost downstream.
pub fn render_json(value: &Value) -> serde_json::Result<String> {
    let mut text = serde_json::to_string_pretty(value)?;
    text.push('\n');
    Ok(text)
}

/// Write the document to stdout. A closed pipe (`| head`) is not an error.
pub fn print_json(value: &Value) {
    if is_valuation(value) {
        let warnings = value
            .get("warnings")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        let trail = value
            .pointer("/trail/entries")
            .and_then(Value::as_array)
            .map_or(0, Vec::len);
        debug!(warnings, trail, "writing valuation document");
    }

    let text = match render_json(value) {
        Ok(t) => t,
        Err(e) => {
            eprintln!("JSON serialization error: {}", e);
            return;
        }
    };
    let mut out = io::stdout().lock();
    if let Err(e) = out.write_all(text.as_bytes()).and_then(|_| out.flush()) {
        if e.kind() != io::ErrorKind::BrokenPipe {
            eprintln!("failed to write output: {}", e);
        }
    }
}

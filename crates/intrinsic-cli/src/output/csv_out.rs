use serde_json::Value;
use std::io;

/// Write output as CSV to stdout.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            if super::is_valuation(value) {
                write_valuation_csv(&mut wtr, value);
            } else if let Some(Value::Object(result)) = map.get("result") {
                // Two-column CSV: field, value
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in result {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            } else if let Some(Value::Array(peers)) = map.get("peers") {
                write_array_csv(&mut wtr, peers);
            } else {
                let _ = wtr.write_record(["field", "value"]);
                for (key, val) in map {
                    let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
                }
            }
        }
        Value::Array(arr) => {
            write_array_csv(&mut wtr, arr);
        }
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

/// One row per method plus one row per scenario.
fn write_valuation_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, value: &Value) {
    let _ = wtr.write_record(["symbol", "component", "value", "weight"]);
    let symbol = value.get("symbol").map(format_csv_value).unwrap_or_default();
    if let Some(Value::Array(contributions)) = value.pointer("/blend/contributions") {
        for c in contributions {
            let _ = wtr.write_record([
                symbol.as_str(),
                &c.get("method").map(format_csv_value).unwrap_or_default(),
                &c.get("value").map(format_csv_value).unwrap_or_default(),
                &c.get("weight").map(format_csv_value).unwrap_or_default(),
            ]);
        }
    }
    if let Some(Value::Array(scenarios)) = value.get("scenarios") {
        for s in scenarios {
            let kind = s.get("kind").map(format_csv_value).unwrap_or_default();
            let _ = wtr.write_record([
                symbol.as_str(),
                &format!("dcf_{}", kind.to_lowercase()),
                &s.get("intrinsic_per_share").map(format_csv_value).unwrap_or_default(),
                "",
            ]);
        }
    }
    let _ = wtr.write_record([
        symbol.as_str(),
        "blended",
        &value.get("blended_value").map(format_csv_value).unwrap_or_default(),
        &value
            .pointer("/confidence/score")
            .map(format_csv_value)
            .unwrap_or_default(),
    ]);
}

fn write_array_csv(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
    if arr.is_empty() {
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<&str> = first.keys().map(|k| k.as_str()).collect();
        let _ = wtr.write_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(*h).map(format_csv_value).unwrap_or_default())
                    .collect();
                let _ = wtr.write_record(&row);
            }
        }
    } else {
        for item in arr {
            let _ = wtr.write_record([&format_csv_value(item)]);
        }
    }
}

fn format_csv_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => String::new(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

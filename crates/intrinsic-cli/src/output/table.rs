use serde_json::Value;
use tabled::{builder::Builder, Table};

use super::{is_valuation, warning_text};

/// Format output as a table using the tabled crate.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if is_valuation(value) {
                print_valuation(value);
            } else if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else {
                print_flat_object(value);
            }
        }
        Value::Array(arr) => {
            print_array_table(arr);
        }
        _ => {
            println!("{}", value);
        }
    }
}

/// Headline, per-method and per-scenario tables for a full valuation.
fn print_valuation(value: &Value) {
    let field = |ptr: &str| value.pointer(ptr).map(format_value).unwrap_or_default();

    let mut headline = Builder::default();
    headline.push_record(["Field", "Value"]);
    headline.push_record(["symbol", &field("/symbol")]);
    headline.push_record(["valuation_date", &field("/valuation_date")]);
    headline.push_record(["blended_value", &field("/blended_value")]);
    headline.push_record(["market_price", &field("/market_price")]);
    headline.push_record(["upside", &field("/upside")]);
    headline.push_record(["confidence", &field("/confidence/score")]);
    println!("{}", Table::from(headline));

    if let Some(Value::Array(contributions)) = value.pointer("/blend/contributions") {
        let mut methods = Builder::default();
        methods.push_record(["Method", "Value", "Weight", "Included"]);
        for c in contributions {
            methods.push_record([
                c.get("method").map(format_value).unwrap_or_default(),
                c.get("value").map(format_value).unwrap_or_default(),
                c.get("weight").map(format_value).unwrap_or_default(),
                c.get("included").map(format_value).unwrap_or_default(),
            ]);
        }
        println!("\n{}", Table::from(methods));
    }

    if let Some(Value::Array(scenarios)) = value.get("scenarios") {
        let mut rows = Builder::default();
        rows.push_record(["Scenario", "Per share", "WACC", "Terminal g", "TV share"]);
        for s in scenarios {
            rows.push_record([
                s.get("kind").map(format_value).unwrap_or_default(),
                s.get("intrinsic_per_share").map(format_value).unwrap_or_default(),
                s.get("wacc").map(format_value).unwrap_or_default(),
                s.get("terminal_growth").map(format_value).unwrap_or_default(),
                s.get("terminal_value_share").map(format_value).unwrap_or_default(),
            ]);
        }
        println!("\n{}", Table::from(rows));
    }

    print_warnings(value.get("warnings"));
}

fn print_result_table(result: &Value, envelope: &serde_json::Map<String, Value>) {
    match result {
        Value::Object(res_map) => {
            let mut builder = Builder::default();
            builder.push_record(["Field", "Value"]);
            for (key, val) in res_map {
                builder.push_record([key.as_str(), &format_value(val)]);
            }
            println!("{}", Table::from(builder));
        }
        Value::Array(items) => {
            for item in items {
                print_flat_object(item);
            }
        }
        _ => print_flat_object(&Value::Object(envelope.clone())),
    }

    print_warnings(envelope.get("warnings"));

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_warnings(warnings: Option<&Value>) {
    if let Some(Value::Array(warnings)) = warnings {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(warning_text) {
                println!("  - {}", w);
            }
        }
    }
}

fn print_flat_object(value: &Value) {
    if let Value::Object(map) = value {
        let mut builder = Builder::default();
        builder.push_record(["Field", "Value"]);
        for (key, val) in map {
            builder.push_record([key.as_str(), &format_value(val)]);
        }
        println!("{}", Table::from(builder));
    }
}

fn print_array_table(arr: &[Value]) {
    if arr.is_empty() {
        println!("(empty)");
        return;
    }

    if let Some(Value::Object(first)) = arr.first() {
        let headers: Vec<String> = first.keys().cloned().collect();
        let mut builder = Builder::default();
        builder.push_record(&headers);

        for item in arr {
            if let Value::Object(map) = item {
                let row: Vec<String> = headers
                    .iter()
                    .map(|h| map.get(h.as_str()).map(format_value).unwrap_or_default())
                    .collect();
                builder.push_record(row);
            }
        }

        println!("{}", Table::from(builder));
    } else {
        for item in arr {
            println!("{}", format_value(item));
        }
    }
}

fn format_value(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

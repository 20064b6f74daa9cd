use serde_json::{Map, Value};
use tabled::{builder::Builder, Table};

/// Arrays longer than this are summarised instead of printed in full.
const MAX_INLINE_ITEMS: usize = 12;

/// Format output as tables using the tabled crate.
///
/// Scalars and short vectors go into a Field/Value table; every array of
/// objects in the result (allocations, frontier points, sector effects,
/// rebalance events) gets its own table underneath.
pub fn print_table(value: &Value) {
    match value {
        Value::Object(map) => {
            if let Some(result) = map.get("result") {
                print_result_table(result, map);
            } else if let Some(Value::Array(results)) = map.get("results") {
                for item in results {
                    print_table(item);
                    println!();
                }
            } else {
                print_object(map, None);
            }
        }
        Value::Array(arr) => print_rows(arr),
        _ => println!("{}", value),
    }
}

fn print_result_table(result: &Value, envelope: &Map<String, Value>) {
    match result {
        Value::Object(res_map) => print_object(res_map, None),
        other => println!("{}", format_value(other)),
    }

    if let Some(Value::Array(warnings)) = envelope.get("warnings") {
        if !warnings.is_empty() {
            println!("\nWarnings:");
            for w in warnings.iter().filter_map(Value::as_str) {
                println!("  - {}", w);
            }
        }
    }

    if let Some(Value::String(meth)) = envelope.get("methodology") {
        println!("\nMethodology: {}", meth);
    }
}

fn print_object(map: &Map<String, Value>, title: Option<&str>) {
    let mut builder = Builder::default();
    builder.push_record(["Field", "Value"]);
    let mut nested: Vec<(&str, &Value)> = Vec::new();

    for (key, val) in map {
        match val {
            Value::Array(arr) if matches!(arr.first(), Some(Value::Object(_))) => {
                nested.push((key.as_str(), val));
            }
            Value::Object(_) => nested.push((key.as_str(), val)),
            _ => builder.push_record([key.as_str(), &format_value(val)]),
        }
    }

    if let Some(t) = title {
        println!("\n{}:", t);
    }
    println!("{}", Table::from(builder));

    for (key, val) in nested {
        match val {
            Value::Array(arr) => {
                println!("\n{}:", key);
                print_rows(arr);
            }
            Value::Object(inner) => print_object(inner, Some(key)),
            _ => {}
        }
    }
}

fn print_rows(arr: &[Value]) {
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
        Value::Number(n) => match n.as_f64() {
            Some(x) if n.is_f64() => format!("{:.6}", x),
            _ => n.to_string(),
        },
        Value::Bool(b) => b.to_string(),
        Value::Null => "-".to_string(),
        // Simulated paths and full terminal distributions
        Value::Array(arr) if arr.len() > MAX_INLINE_ITEMS => {
            format!("[{} items]", arr.len())
        }
        Value::Array(arr) => {
            let items: Vec<String> = arr.iter().map(format_value).collect();
            items.join(", ")
        }
        Value::Object(_) => serde_json::to_string(value).unwrap_or_default(),
    }
}

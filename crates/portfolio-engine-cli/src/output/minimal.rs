use serde_json::Value;

/// Print just the headline number of a result.
///
/// Each operation has one field that answers the question it was asked:
/// weights for an optimization, VaR for a risk report, terminal value for a
/// simulation. Falls back to the first field of the result object.
pub fn print_minimal(value: &Value) {
    let result_obj = value
        .as_object()
        .and_then(|m| m.get("result"))
        .unwrap_or(value);

    // Batch backtests: one line per labelled run
    if let Some(Value::Array(results)) = value.get("results") {
        for item in results {
            let label = item
                .pointer("/result/label")
                .and_then(Value::as_str)
                .unwrap_or("-");
            match (item.pointer("/result/final_value"), item.get("error")) {
                (Some(v), _) => println!("{}: {}", label, format_minimal(v)),
                (None, Some(e)) => println!("{}: error {}", label, format_minimal(e)),
                _ => println!("{}: null", label),
            }
        }
        return;
    }

    let priority_keys = [
        "weights",
        "historical_var",
        "total_excess_return",
        "mean_terminal_value",
        "final_value",
        "expected_returns",
    ];

    if let Value::Object(map) = result_obj {
        // Frontier: the tangency point's weights
        if let (Some(Value::Array(points)), Some(idx)) = (
            map.get("points"),
            map.get("max_sharpe_index").and_then(Value::as_u64),
        ) {
            if let Some(w) = points.get(idx as usize).and_then(|p| p.get("weights")) {
                println!("{}", format_minimal(w));
                return;
            }
        }

        for key in &priority_keys {
            if let Some(val) = map.get(*key) {
                if !val.is_null() {
                    println!("{}", format_minimal(val));
                    return;
                }
            }
        }

        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }

    println!("{}", format_minimal(result_obj));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        Value::Array(items) if items.iter().all(Value::is_number) => items
            .iter()
            .map(format_minimal)
            .collect::<Vec<_>>()
            .join(" "),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

use serde_json::Value;
use std::io;

use super::primary_rows;

/// Write output as CSV to stdout.
///
/// Results carrying a row table (allocations, frontier points, backtest
/// points, sector attribution) emit that table; anything else becomes a
/// two-column field/value listing.
pub fn print_csv(value: &Value) {
    let stdout = io::stdout();
    let mut wtr = csv::Writer::from_writer(stdout.lock());

    match value {
        Value::Object(map) => {
            if let Some(Value::Object(result)) = map.get("result") {
                match primary_rows(result) {
                    Some((_, rows)) => write_rows(&mut wtr, rows),
                    None => write_fields(&mut wtr, result),
                }
            } else if let Some(Value::Array(results)) = map.get("results") {
                write_batch(&mut wtr, results);
            } else {
                write_fields(&mut wtr, map);
            }
        }
        Value::Array(arr) => write_rows(&mut wtr, arr),
        _ => {
            let _ = wtr.write_record([&format_csv_value(value)]);
        }
    }

    let _ = wtr.flush();
}

fn write_fields(wtr: &mut csv::Writer<io::StdoutLock<'_>>, map: &serde_json::Map<String, Value>) {
    let _ = wtr.write_record(["field", "value"]);
    for (key, val) in map {
        let _ = wtr.write_record([key.as_str(), &format_csv_value(val)]);
    }
}

/// One summary row per backtest in a batch run.
fn write_batch(wtr: &mut csv::Writer<io::StdoutLock<'_>>, results: &[Value]) {
    let _ = wtr.write_record([
        "label",
        "final_value",
        "annualized_return",
        "annualized_volatility",
        "sharpe_ratio",
        "max_drawdown",
        "total_turnover",
        "error",
    ]);
    for item in results {
        let res = item.get("result");
        let field = |k: &str| res.and_then(|r| r.get(k)).map(format_csv_value).unwrap_or_default();
        let summary = |k: &str| {
            res.and_then(|r| r.get("summary"))
                .and_then(|s| s.get(k))
                .map(format_csv_value)
                .unwrap_or_default()
        };
        let error = item.get("error").map(format_csv_value).unwrap_or_default();
        let _ = wtr.write_record([
            field("label"),
            field("final_value"),
            summary("annualized_return"),
            summary("annualized_volatility"),
            summary("sharpe_ratio"),
            summary("max_drawdown"),
            field("total_turnover"),
            error,
        ]);
    }
}

fn write_rows(wtr: &mut csv::Writer<io::StdoutLock<'_>>, arr: &[Value]) {
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
        Value::Array(items) if items.iter().all(Value::is_number) => items
            .iter()
            .map(|v| v.to_string())
            .collect::<Vec<_>>()
            .join(";"),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

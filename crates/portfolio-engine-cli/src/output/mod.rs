pub mod csv_out;
pub mod minimal;
pub mod table;

use crate::OutputFormat;
use serde_json::Value;

/// Dispatch output to the appropriate formatter.
pub fn format_output(format: &OutputFormat, value: &Value) {
    match format {
        OutputFormat::Json => match serde_json::to_string_pretty(value) {
            Ok(s) => println!("{}", s),
            Err(e) => eprintln!("JSON serialization error: {}", e),
        },
        OutputFormat::Table => table::print_table(value),
        OutputFormat::Csv => csv_out::print_csv(value),
        OutputFormat::Minimal => minimal::print_minimal(value),
    }
}

/// First field of `result` holding a non-empty array of objects, e.g.
/// `allocations`, `points`, `sector_attribution`.
pub(crate) fn primary_rows(result: &serde_json::Map<String, Value>) -> Option<(&str, &[Value])> {
    const PREFERRED: [&str; 5] = [
        "allocations",
        "points",
        "sector_attribution",
        "component_risk",
        "rebalances",
    ];
    let is_rows = |v: &Value| matches!(v, Value::Array(a) if matches!(a.first(), Some(Value::Object(_))));

    PREFERRED
        .iter()
        .filter_map(|k| result.get_key_value(*k))
        .chain(result.iter())
        .find(|(_, v)| is_rows(v))
        .and_then(|(k, v)| v.as_array().map(|a| (k.as_str(), a.as_slice())))
}

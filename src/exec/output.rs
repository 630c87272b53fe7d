//! Captured text → JSON value.

use serde_json::Value;

/// Structured JSON when the trimmed text is a JSON object/array, otherwise
/// its lines. Empty output is `null`.
pub fn parse_output(output: &str) -> Value {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        return Value::Null;
    }
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str(trimmed) {
            return value;
        }
    }
    Value::Array(
        trimmed
            .lines()
            .map(|line| Value::String(line.to_string()))
            .collect(),
    )
}

use serde_json::Value;

/// Print just the headline verdict from a result bundle.
///
/// Heuristic: look for the well-known verdict fields in priority order,
/// then fall back to the first field of the object.
pub fn print_minimal(value: &Value) {
    let priority_paths = [
        &["risk", "level"][..],
        &["risk", "overall_score"][..],
        &["compliance", "status"][..],
        &["status"][..],
        &["overall_score"][..],
        &["anomalies_detected"][..],
    ];

    for path in &priority_paths {
        let mut cursor = value;
        let mut found = true;
        for key in *path {
            match cursor.get(key) {
                Some(next) if !next.is_null() => cursor = next,
                _ => {
                    found = false;
                    break;
                }
            }
        }
        if found {
            println!("{}", format_minimal(cursor));
            return;
        }
    }

    if let Value::Object(map) = value {
        if let Some((key, val)) = map.iter().next() {
            println!("{}: {}", key, format_minimal(val));
            return;
        }
    }
    println!("{}", format_minimal(value));
}

fn format_minimal(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Null => "null".to_string(),
        _ => serde_json::to_string(value).unwrap_or_default(),
    }
}

//! Pulling JSON out of free-form model output.

/// Extract the JSON object embedded in a model reply.
///
/// Handles bare objects, markdown code fences, and prose around the object
/// (first `{` to last `}`). Returns `None` when no object bounds exist.
pub fn extract_json_object(text: &str) -> Option<&str> {
    let trimmed = text.trim();

    if let Some(start) = trimmed.find("```json") {
        let after = &trimmed[start + 7..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    if let Some(start) = trimmed.find("```") {
        let after = &trimmed[start + 3..];
        if let Some(end) = after.find("```") {
            let inner = after[..end].trim();
            if inner.starts_with('{') {
                return Some(inner);
            }
        }
    }

    match (trimmed.find('{'), trimmed.rfind('}')) {
        (Some(start), Some(end)) if end > start => Some(&trimmed[start..=end]),
        _ => None,
    }
}

/// Parse the JSON object embedded in a model reply.
pub fn parse_json_object(text: &str) -> Option<serde_json::Map<String, serde_json::Value>> {
    let raw = extract_json_object(text)?;
    match serde_json::from_str::<serde_json::Value>(raw) {
        Ok(serde_json::Value::Object(map)) => Some(map),
        _ => None,
    }
}

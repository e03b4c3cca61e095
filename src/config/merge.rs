//! Field-by-field merging of configuration tiers.
//!
//! Higher tier values override lower tier values. Arrays (such as the
//! `snippets` list) are replaced entirely, not concatenated.

use serde_json::Value;

/// Overlay one config tier onto another.
///
/// Mappings merge key by key. Any other overlay value replaces the base
/// value, except `null`, which leaves the base value in place.
///
/// # Example
/// ```
/// use serde_json::json;
/// use treeport::config::deep_merge;
///
/// let base = json!({
///     "fetch": { "timeout_secs": 30, "max_attempts": 3 },
///     "snippets": ["blog.author", "blog.category"]
/// });
/// let overlay = json!({
///     "fetch": { "timeout_secs": 5 },
///     "snippets": ["blog.author"]
/// });
/// let result = deep_merge(base, overlay);
/// assert_eq!(result["fetch"], json!({ "timeout_secs": 5, "max_attempts": 3 }));
/// assert_eq!(result["snippets"], json!(["blog.author"]));
/// ```
pub fn deep_merge(base: Value, overlay: Value) -> Value {
    match (base, overlay) {
        (Value::Object(mut merged), Value::Object(overlay)) => {
            for (key, value) in overlay {
                match merged.get_mut(&key) {
                    Some(existing) => {
                        let lower = existing.take();
                        *existing = deep_merge(lower, value);
                    }
                    None => {
                        merged.insert(key, value);
                    }
                }
            }
            Value::Object(merged)
        }
        // an unset field keeps the lower tier's value
        (base, Value::Null) => base,
        (_, overlay) => overlay,
    }
}

/// Merge tiers in order, later tiers taking precedence.
pub fn deep_merge_all(values: impl IntoIterator<Item = Value>) -> Value {
    values.into_iter().fold(Value::Null, deep_merge)
}

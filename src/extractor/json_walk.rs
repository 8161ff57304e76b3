//! Mining product-shaped objects out of arbitrary JSON.

use regex::Regex;
use serde_json::{Map, Value};
use std::sync::LazyLock;

static FRAGMENT_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"\{[^{}]*?"(?:product\.)?repositoryId"\s*:\s*"[^"]*"[^{}]*\}"#).unwrap()
});

/// Every object in `root` (itself included) that satisfies `predicate`,
/// in document order.
pub fn find_objects<'a, F>(root: &'a Value, predicate: F) -> Vec<&'a Map<String, Value>>
where
    F: Fn(&Map<String, Value>) -> bool,
{
    let mut found = Vec::new();
    let mut stack = vec![root];
    while let Some(node) = stack.pop() {
        match node {
            Value::Object(map) => {
                if predicate(map) {
                    found.push(map);
                }
                stack.extend(map.values().rev());
            }
            Value::Array(items) => stack.extend(items.iter().rev()),
            _ => {}
        }
    }
    found
}

/// Last-resort salvage for script bodies that are not valid JSON as a
/// whole: pull out flat `{...}` fragments carrying a repository id and keep
/// those that parse on their own.
pub fn salvage_fragments(text: &str) -> Vec<Value> {
    FRAGMENT_RE
        .find_iter(text)
        .filter_map(|m| serde_json::from_str::<Value>(m.as_str()).ok())
        .filter(Value::is_object)
        .collect()
}

/// Parses a script body as JSON, falling back to fragment salvage.
pub fn parse_embedded(text: &str) -> Vec<Value> {
    let trimmed = text.trim();
    if trimmed.starts_with('{') || trimmed.starts_with('[') {
        if let Ok(value) = serde_json::from_str::<Value>(trimmed) {
            return vec![value];
        }
    }
    salvage_fragments(trimmed)
}

//! Platform-suffixed field resolution
//!
//! A record may declare `depends`, `depends@unix` and `depends@macos`
//! side by side. For a target OS the most specific declared variant wins;
//! variants are never merged.

use serde_json::{Map, Value};

use crate::platform::OsFamily;

/// Pick the most specific variant of `base` declared in `fields`.
pub fn resolve_field<'a>(fields: &'a Map<String, Value>, base: &str, os: OsFamily) -> Option<&'a Value> {
    os.suffixes()
        .iter()
        .find_map(|suffix| fields.get(&format!("{base}{suffix}")))
}

/// Resolve a list-valued field, defaulting to an empty list.
pub fn resolve_list(fields: &Map<String, Value>, base: &str, os: OsFamily) -> Vec<String> {
    match resolve_field(fields, base, os) {
        Some(Value::Array(items)) => items
            .iter()
            .filter_map(|v| v.as_str().map(str::to_string))
            .collect(),
        _ => Vec::new(),
    }
}

/// Resolve a string-valued field.
pub fn resolve_string(fields: &Map<String, Value>, base: &str, os: OsFamily) -> Option<String> {
    resolve_field(fields, base, os)
        .and_then(Value::as_str)
        .map(str::to_string)
}

/// Split a field key into its base name and recognised platform suffix.
pub fn split_suffix(key: &str) -> (&str, Option<&str>) {
    for suffix in OsFamily::all_suffixes() {
        if let Some(base) = key.strip_suffix(suffix) {
            return (base, Some(suffix));
        }
    }
    (key, None)
}

//! `{{ field }}` placeholder expansion in node parameters.
//!
//! Placeholders are field lookups into a single row, either bare
//! (`{{ topic }}`) or `$json`-qualified (`{{ $json.topic }}`), with dotted
//! paths for nested objects. Nothing is evaluated. A placeholder whose path
//! does not resolve is left in place verbatim.

use crate::node_type::{Parameters, Row};
use regex::{Captures, Regex};
use serde_json::Value as JsonValue;
use std::sync::LazyLock;

static PLACEHOLDER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\{\{\s*(?:\$json\.)?([A-Za-z_][A-Za-z0-9_]*(?:\.[A-Za-z0-9_]+)*)\s*\}\}")
        .expect("placeholder pattern is valid")
});

/// Expands every placeholder in a string against `row`.
///
/// Strings are inserted as-is; other values are inserted as compact JSON.
#[must_use]
pub fn render_str(template: &str, row: &Row) -> String {
    PLACEHOLDER
        .replace_all(template, |caps: &Captures<'_>| match lookup(row, &caps[1]) {
            Some(JsonValue::String(s)) => s.clone(),
            Some(value) => value.to_string(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// Expands placeholders in every string inside `value`, recursively.
#[must_use]
pub fn render_value(value: &JsonValue, row: &Row) -> JsonValue {
    match value {
        JsonValue::String(s) => JsonValue::String(render_str(s, row)),
        JsonValue::Array(items) => {
            JsonValue::Array(items.iter().map(|item| render_value(item, row)).collect())
        }
        JsonValue::Object(map) => JsonValue::Object(
            map.iter()
                .map(|(k, v)| (k.clone(), render_value(v, row)))
                .collect(),
        ),
        other => other.clone(),
    }
}

/// Expands placeholders in all parameter values against `row`.
#[must_use]
pub fn render_parameters(params: &Parameters, row: &Row) -> Parameters {
    Parameters::new(
        params
            .as_row()
            .iter()
            .map(|(k, v)| (k.clone(), render_value(v, row)))
            .collect(),
    )
}

fn lookup<'a>(row: &'a Row, path: &str) -> Option<&'a JsonValue> {
    let mut segments = path.split('.');
    let mut current = row.get(segments.next()?)?;
    for segment in segments {
        current = match current {
            JsonValue::Object(map) => map.get(segment)?,
            JsonValue::Array(items) => items.get(segment.parse::<usize>().ok()?)?,
            _ => return None,
        };
    }
    Some(current)
}

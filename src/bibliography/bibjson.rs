//! BibJSON / CSL JSON arrays.

use std::path::Path;

use itertools::Itertools;
use serde_json::{Map, Value};
use tower_lsp::lsp_types::Position;

use super::{select_fields, BibEntry};
use crate::error::{CiterError, Result};

pub(super) fn parse(path: &Path, content: &str, allow_list: &[String]) -> Result<Vec<BibEntry>> {
    let malformed = |message: String| CiterError::ParseMalformed {
        path: path.to_path_buf(),
        message,
    };

    let json: Value = serde_json::from_str(content).map_err(|err| malformed(err.to_string()))?;
    let Value::Array(records) = json else {
        return Err(malformed("expected a top-level array".to_string()));
    };

    let entries = records
        .iter()
        .filter_map(Value::as_object)
        .filter_map(|record| {
            let key = record.get("id").and_then(Value::as_str)?;
            let fields = select_fields(allow_list, |name| field_value(record, name));

            Some(BibEntry::new(
                key.to_string(),
                path.to_path_buf(),
                Position::default(),
                fields,
            ))
        })
        .collect();

    Ok(entries)
}

fn field_value(record: &Map<String, Value>, name: &str) -> Option<String> {
    let lookup = |wanted: &str| {
        record
            .iter()
            .find(|(key, _)| key.eq_ignore_ascii_case(wanted))
            .map(|(_, value)| value)
    };

    let value = match name {
        "author" | "editor" => return lookup(name).map(render_people),
        "date" => lookup("date").or_else(|| lookup("issued"))?,
        _ => lookup(name)?,
    };

    Some(render_value(value)).filter(|rendered| !rendered.is_empty())
}

/// `[{family, given}, ...]` becomes `"Smith, Jane and Doe, John"`.
fn render_people(value: &Value) -> String {
    match value {
        Value::Array(people) => people.iter().map(render_value).join(" and "),
        other => render_value(other),
    }
}

fn render_value(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Array(items) => items.iter().map(render_value).join(", "),
        Value::Object(map) => map.values().map(render_value).join(", "),
        other => other.to_string(),
    }
}

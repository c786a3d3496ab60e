//! Bibliography parsing.
//!
//! A bibliography source is either a BibTeX file (`.bib`) or a BibJSON / CSL
//! JSON array (`.json`). Both are normalized into [`BibEntry`] values that
//! carry only the fields on the configured allow-list, plus a rendered
//! multi-line summary used for completion documentation and hovers.
//!
//! Parsing is a pure function of `(path, content, allow-list)`. A source that
//! cannot be parsed as a whole is reported as
//! [`CiterError::ParseMalformed`]; deciding what to do with previously loaded
//! entries is up to the caller.

mod bibjson;
mod bibtex;

use std::collections::HashSet;
use std::path::{Path, PathBuf};

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::Position;

use crate::error::{CiterError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BibFormat {
    BibTex,
    BibJson,
}

impl BibFormat {
    pub fn from_path(path: &Path) -> Option<BibFormat> {
        let ext = path.extension()?.to_str()?;
        if ext.eq_ignore_ascii_case("bib") {
            Some(BibFormat::BibTex)
        } else if ext.eq_ignore_ascii_case("json") {
            Some(BibFormat::BibJson)
        } else {
            None
        }
    }
}

/// One bibliography record.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BibEntry {
    pub key: String,
    pub source_path: PathBuf,
    /// Where the record begins in its source; zero for BibJSON.
    pub position: Position,
    fields: Vec<(String, String)>,
    documentation: String,
}

impl BibEntry {
    /// `fields` must already be filtered to the allow-list and in allow-list order.
    pub fn new(
        key: String,
        source_path: PathBuf,
        position: Position,
        fields: Vec<(String, String)>,
    ) -> BibEntry {
        let documentation = render_documentation(&fields);
        BibEntry {
            key,
            source_path,
            position,
            fields,
            documentation,
        }
    }

    pub fn fields(&self) -> &[(String, String)] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&str> {
        self.fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    }

    pub fn documentation(&self) -> &str {
        &self.documentation
    }
}

/// Parse a bibliography source, choosing the grammar by file extension.
pub fn parse(source_path: &Path, content: &str, allow_list: &[String]) -> Result<Vec<BibEntry>> {
    match BibFormat::from_path(source_path) {
        Some(BibFormat::BibTex) => bibtex::parse(source_path, content, allow_list),
        Some(BibFormat::BibJson) => bibjson::parse(source_path, content, allow_list),
        None => Err(CiterError::UnsupportedFormat {
            path: source_path.to_path_buf(),
        }),
    }
}

/// Pick allow-listed fields in allow-list order; `lookup` returns the first
/// occurrence of a (lower-cased) field name in the record.
fn select_fields(
    allow_list: &[String],
    mut lookup: impl FnMut(&str) -> Option<String>,
) -> Vec<(String, String)> {
    allow_list
        .iter()
        .unique()
        .filter_map(|field| lookup(field).map(|value| (field.clone(), value)))
        .collect()
}

/// Strip brace groups that contain no braces or backslashes, until nothing changes.
///
/// `{Foo}` becomes `Foo`, `{{A Study}}` becomes `A Study`, `{\"o}` is kept.
pub fn strip_braces(value: &str) -> String {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{+([^\\{}]+)\}+").unwrap());

    let mut current = value.to_string();
    loop {
        let next = RE.replace_all(&current, "$1").into_owned();
        if next == current {
            return next;
        }
        current = next;
    }
}

fn render_documentation(fields: &[(String, String)]) -> String {
    let get = |name: &str| {
        fields
            .iter()
            .find(|(field, _)| field == name)
            .map(|(_, value)| value.as_str())
    };

    let mut consumed: HashSet<&str> = HashSet::new();
    let mut lines = vec![];

    for group in [["author", "editor"], ["date", "year"]] {
        if let Some(name) = group.into_iter().find(|&name| get(name).is_some()) {
            lines.push(format!("{}: {}", capitalize(name), get(name).unwrap_or_default()));
            consumed.insert(name);
        }
    }

    if let Some(doi) = get("doi") {
        lines.push(format!("Link: https://doi.org/{doi}"));
        consumed.insert("doi");
    } else if let Some(url) = get("url") {
        lines.push(format!("Link: {url}"));
        consumed.insert("url");
    }

    lines.extend(
        fields
            .iter()
            .filter(|(field, _)| !consumed.contains(field.as_str()))
            .map(|(field, value)| format!("{}: {}", capitalize(field), value)),
    );

    lines.join("\n")
}

fn capitalize(name: &str) -> String {
    let mut chars = name.chars();
    match chars.next() {
        Some(first) => first.to_uppercase().chain(chars).collect(),
        None => String::new(),
    }
}

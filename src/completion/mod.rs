//! Completion items for citation keys and cross-reference labels.

pub mod browser;

use tower_lsp::lsp_types::{
    CompletionItem, CompletionItemKind, Documentation, MarkupContent, MarkupKind,
};

use crate::bibliography::BibEntry;
use crate::crossref::CrossRefLabel;

/// One item per entry, inserting the bare key.
///
/// Clients filter on every field value, so typing part of an author or
/// title finds the key.
pub fn citation_completions<'a>(
    entries: impl IntoIterator<Item = &'a BibEntry>,
) -> Vec<CompletionItem> {
    entries
        .into_iter()
        .map(|entry| CompletionItem {
            label: entry.key.clone(),
            kind: Some(CompletionItemKind::REFERENCE),
            documentation: markdown(entry.documentation()),
            filter_text: Some(
                entry
                    .fields()
                    .iter()
                    .map(|(_, value)| value.as_str())
                    .chain(std::iter::once(entry.key.as_str()))
                    .collect::<Vec<_>>()
                    .join(" "),
            ),
            insert_text: Some(entry.key.clone()),
            ..Default::default()
        })
        .collect()
}

pub fn crossref_completions<'a>(
    labels: impl IntoIterator<Item = &'a CrossRefLabel>,
) -> Vec<CompletionItem> {
    labels
        .into_iter()
        .map(|label| {
            let reference = label.reference();
            CompletionItem {
                label: reference.clone(),
                kind: Some(CompletionItemKind::REFERENCE),
                detail: (!label.detail.is_empty()).then(|| label.detail.clone()),
                documentation: markdown(&label.documentation),
                insert_text: Some(reference),
                ..Default::default()
            }
        })
        .collect()
}

fn markdown(value: &str) -> Option<Documentation> {
    if value.is_empty() {
        return None;
    }
    Some(Documentation::MarkupContent(MarkupContent {
        kind: MarkupKind::Markdown,
        value: value.to_string(),
    }))
}

//! Cross-reference labels in pandoc-crossref style documents.
//!
//! Labeled elements carry an attribute block such as `{#fig:cat}` or
//! `{#tbl:results .striped}`. [`CrossRefScanner::scan`] finds every such block
//! and, in [`CrossRefMode::Full`], confirms the surrounding syntax for its kind
//! to extract a caption and a preview:
//!
//! | Kind | Expected syntax | Detail | Documentation |
//! |------|-----------------|--------|---------------|
//! | `fig` | `![caption](path){#fig:x}` | caption | image preview |
//! | `sec` | `## Heading {#sec:x}` | heading text | |
//! | `tbl` | `: caption {#tbl:x}` after a table | caption | first table rows |
//! | `lst` | ```` ```{#lst:x .lang caption="..."} ```` or `: caption {#lst:x}` | caption | code |
//! | `eq` | `$$ ... $$ {#eq:x}` | label | the math |
//!
//! Backward searches are limited to a fixed window before the label so that
//! large documents stay cheap to scan. Nothing is cached: every call rescans.

mod extract;
mod view;

use std::path::Path;

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{CrossRefMode, Settings};

use self::extract::{Extractor, LabelMatch};
use self::view::DocumentView;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CrossRefKind {
    Figure,
    Table,
    Equation,
    Section,
    Listing,
}

impl CrossRefKind {
    pub fn from_tag(tag: &str) -> Option<CrossRefKind> {
        match tag {
            "fig" => Some(CrossRefKind::Figure),
            "tbl" => Some(CrossRefKind::Table),
            "eq" => Some(CrossRefKind::Equation),
            "sec" => Some(CrossRefKind::Section),
            "lst" => Some(CrossRefKind::Listing),
            _ => None,
        }
    }

    pub fn tag(&self) -> &'static str {
        match self {
            CrossRefKind::Figure => "fig",
            CrossRefKind::Table => "tbl",
            CrossRefKind::Equation => "eq",
            CrossRefKind::Section => "sec",
            CrossRefKind::Listing => "lst",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CrossRefLabel {
    pub kind: CrossRefKind,
    pub label: String,
    pub detail: String,
    pub documentation: String,
}

impl CrossRefLabel {
    /// The text an author writes to refer to this element, e.g. `fig:cat`.
    pub fn reference(&self) -> String {
        format!("{}:{}", self.kind.tag(), self.label)
    }
}

#[derive(Debug, Clone, Copy)]
pub struct CrossRefScanner {
    /// Chars searched backwards from a label for its table, fence, or `$$` opener.
    pub lookback: usize,
    /// Data rows shown in table and listing previews.
    pub preview_lines: usize,
}

impl Default for CrossRefScanner {
    fn default() -> Self {
        CrossRefScanner {
            lookback: 800,
            preview_lines: 3,
        }
    }
}

impl CrossRefScanner {
    pub fn from_settings(settings: &Settings) -> CrossRefScanner {
        CrossRefScanner {
            lookback: settings.lookback_chars,
            preview_lines: settings.table_preview_lines,
        }
    }

    /// Labels in document order. `document_path` anchors relative figure paths.
    pub fn scan(
        &self,
        text: &str,
        document_path: Option<&Path>,
        mode: CrossRefMode,
    ) -> Vec<CrossRefLabel> {
        static LABEL_RE: Lazy<Regex> = Lazy::new(|| {
            Regex::new(r"\{.*#(?<kind>fig|tbl|eq|sec|lst):(?<label>[\w-]+).*\}").unwrap()
        });

        if mode == CrossRefMode::None {
            return vec![];
        }

        let view = DocumentView::new(text);
        let extractor = Extractor {
            view: &view,
            document_path,
            lookback: self.lookback,
            preview_lines: self.preview_lines,
        };

        view.lines()
            .filter_map(|(line, line_text)| {
                let caps = LABEL_RE.captures(line_text)?;
                Some(LabelMatch {
                    kind: CrossRefKind::from_tag(caps.name("kind")?.as_str())?,
                    label: caps.name("label")?.as_str(),
                    line,
                    line_text,
                    offset: view.line_start(line),
                })
            })
            .filter_map(|m| match mode {
                CrossRefMode::Full => extractor.extract(&m),
                _ => Some(CrossRefLabel {
                    kind: m.kind,
                    label: m.label.to_string(),
                    detail: String::new(),
                    documentation: String::new(),
                }),
            })
            .collect()
    }
}

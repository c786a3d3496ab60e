//! Per-kind extraction of cross-reference details.
//!
//! Each extractor confirms the syntax it expects around the attribute block
//! and returns `None` when it cannot; an unconfirmed occurrence is dropped.

use std::path::Path;

use itertools::Itertools;
use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::Url;

use super::view::DocumentView;
use super::{CrossRefKind, CrossRefLabel};

static FIG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"!\[(.*)\]\((.+)\)\{").unwrap());
// Text runs up to the attribute block holding the label, so braces in
// inline math stay part of it.
static SEC_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\s*#*\s*(.*?)\s*\{[^{}]*#sec:").unwrap());
static CAPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r":\s*(.*?)\s*\{[^{}]*#(?:tbl|lst):").unwrap());
static FENCE_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"```.*\{").unwrap());
static EQ_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\$\$\s*\{").unwrap());
static LANG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\{.*\.(\w+).*\}").unwrap());
static LST_CAPTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r#"\{.*caption="(.+)".*\}"#).unwrap());

const TABLE_MARKER: &str = "|:-";
const FENCE: &str = "```";

/// A labeled attribute block found on one line.
pub(super) struct LabelMatch<'a> {
    pub kind: CrossRefKind,
    pub label: &'a str,
    pub line: usize,
    pub line_text: &'a str,
    /// Byte offset of the start of the line.
    pub offset: usize,
}

pub(super) struct Extractor<'a> {
    pub view: &'a DocumentView<'a>,
    pub document_path: Option<&'a Path>,
    pub lookback: usize,
    pub preview_lines: usize,
}

impl Extractor<'_> {
    pub fn extract(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        match m.kind {
            CrossRefKind::Figure => self.figure(m),
            CrossRefKind::Section => self.section(m),
            CrossRefKind::Table => self.table(m),
            CrossRefKind::Listing => self.listing(m),
            CrossRefKind::Equation => self.equation(m),
        }
    }

    fn figure(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        let caps = FIG_RE.captures(m.line_text)?;
        let target = self.image_target(&caps[2]);

        Some(label(m, &caps[1], format!("![]({target})")))
    }

    fn section(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        let caps = SEC_RE.captures(m.line_text)?;

        Some(label(m, &caps[1], String::new()))
    }

    fn table(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        let caps = CAPTION_RE.captures(m.line_text)?;
        let preview = self.block_preview(m, TABLE_MARKER).unwrap_or_default();

        Some(label(m, &caps[1], preview))
    }

    fn listing(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        if FENCE_RE.is_match(m.line_text) {
            return Some(self.fenced_listing(m));
        }

        // Listings written as a captioned block after the code.
        let caps = CAPTION_RE.captures(m.line_text)?;
        let preview = self.block_preview(m, FENCE).unwrap_or_default();

        Some(label(m, &caps[1], preview))
    }

    fn fenced_listing(&self, m: &LabelMatch) -> CrossRefLabel {
        let lang = LANG_RE
            .captures(m.line_text)
            .map(|caps| caps[1].to_string())
            .unwrap_or_default();
        let caption = LST_CAPTION_RE
            .captures(m.line_text)
            .map(|caps| caps[1].to_string())
            .unwrap_or_else(|| m.label.to_string());

        let body_start = m.offset + m.line_text.len();
        let documentation = self
            .view
            .find_after(body_start, FENCE)
            .map(|end| {
                let body = self.view.text()[body_start..end].trim_matches(['\r', '\n']);
                format!("```{lang}\n{body}\n```")
            })
            .unwrap_or_default();

        label(m, &caption, documentation)
    }

    fn equation(&self, m: &LabelMatch) -> Option<CrossRefLabel> {
        let found = EQ_RE.find(m.line_text)?;
        let at = m.offset + found.start();
        let opener = self.view.rfind_before(at, self.lookback, "$$")?;
        let math = self.view.text()[opener + 2..at].trim();

        Some(label(m, m.label, math.to_string()))
    }

    /// The first lines of the block holding the nearest `marker` before the match:
    /// header and separator plus `preview_lines` rows.
    fn block_preview(&self, m: &LabelMatch, marker: &str) -> Option<String> {
        let found = self.view.rfind_before(m.offset, self.lookback, marker)?;
        let floor = self
            .view
            .line_of(self.view.window_start(m.offset, self.lookback));
        let start = self.view.block_start(self.view.line_of(found), floor);
        let end = (start + self.preview_lines + 2).min(m.line);

        let preview = (start..end)
            .filter_map(|line| self.view.line(line))
            .join("\n");
        Some(preview.trim_end().to_string())
    }

    fn image_target(&self, target: &str) -> String {
        if target.contains("://") {
            return target.to_string();
        }
        let Some(dir) = self.document_path.and_then(Path::parent) else {
            return target.to_string();
        };

        let resolved = dir.join(target);
        Url::from_file_path(&resolved)
            .map(|url| url.to_string())
            .unwrap_or_else(|_| resolved.display().to_string())
    }
}

fn label(m: &LabelMatch, detail: &str, documentation: String) -> CrossRefLabel {
    CrossRefLabel {
        kind: m.kind,
        label: m.label.to_string(),
        detail: detail.to_string(),
        documentation,
    }
}

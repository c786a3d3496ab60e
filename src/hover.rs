//! Hover for citation keys.
//!
//! Hovering `@smith2020` shows the rendered documentation of the entry with
//! that key. Keys are `@` followed by letters, marks, digits or underscores.
//!
//! # Configuration
//!
//! Hover can be disabled via [`Settings::hover`](crate::config::Settings::hover):
//!
//! ```toml
//! hover = false
//! ```

use once_cell::sync::Lazy;
use regex::Regex;
use tower_lsp::lsp_types::{Hover, HoverContents, MarkupContent, MarkupKind, Position, Range};

use crate::engine::Citer;

static KEY_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@[\w\p{L}\p{M}]+").unwrap());

/// A citation key in a line, with its char columns (end exclusive).
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct KeyAtCursor<'a> {
    pub key: &'a str,
    pub start: u32,
    pub end: u32,
}

/// The key under `character` (a char column), touching either end included.
pub fn key_at(line: &str, character: u32) -> Option<KeyAtCursor<'_>> {
    let column = |byte: usize| line[..byte].chars().count() as u32;

    KEY_RE.find_iter(line).find_map(|found| {
        let (start, end) = (column(found.start()), column(found.end()));
        (start..=end).contains(&character).then(|| KeyAtCursor {
            key: &found.as_str()[1..],
            start,
            end,
        })
    })
}

/// Hover for the position in `text`, or `None` if hover is disabled or the
/// cursor is not on a known key.
pub fn hover(citer: &Citer, text: &str, position: Position) -> Option<Hover> {
    if !citer.settings().hover {
        return None;
    }

    let line = text.lines().nth(position.line as usize)?;
    let found = key_at(line, position.character)?;
    let entry = citer.citation_by_key(found.key)?;

    Some(Hover {
        contents: HoverContents::Markup(MarkupContent {
            kind: MarkupKind::Markdown,
            // Markdown hard breaks
            value: entry.documentation().replace('\n', "  \n"),
        }),
        range: Some(Range {
            start: Position::new(position.line, found.start),
            end: Position::new(position.line, found.end),
        }),
    })
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::sync::Arc;

    use tower_lsp::lsp_types::{HoverContents, Position, Range};

    use super::{hover, key_at, KeyAtCursor};
    use crate::config::Settings;
    use crate::discovery::DiskReader;
    use crate::engine::Citer;
    use crate::test_utils::{create_test_workspace_dir, RecordingSink, RecordingWatcher};
    use crate::watch::event_channel;

    #[test]
    fn finds_key_under_cursor() {
        let line = "As shown [@smith2020; @doe-x] before.";

        assert_eq!(
            key_at(line, 12),
            Some(KeyAtCursor {
                key: "smith2020",
                start: 10,
                end: 20
            })
        );
        assert_eq!(key_at(line, 20).map(|k| k.key), Some("smith2020"));
        assert_eq!(key_at(line, 24).map(|k| k.key), Some("doe"));
        assert_eq!(key_at(line, 3), None);
    }

    #[test]
    fn columns_count_chars() {
        let line = "Über @müller2019";
        let found = key_at(line, 8).unwrap();

        assert_eq!(found.key, "müller2019");
        assert_eq!((found.start, found.end), (5, 16));
    }

    fn loaded_citer(settings: Settings) -> (tempfile::TempDir, Citer) {
        let (temp, dir) = create_test_workspace_dir();
        fs::write(
            dir.join("refs.bib"),
            "@article{smith2020, author = {Jane Smith}, title = {A Study}}",
        )
        .unwrap();

        let (_sender, events) = event_channel();
        let mut citer = Citer::new(
            settings,
            Some(dir),
            Box::new(DiskReader),
            Box::new(RecordingWatcher::default()),
            events,
            Arc::new(RecordingSink::default()),
        );
        citer.on_active_document_changed("bibliography: [refs.bib]", None);
        (temp, citer)
    }

    #[test]
    fn hover_shows_documentation_with_hard_breaks() {
        let (_temp, citer) = loaded_citer(Settings::default());
        let text = "# Title\n\nSee @smith2020.";

        let hover = hover(&citer, text, Position::new(2, 6)).unwrap();

        let HoverContents::Markup(markup) = hover.contents else {
            panic!("expected markup");
        };
        assert_eq!(markup.value, "Author: Jane Smith  \nTitle: A Study");
        assert_eq!(
            hover.range,
            Some(Range {
                start: Position::new(2, 4),
                end: Position::new(2, 14)
            })
        );
    }

    #[test]
    fn unknown_key_or_disabled_hover_is_none() {
        let (_temp, citer) = loaded_citer(Settings::default());
        assert!(hover(&citer, "See @nobody.", Position::new(0, 6)).is_none());

        let (_temp, citer) = loaded_citer(Settings {
            hover: false,
            ..Settings::default()
        });
        assert!(hover(&citer, "See @smith2020.", Position::new(0, 6)).is_none());
    }
}

//! Citation browser: a searchable list of every loaded entry.
//!
//! Each entry is shown by title, with the key alongside and a one-line
//! summary of authors and publication underneath. Search is fuzzy, using
//! [`nucleo_matcher`], over all three.

use itertools::Itertools;
use nucleo_matcher::{
    pattern::{self, Normalization},
    Matcher,
};

use crate::bibliography::BibEntry;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BrowserItem {
    pub label: String,
    /// The citation key.
    pub description: String,
    pub detail: String,
}

impl BrowserItem {
    pub fn from_entry(entry: &BibEntry) -> BrowserItem {
        let publication = ["journal", "journaltitle", "publisher"]
            .into_iter()
            .find_map(|field| entry.field(field))
            .unwrap_or("Unknown");

        BrowserItem {
            label: entry.field("title").unwrap_or_default().to_string(),
            description: entry.key.clone(),
            detail: format!(
                "Authors: {}, publication: {}",
                entry.field("author").unwrap_or("Unknown"),
                publication
            ),
        }
    }

    fn haystack(&self) -> String {
        format!("{} {} {}", self.label, self.description, self.detail)
    }
}

pub fn browser_items<'a>(entries: impl IntoIterator<Item = &'a BibEntry>) -> Vec<BrowserItem> {
    entries.into_iter().map(BrowserItem::from_entry).collect()
}

/// Items matching `query`, best match first. An empty query matches everything.
pub fn search<'a>(items: &'a [BrowserItem], query: &str) -> Vec<&'a BrowserItem> {
    if query.trim().is_empty() {
        return items.iter().collect();
    }

    let mut matcher = Matcher::new(nucleo_matcher::Config::DEFAULT);
    let pattern =
        pattern::Pattern::parse(query, pattern::CaseMatching::Smart, Normalization::Smart);
    let mut buf = Vec::new();

    items
        .iter()
        .filter_map(|item| {
            let haystack = item.haystack();
            let score = pattern.score(
                nucleo_matcher::Utf32Str::new(haystack.as_str(), &mut buf),
                &mut matcher,
            )?;
            Some((score, item))
        })
        .sorted_by(|(a, _), (b, _)| Ord::cmp(b, a))
        .map(|(_score, item)| item)
        .collect_vec()
}

//! citer: citation and cross-reference resolution for academic Markdown
//!
//! This crate works out which bibliography files a Markdown document uses,
//! parses them into citation entries, keeps those entries current as the
//! files change, and scans documents for pandoc-crossref labels.
//!
//! # Overview
//!
//! - **Discovery**: bibliography paths from inline declarations, YAML
//!   frontmatter, a project root file and configured defaults
//! - **Parsing**: BibTeX (`.bib`) and BibJSON (`.json`) sources
//! - **Tracking**: file watching with re-parse on change and eviction on delete
//! - **Cross-references**: `{#fig:..}`, `{#tbl:..}`, `{#eq:..}`, `{#sec:..}`
//!   and `{#lst:..}` labels with captions and previews
//! - **Editor surfaces**: completion items, a searchable citation browser
//!   and hover documentation
//!
//! # Architecture
//!
//! - [`engine`]: the [`Citer`](engine::Citer) facade a host drives
//! - [`discovery`]: which sources a document uses
//! - [`bibliography`]: parsing sources into [`BibEntry`](bibliography::BibEntry) values
//! - [`store`] and [`watch`]: the loaded entries and how they stay current
//! - [`crossref`]: the cross-reference scanner
//! - [`config`]: configuration management and settings
//!
//! # Usage
//!
//! ```ignore
//! use std::sync::Arc;
//! use citer::{config::Settings, discovery::DiskReader, engine::Citer, notice::TracingSink};
//! use citer::watch::{event_channel, NotifyWatcher};
//!
//! let (sender, events) = event_channel();
//! let mut citer = Citer::new(
//!     Settings::new(&root)?,
//!     Some(root),
//!     Box::new(DiskReader),
//!     Box::new(NotifyWatcher::new(sender)?),
//!     events,
//!     Arc::new(TracingSink),
//! );
//! citer.on_active_document_changed(&text, Some(&path));
//! let keys: Vec<_> = citer.citation_suggestions().iter().map(|e| &e.key).collect();
//! ```

// Core: sources, entries, and their lifecycle
pub mod bibliography;
pub mod discovery;
pub mod store;
pub mod watch;

pub mod crossref;

// Host-facing surfaces
pub mod completion;
pub mod engine;
pub mod hover;

// Configuration and reporting
pub mod config;
pub mod error;
pub mod notice;

// Test utilities (only available in test builds)
#[cfg(test)]
pub mod test_utils;

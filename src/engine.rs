//! The host-facing entry point.
//!
//! [`Citer`] owns the entry store and the watch coordinator. The host calls
//! in on discrete events (a document became active, a source changed, a
//! suggestion list is needed) and every call runs to completion.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::bibliography::BibEntry;
use crate::config::{CrossRefMode, Settings};
use crate::crossref::{CrossRefLabel, CrossRefScanner};
use crate::discovery::{SourceDiscovery, SourceReader, SourceSet};
use crate::notice::NoticeSink;
use crate::store::EntryStore;
use crate::watch::{EventReceiver, SourceEvent, SourceLoader, SourceWatcher, WatchCoordinator};

pub struct Citer {
    settings: Settings,
    allow_list: Vec<String>,
    workspace_root: Option<PathBuf>,
    reader: Box<dyn SourceReader>,
    notices: Arc<dyn NoticeSink>,
    store: EntryStore,
    coordinator: WatchCoordinator,
    scanner: CrossRefScanner,
}

impl Citer {
    /// `events` is the receiving end of the channel the watcher sends on.
    pub fn new(
        settings: Settings,
        workspace_root: Option<PathBuf>,
        reader: Box<dyn SourceReader>,
        watcher: Box<dyn SourceWatcher>,
        events: EventReceiver,
        notices: Arc<dyn NoticeSink>,
    ) -> Citer {
        Citer {
            allow_list: settings.field_allow_list(),
            scanner: CrossRefScanner::from_settings(&settings),
            coordinator: WatchCoordinator::new(watcher, events, settings.forget_unused_bib),
            store: EntryStore::new(notices.clone()),
            settings,
            workspace_root,
            reader,
            notices,
        }
    }

    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Run discovery for the now-active document and bring the store up to date.
    /// Returns the sources the document uses.
    pub fn on_active_document_changed(
        &mut self,
        text: &str,
        document_path: Option<&Path>,
    ) -> SourceSet {
        let discovered = SourceDiscovery {
            settings: &self.settings,
            reader: self.reader.as_ref(),
            notices: self.notices.as_ref(),
        }
        .discover(text, document_path, self.workspace_root.as_deref());
        debug!(sources = discovered.len(), "Discovered bibliographies");

        let loader = SourceLoader {
            reader: self.reader.as_ref(),
            allow_list: &self.allow_list,
            notices: self.notices.as_ref(),
        };
        self.coordinator
            .reconcile(&discovered, &mut self.store, &loader);

        discovered
    }

    pub fn on_source_file_event(&mut self, event: &SourceEvent) -> bool {
        let loader = SourceLoader {
            reader: self.reader.as_ref(),
            allow_list: &self.allow_list,
            notices: self.notices.as_ref(),
        };
        self.coordinator.on_event(event, &mut self.store, &loader)
    }

    /// Apply queued watcher events. Returns how many touched a tracked source.
    pub fn pump_events(&mut self) -> usize {
        let loader = SourceLoader {
            reader: self.reader.as_ref(),
            allow_list: &self.allow_list,
            notices: self.notices.as_ref(),
        };
        self.coordinator.drain(&mut self.store, &loader)
    }

    /// Wait for the next watcher event without applying it.
    pub async fn next_source_event(&mut self) -> Option<SourceEvent> {
        self.coordinator.next_event().await
    }

    pub fn citation_suggestions(&self) -> Vec<&BibEntry> {
        self.store.all_entries()
    }

    pub fn citation_by_key(&self, key: &str) -> Option<&BibEntry> {
        self.store.find_by_key(key)
    }

    pub fn cross_reference_labels(
        &self,
        text: &str,
        document_path: Option<&Path>,
        mode: CrossRefMode,
    ) -> Vec<CrossRefLabel> {
        self.scanner.scan(text, document_path, mode)
    }

    pub fn watched_sources(&self) -> &SourceSet {
        self.coordinator.watched()
    }
}

//! Keeps the entry store in step with the bibliography sources on disk.
//!
//! A tracked source moves through
//! `unwatched -> watched -> (changed -> re-parsed -> watched)*` and leaves the
//! watched set either when it is deleted or, with `forget_unused_bib`, when a
//! discovery pass no longer finds it. Both exits also evict its entries.
//!
//! Change notifications arrive on an unbounded channel. Whatever delivers them
//! ([`NotifyWatcher`] in the binary, the host or a test elsewhere) only pushes
//! [`SourceEvent`]s; the coordinator applies them when it drains the channel.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use notify::{RecursiveMode, Watcher};
use notify_debouncer_mini::{new_debouncer, DebouncedEvent, Debouncer};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::bibliography;
use crate::discovery::{SourceReader, SourceSet};
use crate::error::{CiterError, Result};
use crate::notice::{Notice, NoticeSink};
use crate::store::EntryStore;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceEventKind {
    Changed,
    Deleted,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceEvent {
    pub path: PathBuf,
    pub kind: SourceEventKind,
}

impl SourceEvent {
    pub fn changed(path: impl Into<PathBuf>) -> SourceEvent {
        SourceEvent {
            path: path.into(),
            kind: SourceEventKind::Changed,
        }
    }

    pub fn deleted(path: impl Into<PathBuf>) -> SourceEvent {
        SourceEvent {
            path: path.into(),
            kind: SourceEventKind::Deleted,
        }
    }
}

pub type EventSender = mpsc::UnboundedSender<SourceEvent>;
pub type EventReceiver = mpsc::UnboundedReceiver<SourceEvent>;

pub fn event_channel() -> (EventSender, EventReceiver) {
    mpsc::unbounded_channel()
}

/// Subscription to change notifications for individual files.
pub trait SourceWatcher: Send {
    fn watch(&mut self, path: &Path) -> Result<()>;
    fn unwatch(&mut self, path: &Path) -> Result<()>;
}

/// Quiet period before a burst of filesystem events is reported.
///
/// Saves that truncate and then write, or write a temporary file and rename
/// it over the source, arrive as one change.
const DEFAULT_DEBOUNCE_MS: u64 = 200;

type TrackedFiles = Arc<Mutex<HashSet<PathBuf>>>;

/// A [`SourceWatcher`] backed by the platform's file notification API.
///
/// Subscriptions are made on the directory holding each source, so a source
/// replaced by a rename keeps being watched. Events for other files in those
/// directories are filtered out. Whether a debounced event is a change or a
/// deletion is decided by whether the file exists when the event is reported.
pub struct NotifyWatcher {
    debouncer: Debouncer<notify::RecommendedWatcher>,
    tracked: TrackedFiles,
    /// Watched directories and how many tracked files each one holds.
    directories: HashMap<PathBuf, usize>,
}

impl NotifyWatcher {
    pub fn new(events: EventSender) -> Result<NotifyWatcher> {
        NotifyWatcher::with_debounce(events, Duration::from_millis(DEFAULT_DEBOUNCE_MS))
    }

    pub fn with_debounce(events: EventSender, debounce: Duration) -> Result<NotifyWatcher> {
        let tracked = TrackedFiles::default();
        let filter = tracked.clone();

        let debouncer = new_debouncer(
            debounce,
            move |res: std::result::Result<Vec<DebouncedEvent>, notify::Error>| match res {
                Ok(batch) => {
                    for event in batch {
                        if !is_tracked(&filter, &event.path) {
                            continue;
                        }
                        let kind = if event.path.exists() {
                            SourceEventKind::Changed
                        } else {
                            SourceEventKind::Deleted
                        };
                        debug!(path = %event.path.display(), ?kind, "Bibliography change detected");
                        if events.send(SourceEvent { path: event.path, kind }).is_err() {
                            debug!("Event receiver dropped, dropping change");
                            return;
                        }
                    }
                }
                Err(e) => warn!(error = %e, "Filesystem watch error"),
            },
        )
        .map_err(|e| CiterError::Watch {
            path: PathBuf::new(),
            message: format!("failed to create filesystem watcher: {e}"),
        })?;

        Ok(NotifyWatcher {
            debouncer,
            tracked,
            directories: HashMap::new(),
        })
    }

    fn tracked(&self) -> MutexGuard<'_, HashSet<PathBuf>> {
        self.tracked.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SourceWatcher for NotifyWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        let dir = parent_dir(path)?;
        if !self.tracked().insert(path.to_path_buf()) {
            return Ok(());
        }

        let count = self.directories.entry(dir.to_path_buf()).or_insert(0);
        *count += 1;
        if *count > 1 {
            return Ok(());
        }

        let subscribed = self
            .debouncer
            .watcher()
            .watch(dir, RecursiveMode::NonRecursive);
        if let Err(e) = subscribed {
            self.directories.remove(dir);
            self.tracked().remove(path);
            return Err(CiterError::Watch {
                path: path.to_path_buf(),
                message: e.to_string(),
            });
        }
        debug!(dir = %dir.display(), "Watching directory");
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        let dir = parent_dir(path)?;
        if !self.tracked().remove(path) {
            return Ok(());
        }

        let Some(count) = self.directories.get_mut(dir) else {
            return Ok(());
        };
        *count -= 1;
        if *count > 0 {
            return Ok(());
        }

        self.directories.remove(dir);
        self.debouncer
            .watcher()
            .unwatch(dir)
            .map_err(|e| CiterError::Watch {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
    }
}

fn parent_dir(path: &Path) -> Result<&Path> {
    path.parent()
        .filter(|dir| !dir.as_os_str().is_empty())
        .ok_or_else(|| CiterError::Watch {
            path: path.to_path_buf(),
            message: "source has no parent directory".to_string(),
        })
}

fn is_tracked(tracked: &TrackedFiles, path: &Path) -> bool {
    tracked
        .lock()
        .unwrap_or_else(PoisonError::into_inner)
        .contains(path)
}

/// What is needed to turn a source path into entries in the store.
pub struct SourceLoader<'a> {
    pub reader: &'a dyn SourceReader,
    pub allow_list: &'a [String],
    pub notices: &'a dyn NoticeSink,
}

impl SourceLoader<'_> {
    /// Parse `path` and replace its entries.
    ///
    /// On failure a notice is emitted and whatever the store held for `path`
    /// is left as it was. Returns whether the entries were replaced.
    pub fn load(&self, path: &Path, store: &mut EntryStore) -> bool {
        let loaded = self
            .reader
            .read_to_string(path)
            .map_err(|source| CiterError::SourceUnreadable {
                path: path.to_path_buf(),
                source,
            })
            .and_then(|content| bibliography::parse(path, &content, self.allow_list));

        match loaded {
            Ok(entries) => {
                debug!(path = %path.display(), entries = entries.len(), "Parsed bibliography");
                store.upsert(path, entries);
                true
            }
            Err(err) => {
                self.notices.notify(Notice::from_error(&err));
                false
            }
        }
    }
}

pub struct WatchCoordinator {
    watcher: Box<dyn SourceWatcher>,
    events: EventReceiver,
    watched: SourceSet,
    forget_unused: bool,
}

impl WatchCoordinator {
    pub fn new(
        watcher: Box<dyn SourceWatcher>,
        events: EventReceiver,
        forget_unused: bool,
    ) -> WatchCoordinator {
        WatchCoordinator {
            watcher,
            events,
            watched: SourceSet::default(),
            forget_unused,
        }
    }

    pub fn watched(&self) -> &SourceSet {
        &self.watched
    }

    /// Apply the result of a discovery pass.
    ///
    /// Newly discovered sources are watched and parsed. Sources missing from
    /// `discovered` are dropped only when unused sources are forgotten.
    pub fn reconcile(
        &mut self,
        discovered: &SourceSet,
        store: &mut EntryStore,
        loader: &SourceLoader,
    ) {
        for path in discovered.iter() {
            if self.watched.contains(path) {
                continue;
            }
            if let Err(err) = self.watcher.watch(path) {
                warn!(path = %path.display(), error = %err, "Failed to watch bibliography");
                loader.notices.notify(Notice::from_error(&err));
            }
            self.watched.insert(path.to_path_buf());
            loader.load(path, store);
        }

        if !self.forget_unused {
            return;
        }

        let stale: Vec<PathBuf> = self
            .watched
            .iter()
            .filter(|path| !discovered.contains(path))
            .map(Path::to_path_buf)
            .collect();
        for path in stale {
            info!(path = %path.display(), "Forgetting unused bibliography");
            self.forget(&path, store);
        }
    }

    /// Apply one change notification. Returns whether it touched a tracked source.
    pub fn on_event(
        &mut self,
        event: &SourceEvent,
        store: &mut EntryStore,
        loader: &SourceLoader,
    ) -> bool {
        if !self.watched.contains(&event.path) {
            debug!(path = %event.path.display(), "Ignoring event for untracked path");
            return false;
        }

        match event.kind {
            SourceEventKind::Changed => {
                loader.load(&event.path, store);
            }
            // Replaced rather than removed, as with a save through a rename.
            SourceEventKind::Deleted if loader.reader.exists(&event.path) => {
                debug!(path = %event.path.display(), "Bibliography replaced, reloading");
                loader.load(&event.path, store);
            }
            SourceEventKind::Deleted => {
                info!(path = %event.path.display(), "Bibliography deleted");
                self.forget(&event.path, store);
            }
        }
        true
    }

    /// Apply every event already waiting in the channel, without blocking.
    pub fn drain(&mut self, store: &mut EntryStore, loader: &SourceLoader) -> usize {
        let mut applied = 0;
        while let Ok(event) = self.events.try_recv() {
            if self.on_event(&event, store, loader) {
                applied += 1;
            }
        }
        applied
    }

    /// Wait for the next event. `None` once every sender is gone.
    pub async fn next_event(&mut self) -> Option<SourceEvent> {
        self.events.recv().await
    }

    fn forget(&mut self, path: &Path, store: &mut EntryStore) {
        if let Err(err) = self.watcher.unwatch(path) {
            debug!(path = %path.display(), error = %err, "Failed to unwatch bibliography");
        }
        self.watched.remove(path);
        store.evict(path);
    }
}

#[cfg(test)]
mod tests {
    use std::fs;
    use std::path::{Path, PathBuf};
    use std::sync::Arc;

    use super::{
        event_channel, is_tracked, NotifyWatcher, SourceEvent, SourceLoader, SourceWatcher,
        WatchCoordinator,
    };
    use crate::discovery::{DiskReader, SourceSet};
    use crate::error::{CiterError, Result};
    use crate::notice::Notice;
    use crate::store::EntryStore;
    use crate::test_utils::{create_test_workspace_dir, RecordingSink, RecordingWatcher};

    struct RefusingWatcher;

    impl SourceWatcher for RefusingWatcher {
        fn watch(&mut self, path: &Path) -> Result<()> {
            Err(CiterError::Watch {
                path: path.to_path_buf(),
                message: "inotify watch limit reached".into(),
            })
        }

        fn unwatch(&mut self, _path: &Path) -> Result<()> {
            Ok(())
        }
    }

    struct Fixture {
        coordinator: WatchCoordinator,
        watcher: RecordingWatcher,
        store: EntryStore,
        sink: Arc<RecordingSink>,
        allow_list: Vec<String>,
    }

    impl Fixture {
        fn new(forget_unused: bool) -> Fixture {
            let watcher = RecordingWatcher::default();
            let (_, events) = event_channel();
            let sink = Arc::new(RecordingSink::default());
            Fixture {
                coordinator: WatchCoordinator::new(Box::new(watcher.clone()), events, forget_unused),
                watcher,
                store: EntryStore::new(sink.clone()),
                sink,
                allow_list: vec!["title".to_string()],
            }
        }

        fn reconcile(&mut self, paths: &[&Path]) {
            let discovered: SourceSet = paths.iter().map(|p| p.to_path_buf()).collect();
            let loader = SourceLoader {
                reader: &DiskReader,
                allow_list: &self.allow_list,
                notices: self.sink.as_ref(),
            };
            self.coordinator
                .reconcile(&discovered, &mut self.store, &loader);
        }

        fn event(&mut self, event: SourceEvent) -> bool {
            let loader = SourceLoader {
                reader: &DiskReader,
                allow_list: &self.allow_list,
                notices: self.sink.as_ref(),
            };
            self.coordinator.on_event(&event, &mut self.store, &loader)
        }

        fn keys(&self) -> Vec<String> {
            self.store
                .all_entries()
                .iter()
                .map(|entry| entry.key.clone())
                .collect()
        }
    }

    fn write_bib(dir: &Path, name: &str, keys: &[&str]) -> PathBuf {
        let path = dir.join(name);
        let content: String = keys
            .iter()
            .map(|key| format!("@misc{{{key}, title = {{{key}}}}}\n"))
            .collect();
        fs::write(&path, content).unwrap();
        path
    }

    #[test]
    fn new_sources_are_watched_and_parsed() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1", "a2"]);
        let mut fixture = Fixture::new(true);

        fixture.reconcile(&[&a]);

        assert_eq!(fixture.keys(), vec!["a1", "a2"]);
        assert_eq!(fixture.watcher.watched(), vec![a.clone()]);
        assert!(fixture.coordinator.watched().contains(&a));
    }

    #[test]
    fn watched_sources_are_not_reparsed_by_discovery() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let mut fixture = Fixture::new(true);

        fixture.reconcile(&[&a]);
        write_bib(&dir, "a.bib", &["changed"]);
        fixture.reconcile(&[&a]);

        assert_eq!(fixture.keys(), vec!["a1"]);
    }

    #[test]
    fn unused_sources_are_forgotten() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let b = write_bib(&dir, "b.bib", &["b1"]);
        let mut fixture = Fixture::new(true);

        fixture.reconcile(&[&a, &b]);
        fixture.reconcile(&[&b]);

        assert_eq!(fixture.keys(), vec!["b1"]);
        assert_eq!(fixture.watcher.watched(), vec![b.clone()]);
        assert!(!fixture.coordinator.watched().contains(&a));
    }

    #[test]
    fn unused_sources_are_kept_without_forgetting() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let b = write_bib(&dir, "b.bib", &["b1"]);
        let mut fixture = Fixture::new(false);

        fixture.reconcile(&[&a, &b]);
        fixture.reconcile(&[&b]);

        assert_eq!(fixture.keys(), vec!["a1", "b1"]);
        assert!(fixture.coordinator.watched().contains(&a));
    }

    #[test]
    fn change_reparses_only_that_source() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let b = write_bib(&dir, "b.bib", &["b1"]);
        let mut fixture = Fixture::new(true);
        fixture.reconcile(&[&a, &b]);

        write_bib(&dir, "a.bib", &["a2"]);
        write_bib(&dir, "b.bib", &["b2"]);
        assert!(fixture.event(SourceEvent::changed(&a)));

        assert_eq!(fixture.keys(), vec!["a2", "b1"]);
    }

    #[test]
    fn malformed_change_keeps_previous_entries() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let mut fixture = Fixture::new(true);
        fixture.reconcile(&[&a]);

        fs::write(&a, "@misc{a1, title = {unterminated\n").unwrap();
        fixture.event(SourceEvent::changed(&a));

        assert_eq!(fixture.keys(), vec!["a1"]);
        let notices = fixture.sink.take();
        assert_eq!(notices.len(), 1);
        assert!(matches!(&notices[0], Notice::ParseMalformed { path, .. } if path == &a));
    }

    #[test]
    fn unreadable_change_keeps_previous_entries() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let mut fixture = Fixture::new(true);
        fixture.reconcile(&[&a]);

        fs::remove_file(&a).unwrap();
        fixture.event(SourceEvent::changed(&a));

        assert_eq!(fixture.keys(), vec!["a1"]);
        assert!(matches!(
            fixture.sink.take().as_slice(),
            [Notice::SourceUnreadable { .. }]
        ));
    }

    #[test]
    fn delete_evicts_regardless_of_policy() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let mut fixture = Fixture::new(false);
        fixture.reconcile(&[&a]);

        fs::remove_file(&a).unwrap();
        assert!(fixture.event(SourceEvent::deleted(&a)));

        assert!(fixture.keys().is_empty());
        assert!(fixture.watcher.watched().is_empty());
        assert!(fixture.coordinator.watched().is_empty());
    }

    #[test]
    fn delete_of_a_replaced_source_reloads_it() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let mut fixture = Fixture::new(true);
        fixture.reconcile(&[&a]);

        let tmp = write_bib(&dir, ".a.bib.tmp", &["a2"]);
        fs::rename(&tmp, &a).unwrap();
        assert!(fixture.event(SourceEvent::deleted(&a)));

        assert_eq!(fixture.keys(), vec!["a2"]);
        assert_eq!(fixture.watcher.watched(), vec![a.clone()]);
        assert!(fixture.coordinator.watched().contains(&a));
    }

    #[test]
    fn failed_watch_is_noticed_and_source_still_loaded() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let sink = Arc::new(RecordingSink::default());
        let (_, events) = event_channel();
        let mut coordinator = WatchCoordinator::new(Box::new(RefusingWatcher), events, true);
        let mut store = EntryStore::new(sink.clone());
        let allow_list = vec!["title".to_string()];
        let loader = SourceLoader {
            reader: &DiskReader,
            allow_list: &allow_list,
            notices: sink.as_ref(),
        };

        let discovered: SourceSet = [a.clone()].into_iter().collect();
        coordinator.reconcile(&discovered, &mut store, &loader);

        assert!(store.find_by_key("a1").is_some());
        assert!(coordinator.watched().contains(&a));
        assert!(matches!(
            sink.take().as_slice(),
            [Notice::WatchFailed { path, .. }] if path == &a
        ));
    }

    #[test]
    fn notify_watcher_shares_directory_subscriptions() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let b = write_bib(&dir, "b.bib", &["b1"]);
        let (sender, _events) = event_channel();
        let mut watcher = NotifyWatcher::new(sender).unwrap();

        watcher.watch(&a).unwrap();
        watcher.watch(&b).unwrap();
        watcher.watch(&b).unwrap();
        assert_eq!(watcher.directories.get(&dir), Some(&2));

        watcher.unwatch(&a).unwrap();
        assert_eq!(watcher.directories.get(&dir), Some(&1));
        assert!(!is_tracked(&watcher.tracked, &a));
        assert!(is_tracked(&watcher.tracked, &b));

        watcher.unwatch(&b).unwrap();
        assert!(watcher.directories.is_empty());
    }

    #[test]
    fn events_for_untracked_paths_are_ignored() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let b = write_bib(&dir, "b.bib", &["b1"]);
        let mut fixture = Fixture::new(true);
        fixture.reconcile(&[&a]);
        fixture.reconcile(&[]);

        assert!(!fixture.event(SourceEvent::changed(&a)));
        assert!(!fixture.event(SourceEvent::changed(&b)));
        assert!(fixture.keys().is_empty());
    }

    #[test]
    fn drain_applies_queued_events() {
        let (_temp, dir) = create_test_workspace_dir();
        let a = write_bib(&dir, "a.bib", &["a1"]);
        let sink = Arc::new(RecordingSink::default());
        let (sender, events) = event_channel();
        let mut coordinator =
            WatchCoordinator::new(Box::new(RecordingWatcher::default()), events, true);
        let mut store = EntryStore::new(sink.clone());
        let allow_list = vec!["title".to_string()];
        let loader = SourceLoader {
            reader: &DiskReader,
            allow_list: &allow_list,
            notices: sink.as_ref(),
        };

        let discovered: SourceSet = [a.clone()].into_iter().collect();
        coordinator.reconcile(&discovered, &mut store, &loader);

        write_bib(&dir, "a.bib", &["a2"]);
        sender.send(SourceEvent::changed(&a)).unwrap();
        sender.send(SourceEvent::changed(dir.join("other.bib"))).unwrap();

        assert_eq!(coordinator.drain(&mut store, &loader), 1);
        assert_eq!(store.find_by_key("a2").map(|e| e.key.as_str()), Some("a2"));
        assert_eq!(coordinator.drain(&mut store, &loader), 0);
    }

    #[tokio::test]
    async fn next_event_receives_sent_events() {
        let (sender, events) = event_channel();
        let mut coordinator =
            WatchCoordinator::new(Box::new(RecordingWatcher::default()), events, true);

        sender.send(SourceEvent::deleted("/refs.bib")).unwrap();
        drop(sender);

        assert_eq!(
            coordinator.next_event().await,
            Some(SourceEvent::deleted("/refs.bib"))
        );
        assert_eq!(coordinator.next_event().await, None);
    }
}

//! End-to-end tracking with the platform file watcher.

use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use tempfile::TempDir;

use citer::config::Settings;
use citer::discovery::DiskReader;
use citer::engine::Citer;
use citer::notice::TracingSink;
use citer::watch::{event_channel, NotifyWatcher};

fn watching_citer(workspace: PathBuf) -> Citer {
    let (sender, events) = event_channel();
    Citer::new(
        Settings::default(),
        Some(workspace),
        Box::new(DiskReader),
        Box::new(NotifyWatcher::new(sender).unwrap()),
        events,
        Arc::new(TracingSink),
    )
}

/// Apply events until `key` is loaded, or give up after a few seconds.
async fn wait_for_key(citer: &mut Citer, key: &str) -> bool {
    let found = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(event) = citer.next_source_event().await {
            citer.on_source_file_event(&event);
            if citer.citation_by_key(key).is_some() {
                return true;
            }
        }
        false
    })
    .await;
    matches!(found, Ok(true))
}

#[tokio::test]
async fn test_edit_on_disk_reaches_the_store() {
    let temp = TempDir::new().unwrap();
    // Canonicalize to handle macOS /var -> /private/var symlinks
    let workspace = temp.path().canonicalize().unwrap();
    let bib = workspace.join("refs.bib");
    fs::write(&bib, "@misc{before, title = {Before}}").unwrap();

    let mut citer = watching_citer(workspace);
    citer.on_active_document_changed("bibliography: [refs.bib]", None);
    assert!(citer.citation_by_key("before").is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    fs::write(&bib, "@misc{after, title = {After}}").unwrap();

    assert!(wait_for_key(&mut citer, "after").await, "change was not picked up");
    assert!(citer.citation_by_key("before").is_none());
}

#[tokio::test]
async fn test_source_replaced_by_rename_stays_tracked() {
    let temp = TempDir::new().unwrap();
    let workspace = temp.path().canonicalize().unwrap();
    let bib = workspace.join("refs.bib");
    fs::write(&bib, "@misc{first, title = {First}}").unwrap();

    let mut citer = watching_citer(workspace.clone());
    citer.on_active_document_changed("bibliography: [refs.bib]", None);
    assert!(citer.citation_by_key("first").is_some());

    tokio::time::sleep(Duration::from_millis(100)).await;
    let tmp = workspace.join(".refs.bib.swp");
    fs::write(&tmp, "@misc{saved, title = {Saved}}").unwrap();
    fs::rename(&tmp, &bib).unwrap();

    assert!(wait_for_key(&mut citer, "saved").await, "atomic save was not picked up");
    assert!(citer.watched_sources().contains(&bib));

    fs::write(&bib, "@misc{later, title = {Later}}").unwrap();

    assert!(wait_for_key(&mut citer, "later").await, "edit after atomic save was lost");
    assert!(citer.watched_sources().contains(&bib));
}

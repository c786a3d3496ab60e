//! Shared test utilities for citer.
//!
//! This module provides common helpers used across multiple test modules.
//! It is only compiled when running tests.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use tempfile::TempDir;

use crate::error::Result;
use crate::notice::{Notice, NoticeSink};
use crate::watch::SourceWatcher;

/// Creates a temporary workspace directory for testing.
///
/// Returns a tuple of (TempDir, PathBuf) where:
/// - TempDir: The temp directory handle (must be kept alive for the test duration)
/// - PathBuf: The canonical path to the workspace subdirectory
///
/// # Example
///
/// ```ignore
/// use crate::test_utils::create_test_workspace_dir;
///
/// let (_temp_dir, workspace) = create_test_workspace_dir();
/// std::fs::write(workspace.join("refs.bib"), "@misc{a, title = {A}}").unwrap();
/// ```
pub fn create_test_workspace_dir() -> (TempDir, PathBuf) {
    let temp_dir = TempDir::new().expect("Failed to create temp directory");
    // Canonicalize to handle macOS /var -> /private/var symlinks
    let workspace = temp_dir
        .path()
        .canonicalize()
        .expect("Failed to canonicalize temp directory")
        .join("workspace");
    fs::create_dir(&workspace).expect("Failed to create workspace subdirectory");
    (temp_dir, workspace)
}

/// A notice sink that keeps every notice for later inspection.
#[derive(Debug, Default)]
pub struct RecordingSink {
    notices: Mutex<Vec<Notice>>,
}

impl RecordingSink {
    /// Returns and clears the notices recorded so far.
    pub fn take(&self) -> Vec<Notice> {
        std::mem::take(&mut *self.notices.lock().unwrap())
    }
}

impl NoticeSink for RecordingSink {
    fn notify(&self, notice: Notice) {
        self.notices.lock().unwrap().push(notice);
    }
}

/// Paths currently subscribed through a [`RecordingWatcher`].
pub type WatchedPaths = Arc<Mutex<Vec<PathBuf>>>;

/// An in-memory watcher: records subscriptions and never produces events.
///
/// Tests deliver events themselves, either through the coordinator's
/// channel sender or by calling the event handler directly.
#[derive(Debug, Default, Clone)]
pub struct RecordingWatcher {
    pub watched: WatchedPaths,
}

impl RecordingWatcher {
    pub fn watched(&self) -> Vec<PathBuf> {
        self.watched.lock().unwrap().clone()
    }
}

impl SourceWatcher for RecordingWatcher {
    fn watch(&mut self, path: &Path) -> Result<()> {
        self.watched.lock().unwrap().push(path.to_path_buf());
        Ok(())
    }

    fn unwatch(&mut self, path: &Path) -> Result<()> {
        self.watched.lock().unwrap().retain(|known| known != path);
        Ok(())
    }
}

//! User-facing notices.
//!
//! Notices are informational: the host decides whether to show them as
//! messages, log them, or drop them. [`TracingSink`] is the default and
//! forwards everything to `tracing`.

use std::path::PathBuf;

use itertools::Itertools;
use tracing::{info, warn};

use crate::error::CiterError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Notice {
    /// Keys that occur more than once across all loaded sources.
    DuplicateKeys(Vec<String>),
    /// A discovered candidate that does not exist, even with `.json`/`.bib` appended.
    SourceNotFound(PathBuf),
    SourceUnreadable { path: PathBuf, reason: String },
    ParseMalformed { path: PathBuf, reason: String },
    /// The source is loaded but edits to it will not be picked up.
    WatchFailed { path: PathBuf, reason: String },
}

impl std::fmt::Display for Notice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Notice::DuplicateKeys(keys) => write!(f, "Duplicate key(s): {}", keys.iter().join(",")),
            Notice::SourceNotFound(path) => {
                write!(f, "Bibliography file not found: {}", path.display())
            }
            Notice::SourceUnreadable { path, reason } => {
                write!(f, "Cannot read {}: {}", path.display(), reason)
            }
            Notice::ParseMalformed { path, reason } => {
                write!(f, "Cannot parse {}: {}", path.display(), reason)
            }
            Notice::WatchFailed { path, reason } => {
                write!(f, "Cannot watch {} for changes: {}", path.display(), reason)
            }
        }
    }
}

impl Notice {
    /// The notice a host sees for a source that failed to load.
    pub fn from_error(err: &CiterError) -> Notice {
        let path = err.path().to_path_buf();
        match err {
            CiterError::SourceUnreadable { source, .. } => Notice::SourceUnreadable {
                path,
                reason: source.to_string(),
            },
            CiterError::ParseMalformed { message, .. } => Notice::ParseMalformed {
                path,
                reason: message.clone(),
            },
            CiterError::UnsupportedFormat { .. } => Notice::ParseMalformed {
                path,
                reason: "unknown bibliography format".to_string(),
            },
            CiterError::Watch { message, .. } => Notice::WatchFailed {
                path,
                reason: message.clone(),
            },
        }
    }
}

pub trait NoticeSink: Send + Sync {
    fn notify(&self, notice: Notice);
}

#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl NoticeSink for TracingSink {
    fn notify(&self, notice: Notice) {
        match &notice {
            Notice::DuplicateKeys(keys) => info!(keys = ?keys, "{notice}"),
            Notice::SourceNotFound(path) => warn!(path = %path.display(), "{notice}"),
            Notice::SourceUnreadable { path, .. }
            | Notice::ParseMalformed { path, .. }
            | Notice::WatchFailed { path, .. } => {
                warn!(path = %path.display(), "{notice}")
            }
        }
    }
}

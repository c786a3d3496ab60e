//! Error taxonomy for bibliography loading and watching.
//!
//! Nothing here is fatal to the host: every variant degrades to fewer or
//! staler suggestions. Duplicate keys and unconfirmed cross-reference syntax
//! are not errors at all; see [`crate::notice::Notice`].

use std::path::{Path, PathBuf};

#[derive(Debug, thiserror::Error)]
pub enum CiterError {
    #[error("cannot read bibliography source {}: {source}", path.display())]
    SourceUnreadable {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("malformed bibliography source {}: {message}", path.display())]
    ParseMalformed { path: PathBuf, message: String },

    #[error("unknown bibliography format for {}", path.display())]
    UnsupportedFormat { path: PathBuf },

    #[error("cannot watch {}: {message}", path.display())]
    Watch { path: PathBuf, message: String },
}

impl CiterError {
    pub fn path(&self) -> &Path {
        match self {
            CiterError::SourceUnreadable { path, .. }
            | CiterError::ParseMalformed { path, .. }
            | CiterError::UnsupportedFormat { path }
            | CiterError::Watch { path, .. } => path,
        }
    }
}

pub type Result<T> = std::result::Result<T, CiterError>;

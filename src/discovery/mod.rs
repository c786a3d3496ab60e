//! Which bibliography sources does a document use?
//!
//! Four rules are evaluated and their results unioned:
//!
//! 1. a single-line `bibliography: [a.bib, b.bib]` anywhere in the text, which
//!    still works when the frontmatter is not valid YAML;
//! 2. the `bibliography` key of the document's YAML frontmatter;
//! 3. the `bibliography` key of the configured root file, relative to that file;
//! 4. the configured default sources, when `use_default_bib` is set.
//!
//! Relative paths resolve against the workspace root, else the document's
//! directory, else the current directory. A candidate that does not exist is
//! retried with `.json` and then `.bib` appended before it is reported as not
//! found and left out. Found sources are canonicalized so that they compare
//! equal to the paths change notifications carry.

mod frontmatter;

pub use frontmatter::{bibliography_entries, extract_frontmatter, has_frontmatter};

use std::collections::HashSet;
use std::ffi::OsString;
use std::path::{Component, Path, PathBuf};

use once_cell::sync::Lazy;
use regex::Regex;
use tracing::debug;

use crate::config::Settings;
use crate::notice::{Notice, NoticeSink};

/// Read-only file access needed by discovery and parsing.
pub trait SourceReader: Send + Sync {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String>;
    fn exists(&self, path: &Path) -> bool;

    /// The form of an existing `path` that change notifications will report.
    fn canonicalize(&self, path: &Path) -> PathBuf {
        path.to_path_buf()
    }
}

#[derive(Debug, Default, Clone, Copy)]
pub struct DiskReader;

impl SourceReader for DiskReader {
    fn read_to_string(&self, path: &Path) -> std::io::Result<String> {
        std::fs::read_to_string(path)
    }

    fn exists(&self, path: &Path) -> bool {
        path.is_file()
    }

    fn canonicalize(&self, path: &Path) -> PathBuf {
        std::fs::canonicalize(path).unwrap_or_else(|_| path.to_path_buf())
    }
}

/// Absolute source paths in discovery order, without duplicates.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct SourceSet(Vec<PathBuf>);

impl SourceSet {
    pub fn insert(&mut self, path: PathBuf) -> bool {
        if self.contains(&path) {
            return false;
        }
        self.0.push(path);
        true
    }

    pub fn remove(&mut self, path: &Path) -> bool {
        let before = self.0.len();
        self.0.retain(|known| known != path);
        before != self.0.len()
    }

    pub fn contains(&self, path: &Path) -> bool {
        self.0.iter().any(|known| known == path)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Path> {
        self.0.iter().map(PathBuf::as_path)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl FromIterator<PathBuf> for SourceSet {
    fn from_iter<T: IntoIterator<Item = PathBuf>>(iter: T) -> Self {
        let mut set = SourceSet::default();
        for path in iter {
            set.insert(path);
        }
        set
    }
}

pub struct SourceDiscovery<'a> {
    pub settings: &'a Settings,
    pub reader: &'a dyn SourceReader,
    pub notices: &'a dyn NoticeSink,
}

impl SourceDiscovery<'_> {
    pub fn discover(
        &self,
        text: &str,
        document_path: Option<&Path>,
        workspace_root: Option<&Path>,
    ) -> SourceSet {
        let resolve = |candidate: &str| resolve_path(candidate, workspace_root, document_path);

        let mut candidates: Vec<PathBuf> = vec![];

        candidates.extend(inline_declaration(text).iter().map(|c| resolve(c.as_str())));

        if let Some(entries) =
            extract_frontmatter(text).and_then(|yaml| bibliography_entries(&yaml))
        {
            candidates.extend(entries.iter().map(|c| resolve(strip_quotes(c))));
        }

        if let Some(root_file) = self.settings.root_file.as_deref().filter(|f| !f.is_empty()) {
            let root_file = resolve(root_file);
            candidates.extend(self.root_file_sources(&root_file, workspace_root, document_path));
        }

        if self.settings.use_default_bib {
            let defaults = self
                .settings
                .default_bib
                .iter()
                .chain(&self.settings.default_bibs)
                .filter(|f| !f.is_empty());
            candidates.extend(defaults.map(|c| resolve(c.as_str())));
        }

        let mut checked: HashSet<PathBuf> = HashSet::new();
        candidates
            .into_iter()
            .filter(|candidate| checked.insert(candidate.clone()))
            .filter_map(|candidate| {
                debug!(path = %candidate.display(), "Looking for bibliography");
                let found = self.probe(&candidate);
                if found.is_none() {
                    self.notices.notify(Notice::SourceNotFound(candidate));
                }
                found
            })
            .collect()
    }

    fn root_file_sources(
        &self,
        root_file: &Path,
        workspace_root: Option<&Path>,
        document_path: Option<&Path>,
    ) -> Vec<PathBuf> {
        if !self.reader.exists(root_file) {
            debug!(path = %root_file.display(), "Root file does not exist");
            return vec![];
        }
        let text = match self.reader.read_to_string(root_file) {
            Ok(text) => text,
            Err(err) => {
                debug!(path = %root_file.display(), error = %err, "Failed to read root file");
                return vec![];
            }
        };

        // A root file without frontmatter is taken to be a YAML metadata file.
        let yaml = if has_frontmatter(&text) {
            extract_frontmatter(&text)
        } else {
            Some(text)
        };

        let root_dir = root_file.parent().unwrap_or(Path::new(""));
        yaml.and_then(|yaml| bibliography_entries(&yaml))
            .unwrap_or_default()
            .iter()
            .map(|entry| {
                let joined = root_dir.join(strip_quotes(entry));
                resolve_path(&joined.to_string_lossy(), workspace_root, document_path)
            })
            .collect()
    }

    /// The candidate itself, or with `.json` / `.bib` appended, canonicalized.
    fn probe(&self, candidate: &Path) -> Option<PathBuf> {
        if self.reader.exists(candidate) {
            return Some(self.reader.canonicalize(candidate));
        }

        [".json", ".bib"].into_iter().find_map(|ext| {
            let mut with_ext = OsString::from(candidate.as_os_str());
            with_ext.push(ext);
            let with_ext = PathBuf::from(with_ext);
            self.reader
                .exists(&with_ext)
                .then(|| self.reader.canonicalize(&with_ext))
        })
    }
}

/// Entries of a single-line `bibliography: [a, b]` declaration, quotes stripped.
fn inline_declaration(text: &str) -> Vec<String> {
    static RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?m)^bibliography:\s*\[(.*)\]").unwrap());

    let Some(caps) = RE.captures(text) else {
        return vec![];
    };

    caps[1]
        .split(',')
        .map(|item| strip_quotes(item.trim()).to_string())
        .filter(|item| !item.is_empty())
        .collect()
}

pub fn strip_quotes(input: &str) -> &str {
    let mut chars = input.chars();
    match (chars.next(), chars.next_back()) {
        (Some(first), Some(last)) if first == last && (first == '"' || first == '\'') => {
            &input[1..input.len() - 1]
        }
        _ => input,
    }
}

/// Absolute path for a candidate as written in a document or in settings.
pub fn resolve_path(
    candidate: &str,
    workspace_root: Option<&Path>,
    document_path: Option<&Path>,
) -> PathBuf {
    let path = PathBuf::from(candidate);
    if path.is_absolute() {
        return normalize(&path);
    }

    let base = workspace_root
        .map(Path::to_path_buf)
        .or_else(|| document_path.and_then(Path::parent).map(Path::to_path_buf))
        .or_else(|| std::env::current_dir().ok());

    match base {
        Some(base) => normalize(&base.join(path)),
        None => path,
    }
}

/// Lexically remove `.` and `..` components.
fn normalize(path: &Path) -> PathBuf {
    let mut normalized = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                normalized.pop();
            }
            other => normalized.push(other.as_os_str()),
        }
    }
    normalized
}

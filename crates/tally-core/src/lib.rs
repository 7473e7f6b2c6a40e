//! # tally-core
//!
//! Recursive, archive-aware word frequency counting.
//!
//! A request maps caller-chosen keys to filesystem roots. Each root is
//! traversed concurrently: every directory becomes one unit of work on a
//! shared rayon pool, nested `.zip` archives are expanded next to
//! themselves and rescanned, and every `.txt` file found along the way is
//! tokenized into one shared frequency table.
//!
//! ## Pipeline
//!
//! ```text
//! WordCounter ──► TraversalCoordinator (one per root)
//!                   │
//!                   ├─ scan(dir) ─► extract archives ─► list .txt ─► schedule subdirs
//!                   │       (many concurrent units, tracked by PendingWork)
//!                   │
//!                   └─ count_all(files) ─► DashMap<word, count> ─► WordFrequencies
//! ```
//!
//! Per-file and per-archive failures are logged and counted in
//! [`TraversalStats`]; they never fail the request.

pub mod aggregate;
pub mod coordinator;
pub mod extract;
pub mod pending;
pub mod request;
pub mod scanner;
pub mod testing;
pub mod tokenizer;

use std::collections::btree_map;
use std::collections::BTreeMap;
use std::io;
use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub use aggregate::{count_all, CountStats};
pub use coordinator::{TraversalCoordinator, TraversalOutcome, TraversalState, TraversalStats};
pub use extract::ArchiveExtractor;
pub use pending::{PendingWork, WorkUnit};
pub use request::WordCounter;

/// Errors that can occur while traversing or extracting
#[derive(Error, Debug)]
pub enum TallyError {
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Invalid archive: {0}")]
    Archive(#[from] zip::result::ZipError),

    #[error("Not a directory: {}", path.display())]
    NotADirectory { path: PathBuf },

    #[error("Failed to build worker pool: {0}")]
    ThreadPool(#[from] rayon::ThreadPoolBuildError),
}

pub type Result<T> = std::result::Result<T, TallyError>;

/// Default extension of the documents whose words are counted
pub const DEFAULT_TEXT_EXTENSION: &str = "txt";

/// Default extension of the archives that are expanded in place
pub const DEFAULT_ARCHIVE_EXTENSION: &str = "zip";

/// Archives nested deeper than this are left unextracted
pub const DEFAULT_MAX_ARCHIVE_DEPTH: usize = 16;

// ============================================================================
// Options
// ============================================================================

/// Traversal options shared by every root of a request
#[derive(Clone, Debug)]
pub struct ScanOptions {
    /// Worker threads in the shared pool (default: num_cpus)
    pub threads: Option<usize>,
    /// Extension of countable documents, without the dot
    pub text_extension: String,
    /// Extension of expandable archives, without the dot
    pub archive_extension: String,
    /// Descend into symlinked directories and count symlinked files
    pub follow_symlinks: bool,
    /// Maximum archive-within-archive nesting that is expanded
    pub max_archive_depth: usize,
    /// Stop scheduling new directories once this much time has elapsed
    pub deadline: Option<Duration>,
    /// Traverse the roots of one request concurrently
    pub concurrent_roots: bool,
}

impl Default for ScanOptions {
    fn default() -> Self {
        Self {
            threads: None,
            text_extension: DEFAULT_TEXT_EXTENSION.to_string(),
            archive_extension: DEFAULT_ARCHIVE_EXTENSION.to_string(),
            follow_symlinks: true,
            max_archive_depth: DEFAULT_MAX_ARCHIVE_DEPTH,
            deadline: None,
            concurrent_roots: true,
        }
    }
}

impl ScanOptions {
    /// Resolved worker count
    pub fn worker_threads(&self) -> usize {
        self.threads.unwrap_or_else(num_cpus::get).max(1)
    }
}

/// Case-insensitive check that `name` ends in `.{extension}`
pub(crate) fn has_extension(name: &str, extension: &str) -> bool {
    let suffix_len = extension.len() + 1;
    if name.len() < suffix_len || !name.is_char_boundary(name.len() - suffix_len) {
        return false;
    }
    let (_, tail) = name.split_at(name.len() - suffix_len);
    tail.starts_with('.') && tail[1..].eq_ignore_ascii_case(extension)
}

// ============================================================================
// Request / Result types
// ============================================================================

/// Request keys mapped to the roots that should be traversed
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RootRequest(BTreeMap<String, PathBuf>);

impl RootRequest {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, key: impl Into<String>, root: impl Into<PathBuf>) {
        self.0.insert(key.into(), root.into());
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, PathBuf> {
        self.0.iter()
    }
}

impl<K: Into<String>, P: Into<PathBuf>> FromIterator<(K, P)> for RootRequest {
    fn from_iter<I: IntoIterator<Item = (K, P)>>(iter: I) -> Self {
        Self(
            iter.into_iter()
                .map(|(k, p)| (k.into(), p.into()))
                .collect(),
        )
    }
}

/// Frozen, word-sorted frequency snapshot for one root
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordFrequencies(BTreeMap<String, u64>);

impl WordFrequencies {
    /// Count for `word`, 0 when absent
    pub fn get(&self, word: &str) -> u64 {
        self.0.get(word).copied().unwrap_or(0)
    }

    /// Number of distinct words
    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    /// Words in lexicographic order
    pub fn iter(&self) -> btree_map::Iter<'_, String, u64> {
        self.0.iter()
    }

    /// Sum of all counts
    pub fn total_words(&self) -> u64 {
        self.0.values().sum()
    }

    pub fn into_inner(self) -> BTreeMap<String, u64> {
        self.0
    }
}

impl FromIterator<(String, u64)> for WordFrequencies {
    fn from_iter<I: IntoIterator<Item = (String, u64)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

/// Request keys mapped to their frequency tables
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WordCountResult(BTreeMap<String, WordFrequencies>);

impl WordCountResult {
    pub fn get(&self, key: &str) -> Option<&WordFrequencies> {
        self.0.get(key)
    }

    pub fn insert(&mut self, key: String, frequencies: WordFrequencies) {
        self.0.insert(key, frequencies);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> btree_map::Iter<'_, String, WordFrequencies> {
        self.0.iter()
    }
}

impl FromIterator<(String, WordFrequencies)> for WordCountResult {
    fn from_iter<I: IntoIterator<Item = (String, WordFrequencies)>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

// ============================================================================
// Tests
// ============================================================================

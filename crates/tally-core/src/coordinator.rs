//! Traversal coordination for one root
//!
//! ```text
//! Scheduling ──(pending work hits zero)──► Counting ──(all files counted)──► Done
//! ```
//!
//! The root scan is registered (count = 1) before it is spawned. Every scan
//! registers its children before its own unit completes, so the count only
//! reaches zero once the whole tree, including directories produced by
//! archive extraction, has been scanned. The coordinator sleeps on the
//! counter's condition variable until that happens.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::Ordering;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rayon::ThreadPool;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::aggregate::count_all;
use crate::scanner::{scan, ScanContext, ScanTask};
use crate::{Result, ScanOptions, TallyError, WordFrequencies};

/// Lifecycle of one traversal
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TraversalState {
    /// Directory scans outstanding
    Scheduling,
    /// All scans finished, files being counted
    Counting,
    /// Frequency snapshot produced
    Done,
}

impl std::fmt::Display for TraversalState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TraversalState::Scheduling => write!(f, "scheduling"),
            TraversalState::Counting => write!(f, "counting"),
            TraversalState::Done => write!(f, "done"),
        }
    }
}

/// Summary of one traversal
#[derive(Debug, Default, Clone, Serialize)]
pub struct TraversalStats {
    pub directories_scanned: u64,
    pub archives_extracted: u64,
    pub archive_failures: u64,
    /// Archives left unextracted because they were nested too deeply
    pub archives_skipped: u64,
    pub text_files: u64,
    pub files_counted: u64,
    pub file_failures: u64,
    pub duration: Duration,
}

/// Result of one traversal
#[derive(Debug, Clone)]
pub struct TraversalOutcome {
    pub frequencies: WordFrequencies,
    pub stats: TraversalStats,
    /// False when the deadline expired and only part of the tree was scanned
    pub completed: bool,
}

impl TraversalOutcome {
    fn empty(duration: Duration) -> Self {
        Self {
            frequencies: WordFrequencies::default(),
            stats: TraversalStats {
                duration,
                ..TraversalStats::default()
            },
            completed: true,
        }
    }
}

/// Drives one root from the first scan to a frozen frequency table
pub struct TraversalCoordinator<'a> {
    pool: &'a ThreadPool,
    root: PathBuf,
    options: ScanOptions,
    state: TraversalState,
}

impl<'a> TraversalCoordinator<'a> {
    pub fn new(pool: &'a ThreadPool, root: impl Into<PathBuf>, options: ScanOptions) -> Self {
        Self {
            pool,
            root: root.into(),
            options,
            state: TraversalState::Scheduling,
        }
    }

    pub fn state(&self) -> TraversalState {
        self.state
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn transition(&mut self, next: TraversalState) {
        debug!(root = %self.root.display(), from = %self.state, to = %next, "Traversal state change");
        self.state = next;
    }

    /// Run the traversal to completion, blocking the calling thread
    ///
    /// Must not be called from a worker of `pool` itself.
    pub fn run(mut self) -> TraversalOutcome {
        let start = Instant::now();

        let root = match resolve_root(&self.root) {
            Ok(root) => root,
            Err(e) => {
                warn!(root = %self.root.display(), error = %e, "Unusable root, returning empty table");
                self.transition(TraversalState::Done);
                return TraversalOutcome::empty(start.elapsed());
            }
        };

        info!(root = %root.display(), threads = self.pool.current_num_threads(), "Starting traversal");

        // Scheduling
        let ctx = Arc::new(ScanContext::new(self.options.clone()));
        let task = ScanTask::root(root.clone(), ctx.pending().register());
        let scan_ctx = Arc::clone(&ctx);
        self.pool.spawn(move || scan(task, &scan_ctx));

        let completed = self.await_scans(&ctx, start);

        // Counting
        self.transition(TraversalState::Counting);
        let files = ctx.text_files();
        let text_files = files.len() as u64;
        debug!(root = %root.display(), files = text_files, "Scans drained, counting words");
        let (frequencies, count_stats) = count_all(self.pool, files);

        // Done
        self.transition(TraversalState::Done);
        let stats = TraversalStats {
            directories_scanned: ctx.counters.directories.load(Ordering::Relaxed),
            archives_extracted: ctx.counters.archives_extracted.load(Ordering::Relaxed),
            archive_failures: ctx.counters.archive_failures.load(Ordering::Relaxed),
            archives_skipped: ctx.counters.archives_skipped.load(Ordering::Relaxed),
            text_files,
            files_counted: count_stats.files_counted,
            file_failures: count_stats.file_failures,
            duration: start.elapsed(),
        };

        info!(
            root = %root.display(),
            directories = stats.directories_scanned,
            archives = stats.archives_extracted,
            files = stats.files_counted,
            words = frequencies.len(),
            completed,
            "Traversal finished in {:?}",
            stats.duration
        );

        TraversalOutcome {
            frequencies,
            stats,
            completed,
        }
    }

    /// Wait for every scan; on deadline expiry stop scheduling and drain
    fn await_scans(&self, ctx: &ScanContext, start: Instant) -> bool {
        let Some(deadline) = self.options.deadline else {
            ctx.pending().wait();
            return true;
        };

        let remaining = deadline.saturating_sub(start.elapsed());
        if ctx.pending().wait_timeout(remaining) {
            return true;
        }

        warn!(
            root = %self.root.display(),
            deadline = ?deadline,
            outstanding = ctx.pending().outstanding(),
            "Traversal deadline reached, returning partial results"
        );
        ctx.cancel();
        ctx.pending().wait();
        false
    }
}

/// Canonical form of a traversal root, which must be an existing directory
pub fn resolve_root(root: &Path) -> Result<PathBuf> {
    let resolved = fs::canonicalize(root)?;
    if !resolved.is_dir() {
        return Err(TallyError::NotADirectory { path: resolved });
    }
    Ok(resolved)
}

// ============================================================================
// Tests
// ============================================================================

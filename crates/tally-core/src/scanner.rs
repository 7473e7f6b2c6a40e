//! Directory scanning
//!
//! One [`ScanTask`] is one unit of work: a single directory. A scan runs four
//! steps in order, each tolerant of the others' failures:
//!
//! 1. expand every archive directly inside the directory
//! 2. record every text file directly inside it
//! 3. schedule a child scan for every subdirectory
//! 4. report the unit complete
//!
//! The listing for steps 2 and 3 is taken after step 1 has finished, so the
//! directories and files an extraction just produced are picked up by the
//! same scan that produced them. Nested archives are therefore unrolled one
//! level per scan until nothing is left to expand.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashSet;
use tracing::{debug, trace, warn};
use walkdir::WalkDir;

use crate::extract::ArchiveExtractor;
use crate::pending::{PendingWork, WorkUnit};
use crate::{has_extension, ScanOptions};

// ============================================================================
// Shared traversal state
// ============================================================================

/// Counters updated by every scan of one traversal
#[derive(Debug, Default)]
pub struct ScanCounters {
    pub directories: AtomicU64,
    pub archives_extracted: AtomicU64,
    pub archive_failures: AtomicU64,
    pub archives_skipped: AtomicU64,
}

/// State shared by every scan of one root
///
/// Created fresh per traversal and handed to each task explicitly.
#[derive(Debug)]
pub struct ScanContext {
    options: ScanOptions,
    extractor: ArchiveExtractor,
    pending: Arc<PendingWork>,
    text_files: DashSet<PathBuf>,
    visited: DashSet<PathBuf>,
    cancelled: AtomicBool,
    pub counters: ScanCounters,
}

impl ScanContext {
    pub fn new(options: ScanOptions) -> Self {
        let extractor = ArchiveExtractor::new(
            options.text_extension.clone(),
            options.archive_extension.clone(),
        );
        Self {
            options,
            extractor,
            pending: PendingWork::new(),
            text_files: DashSet::new(),
            visited: DashSet::new(),
            cancelled: AtomicBool::new(false),
            counters: ScanCounters::default(),
        }
    }

    /// Pending-work counter for this traversal
    pub fn pending(&self) -> &Arc<PendingWork> {
        &self.pending
    }

    /// Stop scheduling new directories; scans already queued still run
    pub fn cancel(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    /// Number of distinct text files discovered so far
    pub fn text_file_count(&self) -> usize {
        self.text_files.len()
    }

    /// Snapshot of the discovered text files, sorted by path
    pub fn text_files(&self) -> Vec<PathBuf> {
        let mut files: Vec<PathBuf> = self.text_files.iter().map(|p| p.key().clone()).collect();
        files.sort();
        files
    }
}

/// One directory to scan, carrying its registered unit of work
#[derive(Debug)]
pub struct ScanTask {
    pub dir: PathBuf,
    /// Number of archive expansions enclosing this directory
    pub archive_depth: usize,
    unit: WorkUnit,
}

impl ScanTask {
    pub fn new(dir: PathBuf, archive_depth: usize, unit: WorkUnit) -> Self {
        Self {
            dir,
            archive_depth,
            unit,
        }
    }

    /// The top-level task of a traversal
    pub fn root(dir: PathBuf, unit: WorkUnit) -> Self {
        Self::new(dir, 0, unit)
    }
}

// ============================================================================
// Scan
// ============================================================================

/// Scan one directory and schedule its children on the current rayon pool
///
/// Completion is reported when the task's unit drops at the end of this
/// call, after every child has been registered.
pub fn scan(task: ScanTask, ctx: &Arc<ScanContext>) {
    let ScanTask {
        dir,
        archive_depth,
        unit,
    } = task;

    if ctx.options.follow_symlinks && !first_visit(&dir, ctx) {
        debug!(dir = %dir.display(), "Directory already scanned through another link");
        return;
    }
    ctx.counters.directories.fetch_add(1, Ordering::Relaxed);
    trace!(dir = %dir.display(), archive_depth, "Scanning directory");

    // Step 1
    let extracted = extract_archives(&dir, archive_depth, ctx);

    // Steps 2 and 3 share one listing taken after extraction
    let listing = list_dir(&dir, ctx.options.follow_symlinks);
    collect_text_files(&listing, ctx);
    schedule_subdirectories(&listing, &extracted, archive_depth, &unit, ctx);

    // Step 4
    drop(unit);
}

/// Entry kinds a scan cares about
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EntryKind {
    File,
    Dir,
}

/// Immediate children of `dir`; unreadable or missing directories list as empty
fn list_dir(dir: &Path, follow_symlinks: bool) -> Vec<(PathBuf, EntryKind)> {
    let mut entries = Vec::new();
    for entry in WalkDir::new(dir)
        .min_depth(1)
        .max_depth(1)
        .follow_links(follow_symlinks)
    {
        match entry {
            Ok(entry) => {
                let file_type = entry.file_type();
                let kind = if file_type.is_dir() {
                    EntryKind::Dir
                } else if file_type.is_file() {
                    EntryKind::File
                } else {
                    continue;
                };
                entries.push((entry.into_path(), kind));
            }
            Err(e) => {
                debug!(dir = %dir.display(), error = %e, "Skipping unreadable entry");
            }
        }
    }
    entries
}

fn file_name_matches(path: &Path, extension: &str) -> bool {
    path.file_name()
        .map(|name| has_extension(&name.to_string_lossy(), extension))
        .unwrap_or(false)
}

fn first_visit(dir: &Path, ctx: &ScanContext) -> bool {
    match fs::canonicalize(dir) {
        Ok(canonical) => ctx.visited.insert(canonical),
        Err(_) => true,
    }
}

/// Expand every archive in `dir`, returning the directories they produced
fn extract_archives(dir: &Path, archive_depth: usize, ctx: &ScanContext) -> Vec<PathBuf> {
    let archives: Vec<PathBuf> = list_dir(dir, ctx.options.follow_symlinks)
        .into_iter()
        .filter(|(path, kind)| {
            *kind == EntryKind::File && file_name_matches(path, &ctx.options.archive_extension)
        })
        .map(|(path, _)| path)
        .collect();

    if archives.is_empty() {
        return Vec::new();
    }

    if archive_depth >= ctx.options.max_archive_depth {
        warn!(
            dir = %dir.display(),
            archives = archives.len(),
            max_depth = ctx.options.max_archive_depth,
            "Archive nesting too deep, leaving archives unextracted"
        );
        ctx.counters
            .archives_skipped
            .fetch_add(archives.len() as u64, Ordering::Relaxed);
        return Vec::new();
    }

    let mut produced = Vec::with_capacity(archives.len());
    for archive in archives {
        match ctx.extractor.extract(&archive) {
            Ok(target) => {
                ctx.counters
                    .archives_extracted
                    .fetch_add(1, Ordering::Relaxed);
                produced.push(target);
            }
            Err(e) => {
                ctx.counters.archive_failures.fetch_add(1, Ordering::Relaxed);
                warn!(archive = %archive.display(), error = %e, "Failed to extract archive, skipping");
            }
        }
    }
    produced
}

fn collect_text_files(listing: &[(PathBuf, EntryKind)], ctx: &ScanContext) {
    for (path, kind) in listing {
        if *kind == EntryKind::File && file_name_matches(path, &ctx.options.text_extension) {
            ctx.text_files.insert(path.clone());
        }
    }
}

/// Register and spawn one child scan per subdirectory
///
/// Extraction outputs are scheduled one archive level deeper; they normally
/// also appear in the listing, and each directory is scheduled once.
fn schedule_subdirectories(
    listing: &[(PathBuf, EntryKind)],
    extracted: &[PathBuf],
    archive_depth: usize,
    unit: &WorkUnit,
    ctx: &Arc<ScanContext>,
) {
    let mut children: BTreeMap<PathBuf, usize> = listing
        .iter()
        .filter(|(_, kind)| *kind == EntryKind::Dir)
        .map(|(path, _)| (path.clone(), archive_depth))
        .collect();
    for dir in extracted {
        children.insert(dir.clone(), archive_depth + 1);
    }

    for (child, child_depth) in children {
        if ctx.is_cancelled() {
            debug!(dir = %child.display(), "Traversal cancelled, not scheduling");
            continue;
        }
        // Registered before it is spawned, while this scan's own unit is
        // still outstanding.
        let task = ScanTask::new(child, child_depth, unit.register_child());
        let ctx = Arc::clone(ctx);
        rayon::spawn(move || scan(task, &ctx));
    }
}

// ============================================================================
// Tests
// ============================================================================

//! Concurrent word aggregation
//!
//! Every discovered text file is counted by its own task on the worker pool.
//! A task tallies its file locally and then merges into one shared
//! `DashMap`, where each word is an atomic increment-or-insert through the
//! entry API. A file that fails to open or read part-way contributes nothing.

use std::collections::HashMap;
use std::fs::File;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rayon::ThreadPool;
use tracing::{debug, warn};

use crate::pending::PendingWork;
use crate::tokenizer::tokenize;
use crate::WordFrequencies;

/// Outcome counters of one counting phase
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CountStats {
    /// Files whose words were added
    pub files_counted: u64,
    /// Files that could not be opened or read
    pub file_failures: u64,
}

/// Thread-safe word -> count accumulator
#[derive(Debug, Default)]
pub struct WordAggregator {
    counts: DashMap<String, u64>,
    files_counted: AtomicU64,
    file_failures: AtomicU64,
}

impl WordAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add one occurrence of every word yielded by `words`
    pub fn add_words<I>(&self, words: I)
    where
        I: IntoIterator<Item = String>,
    {
        for word in words {
            *self.counts.entry(word).or_insert(0) += 1;
        }
    }

    /// Tokenize a file and merge its words; returns the number of words added
    ///
    /// Nothing is merged unless the whole file was read.
    pub fn add_file(&self, path: &Path) -> io::Result<u64> {
        let local = tally_file(path)?;
        let mut total = 0u64;
        for (word, count) in local {
            total += count;
            self.counts
                .entry(word)
                .and_modify(|c| *c += count)
                .or_insert(count);
        }
        Ok(total)
    }

    /// Add a file, logging and recording a failure instead of returning it
    pub fn count_file(&self, path: &Path) {
        match self.add_file(path) {
            Ok(words) => {
                self.files_counted.fetch_add(1, Ordering::Relaxed);
                debug!(path = %path.display(), words, "Counted file");
            }
            Err(e) => {
                self.file_failures.fetch_add(1, Ordering::Relaxed);
                warn!(path = %path.display(), error = %e, "Failed to read text file, skipping");
            }
        }
    }

    pub fn stats(&self) -> CountStats {
        CountStats {
            files_counted: self.files_counted.load(Ordering::Relaxed),
            file_failures: self.file_failures.load(Ordering::Relaxed),
        }
    }

    /// Copy the current counts into a sorted, immutable table
    pub fn snapshot(&self) -> WordFrequencies {
        self.counts
            .iter()
            .map(|entry| (entry.key().clone(), *entry.value()))
            .collect()
    }
}

/// Count words of a single file without touching shared state
fn tally_file(path: &Path) -> io::Result<HashMap<String, u64>> {
    let mut reader = BufReader::new(File::open(path)?);
    let mut local: HashMap<String, u64> = HashMap::new();
    let mut buf = Vec::new();

    loop {
        buf.clear();
        if reader.read_until(b'\n', &mut buf)? == 0 {
            break;
        }
        let line = String::from_utf8_lossy(&buf);
        for word in tokenize(&line) {
            *local.entry(word).or_insert(0) += 1;
        }
    }
    Ok(local)
}

/// Count every file on `pool` and block until all of them are done
///
/// Each file is one registered unit on a counter private to this phase; the
/// snapshot is taken only after the last unit reports.
pub fn count_all(pool: &ThreadPool, files: Vec<PathBuf>) -> (WordFrequencies, CountStats) {
    if files.is_empty() {
        return (WordFrequencies::default(), CountStats::default());
    }

    let aggregator = Arc::new(WordAggregator::new());
    let pending = PendingWork::new();

    for path in files {
        let unit = pending.register();
        let aggregator = Arc::clone(&aggregator);
        pool.spawn(move || {
            let _unit = unit;
            aggregator.count_file(&path);
        });
    }

    pending.wait();
    (aggregator.snapshot(), aggregator.stats())
}

// ============================================================================
// Tests
// ============================================================================

//! Multi-root requests
//!
//! A [`WordCounter`] owns one bounded worker pool that every traversal of
//! every request shares. Each root of a request gets its own coordinator and
//! its own shared state; only the pool is common.

use std::collections::BTreeMap;
use std::path::Path;
use std::thread;

use rayon::{ThreadPool, ThreadPoolBuilder};
use tracing::{error, info};

use crate::coordinator::{TraversalCoordinator, TraversalOutcome};
use crate::{Result, RootRequest, ScanOptions, WordCountResult, WordFrequencies};

/// Counts words under every root of a request
pub struct WordCounter {
    pool: ThreadPool,
    options: ScanOptions,
}

impl std::fmt::Debug for WordCounter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WordCounter")
            .field("threads", &self.pool.current_num_threads())
            .field("options", &self.options)
            .finish()
    }
}

fn create_thread_pool(threads: usize) -> Result<ThreadPool> {
    let pool = ThreadPoolBuilder::new()
        .num_threads(threads)
        .thread_name(|i| format!("tally-worker-{}", i))
        .panic_handler(|payload| {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic".to_string());
            error!(panic = %message, "Worker task panicked; its unit was still reported complete");
        })
        .build()?;
    Ok(pool)
}

impl WordCounter {
    pub fn new(options: ScanOptions) -> Result<Self> {
        let pool = create_thread_pool(options.worker_threads())?;
        Ok(Self { pool, options })
    }

    pub fn options(&self) -> &ScanOptions {
        &self.options
    }

    pub fn threads(&self) -> usize {
        self.pool.current_num_threads()
    }

    /// Traverse one root; a missing root yields an empty table
    pub fn count_root(&self, root: &Path) -> TraversalOutcome {
        TraversalCoordinator::new(&self.pool, root, self.options.clone()).run()
    }

    /// Traverse every root and keep the full outcome per key
    pub fn traverse(&self, request: &RootRequest) -> BTreeMap<String, TraversalOutcome> {
        info!(roots = request.len(), concurrent = self.options.concurrent_roots, "Processing request");

        if !self.options.concurrent_roots || request.len() <= 1 {
            return request
                .iter()
                .map(|(key, root)| (key.clone(), self.count_root(root)))
                .collect();
        }

        // Coordinators only block on their own counters; the scanning and
        // counting itself runs on the shared pool.
        thread::scope(|scope| {
            let handles: Vec<_> = request
                .iter()
                .map(|(key, root)| (key, root, scope.spawn(move || self.count_root(root))))
                .collect();

            handles
                .into_iter()
                .map(|(key, root, handle)| {
                    let outcome = handle.join().unwrap_or_else(|_| {
                        error!(key = %key, root = %root.display(), "Traversal panicked, returning empty table");
                        TraversalOutcome {
                            frequencies: WordFrequencies::default(),
                            stats: Default::default(),
                            completed: false,
                        }
                    });
                    (key.clone(), outcome)
                })
                .collect()
        })
    }

    /// Traverse every root of `request`; one table per key, always
    pub fn count_request(&self, request: &RootRequest) -> WordCountResult {
        self.traverse(request)
            .into_iter()
            .map(|(key, outcome)| (key, outcome.frequencies))
            .collect()
    }
}

//! Multi-threaded traversal of the unified tree.
//!
//! Workers share one LIFO work stack (depth-first), pop a path, resolve it
//! (without classifying), hand it to the caller's callback and push its
//! children. The callback is
//! called by one worker at a time, so it can be a plain `FnMut`.
//!
//! A crawl ends when:
//!
//! - the callback returns `false` (interrupted), or
//! - the stack is empty and no worker holds an item (exhausted), or
//! - idle workers' combined waiting passes the wait ceiling; each idle
//!   worker then retires and the busy ones finish what remains.
//!
//! Directories reached through a symlink are visited but not descended
//! into, which keeps `/sys`'s link web from turning into a cycle.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use serde::Serialize;
use strum::Display;

use crate::config::CrawlConfig;
use crate::engine::Engine;
use crate::filter::{self, FilterRule};
use crate::node::Node;
use crate::path;

/// Crawl parameters.
#[derive(Debug, Clone)]
pub struct CrawlOptions {
    /// Starting paths.
    pub roots: Vec<String>,
    /// Worker count; `None` uses the available parallelism.
    pub threads: Option<usize>,
    /// Idle sleep per attempt.
    pub wait_step: Duration,
    /// Combined idle time after which idle workers retire.
    pub wait_ceiling: Duration,
}

impl Default for CrawlOptions {
    fn default() -> Self {
        Self::from_config(&CrawlConfig::default())
    }
}

impl CrawlOptions {
    pub fn from_config(config: &CrawlConfig) -> Self {
        Self {
            roots: config.roots.clone(),
            threads: config.threads,
            wait_step: Duration::from_millis(config.wait_step_ms),
            wait_ceiling: Duration::from_millis(config.wait_ceiling_ms),
        }
    }

    /// Replace the roots.
    pub fn with_roots<I, S>(mut self, roots: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.roots = roots.into_iter().map(Into::into).collect();
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = Some(threads);
        self
    }

    fn worker_count(&self) -> usize {
        self.threads
            .unwrap_or_else(|| thread::available_parallelism().map_or(1, |n| n.get()))
            .max(1)
    }
}

/// Running counters, as seen by the callback and in the final report.
#[derive(Debug, Clone, Default, Serialize)]
pub struct CrawlStats {
    /// Nodes handed to the callback.
    pub visited: u64,
    /// Paths rejected by the filter chain.
    pub filtered: u64,
    /// Paths waiting on the work stack.
    pub queued: usize,
    /// Combined time idle workers spent waiting.
    pub waited: Duration,
    /// Worker count.
    pub threads: usize,
    /// Time since the crawl started.
    pub elapsed: Duration,
}

/// Why a crawl stopped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, Serialize)]
#[strum(serialize_all = "lowercase")]
#[serde(rename_all = "lowercase")]
pub enum EndReason {
    /// Stopped for a reason the crawler could not tell.
    Undetermined,
    /// The callback asked to stop.
    Interrupted,
    /// Ran out of work.
    Exhausted,
}

/// Outcome of [`foreach`].
#[derive(Debug, Clone, Serialize)]
pub struct CrawlReport {
    pub stats: CrawlStats,
    pub end: EndReason,
}

struct WorkStack {
    stack: Vec<String>,
    // every path ever pushed; a path is queued at most once per crawl
    seen: HashSet<String>,
    in_flight: usize,
}

impl WorkStack {
    fn push(&mut self, path: String) {
        if self.seen.insert(path.clone()) {
            self.stack.push(path);
        }
    }
}

struct Crawl<'a, F> {
    engine: &'a Engine,
    filters: &'a [FilterRule],
    options: &'a CrawlOptions,
    started: Instant,
    work: Mutex<WorkStack>,
    stats: Mutex<CrawlStats>,
    callback: Mutex<F>,
    stop: AtomicBool,
    exhausted: AtomicBool,
}

/// Visit every node reachable from the configured roots.
///
/// `callback` gets each surviving node and a snapshot of the counters;
/// returning `false` stops the crawl. A node is visited at most once per
/// crawl, even when several workers race for it.
#[tracing::instrument(skip_all, fields(roots = ?options.roots))]
pub fn foreach<F>(
    engine: &Engine,
    filters: &[FilterRule],
    options: &CrawlOptions,
    callback: F,
) -> CrawlReport
where
    F: FnMut(&Node, &CrawlStats) -> bool + Send,
{
    let threads = options.worker_count();
    let mut work = WorkStack {
        stack: Vec::new(),
        seen: HashSet::new(),
        in_flight: 0,
    };
    // reversed so the first root is popped first
    for root in options.roots.iter().rev() {
        work.push(path::normalize(root));
    }

    let crawl = Crawl {
        engine,
        filters,
        options,
        started: Instant::now(),
        work: Mutex::new(work),
        stats: Mutex::new(CrawlStats {
            threads,
            ..Default::default()
        }),
        callback: Mutex::new(callback),
        stop: AtomicBool::new(false),
        exhausted: AtomicBool::new(false),
    };

    tracing::debug!(threads, "crawl starting");
    thread::scope(|scope| {
        for id in 0..threads {
            let crawl = &crawl;
            scope.spawn(move || crawl.run(id));
        }
    });

    let end = if crawl.stop.load(Ordering::Acquire) {
        EndReason::Interrupted
    } else if crawl.exhausted.load(Ordering::Acquire) {
        EndReason::Exhausted
    } else {
        EndReason::Undetermined
    };
    let stats = crawl.snapshot();
    tracing::info!(
        visited = stats.visited,
        filtered = stats.filtered,
        elapsed_ms = stats.elapsed.as_millis() as u64,
        %end,
        "crawl finished"
    );
    CrawlReport { stats, end }
}

impl<F> Crawl<'_, F>
where
    F: FnMut(&Node, &CrawlStats) -> bool + Send,
{
    fn run(&self, id: usize) {
        tracing::trace!(worker = id, "worker started");
        loop {
            if self.stop.load(Ordering::Acquire) {
                break;
            }
            let next = {
                let mut work = self.work.lock();
                match work.stack.pop() {
                    Some(path) => {
                        work.in_flight += 1;
                        Some(path)
                    }
                    None if work.in_flight == 0 => {
                        self.exhausted.store(true, Ordering::Release);
                        None
                    }
                    None => None,
                }
            };

            let Some(path) = next else {
                if self.exhausted.load(Ordering::Acquire) || !self.idle() {
                    break;
                }
                continue;
            };

            self.visit(&path);
            self.work.lock().in_flight -= 1;
        }
        tracing::trace!(worker = id, "worker retired");
    }

    /// Wait one step for peers to produce work. Returns false once the
    /// combined wait is past the ceiling.
    fn idle(&self) -> bool {
        let waited = {
            let mut stats = self.stats.lock();
            stats.waited += self.options.wait_step;
            stats.waited
        };
        if waited > self.options.wait_ceiling {
            tracing::debug!(waited_ms = waited.as_millis() as u64, "wait ceiling reached");
            self.exhausted.store(true, Ordering::Release);
            return false;
        }
        thread::sleep(self.options.wait_step);
        true
    }

    fn visit(&self, path: &str) {
        if !filter::include(path, self.filters) {
            self.stats.lock().filtered += 1;
            return;
        }
        let node = self.engine.resolve_fast(path);

        {
            let mut callback = self.callback.lock();
            // a peer may have been told to stop while we waited for the lock
            if self.stop.load(Ordering::Acquire) {
                return;
            }
            self.stats.lock().visited += 1;
            let snapshot = self.snapshot();
            if !(*callback)(&node, &snapshot) {
                tracing::debug!(path = %path, "crawl interrupted by callback");
                self.stop.store(true, Ordering::Release);
                return;
            }
        }

        if node.is_dir() && !node.via_symlink() {
            let children = self.engine.children(&node, &[]);
            let mut work = self.work.lock();
            for name in children.iter().rev() {
                work.push(path::join(node.path(), Some(name)));
            }
        }
    }

    fn snapshot(&self) -> CrawlStats {
        let queued = self.work.lock().stack.len();
        let mut stats = self.stats.lock().clone();
        stats.queued = queued;
        stats.elapsed = self.started.elapsed();
        stats
    }
}

use std::future::Future;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};
use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::Semaphore;
use tracing::{debug, warn};

use crate::error::{AssembleError, Result};

/// Aggregate outcome of a batch run.
///
/// Results arrive in completion order, not submission order; consumers that
/// need a specific order must sort afterwards. When several items fail
/// concurrently, `first_error` is whichever failure completed first.
#[derive(Debug)]
pub struct BatchOutcome<R> {
    pub results: Vec<R>,
    pub first_error: Option<AssembleError>,
    pub attempted: usize,
}

impl<R> BatchOutcome<R> {
    /// Surface the collected error, or hand back the results. Called only
    /// after the whole batch has been attempted.
    pub fn into_result(self) -> Result<Vec<R>> {
        match self.first_error {
            Some(e) => Err(e),
            None => Ok(self.results),
        }
    }
}

/// Bounded-concurrency dispatcher for per-file jobs.
///
/// A failing item never cancels its siblings: every submitted item runs to
/// completion and failures are collected rather than thrown.
pub struct WorkerPool {
    concurrency: usize,
    show_progress: bool,
}

impl WorkerPool {
    pub fn new(concurrency: usize) -> Self {
        Self {
            concurrency: concurrency.max(1),
            show_progress: false,
        }
    }

    /// Size the pool for a batch: one worker per core plus one, but never
    /// more workers than items.
    pub fn for_items(item_count: usize) -> Self {
        let threads = std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
            + 1;
        Self::new(threads.min(item_count.max(1)))
    }

    pub fn with_progress(mut self, show: bool) -> Self {
        self.show_progress = show;
        self
    }

    pub fn concurrency(&self) -> usize {
        self.concurrency
    }

    /// Run `worker` over every item with bounded concurrency and collect
    /// successes and the first failure.
    pub async fn run_all<T, R, F, Fut>(&self, items: Vec<T>, worker: F) -> BatchOutcome<R>
    where
        F: Fn(T) -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        let total = items.len();
        debug!(
            "Dispatching {} items across {} workers",
            total, self.concurrency
        );

        let progress_bar = if self.show_progress && total > 0 {
            let pb = ProgressBar::new(total as u64);
            pb.set_style(
                ProgressStyle::default_bar()
                    .template("{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} files ({eta})")
                    .unwrap_or_else(|_| ProgressStyle::default_bar())
                    .progress_chars("#>-"),
            );
            Some(pb)
        } else {
            None
        };

        let semaphore = Arc::new(Semaphore::new(self.concurrency));
        let mut futures = FuturesUnordered::new();

        for item in items {
            let sem = semaphore.clone();
            let job = worker(item);
            futures.push(async move {
                // waits here while the pool is saturated
                let _permit = sem.acquire().await.expect("semaphore closed");
                job.await
            });
        }

        let mut results = Vec::with_capacity(total);
        let mut first_error = None;
        let mut attempted = 0;

        while let Some(outcome) = futures.next().await {
            attempted += 1;
            if let Some(ref pb) = progress_bar {
                pb.inc(1);
            }
            match outcome {
                Ok(result) => results.push(result),
                Err(e) => {
                    warn!("Item failed: {}", e);
                    if first_error.is_none() {
                        first_error = Some(e);
                    }
                }
            }
        }

        if let Some(pb) = progress_bar {
            pb.finish_and_clear();
        }

        BatchOutcome {
            results,
            first_error,
            attempted,
        }
    }
}

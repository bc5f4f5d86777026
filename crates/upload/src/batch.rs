//! Bounded-concurrency execution of independent async tasks.

use std::future::Future;

use futures_util::future::join_all;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::progress::ProgressSink;

/// Default number of tasks in flight per batch.
pub const DEFAULT_BATCH_SIZE: usize = 8;

/// A task failure, tagged with the task's position in the input.
#[derive(Debug, thiserror::Error)]
#[error("task {index} failed: {source}")]
pub struct BatchError<E> {
    pub index: usize,
    #[source]
    pub source: E,
}

/// Result of a batch run that did not fail.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchSummary {
    pub total: usize,
    /// Tasks that ran to success.
    pub completed: usize,
    /// True when the run stopped at a cancellation check.
    pub cancelled: bool,
}

/// Runs tasks in consecutive batches of at most `batch_size`.
///
/// A batch starts only after every task of the previous batch has
/// settled. If any task in a batch fails, no further batch starts and the
/// error of the lowest-indexed failing task is returned.
#[derive(Debug, Clone, Copy)]
pub struct BatchExecutor {
    batch_size: usize,
}

impl Default for BatchExecutor {
    fn default() -> Self {
        Self::new(DEFAULT_BATCH_SIZE)
    }
}

impl BatchExecutor {
    /// Creates an executor. A zero batch size is raised to one.
    pub fn new(batch_size: usize) -> Self {
        Self {
            batch_size: batch_size.max(1),
        }
    }

    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Runs `tasks`, reporting `100 * batch_len / total` after each batch.
    ///
    /// Futures are only polled once their batch starts, so tasks past a
    /// failure or cancellation never run.
    pub async fn run<I, F, E>(
        &self,
        tasks: I,
        progress: &dyn ProgressSink,
        cancel: &CancellationToken,
    ) -> Result<BatchSummary, BatchError<E>>
    where
        I: IntoIterator<Item = F>,
        F: Future<Output = Result<(), E>>,
    {
        let tasks: Vec<F> = tasks.into_iter().collect();
        let total = tasks.len();
        let mut summary = BatchSummary {
            total,
            ..Default::default()
        };
        if total == 0 {
            return Ok(summary);
        }

        let mut pending = tasks.into_iter();
        let mut batch_start = 0;
        while batch_start < total {
            if cancel.is_cancelled() {
                debug!(completed = summary.completed, total, "batch run cancelled");
                summary.cancelled = true;
                return Ok(summary);
            }

            let batch: Vec<F> = pending.by_ref().take(self.batch_size).collect();
            let batch_len = batch.len();
            let results = join_all(batch).await;

            if let Some((offset, source)) = results
                .into_iter()
                .enumerate()
                .find_map(|(i, r)| r.err().map(|e| (i, e)))
            {
                let index = batch_start + offset;
                warn!(index, batch_start, batch_len, "batch task failed");
                return Err(BatchError { index, source });
            }

            summary.completed += batch_len;
            progress.report(100.0 * batch_len as f64 / total as f64);
            batch_start += batch_len;
        }

        Ok(summary)
    }
}

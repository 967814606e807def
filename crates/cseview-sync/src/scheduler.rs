//! Background, throttled, batched population of the whole tree.

use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

use cseview_core::{FetchError, MergeError, ResourceNode, SyncConfig, TreeStore};
use cseview_fetch::DepthFirstExpander;

use crate::event::SyncEvent;
use crate::progress::{SyncComplete, SyncProgress};

/// Expands top-level branches batch by batch and merges them into the
/// store.
#[derive(Debug, Clone)]
pub struct ProgressiveBatchScheduler {
    store: Arc<TreeStore>,
    expander: DepthFirstExpander,
    batch_size: usize,
    batch_delay: Duration,
    finish_grace: Duration,
}

impl ProgressiveBatchScheduler {
    pub fn new(store: Arc<TreeStore>, expander: DepthFirstExpander, config: &SyncConfig) -> Self {
        Self {
            store,
            expander,
            batch_size: config.effective_batch_size(),
            batch_delay: config.batch_delay(),
            finish_grace: config.finish_grace(),
        }
    }

    /// Populate every entry of `initial`.
    ///
    /// Batches run strictly one after another: batch k+1 starts only after
    /// batch k has been merged and reported. Within a batch all branches are
    /// expanded concurrently. Sending never waits on the receiver.
    pub async fn run(
        &self,
        initial: Vec<Arc<ResourceNode>>,
        events: &mpsc::UnboundedSender<SyncEvent>,
        cancel: &CancellationToken,
    ) -> SyncComplete {
        let start = Instant::now();
        let total = initial.len();
        let batch_count = total.div_ceil(self.batch_size);
        let mut processed = 0;
        let mut complete = SyncComplete::default();

        tracing::info!(total, batch_count, "starting background population");

        for (index, batch) in initial.chunks(self.batch_size).enumerate() {
            if cancel.is_cancelled() {
                complete.cancelled = true;
                break;
            }

            self.run_batch(batch, events, cancel, &mut complete).await;
            if complete.cancelled {
                break;
            }
            processed += batch.len();

            let progress = SyncProgress {
                batches_done: index + 1,
                batch_count,
                processed,
                total,
                elapsed: start.elapsed(),
            };
            tracing::debug!(percent = progress.percentage(), "batch finished");
            let _ = events.send(SyncEvent::Progress(progress));

            if index + 1 < batch_count {
                tokio::select! {
                    _ = cancel.cancelled() => {
                        complete.cancelled = true;
                        break;
                    }
                    _ = tokio::time::sleep(self.batch_delay) => {}
                }
            }
        }

        if !complete.cancelled {
            let done = SyncProgress {
                batches_done: batch_count,
                batch_count,
                processed: total,
                total,
                elapsed: start.elapsed(),
            };
            let _ = events.send(SyncEvent::Progress(done));
            tokio::time::sleep(self.finish_grace).await;
            let _ = events.send(SyncEvent::ProgressFinished);
        }

        complete.elapsed = start.elapsed();
        tracing::info!(summary = %complete.summary(), "background population stopped");
        let _ = events.send(SyncEvent::Complete(complete.clone()));
        complete
    }

    async fn run_batch(
        &self,
        batch: &[Arc<ResourceNode>],
        events: &mpsc::UnboundedSender<SyncEvent>,
        cancel: &CancellationToken,
        complete: &mut SyncComplete,
    ) {
        let mut jobs = Vec::with_capacity(batch.len());
        for node in batch {
            let Some(container) = node.container() else {
                complete.skipped += 1;
                continue;
            };
            let current = self.store.lookup(&container.path);
            if current.is_none_or(|current| current.is_loaded()) {
                complete.skipped += 1;
                continue;
            }
            // Held until the merge, so an on-demand expansion of the same
            // branch sees it as loading.
            let Some(guard) = self.store.begin_loading(&container.path) else {
                complete.skipped += 1;
                continue;
            };
            jobs.push((container, guard));
        }

        let results = join_all(
            jobs.iter()
                .map(|(container, _)| self.expander.expand_subtree(container, cancel)),
        )
        .await;

        // Every loading mark is released before anything is reported.
        let mut report = Vec::new();
        for ((container, guard), result) in jobs.into_iter().zip(results) {
            let path = container.path;
            match result {
                Ok(subtree) => {
                    complete.requests += subtree.requests;
                    complete.unloaded += subtree.failures.len();
                    report.extend(subtree.failures.into_iter().map(|failure| {
                        SyncEvent::SubtreeFailed {
                            path: failure.path,
                            error: failure.error,
                        }
                    }));
                    match self.store.merge_subtree(&path, subtree.children) {
                        Ok(()) => {
                            complete.merged += 1;
                            report.push(SyncEvent::SubtreeLoaded { path });
                        }
                        Err(MergeError::AlreadyLoaded { .. }) => complete.skipped += 1,
                        Err(err) => {
                            tracing::warn!(path = %path, error = %err, "could not merge subtree");
                            complete.failed += 1;
                        }
                    }
                }
                Err(FetchError::Cancelled) => complete.cancelled = true,
                Err(error) => {
                    tracing::warn!(path = %path, error = %error, "subtree failed to load");
                    complete.requests += 1;
                    complete.failed += 1;
                    report.push(SyncEvent::SubtreeFailed { path, error });
                }
            }
            drop(guard);
        }

        for event in report {
            let _ = events.send(event);
        }
    }
}

/// Handle to a running background population.
///
/// Dropping the handle does not stop the work; call [`cancel`](Self::cancel).
#[derive(Debug)]
pub struct ProgressiveLoad {
    /// Progress and result events, ending with [`SyncEvent::Complete`].
    pub events: mpsc::UnboundedReceiver<SyncEvent>,
    cancel: CancellationToken,
    handle: JoinHandle<SyncComplete>,
}

impl ProgressiveLoad {
    /// Stop before the next batch or fetch.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Drain remaining events and wait for the run to end.
    ///
    /// Returns `None` if the task panicked or was aborted.
    pub async fn finish(mut self) -> (Vec<SyncEvent>, Option<SyncComplete>) {
        let mut drained = Vec::new();
        while let Some(event) = self.events.recv().await {
            drained.push(event);
        }
        (drained, self.handle.await.ok())
    }
}

/// Start populating `initial` in the background.
///
/// Returns a handle whose receiver gets progress updates and the final
/// result. The receiver is unbounded: a run never stalls on a slow or
/// absent reader, and it holds at most one event per top-level branch
/// and failure plus one per batch.
pub fn start_progressive_load(
    scheduler: ProgressiveBatchScheduler,
    initial: Vec<Arc<ResourceNode>>,
    cancel: CancellationToken,
) -> ProgressiveLoad {
    let (tx, rx) = mpsc::unbounded_channel();

    let token = cancel.clone();
    let handle = tokio::spawn(async move { scheduler.run(initial, &tx, &token).await });

    ProgressiveLoad {
        events: rx,
        cancel,
        handle,
    }
}

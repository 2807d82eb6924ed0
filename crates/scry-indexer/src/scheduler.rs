use crate::adaptive::AdaptiveConcurrencyController;
use scry_core::constants::EMBEDDING_BATCH_SIZE;
use scry_core::types::EmbeddingSweepReport;
use std::fmt::Display;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};
use tracing::{debug, info, warn};

/// How often the reducer wakes to notice cancellation while batches run.
const CANCEL_POLL: Duration = Duration::from_millis(50);

/// Cooperative stop signal shared between a caller and running batches.
#[derive(Debug, Clone, Default)]
pub struct CancellationToken {
    inner: Arc<TokenState>,
}

#[derive(Debug, Default)]
struct TokenState {
    cancelled: AtomicBool,
    deadline: Option<Instant>,
}

impl CancellationToken {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_deadline(deadline: Instant) -> Self {
        Self {
            inner: Arc::new(TokenState {
                cancelled: AtomicBool::new(false),
                deadline: Some(deadline),
            }),
        }
    }

    pub fn with_timeout(timeout: Duration) -> Self {
        Self::with_deadline(Instant::now() + timeout)
    }

    pub fn cancel(&self) {
        self.inner.cancelled.store(true, Ordering::Release);
    }

    pub fn is_cancelled(&self) -> bool {
        self.inner.cancelled.load(Ordering::Acquire)
            || self
                .inner
                .deadline
                .is_some_and(|deadline| Instant::now() >= deadline)
    }
}

/// Drives `(offset, batch_size) -> items embedded` batches until the source
/// reports an empty batch.
///
/// The item count is never precomputed: the store may grow or shrink under an
/// incremental index while the sweep runs, so only an empty batch ends it.
pub struct EmbeddingScheduler {
    controller: AdaptiveConcurrencyController,
    batch_size: usize,
}

impl EmbeddingScheduler {
    pub fn new(controller: AdaptiveConcurrencyController) -> Self {
        Self {
            controller,
            batch_size: EMBEDDING_BATCH_SIZE,
        }
    }

    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    pub fn controller(&self) -> &AdaptiveConcurrencyController {
        &self.controller
    }

    /// Run the sweep. Batch failures are counted, never returned.
    ///
    /// On cancellation no new batch is submitted, but every batch already
    /// running is awaited: its items count if it finished, and an error it
    /// returns after the token fired counts as aborted, not failed.
    pub fn run<F, E>(&self, batch_fn: F, token: &CancellationToken) -> EmbeddingSweepReport
    where
        F: Fn(usize, usize) -> Result<usize, E> + Sync,
        E: Display + Send,
    {
        let mut report = EmbeddingSweepReport::default();
        let batch_fn = &batch_fn;
        let batch_size = self.batch_size;

        thread::scope(|scope| {
            let (tx, rx) = mpsc::channel::<(usize, Result<usize, E>)>();
            let mut next_offset = 0_usize;
            let mut in_flight = 0_usize;
            let mut exhausted = false;

            loop {
                while !exhausted && !token.is_cancelled() && in_flight < self.controller.current()
                {
                    let tx = tx.clone();
                    let offset = next_offset;
                    scope.spawn(move || {
                        let outcome = batch_fn(offset, batch_size);
                        let _ = tx.send((offset, outcome));
                    });
                    next_offset += batch_size;
                    in_flight += 1;
                    report.batches_submitted += 1;
                }

                if !exhausted && token.is_cancelled() {
                    report.cancelled = true;
                }
                if in_flight == 0 {
                    break;
                }

                let (offset, outcome) = match rx.recv_timeout(CANCEL_POLL) {
                    Ok(completion) => completion,
                    Err(RecvTimeoutError::Timeout) => continue,
                    Err(RecvTimeoutError::Disconnected) => break,
                };
                in_flight -= 1;

                match outcome {
                    Ok(count) => {
                        self.controller.record(true);
                        report.embedded += count;
                        if count == 0 {
                            exhausted = true;
                        }
                    }
                    Err(err) if token.is_cancelled() => {
                        report.aborted_batches += 1;
                        debug!(offset, error = %err, "embedding batch stopped by cancellation");
                    }
                    Err(err) => {
                        self.controller.record(false);
                        report.failed_batches += 1;
                        warn!(offset, error = %err, "embedding batch failed");
                    }
                }
            }
        });

        if report.failed_batches > 0 {
            warn!(
                failed_batches = report.failed_batches,
                embedded = report.embedded,
                "embedding sweep completed with failed batches"
            );
        }
        info!(
            embedded = report.embedded,
            batches = report.batches_submitted,
            aborted = report.aborted_batches,
            cancelled = report.cancelled,
            concurrency = self.controller.current(),
            "embedding sweep finished"
        );
        report
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;
    use std::sync::{Barrier, Mutex};

    fn scheduler(initial: usize, max: usize) -> EmbeddingScheduler {
        EmbeddingScheduler::new(AdaptiveConcurrencyController::new(initial, 1, max))
    }

    #[test]
    fn empty_first_batch_terminates_with_zero() {
        let calls = AtomicUsize::new(0);
        let report = scheduler(1, 1).run(
            |_, _| {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(0)
            },
            &CancellationToken::new(),
        );
        assert_eq!(report.embedded, 0);
        assert_eq!(report.failed_batches, 0);
        assert!(!report.cancelled);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn sweeps_until_source_is_exhausted() {
        let total: usize = 1_050;
        let offsets = Mutex::new(Vec::new());
        let report = scheduler(2, 8).run(
            |offset, limit| {
                offsets.lock().unwrap().push(offset);
                Ok::<_, String>(total.saturating_sub(offset).min(limit))
            },
            &CancellationToken::new(),
        );
        assert_eq!(report.embedded, total);

        let mut offsets = offsets.into_inner().unwrap();
        offsets.sort_unstable();
        // Every offset is distinct and a multiple of the batch size.
        assert!(offsets.windows(2).all(|pair| pair[1] - pair[0] == 100));
        assert_eq!(offsets[0], 0);
        assert!(offsets.contains(&1_100));
    }

    #[test]
    fn failed_batches_are_counted_and_sweep_continues() {
        let report = scheduler(1, 1).with_batch_size(10).run(
            |offset, limit| match offset {
                10 => Err("provider returned 503".to_string()),
                o if o < 40 => Ok(limit),
                _ => Ok(0),
            },
            &CancellationToken::new(),
        );
        assert_eq!(report.failed_batches, 1);
        assert_eq!(report.embedded, 30);
        assert_eq!(report.batches_submitted, 5);
    }

    #[test]
    fn failures_shrink_concurrency() {
        let scheduler = scheduler(4, 8).with_batch_size(1);
        scheduler.run(
            |offset, _| {
                if offset < 12 {
                    Err("timeout")
                } else {
                    Ok(0)
                }
            },
            &CancellationToken::new(),
        );
        assert_eq!(scheduler.controller().current(), 1);
    }

    #[test]
    fn cancellation_stops_submission_and_keeps_partial_total() {
        let token = CancellationToken::new();
        let calls = AtomicUsize::new(0);
        let report = scheduler(1, 1).run(
            |_, limit| {
                if calls.fetch_add(1, Ordering::SeqCst) == 2 {
                    token.cancel();
                }
                Ok::<_, String>(limit)
            },
            &token,
        );
        assert!(report.cancelled);
        assert_eq!(report.embedded, 300);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn batches_running_at_cancellation_are_awaited_and_counted() {
        let token = CancellationToken::new();
        let both_started = Barrier::new(2);
        let report = scheduler(2, 2).run(
            |offset, limit| {
                both_started.wait();
                if offset == 0 {
                    token.cancel();
                } else {
                    thread::sleep(Duration::from_millis(50));
                }
                Ok::<_, String>(limit)
            },
            &token,
        );
        assert!(report.cancelled);
        assert_eq!(report.batches_submitted, 2);
        assert_eq!(report.embedded, 200);
        assert_eq!(report.aborted_batches, 0);
    }

    #[test]
    fn errors_after_cancellation_are_aborted_not_failed() {
        let token = CancellationToken::new();
        let both_started = Barrier::new(2);
        let scheduler = scheduler(2, 2);
        let report = scheduler.run(
            |offset, limit| {
                both_started.wait();
                if offset == 0 {
                    token.cancel();
                    Ok(limit)
                } else {
                    thread::sleep(Duration::from_millis(50));
                    Err("embedding cancelled".to_string())
                }
            },
            &token,
        );
        assert!(report.cancelled);
        assert_eq!(report.embedded, 100);
        assert_eq!(report.aborted_batches, 1);
        assert_eq!(report.failed_batches, 0);
        assert_eq!(scheduler.controller().current(), 2);
    }

    #[test]
    fn expired_deadline_submits_nothing() {
        let token = CancellationToken::with_deadline(Instant::now());
        let report = scheduler(2, 8).run(|_, limit| Ok::<_, String>(limit), &token);
        assert!(report.cancelled);
        assert_eq!(report.batches_submitted, 0);
        assert_eq!(report.embedded, 0);
    }

    #[test]
    fn token_clones_share_state() {
        let token = CancellationToken::new();
        let clone = token.clone();
        clone.cancel();
        assert!(token.is_cancelled());
    }
}

//! Polling loop for one submitted transaction

use super::{CompletionPolicy, OverallStatus, StatusClient, StatusSnapshot};
use crate::error::OrchestratorError;
use crate::tx::OperationHandle;

use futures::future::BoxFuture;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{interval, sleep, Instant, MissedTickBehavior};
use tracing::{debug, info, warn};

/// Invoked once when tracking reaches a terminal state
pub type TerminalCallback = Box<dyn FnOnce(TrackOutcome) -> BoxFuture<'static, ()> + Send>;

#[derive(Debug, Clone, Copy)]
pub struct TrackingOptions {
    pub poll_interval: Duration,
    pub timeout: Duration,
}

/// Terminal result of a tracker
#[derive(Debug, Clone)]
pub enum TrackOutcome {
    Completed {
        snapshot: StatusSnapshot,
        elapsed: Duration,
        polls: u64,
    },
    TimedOut {
        elapsed: Duration,
        polls: u64,
        last: Option<StatusSnapshot>,
    },
    /// The API contradicted itself; tracking stopped without a verdict
    Inconsistent(OrchestratorError),
}

impl TrackOutcome {
    pub fn label(&self) -> &'static str {
        match self {
            TrackOutcome::Completed { .. } => "completed",
            TrackOutcome::TimedOut { .. } => "timeout",
            TrackOutcome::Inconsistent(_) => "inconsistent",
        }
    }
}

/// How the tracker task ended
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrackerExit {
    /// Reached a terminal state and ran the callback
    Terminal,
    /// Stopped by its owner; the callback was not run
    Cancelled,
}

/// Owner's side of a running tracker. Dropping it cancels the tracker.
pub struct TrackerHandle {
    tx_hash: String,
    cancel: watch::Sender<bool>,
    progress: watch::Receiver<Option<StatusSnapshot>>,
    task: JoinHandle<TrackerExit>,
}

impl TrackerHandle {
    pub fn tx_hash(&self) -> &str {
        &self.tx_hash
    }

    /// Stop polling; a terminal callback that has not started will not run
    pub fn cancel(&self) {
        let _ = self.cancel.send(true);
    }

    /// Latest ready snapshot seen by the tracker
    pub fn progress(&self) -> watch::Receiver<Option<StatusSnapshot>> {
        self.progress.clone()
    }

    /// Wait for the tracker task to end
    pub async fn wait(self) -> TrackerExit {
        let TrackerHandle { cancel, task, .. } = self;
        let exit = task.await.unwrap_or(TrackerExit::Cancelled);
        drop(cancel);
        exit
    }
}

pub struct StatusTracker {
    client: Arc<dyn StatusClient>,
}

impl StatusTracker {
    pub fn new(client: Arc<dyn StatusClient>) -> Self {
        Self { client }
    }

    /// Start tracking `handle` on a background task
    pub fn track(
        &self,
        handle: &OperationHandle,
        policy: CompletionPolicy,
        options: TrackingOptions,
        on_terminal: TerminalCallback,
    ) -> TrackerHandle {
        let (cancel_tx, cancel_rx) = watch::channel(false);
        let (progress_tx, progress_rx) = watch::channel(None);
        let tx_hash = handle.tx_hash_hex();

        info!(
            operation_id = %handle.id,
            "Tracking {} {} every {:?} (timeout {:?})",
            handle.kind, tx_hash, options.poll_interval, options.timeout
        );

        let run = TrackerRun {
            client: self.client.clone(),
            handle: handle.clone(),
            tx_hash: tx_hash.clone(),
            policy,
            options,
            progress: progress_tx,
        };
        let task = tokio::spawn(run.run(cancel_rx, on_terminal));

        TrackerHandle {
            tx_hash,
            cancel: cancel_tx,
            progress: progress_rx,
            task,
        }
    }
}

struct TrackerRun {
    client: Arc<dyn StatusClient>,
    handle: OperationHandle,
    tx_hash: String,
    policy: CompletionPolicy,
    options: TrackingOptions,
    progress: watch::Sender<Option<StatusSnapshot>>,
}

fn is_cancelled(cancel: &watch::Receiver<bool>) -> bool {
    *cancel.borrow() || cancel.has_changed().is_err()
}

impl TrackerRun {
    async fn run(
        self,
        mut cancel: watch::Receiver<bool>,
        on_terminal: TerminalCallback,
    ) -> TrackerExit {
        let kind = self.handle.kind;
        let started = Instant::now();
        let deadline = sleep(self.options.timeout);
        tokio::pin!(deadline);

        // First tick fires immediately
        let mut ticker = interval(self.options.poll_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut polls: u64 = 0;
        let mut last_ready: Option<StatusSnapshot> = None;
        let mut failure_logged = false;

        let outcome = loop {
            tokio::select! {
                biased;

                changed = cancel.changed() => {
                    if changed.is_err() || *cancel.borrow() {
                        debug!("Tracker for {} cancelled", self.tx_hash);
                        return TrackerExit::Cancelled;
                    }
                }

                _ = &mut deadline => {
                    break TrackOutcome::TimedOut {
                        elapsed: started.elapsed(),
                        polls,
                        last: last_ready.take(),
                    };
                }

                _ = ticker.tick() => {
                    polls += 1;
                    let poll = polls;
                    let snapshot = match self.client.details_by_tx_hash(&self.tx_hash).await {
                        Ok(snapshot) => snapshot,
                        Err(e) => {
                            debug!("Poll {} for {} failed: {}", poll, self.tx_hash, e);
                            crate::metrics::record_poll(kind, false);
                            continue;
                        }
                    };
                    crate::metrics::record_poll(kind, true);
                    debug!(
                        "Poll {} for {}: {:?}, {}/{} payloads executed",
                        poll,
                        self.tx_hash,
                        snapshot.overall,
                        snapshot.executed_count(),
                        snapshot.payloads.len()
                    );

                    if let Some(previous) = &last_ready {
                        if let Err(regression) = snapshot.check_progress(previous) {
                            break TrackOutcome::Inconsistent(OrchestratorError::StatusRegression {
                                tx_hash: self.tx_hash.clone(),
                                index: regression.index,
                                chain_slug: regression.chain_id,
                            });
                        }
                    }

                    if self.policy.is_satisfied(&snapshot) {
                        break TrackOutcome::Completed {
                            snapshot,
                            elapsed: started.elapsed(),
                            polls: poll,
                        };
                    }

                    if snapshot.overall == OverallStatus::Failed && !failure_logged {
                        warn!("Request {} reports FAILED; still polling until timeout", self.tx_hash);
                        failure_logged = true;
                    }

                    if snapshot.is_ready() {
                        self.progress.send_replace(Some(snapshot.clone()));
                        last_ready = Some(snapshot);
                    }
                }
            }
        };

        if is_cancelled(&cancel) {
            debug!("Tracker for {} cancelled before reporting", self.tx_hash);
            return TrackerExit::Cancelled;
        }

        if let TrackOutcome::Completed { snapshot, .. } = &outcome {
            self.progress.send_replace(Some(snapshot.clone()));
        }

        match &outcome {
            TrackOutcome::Completed { elapsed, polls, .. } => info!(
                operation_id = %self.handle.id,
                "{} {} completed after {} polls ({:?})",
                kind, self.tx_hash, polls, elapsed
            ),
            TrackOutcome::TimedOut { elapsed, .. } => warn!(
                operation_id = %self.handle.id,
                "{} {} timed out after {:?}",
                kind, self.tx_hash, elapsed
            ),
            TrackOutcome::Inconsistent(e) => warn!(
                operation_id = %self.handle.id,
                "{} tracking stopped: {}",
                kind, e
            ),
        }
        crate::metrics::record_tracker_outcome(kind, outcome.label(), started.elapsed());

        on_terminal(outcome).await;
        TrackerExit::Terminal
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::OrchestratorError;
    use crate::status::snapshot::tests::snapshot;
    use crate::status::testing::ScriptedStatus;
    use crate::tx::OperationKind;
    use chrono::Utc;
    use ethers::types::H256;
    use std::sync::Mutex;
    use uuid::Uuid;

    fn handle(kind: OperationKind) -> OperationHandle {
        OperationHandle {
            id: Uuid::new_v4(),
            kind,
            tx_hash: H256::repeat_byte(0x42),
            chain_id: 43,
            submitted_at: Utc::now(),
            explorer_url: String::new(),
        }
    }

    fn options(poll_ms: u64, timeout_ms: u64) -> TrackingOptions {
        TrackingOptions {
            poll_interval: Duration::from_millis(poll_ms),
            timeout: Duration::from_millis(timeout_ms),
        }
    }

    type Outcomes = Arc<Mutex<Vec<TrackOutcome>>>;

    fn recorder() -> (Outcomes, TerminalCallback) {
        let outcomes: Outcomes = Arc::new(Mutex::new(Vec::new()));
        let sink = outcomes.clone();
        let callback: TerminalCallback = Box::new(move |outcome| {
            Box::pin(async move {
                sink.lock().unwrap().push(outcome);
            })
        });
        (outcomes, callback)
    }

    #[tokio::test(start_paused = true)]
    async fn test_stops_after_poll_that_satisfies_policy() {
        let status = Arc::new(ScriptedStatus::new(|call| {
            Ok(match call {
                1 => StatusSnapshot::pending(),
                2 => snapshot(OverallStatus::Success, &[false]),
                _ => snapshot(OverallStatus::Success, &[true]),
            })
        }));
        let (outcomes, callback) = recorder();

        let tracker = StatusTracker::new(status.clone());
        let running = tracker.track(
            &handle(OperationKind::Deposit),
            CompletionPolicy::FirstPayloadExecuted,
            options(1_000, 600_000),
            callback,
        );

        assert_eq!(running.wait().await, TrackerExit::Terminal);
        sleep(Duration::from_secs(30)).await;

        assert_eq!(status.calls(), 3);
        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TrackOutcome::Completed { polls: 3, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_transient_failures_are_swallowed() {
        let status = Arc::new(ScriptedStatus::new(|call| match call {
            1 | 2 => Err(OrchestratorError::TransientPoll("connection reset".into())),
            _ => Ok(snapshot(OverallStatus::Completed, &[true])),
        }));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Transfer),
            CompletionPolicy::RequestCompleted,
            options(5_000, 600_000),
            callback,
        );

        assert_eq!(running.wait().await, TrackerExit::Terminal);
        assert_eq!(status.calls(), 3);
        assert_eq!(outcomes.lock().unwrap().len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_reported_once_without_further_polls() {
        let status = Arc::new(ScriptedStatus::new(|_| Ok(StatusSnapshot::pending())));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Mint),
            CompletionPolicy::FirstPayloadExecuted,
            options(1_000, 4_500),
            callback,
        );

        assert_eq!(running.wait().await, TrackerExit::Terminal);
        let polls_at_timeout = status.calls();
        assert_eq!(polls_at_timeout, 5);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(status.calls(), polls_at_timeout);

        let outcomes = outcomes.lock().unwrap();
        assert_eq!(outcomes.len(), 1);
        assert!(matches!(outcomes[0], TrackOutcome::TimedOut { polls: 5, .. }));
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_request_keeps_polling_until_timeout() {
        let status = Arc::new(ScriptedStatus::new(|_| {
            Ok(snapshot(OverallStatus::Failed, &[false]))
        }));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Transfer),
            CompletionPolicy::RequestCompleted,
            options(5_000, 12_000),
            callback,
        );

        assert_eq!(running.wait().await, TrackerExit::Terminal);
        assert_eq!(status.calls(), 3);
        assert!(matches!(
            outcomes.lock().unwrap()[0],
            TrackOutcome::TimedOut { .. }
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancelled_tracker_never_reports() {
        let status = Arc::new(ScriptedStatus::new(|_| Ok(StatusSnapshot::pending())));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Deposit),
            CompletionPolicy::FirstPayloadExecuted,
            options(1_000, 600_000),
            callback,
        );

        sleep(Duration::from_millis(2_500)).await;
        running.cancel();
        assert_eq!(running.wait().await, TrackerExit::Cancelled);

        let polls_at_cancel = status.calls();
        assert_eq!(polls_at_cancel, 3);
        sleep(Duration::from_secs(60)).await;
        assert_eq!(status.calls(), polls_at_cancel);
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropping_handle_cancels() {
        let status = Arc::new(ScriptedStatus::new(|_| Ok(StatusSnapshot::pending())));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Deploy),
            CompletionPolicy::RequestCompleted,
            options(5_000, 600_000),
            callback,
        );
        sleep(Duration::from_millis(100)).await;
        drop(running);

        sleep(Duration::from_secs(60)).await;
        assert_eq!(status.calls(), 1);
        assert!(outcomes.lock().unwrap().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_regression_stops_tracking() {
        let status = Arc::new(ScriptedStatus::new(|call| {
            Ok(match call {
                1 => snapshot(OverallStatus::Success, &[true, false]),
                _ => snapshot(OverallStatus::Success, &[false, false]),
            })
        }));
        let (outcomes, callback) = recorder();

        let running = StatusTracker::new(status.clone()).track(
            &handle(OperationKind::Transfer),
            CompletionPolicy::RequestCompleted,
            options(5_000, 600_000),
            callback,
        );

        assert_eq!(running.wait().await, TrackerExit::Terminal);
        let outcomes = outcomes.lock().unwrap();
        assert!(matches!(
            &outcomes[0],
            TrackOutcome::Inconsistent(OrchestratorError::StatusRegression { index: 0, .. })
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_progress_reports_latest_ready_snapshot() {
        let status = Arc::new(ScriptedStatus::new(|call| {
            Ok(match call {
                1 => snapshot(OverallStatus::Success, &[false, false]),
                2 => snapshot(OverallStatus::Success, &[true, false]),
                _ => snapshot(OverallStatus::Completed, &[true, true]),
            })
        }));
        let (_outcomes, callback) = recorder();

        let running = StatusTracker::new(status).track(
            &handle(OperationKind::Deploy),
            CompletionPolicy::RequestCompleted,
            options(5_000, 600_000),
            callback,
        );
        let progress = running.progress();

        running.wait().await;
        let latest = progress.borrow().clone().unwrap();
        assert_eq!(latest.overall, OverallStatus::Completed);
        assert_eq!(latest.executed_count(), 2);
    }
}

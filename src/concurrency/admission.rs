// Concurrency admission - bounded execution with priority-ordered queueing
// Author: kelexine (https://github.com/kelexine)
//
// Direct `execute` calls and background `enqueue` calls share one admission
// path: a counting gate plus three FIFO buckets. Whenever a slot frees up (or
// the limits change) `dispatch` hands it to the oldest High waiter, then
// Normal, then Low. A request that finds the gate open and nobody queued is
// admitted on the spot; everyone else waits in line.

use crate::concurrency::models::{ConcurrencyConfig, ConcurrencyStatus, Priority};
use crate::error::{GuardError, Result, TimeoutKind};
use crate::metrics;
use parking_lot::Mutex;
use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::task::{Context, Poll};
use std::time::Duration;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};
use uuid::Uuid;

struct Waiter {
    id: Uuid,
    enqueued_at: Instant,
    timeout: Duration,
    grant: oneshot::Sender<()>,
}

#[derive(Debug, Default)]
struct Counters {
    total_submitted: u64,
    admitted: u64,
    completed: u64,
    rejected: u64,
    timed_out: u64,
    cancelled: u64,
    total_queue_wait: Duration,
}

#[derive(Debug, Clone, Copy)]
enum Abandon {
    TimedOut,
    Cancelled,
}

struct AdmissionState {
    config: ConcurrencyConfig,
    active: usize,
    queues: [VecDeque<Waiter>; 3],
    counters: Counters,
}

impl AdmissionState {
    fn queued(&self) -> usize {
        self.queues.iter().map(VecDeque::len).sum()
    }

    /// Grant free slots to waiters, highest priority first, FIFO within a
    /// priority. Waiters already past their timeout are dropped unserved.
    fn dispatch(&mut self, now: Instant) {
        while self.active < self.config.max_concurrent {
            let Some(waiter) = self.queues.iter_mut().find_map(VecDeque::pop_front) else {
                break;
            };

            let waited = now.saturating_duration_since(waiter.enqueued_at);
            if waited >= waiter.timeout {
                // Dropping the sender wakes the waiter, which reports the timeout.
                self.counters.timed_out += 1;
                metrics::record_admission("timed_out");
                continue;
            }

            if waiter.grant.send(()).is_ok() {
                self.active += 1;
                self.counters.admitted += 1;
                self.counters.total_queue_wait += waited;
                metrics::record_admission("admitted");
            }
        }
        self.publish();
    }

    fn remove(&mut self, id: Uuid, priority: Priority) -> bool {
        let queue = &mut self.queues[priority.index()];
        match queue.iter().position(|waiter| waiter.id == id) {
            Some(pos) => {
                queue.remove(pos);
                true
            }
            None => false,
        }
    }

    fn record_abandon(&mut self, reason: Abandon) {
        match reason {
            Abandon::TimedOut => {
                self.counters.timed_out += 1;
                metrics::record_admission("timed_out");
            }
            Abandon::Cancelled => {
                self.counters.cancelled += 1;
                metrics::record_admission("cancelled");
            }
        }
    }

    fn release(&mut self, cancelled: bool, now: Instant) {
        self.active = self.active.saturating_sub(1);
        if cancelled {
            self.counters.cancelled += 1;
            metrics::record_admission("cancelled");
        } else {
            self.counters.completed += 1;
            metrics::record_admission("completed");
        }
        self.dispatch(now);
    }

    fn publish(&self) {
        metrics::update_admission_load(self.active, self.queued());
    }
}

struct Shared {
    state: Mutex<AdmissionState>,
}

/// One occupied execution slot. Dropping it frees the slot and dispatches
/// the next waiter.
pub struct AdmissionPermit {
    shared: Arc<Shared>,
    cancelled: bool,
}

impl AdmissionPermit {
    fn new(shared: Arc<Shared>) -> Self {
        Self {
            shared,
            cancelled: false,
        }
    }

    /// Release the slot, recording whether the operation was cancelled.
    /// Dropping the permit records a completion.
    pub fn finish(mut self, cancelled: bool) {
        self.cancelled = cancelled;
    }
}

impl Drop for AdmissionPermit {
    fn drop(&mut self) {
        let mut state = self.shared.state.lock();
        state.release(self.cancelled, Instant::now());
    }
}

enum Wake {
    Granted,
    Expired,
    Cancelled,
    TimedOut,
}

/// A place in the queue. Dropping an unresolved ticket leaves the queue.
struct Ticket {
    shared: Arc<Shared>,
    id: Uuid,
    priority: Priority,
    enqueued_at: Instant,
    timeout: Duration,
    grant: oneshot::Receiver<()>,
    resolved: bool,
}

impl Ticket {
    async fn wait(mut self, cancel: &CancellationToken) -> Result<AdmissionPermit> {
        let deadline = self.enqueued_at + self.timeout;
        let wake = tokio::select! {
            biased;
            granted = &mut self.grant => {
                if granted.is_ok() { Wake::Granted } else { Wake::Expired }
            }
            _ = cancel.cancelled() => Wake::Cancelled,
            _ = tokio::time::sleep_until(deadline) => Wake::TimedOut,
        };

        match wake {
            Wake::Granted => {
                self.resolved = true;
                Ok(AdmissionPermit::new(Arc::clone(&self.shared)))
            }
            Wake::Expired => {
                self.resolved = true;
                Err(self.timeout_error())
            }
            Wake::Cancelled => {
                self.abandon(Abandon::Cancelled);
                Err(GuardError::Cancelled)
            }
            Wake::TimedOut => {
                self.abandon(Abandon::TimedOut);
                debug!("Request {} timed out waiting for admission", self.id);
                Err(self.timeout_error())
            }
        }
    }

    fn timeout_error(&self) -> GuardError {
        GuardError::Timeout {
            kind: TimeoutKind::Request,
            configured: self.timeout,
            elapsed: self.enqueued_at.elapsed(),
        }
    }

    fn abandon(&mut self, reason: Abandon) {
        self.resolved = true;
        let mut state = self.shared.state.lock();
        if state.remove(self.id, self.priority) {
            state.record_abandon(reason);
            state.publish();
            return;
        }

        // Already dequeued. If a slot was granted in the meantime, hand it back.
        if self.grant.try_recv().is_ok() {
            state.active = state.active.saturating_sub(1);
            state.record_abandon(reason);
            state.dispatch(Instant::now());
        }
    }
}

impl Drop for Ticket {
    fn drop(&mut self) {
        if !self.resolved {
            self.abandon(Abandon::Cancelled);
        }
    }
}

enum Registration {
    Admitted(AdmissionPermit),
    Queued(Ticket),
}

impl Registration {
    async fn into_permit(self, cancel: &CancellationToken) -> Result<AdmissionPermit> {
        match self {
            Registration::Admitted(permit) => Ok(permit),
            Registration::Queued(ticket) => ticket.wait(cancel).await,
        }
    }
}

/// Handle to a request placed with [`ConcurrencyAdmission::enqueue`].
///
/// Resolves once the dispatcher has run the operation (or it timed out or was
/// cancelled). Dropping the handle does not cancel the request; call
/// [`QueuedHandle::cancel`] for that.
pub struct QueuedHandle<T> {
    id: Uuid,
    priority: Priority,
    cancel: CancellationToken,
    task: JoinHandle<Result<T>>,
}

impl<T> QueuedHandle<T> {
    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn priority(&self) -> Priority {
        self.priority
    }

    pub fn cancel(&self) {
        self.cancel.cancel();
    }
}

impl<T> Future for QueuedHandle<T> {
    type Output = Result<T>;

    fn poll(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        match Pin::new(&mut this.task).poll(cx) {
            Poll::Pending => Poll::Pending,
            Poll::Ready(Ok(result)) => Poll::Ready(result),
            Poll::Ready(Err(join_error)) if join_error.is_cancelled() => {
                Poll::Ready(Err(GuardError::Cancelled))
            }
            Poll::Ready(Err(join_error)) => Poll::Ready(Err(GuardError::Unknown(format!(
                "queued operation panicked: {}",
                join_error
            )))),
        }
    }
}

/// Bounds how many operations run at once and orders everyone else.
pub struct ConcurrencyAdmission {
    shared: Arc<Shared>,
}

impl ConcurrencyAdmission {
    pub fn new(config: ConcurrencyConfig) -> Self {
        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(AdmissionState {
                    config: ConcurrencyConfig {
                        max_concurrent: config.max_concurrent.max(1),
                        ..config
                    },
                    active: 0,
                    queues: [VecDeque::new(), VecDeque::new(), VecDeque::new()],
                    counters: Counters::default(),
                }),
            }),
        }
    }

    fn register(&self, id: Uuid, priority: Priority, timeout: Option<Duration>) -> Result<Registration> {
        let now = Instant::now();
        let mut state = self.shared.state.lock();
        let timeout = timeout.unwrap_or(state.config.queue_timeout);
        let queued = state.queued();

        if state.active + queued >= state.config.max_queue_size {
            state.counters.rejected += 1;
            metrics::record_admission("rejected");
            warn!(
                "Rejecting {} priority request: {} active, {} queued",
                priority, state.active, queued
            );
            return Err(GuardError::Backpressure {
                active: state.active,
                queued,
                max_queue_size: state.config.max_queue_size,
            });
        }

        state.counters.total_submitted += 1;
        if queued == 0 && state.active < state.config.max_concurrent {
            state.active += 1;
            state.counters.admitted += 1;
            metrics::record_admission("admitted");
            state.publish();
            return Ok(Registration::Admitted(AdmissionPermit::new(Arc::clone(
                &self.shared,
            ))));
        }

        let (tx, rx) = oneshot::channel();
        state.queues[priority.index()].push_back(Waiter {
            id,
            enqueued_at: now,
            timeout,
            grant: tx,
        });
        state.publish();
        debug!(
            "Queued request {} at {} priority ({} waiting)",
            id,
            priority,
            queued + 1
        );

        Ok(Registration::Queued(Ticket {
            shared: Arc::clone(&self.shared),
            id,
            priority,
            enqueued_at: now,
            timeout,
            grant: rx,
            resolved: false,
        }))
    }

    /// Wait for an execution slot. `timeout` defaults to the configured queue timeout.
    /// The slot is held until the permit is dropped or passed to
    /// [`AdmissionPermit::finish`].
    pub async fn admit(
        &self,
        priority: Priority,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
    ) -> Result<AdmissionPermit> {
        let registration = self.register(Uuid::new_v4(), priority, timeout)?;
        registration.into_permit(cancel).await
    }

    /// Wait for a slot in the caller's task, then run `operation` while holding it.
    pub async fn execute<F, Fut, T>(
        &self,
        priority: Priority,
        timeout: Option<Duration>,
        cancel: &CancellationToken,
        operation: F,
    ) -> Result<T>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let permit = self.admit(priority, timeout, cancel).await?;
        run_admitted(permit, cancel, operation).await
    }

    /// Queue `operation` and return at once. A background task waits for the
    /// dispatcher and runs it. Rejected synchronously when the queue is full.
    pub fn enqueue<F, Fut, T>(
        &self,
        priority: Priority,
        timeout: Option<Duration>,
        operation: F,
    ) -> Result<QueuedHandle<T>>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let id = Uuid::new_v4();
        let registration = self.register(id, priority, timeout)?;
        let cancel = CancellationToken::new();
        let task_cancel = cancel.clone();

        let task = tokio::spawn(async move {
            let permit = registration.into_permit(&task_cancel).await?;
            run_admitted(permit, &task_cancel, operation).await
        });

        Ok(QueuedHandle {
            id,
            priority,
            cancel,
            task,
        })
    }

    /// Apply new limits. Raising the limit dispatches waiters immediately;
    /// lowering it lets running operations finish.
    pub fn reconfigure(&self, config: ConcurrencyConfig) {
        let mut state = self.shared.state.lock();
        state.config = ConcurrencyConfig {
            max_concurrent: config.max_concurrent.max(1),
            ..config
        };
        state.dispatch(Instant::now());
    }

    pub fn config(&self) -> ConcurrencyConfig {
        self.shared.state.lock().config.clone()
    }

    pub fn status(&self) -> ConcurrencyStatus {
        let state = self.shared.state.lock();
        let c = &state.counters;
        ConcurrencyStatus {
            max_concurrent: state.config.max_concurrent,
            max_queue_size: state.config.max_queue_size,
            active: state.active,
            queued: state.queued(),
            queued_high: state.queues[Priority::High.index()].len(),
            queued_normal: state.queues[Priority::Normal.index()].len(),
            queued_low: state.queues[Priority::Low.index()].len(),
            total_submitted: c.total_submitted,
            admitted: c.admitted,
            completed: c.completed,
            rejected: c.rejected,
            timed_out: c.timed_out,
            cancelled: c.cancelled,
            average_queue_wait_ms: if c.admitted == 0 {
                0.0
            } else {
                c.total_queue_wait.as_secs_f64() * 1000.0 / c.admitted as f64
            },
            utilization: state.active as f64 / state.config.max_concurrent as f64,
        }
    }
}

async fn run_admitted<F, Fut, T>(mut permit: AdmissionPermit, cancel: &CancellationToken, operation: F) -> Result<T>
where
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    // A caller dropping this future mid-operation counts as a cancellation
    permit.cancelled = true;
    let result = tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(GuardError::Cancelled),
        result = operation() => result,
    };
    permit.finish(matches!(result, Err(GuardError::Cancelled)));
    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
    use tokio::time::sleep;

    fn admission(max_concurrent: usize, max_queue_size: usize, queue_timeout_ms: u64) -> ConcurrencyAdmission {
        ConcurrencyAdmission::new(ConcurrencyConfig {
            max_concurrent,
            max_queue_size,
            queue_timeout: Duration::from_millis(queue_timeout_ms),
        })
    }

    /// Occupies a slot until the returned sender fires.
    fn block_slot(admission: &ConcurrencyAdmission) -> (oneshot::Sender<()>, QueuedHandle<()>) {
        let (release, gate) = oneshot::channel::<()>();
        let handle = admission
            .enqueue(Priority::Normal, None, move || async move {
                let _ = gate.await;
                Ok(())
            })
            .unwrap();
        (release, handle)
    }

    #[tokio::test(start_paused = true)]
    async fn test_never_exceeds_limit() {
        let admission = admission(3, 50, 60_000);
        let current = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..20 {
            let current = Arc::clone(&current);
            let peak = Arc::clone(&peak);
            handles.push(
                admission
                    .enqueue(Priority::Normal, None, move || async move {
                        let now = current.fetch_add(1, Ordering::SeqCst) + 1;
                        peak.fetch_max(now, Ordering::SeqCst);
                        sleep(Duration::from_millis(10)).await;
                        current.fetch_sub(1, Ordering::SeqCst);
                        Ok(())
                    })
                    .unwrap(),
            );
        }
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(peak.load(Ordering::SeqCst), 3);
        let status = admission.status();
        assert_eq!(status.completed, 20);
        assert_eq!(status.active, 0);
        assert_eq!(status.queued, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_single_slot_serializes_direct_calls() {
        let admission = admission(1, 10, 60_000);
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let first = admission.execute(Priority::Normal, None, &cancel, || async {
            let begin = started.elapsed();
            sleep(Duration::from_millis(50)).await;
            Ok((begin, started.elapsed()))
        });
        let second = admission.execute(Priority::Normal, None, &cancel, || async {
            Ok((started.elapsed(), started.elapsed()))
        });
        let (first, second) = tokio::join!(first, second);

        let (_, first_end) = first.unwrap();
        let (second_begin, _) = second.unwrap();
        assert!(second_begin >= first_end);
    }

    #[tokio::test(start_paused = true)]
    async fn test_high_priority_dispatched_first() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut handles = Vec::new();
        for (priority, label) in [
            (Priority::Low, "low"),
            (Priority::Normal, "normal-1"),
            (Priority::High, "high"),
            (Priority::Normal, "normal-2"),
        ] {
            let order = Arc::clone(&order);
            handles.push(
                admission
                    .enqueue(priority, None, move || async move {
                        order.lock().push(label);
                        Ok(())
                    })
                    .unwrap(),
            );
        }

        let status = admission.status();
        assert_eq!(status.queued_high, 1);
        assert_eq!(status.queued_normal, 2);
        assert_eq!(status.queued_low, 1);

        release.send(()).unwrap();
        blocker.await.unwrap();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*order.lock(), vec!["high", "normal-1", "normal-2", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_direct_calls_respect_priority() {
        let admission = Arc::new(admission(1, 10, 60_000));
        let (release, blocker) = block_slot(&admission);
        let order = Arc::new(Mutex::new(Vec::new()));

        let mut tasks = Vec::new();
        for (priority, label) in [(Priority::Low, "low"), (Priority::High, "high")] {
            let admission = Arc::clone(&admission);
            let order = Arc::clone(&order);
            tasks.push(tokio::spawn(async move {
                let cancel = CancellationToken::new();
                admission
                    .execute(priority, None, &cancel, || async move {
                        order.lock().push(label);
                        Ok(())
                    })
                    .await
            }));
            // Let the task register before the next one
            sleep(Duration::from_millis(1)).await;
        }

        release.send(()).unwrap();
        blocker.await.unwrap();
        for task in tasks {
            task.await.unwrap().unwrap();
        }
        assert_eq!(*order.lock(), vec!["high", "low"]);
    }

    #[tokio::test(start_paused = true)]
    async fn test_full_queue_rejects_immediately() {
        let admission = admission(1, 2, 60_000);
        let (release, blocker) = block_slot(&admission);
        let queued = admission
            .enqueue(Priority::Normal, None, || async { Ok(1) })
            .unwrap();

        let rejected = admission.enqueue(Priority::High, None, || async { Ok(2) });
        match rejected {
            Err(GuardError::Backpressure {
                active,
                queued,
                max_queue_size,
            }) => {
                assert_eq!((active, queued, max_queue_size), (1, 1, 2));
            }
            _ => panic!("expected backpressure"),
        }
        assert_eq!(admission.status().rejected, 1);

        release.send(()).unwrap();
        blocker.await.unwrap();
        assert_eq!(queued.await.unwrap(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_queue_timeout_never_runs_operation() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        let ran = Arc::new(AtomicBool::new(false));
        let cancel = CancellationToken::new();
        let started = Instant::now();

        let flag = Arc::clone(&ran);
        let result = admission
            .execute(Priority::Normal, Some(Duration::from_millis(50)), &cancel, move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .await;

        match result {
            Err(GuardError::Timeout { kind, configured, .. }) => {
                assert_eq!(kind, TimeoutKind::Request);
                assert_eq!(configured, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert_eq!(started.elapsed(), Duration::from_millis(50));
        assert!(!ran.load(Ordering::SeqCst));

        let status = admission.status();
        assert_eq!(status.timed_out, 1);
        assert_eq!(status.queued, 0);

        release.send(()).unwrap();
        blocker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_queued() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);

        let handle = admission
            .enqueue(Priority::Low, None, || async { Ok("never") })
            .unwrap();
        sleep(Duration::from_millis(5)).await;
        handle.cancel();

        assert!(matches!(handle.await, Err(GuardError::Cancelled)));
        let status = admission.status();
        assert_eq!(status.cancelled, 1);
        assert_eq!(status.queued, 0);

        release.send(()).unwrap();
        blocker.await.unwrap();
        assert_eq!(admission.status().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_dropped_waiter_leaves_queue() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        let cancel = CancellationToken::new();

        let waiting = admission.execute(Priority::Normal, None, &cancel, || async { Ok(()) });
        let outer = tokio::time::timeout(Duration::from_millis(20), waiting).await;
        assert!(outer.is_err());

        let status = admission.status();
        assert_eq!(status.queued, 0);
        assert_eq!(status.cancelled, 1);

        release.send(()).unwrap();
        blocker.await.unwrap();
        assert_eq!(admission.status().active, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_raising_limit_dispatches_waiters() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        let queued = admission
            .enqueue(Priority::Normal, None, || async { Ok("ran") })
            .unwrap();
        assert_eq!(admission.status().queued, 1);

        admission.reconfigure(ConcurrencyConfig {
            max_concurrent: 2,
            max_queue_size: 10,
            queue_timeout: Duration::from_secs(60),
        });
        assert_eq!(queued.await.unwrap(), "ran");

        release.send(()).unwrap();
        blocker.await.unwrap();
    }

    #[tokio::test(start_paused = true)]
    async fn test_admitted_permit_counts_completion_on_drop() {
        let admission = admission(2, 10, 60_000);
        let cancel = CancellationToken::new();

        let permit = admission.admit(Priority::Normal, None, &cancel).await.unwrap();
        assert_eq!(admission.status().active, 1);
        drop(permit);

        let cancelled = admission.admit(Priority::Normal, None, &cancel).await.unwrap();
        cancelled.finish(true);

        let status = admission.status();
        assert_eq!(status.active, 0);
        assert_eq!(status.completed, 1);
        assert_eq!(status.cancelled, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_while_running_frees_slot_for_waiter() {
        let admission = Arc::new(admission(1, 10, 60_000));
        let cancel = CancellationToken::new();
        let finished = Arc::new(AtomicBool::new(false));

        let running = {
            let admission = Arc::clone(&admission);
            let cancel = cancel.clone();
            let finished = Arc::clone(&finished);
            tokio::spawn(async move {
                admission
                    .execute(Priority::Normal, None, &cancel, move || async move {
                        sleep(Duration::from_secs(60)).await;
                        finished.store(true, Ordering::SeqCst);
                        Ok(())
                    })
                    .await
            })
        };
        sleep(Duration::from_millis(5)).await;
        assert_eq!(admission.status().active, 1);

        let waiter = admission
            .enqueue(Priority::Low, None, || async { Ok("dispatched") })
            .unwrap();
        assert_eq!(admission.status().queued, 1);

        cancel.cancel();
        assert!(matches!(running.await.unwrap(), Err(GuardError::Cancelled)));
        assert!(!finished.load(Ordering::SeqCst));

        assert_eq!(waiter.await.unwrap(), "dispatched");
        let status = admission.status();
        assert_eq!(status.active, 0);
        assert_eq!(status.queued, 0);
        assert_eq!(status.cancelled, 1);
        assert_eq!(status.completed, 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_enqueued_request_times_out_without_running() {
        let admission = admission(1, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        let ran = Arc::new(AtomicBool::new(false));

        let flag = Arc::clone(&ran);
        let handle = admission
            .enqueue(Priority::High, Some(Duration::from_millis(50)), move || async move {
                flag.store(true, Ordering::SeqCst);
                Ok(())
            })
            .unwrap();

        match handle.await {
            Err(GuardError::Timeout { kind, configured, .. }) => {
                assert_eq!(kind, TimeoutKind::Request);
                assert_eq!(configured, Duration::from_millis(50));
            }
            other => panic!("expected timeout, got {:?}", other),
        }
        assert!(!ran.load(Ordering::SeqCst));
        assert_eq!(admission.status().timed_out, 1);
        assert_eq!(admission.status().queued, 0);

        release.send(()).unwrap();
        blocker.await.unwrap();
        assert!(!ran.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn test_utilization() {
        let admission = admission(4, 10, 60_000);
        let (release, blocker) = block_slot(&admission);
        assert!((admission.status().utilization - 0.25).abs() < 1e-9);
        release.send(()).unwrap();
        blocker.await.unwrap();
        assert_eq!(admission.status().utilization, 0.0);
    }
}

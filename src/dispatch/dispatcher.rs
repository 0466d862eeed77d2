use std::collections::VecDeque;
use std::future::Future;
use std::pin::Pin;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::task::{Context, Poll};
use std::time::Duration;

use serde::Serialize;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::{debug, warn};

/// Why a dispatched task did not produce a value
#[derive(Debug, Error)]
pub enum DispatchError<E> {
    #[error("task failed: {0}")]
    Failed(E),

    #[error("task timed out after {0:?}")]
    TimedOut(Duration),

    #[error("task panicked")]
    Panicked,

    #[error("dispatcher is not accepting new work")]
    Closed,
}

/// Delivers a finished task's outcome to its handle.
type Completion = Box<dyn FnOnce() + Send>;
type JobFuture = Pin<Box<dyn Future<Output = Completion> + Send>>;
type Job = Box<dyn FnOnce() -> JobFuture + Send>;

struct Queued {
    seq: u64,
    job: Job,
}

struct State {
    active: usize,
    pending: VecDeque<Queued>,
    closed: bool,
    next_seq: u64,
}

struct Inner {
    max_concurrent: usize,
    state: Mutex<State>,
}

impl Inner {
    fn lock(&self) -> MutexGuard<'_, State> {
        // Nothing panics while the lock is held, so a poisoned guard is still consistent
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Called by a worker after its job finished: hand the slot to the oldest
    /// waiting job, or give the slot back.
    fn next_or_release(&self) -> Option<Queued> {
        let mut state = self.lock();
        match state.pending.pop_front() {
            Some(next) => Some(next),
            None => {
                state.active -= 1;
                None
            }
        }
    }
}

/// Point-in-time view of the dispatcher counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct DispatcherStats {
    pub max_concurrent: usize,
    pub active: usize,
    pub queued: usize,
    pub closed: bool,
}

/// Admission-controlled task dispatcher
///
/// At most `max_concurrent` tasks run at once. Everything else waits in a
/// FIFO queue. Each admitted task owns a worker slot; when the task finishes
/// the worker pulls the next queued task itself, so a free slot is never left
/// idle while work is waiting.
///
/// Architecture:
/// 1. `submit` takes the state lock once: start a worker if a slot is free,
///    otherwise append to `pending`
/// 2. A worker runs its task (with an optional timeout) on a separate tokio
///    task so a panic stays contained
/// 3. On completion the worker pops the next pending task under the same
///    lock, or decrements `active` and exits
/// 4. The result is sent to the caller's [`TaskHandle`] after bookkeeping
///
/// `submit` must be called from within a tokio runtime.
#[derive(Clone)]
pub struct Dispatcher {
    inner: Arc<Inner>,
}

impl Dispatcher {
    pub fn new(max_concurrent: usize) -> Self {
        assert!(max_concurrent > 0, "max_concurrent must be positive");

        Self {
            inner: Arc::new(Inner {
                max_concurrent,
                state: Mutex::new(State {
                    active: 0,
                    pending: VecDeque::new(),
                    closed: false,
                    next_seq: 0,
                }),
            }),
        }
    }

    /// Submit a task without a time limit
    pub fn submit<F, Fut, T, E>(&self, task: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.enqueue(None, task)
    }

    /// Submit a task that fails with [`DispatchError::TimedOut`] if it runs
    /// longer than `limit`. Queue wait time does not count against the limit.
    pub fn submit_with_timeout<F, Fut, T, E>(&self, limit: Duration, task: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        self.enqueue(Some(limit), task)
    }

    fn enqueue<F, Fut, T, E>(&self, limit: Option<Duration>, task: F) -> TaskHandle<T, E>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<T, E>> + Send + 'static,
        T: Send + 'static,
        E: Send + 'static,
    {
        let (tx, rx) = oneshot::channel();

        let job: Job = Box::new(move || {
            Box::pin(async move {
                if tx.is_closed() {
                    debug!("Caller stopped waiting, skipping task");
                    return Box::new(|| {}) as Completion;
                }

                let outcome = execute(task, limit).await;
                Box::new(move || {
                    // The caller may have stopped waiting
                    let _ = tx.send(outcome);
                }) as Completion
            }) as JobFuture
        });

        let mut state = self.inner.lock();

        if state.closed {
            drop(state);
            return TaskHandle::resolved(DispatchError::Closed);
        }

        let seq = state.next_seq;
        state.next_seq += 1;

        if state.active < self.inner.max_concurrent {
            state.active += 1;
            let active = state.active;
            drop(state);

            debug!(seq, active, "Task admitted");
            spawn_worker(self.inner.clone(), Queued { seq, job });

            TaskHandle {
                rx,
                queue_position: None,
            }
        } else {
            state.pending.push_back(Queued { seq, job });
            let position = state.pending.len();
            drop(state);

            debug!(seq, position, "Task queued");

            TaskHandle {
                rx,
                queue_position: Some(position),
            }
        }
    }

    /// Stop admitting new tasks. Running and already queued tasks still finish.
    pub fn close(&self) {
        let mut state = self.inner.lock();
        if !state.closed {
            state.closed = true;
            debug!(
                active = state.active,
                queued = state.pending.len(),
                "Dispatcher closed to new submissions"
            );
        }
    }

    /// Tasks waiting for a slot (advisory)
    pub fn queue_depth(&self) -> usize {
        self.inner.lock().pending.len()
    }

    /// Tasks currently running (advisory)
    pub fn active_count(&self) -> usize {
        self.inner.lock().active
    }

    pub fn max_concurrent(&self) -> usize {
        self.inner.max_concurrent
    }

    pub fn stats(&self) -> DispatcherStats {
        let state = self.inner.lock();
        DispatcherStats {
            max_concurrent: self.inner.max_concurrent,
            active: state.active,
            queued: state.pending.len(),
            closed: state.closed,
        }
    }
}

fn spawn_worker(inner: Arc<Inner>, first: Queued) {
    tokio::spawn(async move {
        let mut current = Some(first);

        while let Some(Queued { seq, job }) = current.take() {
            let complete = job().await;
            current = inner.next_or_release();
            debug!(seq, handed_over = current.is_some(), "Task finished");
            complete();
        }
    });
}

async fn execute<F, Fut, T, E>(task: F, limit: Option<Duration>) -> Result<T, DispatchError<E>>
where
    F: FnOnce() -> Fut + Send + 'static,
    Fut: Future<Output = Result<T, E>> + Send + 'static,
    T: Send + 'static,
    E: Send + 'static,
{
    // build the future inside the task too, so a panicking closure is contained
    let running = tokio::spawn(async move { task().await });
    let abort = running.abort_handle();

    let joined = match limit {
        Some(limit) => match tokio::time::timeout(limit, running).await {
            Ok(joined) => joined,
            Err(_) => {
                abort.abort();
                warn!(?limit, "Task timed out");
                return Err(DispatchError::TimedOut(limit));
            }
        },
        None => running.await,
    };

    match joined {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(error)) => Err(DispatchError::Failed(error)),
        Err(join_error) => {
            warn!(error = %join_error, "Task aborted abnormally");
            Err(DispatchError::Panicked)
        }
    }
}

/// Resolves to the task's result once it has run
///
/// Dropping the handle does not cancel a running task, but a task still
/// waiting in the queue is skipped when its turn comes.
#[derive(Debug)]
pub struct TaskHandle<T, E> {
    rx: oneshot::Receiver<Result<T, DispatchError<E>>>,
    queue_position: Option<usize>,
}

impl<T, E> TaskHandle<T, E> {
    fn resolved(error: DispatchError<E>) -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(Err(error));
        Self {
            rx,
            queue_position: None,
        }
    }

    /// Position in the queue at submission time (1 = next in line),
    /// `None` when the task started immediately.
    pub fn queue_position(&self) -> Option<usize> {
        self.queue_position
    }
}

impl<T, E> Future for TaskHandle<T, E> {
    type Output = Result<T, DispatchError<E>>;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        match Pin::new(&mut self.rx).poll(cx) {
            Poll::Ready(Ok(outcome)) => Poll::Ready(outcome),
            // Sender only disappears when the runtime is shutting down
            Poll::Ready(Err(_)) => Poll::Ready(Err(DispatchError::Closed)),
            Poll::Pending => Poll::Pending,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    type Gate = oneshot::Sender<()>;

    /// Submit a task that records its start and waits until released
    fn gated(
        dispatcher: &Dispatcher,
        id: usize,
        started: Arc<Mutex<Vec<usize>>>,
    ) -> (Gate, TaskHandle<usize, String>) {
        let (gate_tx, gate_rx) = oneshot::channel::<()>();
        let handle = dispatcher.submit(move || async move {
            started.lock().unwrap().push(id);
            if gate_rx.await.is_err() {
                return Err("gate dropped".to_string());
            }
            Ok(id)
        });
        (gate_tx, handle)
    }

    #[tokio::test]
    async fn test_single_task_happy_path() {
        let dispatcher = Dispatcher::new(3);
        let started = Arc::new(Mutex::new(Vec::new()));

        let (gate, handle) = gated(&dispatcher, 7, started.clone());
        assert_eq!(handle.queue_position(), None);
        assert_eq!(dispatcher.active_count(), 1);
        assert_eq!(dispatcher.queue_depth(), 0);

        gate.send(()).unwrap();
        assert_eq!(handle.await.unwrap(), 7);
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_queuing_preserves_submission_order() {
        let dispatcher = Dispatcher::new(3);
        let started = Arc::new(Mutex::new(Vec::new()));

        let mut gates = Vec::new();
        let mut handles = Vec::new();
        for id in 0..5 {
            let (gate, handle) = gated(&dispatcher, id, started.clone());
            gates.push(gate);
            handles.push(handle);
        }

        assert_eq!(dispatcher.active_count(), 3);
        assert_eq!(dispatcher.queue_depth(), 2);
        assert_eq!(handles[3].queue_position(), Some(1));
        assert_eq!(handles[4].queue_position(), Some(2));

        let mut gates = gates.into_iter();
        let mut handles = handles.into_iter();

        // finishing task 0 hands its slot to task 3
        gates.next().unwrap().send(()).unwrap();
        assert_eq!(handles.next().unwrap().await.unwrap(), 0);
        assert_eq!(dispatcher.active_count(), 3);
        assert_eq!(dispatcher.queue_depth(), 1);

        for gate in gates {
            gate.send(()).unwrap();
        }
        for (expected, handle) in (1..5).zip(handles) {
            assert_eq!(handle.await.unwrap(), expected);
        }

        assert_eq!(dispatcher.active_count(), 0);
        assert_eq!(dispatcher.queue_depth(), 0);

        let order = started.lock().unwrap().clone();
        let queued_order: Vec<usize> = order.iter().copied().filter(|id| *id >= 3).collect();
        assert_eq!(queued_order, vec![3, 4]);
    }

    #[tokio::test]
    async fn test_fifo_with_single_slot() {
        let dispatcher = Dispatcher::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let handles: Vec<_> = (0..6)
            .map(|id| {
                let started = started.clone();
                dispatcher.submit(move || async move {
                    started.lock().unwrap().push(id);
                    tokio::task::yield_now().await;
                    Ok::<_, String>(id)
                })
            })
            .collect();

        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(*started.lock().unwrap(), vec![0, 1, 2, 3, 4, 5]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_admission_bound_holds_under_load() {
        let dispatcher = Dispatcher::new(3);
        let running = Arc::new(AtomicUsize::new(0));
        let peak = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..30)
            .map(|i| {
                let running = running.clone();
                let peak = peak.clone();
                dispatcher.submit(move || async move {
                    let now = running.fetch_add(1, Ordering::SeqCst) + 1;
                    peak.fetch_max(now, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(2 + (i % 3) as u64)).await;
                    running.fetch_sub(1, Ordering::SeqCst);
                    Ok::<_, String>(())
                })
            })
            .collect();

        assert!(dispatcher.active_count() <= 3);

        for handle in handles {
            handle.await.unwrap();
        }

        assert!(peak.load(Ordering::SeqCst) <= 3);
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_failure_is_isolated() {
        let dispatcher = Dispatcher::new(2);

        let failing = dispatcher.submit(|| async { Err::<(), _>("boom".to_string()) });
        let succeeding = dispatcher.submit(|| async { Ok::<_, String>(42) });

        match failing.await {
            Err(DispatchError::Failed(message)) => assert_eq!(message, "boom"),
            other => panic!("expected failure, got {:?}", other),
        }
        assert_eq!(succeeding.await.unwrap(), 42);
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_timeout_releases_slot() {
        let dispatcher = Dispatcher::new(1);

        let slow = dispatcher.submit_with_timeout(Duration::from_secs(1), || async {
            tokio::time::sleep(Duration::from_secs(60)).await;
            Ok::<_, String>(())
        });
        let next = dispatcher.submit(|| async { Ok::<_, String>("next") });
        assert_eq!(dispatcher.queue_depth(), 1);

        assert!(matches!(slow.await, Err(DispatchError::TimedOut(_))));
        assert_eq!(next.await.unwrap(), "next");
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_panic_releases_slot() {
        let dispatcher = Dispatcher::new(1);

        let panicking = dispatcher.submit(|| async {
            if true {
                panic!("task blew up");
            }
            Ok::<(), String>(())
        });

        assert!(matches!(panicking.await, Err(DispatchError::Panicked)));
        assert_eq!(dispatcher.active_count(), 0);

        let after = dispatcher.submit(|| async { Ok::<_, String>(1) });
        assert_eq!(after.await.unwrap(), 1);
    }

    fn exploding_setup() -> std::future::Ready<Result<(), String>> {
        panic!("could not build task")
    }

    #[tokio::test]
    async fn test_panic_while_building_task_releases_slot() {
        let dispatcher = Dispatcher::new(1);

        let broken = dispatcher.submit(exploding_setup);
        let next = dispatcher.submit(|| async { Ok::<_, String>("next") });

        assert!(matches!(broken.await, Err(DispatchError::Panicked)));
        assert_eq!(next.await.unwrap(), "next");
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_abandoned_queued_task_is_skipped() {
        let dispatcher = Dispatcher::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let (gate, first) = gated(&dispatcher, 1, started.clone());
        let (_abandoned_gate, abandoned) = gated(&dispatcher, 2, started.clone());
        let (third_gate, third) = gated(&dispatcher, 3, started.clone());
        assert_eq!(dispatcher.queue_depth(), 2);

        drop(abandoned);
        gate.send(()).unwrap();
        third_gate.send(()).unwrap();

        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(third.await.unwrap(), 3);
        assert_eq!(*started.lock().unwrap(), vec![1, 3]);
        assert_eq!(dispatcher.active_count(), 0);
        assert_eq!(dispatcher.queue_depth(), 0);
    }

    #[tokio::test]
    async fn test_closed_dispatcher_rejects_new_work() {
        let dispatcher = Dispatcher::new(1);
        dispatcher.close();

        let handle = dispatcher.submit(|| async { Ok::<_, String>(()) });
        assert!(matches!(handle.await, Err(DispatchError::Closed)));
        assert!(dispatcher.stats().closed);
        assert_eq!(dispatcher.active_count(), 0);
    }

    #[tokio::test]
    async fn test_close_lets_queued_work_finish() {
        let dispatcher = Dispatcher::new(1);
        let started = Arc::new(Mutex::new(Vec::new()));

        let (gate, first) = gated(&dispatcher, 1, started.clone());
        let queued = dispatcher.submit(|| async { Ok::<_, String>(2) });
        dispatcher.close();

        gate.send(()).unwrap();
        assert_eq!(first.await.unwrap(), 1);
        assert_eq!(queued.await.unwrap(), 2);
    }
}

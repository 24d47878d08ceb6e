//! Async request orchestration.
//!
//! A controller runs its worker on the tokio runtime, off the calling thread,
//! and reports exactly one terminal outcome per request (`ResultReady`,
//! `ErrorRaised` or `Cancelled`) followed by `Finished`. Events go through an
//! mpsc channel drained by the coordinating thread, which owns all mutable
//! application state; workers never touch it.
//!
//! Cancellation is cooperative. The token is checked before the worker
//! starts and again, under the in-flight lock, right before the outcome is
//! emitted. A worker that is already in flight is aborted by dropping its
//! future, which closes the underlying connection.

use std::any::Any;
use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::{self, Receiver, RecvTimeoutError, Sender};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::runtime::Handle;
use tokio_util::sync::CancellationToken;

/// Identifies one request issued by a controller
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RequestHandle(u64);

impl fmt::Display for RequestHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Boxed future returned by a controller's worker
pub type WorkerFuture<R, E> = Pin<Box<dyn Future<Output = Result<R, E>> + Send + 'static>>;

type Worker<P, R, E> = Arc<dyn Fn(P) -> WorkerFuture<R, E> + Send + Sync>;

/// Why a request failed
#[derive(Debug, thiserror::Error)]
pub enum RequestError<E> {
    /// The worker returned an error
    #[error("{0}")]
    Worker(E),
    /// The worker did not finish within the configured timeout
    #[error("Request timed out after {0:?}")]
    Timeout(Duration),
    /// The worker panicked
    #[error("Request worker panicked: {0}")]
    Panicked(String),
}

impl<E> RequestError<E> {
    /// Short name of the failure category, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Worker(_) => "worker",
            Self::Timeout(_) => "timeout",
            Self::Panicked(_) => "panic",
        }
    }

    pub fn worker_error(&self) -> Option<&E> {
        match self {
            Self::Worker(e) => Some(e),
            _ => None,
        }
    }
}

/// Notification delivered to the coordinating thread
#[derive(Debug)]
pub enum RequestEvent<R, E> {
    ResultReady {
        handle: RequestHandle,
        result: R,
    },
    ErrorRaised {
        handle: RequestHandle,
        error: RequestError<E>,
    },
    Cancelled {
        handle: RequestHandle,
    },
    /// Always follows the terminal outcome of the same request
    Finished {
        handle: RequestHandle,
    },
}

impl<R, E> RequestEvent<R, E> {
    pub fn handle(&self) -> RequestHandle {
        match self {
            Self::ResultReady { handle, .. }
            | Self::ErrorRaised { handle, .. }
            | Self::Cancelled { handle }
            | Self::Finished { handle } => *handle,
        }
    }

    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Finished { .. })
    }
}

/// Terminal outcome of one request, as collected by [`AsyncRequestController::wait`]
#[derive(Debug)]
pub enum RequestOutcome<R, E> {
    Ready(R),
    Failed(RequestError<E>),
    Cancelled,
}

impl<R, E> RequestOutcome<R, E> {
    fn into_event(self, handle: RequestHandle) -> RequestEvent<R, E> {
        match self {
            Self::Ready(result) => RequestEvent::ResultReady { handle, result },
            Self::Failed(error) => RequestEvent::ErrorRaised { handle, error },
            Self::Cancelled => RequestEvent::Cancelled { handle },
        }
    }
}

type InFlight = Arc<Mutex<HashMap<RequestHandle, CancellationToken>>>;

/// Runs a worker per request on the tokio runtime and reports its outcome.
///
/// Overlapping requests are allowed but their outcomes are not ordered;
/// the most recent one is the controller's *current* request and consumers
/// can drop stale results with [`is_current`](Self::is_current).
pub struct AsyncRequestController<P, R, E> {
    name: &'static str,
    runtime: Handle,
    worker: Worker<P, R, E>,
    timeout: Option<Duration>,
    next_id: AtomicU64,
    current: Mutex<Option<RequestHandle>>,
    in_flight: InFlight,
    events_tx: Sender<RequestEvent<R, E>>,
    events_rx: Receiver<RequestEvent<R, E>>,
}

impl<P, R, E> AsyncRequestController<P, R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    pub fn new<F, Fut>(name: &'static str, runtime: Handle, worker: F) -> Self
    where
        F: Fn(P) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<R, E>> + Send + 'static,
    {
        let worker: Worker<P, R, E> =
            Arc::new(move |params: P| -> WorkerFuture<R, E> { Box::pin(worker(params)) });
        let (events_tx, events_rx) = mpsc::channel();

        Self {
            name,
            runtime,
            worker,
            timeout: None,
            next_id: AtomicU64::new(0),
            current: Mutex::new(None),
            in_flight: Arc::new(Mutex::new(HashMap::new())),
            events_tx,
            events_rx,
        }
    }

    /// Fail requests whose worker runs longer than `timeout`.
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Start a request. Never blocks; the outcome arrives as events.
    pub fn send(&self, params: P) -> RequestHandle {
        let handle = RequestHandle(self.next_id.fetch_add(1, Ordering::Relaxed) + 1);
        let token = CancellationToken::new();
        self.in_flight.lock().insert(handle, token.clone());

        if let Some(previous) = self.current.lock().replace(handle) {
            if self.in_flight.lock().contains_key(&previous) {
                tracing::debug!("{} request {} superseded by {}", self.name, previous, handle);
            }
        }

        let worker = Arc::clone(&self.worker);
        let tx = self.events_tx.clone();
        let in_flight = Arc::clone(&self.in_flight);
        let timeout = self.timeout;
        let name = self.name;

        tracing::debug!("{} request {} started", name, handle);

        self.runtime.spawn(async move {
            let outcome = execute(worker, params, token.clone(), timeout).await;

            // cancel() sets the token while holding this lock, so a cancel that
            // returned true is always observed here. Both events are queued
            // before the entry disappears.
            let mut table = in_flight.lock();
            table.remove(&handle);
            let outcome = if token.is_cancelled() {
                RequestOutcome::Cancelled
            } else {
                outcome
            };

            match &outcome {
                RequestOutcome::Ready(_) => tracing::debug!("{} request {} succeeded", name, handle),
                RequestOutcome::Failed(e) => {
                    tracing::debug!("{} request {} failed ({})", name, handle, e.kind())
                }
                RequestOutcome::Cancelled => tracing::info!("{} request {} cancelled", name, handle),
            }

            // A closed channel means the controller is gone; nobody is listening.
            let _ = tx.send(outcome.into_event(handle));
            let _ = tx.send(RequestEvent::Finished { handle });
            drop(table);
        });

        handle
    }

    /// Request cancellation.
    ///
    /// Returns `true` if the request had not emitted its outcome yet; that
    /// outcome is then `Cancelled`. Returns `false` once the outcome has been
    /// emitted, or for a handle this controller never issued.
    pub fn cancel(&self, handle: RequestHandle) -> bool {
        match self.in_flight.lock().get(&handle) {
            Some(token) => {
                token.cancel();
                tracing::debug!("{} request {} cancellation requested", self.name, handle);
                true
            }
            None => false,
        }
    }

    /// Most recently issued request
    pub fn current(&self) -> Option<RequestHandle> {
        *self.current.lock()
    }

    pub fn is_current(&self, handle: RequestHandle) -> bool {
        self.current() == Some(handle)
    }

    /// True while any request of this controller has not produced its outcome
    pub fn is_busy(&self) -> bool {
        !self.in_flight.lock().is_empty()
    }

    pub fn try_next_event(&self) -> Option<RequestEvent<R, E>> {
        self.events_rx.try_recv().ok()
    }

    /// Block for up to `timeout` waiting for the next event.
    ///
    /// Must not be called from a runtime worker thread.
    pub fn next_event(&self, timeout: Duration) -> Option<RequestEvent<R, E>> {
        match self.events_rx.recv_timeout(timeout) {
            Ok(event) => Some(event),
            Err(RecvTimeoutError::Timeout) | Err(RecvTimeoutError::Disconnected) => None,
        }
    }

    pub fn drain_events(&self) -> Vec<RequestEvent<R, E>> {
        self.events_rx.try_iter().collect()
    }

    /// Block until `handle` finishes and return its outcome.
    ///
    /// `should_cancel` is polled every `poll` interval; once it returns true
    /// the request is cancelled and the wait continues until `Finished`.
    /// Events of other requests are discarded.
    ///
    /// Returns `None` when no outcome for `handle` will ever arrive: the
    /// handle was not issued by this controller, or its events were already
    /// taken with [`try_next_event`](Self::try_next_event) or
    /// [`drain_events`](Self::drain_events).
    pub fn wait(
        &self,
        handle: RequestHandle,
        poll: Duration,
        should_cancel: impl Fn() -> bool,
    ) -> Option<RequestOutcome<R, E>> {
        let mut outcome = None;
        let mut cancel_sent = false;

        loop {
            if !cancel_sent && should_cancel() {
                self.cancel(handle);
                cancel_sent = true;
            }

            let event = match self.next_event(poll) {
                Some(event) => event,
                None if self.in_flight.lock().contains_key(&handle) => continue,
                // Not in flight: whatever it emitted is already queued
                None => match self.try_next_event() {
                    Some(event) => event,
                    None => {
                        tracing::debug!("{} request {} has no pending events", self.name, handle);
                        return outcome;
                    }
                },
            };

            if event.handle() != handle {
                tracing::debug!("{} discarding event for stale request {}", self.name, event.handle());
                continue;
            }

            match event {
                RequestEvent::ResultReady { result, .. } => outcome = Some(RequestOutcome::Ready(result)),
                RequestEvent::ErrorRaised { error, .. } => outcome = Some(RequestOutcome::Failed(error)),
                RequestEvent::Cancelled { .. } => outcome = Some(RequestOutcome::Cancelled),
                RequestEvent::Finished { .. } => return outcome,
            }
        }
    }
}

impl<P, R, E> AsyncRequestController<P, R, E> {
    /// Cancel every request still in flight.
    pub fn cancel_all(&self) {
        let in_flight = self.in_flight.lock();
        if !in_flight.is_empty() {
            tracing::debug!("{} cancelling {} requests in flight", self.name, in_flight.len());
        }
        for token in in_flight.values() {
            token.cancel();
        }
    }
}

impl<P, R, E> Drop for AsyncRequestController<P, R, E> {
    fn drop(&mut self) {
        self.cancel_all();
    }
}

impl<P, R, E> fmt::Debug for AsyncRequestController<P, R, E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AsyncRequestController")
            .field("name", &self.name)
            .field("timeout", &self.timeout)
            .field("current", &*self.current.lock())
            .field("in_flight", &self.in_flight.lock().len())
            .finish()
    }
}

async fn execute<P, R, E>(
    worker: Worker<P, R, E>,
    params: P,
    token: CancellationToken,
    timeout: Option<Duration>,
) -> RequestOutcome<R, E>
where
    P: Send + 'static,
    R: Send + 'static,
    E: Send + 'static,
{
    if token.is_cancelled() {
        return RequestOutcome::Cancelled;
    }

    let work = worker(params);
    let mut task = tokio::spawn(async move {
        match timeout {
            Some(limit) => tokio::time::timeout(limit, work).await.map_err(|_| limit),
            None => Ok(work.await),
        }
    });

    let joined = tokio::select! {
        biased;
        _ = token.cancelled() => {
            task.abort();
            return RequestOutcome::Cancelled;
        }
        joined = &mut task => joined,
    };

    match joined {
        Ok(Ok(Ok(result))) => RequestOutcome::Ready(result),
        Ok(Ok(Err(e))) => RequestOutcome::Failed(RequestError::Worker(e)),
        Ok(Err(limit)) => RequestOutcome::Failed(RequestError::Timeout(limit)),
        Err(join_error) if join_error.is_panic() => {
            RequestOutcome::Failed(RequestError::Panicked(panic_message(join_error.into_panic())))
        }
        Err(join_error) => RequestOutcome::Failed(RequestError::Panicked(join_error.to_string())),
    }
}

fn panic_message(payload: Box<dyn Any + Send>) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicBool;

    const WAIT: Duration = Duration::from_secs(5);

    fn runtime() -> tokio::runtime::Runtime {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(2)
            .enable_all()
            .build()
            .unwrap()
    }

    fn collect<P, R, E>(
        controller: &AsyncRequestController<P, R, E>,
        handle: RequestHandle,
    ) -> Vec<RequestEvent<R, E>>
    where
        P: Send + 'static,
        R: Send + 'static,
        E: Send + 'static,
    {
        let mut events = Vec::new();
        while let Some(event) = controller.next_event(WAIT) {
            if event.handle() != handle {
                continue;
            }
            let done = event.is_finished();
            events.push(event);
            if done {
                break;
            }
        }
        events
    }

    #[test]
    fn success_fires_result_then_finished() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |n: u32| async move {
            Ok::<u32, String>(n * 2)
        });

        let handle = controller.send(21);
        let events = collect(&controller, handle);

        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RequestEvent::ResultReady { result: 42, .. }));
        assert!(matches!(events[1], RequestEvent::Finished { .. }));
        assert!(!controller.is_busy());
        assert!(controller.try_next_event().is_none());
    }

    #[test]
    fn worker_error_fires_error_then_finished() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |_: ()| async {
            Err::<u32, String>("not found".to_string())
        });

        let handle = controller.send(());
        let events = collect(&controller, handle);

        assert_eq!(events.len(), 2);
        match &events[0] {
            RequestEvent::ErrorRaised { error, .. } => {
                assert_eq!(error.kind(), "worker");
                assert_eq!(error.to_string(), "not found");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events[1].is_finished());
    }

    #[test]
    fn cancel_before_worker_starts_skips_worker() {
        // A current-thread runtime only runs tasks while something blocks on it
        let rt = tokio::runtime::Builder::new_current_thread()
            .enable_all()
            .build()
            .unwrap();
        let invoked = Arc::new(AtomicBool::new(false));
        let flag = Arc::clone(&invoked);
        let controller = AsyncRequestController::new("test", rt.handle().clone(), move |_: ()| {
            flag.store(true, Ordering::SeqCst);
            async { Ok::<u32, String>(1) }
        });

        let handle = controller.send(());
        assert!(controller.is_busy());
        assert!(controller.cancel(handle));
        rt.block_on(async { tokio::time::sleep(Duration::from_millis(50)).await });

        let events = controller.drain_events();
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RequestEvent::Cancelled { .. }));
        assert!(events[1].is_finished());
        assert!(!invoked.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_in_flight_drops_worker_future() {
        struct DropFlag(Arc<AtomicBool>);
        impl Drop for DropFlag {
            fn drop(&mut self) {
                self.0.store(true, Ordering::SeqCst);
            }
        }

        let rt = runtime();
        let dropped = Arc::new(AtomicBool::new(false));
        let (started_tx, started_rx) = mpsc::channel();
        let started_tx = Arc::new(Mutex::new(started_tx));
        let flag = Arc::clone(&dropped);
        let controller = AsyncRequestController::new("test", rt.handle().clone(), move |_: ()| {
            let guard = DropFlag(Arc::clone(&flag));
            let started = Arc::clone(&started_tx);
            async move {
                let _guard = guard;
                let _ = started.lock().send(());
                std::future::pending::<()>().await;
                Ok::<u32, String>(1)
            }
        });

        let handle = controller.send(());
        started_rx.recv_timeout(WAIT).unwrap();
        assert!(controller.cancel(handle));

        let events = collect(&controller, handle);
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], RequestEvent::Cancelled { .. }));
        assert!(events[1].is_finished());

        // abort() drops the future on the runtime shortly after
        let deadline = std::time::Instant::now() + WAIT;
        while !dropped.load(Ordering::SeqCst) && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(dropped.load(Ordering::SeqCst));
    }

    #[test]
    fn cancel_after_completion_is_noop() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |_: ()| async {
            Ok::<&'static str, String>("done")
        });

        let handle = controller.send(());
        let events = collect(&controller, handle);
        assert!(matches!(events[0], RequestEvent::ResultReady { result: "done", .. }));

        assert!(!controller.cancel(handle));
        assert!(!controller.cancel(RequestHandle(999)));
        assert!(controller.try_next_event().is_none());
    }

    #[test]
    fn timeout_is_reported_as_error() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |_: ()| async {
            std::future::pending::<()>().await;
            Ok::<u32, String>(0)
        })
        .with_timeout(Some(Duration::from_millis(20)));

        let handle = controller.send(());
        let events = collect(&controller, handle);

        assert_eq!(events.len(), 2);
        match &events[0] {
            RequestEvent::ErrorRaised { error, .. } => {
                assert!(matches!(error, RequestError::Timeout(d) if *d == Duration::from_millis(20)));
                assert_eq!(error.kind(), "timeout");
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events[1].is_finished());
    }

    #[test]
    fn worker_panic_is_reported_as_error() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |fail: bool| async move {
            if fail {
                panic!("boom");
            }
            Ok::<u32, String>(0)
        });

        let handle = controller.send(true);
        let events = collect(&controller, handle);

        assert_eq!(events.len(), 2);
        match &events[0] {
            RequestEvent::ErrorRaised { error: RequestError::Panicked(msg), .. } => {
                assert_eq!(msg, "boom")
            }
            other => panic!("unexpected event: {other:?}"),
        }
        assert!(events[1].is_finished());
    }

    #[test]
    fn newer_request_becomes_current() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |n: u32| async move {
            Ok::<u32, String>(n)
        });

        assert_eq!(controller.current(), None);
        let first = controller.send(1);
        let second = controller.send(2);
        assert_ne!(first, second);
        assert!(second > first);
        assert!(!controller.is_current(first));
        assert!(controller.is_current(second));

        match controller.wait(second, Duration::from_millis(10), || false) {
            Some(RequestOutcome::Ready(n)) => assert_eq!(n, 2),
            other => panic!("unexpected outcome: {other:?}"),
        }
    }

    #[test]
    fn wait_cancels_when_asked() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |_: ()| async {
            std::future::pending::<()>().await;
            Ok::<u32, String>(0)
        });

        let handle = controller.send(());
        let outcome = controller.wait(handle, Duration::from_millis(10), || true);
        assert!(matches!(outcome, Some(RequestOutcome::Cancelled)));
        assert!(!controller.is_busy());
    }

    #[test]
    fn wait_on_unknown_handle_returns_none() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |n: u32| async move {
            Ok::<u32, String>(n)
        });

        let outcome = controller.wait(RequestHandle(42), Duration::from_millis(10), || true);
        assert!(outcome.is_none());
    }

    #[test]
    fn wait_after_drain_returns_none() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |n: u32| async move {
            Ok::<u32, String>(n)
        });

        let handle = controller.send(3);
        while controller.is_busy() {
            std::thread::sleep(Duration::from_millis(5));
        }
        // Both events are queued by the time the request leaves the table
        let events = controller.drain_events();
        assert_eq!(events.len(), 2);
        assert!(events[1].is_finished());

        let outcome = controller.wait(handle, Duration::from_millis(10), || false);
        assert!(outcome.is_none());
    }

    #[test]
    fn successful_cancel_always_yields_cancelled() {
        let rt = runtime();
        let controller = AsyncRequestController::new("test", rt.handle().clone(), |n: u32| async move {
            Ok::<u32, String>(n)
        });

        for n in 0..200 {
            let handle = controller.send(n);
            if n % 3 == 0 {
                std::thread::yield_now();
            }
            let cancelled = controller.cancel(handle);
            match controller.wait(handle, Duration::from_millis(10), || false) {
                Some(RequestOutcome::Cancelled) => assert!(cancelled, "request {n} cancelled without cancel()"),
                Some(RequestOutcome::Ready(value)) => {
                    assert!(!cancelled, "cancel() returned true but request {n} completed");
                    assert_eq!(value, n);
                }
                other => panic!("unexpected outcome for request {n}: {other:?}"),
            }
        }
        assert!(!controller.is_busy());
    }

    #[test]
    fn drop_cancels_in_flight_requests() {
        let rt = runtime();
        let (seen_tx, seen_rx) = mpsc::channel();
        let seen_tx = Arc::new(Mutex::new(seen_tx));

        {
            let controller = AsyncRequestController::new("test", rt.handle().clone(), move |_: ()| {
                let seen = Arc::clone(&seen_tx);
                async move {
                    struct Notify(Arc<Mutex<Sender<()>>>);
                    impl Drop for Notify {
                        fn drop(&mut self) {
                            let _ = self.0.lock().send(());
                        }
                    }
                    let _notify = Notify(seen);
                    std::future::pending::<()>().await;
                    Ok::<u32, String>(0)
                }
            });
            controller.send(());
            // Let the task reach the pending worker
            std::thread::sleep(Duration::from_millis(50));
        }

        seen_rx.recv_timeout(WAIT).unwrap();
    }
}

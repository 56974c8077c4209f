//! Process signal routing and deferral
//!
//! OS signals are not acted on where they arrive. A listener task feeds them
//! into a [`SignalRouter`], which dispatches each kind to the handler
//! currently installed for it. [`DeferSignals`] temporarily swaps those
//! handlers for recorders so a critical section runs to completion, then
//! restores the previous handlers and replays what was recorded.

use std::collections::HashMap;
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use tokio::sync::Notify;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use standrig_core::Result;

/// Signals the runner reacts to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SignalKind {
    /// SIGINT / Ctrl-C
    Interrupt,
    /// SIGTERM
    Terminate,
}

impl SignalKind {
    /// Conventional POSIX signal number
    pub fn number(&self) -> i32 {
        match self {
            SignalKind::Interrupt => 2,
            SignalKind::Terminate => 15,
        }
    }

    /// Shell-style exit status of a process killed by this signal
    pub fn exit_code(&self) -> i32 {
        128 + self.number()
    }
}

impl fmt::Display for SignalKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SignalKind::Interrupt => f.write_str("SIGINT"),
            SignalKind::Terminate => f.write_str("SIGTERM"),
        }
    }
}

/// Installed reaction to a signal
pub type SignalHandler = Arc<dyn Fn(SignalKind) + Send + Sync>;

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Application-level signal dispositions
///
/// Cloning yields another handle to the same handler table.
#[derive(Clone, Default)]
pub struct SignalRouter {
    handlers: Arc<Mutex<HashMap<SignalKind, SignalHandler>>>,
}

impl SignalRouter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install `handler` for `kind`, returning the handler it replaces
    pub fn set_handler(
        &self,
        kind: SignalKind,
        handler: impl Fn(SignalKind) + Send + Sync + 'static,
    ) -> Option<SignalHandler> {
        let handler: SignalHandler = Arc::new(handler);
        self.replace(kind, Some(handler))
    }

    /// Swap the handler for `kind`; `None` removes it
    fn replace(&self, kind: SignalKind, handler: Option<SignalHandler>) -> Option<SignalHandler> {
        let mut handlers = lock(&self.handlers);
        match handler {
            Some(handler) => handlers.insert(kind, handler),
            None => handlers.remove(&kind),
        }
    }

    /// Dispatch `kind` to its current handler
    ///
    /// Returns `false` if no handler is installed, in which case the signal
    /// is dropped.
    pub fn deliver(&self, kind: SignalKind) -> bool {
        // Clone out so the handler may itself touch the router
        let handler = lock(&self.handlers).get(&kind).cloned();
        match handler {
            Some(handler) => {
                handler(kind);
                true
            }
            None => {
                warn!("No handler installed for {}, ignoring", kind);
                false
            }
        }
    }

    /// Forward OS signals into this router from a background task
    ///
    /// Must be called from within a Tokio runtime.
    pub fn listen(&self) -> Result<JoinHandle<()>> {
        let router = self.clone();

        #[cfg(unix)]
        let mut terminate =
            tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())?;

        Ok(tokio::spawn(async move {
            loop {
                #[cfg(unix)]
                let received = tokio::select! {
                    result = tokio::signal::ctrl_c() => result.ok().map(|_| SignalKind::Interrupt),
                    received = terminate.recv() => received.map(|_| SignalKind::Terminate),
                };

                #[cfg(not(unix))]
                let received = tokio::signal::ctrl_c()
                    .await
                    .ok()
                    .map(|_| SignalKind::Interrupt);

                let Some(kind) = received else {
                    warn!("Signal listener stopped");
                    break;
                };

                info!("Received {}", kind);
                router.deliver(kind);
            }
        }))
    }
}

/// What the recorders of one scope share
#[derive(Default)]
struct Deferred {
    pending: Vec<SignalKind>,
    /// Set once the previous handlers are back; late deliveries pass through
    closed: bool,
}

/// Scope during which the given signals are recorded instead of handled
///
/// Entering installs a recorder for each declared kind. Dropping the guard
/// restores the previous handlers, then replays every recorded kind once
/// through the router, so the pre-scope behaviour is honoured after the
/// critical section. Repeated deliveries of one kind collapse into a single
/// pending occurrence. Kinds outside the declared set are not touched.
///
/// A delivery that picked up a recorder just before the scope closed is
/// forwarded to the restored handler rather than lost.
///
/// Scopes nest: an inner scope's replay lands in the outer scope's recorder.
pub struct DeferSignals {
    router: SignalRouter,
    previous: Vec<(SignalKind, Option<SignalHandler>)>,
    deferred: Arc<Mutex<Deferred>>,
}

impl DeferSignals {
    /// Start deferring `kinds` on `router`
    pub fn enter(router: &SignalRouter, kinds: &[SignalKind]) -> Self {
        let deferred = Arc::new(Mutex::new(Deferred::default()));
        let mut previous = Vec::with_capacity(kinds.len());

        for &kind in kinds {
            if previous.iter().any(|(seen, _)| *seen == kind) {
                continue;
            }

            let record = deferred.clone();
            let forward = router.clone();
            let recorder: SignalHandler = Arc::new(move |kind: SignalKind| {
                {
                    let mut deferred = lock(&record);
                    if !deferred.closed {
                        if !deferred.pending.contains(&kind) {
                            debug!("Deferring {}", kind);
                            deferred.pending.push(kind);
                        }
                        return;
                    }
                }
                forward.deliver(kind);
            });
            previous.push((kind, router.replace(kind, Some(recorder))));
        }

        Self {
            router: router.clone(),
            previous,
            deferred,
        }
    }

    /// Signals recorded so far, in arrival order
    pub fn pending(&self) -> Vec<SignalKind> {
        lock(&self.deferred).pending.clone()
    }
}

impl Drop for DeferSignals {
    fn drop(&mut self) {
        // Recorders wait on this lock, so none can record once it is released
        let pending = {
            let mut deferred = lock(&self.deferred);
            for (kind, handler) in self.previous.drain(..).rev() {
                self.router.replace(kind, handler);
            }
            deferred.closed = true;
            std::mem::take(&mut deferred.pending)
        };

        for kind in pending {
            info!("Replaying deferred {}", kind);
            self.router.deliver(kind);
        }
    }
}

/// Latches the first signal delivered to it
///
/// Installed as a router handler, it turns an asynchronous signal into a
/// value that can be polled or awaited at a safe point.
#[derive(Clone, Default)]
pub struct SignalLatch {
    received: Arc<Mutex<Option<SignalKind>>>,
    notify: Arc<Notify>,
}

impl SignalLatch {
    pub fn new() -> Self {
        Self::default()
    }

    /// Router handler that trips this latch
    pub fn handler(&self) -> impl Fn(SignalKind) + Send + Sync + 'static {
        let latch = self.clone();
        move |kind| latch.trip(kind)
    }

    fn trip(&self, kind: SignalKind) {
        lock(&self.received).get_or_insert(kind);
        self.notify.notify_waiters();
    }

    /// First signal received, if any
    pub fn received(&self) -> Option<SignalKind> {
        *lock(&self.received)
    }

    /// Wait until a signal has been received
    pub async fn wait(&self) -> SignalKind {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if let Some(kind) = self.received() {
                return kind;
            }
            notified.await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    /// Router whose handlers append to a shared log
    fn recording_router() -> (SignalRouter, Arc<Mutex<Vec<SignalKind>>>) {
        let router = SignalRouter::new();
        let log = Arc::new(Mutex::new(Vec::new()));
        for kind in [SignalKind::Interrupt, SignalKind::Terminate] {
            let log = log.clone();
            router.set_handler(kind, move |k| log.lock().unwrap().push(k));
        }
        (router, log)
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(SignalKind::Interrupt.exit_code(), 130);
        assert_eq!(SignalKind::Terminate.exit_code(), 143);
    }

    #[test]
    fn test_deliver_without_handler() {
        let router = SignalRouter::new();
        assert!(!router.deliver(SignalKind::Interrupt));
    }

    #[test]
    fn test_set_handler_returns_previous() {
        let router = SignalRouter::new();
        assert!(router.set_handler(SignalKind::Interrupt, |_| {}).is_none());
        assert!(router.set_handler(SignalKind::Interrupt, |_| {}).is_some());
    }

    #[test]
    fn test_signals_are_deferred_until_scope_ends() {
        let (router, log) = recording_router();

        {
            let guard = DeferSignals::enter(&router, &[SignalKind::Interrupt]);
            router.deliver(SignalKind::Interrupt);
            assert!(log.lock().unwrap().is_empty());
            assert_eq!(guard.pending(), vec![SignalKind::Interrupt]);
        }

        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Interrupt]);
    }

    #[test]
    fn test_repeated_signal_replayed_once() {
        let (router, log) = recording_router();

        {
            let _guard =
                DeferSignals::enter(&router, &[SignalKind::Interrupt, SignalKind::Terminate]);
            router.deliver(SignalKind::Interrupt);
            router.deliver(SignalKind::Interrupt);
            router.deliver(SignalKind::Terminate);
            router.deliver(SignalKind::Interrupt);
        }

        assert_eq!(
            *log.lock().unwrap(),
            vec![SignalKind::Interrupt, SignalKind::Terminate]
        );
    }

    #[test]
    fn test_no_replay_without_signal() {
        let (router, log) = recording_router();

        drop(DeferSignals::enter(
            &router,
            &[SignalKind::Interrupt, SignalKind::Terminate],
        ));

        assert!(log.lock().unwrap().is_empty());
        router.deliver(SignalKind::Terminate);
        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Terminate]);
    }

    #[test]
    fn test_undeclared_kind_passes_through() {
        let (router, log) = recording_router();

        let _guard = DeferSignals::enter(&router, &[SignalKind::Interrupt]);
        router.deliver(SignalKind::Terminate);

        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Terminate]);
    }

    #[test]
    fn test_nested_scopes_replay_into_outer() {
        let (router, log) = recording_router();

        {
            let outer = DeferSignals::enter(&router, &[SignalKind::Interrupt]);
            {
                let _inner = DeferSignals::enter(&router, &[SignalKind::Interrupt]);
                router.deliver(SignalKind::Interrupt);
            }
            assert!(log.lock().unwrap().is_empty());
            assert_eq!(outer.pending(), vec![SignalKind::Interrupt]);
        }

        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Interrupt]);
    }

    #[test]
    fn test_scope_without_previous_handler() {
        let router = SignalRouter::new();

        {
            let _guard = DeferSignals::enter(&router, &[SignalKind::Terminate]);
            assert!(router.deliver(SignalKind::Terminate));
        }

        // Restored to "no handler"; the replay found nothing to call
        assert!(!router.deliver(SignalKind::Terminate));
    }

    #[test]
    fn test_delivery_racing_scope_exit_is_not_lost() {
        let (router, log) = recording_router();

        let guard = DeferSignals::enter(&router, &[SignalKind::Interrupt]);
        // As taken by a delivery on the listener task just before the scope ends
        let in_flight = lock(&router.handlers)
            .get(&SignalKind::Interrupt)
            .cloned()
            .unwrap();
        drop(guard);

        in_flight(SignalKind::Interrupt);
        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Interrupt]);
    }

    #[test]
    fn test_handler_restored_after_scope() {
        let (router, log) = recording_router();

        drop(DeferSignals::enter(&router, &[SignalKind::Interrupt]));
        router.deliver(SignalKind::Interrupt);

        assert_eq!(*log.lock().unwrap(), vec![SignalKind::Interrupt]);
    }

    #[tokio::test]
    async fn test_latch_records_first_signal() {
        let router = SignalRouter::new();
        let latch = SignalLatch::new();
        router.set_handler(SignalKind::Interrupt, latch.handler());
        router.set_handler(SignalKind::Terminate, latch.handler());

        assert_eq!(latch.received(), None);

        let waiter = {
            let latch = latch.clone();
            tokio::spawn(async move { latch.wait().await })
        };
        tokio::time::sleep(Duration::from_millis(10)).await;

        router.deliver(SignalKind::Terminate);
        router.deliver(SignalKind::Interrupt);

        let kind = tokio::time::timeout(Duration::from_secs(1), waiter)
            .await
            .unwrap()
            .unwrap();
        assert_eq!(kind, SignalKind::Terminate);
        assert_eq!(latch.received(), Some(SignalKind::Terminate));
    }

    #[tokio::test]
    async fn test_latch_wait_after_trip_returns_immediately() {
        let latch = SignalLatch::new();
        latch.handler()(SignalKind::Interrupt);

        assert_eq!(latch.wait().await, SignalKind::Interrupt);
    }

    #[test]
    fn test_latch_wait_pending_until_tripped() {
        let latch = SignalLatch::new();
        let mut wait = tokio_test::task::spawn(latch.wait());

        tokio_test::assert_pending!(wait.poll());
        latch.handler()(SignalKind::Interrupt);
        assert!(wait.is_woken());
        tokio_test::assert_ready_eq!(wait.poll(), SignalKind::Interrupt);
    }
}

//! Token Request Bridge
//!
//! Hands token requests from worker threads to a privileged context (for
//! example a UI thread able to show an interactive login) and carries the
//! answer back.
//!
//! A worker calls [`TokenRequestBridge::send_request`] and then blocks (or
//! awaits) on the returned [`TokenRequestHandle`]. Observers registered with
//! [`TokenRequestBridge::subscribe`] receive each handle; the first one to
//! claim it resolves it exactly once. Observers are held only for as long as
//! their [`TokenRequestSubscription`] lives.

use parking_lot::{Condvar, Mutex};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::thread::ThreadId;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, trace, warn};

use crate::auth::AccessToken;
use crate::error::TokenError;

#[derive(Default)]
struct HandleState {
    consumed: bool,
    outcome: Option<Result<AccessToken, TokenError>>,
}

/// One in-flight request for a token.
///
/// `consumed` flips once, when an observer claims the request or it is
/// resolved. The outcome is written at most once; a wait that times out
/// records the timeout as the outcome, so a late answer is rejected.
pub struct TokenRequestHandle {
    id: u64,
    scopes: Vec<String>,
    state: Mutex<HandleState>,
    resolved: Condvar,
    notify: Notify,
}

impl TokenRequestHandle {
    fn new(id: u64, scopes: Vec<String>) -> Arc<Self> {
        Arc::new(Self {
            id,
            scopes,
            state: Mutex::new(HandleState::default()),
            resolved: Condvar::new(),
            notify: Notify::new(),
        })
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }

    pub fn is_consumed(&self) -> bool {
        self.state.lock().consumed
    }

    pub fn is_resolved(&self) -> bool {
        self.state.lock().outcome.is_some()
    }

    /// Claim the request. Returns `false` if it was already claimed.
    pub fn try_consume(&self) -> bool {
        let mut state = self.state.lock();
        if state.consumed {
            return false;
        }
        state.consumed = true;
        true
    }

    pub fn set_token(&self, token: AccessToken) -> Result<(), TokenError> {
        self.resolve(Ok(token))
    }

    pub fn set_error(&self, error: TokenError) -> Result<(), TokenError> {
        self.resolve(Err(error))
    }

    fn resolve(&self, outcome: Result<AccessToken, TokenError>) -> Result<(), TokenError> {
        {
            let mut state = self.state.lock();
            if state.outcome.is_some() {
                trace!(request_id = self.id, "token request already resolved");
                return Err(TokenError::AlreadyResolved);
            }
            state.consumed = true;
            state.outcome = Some(outcome);
        }
        self.resolved.notify_all();
        self.notify.notify_waiters();
        Ok(())
    }

    /// Record a timeout unless an outcome arrived first, and return whatever
    /// the outcome now is.
    fn expire(&self, timeout: Duration) -> Result<AccessToken, TokenError> {
        let outcome = {
            let mut state = self.state.lock();
            if state.outcome.is_none() {
                warn!(request_id = self.id, ?timeout, "token request timed out");
                state.consumed = true;
                state.outcome = Some(Err(TokenError::Timeout { timeout }));
            }
            state.outcome.clone()
        };
        self.resolved.notify_all();
        self.notify.notify_waiters();
        outcome.unwrap_or(Err(TokenError::Timeout { timeout }))
    }

    /// Block the calling thread until the request resolves or `timeout`
    /// elapses.
    pub fn wait_for_token(&self, timeout: Duration) -> Result<AccessToken, TokenError> {
        self.wait_until(Instant::now() + timeout, timeout)
    }

    /// Like [`wait_for_token`](Self::wait_for_token) with an absolute
    /// deadline; `timeout` is what a timeout error reports.
    pub(crate) fn wait_until(
        &self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<AccessToken, TokenError> {
        let mut state = self.state.lock();
        loop {
            if let Some(outcome) = &state.outcome {
                return outcome.clone();
            }
            if self.resolved.wait_until(&mut state, deadline).timed_out() {
                break;
            }
        }
        drop(state);
        self.expire(timeout)
    }

    /// Async counterpart of [`wait_for_token`](Self::wait_for_token).
    pub async fn wait_for_token_async(
        &self,
        timeout: Duration,
    ) -> Result<AccessToken, TokenError> {
        self.wait_until_async(Instant::now() + timeout, timeout).await
    }

    pub(crate) async fn wait_until_async(
        &self,
        deadline: Instant,
        timeout: Duration,
    ) -> Result<AccessToken, TokenError> {
        let wait = async {
            loop {
                let notified = self.notify.notified();
                tokio::pin!(notified);
                notified.as_mut().enable();

                let outcome = self.state.lock().outcome.clone();
                if let Some(outcome) = outcome {
                    return outcome;
                }
                notified.await;
            }
        };

        match tokio::time::timeout_at(deadline.into(), wait).await {
            Ok(outcome) => outcome,
            Err(_) => self.expire(timeout),
        }
    }
}

impl std::fmt::Debug for TokenRequestHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let state = self.state.lock();
        f.debug_struct("TokenRequestHandle")
            .field("id", &self.id)
            .field("scopes", &self.scopes)
            .field("consumed", &state.consumed)
            .field("resolved", &state.outcome.is_some())
            .finish()
    }
}

/// Completion callback handed to an [`InteractiveCredentialProvider`].
///
/// Dropping it without calling [`succeed`](Self::succeed),
/// [`fail`](Self::fail) or [`complete`](Self::complete) resolves the request
/// with an error so the waiting thread is released.
pub struct TokenCompletion {
    handle: Arc<TokenRequestHandle>,
    done: bool,
}

impl TokenCompletion {
    pub fn new(handle: Arc<TokenRequestHandle>) -> Self {
        Self {
            handle,
            done: false,
        }
    }

    pub fn scopes(&self) -> &[String] {
        self.handle.scopes()
    }

    pub fn succeed(self, token: AccessToken) -> Result<(), TokenError> {
        self.complete(Ok(token))
    }

    pub fn fail(self, message: impl Into<String>) -> Result<(), TokenError> {
        self.complete(Err(TokenError::AcquisitionFailed {
            message: message.into(),
        }))
    }

    pub fn complete(mut self, outcome: Result<AccessToken, TokenError>) -> Result<(), TokenError> {
        self.done = true;
        self.handle.resolve(outcome)
    }
}

impl Drop for TokenCompletion {
    fn drop(&mut self) {
        if !self.done {
            debug!(request_id = self.handle.id(), "token completion dropped unresolved");
            let _ = self.handle.set_error(TokenError::AcquisitionFailed {
                message: "token provider finished without a result".to_string(),
            });
        }
    }
}

/// Receives token requests published on a [`TokenRequestBridge`].
///
/// Called on the publishing thread; implementations hand the request to
/// their own context and must not block.
pub trait TokenRequestObserver: Send + Sync {
    fn on_token_request(&self, handle: Arc<TokenRequestHandle>);
}

/// Application hook that obtains a token, typically interactively.
pub trait InteractiveCredentialProvider: Send + Sync {
    fn acquire_token(&self, scopes: Vec<String>, completion: TokenCompletion);
}

impl<F> InteractiveCredentialProvider for F
where
    F: Fn(Vec<String>, TokenCompletion) + Send + Sync,
{
    fn acquire_token(&self, scopes: Vec<String>, completion: TokenCompletion) {
        self(scopes, completion)
    }
}

/// Observer that claims unconsumed requests and forwards them to a provider.
pub struct InteractiveTokenObserver<P> {
    provider: P,
}

impl<P: InteractiveCredentialProvider> InteractiveTokenObserver<P> {
    pub fn new(provider: P) -> Self {
        Self { provider }
    }
}

impl<P: InteractiveCredentialProvider> TokenRequestObserver for InteractiveTokenObserver<P> {
    fn on_token_request(&self, handle: Arc<TokenRequestHandle>) {
        if !handle.try_consume() {
            trace!(request_id = handle.id(), "token request already claimed");
            return;
        }
        debug!(request_id = handle.id(), scopes = ?handle.scopes(), "acquiring token");
        let scopes = handle.scopes().to_vec();
        self.provider.acquire_token(scopes, TokenCompletion::new(handle));
    }
}

struct BridgeInner {
    privileged_thread: Mutex<Option<ThreadId>>,
    observers: Mutex<Vec<(u64, Arc<dyn TokenRequestObserver>)>>,
    latest: Mutex<Option<Arc<TokenRequestHandle>>>,
    next_id: AtomicU64,
}

/// Single-slot broadcast of token requests to registered observers.
///
/// Only the most recent request is retained; an observer subscribing late
/// still receives it if nobody has claimed it yet.
#[derive(Clone)]
pub struct TokenRequestBridge {
    inner: Arc<BridgeInner>,
}

impl Default for TokenRequestBridge {
    fn default() -> Self {
        Self::new()
    }
}

impl TokenRequestBridge {
    pub fn new() -> Self {
        Self {
            inner: Arc::new(BridgeInner {
                privileged_thread: Mutex::new(None),
                observers: Mutex::new(Vec::new()),
                latest: Mutex::new(None),
                next_id: AtomicU64::new(1),
            }),
        }
    }

    /// Mark the current thread as the privileged one. Requests sent from it
    /// are refused, since waiting there would block the thread expected to
    /// answer.
    pub fn bind_privileged_thread(&self) {
        self.set_privileged_thread(Some(std::thread::current().id()));
    }

    pub fn set_privileged_thread(&self, thread: Option<ThreadId>) {
        *self.inner.privileged_thread.lock() = thread;
    }

    pub fn is_privileged_thread(&self) -> bool {
        *self.inner.privileged_thread.lock() == Some(std::thread::current().id())
    }

    /// Register an observer. It stays registered until the returned
    /// subscription is dropped.
    #[must_use = "dropping the subscription unsubscribes the observer"]
    pub fn subscribe(&self, observer: Arc<dyn TokenRequestObserver>) -> TokenRequestSubscription {
        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        self.inner
            .observers
            .lock()
            .push((id, Arc::clone(&observer)));

        let pending = self
            .inner
            .latest
            .lock()
            .clone()
            .filter(|handle| !handle.is_consumed());

        debug!(subscription = id, pending = pending.is_some(), "token observer subscribed");
        if let Some(handle) = pending {
            observer.on_token_request(handle);
        }

        TokenRequestSubscription {
            id,
            bridge: Arc::downgrade(&self.inner),
        }
    }

    pub fn observer_count(&self) -> usize {
        self.inner.observers.lock().len()
    }

    /// Create a new request and publish it to every observer.
    pub fn send_request(&self, scopes: &[String]) -> Result<Arc<TokenRequestHandle>, TokenError> {
        let handle = self.create_request(scopes)?;
        self.publish(&handle);
        Ok(handle)
    }

    /// Create a request and make it the latest one, without notifying
    /// observers yet. Late subscribers already receive it.
    pub fn create_request(
        &self,
        scopes: &[String],
    ) -> Result<Arc<TokenRequestHandle>, TokenError> {
        if self.is_privileged_thread() {
            warn!("token requested from the privileged thread");
            return Err(TokenError::PrivilegedThread);
        }

        let id = self.inner.next_id.fetch_add(1, Ordering::Relaxed);
        let handle = TokenRequestHandle::new(id, scopes.to_vec());
        *self.inner.latest.lock() = Some(Arc::clone(&handle));
        Ok(handle)
    }

    /// Deliver `handle` to every current observer. Observers run on the
    /// calling thread; no bridge lock is held while they do.
    pub fn publish(&self, handle: &Arc<TokenRequestHandle>) {
        let observers: Vec<Arc<dyn TokenRequestObserver>> = self
            .inner
            .observers
            .lock()
            .iter()
            .map(|(_, observer)| Arc::clone(observer))
            .collect();

        debug!(
            request_id = handle.id(),
            observers = observers.len(),
            scopes = ?handle.scopes(),
            "publishing token request"
        );
        for observer in observers {
            observer.on_token_request(Arc::clone(handle));
        }
    }
}

impl std::fmt::Debug for TokenRequestBridge {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TokenRequestBridge")
            .field("observers", &self.observer_count())
            .finish()
    }
}

/// Keeps an observer registered. Unsubscribes on drop.
#[derive(Debug)]
pub struct TokenRequestSubscription {
    id: u64,
    bridge: Weak<BridgeInner>,
}

impl TokenRequestSubscription {
    pub fn unsubscribe(self) {}
}

impl Drop for TokenRequestSubscription {
    fn drop(&mut self) {
        if let Some(inner) = self.bridge.upgrade() {
            inner.observers.lock().retain(|(id, _)| *id != self.id);
            trace!(subscription = self.id, "token observer unsubscribed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    fn scopes() -> Vec<String> {
        vec!["https://management.azure.com/.default".to_string()]
    }

    /// Records delivered handles without claiming them.
    #[derive(Default)]
    struct CollectingObserver {
        received: Mutex<Vec<Arc<TokenRequestHandle>>>,
    }

    impl TokenRequestObserver for CollectingObserver {
        fn on_token_request(&self, handle: Arc<TokenRequestHandle>) {
            self.received.lock().push(handle);
        }
    }

    #[test]
    fn test_resolved_handle_returns_immediately() {
        let handle = TokenRequestHandle::new(1, scopes());
        handle.set_token(AccessToken::non_expiring("abc")).unwrap();

        let started = Instant::now();
        let token = handle.wait_for_token(Duration::from_secs(60)).unwrap();
        assert_eq!(token.secret(), "abc");
        assert!(started.elapsed() < Duration::from_secs(1));
    }

    #[test]
    fn test_timeout_then_late_resolve_stays_failed() {
        let handle = TokenRequestHandle::new(1, scopes());
        let result = handle.wait_for_token(Duration::from_millis(20));
        assert!(matches!(result, Err(TokenError::Timeout { .. })));

        assert_eq!(
            handle.set_token(AccessToken::non_expiring("late")),
            Err(TokenError::AlreadyResolved)
        );
        assert!(matches!(
            handle.wait_for_token(Duration::from_millis(1)),
            Err(TokenError::Timeout { .. })
        ));
    }

    #[test]
    fn test_resolve_from_other_thread() {
        let handle = TokenRequestHandle::new(1, scopes());
        let resolver = Arc::clone(&handle);
        let worker = std::thread::spawn(move || {
            std::thread::sleep(Duration::from_millis(20));
            resolver.set_error(TokenError::AcquisitionFailed {
                message: "user cancelled".to_string(),
            })
        });

        let result = handle.wait_for_token(Duration::from_secs(5));
        assert!(matches!(result, Err(TokenError::AcquisitionFailed { .. })));
        assert!(worker.join().unwrap().is_ok());
    }

    #[tokio::test]
    async fn test_async_wait() {
        let handle = TokenRequestHandle::new(1, scopes());
        let resolver = Arc::clone(&handle);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            resolver.set_token(AccessToken::non_expiring("async")).unwrap();
        });

        let token = handle
            .wait_for_token_async(Duration::from_secs(5))
            .await
            .unwrap();
        assert_eq!(token.secret(), "async");

        let unresolved = TokenRequestHandle::new(2, scopes());
        assert!(matches!(
            unresolved.wait_for_token_async(Duration::from_millis(10)).await,
            Err(TokenError::Timeout { .. })
        ));
        assert!(unresolved.is_resolved());
    }

    #[test]
    fn test_send_request_from_privileged_thread_fails() {
        let bridge = TokenRequestBridge::new();
        bridge.bind_privileged_thread();
        assert!(matches!(
            bridge.send_request(&scopes()),
            Err(TokenError::PrivilegedThread)
        ));

        let worker_bridge = bridge.clone();
        let from_worker = std::thread::spawn(move || worker_bridge.send_request(&scopes()).is_ok())
            .join()
            .unwrap();
        assert!(from_worker);
    }

    #[test]
    fn test_late_subscriber_receives_pending_request() {
        let bridge = TokenRequestBridge::new();
        let handle = bridge.send_request(&scopes()).unwrap();

        let observer = Arc::new(CollectingObserver::default());
        let _subscription = bridge.subscribe(observer.clone());
        assert_eq!(observer.received.lock().len(), 1);
        assert_eq!(observer.received.lock()[0].id(), handle.id());

        assert!(handle.try_consume());
        let late = Arc::new(CollectingObserver::default());
        let _late_subscription = bridge.subscribe(late.clone());
        assert!(late.received.lock().is_empty());
    }

    #[test]
    fn test_create_request_defers_delivery_until_publish() {
        let bridge = TokenRequestBridge::new();
        let observer = Arc::new(CollectingObserver::default());
        let _subscription = bridge.subscribe(observer.clone());

        let handle = bridge.create_request(&scopes()).unwrap();
        assert!(observer.received.lock().is_empty());

        bridge.publish(&handle);
        assert_eq!(observer.received.lock().len(), 1);
        assert_eq!(observer.received.lock()[0].id(), handle.id());
    }

    #[test]
    fn test_wait_until_past_deadline_prefers_outcome() {
        let handle = TokenRequestHandle::new(1, scopes());
        handle.set_token(AccessToken::non_expiring("ready")).unwrap();

        let token = handle
            .wait_until(Instant::now(), Duration::from_millis(10))
            .unwrap();
        assert_eq!(token.secret(), "ready");
    }

    #[test]
    fn test_subscription_drop_unsubscribes() {
        let bridge = TokenRequestBridge::new();
        let observer = Arc::new(CollectingObserver::default());

        let subscription = bridge.subscribe(observer.clone());
        assert_eq!(bridge.observer_count(), 1);
        drop(subscription);
        assert_eq!(bridge.observer_count(), 0);

        bridge.send_request(&scopes()).unwrap();
        assert!(observer.received.lock().is_empty());
    }

    #[test]
    fn test_only_one_observer_acquires() {
        let bridge = TokenRequestBridge::new();
        let calls = Arc::new(AtomicUsize::new(0));

        let make_observer = |calls: Arc<AtomicUsize>| {
            Arc::new(InteractiveTokenObserver::new(
                move |_scopes: Vec<String>, completion: TokenCompletion| {
                    calls.fetch_add(1, Ordering::SeqCst);
                    completion.succeed(AccessToken::non_expiring("abc")).unwrap();
                },
            ))
        };
        let _first = bridge.subscribe(make_observer(Arc::clone(&calls)));
        let _second = bridge.subscribe(make_observer(Arc::clone(&calls)));

        let handle = bridge.send_request(&scopes()).unwrap();
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(
            handle.wait_for_token(Duration::from_secs(1)).unwrap().secret(),
            "abc"
        );
    }

    #[test]
    fn test_dropped_completion_reports_error() {
        let bridge = TokenRequestBridge::new();
        let _subscription = bridge.subscribe(Arc::new(InteractiveTokenObserver::new(
            |_scopes: Vec<String>, _completion: TokenCompletion| {},
        )));

        let handle = bridge.send_request(&scopes()).unwrap();
        assert!(matches!(
            handle.wait_for_token(Duration::from_secs(1)),
            Err(TokenError::AcquisitionFailed { .. })
        ));
    }
}

//! Bridged Token Credential
//!
//! A [`TokenCredential`] that obtains tokens through a [`TokenRequestBridge`]
//! and caches them until they expire.

use async_trait::async_trait;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, trace};

use crate::auth::{AccessToken, TokenCredential, TokenRequestBridge, TokenRequestHandle};
use crate::core::{Clock, SystemClock};
use crate::error::{PipelineResult, TokenError};

/// Default time to wait for the privileged side to answer.
pub const DEFAULT_TOKEN_WAIT_TIMEOUT: Duration = Duration::from_secs(60);

#[derive(Default)]
struct CredentialState {
    cached: Option<AccessToken>,
    in_flight: Option<Arc<TokenRequestHandle>>,
}

enum Acquisition {
    Cached(AccessToken),
    Pending(Arc<TokenRequestHandle>),
    /// Created by this caller; it must be published once the lock is released.
    Started(Arc<TokenRequestHandle>),
}

/// Credential backed by a [`TokenRequestBridge`].
///
/// Concurrent callers without a usable cached token share one in-flight
/// request, so the application sees at most one prompt and every caller gets
/// the same token or the same error. The lock is never held while waiting
/// or while observers run.
pub struct BridgedTokenCredential {
    bridge: TokenRequestBridge,
    clock: Arc<dyn Clock>,
    timeout: Duration,
    state: Mutex<CredentialState>,
}

impl BridgedTokenCredential {
    pub fn new(bridge: TokenRequestBridge) -> Self {
        Self {
            bridge,
            clock: Arc::new(SystemClock),
            timeout: DEFAULT_TOKEN_WAIT_TIMEOUT,
            state: Mutex::new(CredentialState::default()),
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn bridge(&self) -> &TokenRequestBridge {
        &self.bridge
    }

    pub fn timeout(&self) -> Duration {
        self.timeout
    }

    /// The cached token, if it has not expired.
    pub fn cached_token(&self) -> Option<AccessToken> {
        let now = self.clock.now();
        self.state
            .lock()
            .cached
            .as_ref()
            .filter(|token| !token.is_expired_at(now))
            .cloned()
    }

    pub fn clear_cache(&self) {
        self.state.lock().cached = None;
    }

    fn begin(&self, scopes: &[String]) -> Result<Acquisition, TokenError> {
        let mut state = self.state.lock();

        if let Some(token) = &state.cached {
            if !token.is_expired_at(self.clock.now()) {
                trace!("using cached token");
                return Ok(Acquisition::Cached(token.clone()));
            }
            debug!("cached token expired");
            state.cached = None;
        }

        if let Some(handle) = &state.in_flight {
            trace!(request_id = handle.id(), "joining in-flight token request");
            return Ok(Acquisition::Pending(Arc::clone(handle)));
        }

        let handle = self.bridge.create_request(scopes)?;
        state.in_flight = Some(Arc::clone(&handle));
        Ok(Acquisition::Started(handle))
    }

    fn finish(&self, handle: &Arc<TokenRequestHandle>, outcome: &Result<AccessToken, TokenError>) {
        let mut state = self.state.lock();
        let current = state
            .in_flight
            .as_ref()
            .map(|h| Arc::ptr_eq(h, handle))
            .unwrap_or(false);
        if current {
            state.in_flight = None;
            if let Ok(token) = outcome {
                state.cached = Some(token.clone());
            }
        }
    }

    /// Get a token, blocking the calling thread while the privileged side
    /// answers. Fails with [`TokenError::PrivilegedThread`] when called from
    /// the thread bound on the bridge.
    pub fn get_token_blocking(&self, scopes: &[String]) -> Result<AccessToken, TokenError> {
        let deadline = Instant::now() + self.timeout;
        let handle = match self.begin(scopes)? {
            Acquisition::Cached(token) => return Ok(token),
            Acquisition::Pending(handle) => handle,
            Acquisition::Started(handle) => {
                self.bridge.publish(&handle);
                handle
            }
        };
        let outcome = handle.wait_until(deadline, self.timeout);
        self.finish(&handle, &outcome);
        outcome
    }
}

#[async_trait]
impl TokenCredential for BridgedTokenCredential {
    async fn get_token(&self, scopes: &[String]) -> PipelineResult<AccessToken> {
        let deadline = Instant::now() + self.timeout;
        let handle = match self.begin(scopes)? {
            Acquisition::Cached(token) => return Ok(token),
            Acquisition::Pending(handle) => handle,
            Acquisition::Started(handle) => {
                self.bridge.publish(&handle);
                handle
            }
        };
        let outcome = handle.wait_until_async(deadline, self.timeout).await;
        self.finish(&handle, &outcome);
        Ok(outcome?)
    }
}

impl std::fmt::Debug for BridgedTokenCredential {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BridgedTokenCredential")
            .field("bridge", &self.bridge)
            .field("timeout", &self.timeout)
            .finish()
    }
}

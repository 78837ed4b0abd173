//! HTTP Pipeline
//!
//! An immutable, ordered list of policies in front of a transport. Every call
//! walks the list through a fresh [`NextPolicy`] cursor: each policy may touch
//! the request, delegate downstream, then inspect the response on the way back.
//!
//! ```rust,ignore
//! use azure_pipeline::{AddHeadersPolicy, HttpMethod, HttpPipeline, HttpRequest, ReqwestHttpTransport};
//!
//! let pipeline = HttpPipeline::builder()
//!     .policy(AddHeadersPolicy::overwrite([("x-ms-version", "2023-11-03")]))
//!     .transport(ReqwestHttpTransport::new()?)
//!     .build()?;
//!
//! let request = HttpRequest::parse(HttpMethod::Get, "https://account.blob.core.windows.net/")?;
//! let response = pipeline.send(request).await?;
//! ```

pub mod builder;
pub mod options;
pub mod policies;

pub use builder::HttpPipelineBuilder;
pub use options::{PipelineOptions, PipelineOptionsBuilder};
pub use policies::*;

use async_trait::async_trait;
use futures::future::BoxFuture;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace, warn};

use crate::core::{HttpRequest, HttpResponse, HttpTransport};
use crate::error::{PipelineError, PipelineResult};
use policies::logging::redact_url;

/// A pipeline stage.
///
/// Implementations normally call `next.process(ctx)` exactly once. A policy
/// may skip it to short-circuit, or clone `next` once per attempt to re-run
/// the downstream stages.
#[async_trait]
pub trait HttpPipelinePolicy: Send + Sync {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse>;

    /// Short name used in logs.
    fn name(&self) -> &'static str;
}

/// Per-call state: the request being sent, a cancellation token and a
/// string bag policies can use to talk to each other.
#[derive(Debug)]
pub struct PipelineContext {
    request: HttpRequest,
    cancellation: CancellationToken,
    data: HashMap<String, String>,
}

impl PipelineContext {
    pub fn new(request: HttpRequest) -> Self {
        Self::with_cancellation(request, CancellationToken::new())
    }

    pub fn with_cancellation(request: HttpRequest, cancellation: CancellationToken) -> Self {
        Self {
            request,
            cancellation,
            data: HashMap::new(),
        }
    }

    pub fn request(&self) -> &HttpRequest {
        &self.request
    }

    pub fn request_mut(&mut self) -> &mut HttpRequest {
        &mut self.request
    }

    pub fn into_request(self) -> HttpRequest {
        self.request
    }

    pub fn cancellation(&self) -> &CancellationToken {
        &self.cancellation
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancellation.is_cancelled()
    }

    pub fn set_data(&mut self, key: impl Into<String>, value: impl Into<String>) {
        self.data.insert(key.into(), value.into());
    }

    pub fn data(&self, key: &str) -> Option<&str> {
        self.data.get(key).map(String::as_str)
    }
}

struct PipelineInner {
    policies: Vec<Arc<dyn HttpPipelinePolicy>>,
    transport: Arc<dyn HttpTransport>,
}

/// Cursor over the remaining pipeline stages for one call.
///
/// Stage `i < N` is policy `i`; stage `N` is the transport. Every
/// [`NextPolicy::process`] enters the next stage, so one cursor drives a
/// request through the pipeline exactly once. Cloning copies the position.
#[derive(Clone)]
pub struct NextPolicy {
    pipeline: Arc<PipelineInner>,
    next_stage: usize,
}

impl NextPolicy {
    /// Run the next stage.
    pub fn process<'a>(
        &'a mut self,
        ctx: &'a mut PipelineContext,
    ) -> BoxFuture<'a, PipelineResult<HttpResponse>> {
        Box::pin(async move {
            let policy_count = self.pipeline.policies.len();
            let stage = self.next_stage;

            if stage > policy_count {
                warn!(policy_count, "process() called on an exhausted pipeline cursor");
                return Err(PipelineError::Exhausted { policy_count });
            }
            self.next_stage += 1;

            if ctx.is_cancelled() {
                return Err(PipelineError::Cancelled);
            }

            if stage == policy_count {
                let transport = Arc::clone(&self.pipeline.transport);
                let request = Arc::new(ctx.request().clone());
                let cancellation = ctx.cancellation().clone();
                trace!(method = %request.method, url = %redact_url(&request.url), "sending request to transport");

                tokio::select! {
                    biased;
                    _ = cancellation.cancelled() => Err(PipelineError::Cancelled),
                    result = transport.send(&request) => {
                        result.map(|response| response.with_request(Arc::clone(&request)))
                    }
                }
            } else {
                let policy = Arc::clone(&self.pipeline.policies[stage]);
                trace!(stage, policy = policy.name(), "entering policy");
                policy.process(ctx, self).await
            }
        })
    }

    /// Stages left to run, counting the transport.
    pub fn remaining(&self) -> usize {
        (self.pipeline.policies.len() + 1).saturating_sub(self.next_stage)
    }

    pub fn is_exhausted(&self) -> bool {
        self.remaining() == 0
    }
}

impl fmt::Debug for NextPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("NextPolicy")
            .field("next_stage", &self.next_stage)
            .field("policy_count", &self.pipeline.policies.len())
            .finish()
    }
}

/// Immutable policy chain plus transport. Cheap to clone and safe to share
/// across threads; per-call state lives in the cursor and context.
#[derive(Clone)]
pub struct HttpPipeline {
    inner: Arc<PipelineInner>,
}

impl HttpPipeline {
    pub fn new(
        policies: Vec<Arc<dyn HttpPipelinePolicy>>,
        transport: Arc<dyn HttpTransport>,
    ) -> Self {
        Self {
            inner: Arc::new(PipelineInner {
                policies,
                transport,
            }),
        }
    }

    pub fn builder() -> HttpPipelineBuilder {
        HttpPipelineBuilder::new()
    }

    pub fn policy_count(&self) -> usize {
        self.inner.policies.len()
    }

    pub fn policy_names(&self) -> Vec<&'static str> {
        self.inner.policies.iter().map(|p| p.name()).collect()
    }

    /// A fresh cursor positioned before the first policy.
    pub fn cursor(&self) -> NextPolicy {
        NextPolicy {
            pipeline: Arc::clone(&self.inner),
            next_stage: 0,
        }
    }

    /// Send a request through every policy and the transport.
    pub async fn send(&self, request: HttpRequest) -> PipelineResult<HttpResponse> {
        let mut ctx = PipelineContext::new(request);
        self.send_with_context(&mut ctx).await
    }

    /// Send with a caller-supplied cancellation token.
    pub async fn send_cancellable(
        &self,
        request: HttpRequest,
        cancellation: CancellationToken,
    ) -> PipelineResult<HttpResponse> {
        let mut ctx = PipelineContext::with_cancellation(request, cancellation);
        self.send_with_context(&mut ctx).await
    }

    /// Send using an existing context; the request left in `ctx` reflects
    /// every policy's changes.
    pub async fn send_with_context(
        &self,
        ctx: &mut PipelineContext,
    ) -> PipelineResult<HttpResponse> {
        debug!(
            method = %ctx.request().method,
            url = %redact_url(&ctx.request().url),
            policies = self.policy_count(),
            "pipeline send"
        );
        let mut cursor = self.cursor();
        cursor.process(ctx).await
    }
}

impl fmt::Debug for HttpPipeline {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HttpPipeline")
            .field("policies", &self.policy_names())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpMethod, MockHttpTransport, MockResponse};
    use parking_lot::Mutex;

    /// Records entry and exit so ordering can be asserted.
    struct RecordingPolicy {
        label: &'static str,
        log: Arc<Mutex<Vec<String>>>,
    }

    #[async_trait]
    impl HttpPipelinePolicy for RecordingPolicy {
        async fn process(
            &self,
            ctx: &mut PipelineContext,
            next: &mut NextPolicy,
        ) -> PipelineResult<HttpResponse> {
            self.log.lock().push(format!("enter {}", self.label));
            let result = next.process(ctx).await;
            self.log.lock().push(format!("exit {}", self.label));
            result
        }

        fn name(&self) -> &'static str {
            self.label
        }
    }

    /// Answers without delegating.
    struct ShortCircuitPolicy;

    #[async_trait]
    impl HttpPipelinePolicy for ShortCircuitPolicy {
        async fn process(
            &self,
            _ctx: &mut PipelineContext,
            _next: &mut NextPolicy,
        ) -> PipelineResult<HttpResponse> {
            Ok(MockResponse::new(304).into_response())
        }

        fn name(&self) -> &'static str {
            "short-circuit"
        }
    }

    /// Calls `next` twice on the same cursor.
    struct DoubleCallPolicy;

    #[async_trait]
    impl HttpPipelinePolicy for DoubleCallPolicy {
        async fn process(
            &self,
            ctx: &mut PipelineContext,
            next: &mut NextPolicy,
        ) -> PipelineResult<HttpResponse> {
            next.process(ctx).await?;
            next.process(ctx).await
        }

        fn name(&self) -> &'static str {
            "double-call"
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Get, "https://example.com/resource").unwrap()
    }

    #[tokio::test]
    async fn test_policies_run_in_order_then_unwind() {
        let log = Arc::new(Mutex::new(Vec::new()));
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::ok());

        let policies: Vec<Arc<dyn HttpPipelinePolicy>> = ["a", "b", "c"]
            .into_iter()
            .map(|label| {
                Arc::new(RecordingPolicy {
                    label,
                    log: Arc::clone(&log),
                }) as Arc<dyn HttpPipelinePolicy>
            })
            .collect();
        let pipeline = HttpPipeline::new(policies, transport.clone());

        let response = pipeline.send(request()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(
            *log.lock(),
            vec!["enter a", "enter b", "enter c", "exit c", "exit b", "exit a"]
        );
        assert_eq!(transport.request_count(), 1);
        assert_eq!(
            response.request().map(|r| r.url.path()),
            Some("/resource")
        );
    }

    #[tokio::test]
    async fn test_empty_pipeline_calls_transport() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.queue_response(MockResponse::new(201));
        let pipeline = HttpPipeline::new(Vec::new(), transport.clone());

        assert_eq!(pipeline.send(request()).await.unwrap().status(), 201);
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_short_circuit_skips_transport() {
        let transport = Arc::new(MockHttpTransport::new());
        let pipeline = HttpPipeline::new(vec![Arc::new(ShortCircuitPolicy)], transport.clone());

        assert_eq!(pipeline.send(request()).await.unwrap().status(), 304);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_cursor_exhaustion() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(vec![Arc::new(DoubleCallPolicy)], transport.clone());

        let result = pipeline.send(request()).await;
        assert!(matches!(
            result,
            Err(PipelineError::Exhausted { policy_count: 1 })
        ));
        assert_eq!(transport.request_count(), 1);
    }

    #[tokio::test]
    async fn test_cursor_remaining() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(Vec::new(), transport);

        let mut cursor = pipeline.cursor();
        assert_eq!(cursor.remaining(), 1);

        let mut ctx = PipelineContext::new(request());
        cursor.process(&mut ctx).await.unwrap();
        assert!(cursor.is_exhausted());
        assert!(matches!(
            cursor.process(&mut ctx).await,
            Err(PipelineError::Exhausted { policy_count: 0 })
        ));
    }

    #[tokio::test]
    async fn test_cancelled_before_send() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(Vec::new(), transport.clone());

        let token = CancellationToken::new();
        token.cancel();
        let result = pipeline.send_cancellable(request(), token).await;

        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_transport_error_propagates() {
        let transport = Arc::new(MockHttpTransport::new());
        let pipeline = HttpPipeline::new(Vec::new(), transport);

        let result = pipeline.send(request()).await;
        assert!(matches!(result, Err(PipelineError::Transport(_))));
    }
}

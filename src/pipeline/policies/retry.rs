//! Retry with exponential backoff.

use async_trait::async_trait;
use std::time::Duration;
use tracing::{debug, warn};

use crate::core::{HttpMethod, HttpResponse};
use crate::error::{PipelineError, PipelineResult};
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};
use crate::resilience::RetryConfig;

use super::logging::redact_url;

/// Resubmits requests that fail with a retryable status code, or with a
/// transient transport error when the method is idempotent.
///
/// Every attempt starts from a clone of the request as it reached this policy
/// and drives a clone of the cursor, so only the policies below this one run
/// again.
#[derive(Debug, Clone, Default)]
pub struct RetryPolicy {
    config: RetryConfig,
}

impl RetryPolicy {
    pub fn new(config: RetryConfig) -> Self {
        Self { config }
    }

    pub fn config(&self) -> &RetryConfig {
        &self.config
    }

    fn retry_delay(
        &self,
        method: HttpMethod,
        result: &PipelineResult<HttpResponse>,
        attempt: u32,
    ) -> Option<Duration> {
        match result {
            Ok(response) if self.config.should_retry_status(response.status()) => Some(
                self.config
                    .retry_after(response.headers())
                    .unwrap_or_else(|| self.config.calculate_delay(attempt)),
            ),
            Ok(_) => None,
            // The request may already have been applied.
            Err(PipelineError::Transport(_)) if !method.is_idempotent() => None,
            Err(e) if e.is_retryable() => Some(self.config.calculate_delay(attempt)),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl HttpPipelinePolicy for RetryPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let original = ctx.request().clone();
        let mut attempt = 0u32;

        loop {
            if attempt > 0 {
                *ctx.request_mut() = original.clone();
            }

            let mut cursor = next.clone();
            let result = cursor.process(ctx).await;

            let Some(delay) = self.retry_delay(original.method, &result, attempt) else {
                return result;
            };

            if attempt >= self.config.max_retries {
                warn!(
                    attempts = attempt + 1,
                    url = %redact_url(&original.url),
                    "giving up after max retries"
                );
                return result;
            }

            match &result {
                Ok(response) => debug!(
                    attempt = attempt + 1,
                    status = response.status(),
                    delay_ms = delay.as_millis() as u64,
                    "retrying after retryable status"
                ),
                Err(e) => debug!(
                    attempt = attempt + 1,
                    error = %e,
                    delay_ms = delay.as_millis() as u64,
                    "retrying after transient error"
                ),
            }

            let cancellation = ctx.cancellation().clone();
            tokio::select! {
                biased;
                _ = cancellation.cancelled() => return Err(PipelineError::Cancelled),
                _ = tokio::time::sleep(delay) => {}
            }

            attempt += 1;
        }
    }

    fn name(&self) -> &'static str {
        "retry"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{HttpRequest, MockHttpTransport, MockResponse};
    use crate::error::TransportError;
    use crate::pipeline::{AddHeadersPolicy, HttpPipeline};
    use std::sync::Arc;
    use tokio_util::sync::CancellationToken;

    fn fast_config(max_retries: u32) -> RetryConfig {
        RetryConfig {
            max_retries,
            initial_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(5),
            jitter: 0.0,
            ..Default::default()
        }
    }

    fn request() -> HttpRequest {
        HttpRequest::parse(HttpMethod::Get, "https://example.com/").unwrap()
    }

    #[tokio::test]
    async fn test_retries_retryable_status() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(MockResponse::new(503))
            .queue_response(MockResponse::new(500))
            .queue_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(
            vec![Arc::new(RetryPolicy::new(fast_config(3)))],
            transport.clone(),
        );

        let response = pipeline.send(request()).await.unwrap();
        assert_eq!(response.status(), 200);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_retries_transient_transport_error() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_error(TransportError::ConnectionFailed {
                message: "reset".to_string(),
            })
            .queue_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(
            vec![Arc::new(RetryPolicy::new(fast_config(3)))],
            transport.clone(),
        );

        assert_eq!(pipeline.send(request()).await.unwrap().status(), 200);
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_non_idempotent_transport_error_is_not_retried() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_error(TransportError::ConnectionFailed {
                message: "reset".to_string(),
            })
            .queue_response(MockResponse::new(503))
            .queue_response(MockResponse::new(201));
        let pipeline = HttpPipeline::new(
            vec![Arc::new(RetryPolicy::new(fast_config(3)))],
            transport.clone(),
        );
        let post = || HttpRequest::parse(HttpMethod::Post, "https://example.com/jobs").unwrap();

        assert!(matches!(
            pipeline.send(post()).await,
            Err(PipelineError::Transport(TransportError::ConnectionFailed { .. }))
        ));
        assert_eq!(transport.request_count(), 1);

        // Retryable statuses still apply to every method.
        assert_eq!(pipeline.send(post()).await.unwrap().status(), 201);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_returns_last_response_when_exhausted() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::new(503));
        let pipeline = HttpPipeline::new(
            vec![Arc::new(RetryPolicy::new(fast_config(2)))],
            transport.clone(),
        );

        assert_eq!(pipeline.send(request()).await.unwrap().status(), 503);
        assert_eq!(transport.request_count(), 3);
    }

    #[tokio::test]
    async fn test_does_not_retry_client_errors() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(MockResponse::new(404))
            .queue_error(TransportError::Request {
                message: "bad header".to_string(),
            });
        let pipeline = HttpPipeline::new(
            vec![Arc::new(RetryPolicy::new(fast_config(3)))],
            transport.clone(),
        );

        assert_eq!(pipeline.send(request()).await.unwrap().status(), 404);
        assert!(pipeline.send(request()).await.is_err());
        assert_eq!(transport.request_count(), 2);
    }

    #[tokio::test]
    async fn test_each_attempt_starts_from_original_request() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(MockResponse::new(503))
            .queue_response(MockResponse::ok());
        let pipeline = HttpPipeline::new(
            vec![
                Arc::new(RetryPolicy::new(fast_config(3))),
                Arc::new(AddHeadersPolicy::append([("x-attempt", "1")])),
            ],
            transport.clone(),
        );

        pipeline.send(request()).await.unwrap();

        for sent in transport.get_requests() {
            assert_eq!(sent.headers.get_values("x-attempt"), vec!["1"]);
        }
    }

    #[tokio::test]
    async fn test_honors_retry_after() {
        let transport = Arc::new(MockHttpTransport::new());
        transport
            .queue_response(MockResponse::new(429).with_header("Retry-After", "0"))
            .queue_response(MockResponse::ok());
        let config = RetryConfig {
            initial_delay: Duration::from_secs(5),
            max_delay: Duration::from_secs(10),
            ..fast_config(1)
        };
        let pipeline = HttpPipeline::new(vec![Arc::new(RetryPolicy::new(config))], transport);

        let started = std::time::Instant::now();
        assert_eq!(pipeline.send(request()).await.unwrap().status(), 200);
        assert!(started.elapsed() < Duration::from_secs(2));
    }

    #[tokio::test]
    async fn test_cancel_during_backoff() {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::new(503));
        let config = RetryConfig {
            initial_delay: Duration::from_secs(30),
            max_delay: Duration::from_secs(30),
            ..fast_config(3)
        };
        let pipeline = HttpPipeline::new(vec![Arc::new(RetryPolicy::new(config))], transport.clone());

        let token = CancellationToken::new();
        let canceller = token.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(20)).await;
            canceller.cancel();
        });

        let result = pipeline.send_cancellable(request(), token).await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(transport.request_count(), 1);
    }
}

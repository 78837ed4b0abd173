//! Bearer token authentication.

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::TokenCredential;
use crate::core::HttpResponse;
use crate::error::{PipelineResult, TokenError};
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

/// Sets `Authorization: Bearer <token>` from a [`TokenCredential`].
///
/// Requests to non-https URLs are refused so tokens never travel in clear
/// text.
pub struct BearerTokenAuthenticationPolicy {
    credential: Arc<dyn TokenCredential>,
    scopes: Vec<String>,
}

impl BearerTokenAuthenticationPolicy {
    pub fn new<I, S>(credential: Arc<dyn TokenCredential>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            credential,
            scopes: scopes.into_iter().map(Into::into).collect(),
        }
    }

    pub fn scopes(&self) -> &[String] {
        &self.scopes
    }
}

#[async_trait]
impl HttpPipelinePolicy for BearerTokenAuthenticationPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let scheme = ctx.request().url.scheme();
        if scheme != "https" {
            return Err(TokenError::InsecureTransport {
                scheme: scheme.to_string(),
            }
            .into());
        }

        let token = self.credential.get_token(&self.scopes).await?;
        ctx.request_mut()
            .headers
            .set("Authorization", format!("Bearer {}", token.secret()));
        next.process(ctx).await
    }

    fn name(&self) -> &'static str {
        "bearer-token"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::{AccessToken, MockTokenCredential};
    use crate::core::{HttpMethod, HttpRequest, MockHttpTransport, MockResponse};
    use crate::error::PipelineError;
    use crate::pipeline::HttpPipeline;

    fn pipeline(credential: Arc<MockTokenCredential>) -> (HttpPipeline, Arc<MockHttpTransport>) {
        let transport = Arc::new(MockHttpTransport::new());
        transport.set_default_response(MockResponse::ok());
        let policy = BearerTokenAuthenticationPolicy::new(
            credential,
            ["https://storage.azure.com/.default"],
        );
        (
            HttpPipeline::new(vec![Arc::new(policy)], transport.clone()),
            transport,
        )
    }

    #[tokio::test]
    async fn test_sets_authorization_header() {
        let credential = Arc::new(MockTokenCredential::new());
        credential.set_default_token(AccessToken::non_expiring("abc"));
        let (pipeline, transport) = pipeline(credential.clone());

        let request = HttpRequest::parse(HttpMethod::Get, "https://example.com/").unwrap();
        pipeline.send(request).await.unwrap();

        assert_eq!(
            transport.get_last_request().unwrap().headers.get("authorization"),
            Some("Bearer abc")
        );
        assert_eq!(
            credential.get_history(),
            vec![vec!["https://storage.azure.com/.default".to_string()]]
        );
    }

    #[tokio::test]
    async fn test_refuses_plain_http() {
        let credential = Arc::new(MockTokenCredential::new());
        credential.set_default_token(AccessToken::non_expiring("abc"));
        let (pipeline, transport) = pipeline(credential.clone());

        let request = HttpRequest::parse(HttpMethod::Get, "http://example.com/").unwrap();
        let result = pipeline.send(request).await;

        assert!(matches!(
            result,
            Err(PipelineError::Token(TokenError::InsecureTransport { .. }))
        ));
        assert_eq!(credential.call_count(), 0);
        assert_eq!(transport.request_count(), 0);
    }

    #[tokio::test]
    async fn test_credential_error_stops_request() {
        let credential = Arc::new(MockTokenCredential::new());
        credential.queue_error(TokenError::AcquisitionFailed {
            message: "expired refresh token".to_string(),
        });
        let (pipeline, transport) = pipeline(credential);

        let request = HttpRequest::parse(HttpMethod::Get, "https://example.com/").unwrap();
        assert!(pipeline.send(request).await.is_err());
        assert_eq!(transport.request_count(), 0);
    }
}

//! Client request id.

use async_trait::async_trait;
use uuid::Uuid;

use crate::core::HttpResponse;
use crate::error::PipelineResult;
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

/// Header carrying the client-generated request id.
pub const CLIENT_REQUEST_ID_HEADER: &str = "x-ms-client-request-id";

/// Stamps each request with a random request id unless the caller set one.
#[derive(Debug, Clone)]
pub struct RequestIdPolicy {
    header_name: String,
}

impl Default for RequestIdPolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestIdPolicy {
    pub fn new() -> Self {
        Self::with_header_name(CLIENT_REQUEST_ID_HEADER)
    }

    pub fn with_header_name(header_name: impl Into<String>) -> Self {
        Self {
            header_name: header_name.into(),
        }
    }

    pub fn header_name(&self) -> &str {
        &self.header_name
    }
}

#[async_trait]
impl HttpPipelinePolicy for RequestIdPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let request_id = match ctx.request().headers.get(&self.header_name) {
            Some(existing) => existing.to_string(),
            None => {
                let id = Uuid::new_v4().to_string();
                ctx.request_mut()
                    .headers
                    .set(self.header_name.as_str(), id.as_str());
                id
            }
        };
        ctx.set_data("request_id", request_id);
        next.process(ctx).await
    }

    fn name(&self) -> &'static str {
        "request-id"
    }
}

//! Header injection.

use async_trait::async_trait;

use crate::core::HttpResponse;
use crate::error::PipelineResult;
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

/// How a configured header combines with a value already on the request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum HeaderMode {
    /// Replace any existing value. Re-applying is idempotent.
    #[default]
    Overwrite,
    /// Append as an additional comma-separated value.
    Append,
}

/// Writes a fixed set of headers onto every request, then delegates.
#[derive(Debug, Clone)]
pub struct AddHeadersPolicy {
    headers: Vec<(String, String)>,
    mode: HeaderMode,
}

impl AddHeadersPolicy {
    pub fn new<I, K, V>(headers: I, mode: HeaderMode) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self {
            headers: headers
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
            mode,
        }
    }

    pub fn overwrite<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(headers, HeaderMode::Overwrite)
    }

    pub fn append<I, K, V>(headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        Self::new(headers, HeaderMode::Append)
    }

    pub fn mode(&self) -> HeaderMode {
        self.mode
    }
}

#[async_trait]
impl HttpPipelinePolicy for AddHeadersPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let headers = &mut ctx.request_mut().headers;
        for (name, value) in &self.headers {
            match self.mode {
                HeaderMode::Overwrite => headers.set(name.as_str(), value.as_str()),
                HeaderMode::Append => headers.add(name.as_str(), value.as_str()),
            };
        }
        next.process(ctx).await
    }

    fn name(&self) -> &'static str {
        "add-headers"
    }
}

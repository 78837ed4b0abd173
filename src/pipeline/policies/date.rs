//! Request date header.

use async_trait::async_trait;
use std::sync::Arc;

use crate::core::{Clock, HttpResponse, SystemClock};
use crate::error::PipelineResult;
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

pub const DATE_HEADER: &str = "x-ms-date";

/// RFC 1123 date, always in GMT.
const DATE_FORMAT: &str = "%a, %d %b %Y %H:%M:%S GMT";

/// Sets `x-ms-date` to the current time on every attempt.
pub struct AddDatePolicy {
    clock: Arc<dyn Clock>,
}

impl Default for AddDatePolicy {
    fn default() -> Self {
        Self::new()
    }
}

impl AddDatePolicy {
    pub fn new() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }

    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self { clock }
    }
}

#[async_trait]
impl HttpPipelinePolicy for AddDatePolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let date = self.clock.now().format(DATE_FORMAT).to_string();
        ctx.request_mut().headers.set(DATE_HEADER, date);
        next.process(ctx).await
    }

    fn name(&self) -> &'static str {
        "date"
    }
}

//! User-Agent telemetry.

use async_trait::async_trait;

use crate::core::HttpResponse;
use crate::error::PipelineResult;
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

const SDK_NAME: &str = "azsdk-rust-pipeline";

/// Sets `User-Agent` to `[{application_id} ]azsdk-rust-pipeline/{version} ({os}; {arch})`.
/// A caller-supplied value is kept after the generated one.
#[derive(Debug, Clone)]
pub struct UserAgentPolicy {
    user_agent: String,
}

impl Default for UserAgentPolicy {
    fn default() -> Self {
        Self::new(None)
    }
}

impl UserAgentPolicy {
    pub fn new(application_id: Option<&str>) -> Self {
        let sdk = format!(
            "{}/{} ({}; {})",
            SDK_NAME,
            env!("CARGO_PKG_VERSION"),
            std::env::consts::OS,
            std::env::consts::ARCH
        );
        let user_agent = match application_id {
            Some(app_id) if !app_id.is_empty() => format!("{} {}", app_id, sdk),
            _ => sdk,
        };
        Self { user_agent }
    }

    pub fn user_agent(&self) -> &str {
        &self.user_agent
    }
}

#[async_trait]
impl HttpPipelinePolicy for UserAgentPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let headers = &mut ctx.request_mut().headers;
        let value = match headers.get("user-agent") {
            Some(existing) => format!("{} {}", self.user_agent, existing),
            None => self.user_agent.clone(),
        };
        headers.set("User-Agent", value);
        next.process(ctx).await
    }

    fn name(&self) -> &'static str {
        "user-agent"
    }
}

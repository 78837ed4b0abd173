//! Pipeline Builder

use std::sync::Arc;
use tracing::debug;

use crate::auth::TokenCredential;
use crate::core::{Clock, HttpTransport, ReqwestHttpTransport, DEFAULT_TRANSPORT_TIMEOUT};
use crate::error::{ConfigurationError, PipelineResult};
use crate::pipeline::policies::{
    AddDatePolicy, AddHeadersPolicy, BearerTokenAuthenticationPolicy, HttpLoggingPolicy,
    RequestIdPolicy, RetryPolicy, UserAgentPolicy,
};
use crate::pipeline::{HttpPipeline, HttpPipelinePolicy, PipelineOptions};

/// Assembles an [`HttpPipeline`].
///
/// Without [`standard_policies`](Self::standard_policies) the pipeline is the
/// per-call policies followed by the per-retry policies, in the order added.
/// With it, the order is: request id, user agent, default headers, per-call
/// policies, retry, date, per-retry policies, bearer token, logging.
#[derive(Default)]
pub struct HttpPipelineBuilder {
    per_call: Vec<Arc<dyn HttpPipelinePolicy>>,
    per_retry: Vec<Arc<dyn HttpPipelinePolicy>>,
    options: Option<PipelineOptions>,
    credential: Option<(Arc<dyn TokenCredential>, Vec<String>)>,
    clock: Option<Arc<dyn Clock>>,
    transport: Option<Arc<dyn HttpTransport>>,
}

impl HttpPipelineBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a policy that runs on every attempt.
    pub fn policy(self, policy: impl HttpPipelinePolicy + 'static) -> Self {
        self.policy_arc(Arc::new(policy))
    }

    pub fn policy_arc(mut self, policy: Arc<dyn HttpPipelinePolicy>) -> Self {
        self.per_retry.push(policy);
        self
    }

    /// Add a policy that runs once per call, above the retry policy.
    pub fn per_call_policy(mut self, policy: impl HttpPipelinePolicy + 'static) -> Self {
        self.per_call.push(Arc::new(policy));
        self
    }

    /// Authenticate requests with bearer tokens for `scopes`.
    pub fn credential<I, S>(mut self, credential: Arc<dyn TokenCredential>, scopes: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.credential = Some((credential, scopes.into_iter().map(Into::into).collect()));
        self
    }

    /// Clock for the date policy.
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Install the standard policy set configured by `options`.
    pub fn standard_policies(mut self, options: PipelineOptions) -> Self {
        self.options = Some(options);
        self
    }

    pub fn transport(self, transport: impl HttpTransport + 'static) -> Self {
        self.transport_arc(Arc::new(transport))
    }

    pub fn transport_arc(mut self, transport: Arc<dyn HttpTransport>) -> Self {
        self.transport = Some(transport);
        self
    }

    /// Use a [`ReqwestHttpTransport`] with the configured transport timeout.
    pub fn default_transport(self) -> PipelineResult<Self> {
        let timeout = self
            .options
            .as_ref()
            .map(|o| o.transport_timeout)
            .unwrap_or(DEFAULT_TRANSPORT_TIMEOUT);
        Ok(self.transport(ReqwestHttpTransport::with_timeout(timeout)?))
    }

    pub fn build(self) -> PipelineResult<HttpPipeline> {
        let transport = self.transport.ok_or_else(|| ConfigurationError::MissingField {
            field: "transport".to_string(),
        })?;

        let bearer = self.credential.map(|(credential, scopes)| {
            Arc::new(BearerTokenAuthenticationPolicy::new(credential, scopes))
                as Arc<dyn HttpPipelinePolicy>
        });

        let policies: Vec<Arc<dyn HttpPipelinePolicy>> = match self.options {
            None => self
                .per_call
                .into_iter()
                .chain(self.per_retry)
                .chain(bearer)
                .collect(),
            Some(options) => {
                options.validate()?;

                let mut policies: Vec<Arc<dyn HttpPipelinePolicy>> = vec![
                    Arc::new(RequestIdPolicy::with_header_name(
                        options.request_id_header.clone(),
                    )),
                    Arc::new(UserAgentPolicy::new(options.application_id.as_deref())),
                ];
                if !options.default_headers.is_empty() {
                    policies.push(Arc::new(AddHeadersPolicy::overwrite(
                        options.default_headers.clone(),
                    )));
                }
                policies.extend(self.per_call);
                policies.push(Arc::new(RetryPolicy::new(options.retry.clone())));
                policies.push(Arc::new(match self.clock {
                    Some(clock) => AddDatePolicy::with_clock(clock),
                    None => AddDatePolicy::new(),
                }));
                policies.extend(self.per_retry);
                policies.extend(bearer);
                policies.push(Arc::new(HttpLoggingPolicy::new(options.logging.clone())));
                policies
            }
        };

        let pipeline = HttpPipeline::new(policies, transport);
        debug!(policies = ?pipeline.policy_names(), "built pipeline");
        Ok(pipeline)
    }
}

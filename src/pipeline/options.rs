//! Pipeline Options
//!
//! Settings for the standard policy set, with a fluent builder and
//! environment overrides.

use std::time::Duration;
use tracing::Level;

use crate::auth::{BridgedTokenCredential, TokenRequestBridge, DEFAULT_TOKEN_WAIT_TIMEOUT};
use crate::core::DEFAULT_TRANSPORT_TIMEOUT;
use crate::error::{ConfigurationError, PipelineResult};
use crate::pipeline::policies::{LoggingConfig, CLIENT_REQUEST_ID_HEADER};
use crate::resilience::RetryConfig;

/// Longest accepted application id.
pub const MAX_APPLICATION_ID_LENGTH: usize = 24;

/// Options for [`HttpPipelineBuilder::standard_policies`](crate::pipeline::HttpPipelineBuilder::standard_policies).
#[derive(Debug, Clone)]
pub struct PipelineOptions {
    /// Prefix for the `User-Agent` header.
    pub application_id: Option<String>,
    pub retry: RetryConfig,
    pub logging: LoggingConfig,
    /// Default timeout for the reqwest transport.
    pub transport_timeout: Duration,
    /// How long a bridged credential waits for a token.
    pub token_timeout: Duration,
    /// Header carrying the client request id.
    pub request_id_header: String,
    /// Headers added to every request.
    pub default_headers: Vec<(String, String)>,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            application_id: None,
            retry: RetryConfig::default(),
            logging: LoggingConfig::default(),
            transport_timeout: DEFAULT_TRANSPORT_TIMEOUT,
            token_timeout: DEFAULT_TOKEN_WAIT_TIMEOUT,
            request_id_header: CLIENT_REQUEST_ID_HEADER.to_string(),
            default_headers: Vec::new(),
        }
    }
}

impl PipelineOptions {
    pub fn builder() -> PipelineOptionsBuilder {
        PipelineOptionsBuilder::new()
    }

    /// Defaults overridden by `AZURE_PIPELINE_*` environment variables.
    pub fn from_env() -> PipelineResult<Self> {
        PipelineOptionsBuilder::new().from_env().build()
    }

    pub fn validate(&self) -> PipelineResult<()> {
        if let Some(app_id) = &self.application_id {
            if app_id.len() > MAX_APPLICATION_ID_LENGTH {
                return Err(ConfigurationError::InvalidValue {
                    field: "application_id".to_string(),
                    message: format!("must be at most {} characters", MAX_APPLICATION_ID_LENGTH),
                }
                .into());
            }
            if app_id.chars().any(char::is_whitespace) {
                return Err(ConfigurationError::InvalidValue {
                    field: "application_id".to_string(),
                    message: "must not contain whitespace".to_string(),
                }
                .into());
            }
        }

        if self.transport_timeout.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                field: "transport_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.token_timeout.is_zero() {
            return Err(ConfigurationError::InvalidValue {
                field: "token_timeout".to_string(),
                message: "must be greater than zero".to_string(),
            }
            .into());
        }

        if self.request_id_header.trim().is_empty() {
            return Err(ConfigurationError::MissingField {
                field: "request_id_header".to_string(),
            }
            .into());
        }

        self.retry.validate()
    }

    /// A bridged credential using this configuration's token timeout.
    pub fn bridged_credential(&self, bridge: TokenRequestBridge) -> BridgedTokenCredential {
        BridgedTokenCredential::new(bridge).with_timeout(self.token_timeout)
    }
}

/// Fluent builder for [`PipelineOptions`].
#[derive(Debug, Default)]
pub struct PipelineOptionsBuilder {
    application_id: Option<String>,
    retry: Option<RetryConfig>,
    max_retries: Option<u32>,
    log_level: Option<Level>,
    log_headers: Option<bool>,
    transport_timeout: Option<Duration>,
    token_timeout: Option<Duration>,
    request_id_header: Option<String>,
    default_headers: Vec<(String, String)>,
}

impl PipelineOptionsBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn application_id(mut self, application_id: impl Into<String>) -> Self {
        self.application_id = Some(application_id.into());
        self
    }

    /// Replace the whole retry configuration.
    pub fn retry(mut self, retry: RetryConfig) -> Self {
        self.retry = Some(retry);
        self
    }

    pub fn max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = Some(max_retries);
        self
    }

    pub fn log_level(mut self, level: Level) -> Self {
        self.log_level = Some(level);
        self
    }

    pub fn log_headers(mut self, enabled: bool) -> Self {
        self.log_headers = Some(enabled);
        self
    }

    pub fn transport_timeout(mut self, timeout: Duration) -> Self {
        self.transport_timeout = Some(timeout);
        self
    }

    pub fn token_timeout(mut self, timeout: Duration) -> Self {
        self.token_timeout = Some(timeout);
        self
    }

    pub fn request_id_header(mut self, name: impl Into<String>) -> Self {
        self.request_id_header = Some(name.into());
        self
    }

    pub fn default_header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.default_headers.push((name.into(), value.into()));
        self
    }

    /// Load settings from environment variables.
    pub fn from_env(self) -> Self {
        self.from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup(mut self, lookup: impl Fn(&str) -> Option<String>) -> Self {
        if let Some(val) = lookup("AZURE_PIPELINE_MAX_RETRIES") {
            if let Ok(retries) = val.parse() {
                self.max_retries = Some(retries);
            }
        }
        if let Some(val) = lookup("AZURE_PIPELINE_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.transport_timeout = Some(Duration::from_millis(ms));
            }
        }
        if let Some(val) = lookup("AZURE_PIPELINE_TOKEN_TIMEOUT_MS") {
            if let Ok(ms) = val.parse() {
                self.token_timeout = Some(Duration::from_millis(ms));
            }
        }
        if let Some(val) = lookup("AZURE_PIPELINE_APPLICATION_ID") {
            self.application_id = Some(val);
        }
        if let Some(val) = lookup("AZURE_PIPELINE_LOG_LEVEL") {
            if let Ok(level) = val.parse() {
                self.log_level = Some(level);
            }
        }
        self
    }

    pub fn build(self) -> PipelineResult<PipelineOptions> {
        let defaults = PipelineOptions::default();

        let mut retry = self.retry.unwrap_or(defaults.retry);
        if let Some(max_retries) = self.max_retries {
            retry.max_retries = max_retries;
        }

        let options = PipelineOptions {
            application_id: self.application_id,
            retry,
            logging: LoggingConfig {
                level: self.log_level.unwrap_or(defaults.logging.level),
                log_headers: self.log_headers.unwrap_or(defaults.logging.log_headers),
            },
            transport_timeout: self.transport_timeout.unwrap_or(defaults.transport_timeout),
            token_timeout: self.token_timeout.unwrap_or(defaults.token_timeout),
            request_id_header: self
                .request_id_header
                .unwrap_or(defaults.request_id_header),
            default_headers: self.default_headers,
        };

        options.validate()?;
        Ok(options)
    }
}

//! Request/response logging with sensitive data redaction.

use async_trait::async_trait;
use std::time::Instant;
use tracing::Level;
use url::Url;

use crate::core::{HttpHeaders, HttpResponse};
use crate::error::PipelineResult;
use crate::pipeline::{HttpPipelinePolicy, NextPolicy, PipelineContext};

const REDACTED: &str = "[REDACTED]";

/// Headers whose values are never logged.
const SENSITIVE_HEADERS: &[&str] = &[
    "authorization",
    "proxy-authorization",
    "cookie",
    "set-cookie",
    "x-ms-authorization-auxiliary",
    "ocp-apim-subscription-key",
];

/// Query parameters whose values are never logged.
const SENSITIVE_QUERY_PARAMS: &[&str] =
    &["sig", "token", "key", "secret", "password", "api_key", "code"];

/// Logging configuration.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for request and response events.
    pub level: Level,
    /// Include (redacted) headers.
    pub log_headers: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: Level::DEBUG,
            log_headers: true,
        }
    }
}

macro_rules! event_at {
    ($level:expr, $($arg:tt)+) => {{
        let level: Level = $level;
        if level == Level::ERROR {
            tracing::error!($($arg)+)
        } else if level == Level::WARN {
            tracing::warn!($($arg)+)
        } else if level == Level::INFO {
            tracing::info!($($arg)+)
        } else if level == Level::DEBUG {
            tracing::debug!($($arg)+)
        } else {
            tracing::trace!($($arg)+)
        }
    }};
}

/// Redact a URL, hiding sensitive query parameter values.
pub fn redact_url(url: &Url) -> String {
    if url.query().is_none() {
        return url.to_string();
    }

    let mut redacted = url.clone();
    let pairs: Vec<(String, String)> = url
        .query_pairs()
        .map(|(k, v)| {
            let value = if is_sensitive(SENSITIVE_QUERY_PARAMS, &k) {
                REDACTED.to_string()
            } else {
                v.into_owned()
            };
            (k.into_owned(), value)
        })
        .collect();
    redacted.query_pairs_mut().clear().extend_pairs(pairs);
    redacted.to_string()
}

/// Render headers as `name: value` pairs, hiding sensitive values.
pub fn redact_headers(headers: &HttpHeaders) -> String {
    let mut rendered: Vec<String> = headers
        .iter()
        .map(|(name, value)| {
            if is_sensitive(SENSITIVE_HEADERS, name) {
                format!("{}: {}", name, REDACTED)
            } else {
                format!("{}: {}", name, value)
            }
        })
        .collect();
    rendered.sort();
    rendered.join("; ")
}

fn is_sensitive(list: &[&str], name: &str) -> bool {
    list.iter().any(|s| name.eq_ignore_ascii_case(s))
}

/// Logs each request as it leaves and each response or error as it returns.
#[derive(Debug, Clone, Default)]
pub struct HttpLoggingPolicy {
    config: LoggingConfig,
}

impl HttpLoggingPolicy {
    pub fn new(config: LoggingConfig) -> Self {
        Self { config }
    }
}

#[async_trait]
impl HttpPipelinePolicy for HttpLoggingPolicy {
    async fn process(
        &self,
        ctx: &mut PipelineContext,
        next: &mut NextPolicy,
    ) -> PipelineResult<HttpResponse> {
        let level = self.config.level;
        let method = ctx.request().method;
        let url = redact_url(&ctx.request().url);
        let headers = if self.config.log_headers {
            redact_headers(&ctx.request().headers)
        } else {
            String::new()
        };

        event_at!(level, %method, url = %url, headers = %headers, "http request");

        let started = Instant::now();
        let result = next.process(ctx).await;
        let elapsed_ms = started.elapsed().as_millis() as u64;

        match &result {
            Ok(response) => {
                let headers = if self.config.log_headers {
                    redact_headers(response.headers())
                } else {
                    String::new()
                };
                event_at!(
                    level,
                    %method,
                    url = %url,
                    status = response.status(),
                    elapsed_ms,
                    headers = %headers,
                    "http response"
                );
            }
            Err(e) => {
                event_at!(
                    level,
                    %method,
                    url = %url,
                    elapsed_ms,
                    error = %e,
                    error_code = e.error_code(),
                    "http request failed"
                );
            }
        }

        result
    }

    fn name(&self) -> &'static str {
        "logging"
    }
}

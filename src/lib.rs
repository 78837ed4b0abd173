//! Azure HTTP Pipeline Core
//!
//! The request pipeline shared by Azure service clients: an ordered chain of
//! policies in front of an HTTP transport, bearer-token authentication fed by
//! a cross-thread token bridge, and memoized paging over list operations.
//!
//! # Features
//!
//! - Policy chain with a per-call cursor (short-circuit, retry, exhaustion checks)
//! - Standard policies: request id, user agent, headers, retry, date, bearer token, logging
//! - Token bridge between worker threads and a privileged (interactive) context
//! - Blocking and async paged collections with back-linked, cached pages
//! - Cancellation of in-flight requests and page fetches
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use azure_pipeline::{
//!     HttpMethod, HttpPipeline, HttpRequest, InteractiveTokenObserver, PipelineOptions,
//!     ReqwestHttpTransport, TokenCompletion, TokenRequestBridge,
//! };
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let options = PipelineOptions::builder()
//!         .application_id("inventory")
//!         .max_retries(5)
//!         .build()?;
//!
//!     // The privileged side answers token requests, e.g. by showing a login.
//!     let bridge = TokenRequestBridge::new();
//!     let _subscription = bridge.subscribe(Arc::new(InteractiveTokenObserver::new(
//!         |scopes: Vec<String>, completion: TokenCompletion| {
//!             show_login(scopes, completion);
//!         },
//!     )));
//!
//!     let pipeline = HttpPipeline::builder()
//!         .standard_policies(options.clone())
//!         .credential(
//!             Arc::new(options.bridged_credential(bridge)),
//!             ["https://management.azure.com/.default"],
//!         )
//!         .transport(ReqwestHttpTransport::new()?)
//!         .build()?;
//!
//!     let request = HttpRequest::parse(
//!         HttpMethod::Get,
//!         "https://management.azure.com/subscriptions?api-version=2022-12-01",
//!     )?;
//!     let mut response = pipeline.send(request).await?;
//!     println!("{}", response.text().await?);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Architecture
//!
//! - `error`: Error hierarchy
//! - `core`: HTTP model, transport, serializer and clock
//! - `pipeline`: Pipeline, cursor, builder, options and policies
//! - `auth`: Access tokens, credentials and the token bridge
//! - `paging`: Pages and paged collections
//! - `resilience`: Retry configuration

pub mod auth;
pub mod core;
pub mod error;
pub mod paging;
pub mod pipeline;
pub mod resilience;

// Re-export errors
pub use error::{
    ConfigurationError, PagingError, PipelineError, PipelineResult, SerializationError,
    TokenError, TransportError,
};

// Re-export core components
pub use crate::core::{
    // Clock
    Clock, ManualClock, SystemClock,
    // HTTP model
    BodyStream, HttpHeader, HttpHeaders, HttpMethod, HttpRequest, HttpResponse, ResponseBody,
    // Serializer
    JsonSerializer, Serializer,
    // Transport
    HttpTransport, MockHttpTransport, MockResponse, ReqwestHttpTransport,
    DEFAULT_TRANSPORT_TIMEOUT,
};

// Re-export pipeline
pub use pipeline::{
    AddDatePolicy, AddHeadersPolicy, BearerTokenAuthenticationPolicy, HeaderMode,
    HttpLoggingPolicy, HttpPipeline, HttpPipelineBuilder, HttpPipelinePolicy, LoggingConfig,
    NextPolicy, PipelineContext, PipelineOptions, PipelineOptionsBuilder, RequestIdPolicy,
    RetryPolicy, UserAgentPolicy, CLIENT_REQUEST_ID_HEADER, DATE_HEADER,
};

// Re-export auth
pub use auth::{
    AccessToken, BridgedTokenCredential, InteractiveCredentialProvider, InteractiveTokenObserver,
    MockTokenCredential, StaticTokenCredential, TokenCompletion, TokenCredential,
    TokenRequestBridge, TokenRequestHandle, TokenRequestObserver, TokenRequestSubscription,
    DEFAULT_TOKEN_WAIT_TIMEOUT,
};

// Re-export paging
pub use paging::{
    AsyncPagedCollection, NextLinkPageSource, Page, PageFetcher, PageSource, PageVisit,
    PagedCollection, FIRST_PAGE_KEY,
};

// Re-export resilience
pub use resilience::{RetryConfig, DEFAULT_RETRY_STATUS_CODES};

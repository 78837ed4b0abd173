//! Pipeline Policies

pub mod bearer_token;
pub mod date;
pub mod headers;
pub mod logging;
pub mod request_id;
pub mod retry;
pub mod user_agent;

pub use bearer_token::BearerTokenAuthenticationPolicy;
pub use date::{AddDatePolicy, DATE_HEADER};
pub use headers::{AddHeadersPolicy, HeaderMode};
pub use logging::{redact_headers, redact_url, HttpLoggingPolicy, LoggingConfig};
pub use request_id::{RequestIdPolicy, CLIENT_REQUEST_ID_HEADER};
pub use retry::RetryPolicy;
pub use user_agent::UserAgentPolicy;

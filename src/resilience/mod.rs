//! Resilience
//!
//! Retry configuration consumed by [`crate::pipeline::RetryPolicy`].

pub mod retry;

pub use retry::{RetryConfig, DEFAULT_RETRY_STATUS_CODES};

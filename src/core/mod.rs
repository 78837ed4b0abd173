//! Core Components
//!
//! HTTP model, transport, serializer and clock shared by the rest of the crate.

pub mod clock;
pub mod http;
pub mod serializer;
pub mod transport;

pub use clock::*;
pub use http::*;
pub use serializer::*;
pub use transport::*;

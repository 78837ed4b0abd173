//! Authentication
//!
//! Access tokens, credentials, and the bridge that lets worker threads ask a
//! privileged context for a token.

pub mod bridge;
pub mod bridged;
pub mod credential;
pub mod token;

pub use bridge::{
    InteractiveCredentialProvider, InteractiveTokenObserver, TokenCompletion,
    TokenRequestBridge, TokenRequestHandle, TokenRequestObserver, TokenRequestSubscription,
};
pub use bridged::{BridgedTokenCredential, DEFAULT_TOKEN_WAIT_TIMEOUT};
pub use credential::{MockTokenCredential, StaticTokenCredential, TokenCredential};
pub use token::AccessToken;

//! Token Credentials

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::VecDeque;

use crate::auth::AccessToken;
use crate::error::{PipelineResult, TokenError};

/// Source of bearer tokens for a set of scopes.
#[async_trait]
pub trait TokenCredential: Send + Sync {
    async fn get_token(&self, scopes: &[String]) -> PipelineResult<AccessToken>;
}

/// Credential that always returns the same token.
#[derive(Clone, Debug)]
pub struct StaticTokenCredential {
    token: AccessToken,
}

impl StaticTokenCredential {
    pub fn new(token: AccessToken) -> Self {
        Self { token }
    }
}

#[async_trait]
impl TokenCredential for StaticTokenCredential {
    async fn get_token(&self, _scopes: &[String]) -> PipelineResult<AccessToken> {
        Ok(self.token.clone())
    }
}

/// Mock credential for testing. Queued outcomes are returned first, then the
/// default token if one is set.
#[derive(Default)]
pub struct MockTokenCredential {
    outcomes: Mutex<VecDeque<Result<AccessToken, TokenError>>>,
    default_token: Mutex<Option<AccessToken>>,
    history: Mutex<Vec<Vec<String>>>,
}

impl MockTokenCredential {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_token(&self, token: AccessToken) -> &Self {
        self.outcomes.lock().push_back(Ok(token));
        self
    }

    pub fn queue_error(&self, error: TokenError) -> &Self {
        self.outcomes.lock().push_back(Err(error));
        self
    }

    pub fn set_default_token(&self, token: AccessToken) -> &Self {
        *self.default_token.lock() = Some(token);
        self
    }

    /// Scopes of every call, oldest first.
    pub fn get_history(&self) -> Vec<Vec<String>> {
        self.history.lock().clone()
    }

    pub fn call_count(&self) -> usize {
        self.history.lock().len()
    }
}

#[async_trait]
impl TokenCredential for MockTokenCredential {
    async fn get_token(&self, scopes: &[String]) -> PipelineResult<AccessToken> {
        self.history.lock().push(scopes.to_vec());

        let outcome = self
            .outcomes
            .lock()
            .pop_front()
            .or_else(|| self.default_token.lock().clone().map(Ok));

        match outcome {
            Some(outcome) => outcome.map_err(Into::into),
            None => Err(TokenError::AcquisitionFailed {
                message: "No mock token available".to_string(),
            }
            .into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PipelineError;

    #[tokio::test]
    async fn test_static_credential() {
        let credential = StaticTokenCredential::new(AccessToken::non_expiring("abc"));
        let token = credential.get_token(&["scope".to_string()]).await.unwrap();
        assert_eq!(token.secret(), "abc");
    }

    #[tokio::test]
    async fn test_mock_credential_order() {
        let credential = MockTokenCredential::new();
        credential
            .queue_error(TokenError::AcquisitionFailed {
                message: "denied".to_string(),
            })
            .set_default_token(AccessToken::non_expiring("fallback"));

        let scopes = vec!["https://storage.azure.com/.default".to_string()];
        assert!(matches!(
            credential.get_token(&scopes).await,
            Err(PipelineError::Token(TokenError::AcquisitionFailed { .. }))
        ));
        assert_eq!(credential.get_token(&scopes).await.unwrap().secret(), "fallback");
        assert_eq!(credential.call_count(), 2);
        assert_eq!(credential.get_history()[0], scopes);
    }
}

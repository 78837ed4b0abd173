//! Access Token

use chrono::{DateTime, Utc};
use secrecy::{ExposeSecret, SecretString};

/// Bearer token with an optional expiry.
#[derive(Clone)]
pub struct AccessToken {
    /// Token value (secret).
    token: SecretString,
    /// Expiration time. `None` never expires.
    expires_on: Option<DateTime<Utc>>,
}

impl AccessToken {
    pub fn new(token: impl Into<String>, expires_on: DateTime<Utc>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_on: Some(expires_on),
        }
    }

    pub fn non_expiring(token: impl Into<String>) -> Self {
        Self {
            token: SecretString::new(token.into()),
            expires_on: None,
        }
    }

    /// Get token value (for Authorization header).
    pub fn secret(&self) -> &str {
        self.token.expose_secret()
    }

    pub fn expires_on(&self) -> Option<DateTime<Utc>> {
        self.expires_on
    }

    /// Check expiry against `now`, usually from an injected clock.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        self.expires_on.map(|exp| exp <= now).unwrap_or(false)
    }
}

impl std::fmt::Debug for AccessToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AccessToken")
            .field("token", &"[REDACTED]")
            .field("expires_on", &self.expires_on)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn test_expiry() {
        let now = Utc::now();
        let token = AccessToken::new("abc", now + Duration::minutes(5));
        assert!(!token.is_expired_at(now));
        assert!(token.is_expired_at(now + Duration::minutes(5)));
        assert!(!AccessToken::non_expiring("abc").is_expired_at(now + Duration::days(365)));
    }

    #[test]
    fn test_debug_redacts_secret() {
        let token = AccessToken::non_expiring("super-secret-value");
        let debug = format!("{:?}", token);
        assert!(!debug.contains("super-secret-value"));
        assert!(debug.contains("[REDACTED]"));
        assert_eq!(token.secret(), "super-secret-value");
    }
}

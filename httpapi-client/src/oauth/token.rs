use std::time::{Duration, Instant};

use httpapi_core::ApiError;
use serde::{Deserialize, Serialize};

/// Upper bound of how long before its stated expiry a token counts as expired.
///
/// The actual skew is this or half of the token's lifetime, whichever is
/// smaller.
pub const EXPIRY_SKEW: Duration = Duration::from_secs(60);

/// A credential record returned by a token endpoint.
///
/// Immutable once obtained; a refresh replaces it wholesale.
#[derive(Clone, Debug)]
pub struct TokenResult {
    pub access_token: Option<String>,
    pub token_type: String,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
    issued_at: Instant,
    expires_at: Instant,
}

impl TokenResult {
    /// A successful bearer token valid for `expires_in` from now.
    pub fn new(access_token: impl Into<String>, expires_in: Duration) -> Self {
        let issued_at = Instant::now();
        Self {
            access_token: Some(access_token.into()),
            token_type: "Bearer".to_string(),
            refresh_token: None,
            scope: None,
            error: None,
            error_description: None,
            issued_at,
            expires_at: issued_at + expires_in,
        }
    }

    /// A failed result carrying the endpoint's error code.
    pub fn failure(error: impl Into<String>, description: Option<String>) -> Self {
        let issued_at = Instant::now();
        Self {
            access_token: None,
            token_type: "Bearer".to_string(),
            refresh_token: None,
            scope: None,
            error: Some(error.into()),
            error_description: description,
            issued_at,
            expires_at: issued_at,
        }
    }

    pub fn with_refresh_token(mut self, refresh_token: impl Into<String>) -> Self {
        self.refresh_token = Some(refresh_token.into());
        self
    }

    pub fn with_token_type(mut self, token_type: impl Into<String>) -> Self {
        self.token_type = token_type.into();
        self
    }

    pub fn expires_at(&self) -> Instant {
        self.expires_at
    }

    /// `true` when the record carries an access token and no error.
    pub fn is_success(&self) -> bool {
        self.error.is_none() && self.access_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    pub fn ensure_success(&self) -> Result<(), ApiError> {
        if self.is_success() {
            return Ok(());
        }
        let message = match (&self.error, &self.error_description) {
            (Some(error), Some(description)) => format!("{}: {}", error, description),
            (Some(error), None) => error.clone(),
            (None, _) => "the token endpoint returned no access token".to_string(),
        };
        Err(ApiError::token_acquisition(message))
    }

    pub fn is_expired(&self) -> bool {
        self.is_expired_at(Instant::now())
    }

    pub fn is_expired_at(&self, now: Instant) -> bool {
        let lifetime = self.expires_at.saturating_duration_since(self.issued_at);
        let skew = EXPIRY_SKEW.min(lifetime / 2);
        now + skew >= self.expires_at
    }

    pub fn can_refresh(&self) -> bool {
        self.refresh_token.as_deref().is_some_and(|token| !token.is_empty())
    }

    /// The `Authorization` header value, `<token_type> <access_token>`.
    pub fn authorization(&self) -> String {
        format!(
            "{} {}",
            self.token_type,
            self.access_token.as_deref().unwrap_or_default()
        )
    }
}

/// The JSON body of a token endpoint response.
///
/// A missing `expires_in` means the token expires immediately.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: Option<String>,
    pub token_type: Option<String>,
    pub expires_in: Option<u64>,
    pub refresh_token: Option<String>,
    pub scope: Option<String>,
    pub error: Option<String>,
    pub error_description: Option<String>,
}

impl TokenResponse {
    pub fn into_result(self, issued_at: Instant) -> TokenResult {
        let expires_in = Duration::from_secs(self.expires_in.unwrap_or(0));
        TokenResult {
            access_token: self.access_token,
            token_type: self
                .token_type
                .filter(|kind| !kind.is_empty())
                .unwrap_or_else(|| "Bearer".to_string()),
            refresh_token: self.refresh_token,
            scope: self.scope,
            error: self.error,
            error_description: self.error_description,
            issued_at,
            expires_at: issued_at + expires_in,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_expiry_skew() {
        let token = TokenResult::new("abc", Duration::from_secs(3600));
        let issued = token.expires_at() - Duration::from_secs(3600);
        assert!(!token.is_expired_at(issued));
        assert!(!token.is_expired_at(issued + Duration::from_secs(3539)));
        assert!(token.is_expired_at(issued + Duration::from_secs(3540)));

        // Short lifetimes use half of the lifetime as skew.
        let short = TokenResult::new("abc", Duration::from_secs(10));
        let issued = short.expires_at() - Duration::from_secs(10);
        assert!(!short.is_expired_at(issued + Duration::from_secs(4)));
        assert!(short.is_expired_at(issued + Duration::from_secs(5)));

        assert!(TokenResult::new("abc", Duration::ZERO).is_expired());
    }

    #[test]
    fn test_success_and_refresh() {
        let token = TokenResult::new("abc", Duration::from_secs(60)).with_refresh_token("r1");
        assert!(token.is_success());
        assert!(token.can_refresh());
        assert_eq!(token.authorization(), "Bearer abc");

        let failed = TokenResult::failure("invalid_client", Some("bad secret".into()));
        assert!(!failed.is_success());
        let err = failed.ensure_success().unwrap_err();
        assert!(err.is_token_acquisition());
        assert!(err.to_string().contains("invalid_client: bad secret"));
    }

    #[test]
    fn test_response_conversion() {
        let response: TokenResponse = serde_json::from_str(
            r#"{"access_token":"abc","token_type":"mac","expires_in":7200,"refresh_token":"r1"}"#,
        )
        .unwrap();
        let now = Instant::now();
        let token = response.into_result(now);
        assert_eq!(token.authorization(), "mac abc");
        assert_eq!(token.expires_at(), now + Duration::from_secs(7200));
        assert!(token.can_refresh());

        let empty = TokenResponse::default().into_result(now);
        assert!(!empty.is_success());
        assert!(empty.is_expired_at(now));
    }
}

//! Signed bearer tokens: short-lived access tokens and longer-lived
//! refresh tokens, both HS256 JWTs carrying the subject and a type tag.

use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use ulid::Ulid;

use crate::auth::config::AuthConfig;
use crate::auth::error::AuthError;

pub const TOKEN_TYPE_ACCESS: &str = "access";
pub const TOKEN_TYPE_REFRESH: &str = "refresh";

/// Claims embedded in every issued token.
///
/// `sub` holds the numeric user id as a string. The issuer never
/// checks `token_type` on decode; each flow asserts the tag it needs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    #[serde(rename = "type")]
    pub token_type: String,
    pub iat: i64,
    pub exp: i64,
    pub jti: String,
}

/// Issues and decodes tokens with a process-wide signing key loaded
/// once at startup.
#[derive(Clone)]
pub struct TokenIssuer {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    access_ttl: Duration,
    refresh_ttl: Duration,
}

impl TokenIssuer {
    #[must_use]
    pub fn new(config: &AuthConfig) -> Self {
        let secret = config.jwt_secret().expose_secret().as_bytes();
        Self {
            encoding_key: EncodingKey::from_secret(secret),
            decoding_key: DecodingKey::from_secret(secret),
            access_ttl: Duration::minutes(config.access_token_ttl_minutes()),
            refresh_ttl: Duration::days(config.refresh_token_ttl_days()),
        }
    }

    /// Sign a short-lived access token for `subject`.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue_access(&self, subject: i64) -> Result<String, AuthError> {
        self.issue(subject, TOKEN_TYPE_ACCESS, self.access_ttl)
    }

    /// Sign a refresh token for `subject`.
    ///
    /// # Errors
    /// Returns [`AuthError::Internal`] if signing fails.
    pub fn issue_refresh(&self, subject: i64) -> Result<String, AuthError> {
        self.issue(subject, TOKEN_TYPE_REFRESH, self.refresh_ttl)
    }

    fn issue(&self, subject: i64, token_type: &str, ttl: Duration) -> Result<String, AuthError> {
        let now = Utc::now();
        let claims = Claims {
            sub: subject.to_string(),
            token_type: token_type.to_string(),
            iat: now.timestamp(),
            exp: (now + ttl).timestamp(),
            // Unique per token so two issuances for the same subject in
            // the same second still produce distinct strings.
            jti: Ulid::new().to_string(),
        };
        encode(&Header::default(), &claims, &self.encoding_key)
            .map_err(|e| AuthError::Internal(anyhow::anyhow!("token signing failed: {e}")))
    }

    /// Decode and verify a token: signature, well-formedness, expiry.
    ///
    /// # Errors
    /// Returns [`AuthError::InvalidToken`] for malformed, unsigned, or
    /// expired input.
    pub fn decode(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.leeway = 0;
        decode::<Claims>(token, &self.decoding_key, &validation)
            .map(|data| data.claims)
            .map_err(|_| AuthError::InvalidToken("Invalid or expired token".to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use secrecy::SecretString;

    fn issuer() -> TokenIssuer {
        let config = AuthConfig::new(SecretString::from("a-signing-secret".to_string()));
        TokenIssuer::new(&config)
    }

    #[test]
    fn access_token_round_trips() {
        let issuer = issuer();
        let token = issuer.issue_access(42).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.sub, "42");
        assert_eq!(claims.token_type, TOKEN_TYPE_ACCESS);
        assert!(claims.exp > claims.iat);
    }

    #[test]
    fn refresh_token_carries_refresh_type() {
        let issuer = issuer();
        let token = issuer.issue_refresh(7).unwrap();
        let claims = issuer.decode(&token).unwrap();
        assert_eq!(claims.token_type, TOKEN_TYPE_REFRESH);
    }

    #[test]
    fn tokens_for_same_subject_are_distinct() {
        let issuer = issuer();
        let first = issuer.issue_refresh(7).unwrap();
        let second = issuer.issue_refresh(7).unwrap();
        assert_ne!(first, second);
    }

    #[test]
    fn garbage_is_rejected() {
        let err = issuer().decode("not-a-token").unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }

    #[test]
    fn wrong_secret_is_rejected() {
        let other = TokenIssuer::new(&AuthConfig::new(SecretString::from(
            "another-secret".to_string(),
        )));
        let token = issuer().issue_access(1).unwrap();
        assert!(other.decode(&token).is_err());
    }

    #[test]
    fn expired_token_is_rejected() {
        let config = AuthConfig::new(SecretString::from("a-signing-secret".to_string()))
            .with_access_token_ttl_minutes(-5);
        let issuer = TokenIssuer::new(&config);
        let token = issuer.issue_access(1).unwrap();
        let err = issuer.decode(&token).unwrap_err();
        assert!(matches!(err, AuthError::InvalidToken(_)));
    }
}

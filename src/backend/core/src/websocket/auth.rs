//! WebSocket authentication module.
//!
//! Verifies a bearer JWT presented on the fan-out connection (query string or
//! `Authorization` header) and extracts the tenant it belongs to. There is no
//! token issuance, refresh, or revocation here: tokens are minted by the API
//! layer and this module only has to validate them.

use chrono::{DateTime, Utc};
use jsonwebtoken::{decode, DecodingKey, Validation};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Authentication errors.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Token has expired")]
    Expired,
    #[error("Invalid token: {0}")]
    Invalid(String),
    #[error("Missing required claims")]
    MissingClaims,
}

/// JWT claims for WebSocket authentication.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    pub sub: String,
    /// Expiration time
    pub exp: DateTime<Utc>,
    /// Issued at
    pub iat: DateTime<Utc>,
    /// JWT ID (unique token identifier)
    pub jti: String,
    /// Issuer
    pub iss: String,
    /// Audience
    pub aud: String,
    /// Organization ID (the tenant the connection should be routed under)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub org_id: Option<String>,
}

impl Claims {
    /// Check if the token has expired.
    pub fn is_expired(&self) -> bool {
        Utc::now() > self.exp
    }
}

/// Internal claims structure for JWT decoding.
#[derive(Debug, Serialize, Deserialize)]
struct JwtClaims {
    sub: String,
    exp: i64,
    iat: i64,
    jti: String,
    iss: String,
    aud: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    org_id: Option<String>,
}

impl TryFrom<JwtClaims> for Claims {
    type Error = AuthError;

    fn try_from(jwt: JwtClaims) -> Result<Self, Self::Error> {
        Ok(Self {
            sub: jwt.sub,
            exp: DateTime::from_timestamp(jwt.exp, 0)
                .ok_or(AuthError::Invalid("Invalid expiration timestamp".to_string()))?,
            iat: DateTime::from_timestamp(jwt.iat, 0)
                .ok_or(AuthError::Invalid("Invalid issued at timestamp".to_string()))?,
            jti: jwt.jti,
            iss: jwt.iss,
            aud: jwt.aud,
            org_id: jwt.org_id,
        })
    }
}

/// WebSocket authentication handler.
pub struct WebSocketAuth {
    /// Secret key for verifying tokens
    decoding_key: DecodingKey,
    /// Issuer name
    issuer: String,
    /// Audience name
    audience: String,
}

impl WebSocketAuth {
    /// Create a new authentication handler.
    pub fn new(secret: String, _token_expiration_secs: u64) -> Self {
        Self {
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            issuer: "aiseo".to_string(),
            audience: "aiseo-websocket".to_string(),
        }
    }

    /// Create with custom issuer and audience.
    pub fn with_issuer_audience(mut self, issuer: String, audience: String) -> Self {
        self.issuer = issuer;
        self.audience = audience;
        self
    }

    /// Validate a token and extract claims.
    pub fn validate_token(&self, token: &str) -> Result<Claims, AuthError> {
        let mut validation = Validation::default();
        validation.set_issuer(&[&self.issuer]);
        validation.set_audience(&[&self.audience]);

        let token_data = decode::<JwtClaims>(token, &self.decoding_key, &validation)
            .map_err(|e| match e.kind() {
                jsonwebtoken::errors::ErrorKind::ExpiredSignature => AuthError::Expired,
                _ => AuthError::Invalid(e.to_string()),
            })?;

        let claims = Claims::try_from(token_data.claims)?;

        if claims.is_expired() {
            return Err(AuthError::Expired);
        }

        Ok(claims)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use jsonwebtoken::{encode, EncodingKey, Header};
    use uuid::Uuid;

    fn create_test_auth() -> (WebSocketAuth, EncodingKey) {
        let secret = "test-secret-key-for-testing";
        (
            WebSocketAuth::new(secret.to_string(), 3600),
            EncodingKey::from_secret(secret.as_bytes()),
        )
    }

    fn sign(encoding_key: &EncodingKey, claims: &JwtClaims) -> String {
        encode(&Header::default(), claims, encoding_key).unwrap()
    }

    #[test]
    fn test_token_generation_and_validation() {
        let (auth, encoding_key) = create_test_auth();
        let now = Utc::now();

        let token = sign(
            &encoding_key,
            &JwtClaims {
                sub: "user-123".to_string(),
                exp: (now + chrono::Duration::hours(1)).timestamp(),
                iat: now.timestamp(),
                jti: Uuid::new_v4().to_string(),
                iss: "aiseo".to_string(),
                aud: "aiseo-websocket".to_string(),
                org_id: Some("org-456".to_string()),
            },
        );

        let claims = auth.validate_token(&token).unwrap();
        assert_eq!(claims.sub, "user-123");
        assert_eq!(claims.org_id, Some("org-456".to_string()));
    }

    #[test]
    fn test_expired_token() {
        let (auth, encoding_key) = create_test_auth();
        let now = Utc::now();

        let token = sign(
            &encoding_key,
            &JwtClaims {
                sub: "user-123".to_string(),
                exp: (now - chrono::Duration::seconds(1)).timestamp(),
                iat: now.timestamp(),
                jti: Uuid::new_v4().to_string(),
                iss: "aiseo".to_string(),
                aud: "aiseo-websocket".to_string(),
                org_id: None,
            },
        );

        let result = auth.validate_token(&token);
        assert!(matches!(result, Err(AuthError::Expired)));
    }

    #[test]
    fn test_invalid_token() {
        let (auth, _encoding_key) = create_test_auth();

        let result = auth.validate_token("invalid.token.here");
        assert!(matches!(result, Err(AuthError::Invalid(_))));
    }

    #[test]
    fn test_wrong_issuer_rejected() {
        let (auth, encoding_key) = create_test_auth();
        let now = Utc::now();

        let token = sign(
            &encoding_key,
            &JwtClaims {
                sub: "user-123".to_string(),
                exp: (now + chrono::Duration::hours(1)).timestamp(),
                iat: now.timestamp(),
                jti: Uuid::new_v4().to_string(),
                iss: "someone-else".to_string(),
                aud: "aiseo-websocket".to_string(),
                org_id: None,
            },
        );

        let result = auth.validate_token(&token);
        assert!(matches!(result, Err(AuthError::Invalid(_))));
    }
}

use jsonwebtoken::{decode, encode, Algorithm, DecodingKey, EncodingKey, Header, TokenData, Validation};
use serde::{Deserialize, Serialize};
use std::time::{SystemTime, UNIX_EPOCH};

use crate::error::{RelayError, Result};

/// Issuer stamped into tokens by the account service
pub const TOKEN_ISSUER: &str = "yourapp";

/// Access tokens live for 15 minutes
const ACCESS_TOKEN_TTL_SECS: usize = 15 * 60;

fn now_secs() -> usize {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as usize)
        .unwrap_or(0)
}

/// JWT Claims structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    /// Subject (user ID)
    #[serde(default)]
    pub sub: String,
    #[serde(rename = "userId", default)]
    pub user_id: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub role: String,
    pub iss: String,
    /// Expiration time (as UTC timestamp)
    pub exp: usize,
    /// Issued at (as UTC timestamp)
    #[serde(default)]
    pub iat: usize,
    /// Not before (as UTC timestamp)
    #[serde(default)]
    pub nbf: usize,
}

impl Claims {
    /// Creates access-token claims for a user
    pub fn new(user_id: String, email: String, role: String) -> Self {
        Self::with_ttl(user_id, email, role, ACCESS_TOKEN_TTL_SECS)
    }

    /// Creates claims with custom lifetime
    pub fn with_ttl(user_id: String, email: String, role: String, ttl_secs: usize) -> Self {
        let now = now_secs();
        Self {
            sub: user_id.clone(),
            user_id,
            email,
            role,
            iss: TOKEN_ISSUER.to_string(),
            exp: now + ttl_secs,
            iat: now,
            nbf: now,
        }
    }

    /// Check if the token is expired
    pub fn is_expired(&self) -> bool {
        now_secs() > self.exp
    }

    /// The user this token speaks for; `userId` wins over `sub` when both are set
    pub fn subject(&self) -> &str {
        if self.user_id.is_empty() {
            &self.sub
        } else {
            &self.user_id
        }
    }
}

/// Manages JWT token operations
pub struct TokenManager {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
}

impl TokenManager {
    /// Creates a new token manager with a secret (HS256 only)
    pub fn new(secret: &str) -> Self {
        let mut validation = Validation::new(Algorithm::HS256);
        validation.set_issuer(&[TOKEN_ISSUER]);
        validation.validate_nbf = true;
        Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation,
        }
    }

    /// Generates a JWT token for the given claims
    pub fn generate_token(&self, claims: &Claims) -> Result<String> {
        encode(&Header::new(Algorithm::HS256), claims, &self.encoding_key)
            .map_err(|e| RelayError::AuthError(format!("Failed to generate token: {}", e)))
    }

    /// Validates and decodes a JWT token
    pub fn validate_token(&self, token: &str) -> Result<TokenData<Claims>> {
        decode::<Claims>(token, &self.decoding_key, &self.validation)
            .map_err(|e| RelayError::AuthError(format!("Invalid token: {}", e)))
    }

    /// Validates a token and returns its claims if still valid
    pub fn validate_claims(&self, token: &str) -> Result<Claims> {
        let claims = self.validate_token(token)?.claims;

        if claims.is_expired() {
            return Err(RelayError::AuthError("Token expired".to_string()));
        }
        if claims.subject().is_empty() {
            return Err(RelayError::AuthError("Token has no subject".to_string()));
        }

        Ok(claims)
    }

    /// Validates a token and returns the user ID if valid
    pub fn validate_and_get_user_id(&self, token: &str) -> Result<String> {
        Ok(self.validate_claims(token)?.subject().to_string())
    }
}

/// Extracts bearer token from Authorization header
pub fn extract_bearer_token(auth_header: &str) -> Option<String> {
    let mut parts = auth_header.split_whitespace();
    match (parts.next(), parts.next(), parts.next()) {
        (Some("Bearer"), Some(token), None) => Some(token.to_string()),
        _ => None,
    }
}

//! Authentication provider used by the accept handler and REST routes
//!
//! The relay never issues credentials itself; it only asks a provider to turn
//! a bearer credential into a trusted user id.

use async_trait::async_trait;
use std::sync::Arc;

use crate::auth::token::TokenManager;
use crate::error::Result;

/// User information returned by authentication providers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthenticatedUser {
    pub user_id: String,
    pub email: Option<String>,
    pub role: Option<String>,
}

/// Trait for authentication providers
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Authenticate a credential; any error is a hard reject
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser>;

    /// Get the provider name for logging/debugging
    fn provider_name(&self) -> &'static str;
}

pub type SharedAuthProvider = Arc<dyn AuthProvider>;

/// JWT-based authentication provider
pub struct JwtAuthProvider {
    tokens: TokenManager,
}

impl JwtAuthProvider {
    pub fn new(secret: &str) -> Self {
        Self {
            tokens: TokenManager::new(secret),
        }
    }
}

#[async_trait]
impl AuthProvider for JwtAuthProvider {
    async fn authenticate(&self, token: &str) -> Result<AuthenticatedUser> {
        let claims = self.tokens.validate_claims(token)?;
        Ok(AuthenticatedUser {
            user_id: claims.subject().to_string(),
            email: Some(claims.email).filter(|e| !e.is_empty()),
            role: Some(claims.role).filter(|r| !r.is_empty()),
        })
    }

    fn provider_name(&self) -> &'static str {
        "jwt"
    }
}

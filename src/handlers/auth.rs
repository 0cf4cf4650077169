//! Authentication filters for the relay endpoints
//!
//! Browsers cannot set headers on a WebSocket handshake, so the token may come
//! from the `token` query parameter; `Authorization: Bearer` is the fallback.

use serde::Deserialize;
use warp::{Filter, Rejection};

use crate::auth::provider::{AuthenticatedUser, SharedAuthProvider};
use crate::auth::token::extract_bearer_token;
use crate::error::RelayError;

/// Tokens longer than this are rejected before decoding
const MAX_TOKEN_LENGTH: usize = 4096;

#[derive(Debug, Default, Deserialize)]
pub struct TokenQuery {
    pub token: Option<String>,
}

/// Pick the credential: query parameter first, bearer header second
pub fn resolve_token(query_token: Option<String>, auth_header: Option<&str>) -> Option<String> {
    query_token
        .filter(|t| !t.is_empty())
        .or_else(|| auth_header.and_then(extract_bearer_token))
}

/// Authenticate a credential, turning every failure into a hard reject
pub async fn authenticate_token(
    token: Option<String>,
    provider: &SharedAuthProvider,
) -> Result<AuthenticatedUser, RelayError> {
    let token = token.ok_or(RelayError::Unauthorized)?;

    if token.len() > MAX_TOKEN_LENGTH {
        return Err(RelayError::AuthError("Token too long".to_string()));
    }
    if token.chars().any(|c| c.is_control() || c.is_whitespace()) {
        return Err(RelayError::AuthError(
            "Token contains invalid characters".to_string(),
        ));
    }

    provider.authenticate(&token).await
}

/// Filter that extracts an authenticated user or rejects the request
pub fn with_authenticated_user(
    provider: SharedAuthProvider,
) -> impl Filter<Extract = (AuthenticatedUser,), Error = Rejection> + Clone {
    warp::query::<TokenQuery>()
        .or(warp::any().map(TokenQuery::default))
        .unify()
        .and(warp::header::optional::<String>("authorization"))
        .and(warp::any().map(move || provider.clone()))
        .and_then(
            |query: TokenQuery, header: Option<String>, provider: SharedAuthProvider| async move {
                let token = resolve_token(query.token, header.as_deref());
                match authenticate_token(token, &provider).await {
                    Ok(user) => Ok(user),
                    Err(e) => {
                        log::warn!("Rejected request ({} provider): {}", provider.provider_name(), e);
                        Err(warp::reject::custom(e))
                    }
                }
            },
        )
}

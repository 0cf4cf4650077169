//! Request handlers for different server endpoints

pub mod auth;
pub mod messages;
pub mod websocket;

use std::convert::Infallible;

use log::debug;
use serde::Serialize;
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::provider::SharedAuthProvider;
use crate::config::ConnectionSettings;
use crate::core::hub::SharedHub;
use crate::error::RelayError;
use crate::storage::traits::SharedMessageRepository;

pub use websocket::handle_ws_client;

impl warp::reject::Reject for RelayError {}

impl RelayError {
    /// HTTP status for errors surfaced through the REST layer
    pub fn status_code(&self) -> StatusCode {
        match self {
            Self::Unauthorized | Self::AuthError(_) => StatusCode::UNAUTHORIZED,
            Self::ValidationError(_) | Self::MessageParseError(_) => StatusCode::BAD_REQUEST,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

/// Everything the routes need, cheap to clone into filters
#[derive(Clone)]
pub struct AppState {
    pub hub: SharedHub,
    pub auth: SharedAuthProvider,
    pub messages: SharedMessageRepository,
    pub settings: ConnectionSettings,
}

/// JSON body shared by every REST reply
#[derive(Debug, Serialize)]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn ok(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: Some(message.into()),
            data: Some(data),
        }
    }
}

impl ApiResponse<()> {
    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: Some(message.into()),
            data: None,
        }
    }
}

pub fn with_state(state: AppState) -> impl Filter<Extract = (AppState,), Error = Infallible> + Clone {
    warp::any().map(move || state.clone())
}

/// All relay routes, without rejection recovery
pub fn api(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    let health = warp::path("health").and(warp::path::end()).map(|| "OK");

    websocket::ws_route(state.clone())
        .or(messages::create_message_route(state.clone()))
        .or(messages::online_route(state))
        .or(health)
}

/// All relay routes with JSON error replies, ready to serve
pub fn routes(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Infallible> + Clone {
    api(state).recover(handle_rejection)
}

/// Map rejections onto `{ "success": false, "message": .. }` replies
pub async fn handle_rejection(err: Rejection) -> Result<impl Reply, Infallible> {
    let (code, message) = if err.is_not_found() {
        (StatusCode::NOT_FOUND, "Not found".to_string())
    } else if let Some(e) = err.find::<RelayError>() {
        let message = match e {
            RelayError::Unauthorized => "Token required".to_string(),
            RelayError::AuthError(_) => "Invalid or expired token".to_string(),
            other => other.to_string(),
        };
        (e.status_code(), message)
    } else if let Some(e) = err.find::<warp::filters::body::BodyDeserializeError>() {
        (StatusCode::BAD_REQUEST, e.to_string())
    } else if err.find::<warp::reject::PayloadTooLarge>().is_some() {
        (StatusCode::PAYLOAD_TOO_LARGE, "Payload too large".to_string())
    } else if err.find::<warp::reject::MethodNotAllowed>().is_some() {
        (StatusCode::METHOD_NOT_ALLOWED, "Method not allowed".to_string())
    } else {
        // missing upgrade headers, malformed query strings and the like
        debug!("Request rejected: {:?}", err);
        (StatusCode::BAD_REQUEST, "Bad request".to_string())
    };

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::failure(message)),
        code,
    ))
}

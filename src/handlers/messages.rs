//! REST endpoints that feed the hub from outside a WebSocket

use log::info;
use serde::{Deserialize, Serialize};
use warp::http::StatusCode;
use warp::{Filter, Rejection, Reply};

use crate::auth::provider::AuthenticatedUser;
use crate::core::message::{ChatPayload, Envelope};
use crate::error::RelayError;
use crate::handlers::auth::with_authenticated_user;
use crate::handlers::{with_state, ApiResponse, AppState};

/// Request bodies above this size are refused before parsing
const MAX_BODY_BYTES: u64 = 64 * 1024;

#[derive(Debug, Deserialize)]
pub struct CreateMessageRequest {
    pub message: String,
}

#[derive(Debug, Serialize)]
pub struct OnlineCount {
    pub room_id: String,
    pub online: usize,
}

/// `POST /api/v1/rooms/{room_id}/messages`
pub fn create_message_route(
    state: AppState,
) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "rooms" / String / "messages")
        .and(warp::post())
        .and(with_authenticated_user(state.auth.clone()))
        .and(warp::body::content_length_limit(MAX_BODY_BYTES))
        .and(warp::body::json())
        .and(with_state(state))
        .and_then(create_message)
}

/// `GET /api/v1/rooms/{room_id}/online`
pub fn online_route(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "rooms" / String / "online")
        .and(warp::get())
        .and(with_state(state))
        .map(|room_id: String, state: AppState| {
            let online = state.hub.member_count(&room_id);
            warp::reply::json(&ApiResponse::ok(
                "Online members retrieved successfully",
                OnlineCount { room_id, online },
            ))
        })
}

/// Persist the message, then fan it out to the room
pub async fn create_message(
    room_id: String,
    user: AuthenticatedUser,
    request: CreateMessageRequest,
    state: AppState,
) -> Result<impl Reply, Rejection> {
    if room_id.trim().is_empty() {
        return Err(warp::reject::custom(RelayError::ValidationError(
            "Room ID is required".to_string(),
        )));
    }

    let stored = state
        .messages
        .create_message(&room_id, &user.user_id, &request.message)
        .await
        .map_err(warp::reject::custom)?;

    let envelope = Envelope::message(
        room_id.clone(),
        user.user_id.clone(),
        ChatPayload::Stored(stored.clone()),
    );
    let delivered = state.hub.broadcast(&room_id, envelope);
    info!(
        "Message {} from {} stored and broadcast to {} members of room {}",
        stored.id, user.user_id, delivered, room_id
    );

    Ok(warp::reply::with_status(
        warp::reply::json(&ApiResponse::ok("Message created successfully", stored)),
        StatusCode::CREATED,
    ))
}

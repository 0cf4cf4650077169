use log::{debug, info};
use warp::ws::{WebSocket, Ws};
use warp::{Filter, Rejection, Reply};

use crate::auth::provider::AuthenticatedUser;
use crate::config::ConnectionSettings;
use crate::core::connection::Connection;
use crate::core::hub::SharedHub;
use crate::core::message::Envelope;
use crate::core::pump::Pump;
use crate::error::RelayError;
use crate::handlers::auth::with_authenticated_user;
use crate::handlers::{with_state, AppState};

/// `GET /api/v1/rooms/{room_id}/chat/ws`
///
/// Authentication runs before the upgrade, so a rejected request never
/// touches the hub.
pub fn ws_route(state: AppState) -> impl Filter<Extract = (impl Reply,), Error = Rejection> + Clone {
    warp::path!("api" / "v1" / "rooms" / String / "chat" / "ws")
        .and(warp::get())
        .and_then(|room_id: String| async move {
            if room_id.trim().is_empty() {
                Err(warp::reject::custom(RelayError::ValidationError(
                    "Room ID is required".to_string(),
                )))
            } else {
                Ok(room_id)
            }
        })
        .and(with_authenticated_user(state.auth.clone()))
        .and(warp::ws())
        .and(with_state(state))
        .map(|room_id: String, user: AuthenticatedUser, ws: Ws, state: AppState| {
            info!("WebSocket connection accepted: room={}, user={}", room_id, user.user_id);
            let AppState { hub, settings, .. } = state;
            ws.max_message_size(settings.max_frame_size)
                .max_frame_size(settings.max_frame_size)
                .on_upgrade(move |socket| handle_ws_client(socket, room_id, user.user_id, hub, settings))
        })
}

// Handle an upgraded WebSocket connection for an authenticated user
pub async fn handle_ws_client(
    ws: WebSocket,
    room_id: String,
    user_id: String,
    hub: SharedHub,
    settings: ConnectionSettings,
) {
    let (connection, queue) = Connection::open(room_id, user_id, settings.outbound_queue_capacity);
    let info = connection.info().clone();
    let announce = settings.announce_presence;

    hub.register(connection);
    if announce {
        let online = hub.member_count(&info.room_id);
        hub.broadcast(
            &info.room_id,
            Envelope::user_joined(info.room_id.clone(), info.user_id.clone(), online),
        );
    }

    Pump::new(info.clone(), hub.clone(), settings).run(ws, queue).await;

    if announce {
        let online = hub.member_count(&info.room_id);
        let delivered = hub.broadcast(
            &info.room_id,
            Envelope::user_left(info.room_id.clone(), info.user_id.clone(), online),
        );
        debug!("Announced departure of {} to {} members", info.user_id, delivered);
    }
}

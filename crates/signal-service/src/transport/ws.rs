//! WebSocket endpoint and per-connection pumps.
//!
//! `GET /ws` upgrades to the event protocol. Each connection gets a
//! server-generated UUID id, an outbound pump draining its switchboard
//! channel into the socket, and an inbound loop parsing frames into
//! [`ClientEvent`]s for the relay. Transport close, for any reason, is
//! reported to the relay exactly once, as the implicit disconnect.

use std::sync::Arc;

use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::response::IntoResponse;
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use serde::Deserialize;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use uuid::Uuid;

use directory::UserStore;

use crate::actors::{HandshakeIdentity, RelayHandle};
use crate::protocol::{ClientEvent, ServerEvent};

/// Shared state behind the signaling router.
#[derive(Clone)]
pub struct AppState {
    pub relay: RelayHandle,
    pub directory: Arc<UserStore>,
    /// Capacity of each connection's outbound event channel.
    pub event_channel_buffer: usize,
}

/// Handshake query parameters, all optional.
#[derive(Debug, Deserialize)]
pub struct WsQuery {
    /// Persistent user id, resolved against the directory when present.
    /// Unknown or malformed ids degrade to an anonymous connection.
    #[serde(rename = "userId")]
    user_id: Option<String>,
}

/// Build the signaling router: `GET /ws` upgrades to the event protocol.
pub fn signaling_router(state: AppState) -> Router {
    Router::new()
        .route("/ws", get(ws_handler))
        .with_state(state)
}

async fn ws_handler(
    ws: WebSocketUpgrade,
    Query(query): Query<WsQuery>,
    State(state): State<AppState>,
) -> impl IntoResponse {
    let identity = resolve_identity(&state, query.user_id.as_deref());
    ws.on_upgrade(move |socket| handle_socket(socket, state, identity))
}

/// Resolve the optional `userId` query parameter to a directory identity.
fn resolve_identity(state: &AppState, user_id: Option<&str>) -> Option<HandshakeIdentity> {
    let raw = user_id?;
    let parsed = match Uuid::parse_str(raw) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(
                target: "signal.transport.ws",
                error = %e,
                "Ignoring malformed userId query parameter"
            );
            return None;
        }
    };
    let profile = state.directory.find_identity(parsed)?;
    Some(HandshakeIdentity {
        user_id: profile.id.to_string(),
        display_name: Some(profile.display_name),
        language: profile.language,
    })
}

async fn handle_socket(
    socket: WebSocket,
    state: AppState,
    identity: Option<HandshakeIdentity>,
) {
    let connection_id = Uuid::new_v4().to_string();
    let (mut sink, mut stream) = socket.split();
    let (event_tx, mut event_rx) = mpsc::channel::<ServerEvent>(state.event_channel_buffer);

    // Kept for pushing protocol errors straight back to this connection
    // without a relay round trip.
    let error_tx = event_tx.clone();

    if let Err(e) = state
        .relay
        .connection_opened(connection_id.clone(), identity, event_tx)
        .await
    {
        warn!(
            target: "signal.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Failed to register connection, dropping socket"
        );
        return;
    }

    info!(
        target: "signal.transport.ws",
        connection_id = %connection_id,
        "WebSocket connected"
    );

    let pump_connection_id = connection_id.clone();
    let outbound = tokio::spawn(async move {
        while let Some(event) = event_rx.recv().await {
            match serde_json::to_string(&event) {
                Ok(text) => {
                    if sink.send(Message::Text(text)).await.is_err() {
                        break;
                    }
                }
                Err(e) => {
                    warn!(
                        target: "signal.transport.ws",
                        connection_id = %pump_connection_id,
                        error = %e,
                        "Failed to serialize outbound event"
                    );
                }
            }
        }
        let _ = sink.close().await;
    });

    while let Some(frame) = stream.next().await {
        let Ok(message) = frame else {
            break;
        };
        match message {
            Message::Text(text) => match serde_json::from_str::<ClientEvent>(&text) {
                Ok(event) => {
                    if state
                        .relay
                        .client_event(connection_id.clone(), event)
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
                Err(e) => {
                    debug!(
                        target: "signal.transport.ws",
                        connection_id = %connection_id,
                        error = %e,
                        "Rejecting unparseable client frame"
                    );
                    let _ = error_tx.try_send(ServerEvent::Error {
                        message: "Unrecognized event".to_string(),
                    });
                }
            },
            Message::Close(_) => break,
            // axum answers pings itself; binary frames are not part of
            // the protocol.
            _ => {}
        }
    }

    if let Err(e) = state.relay.connection_closed(connection_id.clone()).await {
        warn!(
            target: "signal.transport.ws",
            connection_id = %connection_id,
            error = %e,
            "Failed to report connection close"
        );
    }
    outbound.abort();

    info!(
        target: "signal.transport.ws",
        connection_id = %connection_id,
        "WebSocket disconnected"
    );
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tokio_util::sync::CancellationToken;

    use crate::actors::RelayActor;

    fn make_state() -> AppState {
        let (relay, _task) = RelayActor::spawn(Duration::from_secs(5), CancellationToken::new());
        AppState {
            relay,
            directory: Arc::new(UserStore::new()),
            event_channel_buffer: 16,
        }
    }

    #[tokio::test]
    async fn identity_resolution_requires_known_active_user() {
        let state = make_state();

        let user = state
            .directory
            .create_user("alice@example.com", "s3cret-pw", "Alice")
            .unwrap();
        state
            .directory
            .update_language(user.user_id, Some("en".to_string()))
            .unwrap();

        let identity =
            resolve_identity(&state, Some(user.user_id.to_string().as_str())).unwrap();
        assert_eq!(identity.user_id, user.user_id.to_string());
        assert_eq!(identity.display_name.as_deref(), Some("Alice"));
        assert_eq!(identity.language.as_deref(), Some("en"));

        // Unknown id and malformed id both degrade to anonymous.
        assert!(resolve_identity(&state, Some(&Uuid::new_v4().to_string())).is_none());
        assert!(resolve_identity(&state, Some("not-a-uuid")).is_none());
        assert!(resolve_identity(&state, None).is_none());

        state.relay.cancel();
    }
}

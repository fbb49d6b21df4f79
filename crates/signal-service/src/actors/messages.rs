//! Message types for the relay actor mailbox.
//!
//! Connection lifecycle and client events are fire-and-forget; status and
//! reset use `tokio::sync::oneshot` for request-reply.

use tokio::sync::{mpsc, oneshot};

use crate::protocol::{ClientEvent, ServerEvent};

/// Identity resolved at WebSocket handshake time through the directory.
///
/// Used only to fill gaps in the caller-supplied user data on join; the
/// client's own payload always wins where present.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandshakeIdentity {
    /// Persistent user id, stable across reconnects.
    pub user_id: String,
    pub display_name: Option<String>,
    pub language: Option<String>,
}

/// Messages sent to the `RelayActor`.
#[derive(Debug)]
pub enum RelayMessage {
    /// A transport connection opened and registered its outbound channel.
    ConnectionOpened {
        connection_id: String,
        identity: Option<HandshakeIdentity>,
        sender: mpsc::Sender<ServerEvent>,
    },

    /// A transport connection was lost (implicit, never client-sent).
    ConnectionClosed { connection_id: String },

    /// A protocol event arrived from a client connection.
    Client {
        connection_id: String,
        event: ClientEvent,
    },

    /// A deferred host-failover check fired for a room whose host
    /// disconnected. State is re-validated at this point; the captured
    /// fields only identify which departure the check belongs to.
    ReconcileHost {
        room_id: String,
        departed_connection_id: String,
        departed_user_id: Option<String>,
    },

    /// Current relay state snapshot (health/debugging).
    GetStatus {
        respond_to: oneshot::Sender<RelayStatus>,
    },

    /// Drop all rooms and groups. Test isolation support.
    Reset { respond_to: oneshot::Sender<()> },
}

/// Snapshot of relay state.
#[derive(Debug, Clone)]
pub struct RelayStatus {
    pub connections: usize,
    pub rooms: usize,
    pub room_ids: Vec<String>,
}

//! Connection registry and room broadcast groups.
//!
//! Each connection registers a bounded outbound sender; rooms map to
//! member sets. Sends use `try_send` and skip slow or closed receivers
//! with a debug log - a stuck client must never stall the relay, and a
//! failed delivery is never an error the protocol layer sees.

use std::collections::{HashMap, HashSet};

use tokio::sync::mpsc;
use tracing::debug;

use crate::protocol::ServerEvent;

/// Per-connection sender for outbound protocol events.
pub type EventSender = mpsc::Sender<ServerEvent>;

/// Registry of live connections and their room broadcast groups.
///
/// Owned by the relay actor; no interior locking needed since all calls
/// arrive on the actor's mailbox.
#[derive(Debug, Default)]
pub struct Switchboard {
    connections: HashMap<String, EventSender>,
    groups: HashMap<String, HashSet<String>>,
}

impl Switchboard {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a connection's outbound channel.
    pub fn register(&mut self, connection_id: &str, sender: EventSender) {
        self.connections.insert(connection_id.to_string(), sender);
    }

    /// Remove a connection and drop it from every broadcast group.
    pub fn unregister(&mut self, connection_id: &str) {
        self.connections.remove(connection_id);
        for members in self.groups.values_mut() {
            members.remove(connection_id);
        }
        self.groups.retain(|_, members| !members.is_empty());
    }

    /// Add a connection to a room's broadcast group.
    pub fn join_group(&mut self, room_id: &str, connection_id: &str) {
        self.groups
            .entry(room_id.to_string())
            .or_default()
            .insert(connection_id.to_string());
    }

    /// Remove a connection from a room's broadcast group.
    pub fn leave_group(&mut self, room_id: &str, connection_id: &str) {
        if let Some(members) = self.groups.get_mut(room_id) {
            members.remove(connection_id);
            if members.is_empty() {
                self.groups.remove(room_id);
            }
        }
    }

    /// Drop a room's broadcast group entirely.
    pub fn drop_group(&mut self, room_id: &str) {
        self.groups.remove(room_id);
    }

    #[must_use]
    pub fn is_registered(&self, connection_id: &str) -> bool {
        self.connections.contains_key(connection_id)
    }

    #[must_use]
    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    /// Deliver an event to one connection.
    pub fn send_to(&self, connection_id: &str, event: ServerEvent) {
        let Some(sender) = self.connections.get(connection_id) else {
            debug!(
                target: "signal.switchboard",
                connection_id = %connection_id,
                "Dropping event for unknown connection"
            );
            return;
        };
        if let Err(e) = sender.try_send(event) {
            debug!(
                target: "signal.switchboard",
                connection_id = %connection_id,
                error = %e,
                "Skipping send to slow or closed connection"
            );
        }
    }

    /// Deliver an event to every member of a room's broadcast group.
    pub fn send_to_group(&self, room_id: &str, event: &ServerEvent) {
        self.fan_out(room_id, None, event);
    }

    /// Deliver an event to every group member except one (usually the
    /// sender of the event being relayed).
    pub fn send_to_group_except(&self, room_id: &str, except: &str, event: &ServerEvent) {
        self.fan_out(room_id, Some(except), event);
    }

    fn fan_out(&self, room_id: &str, except: Option<&str>, event: &ServerEvent) {
        let Some(members) = self.groups.get(room_id) else {
            return;
        };
        for connection_id in members {
            if except == Some(connection_id.as_str()) {
                continue;
            }
            if let Some(sender) = self.connections.get(connection_id) {
                if let Err(e) = sender.try_send(event.clone()) {
                    debug!(
                        target: "signal.switchboard",
                        room_id = %room_id,
                        connection_id = %connection_id,
                        error = %e,
                        "Skipping broadcast to slow or closed connection"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    fn make_sender() -> (EventSender, mpsc::Receiver<ServerEvent>) {
        mpsc::channel(8)
    }

    fn waiting(room: &str) -> ServerEvent {
        ServerEvent::WaitingRoom {
            room_id: room.to_string(),
        }
    }

    #[test]
    fn send_to_delivers_to_registered_connection() {
        let mut board = Switchboard::new();
        let (tx, mut rx) = make_sender();
        board.register("conn-a", tx);

        board.send_to("conn-a", waiting("r1"));
        assert_eq!(rx.try_recv().unwrap(), waiting("r1"));
    }

    #[test]
    fn send_to_unknown_connection_is_silent() {
        let board = Switchboard::new();
        board.send_to("ghost", waiting("r1"));
    }

    #[test]
    fn group_broadcast_reaches_all_members() {
        let mut board = Switchboard::new();
        let (tx_a, mut rx_a) = make_sender();
        let (tx_b, mut rx_b) = make_sender();
        let (tx_c, mut rx_c) = make_sender();
        board.register("conn-a", tx_a);
        board.register("conn-b", tx_b);
        board.register("conn-c", tx_c);
        board.join_group("r1", "conn-a");
        board.join_group("r1", "conn-b");

        board.send_to_group("r1", &waiting("r1"));

        assert!(rx_a.try_recv().is_ok());
        assert!(rx_b.try_recv().is_ok());
        // conn-c never joined the group
        assert!(rx_c.try_recv().is_err());
    }

    #[test]
    fn broadcast_except_skips_the_sender() {
        let mut board = Switchboard::new();
        let (tx_a, mut rx_a) = make_sender();
        let (tx_b, mut rx_b) = make_sender();
        board.register("conn-a", tx_a);
        board.register("conn-b", tx_b);
        board.join_group("r1", "conn-a");
        board.join_group("r1", "conn-b");

        board.send_to_group_except("r1", "conn-a", &waiting("r1"));

        assert!(rx_a.try_recv().is_err());
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn unregister_removes_from_all_groups() {
        let mut board = Switchboard::new();
        let (tx_a, _rx_a) = make_sender();
        board.register("conn-a", tx_a);
        board.join_group("r1", "conn-a");
        board.join_group("r2", "conn-a");

        board.unregister("conn-a");

        assert!(!board.is_registered("conn-a"));
        let (tx_b, mut rx_b) = make_sender();
        board.register("conn-b", tx_b);
        board.join_group("r1", "conn-b");
        board.send_to_group("r1", &waiting("r1"));
        // Only conn-b gets the broadcast; no stale membership panics.
        assert!(rx_b.try_recv().is_ok());
    }

    #[test]
    fn full_channel_is_skipped_not_fatal() {
        let mut board = Switchboard::new();
        let (tx, _rx) = mpsc::channel(1);
        board.register("conn-a", tx);
        board.join_group("r1", "conn-a");

        // Second send overflows the bounded channel; both calls must return.
        board.send_to_group("r1", &waiting("r1"));
        board.send_to_group("r1", &waiting("r1"));
    }
}

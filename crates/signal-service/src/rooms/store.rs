//! The canonical in-memory room map.
//!
//! Participant lists are insertion-ordered (`Vec`), which is what makes
//! "earliest joined wins" host transfer a `first()` lookup. A room exists
//! iff it has at least one active participant; the last active departure
//! deletes it (pending participants alone do not keep a room alive).
//!
//! Missing rooms are answered with `None`/`false`/empty, never an error:
//! the protocol layer decides what is worth telling a client about.

use std::collections::HashMap;

use chrono::{DateTime, Utc};

use super::participant::Participant;

/// A named session grouping active and pending participants.
#[derive(Debug, Clone)]
pub struct Room {
    pub id: String,
    /// Active participants in insertion order.
    participants: Vec<Participant>,
    /// Waiting-room participants in insertion order, disjoint from
    /// `participants` by connection id.
    pending: Vec<Participant>,
    /// Connection currently recognized as host; may be briefly stale
    /// during a host reconnection window.
    pub host_connection_id: Option<String>,
    /// Persistent identity of the host, used to recognize the same human
    /// reconnecting under a new connection id.
    pub host_user_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

impl Room {
    fn new(id: &str, host_connection_id: Option<&str>, host_user_id: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            participants: Vec::new(),
            pending: Vec::new(),
            host_connection_id: host_connection_id.map(ToString::to_string),
            host_user_id: host_user_id.map(ToString::to_string),
            created_at: Utc::now(),
        }
    }

    /// Active participant lookup by connection id.
    #[must_use]
    pub fn participant(&self, connection_id: &str) -> Option<&Participant> {
        self.participants
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    /// Pending participant lookup by connection id.
    #[must_use]
    pub fn pending_participant(&self, connection_id: &str) -> Option<&Participant> {
        self.pending
            .iter()
            .find(|p| p.connection_id == connection_id)
    }

    #[must_use]
    pub fn has_participant(&self, connection_id: &str) -> bool {
        self.participant(connection_id).is_some()
    }

    #[must_use]
    pub fn has_pending(&self, connection_id: &str) -> bool {
        self.pending_participant(connection_id).is_some()
    }

    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.participants.len()
    }
}

/// Process-wide store of all rooms.
///
/// Constructed once and passed by reference into the protocol actor; tests
/// get isolation by constructing a fresh store (or calling [`Self::clear`]).
#[derive(Debug, Default)]
pub struct RoomStore {
    rooms: HashMap<String, Room>,
}

impl RoomStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a room, or return the existing one unchanged (idempotent).
    pub fn create_room(
        &mut self,
        room_id: &str,
        host_connection_id: Option<&str>,
        host_user_id: Option<&str>,
    ) -> &Room {
        self.rooms
            .entry(room_id.to_string())
            .or_insert_with(|| Room::new(room_id, host_connection_id, host_user_id))
    }

    #[must_use]
    pub fn get_room(&self, room_id: &str) -> Option<&Room> {
        self.rooms.get(room_id)
    }

    /// Current host connection id, if the room exists and has one.
    #[must_use]
    pub fn get_host(&self, room_id: &str) -> Option<String> {
        self.rooms
            .get(room_id)?
            .host_connection_id
            .clone()
    }

    #[must_use]
    pub fn all_room_ids(&self) -> Vec<String> {
        self.rooms.keys().cloned().collect()
    }

    /// Host recognition: by current connection id, or by persistent user
    /// identity when one is supplied. False for unknown rooms.
    #[must_use]
    pub fn is_host(&self, room_id: &str, connection_id: &str, user_id: Option<&str>) -> bool {
        let Some(room) = self.rooms.get(room_id) else {
            return false;
        };
        if room.host_connection_id.as_deref() == Some(connection_id) {
            return true;
        }
        match (user_id, room.host_user_id.as_deref()) {
            (Some(user), Some(host_user)) => user == host_user,
            _ => false,
        }
    }

    /// Install `connection_id` as host. Overwrites the host connection
    /// unconditionally; updates the persistent host identity only when a
    /// user id is supplied. Returns false for unknown rooms.
    pub fn set_host(
        &mut self,
        room_id: &str,
        connection_id: &str,
        user_id: Option<&str>,
    ) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        room.host_connection_id = Some(connection_id.to_string());
        if let Some(user) = user_id {
            room.host_user_id = Some(user.to_string());
        }
        true
    }

    /// Transfer host to the earliest-joined remaining active participant.
    ///
    /// Adopts that participant's persistent identity as the new host
    /// identity when present. Returns the new host connection id, or
    /// `None` (without mutating) when the room is unknown or empty.
    pub fn transfer_host(&mut self, room_id: &str) -> Option<String> {
        let room = self.rooms.get_mut(room_id)?;
        let successor = room.participants.first()?;
        let new_host = successor.connection_id.clone();
        let new_host_user = successor.user_id.clone();

        room.host_connection_id = Some(new_host.clone());
        if new_host_user.is_some() {
            room.host_user_id = new_host_user;
        }
        Some(new_host)
    }

    /// Insert an active participant. Returns true for a genuinely new
    /// insertion; a record with the same connection id is replaced in
    /// place and reported as false (the duplicate-rejoin no-op).
    pub fn add_participant(&mut self, room_id: &str, participant: Participant) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if let Some(existing) = room
            .participants
            .iter_mut()
            .find(|p| p.connection_id == participant.connection_id)
        {
            *existing = participant;
            false
        } else {
            room.participants.push(participant);
            true
        }
    }

    /// Remove an active participant; deletes the room entirely once its
    /// active list is empty. Returns the removed record.
    pub fn remove_participant(
        &mut self,
        room_id: &str,
        connection_id: &str,
    ) -> Option<Participant> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room
            .participants
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        let removed = room.participants.remove(index);
        if room.participants.is_empty() {
            self.rooms.remove(room_id);
        }
        Some(removed)
    }

    /// Insert a pending (waiting-room) participant. Same replace-in-place
    /// rule as [`Self::add_participant`].
    pub fn add_pending(&mut self, room_id: &str, participant: Participant) -> bool {
        let Some(room) = self.rooms.get_mut(room_id) else {
            return false;
        };
        if let Some(existing) = room
            .pending
            .iter_mut()
            .find(|p| p.connection_id == participant.connection_id)
        {
            *existing = participant;
            false
        } else {
            room.pending.push(participant);
            true
        }
    }

    /// Remove a pending participant. Idempotent; absent targets yield
    /// `None`. Never deletes the room.
    pub fn remove_pending(&mut self, room_id: &str, connection_id: &str) -> Option<Participant> {
        let room = self.rooms.get_mut(room_id)?;
        let index = room
            .pending
            .iter()
            .position(|p| p.connection_id == connection_id)?;
        Some(room.pending.remove(index))
    }

    /// Snapshot of the active participants in insertion order.
    #[must_use]
    pub fn participants(&self, room_id: &str) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|r| r.participants.clone())
            .unwrap_or_default()
    }

    /// Snapshot of the pending participants in insertion order.
    #[must_use]
    pub fn pending_participants(&self, room_id: &str) -> Vec<Participant> {
        self.rooms
            .get(room_id)
            .map(|r| r.pending.clone())
            .unwrap_or_default()
    }

    /// Room ids where this connection is active or pending. A single
    /// disconnect can require cleanup in several rooms.
    #[must_use]
    pub fn rooms_for_connection(&self, connection_id: &str) -> Vec<String> {
        self.rooms
            .values()
            .filter(|room| {
                room.has_participant(connection_id) || room.has_pending(connection_id)
            })
            .map(|room| room.id.clone())
            .collect()
    }

    /// Drop all rooms. Test isolation support.
    pub fn clear(&mut self) {
        self.rooms.clear();
    }
}

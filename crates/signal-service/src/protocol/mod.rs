//! Wire-level protocol events.
//!
//! Every frame is an externally tagged JSON envelope
//! `{"event": "<kebab-case name>", "data": {...}}`. Field names are
//! camelCase on the wire. [`ClientEvent`] is what connections send in,
//! [`ServerEvent`] is what the relay emits; negotiation payloads (offer,
//! answer, ICE candidate) are carried opaquely as raw JSON values.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::rooms::UserData;

/// Events a client connection may send.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ClientEvent {
    JoinRoom {
        room_id: String,
        #[serde(default)]
        user_data: UserData,
    },
    AdmitParticipant {
        room_id: String,
        target_connection_id: String,
    },
    RejectParticipant {
        room_id: String,
        target_connection_id: String,
    },
    Offer {
        payload: Value,
        target_connection_id: String,
        room_id: String,
    },
    Answer {
        payload: Value,
        target_connection_id: String,
        room_id: String,
    },
    IceCandidate {
        payload: Value,
        target_connection_id: String,
        room_id: String,
    },
    ChatMessage {
        room_id: String,
        message: String,
        #[serde(default)]
        user_data: UserData,
    },
    ToggleAudio {
        room_id: String,
        audio_enabled: bool,
    },
    ToggleVideo {
        room_id: String,
        video_enabled: bool,
    },
    Transcription {
        room_id: String,
        transcription: Value,
    },
    ScreenShareStart {
        room_id: String,
    },
    ScreenShareStop {
        room_id: String,
    },
    MuteParticipant {
        room_id: String,
        target_connection_id: String,
    },
    KickParticipant {
        room_id: String,
        target_connection_id: String,
    },
}

impl ClientEvent {
    /// The event's wire name, as it appears in the envelope's `event`
    /// field. Used for logging and metric labels.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Self::JoinRoom { .. } => "join-room",
            Self::AdmitParticipant { .. } => "admit-participant",
            Self::RejectParticipant { .. } => "reject-participant",
            Self::Offer { .. } => "offer",
            Self::Answer { .. } => "answer",
            Self::IceCandidate { .. } => "ice-candidate",
            Self::ChatMessage { .. } => "chat-message",
            Self::ToggleAudio { .. } => "toggle-audio",
            Self::ToggleVideo { .. } => "toggle-video",
            Self::Transcription { .. } => "transcription",
            Self::ScreenShareStart { .. } => "screen-share-start",
            Self::ScreenShareStop { .. } => "screen-share-stop",
            Self::MuteParticipant { .. } => "mute-participant",
            Self::KickParticipant { .. } => "kick-participant",
        }
    }
}

/// Events the relay emits to client connections.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(
    tag = "event",
    content = "data",
    rename_all = "kebab-case",
    rename_all_fields = "camelCase"
)]
pub enum ServerEvent {
    HostStatus {
        is_host: bool,
    },
    Admitted {
        room_id: String,
    },
    HostUpdated {
        host_connection_id: String,
    },
    /// Roster of the other active participants, each annotated with
    /// `connectionId`, `isHost`, `language`, and passthrough user data.
    ExistingUsers(Vec<Value>),
    UserConnected {
        connection_id: String,
        user_data: Value,
    },
    WaitingRoom {
        room_id: String,
    },
    PendingParticipant {
        connection_id: String,
        user_data: Value,
    },
    Error {
        message: String,
    },
    ParticipantAdmitted {
        connection_id: String,
    },
    Rejected {
        room_id: String,
        message: String,
    },
    ParticipantRejected {
        connection_id: String,
    },
    Offer {
        payload: Value,
        sender_connection_id: String,
    },
    Answer {
        payload: Value,
        sender_connection_id: String,
    },
    IceCandidate {
        payload: Value,
        sender_connection_id: String,
    },
    ChatMessage {
        message: String,
        user_data: Value,
        timestamp: DateTime<Utc>,
    },
    UserAudioToggled {
        connection_id: String,
        enabled: bool,
    },
    UserVideoToggled {
        connection_id: String,
        enabled: bool,
    },
    Transcription {
        connection_id: String,
        transcription: Value,
    },
    ScreenShareStarted {
        connection_id: String,
    },
    ScreenShareStopped {
        connection_id: String,
    },
    ForceMute {
        connection_id: String,
    },
    ParticipantMuted {
        target_connection_id: String,
        muted_by: String,
    },
    Kicked {
        connection_id: String,
        message: String,
    },
    ParticipantKicked {
        target_connection_id: String,
        kicked_by: String,
    },
    UserDisconnected {
        connection_id: String,
    },
}

#[cfg(test)]
#[allow(
    clippy::unwrap_used,
    clippy::expect_used,
    clippy::indexing_slicing,
    clippy::panic
)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn join_room_wire_format() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join-room",
            "data": {
                "roomId": "r1",
                "userData": { "displayName": "Alice", "team": "blue" }
            }
        }))
        .unwrap();

        let ClientEvent::JoinRoom { room_id, user_data } = event else {
            panic!("expected join-room");
        };
        assert_eq!(room_id, "r1");
        assert_eq!(user_data.display_name.as_deref(), Some("Alice"));
        assert_eq!(user_data.extra.get("team"), Some(&json!("blue")));
    }

    #[test]
    fn join_room_user_data_defaults_when_absent() {
        let event: ClientEvent = serde_json::from_value(json!({
            "event": "join-room",
            "data": { "roomId": "r1" }
        }))
        .unwrap();

        assert!(matches!(
            event,
            ClientEvent::JoinRoom { user_data, .. } if user_data == UserData::default()
        ));
    }

    #[test]
    fn negotiation_events_round_trip_opaque_payloads() {
        let original = ClientEvent::IceCandidate {
            payload: json!({ "candidate": "candidate:1 1 UDP ...", "sdpMid": "0" }),
            target_connection_id: "conn-b".to_string(),
            room_id: "r1".to_string(),
        };

        let wire = serde_json::to_value(&original).unwrap();
        assert_eq!(wire["event"], json!("ice-candidate"));
        assert_eq!(wire["data"]["targetConnectionId"], json!("conn-b"));

        let back: ClientEvent = serde_json::from_value(wire).unwrap();
        assert_eq!(back, original);
    }

    #[test]
    fn server_events_use_kebab_case_names() {
        let wire = serde_json::to_value(ServerEvent::HostStatus { is_host: true }).unwrap();
        assert_eq!(wire, json!({ "event": "host-status", "data": { "isHost": true } }));

        let wire = serde_json::to_value(ServerEvent::ParticipantKicked {
            target_connection_id: "conn-b".to_string(),
            kicked_by: "conn-a".to_string(),
        })
        .unwrap();
        assert_eq!(wire["event"], json!("participant-kicked"));
        assert_eq!(wire["data"]["kickedBy"], json!("conn-a"));
    }

    #[test]
    fn existing_users_serializes_as_array_payload() {
        let wire = serde_json::to_value(ServerEvent::ExistingUsers(vec![json!({
            "connectionId": "conn-a",
            "isHost": true
        })]))
        .unwrap();

        assert_eq!(wire["event"], json!("existing-users"));
        assert!(wire["data"].is_array());
    }

    #[test]
    fn wire_name_matches_serialized_tag() {
        let events = [
            ClientEvent::ScreenShareStart {
                room_id: "r1".to_string(),
            },
            ClientEvent::ToggleAudio {
                room_id: "r1".to_string(),
                audio_enabled: false,
            },
            ClientEvent::KickParticipant {
                room_id: "r1".to_string(),
                target_connection_id: "conn-b".to_string(),
            },
        ];
        for event in events {
            let wire = serde_json::to_value(&event).unwrap();
            assert_eq!(wire["event"], json!(event.wire_name()));
        }
    }

    #[test]
    fn unknown_event_name_is_rejected() {
        let result: Result<ClientEvent, _> = serde_json::from_value(json!({
            "event": "start-recording",
            "data": { "roomId": "r1" }
        }));
        assert!(result.is_err());
    }
}

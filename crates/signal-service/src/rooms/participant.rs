//! Participant records and the caller-supplied user data payload.
//!
//! Canonical fields (display name, audio/video flags, persistent user id,
//! language) are typed with defaults. Anything else the caller sent rides
//! in a separate extras map and is merged back only when a record is
//! serialized for other clients, so canonical normalization can never be
//! clobbered by a stray extra field.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Display name applied when the caller supplied none (or an empty one).
pub const DEFAULT_DISPLAY_NAME: &str = "User";

/// Caller-supplied user data on `join-room` (and echoed on chat messages).
///
/// All fields optional; unknown fields are retained in `extra` and echoed
/// back to other clients verbatim.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct UserData {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub video_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audio_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A participant record, identical in shape whether active or pending.
#[derive(Debug, Clone, PartialEq)]
pub struct Participant {
    /// Identifier of the transport connection that owns this record.
    pub connection_id: String,
    /// Non-empty display name.
    pub display_name: String,
    pub video_enabled: bool,
    pub audio_enabled: bool,
    /// Persistent identity reference, stable across reconnects.
    pub user_id: Option<String>,
    /// Pass-through language preference.
    pub language: Option<String>,
    /// Admission time for active records, waiting-room entry time for
    /// pending ones.
    pub joined_at: DateTime<Utc>,
    /// Opaque caller-supplied fields, echoed to other clients.
    pub extra: Map<String, Value>,
}

impl Participant {
    /// Build a participant from caller-supplied user data, normalizing the
    /// canonical fields: empty or missing display names become
    /// [`DEFAULT_DISPLAY_NAME`], audio/video default to enabled.
    #[must_use]
    pub fn from_user_data(connection_id: &str, data: &UserData) -> Self {
        let display_name = data
            .display_name
            .as_deref()
            .map(str::trim)
            .filter(|name| !name.is_empty())
            .unwrap_or(DEFAULT_DISPLAY_NAME)
            .to_string();

        Self {
            connection_id: connection_id.to_string(),
            display_name,
            video_enabled: data.video_enabled.unwrap_or(true),
            audio_enabled: data.audio_enabled.unwrap_or(true),
            user_id: data.user_id.clone(),
            language: data.language.clone(),
            joined_at: Utc::now(),
            extra: data.extra.clone(),
        }
    }

    /// The user-data view of this record: extras first, canonical fields
    /// applied last so they always win.
    #[must_use]
    pub fn user_data_value(&self) -> Value {
        let mut map = self.extra.clone();
        map.insert(
            "displayName".to_string(),
            Value::String(self.display_name.clone()),
        );
        map.insert("videoEnabled".to_string(), Value::Bool(self.video_enabled));
        map.insert("audioEnabled".to_string(), Value::Bool(self.audio_enabled));
        if let Some(user_id) = &self.user_id {
            map.insert("userId".to_string(), Value::String(user_id.clone()));
        }
        if let Some(language) = &self.language {
            map.insert("language".to_string(), Value::String(language.clone()));
        }
        Value::Object(map)
    }

    /// Roster entry for `existing-users`: user data plus connection id,
    /// computed host flag, and language (always present, null when unset).
    #[must_use]
    pub fn roster_entry(&self, is_host: bool) -> Value {
        let mut value = self.user_data_value();
        if let Value::Object(map) = &mut value {
            map.insert(
                "connectionId".to_string(),
                Value::String(self.connection_id.clone()),
            );
            map.insert("isHost".to_string(), Value::Bool(is_host));
            map.insert(
                "language".to_string(),
                self.language
                    .clone()
                    .map_or(Value::Null, Value::String),
            );
        }
        value
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used, clippy::indexing_slicing)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn defaults_applied_when_fields_absent() {
        let participant = Participant::from_user_data("conn-1", &UserData::default());

        assert_eq!(participant.display_name, "User");
        assert!(participant.video_enabled);
        assert!(participant.audio_enabled);
        assert!(participant.user_id.is_none());
        assert!(participant.language.is_none());
    }

    #[test]
    fn empty_display_name_falls_back_to_default() {
        let data = UserData {
            display_name: Some("   ".to_string()),
            ..UserData::default()
        };
        let participant = Participant::from_user_data("conn-1", &data);
        assert_eq!(participant.display_name, "User");
    }

    #[test]
    fn explicit_false_flags_are_kept() {
        let data = UserData {
            display_name: Some("Alice".to_string()),
            video_enabled: Some(false),
            audio_enabled: Some(false),
            ..UserData::default()
        };
        let participant = Participant::from_user_data("conn-1", &data);
        assert_eq!(participant.display_name, "Alice");
        assert!(!participant.video_enabled);
        assert!(!participant.audio_enabled);
    }

    #[test]
    fn extras_survive_but_never_override_canonical_fields() {
        let mut extra = Map::new();
        extra.insert("avatarUrl".to_string(), json!("https://cdn/x.png"));
        // A hostile or buggy caller duplicating a canonical field in the
        // opaque payload must lose to the normalized value.
        extra.insert("displayName".to_string(), json!(""));

        let data = UserData {
            display_name: Some("Bob".to_string()),
            extra,
            ..UserData::default()
        };
        let participant = Participant::from_user_data("conn-2", &data);
        let value = participant.user_data_value();

        assert_eq!(value["displayName"], json!("Bob"));
        assert_eq!(value["avatarUrl"], json!("https://cdn/x.png"));
        assert_eq!(value["videoEnabled"], json!(true));
    }

    #[test]
    fn user_data_deserializes_unknown_fields_into_extra() {
        let data: UserData = serde_json::from_value(json!({
            "displayName": "Carol",
            "audioEnabled": false,
            "team": "blue",
        }))
        .unwrap();

        assert_eq!(data.display_name.as_deref(), Some("Carol"));
        assert_eq!(data.audio_enabled, Some(false));
        assert_eq!(data.extra.get("team"), Some(&json!("blue")));
    }

    #[test]
    fn roster_entry_carries_host_flag_and_connection_id() {
        let data = UserData {
            display_name: Some("Dave".to_string()),
            user_id: Some("u-42".to_string()),
            ..UserData::default()
        };
        let participant = Participant::from_user_data("conn-3", &data);
        let entry = participant.roster_entry(true);

        assert_eq!(entry["connectionId"], json!("conn-3"));
        assert_eq!(entry["isHost"], json!(true));
        assert_eq!(entry["userId"], json!("u-42"));
        assert_eq!(entry["language"], Value::Null);
    }
}

//! User account model and the identity projection exposed to the core.

use chrono::{DateTime, Utc};
use uuid::Uuid;

/// A stored user account.
///
/// `password_hash` never leaves this crate; callers outside the directory
/// see only [`IdentityProfile`] projections.
#[derive(Debug, Clone)]
pub struct User {
    pub user_id: Uuid,
    pub email: String,
    pub(crate) password_hash: String,
    pub display_name: String,
    /// Preferred language tag (e.g. "en", "pt-BR"), pass-through preference.
    pub language: Option<String>,
    pub is_active: bool,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Display-facing identity data handed to the signaling core.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IdentityProfile {
    pub id: Uuid,
    pub display_name: String,
    pub language: Option<String>,
}

impl User {
    pub(crate) fn to_identity(&self) -> IdentityProfile {
        IdentityProfile {
            id: self.user_id,
            display_name: self.display_name.clone(),
            language: self.language.clone(),
        }
    }
}

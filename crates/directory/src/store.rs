//! In-memory user store.
//!
//! Create/find/update operations keyed by user id, with bcrypt password
//! hashing at the write boundary. Reads clone out of the map so callers
//! never hold the lock.

use std::collections::HashMap;
use std::sync::RwLock;

use chrono::Utc;
use uuid::Uuid;

use crate::error::DirectoryError;
use crate::user::{IdentityProfile, User};

const MIN_PASSWORD_LENGTH: usize = 8;
const BCRYPT_COST: u32 = 12;

/// In-memory user account store.
///
/// Interior mutability via `RwLock` so a single store can be shared across
/// the HTTP layer and the signaling handshake.
#[derive(Debug, Default)]
pub struct UserStore {
    users: RwLock<HashMap<Uuid, User>>,
}

impl UserStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new user account.
    ///
    /// Validates email shape and password length, enforces email
    /// uniqueness, hashes the password with bcrypt before storing.
    pub fn create_user(
        &self,
        email: &str,
        password: &str,
        display_name: &str,
    ) -> Result<User, DirectoryError> {
        let email = email.trim().to_lowercase();
        if !email.contains('@') || email.len() < 3 {
            return Err(DirectoryError::InvalidEmail);
        }
        if password.len() < MIN_PASSWORD_LENGTH {
            return Err(DirectoryError::PasswordTooShort {
                min: MIN_PASSWORD_LENGTH,
            });
        }

        let password_hash = bcrypt::hash(password, BCRYPT_COST)?;

        let mut users = self
            .users
            .write()
            .map_err(|_| DirectoryError::StorePoisoned)?;

        if users.values().any(|u| u.email == email) {
            return Err(DirectoryError::EmailTaken);
        }

        let now = Utc::now();
        let user = User {
            user_id: Uuid::new_v4(),
            email,
            password_hash,
            display_name: display_name.trim().to_string(),
            language: None,
            is_active: true,
            created_at: now,
            updated_at: now,
        };
        users.insert(user.user_id, user.clone());
        Ok(user)
    }

    /// Look up a user by id.
    pub fn find_by_id(&self, user_id: Uuid) -> Result<Option<User>, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::StorePoisoned)?;
        Ok(users.get(&user_id).cloned())
    }

    /// Look up a user by email (normalized to lowercase).
    pub fn find_by_email(&self, email: &str) -> Result<Option<User>, DirectoryError> {
        let email = email.trim().to_lowercase();
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::StorePoisoned)?;
        Ok(users.values().find(|u| u.email == email).cloned())
    }

    /// Update a user's display name.
    pub fn update_display_name(
        &self,
        user_id: Uuid,
        display_name: &str,
    ) -> Result<User, DirectoryError> {
        self.update(user_id, |user| {
            user.display_name = display_name.trim().to_string();
        })
    }

    /// Update a user's preferred language.
    pub fn update_language(
        &self,
        user_id: Uuid,
        language: Option<String>,
    ) -> Result<User, DirectoryError> {
        self.update(user_id, |user| {
            user.language = language;
        })
    }

    /// Verify a password attempt against the stored hash.
    pub fn verify_password(&self, user_id: Uuid, password: &str) -> Result<bool, DirectoryError> {
        let users = self
            .users
            .read()
            .map_err(|_| DirectoryError::StorePoisoned)?;
        let user = users.get(&user_id).ok_or(DirectoryError::UserNotFound)?;
        Ok(bcrypt::verify(password, &user.password_hash)?)
    }

    /// The lookup the signaling core consumes: persistent user id to
    /// display-facing identity. Unknown or deactivated ids yield `None`,
    /// never an error.
    #[must_use]
    pub fn find_identity(&self, user_id: Uuid) -> Option<IdentityProfile> {
        let users = self.users.read().ok()?;
        users
            .get(&user_id)
            .filter(|u| u.is_active)
            .map(User::to_identity)
    }

    fn update(
        &self,
        user_id: Uuid,
        apply: impl FnOnce(&mut User),
    ) -> Result<User, DirectoryError> {
        let mut users = self
            .users
            .write()
            .map_err(|_| DirectoryError::StorePoisoned)?;
        let user = users.get_mut(&user_id).ok_or(DirectoryError::UserNotFound)?;
        apply(user);
        user.updated_at = Utc::now();
        Ok(user.clone())
    }
}

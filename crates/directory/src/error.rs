//! Directory error types.

use thiserror::Error;

/// Errors from user directory operations.
#[derive(Debug, Error)]
pub enum DirectoryError {
    /// An account with this email already exists.
    #[error("Email already registered")]
    EmailTaken,

    /// Email failed basic format validation.
    #[error("Invalid email address")]
    InvalidEmail,

    /// Password failed policy validation.
    #[error("Password must be at least {min} characters")]
    PasswordTooShort { min: usize },

    /// No user with the given id.
    #[error("User not found")]
    UserNotFound,

    /// Password hashing or verification failed.
    #[error("Credential processing error")]
    Hashing(#[from] bcrypt::BcryptError),

    /// The store's lock was poisoned by a panicking writer.
    #[error("Directory store unavailable")]
    StorePoisoned,
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;

    #[test]
    fn display_messages_stay_credential_free() {
        assert_eq!(
            DirectoryError::EmailTaken.to_string(),
            "Email already registered"
        );
        assert_eq!(
            DirectoryError::PasswordTooShort { min: 8 }.to_string(),
            "Password must be at least 8 characters"
        );
        assert_eq!(DirectoryError::UserNotFound.to_string(), "User not found");
    }
}

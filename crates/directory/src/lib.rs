//! Huddle user directory.
//!
//! Account storage and credential verification live here, behind a narrow
//! boundary: the signaling core consumes only [`UserStore::find_identity`],
//! which maps a persistent user id to display-facing profile data. The core
//! never sees emails, password hashes, or any other credential material.
//!
//! Storage is in-memory for the process lifetime; durable persistence is out
//! of scope for the relay.

#![warn(clippy::pedantic)]

pub mod error;
pub mod store;
pub mod user;

pub use error::DirectoryError;
pub use store::UserStore;
pub use user::{IdentityProfile, User};

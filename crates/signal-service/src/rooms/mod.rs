//! Pure in-memory room state.
//!
//! No I/O, no timers, no protocol knowledge. The [`store::RoomStore`] owns
//! the canonical map of rooms; the relay actor drives it and decides what
//! to tell whom.

pub mod participant;
pub mod store;

pub use participant::{Participant, UserData};
pub use store::{Room, RoomStore};

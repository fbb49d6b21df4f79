//! Transport layer: switchboard primitives and WebSocket glue.
//!
//! The protocol actor never touches sockets. It sees only the
//! [`switchboard::Switchboard`] capabilities: register/unregister a
//! connection's outbound channel, join/leave a room broadcast group, and
//! the three send primitives (to one connection, to a group, to a group
//! minus one member). [`ws`] owns the actual WebSocket lifecycle.

pub mod switchboard;
pub mod ws;

pub use switchboard::Switchboard;

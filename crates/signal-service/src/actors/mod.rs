//! Actor model for the signaling protocol.
//!
//! One [`relay::RelayActor`] per process owns all room state and the
//! switchboard. Connections talk to it through a [`relay::RelayHandle`];
//! deferred host-failover checks re-enter the same mailbox, which keeps
//! event arrival order the single serialization point.

pub mod messages;
pub mod relay;

pub use messages::{HandshakeIdentity, RelayMessage, RelayStatus};
pub use relay::{RelayActor, RelayHandle};

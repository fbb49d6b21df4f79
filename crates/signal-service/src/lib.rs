//! Huddle Signal Service Library
//!
//! A stateful WebSocket signaling relay for peer-to-peer video
//! conferencing. The relay brokers room membership, waiting-room admission,
//! and the exchange of WebRTC negotiation messages; media flows directly
//! between peers and never touches this process.
//!
//! # Architecture
//!
//! All room state lives behind a single serializing actor:
//!
//! ```text
//! RelayActor (singleton per process)
//! ├── owns the RoomStore (rooms, participants, pending, host identity)
//! ├── owns the Switchboard (connection registry + room broadcast groups)
//! └── schedules deferred host-failover reconciliation tasks
//! ```
//!
//! WebSocket connections are thin pumps: inbound frames become mailbox
//! messages, outbound events drain a bounded per-connection channel. The
//! mailbox is the only serialization point, so event arrival order is the
//! only ordering guarantee the protocol relies on.
//!
//! # Key Design Decisions
//!
//! - **One actor, many rooms**: a disconnect can touch several rooms at
//!   once; routing every mutation through one mailbox keeps cross-room
//!   cleanup atomic with respect to other events.
//! - **Host failover re-validates at expiry**: the deferred reconciliation
//!   task trusts nothing it captured; it re-checks identity matches and the
//!   stale host connection id when it fires, so overlapping timers are
//!   harmless.
//! - **Typed participant fields, opaque extras**: canonical fields
//!   (display name, audio/video flags, language) are first-class with
//!   defaults; arbitrary caller fields ride in a separate map merged only
//!   at serialization time.
//!
//! # Modules
//!
//! - [`actors`] - the admission/host protocol state machine and relay
//! - [`rooms`] - pure in-memory room state
//! - [`protocol`] - wire-level client/server event types
//! - [`transport`] - switchboard primitives and WebSocket glue
//! - [`config`] - service configuration from environment
//! - [`errors`] - error taxonomy with client-safe messages
//! - [`observability`] - health probes and relay metrics

#![warn(clippy::pedantic)]

pub mod actors;
pub mod config;
pub mod errors;
pub mod observability;
pub mod protocol;
pub mod rooms;
pub mod transport;

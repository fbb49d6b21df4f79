//! Observability for the signaling relay.
//!
//! Kubernetes-style liveness/readiness probes plus Prometheus metrics.
//! Labels are bounded to keep cardinality under control:
//! - `event`: bounded by the client protocol event set (~15 values)
//! - `outcome`: 2 values (recovered, transferred)
//!
//! | Metric | Type | Labels | Purpose |
//! |--------|------|--------|---------|
//! | `signal_connections_active` | Gauge | none | Registered WebSocket connections |
//! | `signal_rooms_active` | Gauge | none | Rooms with at least one participant |
//! | `signal_participants_active` | Gauge | none | Active participants across all rooms |
//! | `signal_events_total` | Counter | `event` | Client protocol events processed |
//! | `signal_host_failovers_total` | Counter | `outcome` | Host failover reconciliations |

pub mod health;
pub mod metrics;

pub use health::{health_router, HealthState};
pub use metrics::{
    init_metrics_recorder, metrics_router, record_client_event, record_host_failover,
    set_relay_gauges,
};

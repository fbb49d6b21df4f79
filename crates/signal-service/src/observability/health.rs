//! Health endpoints for the signaling relay.
//!
//! Kubernetes-compatible probes:
//! - `GET /health` - liveness (the process is up and serving requests)
//! - `GET /ready` - readiness (startup finished and the relay actor answers)
//!
//! Readiness is more than a flag: once the startup flag is set, every probe
//! round-trips the relay mailbox, so a cancelled or wedged actor takes the
//! instance out of rotation without any extra bookkeeping.
//!
//! The `/metrics` endpoint lives in [`super::metrics`] and is merged onto
//! the same listener by `main`.

use axum::{extract::State, http::StatusCode, routing::get, Router};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::actors::RelayHandle;

/// Startup/shutdown readiness flag shared with the probe handlers.
///
/// Set once the listeners are bound; cleared during shutdown so the load
/// balancer drains the instance before the relay stops.
#[derive(Debug, Default)]
pub struct HealthState {
    ready: AtomicBool,
}

impl HealthState {
    /// Create a new health state (not ready until startup completes).
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Mark the service as ready to serve traffic.
    pub fn set_ready(&self) {
        self.ready.store(true, Ordering::SeqCst);
    }

    /// Mark the service as not ready (e.g., during shutdown).
    pub fn set_not_ready(&self) {
        self.ready.store(false, Ordering::SeqCst);
    }

    #[must_use]
    pub fn is_ready(&self) -> bool {
        self.ready.load(Ordering::SeqCst)
    }
}

/// Everything the probe handlers need.
#[derive(Clone)]
struct ProbeContext {
    state: Arc<HealthState>,
    relay: RelayHandle,
}

/// Build the router serving the liveness and readiness probes.
pub fn health_router(health_state: Arc<HealthState>, relay: RelayHandle) -> Router {
    Router::new()
        .route("/health", get(liveness_handler))
        .route("/ready", get(readiness_handler))
        .with_state(ProbeContext {
            state: health_state,
            relay,
        })
}

/// If this handler runs at all, the process is live.
async fn liveness_handler() -> StatusCode {
    StatusCode::OK
}

/// Ready only when startup finished and the relay actor still answers a
/// status round trip.
async fn readiness_handler(State(ctx): State<ProbeContext>) -> StatusCode {
    if !ctx.state.is_ready() {
        return StatusCode::SERVICE_UNAVAILABLE;
    }
    match ctx.relay.status().await {
        Ok(_) => StatusCode::OK,
        Err(_) => StatusCode::SERVICE_UNAVAILABLE,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use std::time::Duration;

    use axum::body::Body;
    use axum::http::Request;
    use tokio::task::JoinHandle;
    use tokio_util::sync::CancellationToken;
    use tower::util::ServiceExt;

    use crate::actors::RelayActor;

    fn spawn_relay() -> (RelayHandle, JoinHandle<()>) {
        RelayActor::spawn(Duration::from_secs(5), CancellationToken::new())
    }

    async fn probe(app: Router, uri: &str) -> StatusCode {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        response.status()
    }

    #[test]
    fn ready_flag_toggles() {
        let state = HealthState::new();
        assert!(!state.is_ready());
        state.set_ready();
        assert!(state.is_ready());
        state.set_not_ready();
        assert!(!state.is_ready());
    }

    #[tokio::test]
    async fn health_endpoint_returns_ok() {
        let (relay, _task) = spawn_relay();
        let app = health_router(Arc::new(HealthState::new()), relay.clone());
        assert_eq!(probe(app, "/health").await, StatusCode::OK);
        relay.cancel();
    }

    #[tokio::test]
    async fn ready_requires_the_startup_flag() {
        let (relay, _task) = spawn_relay();
        let state = Arc::new(HealthState::new());
        let app = health_router(Arc::clone(&state), relay.clone());

        assert_eq!(
            probe(app.clone(), "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );

        state.set_ready();
        assert_eq!(probe(app, "/ready").await, StatusCode::OK);

        relay.cancel();
    }

    #[tokio::test]
    async fn ready_fails_once_the_relay_stops() {
        let (relay, task) = spawn_relay();
        let state = Arc::new(HealthState::new());
        state.set_ready();
        let app = health_router(Arc::clone(&state), relay.clone());

        assert_eq!(probe(app.clone(), "/ready").await, StatusCode::OK);

        // The flag alone is not enough; a stopped actor must flip the
        // probe even though startup never unset it.
        relay.cancel();
        task.await.unwrap();
        assert_eq!(
            probe(app, "/ready").await,
            StatusCode::SERVICE_UNAVAILABLE
        );
    }

    #[tokio::test]
    async fn unknown_path_returns_404() {
        let (relay, _task) = spawn_relay();
        let app = health_router(Arc::new(HealthState::new()), relay.clone());
        assert_eq!(probe(app, "/unknown").await, StatusCode::NOT_FOUND);
        relay.cancel();
    }
}

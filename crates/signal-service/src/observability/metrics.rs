//! Metric definitions for the signaling relay.
//!
//! Prometheus naming conventions: `signal_` prefix, `_total` suffix for
//! counters. All recording helpers are no-ops when no recorder is
//! installed, so library and actor tests never need one.

use axum::{routing::get, Router};
use metrics::{counter, gauge};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};

/// Install the Prometheus metrics recorder and return the render handle.
///
/// Must be called once, before any metrics are recorded.
///
/// # Errors
///
/// Returns an error if a global recorder is already installed.
pub fn init_metrics_recorder() -> Result<PrometheusHandle, String> {
    PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| format!("Failed to install Prometheus metrics recorder: {e}"))
}

/// Build the `/metrics` router rendering Prometheus text format.
pub fn metrics_router(handle: PrometheusHandle) -> Router {
    Router::new().route("/metrics", get(move || async move { handle.render() }))
}

/// Count one processed client protocol event.
///
/// Metric: `signal_events_total`
/// Labels: `event` (bounded by the protocol event set)
pub fn record_client_event(event: &str) {
    counter!("signal_events_total", "event" => event.to_string()).increment(1);
}

/// Count one host failover reconciliation that changed the host seat.
///
/// Metric: `signal_host_failovers_total`
/// Labels: `outcome` - `recovered` (same identity, new connection) or
/// `transferred` (earliest-joined participant took over)
pub fn record_host_failover(outcome: &str) {
    counter!("signal_host_failovers_total", "outcome" => outcome.to_string()).increment(1);
}

/// Update the relay-wide gauges after a state change.
///
/// Metrics: `signal_rooms_active`, `signal_participants_active`,
/// `signal_connections_active`
pub fn set_relay_gauges(rooms: usize, participants: usize, connections: usize) {
    // usize to f64 is lossless for realistic room and connection counts
    #[allow(clippy::cast_precision_loss)]
    {
        gauge!("signal_rooms_active").set(rooms as f64);
        gauge!("signal_participants_active").set(participants as f64);
        gauge!("signal_connections_active").set(connections as f64);
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::expect_used)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use http_body_util::BodyExt;
    use tower::util::ServiceExt;

    // Recording without an installed recorder must be a silent no-op.

    #[test]
    fn recording_without_recorder_is_a_no_op() {
        record_client_event("join-room");
        record_client_event("chat-message");
        record_host_failover("recovered");
        record_host_failover("transferred");
        set_relay_gauges(0, 0, 0);
        set_relay_gauges(3, 12, 15);
    }

    #[tokio::test]
    async fn metrics_endpoint_renders_recorded_metrics() {
        // A local recorder keeps this test independent of the global one.
        let recorder = PrometheusBuilder::new().build_recorder();
        let handle = recorder.handle();

        ::metrics::with_local_recorder(&recorder, || {
            record_client_event("join-room");
            record_host_failover("transferred");
            set_relay_gauges(1, 2, 3);
        });

        let app = metrics_router(handle);
        let response = app
            .oneshot(
                Request::builder()
                    .uri("/metrics")
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        let body = response.into_body().collect().await.unwrap().to_bytes();
        let text = String::from_utf8(body.to_vec()).unwrap();
        assert!(text.contains("signal_events_total"));
        assert!(text.contains("signal_host_failovers_total"));
        assert!(text.contains("signal_rooms_active"));
    }
}

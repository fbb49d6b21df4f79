//! Signal Service
//!
//! Stateless-payload WebSocket signaling relay for peer-to-peer video
//! rooms: waiting-room admission, a single host seat per room with timed
//! failover, and opaque relay of WebRTC negotiation messages.
//!
//! # Servers
//!
//! - HTTP server with the `GET /ws` signaling endpoint (default: 0.0.0.0:8080)
//! - HTTP server for health probes and Prometheus metrics (default: 0.0.0.0:8081)
//!
//! # Startup Flow
//!
//! 1. Load configuration from environment
//! 2. Initialize Prometheus metrics recorder
//! 3. Spawn the relay actor (owns all room state)
//! 4. Start health HTTP server (liveness, readiness, metrics)
//! 5. Start signaling HTTP server
//! 6. Wait for shutdown signal

#![warn(clippy::pedantic)]
#![allow(clippy::too_many_lines)] // main.rs orchestrates startup, naturally longer

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::http::HeaderValue;
use directory::UserStore;
use signal_service::actors::RelayActor;
use signal_service::config::Config;
use signal_service::observability::{
    health_router, init_metrics_recorder, metrics_router, HealthState,
};
use signal_service::transport::ws::{signaling_router, AppState};
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tower_http::cors::{AllowOrigin, Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Initialize tracing
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "signal_service=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    info!("Starting Signal Service");

    // Load configuration
    let config = Config::from_env().map_err(|e| {
        error!("Failed to load configuration: {}", e);
        e
    })?;

    info!(
        instance_id = %config.instance_id,
        bind_address = %config.bind_address,
        health_bind_address = %config.health_bind_address,
        host_failover_grace_seconds = config.host_failover_grace_seconds,
        event_channel_buffer = config.event_channel_buffer,
        allowed_origins = ?config.allowed_origins,
        "Configuration loaded successfully"
    );

    // Initialize Prometheus metrics recorder - must happen before any
    // metrics are recorded
    let prometheus_handle = init_metrics_recorder().map_err(|e| {
        error!(error = %e, "Failed to install Prometheus metrics recorder");
        e
    })?;
    info!("Prometheus metrics recorder initialized");

    // Initialize health state
    let health_state = Arc::new(HealthState::new());

    // Spawn the relay actor - it owns all room state, the switchboard,
    // and the deferred host-failover scheduling
    let (relay, _relay_task) = RelayActor::spawn(
        Duration::from_secs(config.host_failover_grace_seconds),
        CancellationToken::new(),
    );
    info!("Relay actor started");

    // Child tokens ensure all servers stop when the relay is cancelled
    let shutdown_token = relay.child_token();

    // Start health HTTP server (must succeed, fail startup if it doesn't)
    let health_addr: SocketAddr = config.health_bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.health_bind_address, "Invalid health bind address");
        format!("Invalid health bind address: {e}")
    })?;

    let health_app = health_router(Arc::clone(&health_state), relay.clone())
        .merge(metrics_router(prometheus_handle));

    // Bind the listener before spawning to fail fast on bind errors
    let health_listener = tokio::net::TcpListener::bind(health_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %health_addr, "Failed to bind health server");
            format!("Failed to bind health server to {health_addr}: {e}")
        })?;
    info!(addr = %health_addr, "Health server bound successfully");

    let health_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %health_addr, "Health server starting");
        let server = axum::serve(health_listener, health_app).with_graceful_shutdown(async move {
            health_shutdown_token.cancelled().await;
            info!("Health server shutting down");
        });
        if let Err(e) = server.await {
            error!(error = %e, "Health server failed");
        }
    });

    // Start the signaling server
    let signaling_addr: SocketAddr = config.bind_address.parse().map_err(|e| {
        error!(error = %e, addr = %config.bind_address, "Invalid bind address");
        format!("Invalid bind address: {e}")
    })?;

    let state = AppState {
        relay: relay.clone(),
        directory: Arc::new(UserStore::new()),
        event_channel_buffer: config.event_channel_buffer,
    };

    let app = signaling_router(state)
        .layer(TraceLayer::new_for_http())
        .layer(cors_layer(&config.allowed_origins));

    let signaling_listener = tokio::net::TcpListener::bind(signaling_addr)
        .await
        .map_err(|e| {
            error!(error = %e, addr = %signaling_addr, "Failed to bind signaling server");
            format!("Failed to bind signaling server to {signaling_addr}: {e}")
        })?;
    info!(addr = %signaling_addr, "Signaling server bound successfully");

    let signaling_shutdown_token = shutdown_token.child_token();
    tokio::spawn(async move {
        info!(addr = %signaling_addr, "Signaling server starting");
        let server =
            axum::serve(signaling_listener, app).with_graceful_shutdown(async move {
                signaling_shutdown_token.cancelled().await;
                info!("Signaling server shutting down");
            });
        if let Err(e) = server.await {
            error!(error = %e, "Signaling server failed");
        }
    });

    // Both listeners are bound and the actor is running
    health_state.set_ready();

    info!("Signal Service running - press Ctrl+C to shutdown");
    shutdown_signal().await;

    info!("Shutdown signal received, initiating graceful shutdown...");

    // Mark as not ready immediately so the load balancer drains us first
    health_state.set_not_ready();

    // Cancelling the relay token propagates to both server child tokens
    relay.cancel();

    // Give in-flight requests and the actor time to wind down
    tokio::time::sleep(Duration::from_secs(2)).await;

    info!("Signal Service shutdown complete");
    Ok(())
}

/// Build the CORS layer from the configured origin allow-list.
///
/// An empty list means any origin; WebSocket handshakes still work either
/// way, this only affects preflighted browser requests.
fn cors_layer(allowed_origins: &[String]) -> CorsLayer {
    if allowed_origins.is_empty() {
        return CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any);
    }
    let origins: Vec<HeaderValue> = allowed_origins
        .iter()
        .filter_map(|origin| origin.parse().ok())
        .collect();
    CorsLayer::new()
        .allow_origin(AllowOrigin::list(origins))
        .allow_methods(Any)
        .allow_headers(Any)
}

/// Wait for shutdown signal (Ctrl+C or SIGTERM).
///
/// # Panics
///
/// Panics if signal handlers cannot be installed. Without them the
/// service could never shut down gracefully.
async fn shutdown_signal() {
    let ctrl_c = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        #[expect(
            clippy::expect_used,
            reason = "Signal handler installation is critical - panic is appropriate if it fails"
        )]
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {}
        () = terminate => {}
    }
}

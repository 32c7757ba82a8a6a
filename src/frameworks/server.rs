// Framework bootstrap for the twin server runtime.

use crate::domain::{TelemetryHistory, Vec3};
use crate::frameworks::config;
use crate::interface_adapters::http::health_handler;
use crate::interface_adapters::net::frames::SnapshotFrames;
use crate::interface_adapters::net::{
    create_entity_handler, create_sensor_handler, delete_entity_handler, delete_sensor_handler,
    get_entity_handler, list_entities_handler, telemetry_channel_handler,
    telemetry_channels_handler, ws_handler,
};
use crate::interface_adapters::state::AppState;
use crate::use_cases::{BroadcastHub, SimSettings, record_telemetry, spawn_simulation};

use axum::{
    Router,
    routing::{delete, get, post},
};
use parking_lot::Mutex;
use std::net::SocketAddr;
use std::{io::Result, sync::Arc};
use tokio::sync::Notify;

fn init_runtime() {
    let _ = dotenvy::dotenv();

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));

    let json = matches!(std::env::var("LOG_FORMAT").as_deref(), Ok("json"));
    if json {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .json()
            .with_current_span(true)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .compact()
            .init();
    }

    std::panic::set_hook(Box::new(|info| {
        let backtrace = std::backtrace::Backtrace::capture();
        tracing::error!(%info, ?backtrace, "panic");
    }));
}

pub async fn run(listener: tokio::net::TcpListener) -> Result<()> {
    let address = listener.local_addr()?;
    // build state
    let (state, shutdown) = build_state()?;
    // Start the Web Server
    let app = Router::new()
        .route("/ws", get(ws_handler))
        .route("/health", get(health_handler))
        .route(
            "/entities",
            get(list_entities_handler).post(create_entity_handler),
        )
        .route(
            "/entities/{id}",
            get(get_entity_handler).delete(delete_entity_handler),
        )
        .route("/sensors", post(create_sensor_handler))
        .route("/sensors/{id}", delete(delete_sensor_handler))
        .route("/telemetry", get(telemetry_channels_handler))
        .route("/telemetry/{channel}", get(telemetry_channel_handler))
        .with_state(state);

    tracing::info!(%address, "listening");

    // Serve app and report errors rather than panicking
    let served = axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .inspect_err(|e| {
            tracing::error!(error = %e, "server error");
        });

    // Stop the driver once no handler can reach it anymore.
    shutdown.notify_one();
    served
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        tracing::warn!(error = %e, "failed to listen for ctrl-c");
        std::future::pending::<()>().await;
    }
    tracing::info!("shutdown requested");
}

pub async fn run_with_config() -> Result<()> {
    init_runtime();

    let address = SocketAddr::from(([127, 0, 0, 1], config::http_port()));

    // Bind TCP listener with error handling
    let listener = tokio::net::TcpListener::bind(address)
        .await
        .inspect_err(|e| {
            tracing::error!(%address, error = %e, "failed to bind");
        })?;

    run(listener).await
}

fn build_state() -> Result<(Arc<AppState>, Arc<Notify>)> {
    let tick_interval = config::tick_interval();
    let buffer_capacity = config::buffer_capacity();
    let queue_depth = config::subscriber_queue_depth();
    let event_channel_capacity = config::event_channel_capacity();
    config::validate(
        tick_interval,
        buffer_capacity,
        queue_depth,
        event_channel_capacity,
    )
    .inspect_err(|e| tracing::error!(error = %e, "invalid configuration"))?;

    let noise_seed = match config::noise_seed() {
        Some(seed) => seed,
        None => {
            let seed = rand::random::<u64>();
            // Logged so a run can be reproduced with NOISE_SEED.
            tracing::info!(noise_seed = seed, "NOISE_SEED unset; using random seed");
            seed
        }
    };

    let settings = SimSettings {
        tick_interval,
        gravity: Vec3::new(0.0, config::gravity_y(), 0.0),
        noise_seed,
        event_channel_capacity,
        demo_scene: config::demo_scene(),
    };
    tracing::debug!(
        tick_interval_ms = tick_interval.as_millis() as u64,
        buffer_capacity,
        queue_depth,
        event_channel_capacity,
        "runtime configured"
    );

    // Setup the hub and the single simulation driver
    // The driver owns all simulation state; everything else talks to it through the handle.
    let hub = BroadcastHub::new(queue_depth);
    let shutdown = Arc::new(Notify::new());
    let (sim, _driver) = spawn_simulation(&settings, hub.clone(), shutdown.clone())
        .map_err(|e| std::io::Error::other(format!("failed to start simulation: {e}")))?;

    let telemetry = Arc::new(Mutex::new(TelemetryHistory::new(buffer_capacity)));
    tokio::spawn(record_telemetry(hub.clone(), telemetry.clone()));

    let state = Arc::new(AppState {
        sim,
        hub,
        telemetry,
        frames: Arc::new(SnapshotFrames::new()),
        tick_interval,
    });
    Ok((state, shutdown))
}

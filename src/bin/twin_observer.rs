// Headless observer: subscribes to the twin server and keeps a local telemetry history.

use futures_util::StreamExt;
use std::{env, sync::Arc, time::Duration};
use tokio_tungstenite::{connect_async, tungstenite::Message};
use tracing::{debug, info, warn};
use twin_server::domain::{Snapshot, TelemetryHistory, telemetry::DEFAULT_CAPACITY};
use twin_server::interface_adapters::protocol::ServerMessage;

const RECONNECT_DELAY: Duration = Duration::from_secs(2);

fn server_url() -> String {
    env::var("OBSERVER_URL").unwrap_or_else(|_| "ws://127.0.0.1:3001/ws".to_string())
}

fn buffer_capacity() -> usize {
    env::var("OBSERVER_BUFFER_CAPACITY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v| v > 0)
        .unwrap_or(DEFAULT_CAPACITY)
}

// Snapshots between summary log lines.
fn report_every() -> u64 {
    env::var("OBSERVER_REPORT_EVERY")
        .ok()
        .and_then(|v| v.parse().ok())
        .filter(|&v| v > 0)
        .unwrap_or(10)
}

#[derive(Debug)]
enum ObserveEnd {
    ServerClosed,
    Lagged,
}

#[tokio::main]
async fn main() {
    let _ = dotenvy::dotenv();
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();

    let url = server_url();
    let mut history = TelemetryHistory::new(buffer_capacity());

    tokio::select! {
        _ = observe_forever(&url, &mut history) => {}
        _ = tokio::signal::ctrl_c() => info!("interrupted"),
    }
}

async fn observe_forever(url: &str, history: &mut TelemetryHistory) {
    loop {
        match observe(url, history).await {
            Ok(end) => warn!(?end, "stream ended; reconnecting"),
            Err(e) => warn!(error = %e, "connection failed; retrying"),
        }
        tokio::time::sleep(RECONNECT_DELAY).await;
    }
}

async fn observe(
    url: &str,
    history: &mut TelemetryHistory,
) -> Result<ObserveEnd, tokio_tungstenite::tungstenite::Error> {
    let (mut ws, _) = connect_async(url).await?;
    info!(%url, "connected");
    let every = report_every();
    let mut received: u64 = 0;

    while let Some(frame) = ws.next().await {
        let text = match frame? {
            Message::Text(text) => text,
            Message::Close(frame) => {
                let lagged = frame
                    .as_ref()
                    .is_some_and(|f| f.reason.as_str() == "subscriber lagged");
                return Ok(if lagged {
                    ObserveEnd::Lagged
                } else {
                    ObserveEnd::ServerClosed
                });
            }
            _ => continue,
        };

        match serde_json::from_str::<ServerMessage>(&text) {
            Ok(ServerMessage::Welcome {
                subscriber_id,
                tick_interval_ms,
            }) => info!(subscriber_id, tick_interval_ms, "subscribed"),
            Ok(ServerMessage::Snapshot(dto)) => {
                history.ingest(Arc::new(Snapshot::from(dto)));
                received += 1;
                if received % every == 0 {
                    report(history);
                }
            }
            Ok(other) => debug!(message = ?other, "ignored message"),
            Err(e) => warn!(error = %e, "unparseable server message"),
        }
    }
    Ok(ObserveEnd::ServerClosed)
}

fn report(history: &TelemetryHistory) {
    let Some(latest) = history.snapshots().latest() else {
        return;
    };
    info!(
        tick = latest.seq,
        entities = latest.value.entities.len(),
        buffered = history.snapshots().len(),
        "snapshot"
    );
    for name in history.channel_names() {
        if let Some(sample) = history.channel(name).and_then(|c| c.latest()) {
            info!(channel = name, tick = sample.seq, value = sample.value.value, "reading");
        }
    }
}

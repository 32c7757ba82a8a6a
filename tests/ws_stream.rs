mod support;

use futures_util::{SinkExt, StreamExt};
use serde_json::{Value, json};
use std::time::Duration;
use tokio_tungstenite::tungstenite::{Message, protocol::frame::coding::CloseCode};

fn has_reading(snapshot: &Value, sensor_id: &str) -> bool {
    snapshot["data"]["readings"]
        .as_array()
        .is_some_and(|r| r.iter().any(|reading| reading["sensor_id"] == sensor_id))
}

async fn send_json(ws: &mut support::WsStream, value: Value) {
    ws.send(Message::Text(value.to_string().into()))
        .await
        .expect("send");
}

// Creates a pinned entity with one temperature sensor and returns the sensor id.
async fn fixture_sensor() -> String {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();
    let entity_id = support::unique_id("rig");
    let sensor_id = support::unique_id("gauge");

    let res = client
        .post(format!("{base_url}/entities"))
        .json(&json!({"id": entity_id, "position": [0.0, 10.0, 0.0], "mass": 2.0, "friction": 1.0}))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);

    let res = client
        .post(format!("{base_url}/sensors"))
        .json(&json!({"id": sensor_id, "entity_id": entity_id, "kind": "temperature"}))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), reqwest::StatusCode::CREATED);
    sensor_id
}

#[tokio::test]
async fn subscriber_gets_welcome_then_ordered_snapshots() {
    let mut ws = support::connect_ws().await;

    let welcome = support::next_json(&mut ws).await;
    assert_eq!(welcome["type"], "Welcome");
    assert!(welcome["data"]["subscriber_id"].as_u64().is_some_and(|id| id > 0));
    assert_eq!(welcome["data"]["tick_interval_ms"], 100);

    let mut last_tick = 0;
    for _ in 0..5 {
        let snapshot = support::next_of_type(&mut ws, "Snapshot").await;
        let tick = snapshot["data"]["tick"].as_u64().expect("tick");
        assert!(tick > last_tick, "tick {tick} after {last_tick}");
        last_tick = tick;

        let readings = snapshot["data"]["readings"].as_array().expect("readings");
        for reading in readings {
            assert!(reading["unit"].is_string());
            assert!(reading["value"].is_f64());
        }
    }
}

#[tokio::test]
async fn sensor_disable_and_enable_round_trip() {
    let sensor_id = fixture_sensor().await;
    let mut ws = support::connect_ws().await;

    // Wait until the new sensor is being sampled.
    let mut seen = false;
    for _ in 0..50 {
        if has_reading(&support::next_of_type(&mut ws, "Snapshot").await, &sensor_id) {
            seen = true;
            break;
        }
    }
    assert!(seen, "sensor should produce readings");

    send_json(
        &mut ws,
        json!({
            "type": "Command",
            "data": {"request_id": 1, "target_id": sensor_id, "target_kind": "sensor", "action": "disable"}
        }),
    )
    .await;
    let ack = support::next_of_type(&mut ws, "CommandAccepted").await;
    assert_eq!(ack["data"]["request_id"], 1);

    // Snapshots queued before the command may still carry the reading.
    let mut gone = false;
    for _ in 0..50 {
        if !has_reading(&support::next_of_type(&mut ws, "Snapshot").await, &sensor_id) {
            gone = true;
            break;
        }
    }
    assert!(gone, "disabled sensor should stop reporting");
    for _ in 0..3 {
        let snapshot = support::next_of_type(&mut ws, "Snapshot").await;
        assert!(!has_reading(&snapshot, &sensor_id));
    }

    send_json(
        &mut ws,
        json!({
            "type": "Command",
            "data": {"request_id": 2, "target_id": sensor_id, "target_kind": "sensor", "action": "enable"}
        }),
    )
    .await;
    let ack = support::next_of_type(&mut ws, "CommandAccepted").await;
    assert_eq!(ack["data"]["request_id"], 2);

    let mut back = false;
    for _ in 0..50 {
        if has_reading(&support::next_of_type(&mut ws, "Snapshot").await, &sensor_id) {
            back = true;
            break;
        }
    }
    assert!(back, "re-enabled sensor should resume reporting");
}

#[tokio::test]
async fn bad_commands_are_rejected_to_the_sender_only() {
    let mut ws = support::connect_ws().await;
    let mut bystander = support::connect_ws().await;

    send_json(
        &mut ws,
        json!({
            "type": "Command",
            "data": {"request_id": 7, "target_id": support::unique_id("ghost"), "target_kind": "sensor", "action": "disable"}
        }),
    )
    .await;
    let rejected = support::next_of_type(&mut ws, "CommandRejected").await;
    assert_eq!(rejected["data"]["request_id"], 7);
    assert!(rejected["data"]["error"].as_str().is_some_and(|e| e.contains("not found")));

    send_json(
        &mut ws,
        json!({
            "type": "Command",
            "data": {"request_id": 8, "target_id": "LiDAR_01", "target_kind": "sensor", "action": "explode"}
        }),
    )
    .await;
    let rejected = support::next_of_type(&mut ws, "CommandRejected").await;
    assert_eq!(rejected["data"]["request_id"], 8);

    // The other subscriber keeps streaming and never sees either rejection.
    for _ in 0..5 {
        let message = support::next_json(&mut bystander).await;
        assert_ne!(message["type"], "CommandRejected");
    }
}

#[tokio::test]
async fn binary_frames_close_the_connection() {
    let mut ws = support::connect_ws().await;
    let _welcome = support::next_json(&mut ws).await;

    ws.send(Message::Binary(vec![1u8, 2, 3].into()))
        .await
        .expect("send");

    let close = tokio::time::timeout(Duration::from_secs(5), async {
        while let Some(frame) = ws.next().await {
            match frame {
                Ok(Message::Close(frame)) => return frame,
                Ok(_) => continue,
                Err(_) => return None,
            }
        }
        None
    })
    .await
    .expect("server should close the socket");

    let frame = close.expect("close frame");
    assert_eq!(frame.code, CloseCode::Unsupported);
}

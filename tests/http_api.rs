mod support;

use reqwest::StatusCode;
use serde_json::{Value, json};
use std::time::Duration;

fn entity_body(id: &str) -> Value {
    json!({
        "id": id,
        "position": [1.0, 2.0, 3.0],
        "mass": 5.0,
        "friction": 1.0,
        "metadata": {"role": "fixture"}
    })
}

#[tokio::test]
async fn health_reports_ok() {
    let base_url = support::ensure_server();
    let res = reqwest::get(format!("{base_url}/health"))
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::OK);

    let body: Value = res.json().await.expect("json body");
    assert_eq!(body["status"], "ok");
    assert!(body["subscribers"].is_u64());
}

#[tokio::test]
async fn entity_lifecycle_over_http() {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();
    let id = support::unique_id("crate");

    let res = client
        .post(format!("{base_url}/entities"))
        .json(&entity_body(&id))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::CREATED);
    let created: Value = res.json().await.expect("json body");
    assert_eq!(created["id"], id.as_str());
    assert_eq!(created["mass"], 5.0);
    assert_eq!(created["metadata"]["role"], "fixture");

    let res = client
        .get(format!("{base_url}/entities/{id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::OK);

    let listed: Vec<Value> = client
        .get(format!("{base_url}/entities"))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("json body");
    assert!(listed.iter().any(|e| e["id"] == id.as_str()));

    let res = client
        .delete(format!("{base_url}/entities/{id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    // Soft-deleted entities are gone for readers immediately.
    let res = client
        .get(format!("{base_url}/entities/{id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
    let body: Value = res.json().await.expect("json body");
    assert!(body["error"].as_str().is_some_and(|e| e.contains(&id)));

    let res = client
        .delete(format!("{base_url}/entities/{id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn invalid_entities_are_rejected() {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();

    let mut zero_mass = entity_body(&support::unique_id("bad"));
    zero_mass["mass"] = json!(0.0);
    let mut sticky = entity_body(&support::unique_id("bad"));
    sticky["friction"] = json!(1.5);
    let missing_position = json!({"id": support::unique_id("bad"), "mass": 1.0});

    for body in [zero_mass, sticky, missing_position] {
        let res = client
            .post(format!("{base_url}/entities"))
            .json(&body)
            .send()
            .await
            .expect("request should succeed");
        assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY, "{body}");
        let err: Value = res.json().await.expect("json body");
        assert!(err["error"].is_string());
    }
}

#[tokio::test]
async fn sensors_require_an_existing_entity() {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();
    let entity_id = support::unique_id("mount");
    let sensor_id = support::unique_id("thermo");

    let res = client
        .post(format!("{base_url}/sensors"))
        .json(&json!({"id": sensor_id, "entity_id": entity_id, "kind": "temperature"}))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::UNPROCESSABLE_ENTITY);

    client
        .post(format!("{base_url}/entities"))
        .json(&entity_body(&entity_id))
        .send()
        .await
        .expect("request should succeed");

    let res = client
        .post(format!("{base_url}/sensors"))
        .json(&json!({
            "id": sensor_id,
            "entity_id": entity_id,
            "kind": "temperature",
            "noise": {"shape": "gaussian", "magnitude": 0.1}
        }))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::CREATED);

    let res = client
        .delete(format!("{base_url}/sensors/{sensor_id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NO_CONTENT);

    let res = client
        .delete(format!("{base_url}/sensors/{sensor_id}"))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn telemetry_channels_fill_in_tick_order() {
    let base_url = support::ensure_server();
    let client = reqwest::Client::new();

    // The demo scene's LiDAR channel shows up once a few ticks have been recorded.
    let mut samples = Vec::new();
    for _ in 0..50 {
        let res = client
            .get(format!("{base_url}/telemetry/LiDAR_01"))
            .send()
            .await
            .expect("request should succeed");
        if res.status() == StatusCode::OK {
            let body: Value = res.json().await.expect("json body");
            samples = body["samples"].as_array().cloned().unwrap_or_default();
            if samples.len() >= 3 {
                break;
            }
        }
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    assert!(samples.len() >= 3, "expected recorded samples");

    let ticks: Vec<u64> = samples
        .iter()
        .map(|s| s["tick"].as_u64().expect("tick"))
        .collect();
    assert!(ticks.windows(2).all(|w| w[0] < w[1]), "{ticks:?}");

    let listed: Value = client
        .get(format!("{base_url}/telemetry"))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("json body");
    assert!(
        listed["channels"]
            .as_array()
            .is_some_and(|c| c.iter().any(|name| name == "LiDAR_01"))
    );

    let limited: Value = client
        .get(format!("{base_url}/telemetry/LiDAR_01?limit=2"))
        .send()
        .await
        .expect("request should succeed")
        .json()
        .await
        .expect("json body");
    assert_eq!(limited["samples"].as_array().map(Vec::len), Some(2));

    let res = client
        .get(format!("{base_url}/telemetry/{}", support::unique_id("nope")))
        .send()
        .await
        .expect("request should succeed");
    assert_eq!(res.status(), StatusCode::NOT_FOUND);
}

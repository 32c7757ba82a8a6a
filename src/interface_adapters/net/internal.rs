use crate::domain::{Entity, Sensor, SimError};
use crate::interface_adapters::protocol::{EntityDto, SensorDto};
use crate::interface_adapters::state::AppState;

use axum::{
    extract::{Json, Path, State, rejection::JsonRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

// Body rejections are reported with the same schema as domain validation errors.
fn rejected(rejection: JsonRejection) -> Response {
    SimError::validation(rejection.body_text()).into_response()
}

pub async fn create_entity_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<EntityDto>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    let entity = Entity::from(payload);
    let id = entity.id.clone();

    match state.sim.upsert_entity(entity).await {
        Ok(()) => match state.sim.get_entity(id).await {
            Ok(entity) => (StatusCode::CREATED, Json(EntityDto::from(&entity))).into_response(),
            Err(e) => e.into_response(),
        },
        Err(e) => e.into_response(),
    }
}

pub async fn list_entities_handler(State(state): State<Arc<AppState>>) -> Response {
    match state.sim.list_entities().await {
        Ok(entities) => {
            let body: Vec<EntityDto> = entities.iter().map(EntityDto::from).collect();
            Json(body).into_response()
        }
        Err(e) => e.into_response(),
    }
}

pub async fn get_entity_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sim.get_entity(id).await {
        Ok(entity) => Json(EntityDto::from(&entity)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_entity_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sim.remove_entity(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn create_sensor_handler(
    State(state): State<Arc<AppState>>,
    payload: Result<Json<SensorDto>, JsonRejection>,
) -> Response {
    let Json(payload) = match payload {
        Ok(payload) => payload,
        Err(rejection) => return rejected(rejection),
    };
    let sensor = Sensor::from(payload.clone());

    match state.sim.register_sensor(sensor).await {
        Ok(()) => (StatusCode::CREATED, Json(payload)).into_response(),
        Err(e) => e.into_response(),
    }
}

pub async fn delete_sensor_handler(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.sim.remove_sensor(id).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(e) => e.into_response(),
    }
}

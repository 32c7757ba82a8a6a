// Shared HTTP response types for consistent API error payloads.

use crate::domain::SimError;
use crate::interface_adapters::protocol::HealthDto;
use crate::interface_adapters::state::AppState;

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

#[derive(Debug, serde::Serialize)]
pub struct ErrorResponse {
    // Human-readable error string for consistent JSON error responses.
    pub error: String,
}

pub fn status_for(err: &SimError) -> StatusCode {
    match err {
        SimError::Validation(_) | SimError::DanglingReference { .. } => {
            StatusCode::UNPROCESSABLE_ENTITY
        }
        SimError::NotFound { .. } => StatusCode::NOT_FOUND,
        SimError::Unavailable => StatusCode::SERVICE_UNAVAILABLE,
        SimError::DeliveryFailure { .. } | SimError::StepperInconsistency { .. } => {
            StatusCode::INTERNAL_SERVER_ERROR
        }
    }
}

pub fn error_response(status: StatusCode, error: impl Into<String>) -> Response {
    (
        status,
        Json(ErrorResponse {
            error: error.into(),
        }),
    )
        .into_response()
}

impl IntoResponse for SimError {
    fn into_response(self) -> Response {
        error_response(status_for(&self), self.to_string())
    }
}

pub async fn health_handler(State(state): State<Arc<AppState>>) -> Json<HealthDto> {
    Json(HealthDto {
        status: "ok".to_string(),
        subscribers: state.hub.active_count(),
        last_tick: state.hub.last_tick(),
    })
}

// Read-only telemetry routes backed by the server-side history.

use crate::interface_adapters::http::error_response;
use crate::interface_adapters::protocol::{ChannelHistoryDto, ChannelListDto, SampleDto};
use crate::interface_adapters::state::AppState;

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
};
use std::sync::Arc;

#[derive(Debug, serde::Deserialize)]
pub struct HistoryQuery {
    // Only return the newest `limit` samples.
    #[serde(default)]
    limit: Option<usize>,
}

pub async fn telemetry_channels_handler(State(state): State<Arc<AppState>>) -> Json<ChannelListDto> {
    let history = state.telemetry.lock();
    Json(ChannelListDto {
        capacity: history.capacity(),
        channels: history.channel_names().map(str::to_string).collect(),
    })
}

pub async fn telemetry_channel_handler(
    State(state): State<Arc<AppState>>,
    Path(channel): Path<String>,
    Query(query): Query<HistoryQuery>,
) -> Response {
    let samples: Vec<SampleDto> = {
        let history = state.telemetry.lock();
        let Some(buffer) = history.channel(&channel) else {
            return error_response(StatusCode::NOT_FOUND, format!("unknown channel: {channel}"));
        };
        buffer.snapshot_history().iter().map(SampleDto::from).collect()
    };

    let samples = match query.limit {
        Some(limit) if limit < samples.len() => samples[samples.len() - limit..].to_vec(),
        _ => samples,
    };
    Json(ChannelHistoryDto { channel, samples }).into_response()
}

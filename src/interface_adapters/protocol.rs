// Wire protocol DTOs and conversions for the public WebSocket and HTTP API.

use crate::domain::telemetry::{Sample, TelemetryEntry};
use crate::domain::{
    Command, CommandAction, Entity, EntityPatch, EntityState, NoiseModel, NoiseShape, Reading,
    Sensor, SensorKind, SensorPatch, SimError, Snapshot, TargetKind, Vec3,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Messages the server sends to connected subscribers over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ServerMessage {
    // Sent once the subscription is registered, before the first snapshot.
    Welcome {
        subscriber_id: u64,
        tick_interval_ms: u64,
    },
    Snapshot(SnapshotDto),
    CommandAccepted {
        request_id: Option<u64>,
    },
    // Only ever sent to the subscriber that issued the command.
    CommandRejected {
        request_id: Option<u64>,
        error: String,
    },
}

/// Messages subscribers send to the server over the WebSocket.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", content = "data")]
pub enum ClientMessage {
    Command(CommandDto),
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TargetKindDto {
    Entity,
    Sensor,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum ActionDto {
    Enable,
    Disable,
    Set,
}

/// Control request as it arrives on the wire.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommandDto {
    #[serde(default)]
    pub request_id: Option<u64>,
    pub target_id: String,
    pub target_kind: TargetKindDto,
    pub action: ActionDto,
    #[serde(default)]
    pub payload: Option<serde_json::Value>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct EntityPatchDto {
    position: Option<[f64; 3]>,
    velocity: Option<[f64; 3]>,
    mass: Option<f64>,
    friction: Option<f64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct SensorPatchDto {
    offset: Option<[f64; 3]>,
    noise: Option<NoiseDto>,
}

impl TryFrom<CommandDto> for Command {
    type Error = SimError;

    fn try_from(dto: CommandDto) -> Result<Self, Self::Error> {
        let target_id = dto.target_id.trim().to_string();
        if target_id.is_empty() {
            return Err(SimError::validation("target_id is required"));
        }

        let target_kind = match dto.target_kind {
            TargetKindDto::Entity => TargetKind::Entity,
            TargetKindDto::Sensor => TargetKind::Sensor,
        };

        let action = match dto.action {
            ActionDto::Enable => CommandAction::Enable,
            ActionDto::Disable => CommandAction::Disable,
            ActionDto::Set => {
                let payload = dto
                    .payload
                    .ok_or_else(|| SimError::validation("set requires a payload"))?;
                parse_set_payload(target_kind, payload)?
            }
        };

        Ok(Command {
            target_id,
            target_kind,
            action,
        })
    }
}

fn parse_set_payload(
    kind: TargetKind,
    payload: serde_json::Value,
) -> Result<CommandAction, SimError> {
    let invalid = |e: serde_json::Error| SimError::validation(format!("invalid {kind} payload: {e}"));
    match kind {
        TargetKind::Entity => {
            let p: EntityPatchDto = serde_json::from_value(payload).map_err(invalid)?;
            let patch = EntityPatch {
                position: p.position.map(Vec3::from),
                velocity: p.velocity.map(Vec3::from),
                mass: p.mass,
                friction: p.friction,
            };
            if patch == EntityPatch::default() {
                return Err(SimError::validation("set payload has no fields"));
            }
            Ok(CommandAction::SetEntity(patch))
        }
        TargetKind::Sensor => {
            let p: SensorPatchDto = serde_json::from_value(payload).map_err(invalid)?;
            let patch = SensorPatch {
                offset: p.offset.map(Vec3::from),
                noise: p.noise.map(NoiseModel::from),
            };
            if patch == SensorPatch::default() {
                return Err(SimError::validation("set payload has no fields"));
            }
            Ok(CommandAction::SetSensor(patch))
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SensorKindDto {
    Temperature,
    Humidity,
    Pressure,
    Distance,
}

impl From<SensorKind> for SensorKindDto {
    fn from(kind: SensorKind) -> Self {
        match kind {
            SensorKind::Temperature => SensorKindDto::Temperature,
            SensorKind::Humidity => SensorKindDto::Humidity,
            SensorKind::Pressure => SensorKindDto::Pressure,
            SensorKind::Distance => SensorKindDto::Distance,
        }
    }
}

impl From<SensorKindDto> for SensorKind {
    fn from(kind: SensorKindDto) -> Self {
        match kind {
            SensorKindDto::Temperature => SensorKind::Temperature,
            SensorKindDto::Humidity => SensorKind::Humidity,
            SensorKindDto::Pressure => SensorKind::Pressure,
            SensorKindDto::Distance => SensorKind::Distance,
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum NoiseShapeDto {
    Uniform,
    Gaussian,
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct NoiseDto {
    pub shape: NoiseShapeDto,
    pub magnitude: f64,
}

impl From<NoiseDto> for NoiseModel {
    fn from(dto: NoiseDto) -> Self {
        let shape = match dto.shape {
            NoiseShapeDto::Uniform => NoiseShape::Uniform,
            NoiseShapeDto::Gaussian => NoiseShape::Gaussian,
        };
        NoiseModel {
            shape,
            magnitude: dto.magnitude,
        }
    }
}

impl From<NoiseModel> for NoiseDto {
    fn from(noise: NoiseModel) -> Self {
        let shape = match noise.shape {
            NoiseShape::Uniform => NoiseShapeDto::Uniform,
            NoiseShape::Gaussian => NoiseShapeDto::Gaussian,
        };
        Self {
            shape,
            magnitude: noise.magnitude,
        }
    }
}

/// Per-tick state sent to every active subscriber.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SnapshotDto {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub entities: Vec<EntityStateDto>,
    #[serde(default)]
    pub readings: Vec<ReadingDto>,
}

impl From<&Snapshot> for SnapshotDto {
    fn from(snapshot: &Snapshot) -> Self {
        Self {
            tick: snapshot.tick,
            timestamp_ms: snapshot.timestamp_ms,
            entities: snapshot.entities.iter().map(EntityStateDto::from).collect(),
            readings: snapshot.readings.iter().map(ReadingDto::from).collect(),
        }
    }
}

impl From<SnapshotDto> for Snapshot {
    fn from(dto: SnapshotDto) -> Self {
        Self {
            tick: dto.tick,
            timestamp_ms: dto.timestamp_ms,
            entities: dto
                .entities
                .into_iter()
                .map(|e| EntityState {
                    id: e.id,
                    position: e.position.into(),
                    velocity: e.velocity.into(),
                    active: e.active,
                })
                .collect(),
            readings: dto
                .readings
                .into_iter()
                .map(|r| Reading {
                    sensor_id: r.sensor_id,
                    entity_id: r.entity_id,
                    kind: r.kind.into(),
                    value: r.value,
                })
                .collect(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityStateDto {
    pub id: String,
    pub position: [f64; 3],
    pub velocity: [f64; 3],
    pub active: bool,
}

impl From<&EntityState> for EntityStateDto {
    fn from(state: &EntityState) -> Self {
        Self {
            id: state.id.clone(),
            position: state.position.into(),
            velocity: state.velocity.into(),
            active: state.active,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadingDto {
    pub sensor_id: String,
    pub entity_id: String,
    pub kind: SensorKindDto,
    pub unit: String,
    pub value: f64,
}

impl From<&Reading> for ReadingDto {
    fn from(reading: &Reading) -> Self {
        Self {
            sensor_id: reading.sensor_id.clone(),
            entity_id: reading.entity_id.clone(),
            kind: reading.kind.into(),
            unit: reading.kind.unit().to_string(),
            value: reading.value,
        }
    }
}

/// Entity body for the CRUD routes (request and response).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EntityDto {
    pub id: String,
    pub position: [f64; 3],
    #[serde(default)]
    pub velocity: [f64; 3],
    pub mass: f64,
    #[serde(default)]
    pub friction: f64,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl From<EntityDto> for Entity {
    fn from(dto: EntityDto) -> Self {
        Self {
            id: dto.id.trim().to_string(),
            position: dto.position.into(),
            velocity: dto.velocity.into(),
            mass: dto.mass,
            friction: dto.friction,
            active: true,
            metadata: dto.metadata,
        }
    }
}

impl From<&Entity> for EntityDto {
    fn from(entity: &Entity) -> Self {
        Self {
            id: entity.id.clone(),
            position: entity.position.into(),
            velocity: entity.velocity.into(),
            mass: entity.mass,
            friction: entity.friction,
            metadata: entity.metadata.clone(),
        }
    }
}

fn default_enabled() -> bool {
    true
}

/// Sensor registration body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SensorDto {
    pub id: String,
    pub entity_id: String,
    pub kind: SensorKindDto,
    #[serde(default)]
    pub offset: [f64; 3],
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    #[serde(default)]
    pub noise: Option<NoiseDto>,
}

impl From<SensorDto> for Sensor {
    fn from(dto: SensorDto) -> Self {
        Self {
            id: dto.id.trim().to_string(),
            entity_id: dto.entity_id.trim().to_string(),
            kind: dto.kind.into(),
            offset: dto.offset.into(),
            enabled: dto.enabled,
            noise: dto.noise.map_or(NoiseModel::NONE, NoiseModel::from),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SampleDto {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub value: f64,
}

impl From<&TelemetryEntry<Sample>> for SampleDto {
    fn from(entry: &TelemetryEntry<Sample>) -> Self {
        Self {
            tick: entry.seq,
            timestamp_ms: entry.value.timestamp_ms,
            value: entry.value.value,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelListDto {
    pub capacity: usize,
    pub channels: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChannelHistoryDto {
    pub channel: String,
    pub samples: Vec<SampleDto>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthDto {
    pub status: String,
    pub subscribers: usize,
    pub last_tick: Option<u64>,
}

// Domain-level errors shared by the store, sampler, hub and driver.

use super::state::TargetKind;

#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum SimError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("{kind} not found: {id}")]
    NotFound { kind: TargetKind, id: String },

    #[error("sensor {sensor_id} references missing entity {entity_id}")]
    DanglingReference { sensor_id: String, entity_id: String },

    #[error("subscriber {subscriber_id} stopped consuming snapshots")]
    DeliveryFailure { subscriber_id: u64 },

    #[error("entity store changed during step (generation {expected} -> {found})")]
    StepperInconsistency { expected: u64, found: u64 },

    #[error("simulation is not running")]
    Unavailable,
}

impl SimError {
    pub fn validation(reason: impl Into<String>) -> Self {
        SimError::Validation(reason.into())
    }

    pub fn entity_not_found(id: &str) -> Self {
        SimError::NotFound {
            kind: TargetKind::Entity,
            id: id.to_string(),
        }
    }

    pub fn sensor_not_found(id: &str) -> Self {
        SimError::NotFound {
            kind: TargetKind::Sensor,
            id: id.to_string(),
        }
    }
}

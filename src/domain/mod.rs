// Domain layer: simulation state, rules and bounded telemetry.

pub mod errors;
pub mod state;
pub mod store;
pub mod systems;
pub mod telemetry;

pub use errors::SimError;
pub use state::{
    Command, CommandAction, Entity, EntityPatch, EntityState, NoiseModel, NoiseShape, Reading,
    Sensor, SensorKind, SensorPatch, Snapshot, TargetKind, Vec3,
};
pub use store::EntityStore;
pub use telemetry::{TelemetryBuffer, TelemetryEntry, TelemetryHistory};

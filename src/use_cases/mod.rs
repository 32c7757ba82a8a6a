// Use cases layer: the tick driver, fan-out hub and telemetry recording.

pub mod commands;
pub mod hub;
pub mod simulation;
pub mod telemetry;
pub mod types;

pub use hub::{BroadcastHub, SubscriberState, Subscription};
pub use simulation::{SimSettings, Simulation, spawn_simulation};
pub use telemetry::{SharedHistory, record_telemetry};
pub use types::{SimEvent, SimHandle};

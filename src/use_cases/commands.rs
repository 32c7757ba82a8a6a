// Applies subscriber commands to the entity store and sensor registry.

use crate::domain::systems::sensors::SensorSampler;
use crate::domain::{Command, CommandAction, EntityStore, SimError, TargetKind};

pub fn apply_command(
    store: &mut EntityStore,
    sensors: &mut SensorSampler,
    command: &Command,
) -> Result<(), SimError> {
    let id = command.target_id.as_str();
    match (command.target_kind, &command.action) {
        (TargetKind::Entity, CommandAction::Enable) => store.set_active(id, true),
        (TargetKind::Entity, CommandAction::Disable) => store.set_active(id, false),
        (TargetKind::Entity, CommandAction::SetEntity(patch)) => store.patch(id, patch),
        (TargetKind::Sensor, CommandAction::Enable) => sensors.set_enabled(id, true, store),
        (TargetKind::Sensor, CommandAction::Disable) => sensors.set_enabled(id, false, store),
        (TargetKind::Sensor, CommandAction::SetSensor(patch)) => sensors.apply(id, patch),
        (kind, _) => Err(SimError::validation(format!(
            "set payload does not match target kind {kind}"
        ))),
    }
}

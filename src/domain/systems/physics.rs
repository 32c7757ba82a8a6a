use crate::domain::errors::SimError;
use crate::domain::state::{Entity, Vec3};
use crate::domain::store::EntityStore;
use tracing::warn;

#[derive(Debug, Clone, Copy)]
pub struct PhysicsConfig {
    pub gravity: Vec3, // m/s^2
    pub dt: f64,       // seconds per tick
}

/// New kinematics for every active entity, computed against one store generation.
#[derive(Debug)]
pub struct StepPlan {
    generation: u64,
    updates: Vec<(String, Vec3, Vec3)>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    Committed { entities: usize },
    Retried { entities: usize },
    // Both attempts lost the race; state left as it was after the mutation.
    Skipped,
}

/// Advances one entity by `dt`: gravity, friction damping, then position.
pub fn integrate(entity: &Entity, cfg: PhysicsConfig) -> (Vec3, Vec3) {
    let mut velocity = entity.velocity + cfg.gravity * cfg.dt;

    // Damping factor stays in [0, 1] so damping alone never flips a sign.
    let keep = (1.0 - entity.friction).clamp(0.0, 1.0);
    velocity = velocity * keep;

    let position = entity.position + velocity * cfg.dt;
    (position, velocity)
}

pub fn plan_step(store: &EntityStore, cfg: PhysicsConfig) -> StepPlan {
    let updates = store
        .list()
        .into_iter()
        .map(|e| {
            let (position, velocity) = integrate(e, cfg);
            (e.id.clone(), position, velocity)
        })
        .collect();

    StepPlan {
        generation: store.generation(),
        updates,
    }
}

/// Writes a plan back, refusing if the store changed shape since planning.
pub fn commit_step(store: &mut EntityStore, plan: StepPlan) -> Result<usize, SimError> {
    let found = store.generation();
    if found != plan.generation {
        return Err(SimError::StepperInconsistency {
            expected: plan.generation,
            found,
        });
    }

    let mut applied = 0;
    for (id, position, velocity) in plan.updates {
        if let Some(e) = store.get_mut_active(&id) {
            e.position = position;
            e.velocity = velocity;
            applied += 1;
        }
    }
    Ok(applied)
}

/// Plans and commits one tick with nothing running in between.
///
/// The driver holds the store exclusively for the whole tick, so here the
/// generation check cannot fire; it guards callers that interleave work
/// through [`advance_with`].
pub fn advance(store: &mut EntityStore, cfg: PhysicsConfig, tick: u64) -> StepOutcome {
    advance_with(store, cfg, tick, |_| {})
}

/// Plans, runs `between` on the store, then commits; re-plans once if
/// `between` changed the store's shape.
pub fn advance_with(
    store: &mut EntityStore,
    cfg: PhysicsConfig,
    tick: u64,
    mut between: impl FnMut(&mut EntityStore),
) -> StepOutcome {
    let plan = plan_step(store, cfg);
    between(&mut *store);
    match commit_step(store, plan) {
        Ok(entities) => StepOutcome::Committed { entities },
        Err(first) => {
            warn!(tick, error = %first, "physics step saw concurrent mutation; retrying");
            let plan = plan_step(store, cfg);
            between(&mut *store);
            match commit_step(store, plan) {
                Ok(entities) => StepOutcome::Retried { entities },
                Err(second) => {
                    warn!(tick, error = %second, "physics retry failed; skipping tick");
                    StepOutcome::Skipped
                }
            }
        }
    }
}

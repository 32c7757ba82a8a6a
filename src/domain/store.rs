// Authoritative physical state of all simulated entities.

use super::errors::SimError;
use super::state::{Entity, EntityPatch, EntityState};
use indexmap::IndexMap;

/// Insertion-ordered entity table with soft deletion.
///
/// Removed entities stay in the table, marked inactive, until
/// [`EntityStore::purge_removed`] runs after the next broadcast, so observers
/// see every removal once.
#[derive(Debug, Default)]
pub struct EntityStore {
    entities: IndexMap<String, Entity>,
    // Bumped on every structural change (insert, revive, remove, purge).
    generation: u64,
}

impl EntityStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Inserts or replaces an entity by id.
    pub fn upsert(&mut self, mut entity: Entity) -> Result<(), SimError> {
        validate_entity(&entity)?;
        entity.active = true;

        let structural = match self.entities.get(&entity.id) {
            Some(existing) => !existing.active,
            None => true,
        };
        self.entities.insert(entity.id.clone(), entity);
        if structural {
            self.generation += 1;
        }
        Ok(())
    }

    pub fn get(&self, id: &str) -> Result<&Entity, SimError> {
        self.entities
            .get(id)
            .filter(|e| e.active)
            .ok_or_else(|| SimError::entity_not_found(id))
    }

    /// All active entities in insertion order.
    pub fn list(&self) -> Vec<&Entity> {
        self.entities.values().filter(|e| e.active).collect()
    }

    pub fn contains_active(&self, id: &str) -> bool {
        self.entities.get(id).is_some_and(|e| e.active)
    }

    /// Soft-deletes an entity; it is reported inactive in one more snapshot.
    pub fn remove(&mut self, id: &str) -> Result<(), SimError> {
        let entity = self
            .entities
            .get_mut(id)
            .filter(|e| e.active)
            .ok_or_else(|| SimError::entity_not_found(id))?;
        entity.active = false;
        self.generation += 1;
        Ok(())
    }

    /// Sets the entity's active flag; enabling a pending removal revives it.
    pub fn set_active(&mut self, id: &str, active: bool) -> Result<(), SimError> {
        if active {
            let entity = self
                .entities
                .get_mut(id)
                .ok_or_else(|| SimError::entity_not_found(id))?;
            if !entity.active {
                entity.active = true;
                self.generation += 1;
            }
            Ok(())
        } else {
            self.remove(id)
        }
    }

    /// Applies a partial update, validating the merged result first.
    pub fn patch(&mut self, id: &str, patch: &EntityPatch) -> Result<(), SimError> {
        let current = self.get(id)?;
        let mut updated = current.clone();
        if let Some(position) = patch.position {
            updated.position = position;
        }
        if let Some(velocity) = patch.velocity {
            updated.velocity = velocity;
        }
        if let Some(mass) = patch.mass {
            updated.mass = mass;
        }
        if let Some(friction) = patch.friction {
            updated.friction = friction;
        }
        validate_entity(&updated)?;
        self.entities.insert(updated.id.clone(), updated);
        Ok(())
    }

    /// States for the next snapshot, including entities pending removal.
    pub fn states(&self) -> Vec<EntityState> {
        self.entities.values().map(EntityState::from).collect()
    }

    /// Drops entities whose removal has been broadcast. Returns how many.
    pub fn purge_removed(&mut self) -> usize {
        let before = self.entities.len();
        self.entities.retain(|_, e| e.active);
        let purged = before - self.entities.len();
        if purged > 0 {
            self.generation += 1;
        }
        purged
    }

    pub(crate) fn get_mut_active(&mut self, id: &str) -> Option<&mut Entity> {
        self.entities.get_mut(id).filter(|e| e.active)
    }
}

fn validate_entity(entity: &Entity) -> Result<(), SimError> {
    if entity.id.trim().is_empty() {
        return Err(SimError::validation("entity id must not be empty"));
    }
    if !entity.mass.is_finite() || entity.mass <= 0.0 {
        return Err(SimError::validation(format!(
            "mass must be > 0, got {}",
            entity.mass
        )));
    }
    if !(0.0..=1.0).contains(&entity.friction) {
        return Err(SimError::validation(format!(
            "friction must be within [0, 1], got {}",
            entity.friction
        )));
    }
    if !entity.position.is_finite() || !entity.velocity.is_finite() {
        return Err(SimError::validation("position and velocity must be finite"));
    }
    Ok(())
}

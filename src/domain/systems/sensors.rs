//! Sensor registry and per-tick sampling.
//!
//! Noise is deterministic for a fixed seed: each tick seeds a ChaCha8 RNG
//! from `seed ^ tick` and selects a per-sensor stream from a hash of the
//! sensor id, so a sensor's noise sequence does not depend on which other
//! sensors happen to be enabled.

use crate::domain::errors::SimError;
use crate::domain::state::{NoiseModel, NoiseShape, Reading, Sensor, SensorKind, SensorPatch};
use crate::domain::store::EntityStore;
use indexmap::IndexMap;
use rand::prelude::*;
use rand_chacha::ChaCha8Rng;
use tracing::warn;

/// Readings for one tick plus sensors disabled while sampling it.
#[derive(Debug, Default)]
pub struct SampleOutcome {
    pub readings: Vec<Reading>,
    pub dangling: Vec<SimError>,
}

#[derive(Debug)]
pub struct SensorSampler {
    sensors: IndexMap<String, Sensor>,
    seed: u64,
}

impl SensorSampler {
    pub fn new(seed: u64) -> Self {
        Self {
            sensors: IndexMap::new(),
            seed,
        }
    }

    pub fn seed(&self) -> u64 {
        self.seed
    }

    /// Adds or replaces a sensor. The attached entity must currently be active.
    pub fn register(&mut self, sensor: Sensor, store: &EntityStore) -> Result<(), SimError> {
        if sensor.id.trim().is_empty() {
            return Err(SimError::validation("sensor id must not be empty"));
        }
        validate_noise(sensor.noise)?;
        if !sensor.offset.is_finite() {
            return Err(SimError::validation("sensor offset must be finite"));
        }
        if !store.contains_active(&sensor.entity_id) {
            return Err(SimError::validation(format!(
                "sensor {} targets unknown entity {}",
                sensor.id, sensor.entity_id
            )));
        }
        self.sensors.insert(sensor.id.clone(), sensor);
        Ok(())
    }

    pub fn remove(&mut self, id: &str) -> Result<Sensor, SimError> {
        self.sensors
            .shift_remove(id)
            .ok_or_else(|| SimError::sensor_not_found(id))
    }

    pub fn get(&self, id: &str) -> Result<&Sensor, SimError> {
        self.sensors
            .get(id)
            .ok_or_else(|| SimError::sensor_not_found(id))
    }

    pub fn list(&self) -> impl Iterator<Item = &Sensor> {
        self.sensors.values()
    }

    pub fn set_enabled(
        &mut self,
        id: &str,
        enabled: bool,
        store: &EntityStore,
    ) -> Result<(), SimError> {
        let sensor = self
            .sensors
            .get_mut(id)
            .ok_or_else(|| SimError::sensor_not_found(id))?;
        if enabled && !store.contains_active(&sensor.entity_id) {
            return Err(SimError::DanglingReference {
                sensor_id: sensor.id.clone(),
                entity_id: sensor.entity_id.clone(),
            });
        }
        sensor.enabled = enabled;
        Ok(())
    }

    pub fn apply(&mut self, id: &str, patch: &SensorPatch) -> Result<(), SimError> {
        let sensor = self
            .sensors
            .get_mut(id)
            .ok_or_else(|| SimError::sensor_not_found(id))?;
        if let Some(noise) = patch.noise {
            validate_noise(noise)?;
        }
        if patch.offset.is_some_and(|o| !o.is_finite()) {
            return Err(SimError::validation("sensor offset must be finite"));
        }
        if let Some(noise) = patch.noise {
            sensor.noise = noise;
        }
        if let Some(offset) = patch.offset {
            sensor.offset = offset;
        }
        Ok(())
    }

    /// Produces one reading per enabled sensor for `tick`.
    pub fn sample(&mut self, store: &EntityStore, tick: u64) -> SampleOutcome {
        let mut outcome = SampleOutcome::default();
        let tick_seed = self.seed ^ tick;

        for sensor in self.sensors.values_mut() {
            if !sensor.enabled {
                continue;
            }

            let Ok(entity) = store.get(&sensor.entity_id) else {
                sensor.enabled = false;
                warn!(
                    sensor_id = %sensor.id,
                    entity_id = %sensor.entity_id,
                    tick,
                    "sensor entity missing; sensor disabled"
                );
                outcome.dangling.push(SimError::DanglingReference {
                    sensor_id: sensor.id.clone(),
                    entity_id: sensor.entity_id.clone(),
                });
                continue;
            };

            let altitude = entity.position.y + sensor.offset.y;
            let base = base_quantity(sensor.kind, altitude, entity.velocity.length());

            let mut rng = ChaCha8Rng::seed_from_u64(tick_seed);
            rng.set_stream(stream_id(&sensor.id));
            let value = base + sample_noise(sensor.noise, &mut rng);

            outcome.readings.push(Reading {
                sensor_id: sensor.id.clone(),
                entity_id: sensor.entity_id.clone(),
                kind: sensor.kind,
                value,
            });
        }

        outcome
    }
}

/// Noise-free physical quantity seen by a sensor at `altitude` metres.
pub fn base_quantity(kind: SensorKind, altitude: f64, speed: f64) -> f64 {
    match kind {
        // Standard lapse rate plus a little synthetic friction heating.
        SensorKind::Temperature => 20.0 - 0.0065 * altitude + 0.05 * speed,
        SensorKind::Humidity => (55.0 - 0.02 * altitude).clamp(0.0, 100.0),
        SensorKind::Pressure => {
            let ratio = (1.0 - 2.25577e-5 * altitude).max(0.0);
            101.325 * ratio.powf(5.25588)
        }
        SensorKind::Distance => altitude.max(0.0),
    }
}

fn sample_noise(noise: NoiseModel, rng: &mut ChaCha8Rng) -> f64 {
    if noise.magnitude == 0.0 {
        return 0.0;
    }
    match noise.shape {
        NoiseShape::Uniform => noise.magnitude * (rng.random::<f64>() * 2.0 - 1.0),
        NoiseShape::Gaussian => noise.magnitude * box_muller(rng),
    }
}

// Standard normal sample without pulling in rand_distr.
fn box_muller(rng: &mut ChaCha8Rng) -> f64 {
    let u1: f64 = rng.random::<f64>().max(1e-300);
    let u2: f64 = rng.random();
    (-2.0 * u1.ln()).sqrt() * (2.0 * std::f64::consts::PI * u2).cos()
}

// FNV-1a; stable across runs and toolchains, unlike the std hasher.
fn stream_id(sensor_id: &str) -> u64 {
    sensor_id.bytes().fold(0xcbf2_9ce4_8422_2325, |hash, b| {
        (hash ^ u64::from(b)).wrapping_mul(0x0000_0100_0000_01b3)
    })
}

fn validate_noise(noise: NoiseModel) -> Result<(), SimError> {
    if !noise.magnitude.is_finite() || noise.magnitude < 0.0 {
        return Err(SimError::validation(format!(
            "noise magnitude must be finite and >= 0, got {}",
            noise.magnitude
        )));
    }
    Ok(())
}

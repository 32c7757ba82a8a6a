// Domain-level simulation entities, sensors, commands and snapshot types.

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Add, AddAssign, Mul};

#[derive(Debug, Clone, Copy, PartialEq, Default)]
pub struct Vec3 {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3::new(0.0, 0.0, 0.0);

    pub const fn new(x: f64, y: f64, z: f64) -> Self {
        Self { x, y, z }
    }

    pub fn length(self) -> f64 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }
}

impl Add for Vec3 {
    type Output = Vec3;

    fn add(self, rhs: Vec3) -> Vec3 {
        Vec3::new(self.x + rhs.x, self.y + rhs.y, self.z + rhs.z)
    }
}

impl AddAssign for Vec3 {
    fn add_assign(&mut self, rhs: Vec3) {
        *self = *self + rhs;
    }
}

impl Mul<f64> for Vec3 {
    type Output = Vec3;

    fn mul(self, rhs: f64) -> Vec3 {
        Vec3::new(self.x * rhs, self.y * rhs, self.z * rhs)
    }
}

impl From<[f64; 3]> for Vec3 {
    fn from([x, y, z]: [f64; 3]) -> Self {
        Self { x, y, z }
    }
}

impl From<Vec3> for [f64; 3] {
    fn from(v: Vec3) -> Self {
        [v.x, v.y, v.z]
    }
}

/// A simulated physical object.
#[derive(Debug, Clone, PartialEq)]
pub struct Entity {
    pub id: String,
    pub position: Vec3,
    pub velocity: Vec3,
    pub mass: f64,
    pub friction: f64,
    pub active: bool,
    // Forward-compatible properties; physics never reads these.
    pub metadata: BTreeMap<String, serde_json::Value>,
}

impl Entity {
    /// Creates an active entity at rest with no metadata.
    pub fn new(id: impl Into<String>, position: Vec3, mass: f64, friction: f64) -> Self {
        Self {
            id: id.into(),
            position,
            velocity: Vec3::ZERO,
            mass,
            friction,
            active: true,
            metadata: BTreeMap::new(),
        }
    }

    pub fn with_velocity(mut self, velocity: Vec3) -> Self {
        self.velocity = velocity;
        self
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum SensorKind {
    Temperature,
    Humidity,
    Pressure,
    Distance,
}

impl SensorKind {
    pub fn unit(self) -> &'static str {
        match self {
            SensorKind::Temperature => "°C",
            SensorKind::Humidity => "%",
            SensorKind::Pressure => "kPa",
            SensorKind::Distance => "m",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoiseShape {
    Uniform,
    Gaussian,
}

/// Additive noise applied to every reading of a sensor.
///
/// For `Uniform` the magnitude is the half-range, for `Gaussian` it is the
/// standard deviation.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct NoiseModel {
    pub shape: NoiseShape,
    pub magnitude: f64,
}

impl NoiseModel {
    pub const NONE: NoiseModel = NoiseModel {
        shape: NoiseShape::Uniform,
        magnitude: 0.0,
    };

    pub fn uniform(magnitude: f64) -> Self {
        Self {
            shape: NoiseShape::Uniform,
            magnitude,
        }
    }

    pub fn gaussian(magnitude: f64) -> Self {
        Self {
            shape: NoiseShape::Gaussian,
            magnitude,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Sensor {
    pub id: String,
    // Back-reference only; the sensor never owns its entity.
    pub entity_id: String,
    pub kind: SensorKind,
    pub offset: Vec3,
    pub enabled: bool,
    pub noise: NoiseModel,
}

impl Sensor {
    pub fn new(id: impl Into<String>, entity_id: impl Into<String>, kind: SensorKind) -> Self {
        Self {
            id: id.into(),
            entity_id: entity_id.into(),
            kind,
            offset: Vec3::ZERO,
            enabled: true,
            noise: NoiseModel::NONE,
        }
    }

    pub fn with_noise(mut self, noise: NoiseModel) -> Self {
        self.noise = noise;
        self
    }

    pub fn with_offset(mut self, offset: Vec3) -> Self {
        self.offset = offset;
        self
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct EntityState {
    pub id: String,
    pub position: Vec3,
    pub velocity: Vec3,
    pub active: bool,
}

impl From<&Entity> for EntityState {
    fn from(e: &Entity) -> Self {
        Self {
            id: e.id.clone(),
            position: e.position,
            velocity: e.velocity,
            active: e.active,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Reading {
    pub sensor_id: String,
    pub entity_id: String,
    pub kind: SensorKind,
    pub value: f64,
}

/// Everything observers learn about one tick.
///
/// Built once per tick and shared behind an `Arc`; a new snapshot replaces
/// the previous one instead of patching it.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    pub tick: u64,
    pub timestamp_ms: u64,
    pub entities: Vec<EntityState>,
    pub readings: Vec<Reading>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TargetKind {
    Entity,
    Sensor,
}

impl fmt::Display for TargetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TargetKind::Entity => f.write_str("entity"),
            TargetKind::Sensor => f.write_str("sensor"),
        }
    }
}

/// Partial update for an entity; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct EntityPatch {
    pub position: Option<Vec3>,
    pub velocity: Option<Vec3>,
    pub mass: Option<f64>,
    pub friction: Option<f64>,
}

/// Partial update for a sensor; `None` fields are left untouched.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SensorPatch {
    pub offset: Option<Vec3>,
    pub noise: Option<NoiseModel>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum CommandAction {
    Enable,
    Disable,
    SetEntity(EntityPatch),
    SetSensor(SensorPatch),
}

/// A control request from a subscriber, consumed once by the driver.
#[derive(Debug, Clone, PartialEq)]
pub struct Command {
    pub target_id: String,
    pub target_kind: TargetKind,
    pub action: CommandAction,
}

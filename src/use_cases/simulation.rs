// The single-writer tick driver: physics, sampling and snapshot hand-off.

use super::commands::apply_command;
use super::hub::BroadcastHub;
use super::types::{SimEvent, SimHandle};
use crate::domain::systems::physics::{self, PhysicsConfig, StepOutcome};
use crate::domain::systems::sensors::SensorSampler;
use crate::domain::{
    Command, Entity, EntityStore, NoiseModel, Sensor, SensorKind, SimError, Snapshot, Vec3,
};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::sync::{Notify, mpsc};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

/// Configuration for spawning the simulation driver.
#[derive(Debug, Clone)]
pub struct SimSettings {
    /// Fixed tick interval; also the physics time step.
    pub tick_interval: Duration,
    /// Gravitational acceleration applied to every active entity.
    pub gravity: Vec3,
    /// Seed for sensor noise.
    pub noise_seed: u64,
    /// Capacity of the inbound event queue.
    pub event_channel_capacity: usize,
    /// Whether to start with the demo scene loaded.
    pub demo_scene: bool,
}

/// Simulation state owned by the driver task.
#[derive(Debug)]
pub struct Simulation {
    store: EntityStore,
    sensors: SensorSampler,
    physics: PhysicsConfig,
    tick: u64,
}

impl Simulation {
    pub fn new(settings: &SimSettings) -> Self {
        Self {
            store: EntityStore::new(),
            sensors: SensorSampler::new(settings.noise_seed),
            physics: PhysicsConfig {
                gravity: settings.gravity,
                dt: settings.tick_interval.as_secs_f64(),
            },
            tick: 0,
        }
    }

    pub fn tick(&self) -> u64 {
        self.tick
    }

    pub fn store(&self) -> &EntityStore {
        &self.store
    }

    pub fn sensors(&self) -> &SensorSampler {
        &self.sensors
    }

    /// Populates a small drone/robot scene with a few sensors.
    pub fn load_demo_scene(&mut self) -> Result<(), SimError> {
        let entities = [
            // Slow descent; the robots are pinned in place by full friction.
            Entity::new("Drone_Alpha", Vec3::new(0.0, 100.0, 0.0), 1.5, 0.2),
            Entity::new("robot_01", Vec3::new(0.0, 5.0, 0.0), 50.0, 1.0),
            Entity::new("robot_02", Vec3::new(2.0, 10.0, 1.0), 30.0, 1.0),
        ];
        for entity in entities {
            self.store.upsert(entity)?;
        }

        let sensors = [
            Sensor::new("LiDAR_01", "Drone_Alpha", SensorKind::Distance)
                .with_offset(Vec3::new(0.0, -0.2, 0.0))
                .with_noise(NoiseModel::uniform(0.5)),
            Sensor::new("Temp_01", "Drone_Alpha", SensorKind::Temperature)
                .with_noise(NoiseModel::gaussian(0.2)),
            Sensor::new("Baro_01", "robot_01", SensorKind::Pressure)
                .with_noise(NoiseModel::gaussian(0.05)),
        ];
        for sensor in sensors {
            self.sensors.register(sensor, &self.store)?;
        }
        Ok(())
    }

    pub fn apply(&mut self, command: &Command) -> Result<(), SimError> {
        apply_command(&mut self.store, &mut self.sensors, command)
    }

    pub fn handle_event(&mut self, event: SimEvent) {
        // A dropped reply receiver only means the caller stopped waiting.
        match event {
            SimEvent::Command { command, reply } => {
                let result = self.apply(&command);
                if let Err(e) = &result {
                    debug!(target_id = %command.target_id, error = %e, "command rejected");
                }
                let _ = reply.send(result);
            }
            SimEvent::UpsertEntity { entity, reply } => {
                let _ = reply.send(self.store.upsert(entity));
            }
            SimEvent::RemoveEntity { id, reply } => {
                let _ = reply.send(self.store.remove(&id));
            }
            SimEvent::GetEntity { id, reply } => {
                let _ = reply.send(self.store.get(&id).cloned());
            }
            SimEvent::ListEntities { reply } => {
                let entities = self.store.list().into_iter().cloned().collect();
                let _ = reply.send(Ok(entities));
            }
            SimEvent::RegisterSensor { sensor, reply } => {
                let _ = reply.send(self.sensors.register(sensor, &self.store));
            }
            SimEvent::RemoveSensor { id, reply } => {
                let _ = reply.send(self.sensors.remove(&id).map(|_| ()));
            }
        }
    }

    /// Runs one full tick and returns its snapshot.
    pub fn run_tick(&mut self, timestamp_ms: u64) -> Arc<Snapshot> {
        self.tick += 1;
        let tick = self.tick;

        if physics::advance(&mut self.store, self.physics, tick) == StepOutcome::Skipped {
            warn!(tick, "tick proceeded without physics update");
        }

        let sampled = self.sensors.sample(&self.store, tick);
        for dangling in &sampled.dangling {
            debug!(tick, error = %dangling, "sensor auto-disabled");
        }

        let snapshot = Arc::new(Snapshot {
            tick,
            timestamp_ms,
            entities: self.store.states(),
            readings: sampled.readings,
        });

        // Removals have now been reported once.
        self.store.purge_removed();
        snapshot
    }
}

pub fn now_ms() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_millis() as u64
}

/// Spawns the driver task and returns the handle used to talk to it.
pub fn spawn_simulation(
    settings: &SimSettings,
    hub: Arc<BroadcastHub>,
    shutdown: Arc<Notify>,
) -> Result<(SimHandle, JoinHandle<()>), SimError> {
    let mut sim = Simulation::new(settings);
    if settings.demo_scene {
        sim.load_demo_scene()?;
        info!(
            entities = sim.store().list().len(),
            sensors = sim.sensors().list().count(),
            "demo scene loaded"
        );
    }

    let (events_tx, events_rx) = mpsc::channel::<SimEvent>(settings.event_channel_capacity);
    let task = tokio::spawn(simulation_task(
        sim,
        events_rx,
        hub,
        settings.tick_interval,
        shutdown,
    ));
    Ok((SimHandle::new(events_tx), task))
}

pub async fn simulation_task(
    mut sim: Simulation,
    mut events_rx: mpsc::Receiver<SimEvent>,
    hub: Arc<BroadcastHub>,
    tick_interval: Duration,
    shutdown: Arc<Notify>,
) {
    // Each timer tick runs exactly one step; late ticks are delayed, not bursted.
    let mut interval = tokio::time::interval(tick_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut events_open = true;

    info!(
        tick_interval_ms = tick_interval.as_millis() as u64,
        noise_seed = sim.sensors().seed(),
        "simulation started"
    );

    loop {
        // Events are applied between ticks, never inside one.
        tokio::select! {
            _ = shutdown.notified() => {
                info!(tick = sim.tick(), "simulation shutting down");
                break;
            }
            event = events_rx.recv(), if events_open => {
                match event {
                    Some(event) => sim.handle_event(event),
                    None => {
                        debug!("event channel closed; running without inputs");
                        events_open = false;
                    }
                }
            }
            _ = interval.tick() => {
                let snapshot = sim.run_tick(now_ms());
                let report = hub.publish(snapshot);
                if !report.dropped.is_empty() {
                    debug!(
                        tick = sim.tick(),
                        dropped = report.dropped.len(),
                        "subscribers dropped during fan-out"
                    );
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{CommandAction, TargetKind};

    fn settings() -> SimSettings {
        SimSettings {
            tick_interval: Duration::from_millis(100),
            gravity: Vec3::new(0.0, -9.8, 0.0),
            noise_seed: 7,
            event_channel_capacity: 16,
            demo_scene: true,
        }
    }

    fn toggle(sensor: &str, action: CommandAction) -> Command {
        Command {
            target_id: sensor.to_string(),
            target_kind: TargetKind::Sensor,
            action,
        }
    }

    fn has_reading(snapshot: &Snapshot, sensor: &str) -> bool {
        snapshot.readings.iter().any(|r| r.sensor_id == sensor)
    }

    #[test]
    fn ticks_are_numbered_consecutively() {
        let mut sim = Simulation::new(&settings());
        sim.load_demo_scene().unwrap();
        let ticks: Vec<u64> = (0..5).map(|_| sim.run_tick(0).tick).collect();
        assert_eq!(ticks, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn disabling_sensor_mid_run_removes_then_restores_readings() {
        let mut sim = Simulation::new(&settings());
        sim.load_demo_scene().unwrap();

        assert!(has_reading(&sim.run_tick(0), "Temp_01"));

        sim.apply(&toggle("Temp_01", CommandAction::Disable)).unwrap();
        for _ in 0..3 {
            let snapshot = sim.run_tick(0);
            assert!(!has_reading(&snapshot, "Temp_01"));
            assert!(has_reading(&snapshot, "LiDAR_01"));
        }

        sim.apply(&toggle("Temp_01", CommandAction::Enable)).unwrap();
        assert!(has_reading(&sim.run_tick(0), "Temp_01"));
    }

    #[test]
    fn removed_entity_appears_once_inactive_and_sensors_stop() {
        let mut sim = Simulation::new(&settings());
        sim.load_demo_scene().unwrap();
        sim.store.remove("Drone_Alpha").unwrap();

        let first = sim.run_tick(0);
        let drone = first
            .entities
            .iter()
            .find(|e| e.id == "Drone_Alpha")
            .expect("removal should be broadcast once");
        assert!(!drone.active);
        assert!(!has_reading(&first, "LiDAR_01"));
        assert!(!sim.sensors().get("LiDAR_01").unwrap().enabled);

        let second = sim.run_tick(0);
        assert!(second.entities.iter().all(|e| e.id != "Drone_Alpha"));
        assert!(has_reading(&second, "Baro_01"));
    }

    #[test]
    fn same_seed_gives_identical_snapshots() {
        let mut a = Simulation::new(&settings());
        let mut b = Simulation::new(&settings());
        a.load_demo_scene().unwrap();
        b.load_demo_scene().unwrap();
        for _ in 0..10 {
            assert_eq!(a.run_tick(1_000), b.run_tick(1_000));
        }
    }

    #[tokio::test]
    async fn driver_applies_events_and_streams_to_subscribers() {
        let hub = BroadcastHub::new(64);
        let shutdown = Arc::new(Notify::new());
        let mut settings = settings();
        settings.tick_interval = Duration::from_millis(5);
        let (handle, task) = spawn_simulation(&settings, hub.clone(), shutdown.clone()).unwrap();

        let mut sub = hub.connect();
        hub.activate(sub.id());

        handle
            .send_command(toggle("LiDAR_01", CommandAction::Disable))
            .await
            .unwrap();
        let err = handle
            .send_command(toggle("missing", CommandAction::Disable))
            .await
            .unwrap_err();
        assert_eq!(err, SimError::sensor_not_found("missing"));

        // The command was applied between ticks, so some later snapshot lacks LiDAR.
        let mut last_tick = 0;
        let mut saw_without_lidar = false;
        for _ in 0..20 {
            let snapshot = sub.recv().await.expect("driver should keep publishing");
            assert!(snapshot.tick > last_tick);
            last_tick = snapshot.tick;
            if !has_reading(&snapshot, "LiDAR_01") {
                saw_without_lidar = true;
                break;
            }
        }
        assert!(saw_without_lidar);

        let entities = handle.list_entities().await.unwrap();
        assert_eq!(entities.len(), 3);

        shutdown.notify_one();
        task.await.unwrap();
        assert_eq!(
            handle.get_entity("Drone_Alpha".into()).await.unwrap_err(),
            SimError::Unavailable
        );
    }
}

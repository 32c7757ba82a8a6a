// Use-case level inputs into the simulation driver.

use crate::domain::{Command, Entity, Sensor, SimError};
use tokio::sync::{mpsc, oneshot};

pub type Reply<T> = oneshot::Sender<Result<T, SimError>>;

/// Requests serialized through the driver's single-writer queue.
#[derive(Debug)]
pub enum SimEvent {
    Command { command: Command, reply: Reply<()> },
    UpsertEntity { entity: Entity, reply: Reply<()> },
    RemoveEntity { id: String, reply: Reply<()> },
    GetEntity { id: String, reply: Reply<Entity> },
    ListEntities { reply: Reply<Vec<Entity>> },
    RegisterSensor { sensor: Sensor, reply: Reply<()> },
    RemoveSensor { id: String, reply: Reply<()> },
}

/// Cloneable sender side of the driver queue.
#[derive(Debug, Clone)]
pub struct SimHandle {
    events_tx: mpsc::Sender<SimEvent>,
}

impl SimHandle {
    pub fn new(events_tx: mpsc::Sender<SimEvent>) -> Self {
        Self { events_tx }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(Reply<T>) -> SimEvent,
    ) -> Result<T, SimError> {
        let (reply, response) = oneshot::channel();
        self.events_tx
            .send(make(reply))
            .await
            .map_err(|_| SimError::Unavailable)?;
        response.await.map_err(|_| SimError::Unavailable)?
    }

    pub async fn send_command(&self, command: Command) -> Result<(), SimError> {
        self.request(|reply| SimEvent::Command { command, reply })
            .await
    }

    pub async fn upsert_entity(&self, entity: Entity) -> Result<(), SimError> {
        self.request(|reply| SimEvent::UpsertEntity { entity, reply })
            .await
    }

    pub async fn remove_entity(&self, id: String) -> Result<(), SimError> {
        self.request(|reply| SimEvent::RemoveEntity { id, reply })
            .await
    }

    pub async fn get_entity(&self, id: String) -> Result<Entity, SimError> {
        self.request(|reply| SimEvent::GetEntity { id, reply }).await
    }

    pub async fn list_entities(&self) -> Result<Vec<Entity>, SimError> {
        self.request(|reply| SimEvent::ListEntities { reply }).await
    }

    pub async fn register_sensor(&self, sensor: Sensor) -> Result<(), SimError> {
        self.request(|reply| SimEvent::RegisterSensor { sensor, reply })
            .await
    }

    pub async fn remove_sensor(&self, id: String) -> Result<(), SimError> {
        self.request(|reply| SimEvent::RemoveSensor { id, reply })
            .await
    }
}

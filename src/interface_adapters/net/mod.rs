// Network adapter modules split by subscriber sockets, CRUD routes and display routes.

pub mod client;
pub mod display;
pub mod frames;
pub mod internal;

pub use client::ws_handler;
pub use display::{telemetry_channel_handler, telemetry_channels_handler};
pub use internal::{
    create_entity_handler, create_sensor_handler, delete_entity_handler, delete_sensor_handler,
    get_entity_handler, list_entities_handler,
};

pub mod physics;
pub mod sensors;

//! Systems module - ECS glue between Bevy and the ballistics engine.

pub mod debug;
pub mod simulation;

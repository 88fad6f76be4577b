//! # System Scheduling
//!
//! Systems declare dependencies by name. A [`Schedule`] groups them into
//! layers once at startup; [`run_schedule`] executes the layers in order,
//! running each layer's systems concurrently and joining them all before
//! the next layer begins.

mod executor;
mod graph;
mod state;
mod system;

pub use executor::run_schedule;
pub use graph::{topological_sort_layers, Layer, Schedule};
pub use state::SystemState;
pub use system::{FnSystem, FrameInfo, FramePhase, System, SystemContext};

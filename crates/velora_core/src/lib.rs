//! # Velora Core
//!
//! Execution core of the Velora engine: an entity-component store, a layered
//! dependency scheduler, and an executor that runs each layer of systems
//! concurrently on a tokio worker pool.
//!
//! ## Frame Model
//!
//! ```text
//! Schedule (built once)     Frame (every update)
//! ┌─────────────┐
//! │ layer 0: A  │ ──► spawn A ──► join
//! │ layer 1: B C│ ──► spawn B, C ──► join both
//! │ layer 2: D  │ ──► spawn D ──► join
//! └─────────────┘
//! ```
//!
//! Systems within a layer see the same [`Level`] and must touch disjoint
//! component types, or coordinate through the per-store locks.
//!
//! ## Example
//!
//! ```rust,ignore
//! use velora_core::{FnSystem, FrameInfo, Level, Schedule};
//!
//! let schedule = Schedule::new(&[gravity.boxed(), movement.after("Gravity").boxed()])?;
//! level.update(&schedule, FrameInfo::logic(step, tick)).await?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod ecs;
pub mod error;
pub mod level;
pub mod schedule;
pub mod sync;

pub use ecs::{
    Component, ComponentMask, ComponentRegistry, ComponentStore, ComponentTypeId, DenseStore,
    Entity, EntityRegistry, Health, Position, Velocity, MAX_COMPONENT_TYPES,
};
pub use error::{EcsError, EcsResult};
pub use level::Level;
pub use schedule::{
    run_schedule, topological_sort_layers, FnSystem, FrameInfo, FramePhase, Layer, Schedule,
    System, SystemContext, SystemState,
};
pub use sync::Strand;

/// Re-exported so systems can be declared without a direct dependency.
pub use async_trait::async_trait;

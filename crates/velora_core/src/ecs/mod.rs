//! # Entity Component System
//!
//! Storage model of the engine.
//!
//! ## Design Philosophy
//!
//! - Entities are plain identifiers; the registry tracks a membership mask per entity
//! - Each component type gets its own dense store, created on first use
//! - Mask bit positions come from one explicit, shared type registry
//! - A mask bit is set if and only if the entity has a record in that type's store

mod component;
mod entity;
mod storage;

pub use component::{Component, ComponentRegistry, ComponentTypeId, Health, Position, Velocity};
pub use entity::{ComponentMask, Entity, EntityRegistry, MAX_COMPONENT_TYPES};
pub use storage::{ComponentStore, DenseStore};

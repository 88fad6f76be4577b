//! # Component System
//!
//! Components are plain data with no behavior. Every component type carries a
//! stable string tag, and slots in the membership mask are handed out by an
//! explicit [`ComponentRegistry`] rather than by first-use statics.

use std::any::TypeId;
use std::collections::HashMap;

use bytemuck::{Pod, Zeroable};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::entity::MAX_COMPONENT_TYPES;
use crate::error::{EcsError, EcsResult};

/// Marker trait for ECS components.
///
/// Components must be:
/// - `Copy`: relocatable value data, no per-component behavior
/// - `Send + Sync`: stores are shared across worker threads
///
/// # Example
///
/// ```rust,ignore
/// #[derive(Clone, Copy, Default)]
/// struct Shield {
///     charge: f32,
/// }
///
/// impl Component for Shield {
///     const NAME: &'static str = "Shield";
/// }
/// ```
pub trait Component: Copy + Send + Sync + 'static {
    /// Stable tag for this component type.
    ///
    /// Used as the registry key and as the field name in definitions.
    const NAME: &'static str;
}

/// Slot of a component type in the membership mask.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct ComponentTypeId(u16);

impl ComponentTypeId {
    /// Returns the bit index in [`super::ComponentMask`].
    #[inline]
    #[must_use]
    pub const fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug)]
struct RegistryInner {
    by_type: HashMap<TypeId, ComponentTypeId>,
    by_name: HashMap<&'static str, ComponentTypeId>,
    names: Vec<&'static str>,
}

/// Process-scoped component type registry.
///
/// Maps each component type (by [`TypeId`] and by [`Component::NAME`]) to a
/// small integer slot, assigned in registration order. One registry is
/// shared by `Arc` between every store of a world so that bit positions are
/// consistent across levels.
#[derive(Debug)]
pub struct ComponentRegistry {
    inner: RwLock<RegistryInner>,
    limit: usize,
}

impl ComponentRegistry {
    /// Creates an empty registry with the full [`MAX_COMPONENT_TYPES`] slots.
    #[must_use]
    pub fn new() -> Self {
        Self::with_limit(MAX_COMPONENT_TYPES)
    }

    /// Creates an empty registry accepting at most `limit` types.
    ///
    /// `limit` is clamped to [`MAX_COMPONENT_TYPES`].
    #[must_use]
    pub fn with_limit(limit: usize) -> Self {
        Self {
            inner: RwLock::new(RegistryInner {
                by_type: HashMap::new(),
                by_name: HashMap::new(),
                names: Vec::new(),
            }),
            limit: limit.min(MAX_COMPONENT_TYPES),
        }
    }

    /// Registers `C`, returning its slot. Idempotent.
    ///
    /// # Errors
    ///
    /// - [`EcsError::ComponentOverflow`] if all slots are taken
    /// - [`EcsError::ComponentNameConflict`] if `C::NAME` belongs to another type
    pub fn register<C: Component>(&self) -> EcsResult<ComponentTypeId> {
        if let Some(id) = self.id_of::<C>() {
            return Ok(id);
        }

        let mut inner = self.inner.write();
        // Re-check under the write lock; another thread may have won.
        if let Some(id) = inner.by_type.get(&TypeId::of::<C>()) {
            return Ok(*id);
        }
        if inner.by_name.contains_key(C::NAME) {
            return Err(EcsError::ComponentNameConflict(C::NAME.to_string()));
        }
        let overflow = || EcsError::ComponentOverflow {
            name: C::NAME.to_string(),
            max: self.limit,
        };
        if inner.names.len() >= self.limit {
            return Err(overflow());
        }
        let slot = u16::try_from(inner.names.len()).map_err(|_| overflow())?;
        let id = ComponentTypeId(slot);
        inner.by_type.insert(TypeId::of::<C>(), id);
        inner.by_name.insert(C::NAME, id);
        inner.names.push(C::NAME);

        debug!("Registered component {} at slot {}", C::NAME, slot);
        Ok(id)
    }

    /// Returns the slot of `C`, if registered.
    #[must_use]
    pub fn id_of<C: Component>(&self) -> Option<ComponentTypeId> {
        self.inner.read().by_type.get(&TypeId::of::<C>()).copied()
    }

    /// Returns the slot registered under a tag.
    #[must_use]
    pub fn id_by_name(&self, name: &str) -> Option<ComponentTypeId> {
        self.inner.read().by_name.get(name).copied()
    }

    /// Returns the tag of a slot.
    #[must_use]
    pub fn name_of(&self, id: ComponentTypeId) -> Option<&'static str> {
        self.inner.read().names.get(id.index()).copied()
    }

    /// Number of registered component types.
    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.read().names.len()
    }

    /// Returns `true` if nothing is registered.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of types this registry accepts.
    #[must_use]
    pub const fn limit(&self) -> usize {
        self.limit
    }
}

impl Default for ComponentRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Position component for entities.
///
/// Represents a 3D position in world space.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Position {
    /// X coordinate in world space.
    pub x: f32,
    /// Y coordinate in world space.
    pub y: f32,
    /// Z coordinate in world space.
    pub z: f32,
}

impl Component for Position {
    const NAME: &'static str = "Position";
}

impl Position {
    /// Creates a new position.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    /// Linear interpolation towards `other` by `alpha`.
    #[inline]
    #[must_use]
    pub fn lerp(self, other: Self, alpha: f32) -> Self {
        Self {
            x: self.x + (other.x - self.x) * alpha,
            y: self.y + (other.y - self.y) * alpha,
            z: self.z + (other.z - self.z) * alpha,
        }
    }
}

/// Velocity component for entities.
///
/// Movement speed in world units per second.
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Velocity {
    /// X velocity component.
    pub x: f32,
    /// Y velocity component.
    pub y: f32,
    /// Z velocity component.
    pub z: f32,
}

impl Component for Velocity {
    const NAME: &'static str = "Velocity";
}

impl Velocity {
    /// Creates a new velocity.
    #[inline]
    #[must_use]
    pub const fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }
}

/// Hit points of an entity.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable, Serialize, Deserialize)]
#[repr(C)]
pub struct Health {
    /// Current health, never below zero.
    pub current: i32,
    /// Maximum health.
    pub max: i32,
}

impl Component for Health {
    const NAME: &'static str = "Health";
}

impl Health {
    /// Full health.
    #[inline]
    #[must_use]
    pub const fn full(max: i32) -> Self {
        Self { current: max, max }
    }

    /// Applies damage, saturating at zero.
    #[inline]
    pub fn damage(&mut self, amount: i32) {
        self.current = (self.current - amount).max(0);
    }

    /// Checks if health reached zero.
    #[inline]
    #[must_use]
    pub const fn is_depleted(self) -> bool {
        self.current == 0
    }
}

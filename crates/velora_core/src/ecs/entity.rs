//! # Entity Management
//!
//! Entities are opaque identifiers. All state lives in component stores; the
//! registry only tracks which component types each entity owns, as a
//! fixed-width bitmask.

use std::collections::HashMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{EcsError, EcsResult};

/// Maximum number of distinct component types in a process.
///
/// This is the width of [`ComponentMask`].
pub const MAX_COMPONENT_TYPES: usize = 256;

const MASK_WORDS: usize = MAX_COMPONENT_TYPES / 64;

/// Unique identifier for an entity.
///
/// `0` is reserved as the invalid sentinel; registries hand out identifiers
/// from a monotonically increasing counter starting at `1`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[repr(transparent)]
pub struct Entity(u32);

impl Entity {
    /// Null/invalid entity.
    pub const INVALID: Self = Self(0);

    /// Wraps a raw identifier.
    #[inline]
    #[must_use]
    pub const fn from_raw(raw: u32) -> Self {
        Self(raw)
    }

    /// Returns the raw identifier.
    #[inline]
    #[must_use]
    pub const fn raw(self) -> u32 {
        self.0
    }

    /// Checks if this is the invalid sentinel.
    #[inline]
    #[must_use]
    pub const fn is_invalid(self) -> bool {
        self.0 == 0
    }
}

impl Default for Entity {
    fn default() -> Self {
        Self::INVALID
    }
}

impl fmt::Display for Entity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Fixed-width membership bitset, one bit per component type.
///
/// Bit `i` set means the entity owns an instance of component type `i`.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct ComponentMask([u64; MASK_WORDS]);

impl ComponentMask {
    /// The empty mask.
    pub const EMPTY: Self = Self([0; MASK_WORDS]);

    /// Checks if bit `index` is set.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_COMPONENT_TYPES`.
    #[inline]
    #[must_use]
    pub fn test(&self, index: usize) -> bool {
        assert!(index < MAX_COMPONENT_TYPES, "component bit {index} out of range");
        self.0[index / 64] & (1 << (index % 64)) != 0
    }

    /// Sets bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_COMPONENT_TYPES`.
    #[inline]
    pub fn set(&mut self, index: usize) {
        assert!(index < MAX_COMPONENT_TYPES, "component bit {index} out of range");
        self.0[index / 64] |= 1 << (index % 64);
    }

    /// Clears bit `index`.
    ///
    /// # Panics
    ///
    /// Panics if `index >= MAX_COMPONENT_TYPES`.
    #[inline]
    pub fn clear(&mut self, index: usize) {
        assert!(index < MAX_COMPONENT_TYPES, "component bit {index} out of range");
        self.0[index / 64] &= !(1 << (index % 64));
    }

    /// Returns `true` if every bit of `other` is also set here.
    #[inline]
    #[must_use]
    pub fn contains_all(&self, other: &Self) -> bool {
        self.0.iter().zip(other.0.iter()).all(|(a, b)| a & b == *b)
    }

    /// Returns `true` if no bit is set.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.0.iter().all(|w| *w == 0)
    }

    /// Number of set bits.
    #[inline]
    #[must_use]
    pub fn count(&self) -> u32 {
        self.0.iter().map(|w| w.count_ones()).sum()
    }

    /// Iterates the indices of set bits in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = usize> + '_ {
        (0..MAX_COMPONENT_TYPES).filter(move |&i| self.0[i / 64] & (1 << (i % 64)) != 0)
    }
}

impl fmt::Debug for ComponentMask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.iter()).finish()
    }
}

/// Allocates entities and owns their component masks.
///
/// The registry never owns component data.
#[derive(Debug)]
pub struct EntityRegistry {
    /// Next identifier to hand out. Never reused.
    next: u32,
    /// Live entities and their membership masks.
    masks: HashMap<Entity, ComponentMask>,
}

impl EntityRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self {
            next: 1,
            masks: HashMap::new(),
        }
    }

    /// Allocates the next identifier with an empty mask.
    ///
    /// # Panics
    ///
    /// Panics if the `u32` identifier space is exhausted.
    pub fn create_entity(&mut self) -> Entity {
        let entity = Entity(self.next);
        self.next = self
            .next
            .checked_add(1)
            .expect("entity identifier space exhausted");
        self.masks.insert(entity, ComponentMask::EMPTY);
        entity
    }

    /// Removes the entity's mask.
    ///
    /// Destroying an unknown or already destroyed entity is a no-op. Returns
    /// whether the entity was live.
    pub fn destroy_entity(&mut self, entity: Entity) -> bool {
        self.masks.remove(&entity).is_some()
    }

    /// Checks if an entity is live.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.masks.contains_key(&entity)
    }

    /// Sets the membership bit for `type_index`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    ///
    /// # Panics
    ///
    /// Panics if `type_index >= MAX_COMPONENT_TYPES`.
    pub fn set_component_bit(&mut self, entity: Entity, type_index: usize) -> EcsResult<()> {
        let mask = self
            .masks
            .get_mut(&entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        mask.set(type_index);
        Ok(())
    }

    /// Clears the membership bit for `type_index`.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    ///
    /// # Panics
    ///
    /// Panics if `type_index >= MAX_COMPONENT_TYPES`.
    pub fn clear_component_bit(&mut self, entity: Entity, type_index: usize) -> EcsResult<()> {
        let mask = self
            .masks
            .get_mut(&entity)
            .ok_or(EcsError::UnknownEntity(entity))?;
        mask.clear(type_index);
        Ok(())
    }

    /// Returns the entity's mask.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    pub fn component_mask(&self, entity: Entity) -> EcsResult<ComponentMask> {
        self.masks
            .get(&entity)
            .copied()
            .ok_or(EcsError::UnknownEntity(entity))
    }

    /// Iterates live entities and their masks. Order is unspecified.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &ComponentMask)> {
        self.masks.iter().map(|(e, m)| (*e, m))
    }

    /// Copies out every `(entity, mask)` pair.
    ///
    /// Systems enumerate the snapshot while mutating component stores.
    #[must_use]
    pub fn snapshot(&self) -> Vec<(Entity, ComponentMask)> {
        self.masks.iter().map(|(e, m)| (*e, *m)).collect()
    }

    /// Number of live entities.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.masks.len()
    }

    /// Returns `true` if no entity is live.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.masks.is_empty()
    }
}

impl Default for EntityRegistry {
    fn default() -> Self {
        Self::new()
    }
}

//! # System State
//!
//! Named, typed values a system publishes for others to read: a camera
//! system's view and projection matrices, a terrain system's chunk bounds.
//! Entries are keyed by value type *and* name, so `"view"` as a `[f32; 16]`
//! and `"view"` as a `u32` are distinct.

use std::any::{Any, TypeId};
use std::collections::HashMap;

use parking_lot::RwLock;

type Key = (TypeId, String);

/// Per-system store of named plain values.
///
/// Reads and writes go through an internal lock, so a system can publish
/// from `run(&self, ..)` while downstream systems read through
/// [`crate::schedule::System::state`].
#[derive(Default)]
pub struct SystemState {
    entries: RwLock<HashMap<Key, Box<dyn Any + Send + Sync>>>,
}

impl SystemState {
    /// Creates an empty state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores `value` under `name`, returning the value it replaced.
    pub fn write<T>(&self, name: impl Into<String>, value: T) -> Option<T>
    where
        T: Copy + Send + Sync + 'static,
    {
        self.entries
            .write()
            .insert((TypeId::of::<T>(), name.into()), Box::new(value))
            .and_then(|previous| previous.downcast_ref::<T>().copied())
    }

    /// Returns a copy of the `T` stored under `name`.
    #[must_use]
    pub fn get<T>(&self, name: &str) -> Option<T>
    where
        T: Copy + Send + Sync + 'static,
    {
        self.entries
            .read()
            .get(&(TypeId::of::<T>(), name.to_owned()))
            .and_then(|value| value.downcast_ref::<T>().copied())
    }

    /// Returns `true` if a `T` is stored under `name`.
    #[must_use]
    pub fn contains<T: 'static>(&self, name: &str) -> bool {
        self.entries
            .read()
            .contains_key(&(TypeId::of::<T>(), name.to_owned()))
    }

    /// Removes the `T` stored under `name`.
    pub fn remove<T>(&self, name: &str) -> Option<T>
    where
        T: Copy + Send + Sync + 'static,
    {
        self.entries
            .write()
            .remove(&(TypeId::of::<T>(), name.to_owned()))
            .and_then(|value| value.downcast_ref::<T>().copied())
    }

    /// Number of stored entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    /// Returns `true` if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Drops every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl std::fmt::Debug for SystemState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let entries = self.entries.read();
        let mut names: Vec<&str> = entries.keys().map(|(_, name)| name.as_str()).collect();
        names.sort_unstable();
        f.debug_struct("SystemState").field("entries", &names).finish()
    }
}

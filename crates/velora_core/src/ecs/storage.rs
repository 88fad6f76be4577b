//! # Component Storage
//!
//! One dense store per component type, created lazily the first time that
//! type is added to any entity.
//!
//! The dense store uses a sparse-set layout:
//! - Values live in a contiguous array for cache-friendly iteration
//! - An entity → slot index gives O(1) lookup
//! - Removal swaps the last slot into the hole, keeping the array packed
//!
//! Every store sits behind its own lock, so systems touching disjoint
//! component types never contend with each other.

use std::any::Any;
use std::collections::HashMap;
use std::sync::Arc;

use bytemuck::Pod;
use parking_lot::RwLock;

use super::component::{Component, ComponentRegistry, ComponentTypeId};
use super::entity::{Entity, EntityRegistry};
use crate::error::{EcsError, EcsResult};

/// Dense storage for a single component type.
///
/// # Type Parameters
///
/// * `C` - The component type to store
///
/// # Example
///
/// ```rust,ignore
/// let mut store: DenseStore<Position> = DenseStore::new();
/// store.insert(entity, Position::new(1.0, 2.0, 3.0));
/// ```
#[derive(Debug, Clone)]
pub struct DenseStore<C: Component> {
    /// Entity → slot in `values`.
    slots: HashMap<Entity, usize>,
    /// Owner of each slot, parallel to `values`.
    entities: Vec<Entity>,
    /// The packed component values.
    values: Vec<C>,
}

impl<C: Component> DenseStore<C> {
    /// Creates an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self {
            slots: HashMap::new(),
            entities: Vec::new(),
            values: Vec::new(),
        }
    }

    /// Inserts or overwrites the component of `entity`.
    ///
    /// Returns the previous value, if any.
    pub fn insert(&mut self, entity: Entity, value: C) -> Option<C> {
        if let Some(&slot) = self.slots.get(&entity) {
            return Some(std::mem::replace(&mut self.values[slot], value));
        }
        self.slots.insert(entity, self.values.len());
        self.entities.push(entity);
        self.values.push(value);
        None
    }

    /// Gets the component of `entity`.
    #[inline]
    #[must_use]
    pub fn get(&self, entity: Entity) -> Option<&C> {
        self.slots.get(&entity).map(|&slot| &self.values[slot])
    }

    /// Gets the component of `entity` mutably.
    #[inline]
    pub fn get_mut(&mut self, entity: Entity) -> Option<&mut C> {
        self.slots.get(&entity).map(|&slot| &mut self.values[slot])
    }

    /// Checks if `entity` has a record here.
    #[inline]
    #[must_use]
    pub fn contains(&self, entity: Entity) -> bool {
        self.slots.contains_key(&entity)
    }

    /// Removes the component of `entity`, returning it.
    pub fn remove(&mut self, entity: Entity) -> Option<C> {
        let slot = self.slots.remove(&entity)?;
        let value = self.values.swap_remove(slot);
        self.entities.swap_remove(slot);
        if let Some(&moved) = self.entities.get(slot) {
            self.slots.insert(moved, slot);
        }
        Some(value)
    }

    /// Number of stored components.
    #[inline]
    #[must_use]
    pub fn len(&self) -> usize {
        self.values.len()
    }

    /// Returns `true` if nothing is stored.
    #[inline]
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    /// The packed values, in slot order.
    #[inline]
    #[must_use]
    pub fn values(&self) -> &[C] {
        &self.values
    }

    /// The packed values, mutably.
    #[inline]
    pub fn values_mut(&mut self) -> &mut [C] {
        &mut self.values
    }

    /// Owners of the packed values, in slot order.
    #[inline]
    #[must_use]
    pub fn entities(&self) -> &[Entity] {
        &self.entities
    }

    /// Iterates `(entity, component)` pairs in slot order.
    pub fn iter(&self) -> impl Iterator<Item = (Entity, &C)> {
        self.entities.iter().copied().zip(self.values.iter())
    }

    /// Iterates `(entity, component)` pairs mutably.
    pub fn iter_mut(&mut self) -> impl Iterator<Item = (Entity, &mut C)> {
        self.entities.iter().copied().zip(self.values.iter_mut())
    }
}

impl<C: Component + Pod> DenseStore<C> {
    /// Views the packed values as raw bytes, ready for a GPU buffer upload.
    #[inline]
    #[must_use]
    pub fn as_bytes(&self) -> &[u8] {
        bytemuck::cast_slice(&self.values)
    }
}

impl<C: Component> Default for DenseStore<C> {
    fn default() -> Self {
        Self::new()
    }
}

/// Type-erased view of a [`DenseStore`].
trait ErasedStore: Send + Sync {
    fn remove_entity(&mut self, entity: Entity) -> bool;
    fn len(&self) -> usize;
    fn as_any(&self) -> &dyn Any;
    fn as_any_mut(&mut self) -> &mut dyn Any;
}

impl<C: Component> ErasedStore for DenseStore<C> {
    fn remove_entity(&mut self, entity: Entity) -> bool {
        self.remove(entity).is_some()
    }

    fn len(&self) -> usize {
        self.len()
    }

    fn as_any(&self) -> &dyn Any {
        self
    }

    fn as_any_mut(&mut self) -> &mut dyn Any {
        self
    }
}

type SharedStore = Arc<RwLock<Box<dyn ErasedStore>>>;

/// All component stores of one level.
///
/// Owns every component instance; the [`EntityRegistry`] owns only masks.
/// Operations that change membership take the registry explicitly so the
/// mask bit and the store record always move together.
///
/// Closures passed to the `with_*`, `read` and `write` accessors run while
/// the store's lock is held. They must not re-enter the same store, and must
/// not call `Level` methods that lock the entity registry
/// (`has_component`, `component_mask`, `add_component`, `spawn_*`,
/// `destroy_entity`, `entities_*`): membership changes lock the registry
/// first and the store second, so taking them in the reverse order can
/// deadlock against a concurrent add or remove of the same type. Collect
/// what the closure needs beforehand, or act on its result afterwards.
pub struct ComponentStore {
    registry: Arc<ComponentRegistry>,
    stores: RwLock<HashMap<ComponentTypeId, SharedStore>>,
}

impl ComponentStore {
    /// Creates an empty store set bound to a shared type registry.
    #[must_use]
    pub fn new(registry: Arc<ComponentRegistry>) -> Self {
        Self {
            registry,
            stores: RwLock::new(HashMap::new()),
        }
    }

    /// The type registry deciding mask bit positions.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    fn store_of<C: Component>(&self) -> Option<SharedStore> {
        let id = self.registry.id_of::<C>()?;
        self.stores.read().get(&id).cloned()
    }

    fn store_or_create<C: Component>(&self, id: ComponentTypeId) -> SharedStore {
        if let Some(store) = self.stores.read().get(&id) {
            return Arc::clone(store);
        }
        let mut stores = self.stores.write();
        Arc::clone(stores.entry(id).or_insert_with(|| {
            Arc::new(RwLock::new(Box::new(DenseStore::<C>::new()) as Box<dyn ErasedStore>))
        }))
    }

    /// Adds (or overwrites) the component of `entity` and sets its mask bit.
    ///
    /// Registers `C` on first use if startup registration missed it.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownEntity`] if the entity is not live
    /// - [`EcsError::ComponentOverflow`] / [`EcsError::ComponentNameConflict`]
    ///   if `C` cannot be registered
    pub fn add_component<C: Component>(
        &self,
        entities: &mut EntityRegistry,
        entity: Entity,
        value: C,
    ) -> EcsResult<Option<C>> {
        if !entities.contains(entity) {
            return Err(EcsError::UnknownEntity(entity));
        }
        let id = self.registry.register::<C>()?;
        let store = self.store_or_create::<C>(id);
        let previous = typed_mut::<C>(&mut **store.write()).insert(entity, value);
        entities.set_component_bit(entity, id.index())?;
        Ok(previous)
    }

    /// Removes the component of `entity` and clears its mask bit.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    pub fn remove_component<C: Component>(
        &self,
        entities: &mut EntityRegistry,
        entity: Entity,
    ) -> EcsResult<Option<C>> {
        if !entities.contains(entity) {
            return Err(EcsError::UnknownEntity(entity));
        }
        let (Some(id), Some(store)) = (self.registry.id_of::<C>(), self.store_of::<C>()) else {
            return Ok(None);
        };
        let removed = typed_mut::<C>(&mut **store.write()).remove(entity);
        entities.clear_component_bit(entity, id.index())?;
        Ok(removed)
    }

    /// Returns a copy of the component of `entity`, or `None` if absent.
    #[must_use]
    pub fn get_component<C: Component>(&self, entity: Entity) -> Option<C> {
        self.with_component::<C, _>(entity, |c| *c)
    }

    /// Runs `f` on the component of `entity`, if present.
    pub fn with_component<C: Component, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&C) -> R,
    ) -> Option<R> {
        let store = self.store_of::<C>()?;
        let guard = store.read();
        typed::<C>(&**guard).get(entity).map(f)
    }

    /// Runs `f` on the mutable component of `entity`, if present.
    pub fn with_component_mut<C: Component, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&mut C) -> R,
    ) -> Option<R> {
        let store = self.store_of::<C>()?;
        let mut guard = store.write();
        typed_mut::<C>(&mut **guard).get_mut(entity).map(f)
    }

    /// Runs `f` over the whole store of `C`. `None` if no store exists yet.
    pub fn read<C: Component, R>(&self, f: impl FnOnce(&DenseStore<C>) -> R) -> Option<R> {
        let store = self.store_of::<C>()?;
        let guard = store.read();
        Some(f(typed::<C>(&**guard)))
    }

    /// Runs `f` over the whole store of `C` mutably. `None` if no store exists yet.
    ///
    /// Only component values may change through this path; membership
    /// changes go through [`Self::add_component`] / [`Self::remove_component`].
    pub fn write<C: Component, R>(&self, f: impl FnOnce(&mut [C], &[Entity]) -> R) -> Option<R> {
        let store = self.store_of::<C>()?;
        let mut guard = store.write();
        let dense = typed_mut::<C>(&mut **guard);
        let DenseStore {
            entities, values, ..
        } = dense;
        Some(f(values.as_mut_slice(), entities.as_slice()))
    }

    /// Removes every record of `entity` across all stores.
    ///
    /// Returns how many records were removed.
    pub fn purge_entity(&self, entity: Entity) -> usize {
        let stores: Vec<SharedStore> = self.stores.read().values().cloned().collect();
        stores
            .iter()
            .filter(|store| store.write().remove_entity(entity))
            .count()
    }

    /// Number of records stored for `C`.
    #[must_use]
    pub fn count<C: Component>(&self) -> usize {
        self.store_of::<C>().map_or(0, |store| store.read().len())
    }

    /// Number of per-type stores created so far.
    #[must_use]
    pub fn store_count(&self) -> usize {
        self.stores.read().len()
    }
}

impl std::fmt::Debug for ComponentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ComponentStore")
            .field("stores", &self.store_count())
            .field("registered_types", &self.registry.len())
            .finish()
    }
}

fn typed<C: Component>(store: &dyn ErasedStore) -> &DenseStore<C> {
    store
        .as_any()
        .downcast_ref::<DenseStore<C>>()
        .unwrap_or_else(|| panic!("store type mismatch for component {}", C::NAME))
}

fn typed_mut<C: Component>(store: &mut dyn ErasedStore) -> &mut DenseStore<C> {
    store
        .as_any_mut()
        .downcast_mut::<DenseStore<C>>()
        .unwrap_or_else(|| panic!("store type mismatch for component {}", C::NAME))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::component::{Health, Position, Velocity};

    fn setup() -> (ComponentStore, EntityRegistry) {
        let registry = Arc::new(ComponentRegistry::new());
        (ComponentStore::new(registry), EntityRegistry::new())
    }

    #[test]
    fn test_dense_store_swap_remove_keeps_index() {
        let mut store: DenseStore<Position> = DenseStore::new();
        let a = Entity::from_raw(1);
        let b = Entity::from_raw(2);
        let c = Entity::from_raw(3);
        store.insert(a, Position::new(1.0, 0.0, 0.0));
        store.insert(b, Position::new(2.0, 0.0, 0.0));
        store.insert(c, Position::new(3.0, 0.0, 0.0));

        assert_eq!(store.remove(a), Some(Position::new(1.0, 0.0, 0.0)));
        assert_eq!(store.len(), 2);
        assert_eq!(store.get(c), Some(&Position::new(3.0, 0.0, 0.0)));
        assert_eq!(store.get(b), Some(&Position::new(2.0, 0.0, 0.0)));
        assert!(store.get(a).is_none());
    }

    #[test]
    fn test_insert_overwrites() {
        let mut store: DenseStore<Health> = DenseStore::new();
        let e = Entity::from_raw(1);
        assert!(store.insert(e, Health::full(10)).is_none());
        assert_eq!(store.insert(e, Health::full(20)), Some(Health::full(10)));
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_add_sets_mask_and_value() {
        let (store, mut entities) = setup();
        let e = entities.create_entity();
        store
            .add_component(&mut entities, e, Position::new(1.0, 2.0, 3.0))
            .unwrap();

        let bit = store.registry().id_of::<Position>().unwrap().index();
        assert!(entities.component_mask(e).unwrap().test(bit));
        assert_eq!(store.get_component::<Position>(e), Some(Position::new(1.0, 2.0, 3.0)));
    }

    #[test]
    fn test_absent_component_is_none() {
        let (store, mut entities) = setup();
        let e = entities.create_entity();
        assert!(store.get_component::<Health>(e).is_none());

        store.add_component(&mut entities, e, Velocity::default()).unwrap();
        assert!(store.get_component::<Health>(e).is_none());
        assert!(store.get_component::<Health>(Entity::from_raw(7)).is_none());
    }

    #[test]
    fn test_add_to_unknown_entity_fails() {
        let (store, mut entities) = setup();
        let err = store
            .add_component(&mut entities, Entity::from_raw(42), Health::full(1))
            .unwrap_err();
        assert_eq!(err, EcsError::UnknownEntity(Entity::from_raw(42)));
        assert_eq!(store.count::<Health>(), 0);
    }

    #[test]
    fn test_remove_clears_mask() {
        let (store, mut entities) = setup();
        let e = entities.create_entity();
        store.add_component(&mut entities, e, Health::full(5)).unwrap();
        assert_eq!(
            store.remove_component::<Health>(&mut entities, e).unwrap(),
            Some(Health::full(5))
        );
        assert!(entities.component_mask(e).unwrap().is_empty());
        assert!(store.get_component::<Health>(e).is_none());
    }

    #[test]
    fn test_mutation_in_place() {
        let (store, mut entities) = setup();
        let e = entities.create_entity();
        store.add_component(&mut entities, e, Health::full(10)).unwrap();
        store.with_component_mut::<Health, _>(e, |h| h.damage(3));
        assert_eq!(store.get_component::<Health>(e).unwrap().current, 7);
    }

    #[test]
    fn test_bulk_write_and_bytes() {
        let (store, mut entities) = setup();
        for i in 0..4 {
            let e = entities.create_entity();
            #[allow(clippy::cast_precision_loss)]
            let x = i as f32;
            store.add_component(&mut entities, e, Position::new(x, 0.0, 0.0)).unwrap();
        }
        store.write::<Position, _>(|values, _| {
            for p in values {
                p.y = 1.0;
            }
        });
        let bytes = store.read::<Position, _>(|s| s.as_bytes().len()).unwrap();
        assert_eq!(bytes, 4 * std::mem::size_of::<Position>());
        assert!(store
            .read::<Position, _>(|s| s.values().iter().all(|p| (p.y - 1.0).abs() < f32::EPSILON))
            .unwrap());
    }

    #[test]
    fn test_purge_removes_every_record() {
        let (store, mut entities) = setup();
        let e = entities.create_entity();
        let other = entities.create_entity();
        store.add_component(&mut entities, e, Position::default()).unwrap();
        store.add_component(&mut entities, e, Health::full(3)).unwrap();
        store.add_component(&mut entities, other, Health::full(4)).unwrap();

        assert_eq!(store.purge_entity(e), 2);
        assert!(store.get_component::<Position>(e).is_none());
        assert_eq!(store.get_component::<Health>(other), Some(Health::full(4)));
    }

    #[test]
    fn test_shared_registry_gives_consistent_bits() {
        let registry = Arc::new(ComponentRegistry::new());
        let first = ComponentStore::new(Arc::clone(&registry));
        let second = ComponentStore::new(Arc::clone(&registry));
        let mut a = EntityRegistry::new();
        let mut b = EntityRegistry::new();
        let ea = a.create_entity();
        let eb = b.create_entity();

        first.add_component(&mut a, ea, Velocity::default()).unwrap();
        second.add_component(&mut b, eb, Health::full(1)).unwrap();
        second.add_component(&mut b, eb, Velocity::default()).unwrap();

        let bit = registry.id_of::<Velocity>().unwrap().index();
        assert!(a.component_mask(ea).unwrap().test(bit));
        assert!(b.component_mask(eb).unwrap().test(bit));
    }
}

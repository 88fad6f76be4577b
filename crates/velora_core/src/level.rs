//! # Level
//!
//! A level owns one entity registry and one set of component stores, plus a
//! bidirectional name ↔ entity index. Levels are shared by `Arc` with every
//! system task of a frame.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::{RwLock, RwLockReadGuard};
use tracing::{debug, warn};

use crate::ecs::{
    Component, ComponentMask, ComponentRegistry, ComponentStore, Entity, EntityRegistry,
};
use crate::error::{EcsError, EcsResult};
use crate::schedule::{run_schedule, FrameInfo, Schedule};

#[derive(Debug, Default)]
struct NameIndex {
    by_name: HashMap<String, Entity>,
    by_entity: HashMap<Entity, String>,
}

/// A named container of entities and their components.
///
/// # Example
///
/// ```rust,ignore
/// let level = Level::new("arena", registry);
/// let player = level.spawn_entity("player")?;
/// level.add_component(player, Health::full(100))?;
/// ```
pub struct Level {
    name: String,
    entities: RwLock<EntityRegistry>,
    components: ComponentStore,
    names: RwLock<NameIndex>,
}

impl Level {
    /// Creates an empty level bound to a shared component type registry.
    #[must_use]
    pub fn new(name: impl Into<String>, registry: Arc<ComponentRegistry>) -> Self {
        Self {
            name: name.into(),
            entities: RwLock::new(EntityRegistry::new()),
            components: ComponentStore::new(registry),
            names: RwLock::new(NameIndex::default()),
        }
    }

    /// The level's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Spawns an entity under a unique name.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateEntityName`] if the name is taken.
    pub fn spawn_entity(&self, name: impl Into<String>) -> EcsResult<Entity> {
        let name = name.into();
        let mut names = self.names.write();
        if names.by_name.contains_key(&name) {
            warn!("Entity with name {} already exists in level {}", name, self.name);
            return Err(EcsError::DuplicateEntityName(name));
        }
        let entity = self.entities.write().create_entity();
        names.by_entity.insert(entity, name.clone());
        names.by_name.insert(name, entity);
        Ok(entity)
    }

    /// Spawns an entity without a name.
    pub fn spawn_anonymous(&self) -> Entity {
        self.entities.write().create_entity()
    }

    /// Destroys an entity: its mask, every component record and its name.
    ///
    /// Unknown or already destroyed entities are ignored. Returns whether the
    /// entity was live.
    pub fn destroy_entity(&self, entity: Entity) -> bool {
        let live = self.entities.write().destroy_entity(entity);
        let purged = self.components.purge_entity(entity);
        let mut names = self.names.write();
        if let Some(name) = names.by_entity.remove(&entity) {
            names.by_name.remove(&name);
        }
        if live {
            debug!("Destroyed entity {} ({} components)", entity, purged);
        }
        live
    }

    /// Looks up an entity by name.
    #[must_use]
    pub fn entity_by_name(&self, name: &str) -> Option<Entity> {
        self.names.read().by_name.get(name).copied()
    }

    /// Looks up the name of an entity.
    #[must_use]
    pub fn name_of(&self, entity: Entity) -> Option<String> {
        self.names.read().by_entity.get(&entity).cloned()
    }

    /// Every named entity, sorted by name.
    #[must_use]
    pub fn named_entities(&self) -> Vec<(String, Entity)> {
        let mut named: Vec<(String, Entity)> = self
            .names
            .read()
            .by_name
            .iter()
            .map(|(name, entity)| (name.clone(), *entity))
            .collect();
        named.sort();
        named
    }

    /// Adds (or overwrites) a component and sets the entity's mask bit.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownEntity`] if the entity is not live
    /// - [`EcsError::ComponentOverflow`] if `C` cannot be registered
    pub fn add_component<C: Component>(&self, entity: Entity, component: C) -> EcsResult<()> {
        let mut entities = self.entities.write();
        self.components.add_component(&mut entities, entity, component)?;
        debug!("Adding component {} to entity {}", C::NAME, entity);
        Ok(())
    }

    /// Removes a component and clears the entity's mask bit.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    pub fn remove_component<C: Component>(&self, entity: Entity) -> EcsResult<Option<C>> {
        let mut entities = self.entities.write();
        self.components.remove_component(&mut entities, entity)
    }

    /// Returns a copy of a component, or `None` if absent.
    #[must_use]
    pub fn get_component<C: Component>(&self, entity: Entity) -> Option<C> {
        self.components.get_component(entity)
    }

    /// Mutates a component in place, if present.
    ///
    /// `f` runs under the store lock; it must not call back into this level
    /// (see [`ComponentStore`] for the lock order).
    pub fn with_component_mut<C: Component, R>(
        &self,
        entity: Entity,
        f: impl FnOnce(&mut C) -> R,
    ) -> Option<R> {
        self.components.with_component_mut(entity, f)
    }

    /// Tests the entity's mask for `C`.
    ///
    /// Unknown entities and unregistered types report `false`.
    #[must_use]
    pub fn has_component<C: Component>(&self, entity: Entity) -> bool {
        let Some(id) = self.components.registry().id_of::<C>() else {
            return false;
        };
        self.entities
            .read()
            .component_mask(entity)
            .is_ok_and(|mask| mask.test(id.index()))
    }

    /// Returns the entity's membership mask.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownEntity`] if the entity is not live.
    pub fn component_mask(&self, entity: Entity) -> EcsResult<ComponentMask> {
        self.entities.read().component_mask(entity)
    }

    /// Builds a mask with the bit of `C` set, if `C` is registered.
    #[must_use]
    pub fn mask_of<C: Component>(&self) -> Option<ComponentMask> {
        let id = self.components.registry().id_of::<C>()?;
        let mut mask = ComponentMask::EMPTY;
        mask.set(id.index());
        Some(mask)
    }

    /// Snapshot of every live `(entity, mask)` pair.
    #[must_use]
    pub fn entities_snapshot(&self) -> Vec<(Entity, ComponentMask)> {
        self.entities.read().snapshot()
    }

    /// Live entities whose mask contains every bit of `required`.
    #[must_use]
    pub fn entities_matching(&self, required: &ComponentMask) -> Vec<Entity> {
        self.entities
            .read()
            .iter()
            .filter(|(_, mask)| mask.contains_all(required))
            .map(|(entity, _)| entity)
            .collect()
    }

    /// Read access to the entity registry.
    ///
    /// Hold the guard briefly; never across an `.await`.
    pub fn entities(&self) -> RwLockReadGuard<'_, EntityRegistry> {
        self.entities.read()
    }

    /// The level's component stores.
    #[must_use]
    pub fn components(&self) -> &ComponentStore {
        &self.components
    }

    /// Number of live entities.
    #[must_use]
    pub fn entity_count(&self) -> usize {
        self.entities.read().len()
    }

    /// Runs every layer of `schedule` against this level.
    ///
    /// # Errors
    ///
    /// Returns the first system failure of the earliest failing layer.
    pub async fn update(self: &Arc<Self>, schedule: &Schedule, frame: FrameInfo) -> EcsResult<()> {
        run_schedule(self, schedule, frame).await
    }
}

impl std::fmt::Debug for Level {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Level")
            .field("name", &self.name)
            .field("entities", &self.entity_count())
            .field("components", &self.components)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ecs::{Health, Position};

    fn level() -> Level {
        Level::new("test", Arc::new(ComponentRegistry::new()))
    }

    #[test]
    fn test_named_spawn_and_lookup() {
        let level = level();
        let player = level.spawn_entity("player").unwrap();
        assert_eq!(level.entity_by_name("player"), Some(player));
        assert_eq!(level.name_of(player).as_deref(), Some("player"));
        assert!(level.entity_by_name("ghost").is_none());
    }

    #[test]
    fn test_duplicate_name_rejected() {
        let level = level();
        level.spawn_entity("crate").unwrap();
        assert_eq!(
            level.spawn_entity("crate"),
            Err(EcsError::DuplicateEntityName("crate".into()))
        );
        assert_eq!(level.entity_count(), 1);
    }

    #[test]
    fn test_has_component_follows_mask() {
        let level = level();
        let e = level.spawn_anonymous();
        assert!(!level.has_component::<Health>(e));
        level.add_component(e, Health::full(3)).unwrap();
        assert!(level.has_component::<Health>(e));
        assert!(!level.has_component::<Position>(e));
    }

    #[test]
    fn test_destroy_purges_everything() {
        let level = level();
        let e = level.spawn_entity("doomed").unwrap();
        level.add_component(e, Health::full(3)).unwrap();

        assert!(level.destroy_entity(e));
        assert!(level.get_component::<Health>(e).is_none());
        assert!(level.entity_by_name("doomed").is_none());
        assert!(level.component_mask(e).is_err());
        assert!(!level.destroy_entity(e));

        // The name is free again and maps to a fresh entity.
        let again = level.spawn_entity("doomed").unwrap();
        assert_ne!(again, e);
        assert!(!level.has_component::<Health>(again));
    }

    #[test]
    fn test_entities_matching() {
        let level = level();
        let a = level.spawn_anonymous();
        let b = level.spawn_anonymous();
        level.add_component(a, Health::full(1)).unwrap();
        level.add_component(a, Position::default()).unwrap();
        level.add_component(b, Position::default()).unwrap();

        let mut required = level.mask_of::<Health>().unwrap();
        required.set(level.components().registry().id_of::<Position>().unwrap().index());
        assert_eq!(level.entities_matching(&required), vec![a]);
    }

    #[test]
    fn test_snapshot_while_mutating_components() {
        let level = level();
        let entities: Vec<Entity> = (0..4).map(|_| level.spawn_anonymous()).collect();
        for (i, e) in entities.iter().enumerate() {
            let max = i32::try_from(i).unwrap() + 1;
            level.add_component(*e, Health::full(max)).unwrap();
        }

        // Enumerate the snapshot while adding, mutating and destroying.
        for (entity, mask) in level.entities_snapshot() {
            assert!(mask.test(level.components().registry().id_of::<Health>().unwrap().index()));
            level.add_component(entity, Position::default()).unwrap();
            level.with_component_mut::<Health, _>(entity, |h| h.current = 0);
            if entity == entities[1] {
                level.destroy_entity(entity);
            }
        }

        let mut live: Vec<Entity> = level.entities_snapshot().into_iter().map(|(e, _)| e).collect();
        live.sort();
        assert_eq!(live, vec![entities[0], entities[2], entities[3]]);
        for e in live {
            assert!(level.has_component::<Position>(e));
            assert_eq!(level.get_component::<Health>(e).map(|h| h.current), Some(0));
        }
        assert_eq!(level.components().count::<Health>(), 3);
    }

    #[test]
    fn test_mutation_alongside_concurrent_adds() {
        let level = Arc::new(level());
        let seeded: Vec<Entity> = (0..64).map(|_| level.spawn_anonymous()).collect();
        for e in &seeded {
            level.add_component(*e, Health::full(10)).unwrap();
        }

        let adder = {
            let level = Arc::clone(&level);
            std::thread::spawn(move || {
                for _ in 0..200 {
                    let e = level.spawn_anonymous();
                    level.add_component(e, Health::full(1)).unwrap();
                }
            })
        };

        // Mask checks happen outside the store closure, never inside it.
        for _ in 0..50 {
            for e in &seeded {
                if level.has_component::<Health>(*e) {
                    level.with_component_mut::<Health, _>(*e, |h| h.damage(1));
                }
            }
        }
        adder.join().unwrap();

        assert_eq!(level.entity_count(), 264);
        assert_eq!(level.get_component::<Health>(seeded[0]).map(|h| h.current), Some(0));
    }
}

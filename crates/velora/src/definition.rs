//! # Entity Definitions
//!
//! Name-keyed loaders and serializers that move component data between TOML
//! documents and a [`Level`]:
//!
//! ```toml
//! [entities.player.Position]
//! x = 0.0
//! y = 1.5
//! z = 0.0
//!
//! [entities.player.Health]
//! current = 100
//! max = 100
//! ```
//!
//! A loader runs only for components present in the definition; a
//! serializer runs only for components the entity has.

use std::collections::BTreeMap;
use std::path::Path;

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};
use velora_core::{Component, EcsError, EcsResult, Entity, Level};

use crate::error::{LoadError, LoadResult};

/// A decoded component waiting to be added to an entity.
type Staged = Box<dyn FnOnce(&Level, Entity) -> EcsResult<()> + Send>;
type Decoder = Box<dyn Fn(toml::Value) -> EcsResult<Staged> + Send + Sync>;
type Saver = Box<dyn Fn(&Level, Entity) -> EcsResult<Option<toml::Value>> + Send + Sync>;

struct Codec {
    decode: Decoder,
    save: Saver,
}

fn invalid(tag: &str, reason: impl std::fmt::Display) -> EcsError {
    EcsError::InvalidDefinition(format!("{tag}: {reason}"))
}

/// Component tag → (loader, serializer).
///
/// Loading is two-phase: every value of a definition is decoded before any
/// component is added, so a malformed value leaves the level untouched.
#[derive(Default)]
pub struct DefinitionRegistry {
    codecs: BTreeMap<String, Codec>,
}

impl DefinitionRegistry {
    /// Creates an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers serde-based conversions for `C` under [`Component::NAME`].
    pub fn register<C>(&mut self) -> &mut Self
    where
        C: Component + Serialize + DeserializeOwned,
    {
        self.register_with::<C, _, _>(
            C::NAME,
            |value| value.try_into().map_err(|e| invalid(C::NAME, e)),
            |component| {
                toml::Value::try_from(*component)
                    .map(Some)
                    .map_err(|e| invalid(C::NAME, e))
            },
        )
    }

    /// Registers custom conversions for `C` under `name`, replacing any
    /// previous pair.
    ///
    /// `decode` turns a definition value into the component; `encode` turns
    /// the component back into a value, or `None` to leave it out of
    /// captured definitions.
    pub fn register_with<C, D, E>(
        &mut self,
        name: impl Into<String>,
        decode: D,
        encode: E,
    ) -> &mut Self
    where
        C: Component,
        D: Fn(toml::Value) -> EcsResult<C> + Send + Sync + 'static,
        E: Fn(&C) -> EcsResult<Option<toml::Value>> + Send + Sync + 'static,
    {
        self.codecs.insert(
            name.into(),
            Codec {
                decode: Box::new(move |value| {
                    let component = decode(value)?;
                    let staged: Staged =
                        Box::new(move |level, entity| level.add_component(entity, component));
                    Ok(staged)
                }),
                save: Box::new(move |level, entity| {
                    level
                        .get_component::<C>(entity)
                        .map_or(Ok(None), |component| encode(&component))
                }),
            },
        );
        self
    }

    /// Returns `true` if a tag has conversions registered.
    #[must_use]
    pub fn contains(&self, name: &str) -> bool {
        self.codecs.contains_key(name)
    }

    /// Registered tags, sorted.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.codecs.keys().map(String::as_str)
    }

    /// Checks that every tag of `definition` is registered.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownComponent`] for the first unknown tag.
    pub fn check(&self, definition: &EntityDefinition) -> EcsResult<()> {
        match definition.components.keys().find(|tag| !self.contains(tag)) {
            Some(tag) => Err(EcsError::UnknownComponent(tag.clone())),
            None => Ok(()),
        }
    }

    /// Decodes every component of `definition` without touching a level.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponent`] for an unregistered tag
    /// - [`EcsError::InvalidDefinition`] if a value does not match its component
    fn stage(&self, definition: &EntityDefinition) -> EcsResult<Vec<Staged>> {
        self.check(definition)?;
        definition
            .components
            .iter()
            .map(|(tag, value)| {
                let codec = self
                    .codecs
                    .get(tag)
                    .ok_or_else(|| EcsError::UnknownComponent(tag.clone()))?;
                (codec.decode)(value.clone())
            })
            .collect()
    }

    /// Adds every component of `definition` to `entity`.
    ///
    /// Every value is decoded first; nothing is added unless all of them
    /// decode. Returns how many components were loaded.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponent`] for an unregistered tag
    /// - [`EcsError::InvalidDefinition`] if a value does not match its component
    /// - [`EcsError::UnknownEntity`] if the entity is not live
    pub fn load_entity(
        &self,
        level: &Level,
        entity: Entity,
        definition: &EntityDefinition,
    ) -> EcsResult<usize> {
        let staged = self.stage(definition)?;
        if level.component_mask(entity).is_err() {
            return Err(EcsError::UnknownEntity(entity));
        }
        let count = staged.len();
        for insert in staged {
            insert(level, entity)?;
        }
        Ok(count)
    }

    /// Captures every registered component `entity` has.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidDefinition`] if a component cannot be
    /// represented as TOML.
    pub fn save_entity(&self, level: &Level, entity: Entity) -> EcsResult<EntityDefinition> {
        let mut components = BTreeMap::new();
        for (tag, codec) in &self.codecs {
            if let Some(value) = (codec.save)(level, entity)? {
                components.insert(tag.clone(), value);
            }
        }
        Ok(EntityDefinition { components })
    }
}

impl std::fmt::Debug for DefinitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DefinitionRegistry")
            .field("components", &self.codecs.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Components of one entity, keyed by component tag.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct EntityDefinition {
    /// Tag → component value.
    pub components: BTreeMap<String, toml::Value>,
}

/// Named entities of one level.
#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct LevelDefinition {
    /// Entity name → its components.
    #[serde(default)]
    pub entities: BTreeMap<String, EntityDefinition>,
}

impl LevelDefinition {
    /// Parses a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] if the document is malformed.
    pub fn from_toml_str(source: &str) -> LoadResult<Self> {
        Ok(toml::from_str(source)?)
    }

    /// Renders the definition as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Serialize`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> LoadResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Reads a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] or [`LoadError::Parse`].
    pub fn load(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        Self::from_toml_str(&source)
    }

    /// Writes a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] or [`LoadError::Serialize`].
    pub fn save(&self, path: impl AsRef<Path>) -> LoadResult<()> {
        let path = path.as_ref();
        let text = self.to_toml_string()?;
        std::fs::write(path, text).map_err(|e| LoadError::io(path, e))
    }

    /// Spawns every entity of the definition into `level`.
    ///
    /// Every value is decoded and every name checked before anything is
    /// spawned. If adding a component still fails, the entities spawned so
    /// far are destroyed again. Returns the spawned entities in name order.
    ///
    /// # Errors
    ///
    /// - [`EcsError::UnknownComponent`] for an unregistered tag
    /// - [`EcsError::DuplicateEntityName`] if a name already exists in the level
    /// - [`EcsError::InvalidDefinition`] if a value does not match its component
    pub fn apply(&self, level: &Level, registry: &DefinitionRegistry) -> EcsResult<Vec<Entity>> {
        let mut staged = Vec::with_capacity(self.entities.len());
        for (name, definition) in &self.entities {
            staged.push((name, registry.stage(definition)?));
        }
        if let Some(name) = self.entities.keys().find(|name| level.entity_by_name(name).is_some()) {
            return Err(EcsError::DuplicateEntityName(name.clone()));
        }

        let mut spawned = Vec::with_capacity(staged.len());
        let result = staged.into_iter().try_for_each(|(name, inserts)| {
            let entity = level.spawn_entity(name.clone())?;
            spawned.push(entity);
            inserts.into_iter().try_for_each(|insert| insert(level, entity))
        });
        if let Err(e) = result {
            warn!("Rolling back {} entities in level {}: {}", spawned.len(), level.name(), e);
            for entity in spawned {
                level.destroy_entity(entity);
            }
            return Err(e);
        }
        debug!("Applied {} entities to level {}", spawned.len(), level.name());
        Ok(spawned)
    }

    /// Captures every named entity of `level`.
    ///
    /// Anonymous entities have no key in the document and are skipped.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidDefinition`] if a component cannot be
    /// represented as TOML.
    pub fn capture(level: &Level, registry: &DefinitionRegistry) -> EcsResult<Self> {
        let mut entities = BTreeMap::new();
        for (name, entity) in level.named_entities() {
            entities.insert(name, registry.save_entity(level, entity)?);
        }
        Ok(Self { entities })
    }
}

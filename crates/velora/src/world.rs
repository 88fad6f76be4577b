//! # World
//!
//! Owns the named levels of a game and the two scheduling domains:
//!
//! - **logic** systems, run once per fixed step
//! - **presentation** systems, run once per loop iteration with alpha
//!
//! Both schedules are computed once by [`WorldBuilder::build`]; a bad
//! dependency graph fails there, before any frame runs.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tracing::{debug, info, warn};
use velora_core::{
    Component, ComponentRegistry, ComponentTypeId, EcsError, EcsResult, FrameInfo, Level,
    Schedule, System,
};

use crate::config::EngineConfig;
use crate::game_loop::{Clock, FixedStepLoop, LoopDriver, LoopReport, SystemClock};

type Registration = fn(&ComponentRegistry) -> EcsResult<ComponentTypeId>;

/// Collects components, systems and levels, then builds a [`World`].
///
/// # Example
///
/// ```rust,ignore
/// let world = WorldBuilder::new(config)
///     .component::<Position>()
///     .logic_system(physics)
///     .presentation_system(visual)
///     .level("arena")
///     .build()?;
/// ```
pub struct WorldBuilder {
    config: EngineConfig,
    registry: Arc<ComponentRegistry>,
    components: Vec<Registration>,
    logic: Vec<Arc<dyn System>>,
    presentation: Vec<Arc<dyn System>>,
    levels: Vec<String>,
}

impl WorldBuilder {
    /// Starts a world with the given configuration and a fresh type registry.
    #[must_use]
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            registry: Arc::new(ComponentRegistry::new()),
            components: Vec::new(),
            logic: Vec::new(),
            presentation: Vec::new(),
            levels: Vec::new(),
        }
    }

    /// Uses an existing type registry instead of a fresh one.
    #[must_use]
    pub fn with_registry(mut self, registry: Arc<ComponentRegistry>) -> Self {
        self.registry = registry;
        self
    }

    /// Registers `C` at build time, fixing its mask slot in call order.
    #[must_use]
    pub fn component<C: Component>(mut self) -> Self {
        self.components.push(ComponentRegistry::register::<C>);
        self
    }

    /// Adds a system to the fixed-step logic schedule.
    #[must_use]
    pub fn logic_system(mut self, system: Arc<dyn System>) -> Self {
        self.logic.push(system);
        self
    }

    /// Adds a system to the presentation schedule.
    #[must_use]
    pub fn presentation_system(mut self, system: Arc<dyn System>) -> Self {
        self.presentation.push(system);
        self
    }

    /// Creates an empty level at build time.
    #[must_use]
    pub fn level(mut self, name: impl Into<String>) -> Self {
        self.levels.push(name.into());
        self
    }

    /// Validates the configuration, registers components, builds both
    /// schedules and creates the levels.
    ///
    /// The current level is the configured default level if one exists,
    /// otherwise the first level added.
    ///
    /// # Errors
    ///
    /// - [`EcsError::InvalidConfig`] for an invalid configuration
    /// - [`EcsError::ComponentOverflow`] / [`EcsError::ComponentNameConflict`]
    /// - [`EcsError::UnknownDependency`], [`EcsError::CycleDetected`] or
    ///   [`EcsError::DuplicateSystem`] for either schedule
    /// - [`EcsError::DuplicateLevel`] if a level name repeats
    pub fn build(self) -> EcsResult<World> {
        self.config.validate()?;
        for register in &self.components {
            register(&self.registry)?;
        }

        debug!("Building logic schedule");
        let logic = Schedule::new(&self.logic)?;
        debug!("Building presentation schedule");
        let presentation = Schedule::new(&self.presentation)?;

        let mut world = World {
            config: self.config,
            registry: self.registry,
            levels: HashMap::new(),
            current: None,
            logic,
            presentation,
        };
        for name in &self.levels {
            world.add_level(name.clone())?;
        }

        let initial = world
            .config
            .default_level
            .clone()
            .filter(|name| world.levels.contains_key(name))
            .or_else(|| self.levels.first().cloned());
        world.current = initial;

        info!(
            "World ready: {} levels, {} logic systems in {} layers, {} presentation systems in {} layers",
            world.levels.len(),
            world.logic.system_count(),
            world.logic.depth(),
            world.presentation.system_count(),
            world.presentation.depth()
        );
        Ok(world)
    }
}

/// Levels plus the logic and presentation schedules run against them.
pub struct World {
    config: EngineConfig,
    registry: Arc<ComponentRegistry>,
    levels: HashMap<String, Arc<Level>>,
    current: Option<String>,
    logic: Schedule,
    presentation: Schedule,
}

impl World {
    /// Creates an empty level.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::DuplicateLevel`] if the name is taken.
    pub fn add_level(&mut self, name: impl Into<String>) -> EcsResult<Arc<Level>> {
        let name = name.into();
        if self.levels.contains_key(&name) {
            return Err(EcsError::DuplicateLevel(name));
        }
        let level = Arc::new(Level::new(name.clone(), Arc::clone(&self.registry)));
        info!("Created level {}", name);
        self.levels.insert(name, Arc::clone(&level));
        Ok(level)
    }

    /// Removes a level. Clears the current selection if it pointed there.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownLevel`] if no level has that name.
    pub fn remove_level(&mut self, name: &str) -> EcsResult<Arc<Level>> {
        let level = self
            .levels
            .remove(name)
            .ok_or_else(|| EcsError::UnknownLevel(name.to_string()))?;
        if self.current.as_deref() == Some(name) {
            self.current = None;
        }
        Ok(level)
    }

    /// Looks up a level by name.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownLevel`] if no level has that name.
    pub fn level(&self, name: &str) -> EcsResult<Arc<Level>> {
        self.levels
            .get(name)
            .cloned()
            .ok_or_else(|| EcsError::UnknownLevel(name.to_string()))
    }

    /// Looks up a level, falling back to the configured default level.
    ///
    /// The fallback is logged as a warning.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownLevel`] if neither exists.
    pub fn resolve_level(&self, name: &str) -> EcsResult<Arc<Level>> {
        if let Some(level) = self.levels.get(name) {
            return Ok(Arc::clone(level));
        }
        let Some(default) = self.config.default_level.as_deref() else {
            return Err(EcsError::UnknownLevel(name.to_string()));
        };
        warn!("Level {} not found, falling back to {}", name, default);
        self.level(default)
    }

    /// Selects the level the schedules run against.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::UnknownLevel`] if no level has that name.
    pub fn set_current_level(&mut self, name: &str) -> EcsResult<()> {
        if !self.levels.contains_key(name) {
            return Err(EcsError::UnknownLevel(name.to_string()));
        }
        debug!("Switching current level to {}", name);
        self.current = Some(name.to_string());
        Ok(())
    }

    /// The level the schedules run against.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoCurrentLevel`] if none is selected.
    pub fn current_level(&self) -> EcsResult<Arc<Level>> {
        let name = self.current.as_deref().ok_or(EcsError::NoCurrentLevel)?;
        self.level(name)
    }

    /// Names of all levels, sorted.
    #[must_use]
    pub fn level_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.levels.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// The shared component type registry.
    #[must_use]
    pub fn registry(&self) -> &Arc<ComponentRegistry> {
        &self.registry
    }

    /// The engine configuration.
    #[must_use]
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The fixed-step schedule.
    #[must_use]
    pub fn logic_schedule(&self) -> &Schedule {
        &self.logic
    }

    /// The presentation schedule.
    #[must_use]
    pub fn presentation_schedule(&self) -> &Schedule {
        &self.presentation
    }

    /// Runs the logic schedule once on the current level.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoCurrentLevel`] or the first system failure.
    pub async fn step_logic(&self, step: Duration, tick: u64) -> EcsResult<()> {
        let level = self.current_level()?;
        level.update(&self.logic, FrameInfo::logic(step, tick)).await
    }

    /// Runs the presentation schedule once on the current level.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::NoCurrentLevel`] or the first system failure.
    pub async fn step_presentation(&self, alpha: f32, tick: u64) -> EcsResult<()> {
        let level = self.current_level()?;
        level
            .update(&self.presentation, FrameInfo::presentation(alpha, tick))
            .await
    }

    /// Drives the fixed-step loop on the wall clock while `condition` holds.
    ///
    /// Must be awaited inside a multi-threaded runtime, see
    /// [`crate::config::build_runtime`].
    ///
    /// # Errors
    ///
    /// The first system failure ends the loop and is returned.
    pub async fn run<F>(&self, condition: F) -> EcsResult<LoopReport>
    where
        F: FnMut() -> bool + Send,
    {
        self.run_with_clock(condition, SystemClock::new()).await
    }

    /// Drives the fixed-step loop on a custom clock.
    ///
    /// # Errors
    ///
    /// The first system failure ends the loop and is returned.
    pub async fn run_with_clock<F, C>(&self, condition: F, clock: C) -> EcsResult<LoopReport>
    where
        F: FnMut() -> bool + Send,
        C: Clock,
    {
        let mut game_loop = FixedStepLoop::with_clock(self.config.loop_config(), clock);
        let mut driver = WorldDriver {
            world: self,
            condition,
        };
        game_loop.run(&mut driver).await
    }
}

impl std::fmt::Debug for World {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("World")
            .field("levels", &self.level_names())
            .field("current", &self.current)
            .field("logic", &self.logic)
            .field("presentation", &self.presentation)
            .finish_non_exhaustive()
    }
}

struct WorldDriver<'w, F> {
    world: &'w World,
    condition: F,
}

#[async_trait]
impl<'w, F> LoopDriver for WorldDriver<'w, F>
where
    F: FnMut() -> bool + Send,
{
    fn condition(&mut self) -> bool {
        (self.condition)()
    }

    async fn logic(&mut self, step: Duration, tick: u64) -> EcsResult<()> {
        self.world.step_logic(step, tick).await
    }

    async fn priority(&mut self, alpha: f32, tick: u64) -> EcsResult<()> {
        self.world.step_presentation(alpha, tick).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use velora_core::{FnSystem, Position, Velocity};

    fn config_with_default(default: Option<&str>) -> EngineConfig {
        EngineConfig {
            default_level: default.map(str::to_string),
            ..EngineConfig::default()
        }
    }

    #[test]
    fn test_component_slots_follow_registration_order() {
        let world = WorldBuilder::new(EngineConfig::default())
            .component::<Velocity>()
            .component::<Position>()
            .build()
            .unwrap();
        assert_eq!(world.registry().id_of::<Velocity>().unwrap().index(), 0);
        assert_eq!(world.registry().id_of::<Position>().unwrap().index(), 1);
    }

    #[test]
    fn test_bad_graph_fails_build() {
        let visual = FnSystem::new("Visual", |_ctx| std::future::ready(Ok::<(), EcsError>(())))
            .after("Transform")
            .boxed();
        let err = WorldBuilder::new(EngineConfig::default())
            .presentation_system(visual)
            .build()
            .unwrap_err();
        assert!(err.is_configuration());
        assert!(matches!(err, EcsError::UnknownDependency { .. }));
    }

    #[test]
    fn test_domains_are_scheduled_separately() {
        // Same name in both domains is fine; dependencies do not cross.
        let noop = || FnSystem::new("Sync", |_ctx| std::future::ready(Ok::<(), EcsError>(())));
        let world = WorldBuilder::new(EngineConfig::default())
            .logic_system(noop().boxed())
            .presentation_system(noop().boxed())
            .build()
            .unwrap();
        assert_eq!(world.logic_schedule().system_count(), 1);
        assert_eq!(world.presentation_schedule().system_count(), 1);
    }

    #[test]
    fn test_level_selection() {
        let mut world = WorldBuilder::new(config_with_default(Some("hub")))
            .level("arena")
            .level("hub")
            .build()
            .unwrap();
        assert_eq!(world.current_level().unwrap().name(), "hub");

        world.set_current_level("arena").unwrap();
        assert_eq!(world.current_level().unwrap().name(), "arena");
        assert_eq!(
            world.set_current_level("void"),
            Err(EcsError::UnknownLevel("void".into()))
        );
        assert_eq!(world.level_names(), vec!["arena", "hub"]);
    }

    #[test]
    fn test_first_level_is_current_without_default() {
        let world = WorldBuilder::new(EngineConfig::default())
            .level("intro")
            .level("arena")
            .build()
            .unwrap();
        assert_eq!(world.current_level().unwrap().name(), "intro");
    }

    #[test]
    fn test_resolve_falls_back_to_default() {
        let world = WorldBuilder::new(config_with_default(Some("hub")))
            .level("hub")
            .build()
            .unwrap();
        assert_eq!(world.resolve_level("missing").unwrap().name(), "hub");

        let strict = WorldBuilder::new(EngineConfig::default())
            .level("hub")
            .build()
            .unwrap();
        assert_eq!(
            strict.resolve_level("missing").unwrap_err(),
            EcsError::UnknownLevel("missing".into())
        );
    }

    #[test]
    fn test_duplicate_level_rejected() {
        let err = WorldBuilder::new(EngineConfig::default())
            .level("arena")
            .level("arena")
            .build()
            .unwrap_err();
        assert_eq!(err, EcsError::DuplicateLevel("arena".into()));
    }

    #[test]
    fn test_removing_current_level_clears_selection() {
        let mut world = WorldBuilder::new(EngineConfig::default())
            .level("arena")
            .build()
            .unwrap();
        world.remove_level("arena").unwrap();
        assert_eq!(world.current_level().unwrap_err(), EcsError::NoCurrentLevel);
    }

    #[tokio::test]
    async fn test_step_without_level_fails() {
        let world = WorldBuilder::new(EngineConfig::default()).build().unwrap();
        assert_eq!(
            world.step_logic(Duration::from_millis(33), 0).await,
            Err(EcsError::NoCurrentLevel)
        );
    }
}

//! # Velora
//!
//! Engine front of Velora: configuration, the fixed-step game loop, the
//! world of named levels, and TOML level definitions.
//!
//! ## Startup
//!
//! ```rust,ignore
//! use velora::{build_runtime, EngineConfig, WorldBuilder};
//!
//! let config = EngineConfig::load("velora.toml")?;
//! let runtime = build_runtime(&config)?;
//! let world = WorldBuilder::new(config)
//!     .component::<Position>()
//!     .logic_system(physics)
//!     .presentation_system(visual)
//!     .level("arena")
//!     .build()?;
//!
//! runtime.block_on(world.run(|| window.is_open()))?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod config;
pub mod definition;
pub mod error;
pub mod game_loop;
pub mod world;

pub use config::{build_runtime, EngineConfig};
pub use definition::{DefinitionRegistry, EntityDefinition, LevelDefinition};
pub use error::{LoadError, LoadResult};
pub use game_loop::{
    Clock, FixedStepLoop, FixedStepState, LoopConfig, LoopDriver, LoopPhase, LoopReport,
    ManualClock, SystemClock,
};
pub use world::{World, WorldBuilder};

pub use velora_core::{
    async_trait, Component, ComponentRegistry, EcsError, EcsResult, Entity, FnSystem, FrameInfo,
    FramePhase, Health, Level, Position, Schedule, Strand, System, SystemContext, SystemState,
    Velocity,
};

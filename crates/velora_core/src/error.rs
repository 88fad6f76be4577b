//! # Engine Error Types
//!
//! All recoverable errors surfaced by the execution core.
//!
//! Contract violations (a mask bit outside the fixed width, a store whose
//! concrete type does not match its registered type) are not represented
//! here: they are programming errors and panic.

use thiserror::Error;

use crate::ecs::Entity;

/// Errors that can occur in the execution core.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EcsError {
    // =========================================================================
    // Configuration errors - fatal at schedule construction
    // =========================================================================
    /// A system declared a dependency that names no registered system.
    #[error("unknown dependency: system `{system}` depends on `{dependency}`")]
    UnknownDependency {
        /// The system declaring the dependency.
        system: String,
        /// The dependency name that matched nothing.
        dependency: String,
    },

    /// The dependency graph is not a DAG.
    #[error("cycle detected in system dependencies among {systems:?}")]
    CycleDetected {
        /// Systems that could not be placed in any layer.
        systems: Vec<String>,
    },

    /// Two systems in the same scheduling domain share a name.
    #[error("duplicate system name: {0}")]
    DuplicateSystem(String),

    /// More distinct component types than the mask can represent.
    #[error("component type overflow registering `{name}`: maximum is {max}")]
    ComponentOverflow {
        /// The component tag that did not fit.
        name: String,
        /// The fixed maximum.
        max: usize,
    },

    /// A component tag was registered twice for two different Rust types.
    #[error("component name `{0}` already registered for a different type")]
    ComponentNameConflict(String),

    /// Invalid engine configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    // =========================================================================
    // Lookup errors
    // =========================================================================
    /// Entity not known to the registry.
    #[error("entity not found: {0}")]
    UnknownEntity(Entity),

    /// Level name not known to the world.
    #[error("level not found: {0}")]
    UnknownLevel(String),

    /// A level with this name already exists.
    #[error("level already exists: {0}")]
    DuplicateLevel(String),

    /// System name not known to a schedule.
    #[error("system not found: {0}")]
    UnknownSystem(String),

    /// Component tag not known to a registry.
    #[error("component not found: {0}")]
    UnknownComponent(String),

    /// An entity with this name already exists in the level.
    #[error("entity name already in use: {0}")]
    DuplicateEntityName(String),

    /// The world has no current level to run against.
    #[error("no current level selected")]
    NoCurrentLevel,

    /// An entity or level definition could not be applied.
    #[error("invalid definition: {0}")]
    InvalidDefinition(String),

    // =========================================================================
    // Runtime task failures - propagated out of the frame, never retried
    // =========================================================================
    /// A system returned an error from its run.
    #[error("system `{system}` failed: {reason}")]
    SystemFailed {
        /// The failing system.
        system: String,
        /// Failure description.
        reason: String,
    },

    /// A system task panicked or was aborted.
    #[error("system `{system}` panicked")]
    SystemPanicked {
        /// The panicking system.
        system: String,
    },

    /// A strand's worker task is gone.
    #[error("strand `{0}` is closed")]
    StrandClosed(String),
}

/// Result type for engine operations.
pub type EcsResult<T> = Result<T, EcsError>;

impl EcsError {
    /// Returns `true` for errors that must abort startup.
    #[must_use]
    pub const fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::UnknownDependency { .. }
                | Self::CycleDetected { .. }
                | Self::DuplicateSystem(_)
                | Self::ComponentOverflow { .. }
                | Self::ComponentNameConflict(_)
                | Self::InvalidConfig(_)
        )
    }
}

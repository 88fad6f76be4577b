//! # Systems
//!
//! A system is a named unit of behavior that declares, by name, the systems
//! it must run after. Execution is asynchronous: a system may suspend while
//! awaiting an external resource (a renderer upload, an OS event) without
//! blocking its siblings in the same layer.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::error::EcsResult;
use crate::level::Level;
use crate::schedule::SystemState;

/// Which update of the game loop a frame belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum FramePhase {
    /// Fixed-rate simulation update.
    Logic,
    /// Variable-rate presentation update.
    Presentation,
}

/// Timing information handed to every system of a frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct FrameInfo {
    /// The update this frame belongs to.
    pub phase: FramePhase,
    /// Fixed step duration for logic frames, zero for presentation frames.
    pub delta: Duration,
    /// Simulation tick the frame runs at.
    pub tick: u64,
    /// Interpolation factor in `[0, 1]`; zero for logic frames.
    pub alpha: f32,
}

impl FrameInfo {
    /// A fixed-step logic frame.
    #[must_use]
    pub const fn logic(delta: Duration, tick: u64) -> Self {
        Self {
            phase: FramePhase::Logic,
            delta,
            tick,
            alpha: 0.0,
        }
    }

    /// A presentation frame with interpolation factor `alpha`.
    #[must_use]
    pub const fn presentation(alpha: f32, tick: u64) -> Self {
        Self {
            phase: FramePhase::Presentation,
            delta: Duration::ZERO,
            tick,
            alpha,
        }
    }
}

/// Everything a system receives when it runs.
#[derive(Clone, Debug)]
pub struct SystemContext {
    level: Arc<Level>,
    frame: FrameInfo,
}

impl SystemContext {
    /// Creates a context for one system run.
    #[must_use]
    pub fn new(level: Arc<Level>, frame: FrameInfo) -> Self {
        Self { level, frame }
    }

    /// The level the system runs against.
    #[must_use]
    pub fn level(&self) -> &Arc<Level> {
        &self.level
    }

    /// Timing of the current frame.
    #[must_use]
    pub const fn frame(&self) -> FrameInfo {
        self.frame
    }
}

/// A unit of behavior run once per update of its scheduling domain.
///
/// Systems are constructed once and live as long as their schedule. Names
/// must be unique within a schedule; dependencies name other systems of the
/// same schedule.
///
/// A system whose private state can be reached from outside the frame (an
/// input queue fed by OS callbacks, for instance) must serialize that state
/// itself, e.g. through a [`crate::sync::Strand`]. The executor never
/// serializes calls into one system.
#[async_trait]
pub trait System: Send + Sync + 'static {
    /// Unique name of the system.
    fn name(&self) -> &str;

    /// Names of the systems that must complete before this one runs.
    fn dependencies(&self) -> Vec<&str> {
        Vec::new()
    }

    /// Executes the system against the context's level.
    async fn run(&self, ctx: SystemContext) -> EcsResult<()>;

    /// Values this system publishes for other systems, if any.
    ///
    /// Readers in later layers see what was written in earlier layers of the
    /// same frame.
    fn state(&self) -> Option<&SystemState> {
        None
    }
}

/// A [`System`] backed by an async closure.
///
/// ```rust,ignore
/// let gravity = FnSystem::new("Gravity", |ctx: SystemContext| async move {
///     ctx.level().components().write::<Velocity, _>(|values, _| {
///         for v in values {
///             v.y -= 9.81 * ctx.frame().delta.as_secs_f32();
///         }
///     });
///     Ok(())
/// })
/// .after("Input");
/// ```
pub struct FnSystem<F> {
    name: String,
    dependencies: Vec<String>,
    state: Option<Arc<SystemState>>,
    f: F,
}

impl<F, Fut> FnSystem<F>
where
    F: Fn(SystemContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EcsResult<()>> + Send + 'static,
{
    /// Creates a function-backed system without dependencies.
    pub fn new(name: impl Into<String>, f: F) -> Self {
        Self {
            name: name.into(),
            dependencies: Vec::new(),
            state: None,
            f,
        }
    }

    /// Exposes `state` through [`System::state`].
    ///
    /// The closure captures a clone of the same `Arc` to publish into it.
    #[must_use]
    pub fn with_state(mut self, state: Arc<SystemState>) -> Self {
        self.state = Some(state);
        self
    }

    /// Adds a dependency on the system named `dependency`.
    #[must_use]
    pub fn after(mut self, dependency: impl Into<String>) -> Self {
        self.dependencies.push(dependency.into());
        self
    }

    /// Wraps the system for a schedule.
    #[must_use]
    pub fn boxed(self) -> Arc<dyn System> {
        Arc::new(self)
    }
}

#[async_trait]
impl<F, Fut> System for FnSystem<F>
where
    F: Fn(SystemContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = EcsResult<()>> + Send + 'static,
{
    fn name(&self) -> &str {
        &self.name
    }

    fn dependencies(&self) -> Vec<&str> {
        self.dependencies.iter().map(String::as_str).collect()
    }

    async fn run(&self, ctx: SystemContext) -> EcsResult<()> {
        (self.f)(ctx).await
    }

    fn state(&self) -> Option<&SystemState> {
        self.state.as_deref()
    }
}

impl<F> std::fmt::Debug for FnSystem<F> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FnSystem")
            .field("name", &self.name)
            .field("dependencies", &self.dependencies)
            .field("state", &self.state)
            .finish_non_exhaustive()
    }
}

//! # Engine Configuration
//!
//! Loaded once at startup from TOML. Every field is optional in the file and
//! falls back to its default:
//!
//! ```toml
//! fixed_step_ms = 33.333       # 30 Hz logic
//! max_accumulated_ms = 25.0    # spiral-of-death ceiling per iteration
//! alpha_smoothing = 0.5        # weight of the newest raw alpha
//! worker_threads = 4
//! default_level = "main_menu"
//! ```

use std::path::Path;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tokio::runtime::{Builder, Runtime};
use tracing::debug;
use velora_core::{EcsError, EcsResult};

use crate::error::{LoadError, LoadResult};
use crate::game_loop::LoopConfig;

/// Default logic step: 30 updates per second.
pub const DEFAULT_FIXED_STEP_MS: f64 = 1000.0 / 30.0;

/// Default cap on time accumulated per loop iteration.
pub const DEFAULT_MAX_ACCUMULATED_MS: f64 = 25.0;

/// Default alpha smoothing weight.
pub const DEFAULT_ALPHA_SMOOTHING: f32 = 0.5;

/// Default size of the shared worker pool.
pub const DEFAULT_WORKER_THREADS: usize = 4;

/// Engine-wide settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct EngineConfig {
    /// Duration of one logic update, in milliseconds.
    pub fixed_step_ms: f64,
    /// Maximum wall-clock time added to the accumulator per iteration, in milliseconds.
    pub max_accumulated_ms: f64,
    /// Exponential smoothing weight applied to the interpolation factor.
    pub alpha_smoothing: f32,
    /// Worker threads of the shared runtime.
    pub worker_threads: usize,
    /// Level used when a requested level does not exist.
    pub default_level: Option<String>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            fixed_step_ms: DEFAULT_FIXED_STEP_MS,
            max_accumulated_ms: DEFAULT_MAX_ACCUMULATED_MS,
            alpha_smoothing: DEFAULT_ALPHA_SMOOTHING,
            worker_threads: DEFAULT_WORKER_THREADS,
            default_level: None,
        }
    }
}

impl EngineConfig {
    /// Parses and validates a TOML document.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Parse`] for malformed TOML and
    /// [`LoadError::Engine`] if validation fails.
    pub fn from_toml_str(source: &str) -> LoadResult<Self> {
        let config: Self = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a TOML file.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Io`] if the file cannot be read, otherwise as
    /// [`Self::from_toml_str`].
    pub fn load(path: impl AsRef<Path>) -> LoadResult<Self> {
        let path = path.as_ref();
        let source = std::fs::read_to_string(path).map_err(|e| LoadError::io(path, e))?;
        let config = Self::from_toml_str(&source)?;
        debug!("Loaded engine configuration from {}", path.display());
        Ok(config)
    }

    /// Renders the configuration as TOML.
    ///
    /// # Errors
    ///
    /// Returns [`LoadError::Serialize`] if a value cannot be represented.
    pub fn to_toml_string(&self) -> LoadResult<String> {
        Ok(toml::to_string(self)?)
    }

    /// Checks every field against its allowed range.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::InvalidConfig`] naming the first offending field.
    pub fn validate(&self) -> EcsResult<()> {
        if !self.fixed_step_ms.is_finite() || self.fixed_step_ms <= 0.0 {
            return Err(EcsError::InvalidConfig(format!(
                "fixed_step_ms must be positive, got {}",
                self.fixed_step_ms
            )));
        }
        if !self.max_accumulated_ms.is_finite() || self.max_accumulated_ms < 0.0 {
            return Err(EcsError::InvalidConfig(format!(
                "max_accumulated_ms must be non-negative, got {}",
                self.max_accumulated_ms
            )));
        }
        if !(0.0..=1.0).contains(&self.alpha_smoothing) {
            return Err(EcsError::InvalidConfig(format!(
                "alpha_smoothing must be within [0, 1], got {}",
                self.alpha_smoothing
            )));
        }
        if self.worker_threads == 0 {
            return Err(EcsError::InvalidConfig(
                "worker_threads must be at least 1".to_string(),
            ));
        }
        if self.default_level.as_deref() == Some("") {
            return Err(EcsError::InvalidConfig(
                "default_level must not be empty".to_string(),
            ));
        }
        Ok(())
    }

    /// Fixed step as a [`Duration`].
    #[must_use]
    pub fn fixed_step(&self) -> Duration {
        millis_to_duration(self.fixed_step_ms)
    }

    /// Accumulation ceiling as a [`Duration`].
    #[must_use]
    pub fn max_accumulated(&self) -> Duration {
        millis_to_duration(self.max_accumulated_ms)
    }

    /// Loop parameters derived from this configuration.
    #[must_use]
    pub fn loop_config(&self) -> LoopConfig {
        LoopConfig {
            fixed_step: self.fixed_step(),
            max_accumulated: self.max_accumulated(),
            alpha_smoothing: self.alpha_smoothing.clamp(0.0, 1.0),
        }
    }
}

/// Converts milliseconds to a whole number of nanoseconds.
///
/// Negative and non-finite inputs map to zero.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
fn millis_to_duration(ms: f64) -> Duration {
    if !ms.is_finite() || ms <= 0.0 {
        return Duration::ZERO;
    }
    Duration::from_nanos((ms * 1_000_000.0).round() as u64)
}

/// Builds the shared multi-threaded runtime all systems execute on.
///
/// # Errors
///
/// Returns [`EcsError::InvalidConfig`] if the configuration is invalid or
/// the worker pool cannot be started.
pub fn build_runtime(config: &EngineConfig) -> EcsResult<Runtime> {
    config.validate()?;
    let runtime = Builder::new_multi_thread()
        .worker_threads(config.worker_threads)
        .thread_name("velora-worker")
        .enable_time()
        .build()
        .map_err(|e| EcsError::InvalidConfig(format!("failed to start worker pool: {e}")))?;
    debug!("Started runtime with {} workers", config.worker_threads);
    Ok(runtime)
}

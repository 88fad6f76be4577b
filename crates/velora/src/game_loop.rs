//! # Fixed-Step Game Loop
//!
//! Decouples simulation rate from presentation rate:
//!
//! ```text
//! iteration:
//! ┌──────────────────────────────────────────────────────────────┐
//! │ 1. ACCUMULATE   lag += min(elapsed, max_accumulated)         │
//! │ 2. FIXED UPDATE while lag >= step { logic(step); tick += 1 } │
//! │ 3. INTERPOLATE  alpha = smooth(clamp(lag / step, 0, 1))      │
//! │                 priority(alpha)  (exactly once)              │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! The ceiling on accumulated time keeps a stall (debugger pause, window
//! drag) from turning into an ever-growing backlog of logic updates.
//!
//! The loop body runs on the task that awaits [`FixedStepLoop::run`] and
//! borrows the loop mutably, so it never overlaps with itself even on a
//! multi-threaded runtime.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use parking_lot::Mutex;
use tracing::debug;
use velora_core::EcsResult;

// =============================================================================
// CONFIGURATION
// =============================================================================

/// Parameters of the fixed-step loop, fixed at construction.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LoopConfig {
    /// Duration handed to every logic update.
    pub fixed_step: Duration,
    /// Maximum elapsed time accumulated per iteration.
    pub max_accumulated: Duration,
    /// Weight of the newest raw alpha in `[0, 1]`; `1.0` disables smoothing.
    pub alpha_smoothing: f32,
}

impl Default for LoopConfig {
    fn default() -> Self {
        Self {
            fixed_step: Duration::from_nanos(33_333_333),
            max_accumulated: Duration::from_millis(25),
            alpha_smoothing: 0.5,
        }
    }
}

// =============================================================================
// ACCUMULATOR
// =============================================================================

/// Clock-free accumulator state of the loop.
///
/// Time is fed in explicitly, which makes the stepping arithmetic testable
/// without a clock.
#[derive(Clone, Debug)]
pub struct FixedStepState {
    config: LoopConfig,
    lag: Duration,
    tick: u64,
    alpha: f32,
}

impl FixedStepState {
    /// Creates an empty accumulator.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        Self {
            config,
            lag: Duration::ZERO,
            tick: 0,
            alpha: 0.0,
        }
    }

    /// Adds elapsed time, clamped to the accumulation ceiling.
    ///
    /// Returns the amount actually added.
    pub fn accumulate(&mut self, elapsed: Duration) -> Duration {
        let added = elapsed.min(self.config.max_accumulated);
        self.lag += added;
        added
    }

    /// Returns `true` while a whole fixed step is pending.
    ///
    /// A zero step never becomes due.
    #[must_use]
    pub fn step_due(&self) -> bool {
        !self.config.fixed_step.is_zero() && self.lag >= self.config.fixed_step
    }

    /// Consumes one fixed step after its logic update completed.
    pub fn complete_step(&mut self) {
        self.lag = self.lag.saturating_sub(self.config.fixed_step);
        self.tick += 1;
    }

    /// Raw interpolation factor: `lag / step` clamped to `[0, 1]`.
    ///
    /// A degenerate ratio (zero step) yields `0`.
    #[must_use]
    #[allow(clippy::cast_possible_truncation)]
    pub fn raw_alpha(&self) -> f32 {
        let ratio = self.lag.as_secs_f64() / self.config.fixed_step.as_secs_f64();
        if ratio.is_finite() {
            ratio.clamp(0.0, 1.0) as f32
        } else {
            0.0
        }
    }

    /// Computes the smoothed interpolation factor and remembers it.
    ///
    /// `alpha = previous + (raw - previous) * smoothing`, always in `[0, 1]`.
    pub fn interpolate(&mut self) -> f32 {
        let raw = self.raw_alpha();
        let smoothed = self.alpha + (raw - self.alpha) * self.config.alpha_smoothing;
        self.alpha = if smoothed.is_nan() {
            0.0
        } else {
            smoothed.clamp(0.0, 1.0)
        };
        self.alpha
    }

    /// Forgets the smoothing history.
    pub fn reset_alpha(&mut self) {
        self.alpha = 0.0;
    }

    /// Pending, not yet simulated time.
    #[must_use]
    pub const fn lag(&self) -> Duration {
        self.lag
    }

    /// Completed logic updates.
    #[must_use]
    pub const fn tick(&self) -> u64 {
        self.tick
    }

    /// Last smoothed alpha.
    #[must_use]
    pub const fn alpha(&self) -> f32 {
        self.alpha
    }

    /// The loop parameters.
    #[must_use]
    pub const fn config(&self) -> &LoopConfig {
        &self.config
    }
}

// =============================================================================
// CLOCKS
// =============================================================================

/// Monotonic time source of the loop.
pub trait Clock: Send + Sync {
    /// Time elapsed since the clock's origin.
    fn now(&self) -> Duration;
}

/// Wall clock backed by [`Instant`].
#[derive(Clone, Copy, Debug)]
pub struct SystemClock {
    origin: Instant,
}

impl SystemClock {
    /// A clock whose origin is now.
    #[must_use]
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Manually advanced clock for deterministic runs.
///
/// Clones share the same time.
#[derive(Clone, Debug, Default)]
pub struct ManualClock {
    now: Arc<Mutex<Duration>>,
}

impl ManualClock {
    /// A clock at time zero.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Moves time forward by `delta`.
    pub fn advance(&self, delta: Duration) {
        *self.now.lock() += delta;
    }
}

impl Clock for ManualClock {
    fn now(&self) -> Duration {
        *self.now.lock()
    }
}

// =============================================================================
// LOOP
// =============================================================================

/// Lifecycle of a [`FixedStepLoop`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum LoopPhase {
    /// Constructed, never run.
    Idle,
    /// Iterating while the condition holds.
    Running,
    /// Condition turned false; finishing the last iteration.
    Draining,
    /// Returned to the caller, normally or with an error.
    Stopped,
}

/// The callbacks driven by the loop.
#[async_trait]
pub trait LoopDriver: Send {
    /// Checked once before every iteration; `false` ends the loop.
    fn condition(&mut self) -> bool;

    /// One fixed-step logic update. `tick` is the tick being simulated.
    async fn logic(&mut self, step: Duration, tick: u64) -> EcsResult<()>;

    /// One presentation update per iteration with the smoothed alpha.
    async fn priority(&mut self, alpha: f32, tick: u64) -> EcsResult<()>;
}

/// Summary of one [`FixedStepLoop::run`].
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct LoopReport {
    /// Logic updates executed.
    pub ticks: u64,
    /// Loop iterations (presentation updates) executed.
    pub iterations: u64,
    /// Clock time spent inside logic updates.
    pub logic_time: Duration,
    /// Clock time spent inside presentation updates.
    pub priority_time: Duration,
}

/// Fixed-step loop reading time from a [`Clock`].
#[derive(Debug)]
pub struct FixedStepLoop<C: Clock = SystemClock> {
    state: FixedStepState,
    clock: C,
    phase: LoopPhase,
}

impl FixedStepLoop<SystemClock> {
    /// A loop on the wall clock.
    #[must_use]
    pub fn new(config: LoopConfig) -> Self {
        Self::with_clock(config, SystemClock::new())
    }
}

impl<C: Clock> FixedStepLoop<C> {
    /// A loop on a custom clock.
    #[must_use]
    pub fn with_clock(config: LoopConfig, clock: C) -> Self {
        Self {
            state: FixedStepState::new(config),
            clock,
            phase: LoopPhase::Idle,
        }
    }

    /// Current lifecycle phase.
    #[must_use]
    pub const fn phase(&self) -> LoopPhase {
        self.phase
    }

    /// Accumulator state.
    #[must_use]
    pub const fn state(&self) -> &FixedStepState {
        &self.state
    }

    /// Runs until `driver.condition()` returns `false`.
    ///
    /// Lag and the tick counter carry over between runs; the alpha
    /// smoothing history restarts at zero.
    ///
    /// # Errors
    ///
    /// The first error returned by a logic or priority update ends the loop
    /// and is returned unchanged. The loop is then [`LoopPhase::Stopped`].
    pub async fn run<D>(&mut self, driver: &mut D) -> EcsResult<LoopReport>
    where
        D: LoopDriver + ?Sized,
    {
        self.phase = LoopPhase::Running;
        debug!("Fixed step loop started");

        let result = self.iterate(driver).await;

        if result.is_ok() {
            self.phase = LoopPhase::Draining;
            // Let work queued by the last iteration run before returning.
            tokio::task::yield_now().await;
        }
        self.phase = LoopPhase::Stopped;

        match &result {
            Ok(report) => debug!(
                "Fixed step loop ended after {} iterations, {} ticks",
                report.iterations, report.ticks
            ),
            Err(err) => debug!("Fixed step loop aborted: {}", err),
        }
        result
    }

    async fn iterate<D>(&mut self, driver: &mut D) -> EcsResult<LoopReport>
    where
        D: LoopDriver + ?Sized,
    {
        let mut report = LoopReport::default();
        let step = self.state.config().fixed_step;
        self.state.reset_alpha();
        let mut last = self.clock.now();

        while driver.condition() {
            let now = self.clock.now();
            self.state.accumulate(now.saturating_sub(last));
            last = now;

            let logic_start = self.clock.now();
            while self.state.step_due() {
                driver.logic(step, self.state.tick()).await?;
                self.state.complete_step();
                report.ticks += 1;
            }
            let priority_start = self.clock.now();
            report.logic_time += priority_start.saturating_sub(logic_start);

            let alpha = self.state.interpolate();
            driver.priority(alpha, self.state.tick()).await?;
            report.priority_time += self.clock.now().saturating_sub(priority_start);
            report.iterations += 1;
        }

        Ok(report)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use velora_core::EcsError;

    const STEP: Duration = Duration::from_nanos(33_333_000);

    fn config(smoothing: f32) -> LoopConfig {
        LoopConfig {
            fixed_step: STEP,
            max_accumulated: Duration::from_millis(25),
            alpha_smoothing: smoothing,
        }
    }

    /// Advances the clock by the next scripted delta on every condition check.
    struct Scripted {
        clock: ManualClock,
        deltas: VecDeque<Duration>,
        logic_ticks: Vec<u64>,
        alphas: Vec<f32>,
        fail_logic_at: Option<u64>,
    }

    impl Scripted {
        fn new(clock: &ManualClock, deltas: impl IntoIterator<Item = Duration>) -> Self {
            Self {
                clock: clock.clone(),
                deltas: deltas.into_iter().collect(),
                logic_ticks: Vec::new(),
                alphas: Vec::new(),
                fail_logic_at: None,
            }
        }
    }

    #[async_trait]
    impl LoopDriver for Scripted {
        fn condition(&mut self) -> bool {
            match self.deltas.pop_front() {
                Some(delta) => {
                    self.clock.advance(delta);
                    true
                }
                None => false,
            }
        }

        async fn logic(&mut self, step: Duration, tick: u64) -> EcsResult<()> {
            assert_eq!(step, STEP);
            if self.fail_logic_at == Some(tick) {
                return Err(EcsError::SystemFailed {
                    system: "Physics".into(),
                    reason: "diverged".into(),
                });
            }
            self.logic_ticks.push(tick);
            Ok(())
        }

        async fn priority(&mut self, alpha: f32, _tick: u64) -> EcsResult<()> {
            self.alphas.push(alpha);
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_determinism_exact_multiple() {
        let clock = ManualClock::new();
        let mut game_loop = FixedStepLoop::with_clock(config(0.5), clock.clone());
        let half = Duration::from_nanos(16_666_500);
        let mut driver = Scripted::new(&clock, std::iter::repeat(half).take(20));

        let report = game_loop.run(&mut driver).await.unwrap();
        assert_eq!(report.ticks, 10);
        assert_eq!(report.iterations, 20);
        assert_eq!(game_loop.state().tick(), 10);
        assert_eq!(driver.logic_ticks, (0..10).collect::<Vec<_>>());
        assert_eq!(game_loop.state().lag(), Duration::ZERO);
    }

    #[tokio::test]
    async fn test_stall_is_clamped() {
        let clock = ManualClock::new();
        let mut game_loop = FixedStepLoop::with_clock(config(0.5), clock.clone());
        let mut driver = Scripted::new(&clock, [Duration::from_secs(5)]);

        let report = game_loop.run(&mut driver).await.unwrap();
        // 25 ms added against a 33.333 ms step: no update yet.
        assert_eq!(report.ticks, 0);
        assert_eq!(game_loop.state().lag(), Duration::from_millis(25));

        let mut driver = Scripted::new(&clock, [Duration::from_secs(5); 4]);
        let report = game_loop.run(&mut driver).await.unwrap();
        // Each iteration adds at most 25 ms, so at most one update each.
        assert!(report.ticks <= 4);
        assert_eq!(report.ticks, 3);
    }

    #[tokio::test]
    async fn test_alpha_stays_in_unit_interval() {
        let clock = ManualClock::new();
        let mut game_loop = FixedStepLoop::with_clock(config(0.5), clock.clone());
        let deltas = (0..200).map(|i| Duration::from_micros((i * 7_919) % 40_000));
        let mut driver = Scripted::new(&clock, deltas);

        game_loop.run(&mut driver).await.unwrap();
        assert_eq!(driver.alphas.len(), 200);
        assert!(driver.alphas.iter().all(|a| (0.0..=1.0).contains(a)));
    }

    #[test]
    fn test_raw_alpha_without_smoothing() {
        let mut state = FixedStepState::new(config(1.0));
        state.accumulate(Duration::from_nanos(16_666_500));
        assert!((state.interpolate() - 0.5).abs() < 1e-6);
    }

    #[test]
    fn test_smoothing_halves_the_jump() {
        let mut state = FixedStepState::new(config(0.5));
        state.accumulate(Duration::from_nanos(16_666_500));
        // previous 0.0, raw 0.5
        assert!((state.interpolate() - 0.25).abs() < 1e-6);
        assert!((state.interpolate() - 0.375).abs() < 1e-6);
    }

    #[test]
    fn test_zero_step_is_degenerate_not_fatal() {
        let mut state = FixedStepState::new(LoopConfig {
            fixed_step: Duration::ZERO,
            ..config(1.0)
        });
        state.accumulate(Duration::from_millis(10));
        assert!(!state.step_due());
        assert_eq!(state.interpolate(), 0.0);

        let mut empty = FixedStepState::new(LoopConfig {
            fixed_step: Duration::ZERO,
            ..config(1.0)
        });
        assert_eq!(empty.interpolate(), 0.0);
    }

    #[tokio::test]
    async fn test_phase_transitions() {
        let clock = ManualClock::new();
        let mut game_loop = FixedStepLoop::with_clock(config(0.5), clock.clone());
        assert_eq!(game_loop.phase(), LoopPhase::Idle);

        let mut driver = Scripted::new(&clock, [STEP]);
        game_loop.run(&mut driver).await.unwrap();
        assert_eq!(game_loop.phase(), LoopPhase::Stopped);
    }

    #[tokio::test]
    async fn test_logic_error_terminates_loop() {
        let clock = ManualClock::new();
        let roomy = LoopConfig {
            max_accumulated: Duration::from_millis(100),
            ..config(0.5)
        };
        let mut game_loop = FixedStepLoop::with_clock(roomy, clock.clone());
        let mut driver = Scripted::new(&clock, std::iter::repeat(STEP).take(10));
        driver.fail_logic_at = Some(3);

        let err = game_loop.run(&mut driver).await.unwrap_err();
        assert!(matches!(err, EcsError::SystemFailed { ref system, .. } if system == "Physics"));
        assert_eq!(driver.logic_ticks, vec![0, 1, 2]);
        // The failed update does not count as simulated.
        assert_eq!(game_loop.state().tick(), 3);
        assert_eq!(driver.alphas.len(), 3);
        assert_eq!(game_loop.phase(), LoopPhase::Stopped);
    }

    #[tokio::test]
    async fn test_condition_false_runs_nothing() {
        let clock = ManualClock::new();
        let mut game_loop = FixedStepLoop::with_clock(config(0.5), clock.clone());
        let mut driver = Scripted::new(&clock, []);
        let report = game_loop.run(&mut driver).await.unwrap();
        assert_eq!(report, LoopReport::default());
    }
}

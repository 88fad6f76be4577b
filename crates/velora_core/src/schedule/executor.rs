//! # Layer Executor
//!
//! Runs a [`Schedule`] against a level, one layer at a time. Every system of a
//! layer is spawned as its own task on the ambient tokio runtime; the layer
//! ends only when all of them have completed, failed or panicked. A failure in
//! a layer stops the frame before the next layer starts.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tracing::{error, trace};

use super::graph::Schedule;
use super::system::{FrameInfo, SystemContext};
use crate::error::{EcsError, EcsResult};
use crate::level::Level;

/// Executes every layer of `schedule` against `level`.
///
/// Must be called from within a tokio runtime.
///
/// # Errors
///
/// Returns the first failure (in layer order) of the earliest failing layer:
/// - [`EcsError::SystemFailed`] if a system returned an error
/// - [`EcsError::SystemPanicked`] if a system task panicked
pub async fn run_schedule(
    level: &Arc<Level>,
    schedule: &Schedule,
    frame: FrameInfo,
) -> EcsResult<()> {
    for (depth, layer) in schedule.layers().iter().enumerate() {
        trace!("Running layer {} ({} systems)", depth, layer.len());

        let mut tasks = LayerTasks(
            layer
                .iter()
                .map(|system| {
                    let system = Arc::clone(system);
                    let ctx = SystemContext::new(Arc::clone(level), frame);
                    let name = system.name().to_string();
                    let handle = tokio::spawn(async move { system.run(ctx).await });
                    (name, handle)
                })
                .collect(),
        );

        // Join every task before deciding; no task may outlive its layer.
        let mut first_failure: Option<EcsError> = None;
        for (name, handle) in &mut tasks.0 {
            let outcome = match handle.await {
                Ok(Ok(())) => continue,
                Ok(Err(err)) => as_system_failure(name, err),
                Err(join_error) => {
                    error!("System {} terminated abnormally: {}", name, join_error);
                    EcsError::SystemPanicked {
                        system: name.clone(),
                    }
                }
            };
            if first_failure.is_none() {
                first_failure = Some(outcome);
            }
        }

        if let Some(err) = first_failure {
            error!("Layer {} failed: {}", depth, err);
            return Err(err);
        }
    }
    Ok(())
}

/// The spawned tasks of one layer.
///
/// Dropping the frame future mid-layer aborts whatever is still running, so
/// a cancelled update never leaves tasks behind touching the level.
struct LayerTasks(Vec<(String, JoinHandle<EcsResult<()>>)>);

impl Drop for LayerTasks {
    fn drop(&mut self) {
        for (_, handle) in &self.0 {
            handle.abort();
        }
    }
}

fn as_system_failure(name: &str, err: EcsError) -> EcsError {
    match err {
        EcsError::SystemFailed { .. } | EcsError::SystemPanicked { .. } => err,
        other => EcsError::SystemFailed {
            system: name.to_string(),
            reason: other.to_string(),
        },
    }
}

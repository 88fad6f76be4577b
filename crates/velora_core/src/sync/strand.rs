//! # Strand
//!
//! A serialized execution context: every job posted to a strand runs on one
//! worker task, one at a time, in posting order. Jobs get exclusive `&mut`
//! access to the strand's state, so the state needs no lock of its own.
//!
//! ```text
//!   OS thread ──post──┐
//!   OS thread ──post──┼──► [queue] ──► worker task ──► &mut S
//!   system    ──run───┘                     │
//!                  ◄──── oneshot reply ─────┘
//! ```
//!
//! Posting never blocks and works from any thread, inside or outside the
//! runtime.

use std::fmt;
use std::sync::Arc;

use tokio::runtime::Handle;
use tokio::sync::{mpsc, oneshot};
use tracing::debug;

use crate::error::{EcsError, EcsResult};

type Job<S> = Box<dyn FnOnce(&mut S) + Send + 'static>;

/// Handle to a serialized execution context owning a state `S`.
///
/// Cloning the handle shares the same worker. The worker stops once every
/// handle is dropped and the queue is drained.
pub struct Strand<S> {
    name: Arc<str>,
    sender: mpsc::UnboundedSender<Job<S>>,
}

impl<S: Send + 'static> Strand<S> {
    /// Starts a strand on the current tokio runtime.
    ///
    /// # Panics
    ///
    /// Panics if called outside a tokio runtime.
    pub fn spawn(name: impl Into<String>, state: S) -> Self {
        Self::spawn_on(&Handle::current(), name, state)
    }

    /// Starts a strand on the given runtime.
    pub fn spawn_on(handle: &Handle, name: impl Into<String>, mut state: S) -> Self {
        let name: Arc<str> = Arc::from(name.into());
        let (sender, mut receiver) = mpsc::unbounded_channel::<Job<S>>();

        let worker_name = Arc::clone(&name);
        handle.spawn(async move {
            while let Some(job) = receiver.recv().await {
                job(&mut state);
            }
            debug!("Strand {} stopped", worker_name);
        });

        Self { name, sender }
    }

    /// Queues `job` without waiting for it.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::StrandClosed`] if the worker is gone.
    pub fn post(&self, job: impl FnOnce(&mut S) + Send + 'static) -> EcsResult<()> {
        self.sender
            .send(Box::new(job))
            .map_err(|_| EcsError::StrandClosed(self.name.to_string()))
    }

    /// Queues `job` and waits for its result.
    ///
    /// # Errors
    ///
    /// Returns [`EcsError::StrandClosed`] if the worker is gone or the job
    /// panicked before replying.
    pub async fn run<R>(&self, job: impl FnOnce(&mut S) -> R + Send + 'static) -> EcsResult<R>
    where
        R: Send + 'static,
    {
        let (reply, response) = oneshot::channel();
        self.post(move |state| {
            // The caller may have given up waiting; that is not an error here.
            let _ = reply.send(job(state));
        })?;
        response
            .await
            .map_err(|_| EcsError::StrandClosed(self.name.to_string()))
    }

    /// Name given at spawn.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Returns `true` once the worker has stopped.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.sender.is_closed()
    }
}

impl<S> Clone for Strand<S> {
    fn clone(&self) -> Self {
        Self {
            name: Arc::clone(&self.name),
            sender: self.sender.clone(),
        }
    }
}

impl<S> fmt::Debug for Strand<S> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strand")
            .field("name", &self.name)
            .field("closed", &self.sender.is_closed())
            .finish()
    }
}

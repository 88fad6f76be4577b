//! # Serialized Execution
//!
//! Systems of one layer run in parallel on the worker pool. State that must
//! also be reachable from outside the frame (OS input callbacks, network
//! handlers) is confined to a [`Strand`] instead of being locked.

mod strand;

pub use strand::Strand;

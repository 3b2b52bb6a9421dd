//! Seqpool: a bounded worker pool with FIFO-per-sequence execution ordering
//! and shutdown-safety guarantees.
//!
//! # Overview
//!
//! Seqpool executes closures on dynamically created OS threads. It is built
//! around one idea: ordering should be opt-in and fine-grained. Tasks posted
//! against the same [`SequenceToken`] run strictly one at a time, in
//! submission order; everything else is free to run concurrently.
//!
//! # Core Guarantees
//!
//! - **FIFO per sequence**: at most one task of a given sequence executes at
//!   any instant, and same-sequence tasks run in submission order
//! - **Named rendezvous**: the same sequence name always resolves to the same
//!   token, so independent modules can share an ordering domain
//! - **Shutdown safety**: every task declares whether it blocks shutdown, is
//!   skipped by it, or continues through it, and shutdown enforces that
//!   without deadlocking or leaking closures
//! - **Lock-free task execution**: the pool's lock protects metadata only;
//!   user closures run (and are destroyed) with the lock released
//!
//! # Module Structure
//!
//! - [`pool`]: the [`SequencedPool`] facade and shareable handle
//! - [`token`]: sequence tokens
//! - [`task`]: shutdown behaviors and task records
//! - [`runner`]: object-safe task-runner adapters
//! - [`config`]: pool configuration
//! - [`builder`]: fluent pool builder
//! - [`test_utils`]: logging helpers and macros for tests

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::pedantic)]
#![allow(clippy::must_use_candidate)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::module_name_repetitions)]
#![allow(clippy::doc_markdown)]

pub mod builder;
pub mod config;
pub mod pool;
pub mod runner;
pub mod task;
pub mod test_utils;
pub mod token;

mod inner;
mod worker;

pub use builder::PoolBuilder;
pub use config::PoolConfig;
pub use pool::{PoolObserver, SequencedPool, SequencedPoolHandle};
pub use runner::{PoolTaskRunner, SequencedTaskRunner, TaskRunner};
pub use task::{ShutdownBehavior, Task};
pub use token::SequenceToken;

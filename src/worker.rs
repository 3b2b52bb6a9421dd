//! Worker registry entries and thread spawning.
//!
//! Each pool thread has a [`Worker`] entry in the engine's registry keyed by
//! its `ThreadId`. The entry records what the thread is executing right now so
//! a running closure can ask "which sequence am I on?" through the pool's
//! introspection methods. Entries are written by the owning thread and read
//! under the engine lock.

use crate::inner::Inner;
use crate::task::ShutdownBehavior;
use std::io;
use std::sync::Arc;
use std::thread::{self, JoinHandle};

/// Registry entry for one pool thread.
#[derive(Debug, Clone, Copy)]
pub(crate) struct Worker {
    /// True while the thread is inside a task closure (or tearing it down).
    pub is_processing_task: bool,
    /// Token id of the running task; 0 when unsequenced or idle.
    pub task_sequence_token_id: u64,
    /// Shutdown behavior of the running task; meaningless while idle.
    pub task_shutdown_behavior: ShutdownBehavior,
}

impl Worker {
    pub fn new() -> Self {
        Self {
            is_processing_task: false,
            task_sequence_token_id: 0,
            task_shutdown_behavior: ShutdownBehavior::BlockShutdown,
        }
    }
}

/// Spawns worker thread number `ordinal` for `inner`.
///
/// Runs with the engine lock released; the new thread registers itself (and
/// clears the creation-in-flight flag) once its loop starts.
pub(crate) fn spawn_worker(inner: Arc<Inner>, ordinal: usize) -> io::Result<JoinHandle<()>> {
    let name = format!("{}-worker-{}", inner.config().thread_name_prefix, ordinal);
    let mut builder = thread::Builder::new().name(name);
    if inner.config().thread_stack_size > 0 {
        builder = builder.stack_size(inner.config().thread_stack_size);
    }
    builder.spawn(move || {
        if let Some(callback) = &inner.config().on_thread_start {
            callback();
        }
        crate::inner::thread_loop(&inner);
        if let Some(callback) = &inner.config().on_thread_stop {
            callback();
        }
    })
}

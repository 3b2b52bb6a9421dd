//! Task records and the pending set.
//!
//! A [`SequencedTask`] bundles a closure with the metadata the scheduler
//! needs: which sequence it belongs to, how it interacts with shutdown, and
//! where it sits in the global submission order. The [`PendingTaskSet`] keeps
//! not-yet-started tasks ordered by `(time_to_run, sequence_task_number)`,
//! which makes "earliest ready task" a prefix scan and keeps same-time tasks
//! in submission order.

use std::collections::BTreeMap;
use std::fmt;
use std::time::Instant;

/// The unit of work accepted by the pool: a move-only, single-invocation
/// closure.
pub type Task = Box<dyn FnOnce() + Send + 'static>;

/// Per-task policy for how the pool treats the task once shutdown begins.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ShutdownBehavior {
    /// If started before shutdown, the task may keep running during shutdown,
    /// but it neither delays shutdown completion nor is it started afterwards.
    ContinueOnShutdown,
    /// Discarded without running if it has not started when shutdown begins.
    /// Once started, shutdown waits for it to finish.
    SkipOnShutdown,
    /// Shutdown does not complete until this task has run.
    BlockShutdown,
}

/// Ordering key for pending tasks: run time first, then submission order.
///
/// `sequence_task_number` is unique per pool, so the ordering is total and
/// two keys never collide.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct TaskKey {
    pub time_to_run: Instant,
    pub sequence_task_number: u64,
}

/// A pending task: the closure plus its scheduling metadata.
pub(crate) struct SequencedTask {
    /// 0 means unsequenced (no ordering constraint).
    pub sequence_token_id: u64,
    pub shutdown_behavior: ShutdownBehavior,
    pub task: Task,
}

impl fmt::Debug for SequencedTask {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedTask")
            .field("sequence_token_id", &self.sequence_token_id)
            .field("shutdown_behavior", &self.shutdown_behavior)
            .finish_non_exhaustive()
    }
}

/// Ordered set of pending tasks with min-first iteration and arbitrary erase.
#[derive(Default)]
pub(crate) struct PendingTaskSet {
    tasks: BTreeMap<TaskKey, SequencedTask>,
}

impl PendingTaskSet {
    pub fn insert(&mut self, key: TaskKey, task: SequencedTask) {
        let previous = self.tasks.insert(key, task);
        debug_assert!(previous.is_none(), "duplicate pending task key");
    }

    /// Iterates in `(time_to_run, sequence_task_number)` order.
    pub fn iter(&self) -> impl Iterator<Item = (&TaskKey, &SequencedTask)> {
        self.tasks.iter()
    }

    pub fn remove(&mut self, key: &TaskKey) -> Option<SequencedTask> {
        self.tasks.remove(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}

impl fmt::Debug for PendingTaskSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PendingTaskSet")
            .field("len", &self.tasks.len())
            .finish()
    }
}

//! The sequenced pool facade.
//!
//! # Overview
//!
//! [`SequencedPool`] is a bounded worker pool that executes closures on
//! dynamically created OS threads, with three guarantees a plain thread pool
//! does not give:
//!
//! - **FIFO per sequence**: tasks posted against the same [`SequenceToken`]
//!   run one at a time, in submission order. Tasks on different tokens (or on
//!   no token) may run concurrently.
//! - **Named rendezvous**: [`named_sequence_token`] resolves the same name to
//!   the same token for the lifetime of the pool, so independent modules can
//!   share a sequence without sharing a token value.
//! - **Shutdown safety**: every task carries a [`ShutdownBehavior`];
//!   [`shutdown`] runs all blocking work, discards skippable work without
//!   running it, and leaves continue-on-shutdown work to finish on its own.
//!
//! Threads are created lazily, up to the configured maximum, and park on a
//! condition variable when idle.
//!
//! # Example
//!
//! ```ignore
//! use seqpool::SequencedPool;
//!
//! let pool = SequencedPool::new(4, "io");
//! let token = pool.sequence_token();
//! pool.post_sequenced(token, || println!("first"));
//! pool.post_sequenced(token, || println!("second, strictly after first"));
//! pool.shutdown();
//! ```
//!
//! [`named_sequence_token`]: SequencedPool::named_sequence_token
//! [`shutdown`]: SequencedPool::shutdown

use crate::builder::PoolBuilder;
use crate::config::PoolConfig;
use crate::inner::Inner;
use crate::runner::{PoolTaskRunner, SequencedTaskRunner};
use crate::task::ShutdownBehavior;
use crate::token::SequenceToken;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Hooks for observing pool lifecycle events, registered via
/// [`PoolBuilder::observer`].
///
/// All methods are invoked with the pool's internal lock released and default
/// to no-ops.
///
/// [`PoolBuilder::observer`]: crate::PoolBuilder::observer
pub trait PoolObserver: Send + Sync {
    /// Work was signalled to an idle worker.
    fn on_has_work(&self) {}
    /// `shutdown` is about to block waiting for outstanding work.
    fn will_wait_for_shutdown(&self) {}
    /// The pool is being destroyed.
    fn on_destruct(&self) {}
}

/// A worker pool with FIFO-per-sequence ordering and per-task shutdown
/// behaviors. See the [module docs](self) for the guarantees.
///
/// The pool is the owning end: dropping it asserts that [`shutdown`] ran and
/// joins every worker thread. For shared posting access, clone a
/// [`SequencedPoolHandle`] from [`handle`] or use the task-runner adapters.
///
/// [`shutdown`]: SequencedPool::shutdown
/// [`handle`]: SequencedPool::handle
pub struct SequencedPool {
    inner: Arc<Inner>,
}

/// A cloneable, shareable handle to a [`SequencedPool`].
///
/// Exposes the full posting and introspection surface but not the
/// owner-context operations (`shutdown`, `flush_for_testing`).
#[derive(Clone)]
pub struct SequencedPoolHandle {
    inner: Arc<Inner>,
}

impl SequencedPool {
    /// Creates a pool that grows up to `max_threads` worker threads, named
    /// with the given prefix. No threads are created until work is posted.
    ///
    /// # Panics
    ///
    /// Panics if `max_threads` is 0.
    #[must_use]
    pub fn new(max_threads: usize, thread_name_prefix: &str) -> Self {
        assert!(max_threads > 0, "max_threads must be at least 1");
        let config = PoolConfig {
            max_threads,
            thread_name_prefix: thread_name_prefix.to_string(),
            ..PoolConfig::default()
        };
        Self::with_config(config)
    }

    /// Creates a pool from a full [`PoolConfig`] (normalized first).
    #[must_use]
    pub fn with_config(mut config: PoolConfig) -> Self {
        config.normalize();
        Self {
            inner: Arc::new(Inner::new(config)),
        }
    }

    /// Returns a builder for configuring a pool fluently.
    #[must_use]
    pub fn builder() -> PoolBuilder {
        PoolBuilder::new()
    }

    /// Returns a cloneable handle to this pool.
    #[must_use]
    pub fn handle(&self) -> SequencedPoolHandle {
        SequencedPoolHandle {
            inner: Arc::clone(&self.inner),
        }
    }

    /// Allocates a fresh sequence token, unique across every pool in the
    /// process.
    #[must_use]
    pub fn sequence_token(&self) -> SequenceToken {
        SequenceToken::next()
    }

    /// Resolves `name` to a sequence token, allocating one on first use. The
    /// same name always yields the same token for the lifetime of this pool;
    /// different names yield different tokens.
    #[must_use]
    pub fn named_sequence_token(&self, name: &str) -> SequenceToken {
        self.inner.named_sequence_token(name)
    }

    /// Posts an unsequenced task with [`ShutdownBehavior::BlockShutdown`].
    ///
    /// Returns `true` iff the task was enqueued (see [`ShutdownBehavior`] for
    /// the post-shutdown acceptance rules shared by the whole `post_*`
    /// family).
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        crate::inner::post_task(&self.inner,
            None,
            SequenceToken::invalid(),
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// Posts an unsequenced task to run no earlier than `delay` from now.
    ///
    /// A zero delay posts a normal `BlockShutdown` task; a nonzero delay
    /// implies [`ShutdownBehavior::SkipOnShutdown`].
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let behavior = if delay.is_zero() {
            ShutdownBehavior::BlockShutdown
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(
            &self.inner, None, SequenceToken::invalid(), behavior, delay, Box::new(f))
    }

    /// Posts an unsequenced task with an explicit shutdown behavior.
    pub fn post_with_shutdown_behavior<F>(&self, behavior: ShutdownBehavior, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        crate::inner::post_task(&self.inner,
            None,
            SequenceToken::invalid(),
            behavior,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// Posts a task ordered under `token`, with
    /// [`ShutdownBehavior::BlockShutdown`].
    pub fn post_sequenced<F>(&self, token: SequenceToken, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        crate::inner::post_task(&self.inner,
            None,
            token,
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// Posts a task ordered under `token`, delayed; behavior derives from the
    /// delay exactly like [`post_delayed`](Self::post_delayed).
    pub fn post_sequenced_delayed<F>(&self, token: SequenceToken, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        let behavior = if delay.is_zero() {
            ShutdownBehavior::BlockShutdown
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(&self.inner, None, token, behavior, delay, Box::new(f))
    }

    /// Posts a task ordered under the sequence named `name` (resolved, and
    /// created if needed, atomically with the enqueue), with
    /// [`ShutdownBehavior::BlockShutdown`].
    pub fn post_named_sequenced<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(!name.is_empty(), "sequence name must not be empty");
        crate::inner::post_task(&self.inner,
            Some(name),
            SequenceToken::invalid(),
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// Posts a task ordered under `token` with an explicit shutdown behavior.
    pub fn post_sequenced_with_shutdown_behavior<F>(
        &self,
        token: SequenceToken,
        behavior: ShutdownBehavior,
        f: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        crate::inner::post_task(
            &self.inner, None, token, behavior, Duration::ZERO, Box::new(f))
    }

    /// Returns a task runner posting unsequenced tasks with a fixed shutdown
    /// behavior.
    #[must_use]
    pub fn task_runner_with_shutdown_behavior(&self, behavior: ShutdownBehavior) -> PoolTaskRunner {
        PoolTaskRunner::new(Arc::clone(&self.inner), behavior)
    }

    /// Returns a task runner bound to one sequence token.
    #[must_use]
    pub fn sequenced_task_runner(&self, token: SequenceToken) -> SequencedTaskRunner {
        debug_assert!(token.is_valid(), "binding a runner to the invalid token");
        SequencedTaskRunner::new(Arc::clone(&self.inner), token)
    }

    /// Returns `true` iff called from a worker thread belonging to this pool.
    #[must_use]
    pub fn runs_tasks_on_current_thread(&self) -> bool {
        self.inner.runs_tasks_on_current_thread()
    }

    /// Returns `true` iff the calling worker is currently executing a task
    /// tagged with exactly this token.
    #[must_use]
    pub fn is_running_sequence_on_current_thread(&self, token: SequenceToken) -> bool {
        self.inner.is_running_sequence_on_current_thread(token)
    }

    /// The sequence token of the task the calling worker is executing, if it
    /// is a sequenced task.
    #[must_use]
    pub fn current_sequence_token(&self) -> Option<SequenceToken> {
        self.inner.current_sequence_token()
    }

    /// Snapshot of whether shutdown has been called.
    #[must_use]
    pub fn is_shutdown_in_progress(&self) -> bool {
        self.inner.is_shutdown_in_progress()
    }

    /// Number of worker threads created so far.
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads()
    }

    /// Number of tasks waiting to run (including delayed ones).
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count()
    }

    /// Shuts the pool down, accepting no further blocking work.
    /// Equivalent to [`shutdown_with_budget(0)`](Self::shutdown_with_budget).
    pub fn shutdown(&self) {
        self.inner.shutdown(0);
    }

    /// Shuts the pool down.
    ///
    /// Already-posted `BlockShutdown` tasks run to completion before this
    /// returns; pending `SkipOnShutdown` and `ContinueOnShutdown` tasks are
    /// discarded without running; a task already executing is always allowed
    /// to finish, and shutdown waits for it unless it is
    /// `ContinueOnShutdown`. Up to `max_new_blocking_tasks` additional
    /// `BlockShutdown` tasks are still accepted (intended for work posted by
    /// tasks shutdown is already waiting for).
    ///
    /// Must be called on the thread that created the pool, and not while
    /// [`flush_for_testing`](Self::flush_for_testing) is in progress.
    pub fn shutdown_with_budget(&self, max_new_blocking_tasks: usize) {
        self.inner.shutdown(max_new_blocking_tasks);
    }

    /// Blocks until every currently-pending task (delayed ones included) has
    /// executed and the pool is quiescent, without shutting it down.
    ///
    /// Deterministic teardown point for tests. Must not be called from a pool
    /// worker, after [`shutdown`](Self::shutdown), or concurrently with
    /// another flush.
    pub fn flush_for_testing(&self) {
        self.inner.flush_for_testing();
    }
}

impl fmt::Debug for SequencedPool {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedPool")
            .field("max_threads", &self.inner.config().max_threads)
            .field("active_threads", &self.inner.active_threads())
            .field("pending_tasks", &self.inner.pending_count())
            .field("shutdown", &self.inner.is_shutdown_in_progress())
            .finish()
    }
}

impl Drop for SequencedPool {
    fn drop(&mut self) {
        if self.inner.is_shutdown_in_progress() {
            self.inner.join_all_workers();
        } else {
            debug_assert!(false, "SequencedPool dropped without shutdown()");
            tracing::error!("SequencedPool dropped without shutdown(); workers detached");
        }
        if let Some(observer) = &self.inner.config().observer {
            observer.on_destruct();
        }
    }
}

impl SequencedPoolHandle {
    /// See [`SequencedPool::sequence_token`].
    #[must_use]
    pub fn sequence_token(&self) -> SequenceToken {
        SequenceToken::next()
    }

    /// See [`SequencedPool::named_sequence_token`].
    #[must_use]
    pub fn named_sequence_token(&self, name: &str) -> SequenceToken {
        self.inner.named_sequence_token(name)
    }

    /// See [`SequencedPool::post`].
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        crate::inner::post_task(&self.inner,
            None,
            SequenceToken::invalid(),
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// See [`SequencedPool::post_delayed`].
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        let behavior = if delay.is_zero() {
            ShutdownBehavior::BlockShutdown
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(
            &self.inner, None, SequenceToken::invalid(), behavior, delay, Box::new(f))
    }

    /// See [`SequencedPool::post_with_shutdown_behavior`].
    pub fn post_with_shutdown_behavior<F>(&self, behavior: ShutdownBehavior, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        crate::inner::post_task(&self.inner,
            None,
            SequenceToken::invalid(),
            behavior,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// See [`SequencedPool::post_sequenced`].
    pub fn post_sequenced<F>(&self, token: SequenceToken, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        crate::inner::post_task(&self.inner,
            None,
            token,
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// See [`SequencedPool::post_sequenced_delayed`].
    pub fn post_sequenced_delayed<F>(&self, token: SequenceToken, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        let behavior = if delay.is_zero() {
            ShutdownBehavior::BlockShutdown
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(&self.inner, None, token, behavior, delay, Box::new(f))
    }

    /// See [`SequencedPool::post_named_sequenced`].
    pub fn post_named_sequenced<F>(&self, name: &str, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(!name.is_empty(), "sequence name must not be empty");
        crate::inner::post_task(&self.inner,
            Some(name),
            SequenceToken::invalid(),
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            Box::new(f),
        )
    }

    /// See [`SequencedPool::post_sequenced_with_shutdown_behavior`].
    pub fn post_sequenced_with_shutdown_behavior<F>(
        &self,
        token: SequenceToken,
        behavior: ShutdownBehavior,
        f: F,
    ) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        debug_assert!(token.is_valid(), "posting against the invalid token");
        crate::inner::post_task(
            &self.inner, None, token, behavior, Duration::ZERO, Box::new(f))
    }

    /// See [`SequencedPool::runs_tasks_on_current_thread`].
    #[must_use]
    pub fn runs_tasks_on_current_thread(&self) -> bool {
        self.inner.runs_tasks_on_current_thread()
    }

    /// See [`SequencedPool::is_running_sequence_on_current_thread`].
    #[must_use]
    pub fn is_running_sequence_on_current_thread(&self, token: SequenceToken) -> bool {
        self.inner.is_running_sequence_on_current_thread(token)
    }

    /// See [`SequencedPool::current_sequence_token`].
    #[must_use]
    pub fn current_sequence_token(&self) -> Option<SequenceToken> {
        self.inner.current_sequence_token()
    }

    /// See [`SequencedPool::is_shutdown_in_progress`].
    #[must_use]
    pub fn is_shutdown_in_progress(&self) -> bool {
        self.inner.is_shutdown_in_progress()
    }

    /// See [`SequencedPool::active_threads`].
    #[must_use]
    pub fn active_threads(&self) -> usize {
        self.inner.active_threads()
    }

    /// See [`SequencedPool::pending_count`].
    #[must_use]
    pub fn pending_count(&self) -> usize {
        self.inner.pending_count()
    }
}

impl fmt::Debug for SequencedPoolHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedPoolHandle")
            .field("active_threads", &self.inner.active_threads())
            .field("pending_tasks", &self.inner.pending_count())
            .finish()
    }
}

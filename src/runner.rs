//! Task-runner adapters.
//!
//! A [`TaskRunner`] lets code post work without naming the pool type: hand a
//! module an `Arc<dyn TaskRunner>` and it can neither change the shutdown
//! behavior nor escape its sequence. The trait takes boxed closures so it
//! stays object-safe; both adapters also provide generic inherent methods for
//! direct use.

use crate::inner::Inner;
use crate::task::{ShutdownBehavior, Task};
use crate::token::SequenceToken;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

/// Posting surface detached from the concrete pool type.
pub trait TaskRunner: Send + Sync {
    /// Posts a task. Returns `true` iff it was enqueued.
    fn post_task(&self, task: Task) -> bool;

    /// Posts a task to run no earlier than `delay` from now. A nonzero delay
    /// implies [`ShutdownBehavior::SkipOnShutdown`].
    fn post_delayed_task(&self, delay: Duration, task: Task) -> bool;

    /// Returns `true` iff the calling thread currently executes work for this
    /// runner (for a sequenced runner: work of its sequence).
    fn runs_tasks_on_current_thread(&self) -> bool;
}

/// Posts unsequenced tasks with a fixed [`ShutdownBehavior`].
///
/// Obtained from [`SequencedPool::task_runner_with_shutdown_behavior`].
///
/// [`SequencedPool::task_runner_with_shutdown_behavior`]: crate::SequencedPool::task_runner_with_shutdown_behavior
#[derive(Clone)]
pub struct PoolTaskRunner {
    inner: Arc<Inner>,
    shutdown_behavior: ShutdownBehavior,
}

impl PoolTaskRunner {
    pub(crate) fn new(inner: Arc<Inner>, shutdown_behavior: ShutdownBehavior) -> Self {
        Self {
            inner,
            shutdown_behavior,
        }
    }

    /// The shutdown behavior applied to every undelayed post.
    #[must_use]
    pub fn shutdown_behavior(&self) -> ShutdownBehavior {
        self.shutdown_behavior
    }

    /// Posts a task; see [`TaskRunner::post_task`].
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_task(Box::new(f))
    }

    /// Posts a delayed task; see [`TaskRunner::post_delayed_task`].
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed_task(delay, Box::new(f))
    }
}

impl TaskRunner for PoolTaskRunner {
    fn post_task(&self, task: Task) -> bool {
        crate::inner::post_task(&self.inner,
            None,
            SequenceToken::invalid(),
            self.shutdown_behavior,
            Duration::ZERO,
            task,
        )
    }

    fn post_delayed_task(&self, delay: Duration, task: Task) -> bool {
        let behavior = if delay.is_zero() {
            self.shutdown_behavior
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(
            &self.inner, None, SequenceToken::invalid(), behavior, delay, task)
    }

    fn runs_tasks_on_current_thread(&self) -> bool {
        self.inner.runs_tasks_on_current_thread()
    }
}

impl fmt::Debug for PoolTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolTaskRunner")
            .field("shutdown_behavior", &self.shutdown_behavior)
            .finish()
    }
}

/// Posts tasks ordered under one [`SequenceToken`].
///
/// Obtained from [`SequencedPool::sequenced_task_runner`]. Undelayed posts use
/// [`ShutdownBehavior::BlockShutdown`].
///
/// [`SequencedPool::sequenced_task_runner`]: crate::SequencedPool::sequenced_task_runner
#[derive(Clone)]
pub struct SequencedTaskRunner {
    inner: Arc<Inner>,
    token: SequenceToken,
}

impl SequencedTaskRunner {
    pub(crate) fn new(inner: Arc<Inner>, token: SequenceToken) -> Self {
        Self { inner, token }
    }

    /// The sequence this runner posts against.
    #[must_use]
    pub fn token(&self) -> SequenceToken {
        self.token
    }

    /// Posts a task onto the sequence; see [`TaskRunner::post_task`].
    pub fn post<F>(&self, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_task(Box::new(f))
    }

    /// Posts a delayed task onto the sequence; see
    /// [`TaskRunner::post_delayed_task`].
    pub fn post_delayed<F>(&self, delay: Duration, f: F) -> bool
    where
        F: FnOnce() + Send + 'static,
    {
        self.post_delayed_task(delay, Box::new(f))
    }
}

impl TaskRunner for SequencedTaskRunner {
    fn post_task(&self, task: Task) -> bool {
        crate::inner::post_task(&self.inner,
            None,
            self.token,
            ShutdownBehavior::BlockShutdown,
            Duration::ZERO,
            task,
        )
    }

    fn post_delayed_task(&self, delay: Duration, task: Task) -> bool {
        let behavior = if delay.is_zero() {
            ShutdownBehavior::BlockShutdown
        } else {
            ShutdownBehavior::SkipOnShutdown
        };
        crate::inner::post_task(&self.inner, None, self.token, behavior, delay, task)
    }

    fn runs_tasks_on_current_thread(&self) -> bool {
        self.inner.is_running_sequence_on_current_thread(self.token)
    }
}

impl fmt::Debug for SequencedTaskRunner {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SequencedTaskRunner")
            .field("token", &self.token)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pool::SequencedPool;
    use std::sync::mpsc;
    use std::sync::Mutex;

    #[test]
    fn sequenced_runner_preserves_order_with_direct_posts() {
        let pool = SequencedPool::new(4, "runner");
        let token = pool.sequence_token();
        let runner = pool.sequenced_task_runner(token);
        let log = Arc::new(Mutex::new(Vec::new()));

        let l = Arc::clone(&log);
        assert!(runner.post(move || l.lock().unwrap().push(1)));
        let l = Arc::clone(&log);
        assert!(pool.post_sequenced(token, move || l.lock().unwrap().push(2)));
        let l = Arc::clone(&log);
        assert!(runner.post(move || l.lock().unwrap().push(3)));

        pool.shutdown();
        assert_eq!(*log.lock().unwrap(), vec![1, 2, 3]);
    }

    #[test]
    fn sequenced_runner_reports_its_own_sequence() {
        let pool = SequencedPool::new(1, "runner-intro");
        let runner = pool.sequenced_task_runner(pool.sequence_token());
        let (tx, rx) = mpsc::channel();

        assert!(!runner.runs_tasks_on_current_thread());
        let probe = runner.clone();
        assert!(runner.post(move || {
            let _ = tx.send(probe.runs_tasks_on_current_thread());
        }));
        assert!(rx.recv_timeout(Duration::from_secs(5)).unwrap());
        pool.shutdown();
    }

    #[test]
    fn behavior_runner_is_object_safe() {
        let pool = SequencedPool::new(1, "runner-dyn");
        let runner: Arc<dyn TaskRunner> = Arc::new(
            pool.task_runner_with_shutdown_behavior(ShutdownBehavior::BlockShutdown),
        );
        let (tx, rx) = mpsc::channel();

        assert!(runner.post_task(Box::new(move || {
            let _ = tx.send(());
        })));
        assert!(rx.recv_timeout(Duration::from_secs(5)).is_ok());
        pool.shutdown();
    }
}

//! Pool builder.
//!
//! The builder is fluent and move-based: each method consumes `self` and
//! returns an updated builder, enabling ergonomic chaining without borrowing
//! hazards.
//!
//! ```ignore
//! use seqpool::SequencedPool;
//!
//! let pool = SequencedPool::builder()
//!     .max_threads(8)
//!     .thread_name_prefix("io")
//!     .on_thread_start(|| println!("worker up"))
//!     .build();
//! ```

use crate::config::PoolConfig;
use crate::pool::{PoolObserver, SequencedPool};
use std::sync::Arc;

/// Builder for constructing a [`SequencedPool`] with custom configuration.
#[derive(Clone, Debug, Default)]
pub struct PoolBuilder {
    config: PoolConfig,
}

impl PoolBuilder {
    /// Create a new builder with default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self {
            config: PoolConfig::default(),
        }
    }

    /// Set the maximum number of worker threads (0 is normalized to 1).
    #[must_use]
    pub fn max_threads(mut self, n: usize) -> Self {
        self.config.max_threads = n;
        self
    }

    /// Set the worker thread name prefix.
    #[must_use]
    pub fn thread_name_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.config.thread_name_prefix = prefix.into();
        self
    }

    /// Set the worker thread stack size (0 = platform default).
    #[must_use]
    pub fn thread_stack_size(mut self, size: usize) -> Self {
        self.config.thread_stack_size = size;
        self
    }

    /// Register a callback to run when a worker thread starts.
    #[must_use]
    pub fn on_thread_start<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_start = Some(Arc::new(f));
        self
    }

    /// Register a callback to run when a worker thread stops.
    #[must_use]
    pub fn on_thread_stop<F>(mut self, f: F) -> Self
    where
        F: Fn() + Send + Sync + 'static,
    {
        self.config.on_thread_stop = Some(Arc::new(f));
        self
    }

    /// Register a lifecycle observer.
    #[must_use]
    pub fn observer(mut self, observer: Arc<dyn PoolObserver>) -> Self {
        self.config.observer = Some(observer);
        self
    }

    /// Build the pool. The configuration is normalized first.
    #[must_use]
    pub fn build(mut self) -> SequencedPool {
        self.config.normalize();
        SequencedPool::with_config(self.config)
    }
}

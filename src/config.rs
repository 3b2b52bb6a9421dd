//! Pool configuration.
//!
//! These types hold the concrete values that drive pool behavior. In most
//! cases you should use [`PoolBuilder`](crate::PoolBuilder) to construct a
//! pool rather than filling in a [`PoolConfig`] directly.
//!
//! # Defaults
//!
//! | Field | Default |
//! |-------|---------|
//! | `max_threads` | 4 |
//! | `thread_name_prefix` | `"seqpool"` |
//! | `thread_stack_size` | 0 (platform default) |
//! | `on_thread_start` / `on_thread_stop` | `None` |
//! | `observer` | `None` |

use crate::pool::PoolObserver;
use std::fmt;
use std::sync::Arc;

/// Configuration for a [`SequencedPool`](crate::SequencedPool).
#[derive(Clone)]
pub struct PoolConfig {
    /// Maximum number of worker threads. Threads are created lazily as work
    /// arrives and live until shutdown.
    pub max_threads: usize,
    /// Name prefix for worker threads (`"{prefix}-worker-{n}"`).
    pub thread_name_prefix: String,
    /// Stack size per worker thread (0 = platform default).
    pub thread_stack_size: usize,
    /// Callback executed when a worker thread starts.
    pub on_thread_start: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Callback executed when a worker thread stops.
    pub on_thread_stop: Option<Arc<dyn Fn() + Send + Sync>>,
    /// Observer notified of has-work / shutdown / destruction events.
    pub observer: Option<Arc<dyn PoolObserver>>,
}

impl PoolConfig {
    /// Normalize configuration values to safe defaults.
    pub fn normalize(&mut self) {
        if self.max_threads == 0 {
            self.max_threads = 1;
        }
        if self.thread_name_prefix.is_empty() {
            self.thread_name_prefix = "seqpool".to_string();
        }
    }
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_threads: 4,
            thread_name_prefix: "seqpool".to_string(),
            thread_stack_size: 0,
            on_thread_start: None,
            on_thread_stop: None,
            observer: None,
        }
    }
}

impl fmt::Debug for PoolConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PoolConfig")
            .field("max_threads", &self.max_threads)
            .field("thread_name_prefix", &self.thread_name_prefix)
            .field("thread_stack_size", &self.thread_stack_size)
            .field("on_thread_start", &self.on_thread_start.is_some())
            .field("on_thread_stop", &self.on_thread_stop.is_some())
            .field("observer", &self.observer.is_some())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn init_test(name: &str) {
        crate::test_utils::init_test_logging();
        crate::test_phase!(name);
    }

    #[test]
    fn test_default_config_sane() {
        init_test("test_default_config_sane");
        let config = PoolConfig::default();
        crate::assert_with_log!(
            config.max_threads >= 1,
            "max_threads",
            true,
            config.max_threads >= 1
        );
        crate::assert_with_log!(
            !config.thread_name_prefix.is_empty(),
            "thread_name_prefix",
            true,
            !config.thread_name_prefix.is_empty()
        );
        crate::assert_with_log!(
            config.thread_stack_size == 0,
            "thread_stack_size",
            0,
            config.thread_stack_size
        );
        crate::test_complete!("test_default_config_sane");
    }

    #[test]
    fn test_normalize_enforces_minimums() {
        init_test("test_normalize_enforces_minimums");
        let mut config = PoolConfig {
            max_threads: 0,
            thread_name_prefix: String::new(),
            ..PoolConfig::default()
        };
        config.normalize();
        crate::assert_with_log!(config.max_threads == 1, "max_threads", 1, config.max_threads);
        crate::assert_with_log!(
            config.thread_name_prefix == "seqpool",
            "thread_name_prefix",
            "seqpool",
            config.thread_name_prefix
        );
        crate::test_complete!("test_normalize_enforces_minimums");
    }

    #[test]
    fn test_normalize_preserves_custom_values() {
        init_test("test_normalize_preserves_custom_values");
        let mut config = PoolConfig {
            max_threads: 8,
            thread_name_prefix: "custom".to_string(),
            thread_stack_size: 1024 * 1024,
            ..PoolConfig::default()
        };
        config.normalize();
        crate::assert_with_log!(config.max_threads == 8, "max_threads", 8, config.max_threads);
        crate::assert_with_log!(
            config.thread_name_prefix == "custom",
            "thread_name_prefix",
            "custom",
            config.thread_name_prefix
        );
        crate::assert_with_log!(
            config.thread_stack_size == 1024 * 1024,
            "thread_stack_size",
            1024 * 1024,
            config.thread_stack_size
        );
        crate::test_complete!("test_normalize_preserves_custom_values");
    }
}

//! Sequence tokens.
//!
//! A [`SequenceToken`] groups tasks that must execute in strict submission
//! order relative to each other. Tokens are pure values: equality-comparable,
//! copyable, never destroyed. Ids are allocated from a process-wide atomic
//! counter, so tokens are unique across every pool in the process.

use std::sync::atomic::{AtomicU64, Ordering};

/// Process-wide id source. Starts at 0; allocation returns `previous + 1`,
/// which keeps id 0 reserved for the invalid token.
static NEXT_SEQUENCE_TOKEN_ID: AtomicU64 = AtomicU64::new(0);

/// An opaque identifier grouping tasks into an ordered sequence.
///
/// Obtain one from [`SequencedPool::sequence_token`] or
/// [`SequencedPool::named_sequence_token`], then post work against it with the
/// `post_sequenced*` family. Tasks sharing a valid token execute one at a
/// time, in submission order.
///
/// [`SequencedPool::sequence_token`]: crate::SequencedPool::sequence_token
/// [`SequencedPool::named_sequence_token`]: crate::SequencedPool::named_sequence_token
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SequenceToken {
    id: u64,
}

impl SequenceToken {
    /// Allocates a fresh, process-wide unique token.
    pub(crate) fn next() -> Self {
        Self {
            id: NEXT_SEQUENCE_TOKEN_ID.fetch_add(1, Ordering::Relaxed) + 1,
        }
    }

    /// The reserved "no sequence" token (id 0).
    pub(crate) const fn invalid() -> Self {
        Self { id: 0 }
    }

    /// Returns `true` if this token identifies an actual sequence.
    #[must_use]
    pub const fn is_valid(self) -> bool {
        self.id != 0
    }

    /// Raw id; 0 means unsequenced.
    pub(crate) const fn raw(self) -> u64 {
        self.id
    }

    /// Rebuilds a token from a raw id held in the worker registry.
    pub(crate) const fn from_raw(id: u64) -> Self {
        Self { id }
    }
}

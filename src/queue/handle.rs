//! Nullable-handle surface over [`StringQueue`].
//!
//! Every function accepts an absent queue: lookups answer as if the queue were
//! empty, mutations are no-ops or fail with [`QueueError::InvalidArgument`].

use super::error::{Inserted, QueueError, Result};
use super::StringQueue;

use tracing::debug;

const ABSENT: QueueError = QueueError::InvalidArgument("queue is absent");

/// Creates a new empty queue, or `None` when its storage cannot be allocated.
pub fn queue_new() -> Option<Box<StringQueue>> {
    StringQueue::try_new_boxed().ok()
}

/// Releases the queue together with every element it still holds.
pub fn queue_free(q: Option<Box<StringQueue>>) {
    if let Some(q) = q {
        debug!(size = q.size(), "freeing queue");
        drop(q);
    }
}

pub fn queue_insert_head(q: Option<&mut StringQueue>, s: &str) -> Result<Inserted> {
    q.ok_or(ABSENT)?.insert_head(s)
}

pub fn queue_insert_tail(q: Option<&mut StringQueue>, s: &str) -> Result<Inserted> {
    q.ok_or(ABSENT)?.insert_tail(s)
}

/// See [`StringQueue::remove_head`] for the buffer contract.
pub fn queue_remove_head(q: Option<&mut StringQueue>, buf: Option<&mut [u8]>) -> Result<()> {
    q.ok_or(ABSENT)?.remove_head(buf)
}

pub fn queue_size(q: Option<&StringQueue>) -> usize {
    q.map_or(0, StringQueue::size)
}

pub fn queue_reverse(q: Option<&mut StringQueue>) {
    if let Some(q) = q {
        q.reverse();
    }
}

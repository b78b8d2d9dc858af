//! A queue of owned strings supporting insertion at either end, removal from
//! the front, constant-time size and in-place reversal.

pub mod queue;

pub use queue::{Inserted, QueueError, StringQueue};

mod error;
pub mod handle;
mod string_queue;


pub use self::error::{Inserted, QueueError, Result};
pub use self::string_queue::StringQueue;

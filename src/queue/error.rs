/// Result type for queue operations.
pub type Result<T> = std::result::Result<T, QueueError>;

/// Reasons a queue operation can fail.
///
/// A failed operation leaves the queue exactly as it was before the call.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[non_exhaustive]
pub enum QueueError {
    /// Absent queue handle, or a zero-capacity output buffer.
    #[error("invalid argument: {0}")]
    InvalidArgument(&'static str),

    /// Storage for the queue, a node or a value copy could not be obtained.
    #[error("allocation failed for {what}")]
    AllocationError { what: &'static str },

    /// The text plus its terminator does not fit in an allocation size.
    #[error("value of length {len} is too large to copy")]
    LengthOverflow { len: usize },

    /// Removal from a queue with no elements.
    #[error("queue is empty")]
    Empty,
}

impl QueueError {
    pub(crate) fn alloc(what: &'static str) -> Self {
        Self::AllocationError { what }
    }
}

/// Outcome of a successful insertion.
///
/// `CountOverflow` is a tolerated boundary quirk: the value was linked into the
/// queue but the element count was already `usize::MAX` and was left as is, so
/// `size()` under-reports by one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Inserted {
    Counted,
    CountOverflow,
}

use super::error::{Inserted, QueueError, Result};

use std::alloc::Layout;
use std::ptr::NonNull;

use tracing::{trace, warn};

struct Node {
    value: String,
    next: Option<NonNull<Node>>,
}

impl Node {
    // On allocator failure `value` is dropped and nothing is linked.
    unsafe fn alloc(value: String, next: Option<NonNull<Node>>) -> Result<NonNull<Self>> {
        let layout = Layout::new::<Node>();
        let ptr = std::alloc::alloc(layout) as *mut Node;
        match NonNull::new(ptr) {
            Some(node_ptr) => {
                node_ptr.as_ptr().write(Self { value, next });
                Ok(node_ptr)
            }
            None => {
                warn!("allocation for queue node failed");
                Err(QueueError::alloc("node"))
            }
        }
    }

    unsafe fn dealloc(ptr: NonNull<Self>) {
        let layout = Layout::new::<Node>();
        std::alloc::dealloc(ptr.as_ptr() as *mut u8, layout);
    }

    unsafe fn consume(ptr: NonNull<Self>) -> String {
        let value = std::ptr::read(&ptr.as_ref().value);
        Node::dealloc(ptr);
        value
    }
}

/// Size of the buffer needed to hold `len` bytes of text plus a terminator.
pub(crate) fn checked_value_size(len: usize) -> Result<usize> {
    match len.checked_add(1) {
        Some(size) if size <= isize::MAX as usize => Ok(size),
        _ => {
            warn!(len, "value length plus terminator overflows");
            Err(QueueError::LengthOverflow { len })
        }
    }
}

fn copy_value(s: &str) -> Result<String> {
    checked_value_size(s.len())?;

    let mut value = String::new();
    if value.try_reserve_exact(s.len()).is_err() {
        warn!(len = s.len(), "allocation for value copy failed");
        return Err(QueueError::alloc("value"));
    }
    value.push_str(s);
    Ok(value)
}

// strncpy(buf, value, cap - 1) followed by a terminator at cap - 1
fn copy_truncated(value: &str, buf: &mut [u8]) {
    let n = value.len().min(buf.len() - 1);
    let (copied, rest) = buf.split_at_mut(n);
    copied.copy_from_slice(&value.as_bytes()[..n]);
    rest.fill(0);
}

/// A queue of owned strings backed by a singly-linked chain.
///
/// - O(1) insert at head or tail
/// - O(1) remove from head
/// - O(1) size
/// - O(n) in-place reverse, no allocation
///
/// Every inserted value is copied, so the queue never shares a buffer with the
/// caller.
pub struct StringQueue {
    head: Option<NonNull<Node>>,
    tail: Option<NonNull<Node>>,
    len: usize,
    // invariant: head.is_none() == tail.is_none()
    // invariant: tail is reachable from head and tail.next is None
}

unsafe impl Send for StringQueue {}
unsafe impl Sync for StringQueue {}

impl StringQueue {
    pub fn new() -> Self {
        Self {
            head: None,
            tail: None,
            len: 0,
        }
    }

    /// Allocates an empty queue on the heap, reporting allocator exhaustion
    /// as an error instead of aborting.
    pub fn try_new_boxed() -> Result<Box<Self>> {
        let layout = Layout::new::<StringQueue>();
        unsafe {
            let ptr = std::alloc::alloc(layout) as *mut StringQueue;
            if ptr.is_null() {
                warn!("allocation for queue failed");
                return Err(QueueError::alloc("queue"));
            }
            ptr.write(Self::new());
            Ok(Box::from_raw(ptr))
        }
    }

    pub fn is_empty(&self) -> bool {
        self.head.is_none()
    }

    /// Number of elements. Never walks the chain.
    pub fn size(&self) -> usize {
        if self.head.is_none() {
            return 0;
        }
        self.len
    }

    pub fn peek_head(&self) -> Option<&str> {
        self.head
            .map(|ptr| unsafe { (*ptr.as_ptr()).value.as_str() })
    }

    pub fn peek_tail(&self) -> Option<&str> {
        self.tail
            .map(|ptr| unsafe { (*ptr.as_ptr()).value.as_str() })
    }

    /// Copies `s` into a new node and links it in front of the current head.
    pub fn insert_head(&mut self, s: &str) -> Result<Inserted> {
        let value = copy_value(s)?;
        let node_ptr = unsafe { Node::alloc(value, self.head)? };

        self.head = Some(node_ptr);
        if self.tail.is_none() {
            self.tail = Some(node_ptr);
        }

        let inserted = self.bump_len();
        trace!(size = self.len, "inserted at head");
        Ok(inserted)
    }

    /// Copies `s` into a new node and links it after the current tail.
    pub fn insert_tail(&mut self, s: &str) -> Result<Inserted> {
        let value = copy_value(s)?;
        let node_ptr = unsafe { Node::alloc(value, None)? };

        match self.tail {
            Some(mut tail_ptr) => unsafe { tail_ptr.as_mut().next = Some(node_ptr) },
            None => self.head = Some(node_ptr),
        }
        self.tail = Some(node_ptr);

        let inserted = self.bump_len();
        trace!(size = self.len, "inserted at tail");
        Ok(inserted)
    }

    fn bump_len(&mut self) -> Inserted {
        match self.len.checked_add(1) {
            Some(len) => {
                self.len = len;
                Inserted::Counted
            }
            None => {
                warn!("too many elements, queue size left at usize::MAX");
                Inserted::CountOverflow
            }
        }
    }

    /// Unlinks the head and hands its value to the caller.
    pub fn pop_head(&mut self) -> Option<String> {
        let head_ptr = self.head?;
        unsafe {
            let next = head_ptr.as_ref().next;
            if self.tail == Some(head_ptr) {
                self.tail = next;
            }
            self.head = next;
            self.len = self.len.saturating_sub(1);
            Some(Node::consume(head_ptr))
        }
    }

    /// Removes the head element.
    ///
    /// When `buf` is given, up to `buf.len() - 1` bytes of the removed value are
    /// copied into it and the remainder of `buf` is zero-filled, so the last
    /// byte is always a terminator. Longer values are truncated.
    ///
    /// Fails with [`QueueError::Empty`] on an empty queue and with
    /// [`QueueError::InvalidArgument`] for a zero-length `buf`; the queue is
    /// not modified in either case.
    pub fn remove_head(&mut self, buf: Option<&mut [u8]>) -> Result<()> {
        if self.head.is_none() {
            return Err(QueueError::Empty);
        }
        if matches!(&buf, Some(buf) if buf.is_empty()) {
            warn!("output buffer capacity must be nonzero");
            return Err(QueueError::InvalidArgument(
                "output buffer capacity must be nonzero",
            ));
        }

        let value = self.pop_head().ok_or(QueueError::Empty)?;
        if let Some(buf) = buf {
            copy_truncated(&value, buf);
        }
        trace!(size = self.size(), "removed head");
        Ok(())
    }

    /// Reverses the chain in place by relinking nodes.
    pub fn reverse(&mut self) {
        let Some(head_ptr) = self.head else {
            return;
        };

        let mut prev: Option<NonNull<Node>> = None;
        let mut cur = Some(head_ptr);
        while let Some(mut cur_ptr) = cur {
            unsafe {
                let next = cur_ptr.as_ref().next;
                cur_ptr.as_mut().next = prev;
                prev = Some(cur_ptr);
                cur = next;
            }
        }

        self.tail = Some(head_ptr);
        self.head = prev;
    }

    #[cfg(test)]
    pub(crate) fn set_len(&mut self, len: usize) {
        self.len = len;
    }

    /// Walks the chain and panics if head, tail or the count disagree with it.
    #[cfg(test)]
    pub(crate) fn check_invariants(&self) {
        let mut count = 0usize;
        let mut last = None;
        let mut cur = self.head;
        while let Some(ptr) = cur {
            count += 1;
            last = Some(ptr);
            cur = unsafe { ptr.as_ref().next };
        }
        assert_eq!(last, self.tail, "tail is not the end of the chain");
        assert_eq!(count, self.len, "count does not match chain length");
        assert_eq!(self.head.is_none(), self.tail.is_none());
    }
}

impl Default for StringQueue {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for StringQueue {
    fn drop(&mut self) {
        let mut cur = self.head.take();
        self.tail = None;
        self.len = 0;
        while let Some(ptr) = cur {
            unsafe {
                cur = ptr.as_ref().next;
                drop(Node::consume(ptr));
            }
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn drain(q: &mut StringQueue) -> Vec<String> {
        std::iter::from_fn(|| q.pop_head()).collect()
    }

    #[test]
    fn test_string_queue() {
        let mut q = StringQueue::new();
        assert!(q.is_empty());
        assert_eq!(q.size(), 0);

        assert_eq!(q.insert_head("b").unwrap(), Inserted::Counted);
        assert_eq!(q.insert_head("a").unwrap(), Inserted::Counted);
        assert_eq!(q.insert_tail("c").unwrap(), Inserted::Counted);
        q.check_invariants();
        assert_eq!(q.size(), 3);
        assert_eq!(q.peek_head(), Some("a"));
        assert_eq!(q.peek_tail(), Some("c"));

        q.reverse();
        q.check_invariants();
        assert_eq!(q.peek_head(), Some("c"));
        assert_eq!(q.peek_tail(), Some("a"));

        assert_eq!(drain(&mut q), ["c", "b", "a"]);
        q.check_invariants();
        assert!(q.is_empty());

        for s in ["x", "y", "z"] {
            q.insert_tail(s).unwrap();
        }
        drop(q);
    }

    #[test]
    fn test_fifo_and_lifo() {
        let mut fifo = StringQueue::new();
        let mut lifo = StringQueue::new();
        for s in ["a", "b", "c"] {
            fifo.insert_tail(s).unwrap();
            lifo.insert_head(s).unwrap();
        }
        assert_eq!(drain(&mut fifo), ["a", "b", "c"]);
        assert_eq!(drain(&mut lifo), ["c", "b", "a"]);
    }

    #[test]
    fn test_single_element_head_is_tail() {
        let mut q = StringQueue::new();
        q.insert_tail("only").unwrap();
        assert_eq!(q.head, q.tail);
        q.reverse();
        assert_eq!(q.head, q.tail);
        assert_eq!(q.pop_head().as_deref(), Some("only"));
        assert!(q.head.is_none() && q.tail.is_none());

        // tail must be refreshed once the queue drained to empty
        q.insert_head("again").unwrap();
        q.insert_tail("after").unwrap();
        q.check_invariants();
        assert_eq!(drain(&mut q), ["again", "after"]);
    }

    #[test]
    fn test_insert_copies_value() {
        let mut q = StringQueue::new();
        let mut src = String::from("hello");
        q.insert_head(&src).unwrap();
        src.push_str(" world");
        assert_eq!(q.pop_head().as_deref(), Some("hello"));
    }

    #[test]
    fn test_remove_head_into_buffer() {
        let mut q = StringQueue::new();
        q.insert_tail("abcdef").unwrap();
        q.insert_tail("ab").unwrap();
        q.insert_tail("gone").unwrap();

        let mut buf = [0xffu8; 4];
        q.remove_head(Some(&mut buf[..])).unwrap();
        assert_eq!(&buf, b"abc\0");

        let mut buf = [0xffu8; 6];
        q.remove_head(Some(&mut buf[..])).unwrap();
        assert_eq!(&buf, b"ab\0\0\0\0");

        q.remove_head(None).unwrap();
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn test_remove_head_rejects_bad_calls() {
        let mut q = StringQueue::new();
        let mut buf = [0u8; 8];
        assert_eq!(q.remove_head(Some(&mut buf[..])), Err(QueueError::Empty));
        assert_eq!(q.remove_head(None), Err(QueueError::Empty));
        assert_eq!(q.size(), 0);

        q.insert_tail("kept").unwrap();
        let mut empty: [u8; 0] = [];
        assert!(matches!(
            q.remove_head(Some(&mut empty[..])),
            Err(QueueError::InvalidArgument(_))
        ));
        assert_eq!(q.size(), 1);
        assert_eq!(q.peek_head(), Some("kept"));

        let mut one = [0xffu8; 1];
        q.remove_head(Some(&mut one[..])).unwrap();
        assert_eq!(one, [0]);
    }

    #[test]
    fn test_reverse_empty_is_noop() {
        let mut q = StringQueue::new();
        q.reverse();
        assert!(q.is_empty());
        q.check_invariants();
    }

    #[test]
    fn test_length_overflow() {
        assert_eq!(checked_value_size(0), Ok(1));
        assert_eq!(checked_value_size(5), Ok(6));
        assert_eq!(
            checked_value_size(usize::MAX),
            Err(QueueError::LengthOverflow { len: usize::MAX })
        );
        assert_eq!(
            checked_value_size(isize::MAX as usize),
            Err(QueueError::LengthOverflow {
                len: isize::MAX as usize
            })
        );
    }

    #[test]
    fn test_count_overflow_keeps_value() {
        let mut q = StringQueue::new();
        q.insert_tail("first").unwrap();
        q.set_len(usize::MAX);

        assert_eq!(q.insert_tail("second").unwrap(), Inserted::CountOverflow);
        assert_eq!(q.insert_head("zeroth").unwrap(), Inserted::CountOverflow);
        assert_eq!(q.size(), usize::MAX);
        assert_eq!(q.peek_head(), Some("zeroth"));
        assert_eq!(q.peek_tail(), Some("second"));

        assert_eq!(drain(&mut q), ["zeroth", "first", "second"]);
        assert_eq!(q.size(), 0);
    }

    #[test]
    fn test_try_new_boxed() {
        let mut q = StringQueue::try_new_boxed().unwrap();
        assert!(q.is_empty());
        q.insert_head("boxed").unwrap();
        assert_eq!(q.size(), 1);
    }
}

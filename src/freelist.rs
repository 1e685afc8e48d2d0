use crate::error::PoolError;

/// FIFO ring buffer keeping track of the blocks a [`crate::chunk::Chunk`] got back.
///
/// Blocks are identified by their index inside the chunk, so the list never
/// has to look inside the blocks themselves. A chunk of `capacity` blocks can
/// have at most `capacity` of them returned, but the buffer has one slot more:
/// with `capacity + 1` slots `head == tail` always means "empty" and never
/// "completely full".
///
/// ```text
///              head                  tail
///               |                     |
///               v                     v
/// +-----+-----+-----+-----+-----+-----+-----+-----+
/// |     |     |  3  |  0  |  7  |  1  |     |     |   slots: capacity + 1
/// +-----+-----+-----+-----+-----+-----+-----+-----+
///                  oldest ------> newest
/// ```
pub(crate) struct FreeList {
    slots: Box<[usize]>,
    /// Next slot to pop from.
    head: usize,
    /// Next slot to push to.
    tail: usize,
}

impl FreeList {
    /// Creates an empty list able to hold `capacity` block indices.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            slots: vec![0; capacity + 1].into_boxed_slice(),
            head: 0,
            tail: 0,
        }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.head == self.tail
    }

    #[inline]
    pub fn is_full(&self) -> bool {
        self.advance(self.tail) == self.head
    }

    /// Number of indices currently stored.
    pub fn len(&self) -> usize {
        (self.tail + self.slots.len() - self.head) % self.slots.len()
    }

    /// Appends `index` as the newest entry.
    pub fn push(&mut self, index: usize) -> Result<(), PoolError> {
        if self.is_full() {
            return Err(PoolError::FreeListFull);
        }

        self.slots[self.tail] = index;
        self.tail = self.advance(self.tail);

        Ok(())
    }

    /// Removes and returns the oldest entry.
    pub fn pop(&mut self) -> Option<usize> {
        if self.is_empty() {
            return None;
        }

        let index = self.slots[self.head];
        self.head = self.advance(self.head);

        Some(index)
    }

    #[inline]
    fn advance(&self, slot: usize) -> usize {
        (slot + 1) % self.slots.len()
    }
}

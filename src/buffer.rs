//! Fixed-capacity circular buffer emulating the device memory.

/// Circular buffer of a fixed capacity.
///
/// Values are stored at the cursor position and the cursor advances modulo the capacity, so once the buffer
/// wraps, new values overwrite the oldest ones. Storage is allocated once and never grows.
#[derive(Debug, Clone)]
pub struct RingBuffer<T> {
    inner: Box<[T]>,
    cursor: usize,
}

impl<T: Copy + Default> RingBuffer<T> {
    /// Creates a buffer filled with default values.
    pub fn new(capacity: usize) -> Self {
        RingBuffer {
            inner: vec![T::default(); capacity].into_boxed_slice(),
            cursor: 0,
        }
    }

    /// Stores a value at the cursor position and advances the cursor, wrapping at the end of the buffer.
    pub fn push(&mut self, item: T) {
        self.inner[self.cursor] = item;
        self.cursor = (self.cursor + 1) % self.inner.len();
    }

    /// Returns the value at the cursor position.
    pub fn current(&self) -> T {
        self.inner[self.cursor]
    }

    /// Returns the value at `index` or [`None`] if the index is not less than the capacity.
    pub fn get(&self, index: usize) -> Option<T> {
        self.inner.get(index).copied()
    }

    /// Replaces the buffer content with `items`.
    /// Items exceeding the capacity are ignored, unused slots are reset to the default value.
    pub fn load(&mut self, items: &[T]) {
        let count = items.len().min(self.inner.len());

        self.inner[..count].copy_from_slice(&items[..count]);
        self.inner[count..].fill(T::default());
        self.cursor = 0;
    }

    /// Returns a copy of the buffer content and the cursor position.
    pub fn snapshot(&self) -> (Vec<T>, usize) {
        (self.inner.to_vec(), self.cursor)
    }

    pub fn reset_cursor(&mut self) {
        self.cursor = 0;
    }

    pub fn cursor(&self) -> usize {
        self.cursor
    }

    pub fn capacity(&self) -> usize {
        self.inner.len()
    }

    pub fn as_slice(&self) -> &[T] {
        &self.inner
    }
}

#[cfg(test)]
mod test {
    use rstest::*;

    use super::RingBuffer;

    #[test]
    fn test_ring_buffer_wraps() {
        let mut buffer = RingBuffer::new(3);

        buffer.push(1);
        buffer.push(2);
        assert_eq!(buffer.cursor(), 2);
        buffer.push(3);
        assert_eq!(buffer.cursor(), 0);
        assert_eq!(buffer.current(), 1);

        buffer.push(4);
        assert_eq!(buffer.as_slice(), &[4, 2, 3]);
        assert_eq!(buffer.current(), 2);
    }

    #[rstest]
    #[case(vec![7, 8], vec![7, 8, 0, 0])]
    #[case(vec![1, 2, 3, 4], vec![1, 2, 3, 4])]
    #[case(vec![1, 2, 3, 4, 5, 6], vec![1, 2, 3, 4])]
    #[case(vec![], vec![0, 0, 0, 0])]
    fn test_ring_buffer_load(#[case] items: Vec<u32>, #[case] expected: Vec<u32>) {
        let mut buffer = RingBuffer::new(4);
        buffer.push(9);
        buffer.push(9);

        buffer.load(&items);

        let (content, cursor) = buffer.snapshot();
        assert_eq!(content, expected);
        assert_eq!(cursor, 0);
    }

    #[test]
    fn test_ring_buffer_bounds() {
        let mut buffer = RingBuffer::new(2);
        buffer.push(5u32);

        assert_eq!(buffer.get(0), Some(5));
        assert_eq!(buffer.get(1), Some(0));
        assert_eq!(buffer.get(2), None);

        buffer.reset_cursor();
        assert_eq!(buffer.current(), 5);
        assert_eq!(buffer.capacity(), 2);
    }
}

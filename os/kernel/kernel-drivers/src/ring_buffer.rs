//! Fixed-capacity byte queue that overwrites its oldest byte when full.

pub struct RingBuffer<const N: usize> {
    buf: [u8; N],
    /// Index of the oldest byte.
    head: usize,
    len: usize,
    dropped: usize,
}

impl<const N: usize> RingBuffer<N> {
    const NON_EMPTY: () = assert!(N > 0, "ring buffer needs capacity");

    #[must_use]
    pub const fn new() -> Self {
        let () = Self::NON_EMPTY;
        Self {
            buf: [0; N],
            head: 0,
            len: 0,
            dropped: 0,
        }
    }

    #[must_use]
    pub const fn capacity(&self) -> usize {
        N
    }

    #[must_use]
    pub const fn len(&self) -> usize {
        self.len
    }

    #[must_use]
    pub const fn is_empty(&self) -> bool {
        self.len == 0
    }

    #[must_use]
    pub const fn is_full(&self) -> bool {
        self.len == N
    }

    /// Bytes lost to overflow since creation.
    #[must_use]
    pub const fn dropped(&self) -> usize {
        self.dropped
    }

    /// Append a byte; when full the oldest byte is discarded.
    pub const fn push(&mut self, byte: u8) {
        if self.len == N {
            self.buf[self.head] = byte;
            self.head = (self.head + 1) % N;
            self.dropped += 1;
        } else {
            self.buf[(self.head + self.len) % N] = byte;
            self.len += 1;
        }
    }

    pub const fn pop(&mut self) -> Option<u8> {
        if self.len == 0 {
            return None;
        }
        let byte = self.buf[self.head];
        self.head = (self.head + 1) % N;
        self.len -= 1;
        Some(byte)
    }

    /// Move up to `out.len()` of the oldest bytes into `out`.
    pub fn drain_into(&mut self, out: &mut [u8]) -> usize {
        let mut n = 0;
        for slot in out.iter_mut() {
            let Some(b) = self.pop() else { break };
            *slot = b;
            n += 1;
        }
        n
    }

    pub const fn clear(&mut self) {
        self.head = 0;
        self.len = 0;
    }
}

impl<const N: usize> Default for RingBuffer<N> {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fifo_order() {
        let mut rb = RingBuffer::<4>::new();
        assert!(rb.is_empty());
        rb.push(1);
        rb.push(2);
        rb.push(3);
        assert_eq!(rb.len(), 3);
        assert_eq!(rb.pop(), Some(1));
        assert_eq!(rb.pop(), Some(2));
        assert_eq!(rb.pop(), Some(3));
        assert_eq!(rb.pop(), None);
    }

    #[test]
    fn overflow_drops_the_oldest() {
        let mut rb = RingBuffer::<3>::new();
        for b in 1..=5 {
            rb.push(b);
        }
        assert!(rb.is_full());
        assert_eq!(rb.dropped(), 2);

        let mut out = [0; 8];
        assert_eq!(rb.drain_into(&mut out), 3);
        assert_eq!(&out[..3], &[3, 4, 5]);
        assert!(rb.is_empty());
    }

    #[test]
    fn wraps_around_repeatedly() {
        let mut rb = RingBuffer::<2>::new();
        for i in 0..10u8 {
            rb.push(i);
            assert_eq!(rb.pop(), Some(i));
        }
        assert_eq!(rb.dropped(), 0);
    }

    #[test]
    fn drain_stops_at_output_length() {
        let mut rb = RingBuffer::<8>::new();
        for &b in b"keyboard" {
            rb.push(b);
        }
        let mut out = [0; 3];
        assert_eq!(rb.drain_into(&mut out), 3);
        assert_eq!(&out, b"key");
        assert_eq!(rb.len(), 5);
        rb.clear();
        assert!(rb.is_empty());
    }
}

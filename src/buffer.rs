//! Growable buffer for bytes received but not yet consumed.
//!
//! The parser appends each transport fragment as it arrives and consumes
//! strictly from the front, one 512-byte block multiple at a time.  Once a
//! full header/content unit has been consumed, the remaining length is
//! therefore always block-aligned relative to the archive stream.

use crate::error::Result;

/// FIFO byte accumulator with front consumption.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    data: Vec<u8>,
}

impl ChunkBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// All buffered bytes, oldest first.  The slice is invalidated by
    /// [`append`](Self::append) and [`consume`](Self::consume).
    pub fn bytes(&self) -> &[u8] {
        &self.data
    }

    /// Appends `bytes` at the end.  Allocation failure is reported instead
    /// of aborting, since the length is attacker-influenced.
    pub fn append(&mut self, bytes: &[u8]) -> Result<()> {
        self.data.try_reserve(bytes.len())?;
        self.data.extend_from_slice(bytes);
        Ok(())
    }

    /// Removes the first `n` bytes.  Consuming everything (or more) releases
    /// the backing storage entirely.
    pub fn consume(&mut self, n: usize) {
        if n >= self.data.len() {
            self.data = Vec::new();
        } else {
            self.data.drain(..n);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_and_consume() {
        let mut buf = ChunkBuffer::new();
        assert!(buf.is_empty());

        buf.append(b"hello ").unwrap();
        buf.append(b"world").unwrap();
        assert_eq!(buf.bytes(), b"hello world");

        buf.consume(6);
        assert_eq!(buf.bytes(), b"world");
        assert_eq!(buf.len(), 5);
    }

    #[test]
    fn consume_everything_releases_storage() {
        let mut buf = ChunkBuffer::new();
        buf.append(&[0xaa; 4096]).unwrap();

        buf.consume(4096);
        assert!(buf.is_empty());
        assert_eq!(buf.data.capacity(), 0);

        // consuming past the end is equivalent
        buf.append(b"abc").unwrap();
        buf.consume(100);
        assert!(buf.is_empty());
    }

    #[test]
    fn consume_zero_is_a_noop() {
        let mut buf = ChunkBuffer::new();
        buf.append(b"abc").unwrap();
        buf.consume(0);
        assert_eq!(buf.bytes(), b"abc");
    }
}

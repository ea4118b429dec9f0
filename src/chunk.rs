//! Reusable staging buffer for reads and writes

/// Resizable byte buffer reused across entries
///
/// `prepare` always hands out a zeroed slice, so nothing from a previous use
/// leaks into the next one.
#[derive(Debug, Default)]
pub struct ChunkBuffer {
    data: Vec<u8>,
}

impl ChunkBuffer {
    /// Create a buffer with `size` bytes of capacity
    pub fn with_capacity(size: usize) -> Self {
        Self {
            data: Vec::with_capacity(size),
        }
    }

    /// Clear the buffer and return a zeroed slice of exactly `size` bytes
    pub fn prepare(&mut self, size: usize) -> &mut [u8] {
        self.data.clear();
        self.data.resize(size, 0);
        &mut self.data
    }

    /// Bytes currently handed out by the last `prepare`
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Free the underlying allocation
    pub fn release(&mut self) {
        self.data = Vec::new();
    }
}

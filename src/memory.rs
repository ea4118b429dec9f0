//! Growable in-memory backing store
//!
//! `MemoryBuffer` lets the codec engine read, write and seek against a byte
//! region instead of a file. It keeps its own position, grows on demand while
//! writes run past the end, and hands back exactly the bytes written when the
//! archive is finalized.

use crate::chunk::ChunkBuffer;
use crate::error::{Result, ZipperError};
use crate::writer::{ContainerMode, Storage};
use std::io::{self, Read, Seek, SeekFrom, Write};

/// Smallest growth step once the buffer has to reallocate
const MIN_GROWTH: usize = 64 * 1024;

/// Default chunk size used when loading a stream into memory
pub const DEFAULT_STREAM_COPY_CHUNK: usize = 1024 * 1024;

/// Owned, growable byte region with a cursor
#[derive(Debug)]
pub struct MemoryBuffer {
    data: Vec<u8>,
    position: usize,
}

impl Default for MemoryBuffer {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryBuffer {
    /// Empty buffer; nothing is allocated until the first write
    pub fn new() -> Self {
        Self {
            data: Vec::new(),
            position: 0,
        }
    }

    /// Copy an existing container into a freshly allocated buffer of exact size
    ///
    /// An empty slice allocates nothing.
    pub fn from_existing(bytes: &[u8]) -> Result<Self> {
        let mut data = Vec::new();
        data.try_reserve_exact(bytes.len())
            .map_err(|_| ZipperError::opening("Failed to allocate memory"))?;
        data.extend_from_slice(bytes);

        Ok(Self {
            data,
            position: 0,
        })
    }

    /// Load the whole content of `stream` through a bounded staging buffer
    ///
    /// The buffer is sized from the stream's reported length. When the stream
    /// yields fewer bytes than reported, the buffer is shrunk to what was read.
    pub fn from_stream<R: Read + Seek + ?Sized>(
        stream: &mut R,
        staging: &mut ChunkBuffer,
        chunk_size: usize,
    ) -> Result<Self> {
        let reported = stream
            .seek(SeekFrom::End(0))
            .and_then(|end| stream.seek(SeekFrom::Start(0)).map(|_| end))
            .map_err(|e| ZipperError::opening(format!("Cannot measure stream: {}", e)))?;
        let size = usize::try_from(reported)
            .map_err(|_| ZipperError::opening("Stream too large for memory"))?;

        let mut data = Vec::new();
        data.try_reserve_exact(size)
            .map_err(|_| ZipperError::opening("Failed to allocate memory"))?;

        let buf = staging.prepare(chunk_size.max(1).min(size));
        let mut remaining = size;
        while remaining > 0 {
            let want = buf.len().min(remaining);
            let n = match stream.read(&mut buf[..want]) {
                Ok(0) => break,
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ZipperError::opening(format!("Cannot read stream: {}", e)));
                }
            };
            data.extend_from_slice(&buf[..n]);
            remaining -= n;
        }

        if remaining > 0 {
            log::warn!(
                "stream reported {} bytes but yielded {}; shrinking buffer",
                size,
                data.len()
            );
            data.shrink_to_fit();
        }

        Ok(Self {
            data,
            position: 0,
        })
    }

    /// Create a fresh container when empty, append into it otherwise
    pub fn container_mode(&self) -> ContainerMode {
        if self.data.is_empty() {
            ContainerMode::Create
        } else {
            ContainerMode::AddInZip
        }
    }

    /// Bytes currently valid
    pub fn len(&self) -> usize {
        self.data.len()
    }

    pub fn is_empty(&self) -> bool {
        self.data.is_empty()
    }

    /// Bytes allocated
    pub fn capacity(&self) -> usize {
        self.data.capacity()
    }

    /// Hand out exactly the bytes written and leave the buffer empty
    pub fn finalize(&mut self) -> Vec<u8> {
        let mut bytes = std::mem::take(&mut self.data);
        bytes.shrink_to_fit();
        self.position = 0;
        bytes
    }

    fn reserve_for(&mut self, end: usize) -> io::Result<()> {
        let capacity = self.data.capacity();
        if end <= capacity {
            return Ok(());
        }

        let target = end.max(capacity.saturating_mul(2)).max(MIN_GROWTH);
        self.data
            .try_reserve_exact(target - self.data.len())
            .map_err(|e| io::Error::new(io::ErrorKind::OutOfMemory, e))
    }
}

impl Read for MemoryBuffer {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if self.position >= self.data.len() {
            return Ok(0);
        }
        let available = &self.data[self.position..];
        let n = available.len().min(buf.len());
        buf[..n].copy_from_slice(&available[..n]);
        self.position += n;
        Ok(n)
    }
}

impl Write for MemoryBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        let end = self
            .position
            .checked_add(buf.len())
            .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "write overflows"))?;
        self.reserve_for(end)?;

        // Seeking past the end leaves a gap that reads back as zeros
        if self.position > self.data.len() {
            self.data.resize(self.position, 0);
        }

        let overlap = self.data.len().min(end) - self.position;
        self.data[self.position..self.position + overlap].copy_from_slice(&buf[..overlap]);
        self.data.extend_from_slice(&buf[overlap..]);
        self.position = end;
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl Seek for MemoryBuffer {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        let (base, offset) = match pos {
            SeekFrom::Start(n) => (0i128, n as i128),
            SeekFrom::End(n) => (self.data.len() as i128, n as i128),
            SeekFrom::Current(n) => (self.position as i128, n as i128),
        };
        let target = base + offset;
        if target < 0 {
            return Err(io::Error::new(
                io::ErrorKind::InvalidInput,
                "seek before start of memory buffer",
            ));
        }
        self.position = usize::try_from(target)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "seek out of range"))?;
        Ok(self.position as u64)
    }
}

impl Storage for MemoryBuffer {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
        self.data.truncate(len);
        self.position = self.position.min(len);
        Ok(())
    }
}

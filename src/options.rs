//! Archive configuration

use crate::error::{Result, ZipperError};
use crate::memory::DEFAULT_STREAM_COPY_CHUNK;

/// Chunk size used to stream entry content into the codec
pub const DEFAULT_WRITE_CHUNK: usize = 64 * 1024;

/// Sources below this size are read in one go when precomputing their CRC
pub const DEFAULT_CRC_SINGLE_SHOT_LIMIT: u64 = 100 * 1024 * 1024;

/// What to do when a file destination already exists
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OverwritePolicy {
    /// Append new entries to the existing container
    #[default]
    Append,
    /// Remove the existing file and start a fresh container
    Overwrite,
}

/// Compression effort for an entry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum CompressionPolicy {
    /// No compression
    Store,
    Faster,
    #[default]
    Medium,
    Better,
}

impl CompressionPolicy {
    /// DEFLATE level handed to the codec
    pub fn level(self) -> u32 {
        match self {
            CompressionPolicy::Store => 0,
            CompressionPolicy::Faster => 1,
            CompressionPolicy::Medium => 5,
            CompressionPolicy::Better => 9,
        }
    }
}

impl TryFrom<u32> for CompressionPolicy {
    type Error = ZipperError;

    /// Accepts exactly the levels produced by [`CompressionPolicy::level`]
    fn try_from(level: u32) -> Result<Self> {
        match level {
            0 => Ok(CompressionPolicy::Store),
            1 => Ok(CompressionPolicy::Faster),
            5 => Ok(CompressionPolicy::Medium),
            9 => Ok(CompressionPolicy::Better),
            other => Err(ZipperError::internal(format!(
                "Unknown compression level: {}",
                other
            ))),
        }
    }
}

/// Settings shared by every entry of an archive
///
/// # Example
/// ```
/// use zipper::{ArchiveOptions, OverwritePolicy};
///
/// let options = ArchiveOptions::new()
///     .password("s3cret")
///     .overwrite(OverwritePolicy::Overwrite)
///     .write_chunk_size(16 * 1024);
/// assert_eq!(options.get_password(), Some("s3cret"));
/// ```
#[derive(Clone)]
pub struct ArchiveOptions {
    password: Option<String>,
    overwrite: OverwritePolicy,
    write_chunk_size: usize,
    stream_copy_chunk_size: usize,
    crc_single_shot_limit: u64,
}

impl Default for ArchiveOptions {
    fn default() -> Self {
        Self {
            password: None,
            overwrite: OverwritePolicy::default(),
            write_chunk_size: DEFAULT_WRITE_CHUNK,
            stream_copy_chunk_size: DEFAULT_STREAM_COPY_CHUNK,
            crc_single_shot_limit: DEFAULT_CRC_SINGLE_SHOT_LIMIT,
        }
    }
}

impl std::fmt::Debug for ArchiveOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ArchiveOptions")
            .field("password", &self.password.as_ref().map(|_| "<redacted>"))
            .field("overwrite", &self.overwrite)
            .field("write_chunk_size", &self.write_chunk_size)
            .field("stream_copy_chunk_size", &self.stream_copy_chunk_size)
            .field("crc_single_shot_limit", &self.crc_single_shot_limit)
            .finish()
    }
}

impl ArchiveOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Encrypt every entry with this password; an empty password disables encryption
    pub fn password(mut self, password: impl Into<String>) -> Self {
        let password = password.into();
        self.password = if password.is_empty() {
            None
        } else {
            Some(password)
        };
        self
    }

    pub fn overwrite(mut self, policy: OverwritePolicy) -> Self {
        self.overwrite = policy;
        self
    }

    /// Size of the chunks streamed into the codec (at least 1 byte)
    pub fn write_chunk_size(mut self, size: usize) -> Self {
        self.write_chunk_size = size.max(1);
        self
    }

    /// Size of the chunks used to load a stream destination (at least 1 byte)
    pub fn stream_copy_chunk_size(mut self, size: usize) -> Self {
        self.stream_copy_chunk_size = size.max(1);
        self
    }

    /// Sources smaller than this are read at once to precompute their CRC
    pub fn crc_single_shot_limit(mut self, limit: u64) -> Self {
        self.crc_single_shot_limit = limit;
        self
    }

    pub fn get_password(&self) -> Option<&str> {
        self.password.as_deref()
    }

    pub fn get_overwrite(&self) -> OverwritePolicy {
        self.overwrite
    }

    pub fn get_write_chunk_size(&self) -> usize {
        self.write_chunk_size
    }

    pub fn get_stream_copy_chunk_size(&self) -> usize {
        self.stream_copy_chunk_size
    }

    pub fn get_crc_single_shot_limit(&self) -> u64 {
        self.crc_single_shot_limit
    }

    pub(crate) fn set_overwrite(&mut self, policy: OverwritePolicy) {
        self.overwrite = policy;
    }
}

//! Streaming one source into one archive entry
//!
//! The protocol for an entry:
//! 1. reject empty names, canonicalize, refuse names escaping the root
//! 2. map the compression policy to a DEFLATE level
//! 3. measure the source to decide on zip64
//! 4. with a password, precompute the CRC (the encryption header needs it)
//! 5. open the entry, stream the source in chunks, close the entry
//!
//! Any failure after the entry was opened discards it, so the directory
//! never lists a partial entry.

use crate::chunk::ChunkBuffer;
use crate::error::{Result, ZipperError};
use crate::options::{ArchiveOptions, CompressionPolicy};
use crate::path;
use crate::timestamp::Timestamp;
use crate::writer::{Encryption, EntryHeader, Storage, ZipEncoder, ZIP64_THRESHOLD};
use crc32fast::Hasher as Crc32;
use std::io::{self, Read, Seek, SeekFrom};

/// Canonical form of `name`, validated for use as an entry name
pub fn validate_name(name: &str) -> Result<String> {
    if name.is_empty() {
        return Err(ZipperError::NoEntry("empty entry name".to_string()));
    }

    let canonical = path::canonicalize(name);

    // Prevent Zip Slip
    if !path::is_safe(&canonical) {
        return Err(ZipperError::Security {
            name: name.to_string(),
            canonical,
        });
    }
    if canonical.is_empty() {
        return Err(ZipperError::NoEntry(format!(
            "{} resolves to an empty entry name",
            name
        )));
    }

    Ok(canonical)
}

/// Current position of `source` and the number of bytes left after it
fn measure<R: Read + Seek + ?Sized>(source: &mut R) -> io::Result<(u64, u64)> {
    let start = source.stream_position()?;
    let end = source.seek(SeekFrom::End(0))?;
    source.seek(SeekFrom::Start(start))?;
    Ok((start, end.saturating_sub(start)))
}

/// Read until `buf` is full or the source ends
fn read_full<R: Read + ?Sized>(source: &mut R, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match source.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}

/// CRC-32 of everything from `start` to the end of `source`
///
/// Sources of known size below `single_shot_limit` are read with a single
/// buffer; anything else is read in `chunk_size` pieces. The source is
/// rewound to `start` afterwards.
pub(crate) fn precompute_crc<R: Read + Seek + ?Sized>(
    source: &mut R,
    start: u64,
    size: u64,
    chunk: &mut ChunkBuffer,
    single_shot_limit: u64,
    chunk_size: usize,
) -> io::Result<u32> {
    let mut crc = Crc32::new();

    if size > 0 && size < single_shot_limit {
        let buf = chunk.prepare(size as usize);
        let n = read_full(source, buf)?;
        crc.update(&buf[..n]);
    }

    // Drains whatever is left: the whole source for large ones, or bytes
    // beyond the reported size for small ones
    let buf = chunk.prepare(chunk_size);
    loop {
        let n = read_full(source, buf)?;
        if n == 0 {
            break;
        }
        crc.update(&buf[..n]);
    }

    source.seek(SeekFrom::Start(start))?;
    Ok(crc.finalize())
}

/// Writes a single entry through the codec engine
pub(crate) struct EntryWriter<'a, S: Storage> {
    encoder: &'a mut ZipEncoder<S>,
    chunk: &'a mut ChunkBuffer,
    options: &'a ArchiveOptions,
}

impl<'a, S: Storage> EntryWriter<'a, S> {
    pub(crate) fn new(
        encoder: &'a mut ZipEncoder<S>,
        chunk: &'a mut ChunkBuffer,
        options: &'a ArchiveOptions,
    ) -> Self {
        Self {
            encoder,
            chunk,
            options,
        }
    }

    pub(crate) fn write<R: Read + Seek + ?Sized>(
        mut self,
        name: &str,
        source: &mut R,
        timestamp: Timestamp,
        policy: CompressionPolicy,
    ) -> Result<()> {
        let canonical = validate_name(name)?;
        let level = policy.level();

        let (start, size) = measure(source).map_err(|e| {
            ZipperError::internal(format!("Cannot query the size of {}: {}", name, e))
        })?;
        let zip64 = size >= ZIP64_THRESHOLD;

        let password = self.options.get_password();
        let encryption = match password {
            Some(password) => {
                let crc = precompute_crc(
                    source,
                    start,
                    size,
                    self.chunk,
                    self.options.get_crc_single_shot_limit(),
                    self.options.get_write_chunk_size(),
                )
                .map_err(|e| {
                    ZipperError::internal(format!("Cannot compute the CRC of {}: {}", name, e))
                })?;
                Some(Encryption { password, crc })
            }
            None => None,
        };

        log::debug!(
            "adding {} as {} ({} bytes, level {}, zip64: {}, encrypted: {})",
            name,
            canonical,
            size,
            level,
            zip64,
            encryption.is_some()
        );

        let header = EntryHeader {
            name: &canonical,
            timestamp,
            level,
            zip64,
            size_hint: Some(size),
        };
        self.encoder
            .open_entry(&header, encryption)
            .map_err(|e| {
                ZipperError::internal(format!("Error when adding {} to zip: {}", name, e.message()))
            })?;

        if let Err(e) = self.stream(name, source) {
            self.encoder.abort_entry()?;
            return Err(e);
        }

        self.encoder.close_entry().map_err(|e| {
            ZipperError::internal(format!("Error when closing {} in zip: {}", name, e.message()))
        })
    }

    fn stream<R: Read + ?Sized>(&mut self, name: &str, source: &mut R) -> Result<()> {
        let buf = self.chunk.prepare(self.options.get_write_chunk_size());
        loop {
            let n = match source.read(buf) {
                Ok(0) => return Ok(()),
                Ok(n) => n,
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    return Err(ZipperError::internal(format!(
                        "Failed to read {}: {}",
                        name, e
                    )));
                }
            };
            self.encoder.write_chunk(&buf[..n]).map_err(|e| {
                ZipperError::internal(format!("Error when writing {} to zip: {}", name, e.message()))
            })?;
        }
    }
}

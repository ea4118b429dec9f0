//! ZIP container encoder that compresses entries on-the-fly
//!
//! `ZipEncoder` is the codec engine behind an archive: it opens a container
//! (fresh, or an existing one to append into), streams one entry at a time
//! through DEFLATE and optional traditional encryption, and writes the
//! central directory on close.
//!
//! Entries are written without data descriptors: the storage is seekable, so
//! CRC and sizes are patched into the local header once an entry is complete.
//! An entry only reaches the central directory after it closed successfully;
//! a failed entry rewinds the writer to its local header so the next entry
//! (or the central directory) overwrites the partial bytes.

use crate::encryption::{ZipCryptoEncryptor, HEADER_SIZE};
use crate::error::{Result, ZipperError};
use crate::reader::{read_central_directory, ZipEntry};
use crate::timestamp::Timestamp;
use crc32fast::Hasher as Crc32;
use flate2::write::DeflateEncoder;
use flate2::Compression;
use std::fs::File;
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};

/// Sizes at or above this value need the zip64 extension
pub const ZIP64_THRESHOLD: u64 = 0xFFFF_FFFF;

pub(crate) const FLAG_ENCRYPTED: u16 = 0x0001;
pub(crate) const FLAG_DATA_DESCRIPTOR: u16 = 0x0008;
const FLAG_UTF8: u16 = 0x0800;

const METHOD_STORED: u16 = 0;
const METHOD_DEFLATE: u16 = 8;

const VERSION_DEFAULT: u16 = 20;
const VERSION_ZIP64: u16 = 45;

const ZIP64_EXTRA_ID: u16 = 0x0001;

/// Offset of the CRC field inside a local file header
const LOCAL_CRC_OFFSET: u64 = 14;
/// Size of the fixed part of a local file header
const LOCAL_HEADER_SIZE: u64 = 30;

/// Seekable storage the encoder writes into
///
/// Besides read/write/seek, storage must be able to drop trailing bytes left
/// behind by discarded entries.
pub trait Storage: Read + Write + Seek {
    fn truncate(&mut self, len: u64) -> io::Result<()>;
}

impl Storage for File {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        self.set_len(len)
    }
}

impl Storage for Cursor<Vec<u8>> {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        let len = usize::try_from(len)
            .map_err(|_| io::Error::new(io::ErrorKind::InvalidInput, "length out of range"))?;
        self.get_mut().truncate(len);
        if self.position() > len as u64 {
            self.set_position(len as u64);
        }
        Ok(())
    }
}

/// How a container is opened
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContainerMode {
    /// Start an empty container
    Create,
    /// Append entries into the container already present in storage
    AddInZip,
}

/// Metadata of an entry about to be written
#[derive(Debug, Clone)]
pub struct EntryHeader<'a> {
    /// Canonical name stored in the archive
    pub name: &'a str,
    pub timestamp: Timestamp,
    /// DEFLATE level 0-9, 0 meaning stored
    pub level: u32,
    /// Reserve 64-bit size fields for this entry
    pub zip64: bool,
    /// Expected uncompressed size, used to size staging buffers
    pub size_hint: Option<u64>,
}

/// Password and precomputed CRC of an encrypted entry
#[derive(Clone, Copy)]
pub struct Encryption<'a> {
    pub password: &'a str,
    pub crc: u32,
}

trait CompressorWrite: Write {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer>;
    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer;
}

struct DeflateCompressor {
    encoder: DeflateEncoder<CompressedBuffer>,
}

impl Write for DeflateCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.encoder.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.encoder.flush()
    }
}

impl CompressorWrite for DeflateCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.encoder.finish()?)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        self.encoder.get_mut()
    }
}

struct StoredCompressor {
    buffer: CompressedBuffer,
}

impl Write for StoredCompressor {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

impl CompressorWrite for StoredCompressor {
    fn finish_compression(self: Box<Self>) -> Result<CompressedBuffer> {
        Ok(self.buffer)
    }

    fn get_buffer_mut(&mut self) -> &mut CompressedBuffer {
        &mut self.buffer
    }
}

/// Metadata tracker for CRC and byte counts
struct CrcCounter {
    crc: Crc32,
    uncompressed_count: u64,
    compressed_count: u64,
}

impl CrcCounter {
    fn new() -> Self {
        Self {
            crc: Crc32::new(),
            uncompressed_count: 0,
            compressed_count: 0,
        }
    }

    fn update_uncompressed(&mut self, data: &[u8]) {
        self.crc.update(data);
        self.uncompressed_count += data.len() as u64;
    }

    fn add_compressed(&mut self, count: u64) {
        self.compressed_count += count;
    }

    fn finalize(&self) -> u32 {
        self.crc.clone().finalize()
    }
}

/// Buffered writer for compressed data with adaptive sizing
///
/// Initial capacity and flush threshold follow the expected entry size:
/// - Tiny (<10KB): 8KB initial, 256KB threshold
/// - Small (<100KB): 32KB initial, 512KB threshold
/// - Medium (<1MB): 128KB initial, 2MB threshold
/// - Large (<10MB): 256KB initial, 4MB threshold
/// - Unknown or larger: 512KB initial, 8MB threshold
struct CompressedBuffer {
    buffer: Vec<u8>,
    flush_threshold: usize,
}

impl CompressedBuffer {
    fn with_size_hint(size_hint: Option<u64>) -> Self {
        let (initial_capacity, flush_threshold) = match size_hint {
            Some(size) if size < 10_000 => (8 * 1024, 256 * 1024),
            Some(size) if size < 100_000 => (32 * 1024, 512 * 1024),
            Some(size) if size < 1_000_000 => (128 * 1024, 2 * 1024 * 1024),
            Some(size) if size < 10_000_000 => (256 * 1024, 4 * 1024 * 1024),
            _ => (512 * 1024, 8 * 1024 * 1024),
        };

        Self {
            buffer: Vec::with_capacity(initial_capacity),
            flush_threshold,
        }
    }

    fn take(&mut self) -> Vec<u8> {
        std::mem::take(&mut self.buffer)
    }

    fn should_flush(&self) -> bool {
        self.buffer.len() >= self.flush_threshold
    }
}

impl Write for CompressedBuffer {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.buffer.extend_from_slice(buf);
        Ok(buf.len())
    }

    fn flush(&mut self) -> io::Result<()> {
        Ok(())
    }
}

/// Entry being streamed
struct CurrentEntry {
    name: String,
    local_header_offset: u64,
    flags: u16,
    compression_method: u16,
    dos_time: u16,
    dos_date: u16,
    zip64: bool,
    encoder: Box<dyn CompressorWrite>,
    counter: CrcCounter,
    encryptor: Option<ZipCryptoEncryptor>,
    expected_crc: Option<u32>,
}

/// Encrypt (when needed) and write compressed bytes to storage
fn emit<S: Storage>(
    output: &mut S,
    encryptor: &mut Option<ZipCryptoEncryptor>,
    counter: &mut CrcCounter,
    data: &mut [u8],
) -> io::Result<()> {
    if data.is_empty() {
        return Ok(());
    }
    if let Some(encryptor) = encryptor {
        encryptor.encrypt(data);
    }
    output.write_all(data)?;
    counter.add_compressed(data.len() as u64);
    Ok(())
}

/// General purpose flag bits 1-2 advertising the DEFLATE effort
fn deflate_option_flags(level: u32) -> u16 {
    match level {
        8 | 9 => 0x0002,
        2 => 0x0004,
        1 => 0x0006,
        _ => 0,
    }
}

/// ZIP64 extended information field for a new entry, empty when not needed
fn zip64_extra(entry: &ZipEntry) -> Vec<u8> {
    let needs_uncompressed = entry.is_zip64 || entry.uncompressed_size >= ZIP64_THRESHOLD;
    let needs_compressed = entry.is_zip64 || entry.compressed_size >= ZIP64_THRESHOLD;
    let needs_offset = entry.offset >= ZIP64_THRESHOLD;

    let mut zip64_data: Vec<u8> = Vec::new();
    if needs_uncompressed {
        zip64_data.extend_from_slice(&entry.uncompressed_size.to_le_bytes());
    }
    if needs_compressed {
        zip64_data.extend_from_slice(&entry.compressed_size.to_le_bytes());
    }
    if needs_offset {
        zip64_data.extend_from_slice(&entry.offset.to_le_bytes());
    }

    let mut extra_field: Vec<u8> = Vec::new();
    if !zip64_data.is_empty() {
        extra_field.extend_from_slice(&ZIP64_EXTRA_ID.to_le_bytes());
        extra_field.extend_from_slice(&(zip64_data.len() as u16).to_le_bytes());
        extra_field.extend_from_slice(&zip64_data);
    }
    extra_field
}

/// Central directory header of a new entry
fn central_record(entry: &ZipEntry) -> Vec<u8> {
    let needs_uncompressed = entry.is_zip64 || entry.uncompressed_size >= ZIP64_THRESHOLD;
    let needs_compressed = entry.is_zip64 || entry.compressed_size >= ZIP64_THRESHOLD;
    let needs_offset = entry.offset >= ZIP64_THRESHOLD;
    let version_needed = if entry.extra.is_empty() {
        entry.version_needed
    } else {
        entry.version_needed.max(VERSION_ZIP64)
    };
    let sized = |needs: bool, value: u64| if needs { u32::MAX } else { value as u32 };

    let mut record = Vec::with_capacity(46 + entry.name.len() + entry.extra.len());
    record.extend_from_slice(&[0x50, 0x4b, 0x01, 0x02]); // central dir sig
    record.extend_from_slice(&entry.version_made_by.to_le_bytes());
    record.extend_from_slice(&version_needed.to_le_bytes());
    record.extend_from_slice(&entry.flags.to_le_bytes());
    record.extend_from_slice(&entry.compression_method.to_le_bytes());
    record.extend_from_slice(&entry.dos_time.to_le_bytes());
    record.extend_from_slice(&entry.dos_date.to_le_bytes());
    record.extend_from_slice(&entry.crc32.to_le_bytes());
    record.extend_from_slice(&sized(needs_compressed, entry.compressed_size).to_le_bytes());
    record.extend_from_slice(&sized(needs_uncompressed, entry.uncompressed_size).to_le_bytes());
    record.extend_from_slice(&(entry.name.len() as u16).to_le_bytes());
    record.extend_from_slice(&(entry.extra.len() as u16).to_le_bytes());
    record.extend_from_slice(&(entry.comment.len() as u16).to_le_bytes());
    record.extend_from_slice(&0u16.to_le_bytes()); // disk number start
    record.extend_from_slice(&0u16.to_le_bytes()); // internal attrs
    record.extend_from_slice(&entry.external_attributes.to_le_bytes());
    record.extend_from_slice(&sized(needs_offset, entry.offset).to_le_bytes());
    record.extend_from_slice(entry.name.as_bytes());
    record.extend_from_slice(&entry.extra);
    record.extend_from_slice(&entry.comment);
    record
}

/// Streaming ZIP encoder over seekable storage
pub struct ZipEncoder<S: Storage> {
    output: S,
    entries: Vec<ZipEntry>,
    current: Option<CurrentEntry>,
    comment: Vec<u8>,
    /// Keep ZIP64 end records when the container already had them
    zip64_end: bool,
}

impl<S: Storage> ZipEncoder<S> {
    /// Open a container in `output`
    ///
    /// With [`ContainerMode::AddInZip`] the existing central directory is read
    /// and new entries are written where it used to start.
    pub fn open(mut output: S, mode: ContainerMode) -> Result<Self> {
        let (entries, comment, zip64_end) = match mode {
            ContainerMode::Create => {
                output.seek(SeekFrom::Start(0))?;
                (Vec::new(), Vec::new(), false)
            }
            ContainerMode::AddInZip => {
                let directory = read_central_directory(&mut output)?;
                output.seek(SeekFrom::Start(directory.offset))?;
                log::debug!(
                    "appending after {} existing entries at offset {}",
                    directory.entries.len(),
                    directory.offset
                );
                (directory.entries, directory.comment, directory.zip64)
            }
        };

        Ok(Self {
            output,
            entries,
            current: None,
            comment,
            zip64_end,
        })
    }

    /// Entries recorded so far, in insertion order
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Start a new entry
    pub fn open_entry(
        &mut self,
        header: &EntryHeader<'_>,
        encryption: Option<Encryption<'_>>,
    ) -> Result<()> {
        if self.current.is_some() {
            return Err(ZipperError::internal("An entry is already open"));
        }
        if header.level > 9 {
            return Err(ZipperError::internal(format!(
                "Unknown compression level: {}",
                header.level
            )));
        }
        if header.name.len() > u16::MAX as usize {
            return Err(ZipperError::internal(format!(
                "Entry name too long: {} bytes",
                header.name.len()
            )));
        }

        let local_header_offset = self.output.stream_position()?;
        match self.begin_entry(header, encryption, local_header_offset) {
            Ok(entry) => {
                self.current = Some(entry);
                Ok(())
            }
            Err(e) => {
                self.output.seek(SeekFrom::Start(local_header_offset))?;
                Err(e)
            }
        }
    }

    fn begin_entry(
        &mut self,
        header: &EntryHeader<'_>,
        encryption: Option<Encryption<'_>>,
        local_header_offset: u64,
    ) -> Result<CurrentEntry> {
        let compression_method = if header.level == 0 {
            METHOD_STORED
        } else {
            METHOD_DEFLATE
        };

        let mut flags = deflate_option_flags(header.level);
        if encryption.is_some() {
            flags |= FLAG_ENCRYPTED;
        }
        if !header.name.is_ascii() {
            flags |= FLAG_UTF8;
        }

        let version_needed = if header.zip64 {
            VERSION_ZIP64
        } else {
            VERSION_DEFAULT
        };
        let (dos_time, dos_date) = header.timestamp.to_dos();
        // Sizes are patched on close; zip64 entries keep the sentinel here
        let size_placeholder = if header.zip64 { u32::MAX } else { 0 };
        let extra_len: u16 = if header.zip64 { 20 } else { 0 };

        self.output.write_all(&[0x50, 0x4b, 0x03, 0x04])?; // signature
        self.output.write_all(&version_needed.to_le_bytes())?;
        self.output.write_all(&flags.to_le_bytes())?;
        self.output.write_all(&compression_method.to_le_bytes())?;
        self.output.write_all(&dos_time.to_le_bytes())?;
        self.output.write_all(&dos_date.to_le_bytes())?;
        self.output.write_all(&0u32.to_le_bytes())?; // crc32 placeholder
        self.output.write_all(&size_placeholder.to_le_bytes())?; // compressed size
        self.output.write_all(&size_placeholder.to_le_bytes())?; // uncompressed size
        self.output
            .write_all(&(header.name.len() as u16).to_le_bytes())?;
        self.output.write_all(&extra_len.to_le_bytes())?;
        self.output.write_all(header.name.as_bytes())?;

        if header.zip64 {
            self.output.write_all(&ZIP64_EXTRA_ID.to_le_bytes())?;
            self.output.write_all(&16u16.to_le_bytes())?;
            self.output.write_all(&0u64.to_le_bytes())?; // uncompressed size
            self.output.write_all(&0u64.to_le_bytes())?; // compressed size
        }

        let mut counter = CrcCounter::new();
        let encryptor = match encryption {
            Some(enc) => {
                let encryptor = ZipCryptoEncryptor::new(enc.password, enc.crc)?;
                self.output.write_all(encryptor.header())?;
                counter.add_compressed(HEADER_SIZE as u64);
                Some(encryptor)
            }
            None => None,
        };

        let buffer = CompressedBuffer::with_size_hint(header.size_hint);
        let encoder: Box<dyn CompressorWrite> = if compression_method == METHOD_STORED {
            Box::new(StoredCompressor { buffer })
        } else {
            Box::new(DeflateCompressor {
                encoder: DeflateEncoder::new(buffer, Compression::new(header.level)),
            })
        };

        Ok(CurrentEntry {
            name: header.name.to_string(),
            local_header_offset,
            flags,
            compression_method,
            dos_time,
            dos_date,
            zip64: header.zip64,
            encoder,
            counter,
            encryptor,
            expected_crc: encryption.map(|enc| enc.crc),
        })
    }

    /// Write uncompressed data to the open entry
    pub fn write_chunk(&mut self, data: &[u8]) -> Result<()> {
        let entry = self
            .current
            .as_mut()
            .ok_or_else(|| ZipperError::internal("No entry opened"))?;

        entry.counter.update_uncompressed(data);
        entry.encoder.write_all(data)?;

        let buffer = entry.encoder.get_buffer_mut();
        if buffer.should_flush() {
            let mut compressed = buffer.take();
            emit(
                &mut self.output,
                &mut entry.encryptor,
                &mut entry.counter,
                &mut compressed,
            )?;
        }

        Ok(())
    }

    /// Finish the open entry and add it to the directory
    ///
    /// On failure the entry is discarded.
    pub fn close_entry(&mut self) -> Result<()> {
        let entry = self
            .current
            .take()
            .ok_or_else(|| ZipperError::internal("No entry opened"))?;
        let offset = entry.local_header_offset;

        match self.finish_entry(entry) {
            Ok(record) => {
                self.entries.push(record);
                Ok(())
            }
            Err(e) => {
                self.output.seek(SeekFrom::Start(offset))?;
                Err(e)
            }
        }
    }

    fn finish_entry(&mut self, entry: CurrentEntry) -> Result<ZipEntry> {
        let CurrentEntry {
            name,
            local_header_offset,
            flags,
            compression_method,
            dos_time,
            dos_date,
            zip64,
            encoder,
            mut counter,
            mut encryptor,
            expected_crc,
        } = entry;

        let mut buffer = encoder.finish_compression()?;
        let mut remaining = buffer.take();
        emit(&mut self.output, &mut encryptor, &mut counter, &mut remaining)?;

        let crc = counter.finalize();
        let compressed_size = counter.compressed_count;
        let uncompressed_size = counter.uncompressed_count;

        if let Some(expected) = expected_crc {
            if expected != crc {
                return Err(ZipperError::internal(format!(
                    "Content of {} changed while streaming (crc {:08x}, expected {:08x})",
                    name, crc, expected
                )));
            }
        }
        if !zip64 && (compressed_size >= ZIP64_THRESHOLD || uncompressed_size >= ZIP64_THRESHOLD)
        {
            return Err(ZipperError::internal(format!(
                "{} exceeds 4 GiB but was not opened as zip64",
                name
            )));
        }

        let end = self.output.stream_position()?;
        self.output
            .seek(SeekFrom::Start(local_header_offset + LOCAL_CRC_OFFSET))?;
        self.output.write_all(&crc.to_le_bytes())?;
        if zip64 {
            self.output.seek(SeekFrom::Start(
                local_header_offset + LOCAL_HEADER_SIZE + name.len() as u64 + 4,
            ))?;
            self.output.write_all(&uncompressed_size.to_le_bytes())?;
            self.output.write_all(&compressed_size.to_le_bytes())?;
        } else {
            self.output
                .write_all(&(compressed_size as u32).to_le_bytes())?;
            self.output
                .write_all(&(uncompressed_size as u32).to_le_bytes())?;
        }
        self.output.seek(SeekFrom::Start(end))?;

        log::debug!(
            "closed entry {} ({} -> {} bytes, crc {:08x})",
            name,
            uncompressed_size,
            compressed_size,
            crc
        );

        let mut entry = ZipEntry {
            name,
            version_made_by: if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT },
            version_needed: if zip64 { VERSION_ZIP64 } else { VERSION_DEFAULT },
            flags,
            compression_method,
            dos_time,
            dos_date,
            crc32: crc,
            compressed_size,
            uncompressed_size,
            offset: local_header_offset,
            external_attributes: 0,
            is_zip64: zip64,
            extra: Vec::new(),
            comment: Vec::new(),
            central_record: Vec::new(),
        };
        entry.extra = zip64_extra(&entry);
        entry.central_record = central_record(&entry);
        Ok(entry)
    }

    /// Discard the open entry, if any
    pub fn abort_entry(&mut self) -> Result<()> {
        if let Some(entry) = self.current.take() {
            log::debug!("discarding entry {}", entry.name);
            self.output
                .seek(SeekFrom::Start(entry.local_header_offset))?;
        }
        Ok(())
    }

    /// Write the central directory and return the storage
    ///
    /// An entry still open at this point is discarded.
    pub fn close(mut self) -> Result<S> {
        self.abort_entry()?;

        let central_dir_offset = self.output.stream_position()?;

        // Existing records go back byte for byte; new ones are built in finish_entry
        for entry in &self.entries {
            self.output.write_all(&entry.central_record)?;
        }

        let central_dir_size = self.output.stream_position()? - central_dir_offset;

        let need_zip64 = self.zip64_end
            || self.entries.len() >= u16::MAX as usize
            || central_dir_size >= ZIP64_THRESHOLD
            || central_dir_offset >= ZIP64_THRESHOLD;

        if need_zip64 {
            let zip64_eocd_pos = self.output.stream_position()?;

            // ZIP64 end of central directory record
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x06])?;
            // size of the remaining record: versions(4) + disks(8) + counts(16) + cd size/offset(16)
            self.output.write_all(&44u64.to_le_bytes())?;
            self.output.write_all(&VERSION_ZIP64.to_le_bytes())?;
            self.output.write_all(&VERSION_ZIP64.to_le_bytes())?;
            self.output.write_all(&0u32.to_le_bytes())?; // disk number
            self.output.write_all(&0u32.to_le_bytes())?; // disk with central dir
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output
                .write_all(&(self.entries.len() as u64).to_le_bytes())?;
            self.output.write_all(&central_dir_size.to_le_bytes())?;
            self.output.write_all(&central_dir_offset.to_le_bytes())?;

            // ZIP64 end of central directory locator
            self.output.write_all(&[0x50, 0x4b, 0x06, 0x07])?;
            self.output.write_all(&0u32.to_le_bytes())?; // disk with zip64 eocd
            self.output.write_all(&zip64_eocd_pos.to_le_bytes())?;
            self.output.write_all(&1u32.to_le_bytes())?; // total disks
        }

        // End of central directory (classic)
        self.output.write_all(&[0x50, 0x4b, 0x05, 0x06])?;
        self.output.write_all(&0u16.to_le_bytes())?; // disk number
        self.output.write_all(&0u16.to_le_bytes())?; // disk with central dir

        let count = if self.entries.len() >= u16::MAX as usize {
            u16::MAX
        } else {
            self.entries.len() as u16
        };
        self.output.write_all(&count.to_le_bytes())?;
        self.output.write_all(&count.to_le_bytes())?;

        let classic = |value: u64| {
            if value >= ZIP64_THRESHOLD {
                u32::MAX
            } else {
                value as u32
            }
        };
        self.output
            .write_all(&classic(central_dir_size).to_le_bytes())?;
        self.output
            .write_all(&classic(central_dir_offset).to_le_bytes())?;

        self.output
            .write_all(&(self.comment.len() as u16).to_le_bytes())?;
        self.output.write_all(&self.comment)?;

        let end = self.output.stream_position()?;
        self.output.flush()?;
        self.output.truncate(end)?;

        log::debug!(
            "wrote central directory: {} entries, {} bytes total",
            self.entries.len(),
            end
        );

        Ok(self.output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::reader::ZipArchiveReader;

    fn header(name: &str, level: u32) -> EntryHeader<'_> {
        EntryHeader {
            name,
            timestamp: Timestamp::new(2024, 5, 17, 13, 45, 30),
            level,
            zip64: false,
            size_hint: None,
        }
    }

    fn write_one(name: &str, data: &[u8], level: u32) -> Vec<u8> {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        encoder.open_entry(&header(name, level), None).unwrap();
        encoder.write_chunk(data).unwrap();
        encoder.close_entry().unwrap();
        encoder.close().unwrap().into_inner()
    }

    #[test]
    fn test_deflate_roundtrip() {
        let data = b"The quick brown fox jumps over the lazy dog. ".repeat(100);
        let bytes = write_one("fox.txt", &data, 6);

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.compression_method, METHOD_DEFLATE);
        assert!(entry.compressed_size < entry.uncompressed_size);
        assert_eq!(reader.read_entry(&entry, None).unwrap(), data);
    }

    #[test]
    fn test_stored_roundtrip() {
        let bytes = write_one("raw.bin", b"stored bytes", 0);
        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert_eq!(entry.compression_method, METHOD_STORED);
        assert_eq!(entry.compressed_size, 12);
        assert_eq!(reader.read_entry(&entry, None).unwrap(), b"stored bytes");
    }

    #[test]
    fn test_timestamp_is_stored() {
        let bytes = write_one("t.txt", b"t", 1);
        let reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(
            reader.entries()[0].timestamp(),
            Timestamp::new(2024, 5, 17, 13, 45, 30)
        );
    }

    #[test]
    fn test_empty_archive_is_just_end_record() {
        let encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        let bytes = encoder.close().unwrap().into_inner();
        assert_eq!(bytes.len(), 22);
        assert_eq!(&bytes[..4], &[0x50, 0x4b, 0x05, 0x06]);
    }

    #[test]
    fn test_aborted_entry_leaves_no_trace() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        encoder.open_entry(&header("keep.txt", 6), None).unwrap();
        encoder.write_chunk(b"keep").unwrap();
        encoder.close_entry().unwrap();

        encoder.open_entry(&header("drop.txt", 6), None).unwrap();
        encoder.write_chunk(&[1u8; 4096]).unwrap();
        encoder.abort_entry().unwrap();

        let bytes = encoder.close().unwrap().into_inner();
        let reference = write_one("keep.txt", b"keep", 6);
        assert_eq!(bytes.len(), reference.len());

        let reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = reader.entries().iter().map(|e| e.name.as_str()).collect();
        assert_eq!(names, ["keep.txt"]);
    }

    #[test]
    fn test_crc_mismatch_discards_encrypted_entry() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        let encryption = Encryption {
            password: "pw",
            crc: crc32fast::hash(b"expected"),
        };
        encoder
            .open_entry(&header("secret.txt", 6), Some(encryption))
            .unwrap();
        encoder.write_chunk(b"something else").unwrap();
        assert!(encoder.close_entry().is_err());
        assert!(encoder.entries().is_empty());
    }

    #[test]
    fn test_second_open_entry_rejected() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        encoder.open_entry(&header("a", 1), None).unwrap();
        assert!(encoder.open_entry(&header("b", 1), None).is_err());
    }

    #[test]
    fn test_write_without_entry_fails() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        assert!(encoder.write_chunk(b"data").is_err());
        assert!(encoder.close_entry().is_err());
    }

    #[test]
    fn test_invalid_level_rejected() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        let err = encoder.open_entry(&header("a", 12), None).unwrap_err();
        assert!(err.to_string().contains("Unknown compression level"));
    }

    #[test]
    fn test_append_preserves_existing_entries() {
        let first = write_one("first.txt", b"one", 6);

        let mut encoder = ZipEncoder::open(Cursor::new(first), ContainerMode::AddInZip).unwrap();
        assert_eq!(encoder.entries().len(), 1);
        encoder.open_entry(&header("second.txt", 6), None).unwrap();
        encoder.write_chunk(b"two").unwrap();
        encoder.close_entry().unwrap();
        let bytes = encoder.close().unwrap().into_inner();

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let names: Vec<_> = reader.entries().iter().map(|e| e.name.clone()).collect();
        assert_eq!(names, ["first.txt", "second.txt"]);
        assert_eq!(reader.read_entry_by_name("first.txt").unwrap(), b"one");
        assert_eq!(reader.read_entry_by_name("second.txt").unwrap(), b"two");
    }

    #[test]
    fn test_zip64_flagged_entry() {
        let mut encoder = ZipEncoder::open(Cursor::new(Vec::new()), ContainerMode::Create).unwrap();
        let mut h = header("big.bin", 6);
        h.zip64 = true;
        encoder.open_entry(&h, None).unwrap();
        encoder.write_chunk(b"small body").unwrap();
        encoder.close_entry().unwrap();
        let bytes = encoder.close().unwrap().into_inner();

        let mut reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entry = reader.entries()[0].clone();
        assert!(entry.is_zip64);
        assert_eq!(entry.uncompressed_size, 10);
        assert_eq!(reader.read_entry(&entry, None).unwrap(), b"small body");
    }

    #[test]
    fn test_append_writes_old_records_back_unchanged() {
        let first = write_one("first.txt", b"one", 0);
        let end = first.len() - 22;
        let cd_offset = u32::from_le_bytes(first[end + 16..end + 20].try_into().unwrap()) as usize;

        // Give the stored record a comment the encoder never produces itself
        let mut record = first[cd_offset..end].to_vec();
        record[32..34].copy_from_slice(&4u16.to_le_bytes());
        record.extend_from_slice(b"kept");

        let mut container = first[..cd_offset].to_vec();
        container.extend_from_slice(&record);
        let mut eocd = first[end..].to_vec();
        eocd[12..16].copy_from_slice(&(record.len() as u32).to_le_bytes());
        container.extend_from_slice(&eocd);

        let mut encoder = ZipEncoder::open(Cursor::new(container), ContainerMode::AddInZip).unwrap();
        encoder.open_entry(&header("second.txt", 0), None).unwrap();
        encoder.write_chunk(b"two").unwrap();
        encoder.close_entry().unwrap();
        let bytes = encoder.close().unwrap().into_inner();

        assert!(bytes.windows(record.len()).any(|w| w == &record[..]));
        let reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        assert_eq!(reader.entries()[0].comment, b"kept");
        assert_eq!(reader.entries()[1].name, "second.txt");
    }

    #[test]
    fn test_utf8_name_sets_flag() {
        let bytes = write_one("données.txt", b"x", 6);
        let reader = ZipArchiveReader::new(Cursor::new(bytes)).unwrap();
        let entry = &reader.entries()[0];
        assert_eq!(entry.name, "données.txt");
        assert_ne!(entry.flags & FLAG_UTF8, 0);
    }
}

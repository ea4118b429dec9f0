//! ZIP container reader
//!
//! Reads the central directory of a container so the encoder can append into
//! it, and decodes entries back for verification. Extraction to disk is not
//! provided.

use crate::encryption::{ZipCryptoDecryptor, HEADER_SIZE};
use crate::error::{Result, ZipperError};
use crate::timestamp::Timestamp;
use crate::writer::{FLAG_DATA_DESCRIPTOR, FLAG_ENCRYPTED};
use flate2::read::DeflateDecoder;
use std::fs::File;
use std::io::{BufReader, Read, Seek, SeekFrom};
use std::path::Path;

/// ZIP local file header signature
const LOCAL_FILE_HEADER_SIGNATURE: u32 = 0x04034b50;

/// ZIP central directory signature
const CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x02014b50;

/// ZIP end of central directory signature
const END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06054b50;

/// ZIP64 end of central directory record signature
const ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE: u32 = 0x06064b50;

/// ZIP64 end of central directory locator signature
const ZIP64_LOCATOR_SIGNATURE: u32 = 0x07064b50;

const EOCD_SIZE: usize = 22;
const ZIP64_LOCATOR_SIZE: u64 = 20;
/// End record plus the longest possible archive comment
const EOCD_SEARCH_WINDOW: u64 = 65557;

/// Entry in the ZIP central directory
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ZipEntry {
    pub name: String,
    pub version_made_by: u16,
    pub version_needed: u16,
    pub flags: u16,
    pub compression_method: u16,
    pub dos_time: u16,
    pub dos_date: u16,
    pub crc32: u32,
    pub compressed_size: u64,
    pub uncompressed_size: u64,
    /// Offset of the local file header
    pub offset: u64,
    pub external_attributes: u32,
    /// The entry carries a zip64 extended information field
    pub is_zip64: bool,
    /// Extra fields as stored in the central directory
    pub extra: Vec<u8>,
    /// Per-entry comment
    pub comment: Vec<u8>,
    /// Complete central directory header, written back unchanged on close
    pub(crate) central_record: Vec<u8>,
}

impl ZipEntry {
    pub fn is_encrypted(&self) -> bool {
        self.flags & FLAG_ENCRYPTED != 0
    }

    /// Stored modification time
    pub fn timestamp(&self) -> Timestamp {
        Timestamp::from_dos(self.dos_time, self.dos_date)
    }
}

/// Parsed central directory of a container
#[derive(Debug, Clone)]
pub struct CentralDirectory {
    pub entries: Vec<ZipEntry>,
    /// Offset of the first central directory header
    pub offset: u64,
    pub comment: Vec<u8>,
    /// The end records include a ZIP64 end of central directory
    pub zip64: bool,
}

fn read_u16_le<R: Read + ?Sized>(file: &mut R) -> Result<u16> {
    let mut buf = [0u8; 2];
    file.read_exact(&mut buf)?;
    Ok(u16::from_le_bytes(buf))
}

fn read_u32_le<R: Read + ?Sized>(file: &mut R) -> Result<u32> {
    let mut buf = [0u8; 4];
    file.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64_le<R: Read + ?Sized>(file: &mut R) -> Result<u64> {
    let mut buf = [0u8; 8];
    file.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}

fn le_u16(buf: &[u8], at: usize) -> u16 {
    u16::from_le_bytes([buf[at], buf[at + 1]])
}

fn le_u32(buf: &[u8], at: usize) -> u32 {
    u32::from_le_bytes([buf[at], buf[at + 1], buf[at + 2], buf[at + 3]])
}

fn le_u64(buf: &[u8], at: usize) -> u64 {
    let mut bytes = [0u8; 8];
    bytes.copy_from_slice(&buf[at..at + 8]);
    u64::from_le_bytes(bytes)
}

fn invalid(msg: impl Into<String>) -> ZipperError {
    ZipperError::internal(format!("Invalid ZIP format: {}", msg.into()))
}

/// Read the central directory of the container in `file`
pub fn read_central_directory<R: Read + Seek + ?Sized>(file: &mut R) -> Result<CentralDirectory> {
    let file_size = file.seek(SeekFrom::End(0))?;
    if file_size < EOCD_SIZE as u64 {
        return Err(invalid("file too small"));
    }

    let search_start = file_size.saturating_sub(EOCD_SEARCH_WINDOW);
    file.seek(SeekFrom::Start(search_start))?;
    let mut tail = Vec::new();
    file.read_to_end(&mut tail)?;

    // Search for the end record signature from the end
    let eocd_pos = (0..=tail.len() - EOCD_SIZE)
        .rev()
        .find(|&i| le_u32(&tail, i) == END_OF_CENTRAL_DIRECTORY_SIGNATURE)
        .ok_or_else(|| invalid("end of central directory not found"))?;
    let eocd = &tail[eocd_pos..];
    let eocd_offset = search_start + eocd_pos as u64;

    // These values may be placeholder 0xFFFF/0xFFFFFFFF when ZIP64 is used
    let total_entries_16 = le_u16(eocd, 10);
    let cd_size_32 = le_u32(eocd, 12);
    let cd_offset_32 = le_u32(eocd, 16);
    let comment_len = le_u16(eocd, 20) as usize;
    let comment = eocd[EOCD_SIZE..]
        .get(..comment_len)
        .unwrap_or(&eocd[EOCD_SIZE..])
        .to_vec();

    let mut total_entries = total_entries_16 as u64;
    let mut cd_offset = cd_offset_32 as u64;
    let zip64 = has_zip64_locator(file, eocd_offset)?;

    if total_entries_16 == 0xFFFF || cd_size_32 == 0xFFFFFFFF || cd_offset_32 == 0xFFFFFFFF {
        let (zip64_entries, zip64_cd_offset) = read_zip64_eocd(file, eocd_offset)?;
        total_entries = zip64_entries;
        cd_offset = zip64_cd_offset;
    }

    if cd_offset > eocd_offset {
        return Err(invalid(format!(
            "central directory offset {} beyond end record at {}",
            cd_offset, eocd_offset
        )));
    }

    file.seek(SeekFrom::Start(cd_offset))?;

    let mut entries = Vec::with_capacity(total_entries.min(u16::MAX as u64) as usize);
    for _ in 0..total_entries {
        let signature = read_u32_le(file)?;
        if signature != CENTRAL_DIRECTORY_SIGNATURE {
            return Err(invalid(format!(
                "invalid central directory signature: 0x{:08x}",
                signature
            )));
        }
        entries.push(read_central_entry(file)?);
    }

    Ok(CentralDirectory {
        entries,
        offset: cd_offset,
        comment,
        zip64,
    })
}

/// Whether a ZIP64 locator sits right before the classic end record
fn has_zip64_locator<R: Read + Seek + ?Sized>(file: &mut R, eocd_offset: u64) -> Result<bool> {
    match eocd_offset.checked_sub(ZIP64_LOCATOR_SIZE) {
        Some(locator_offset) => {
            file.seek(SeekFrom::Start(locator_offset))?;
            Ok(read_u32_le(file)? == ZIP64_LOCATOR_SIGNATURE)
        }
        None => Ok(false),
    }
}

/// Size of a central directory header without signature and variable fields
const CENTRAL_FIXED_SIZE: usize = 42;

fn read_central_entry<R: Read + ?Sized>(file: &mut R) -> Result<ZipEntry> {
    let mut fixed = [0u8; CENTRAL_FIXED_SIZE];
    file.read_exact(&mut fixed)?;

    let version_made_by = le_u16(&fixed, 0);
    let version_needed = le_u16(&fixed, 2);
    let flags = le_u16(&fixed, 4);
    let compression_method = le_u16(&fixed, 6);
    let dos_time = le_u16(&fixed, 8);
    let dos_date = le_u16(&fixed, 10);
    let crc32 = le_u32(&fixed, 12);

    // Sizes may be 0xFFFFFFFF meaning ZIP64
    let compressed_size_32 = le_u32(&fixed, 16);
    let uncompressed_size_32 = le_u32(&fixed, 20);
    let filename_len = le_u16(&fixed, 24) as usize;
    let extra_len = le_u16(&fixed, 26) as usize;
    let comment_len = le_u16(&fixed, 28) as usize;
    // disk number (2) and internal attributes (2) at 30..34
    let external_attributes = le_u32(&fixed, 34);
    let offset_32 = le_u32(&fixed, 38);

    let mut filename_buf = vec![0u8; filename_len];
    file.read_exact(&mut filename_buf)?;
    let name = String::from_utf8_lossy(&filename_buf).into_owned();

    let mut extra = vec![0u8; extra_len];
    file.read_exact(&mut extra)?;

    let mut comment = vec![0u8; comment_len];
    file.read_exact(&mut comment)?;

    let mut compressed_size = compressed_size_32 as u64;
    let mut uncompressed_size = uncompressed_size_32 as u64;
    let mut offset = offset_32 as u64;
    let mut is_zip64 = false;

    // Walk extra fields looking for the ZIP64 block (0x0001)
    let mut i = 0usize;
    while i + 4 <= extra.len() {
        let id = le_u16(&extra, i);
        let data_len = le_u16(&extra, i + 2) as usize;
        i += 4;
        if i + data_len > extra.len() {
            break;
        }
        if id == 0x0001 {
            is_zip64 = true;
            // Values appear in order, only for fields holding the sentinel
            let data = &extra[i..i + data_len];
            let mut cursor = 0usize;
            if uncompressed_size_32 == 0xFFFFFFFF && cursor + 8 <= data.len() {
                uncompressed_size = le_u64(data, cursor);
                cursor += 8;
            }
            if compressed_size_32 == 0xFFFFFFFF && cursor + 8 <= data.len() {
                compressed_size = le_u64(data, cursor);
                cursor += 8;
            }
            if offset_32 == 0xFFFFFFFF && cursor + 8 <= data.len() {
                offset = le_u64(data, cursor);
            }
            break;
        }
        i += data_len;
    }

    // Kept verbatim so appending never alters existing records
    let mut central_record =
        Vec::with_capacity(4 + CENTRAL_FIXED_SIZE + filename_len + extra_len + comment_len);
    central_record.extend_from_slice(&CENTRAL_DIRECTORY_SIGNATURE.to_le_bytes());
    central_record.extend_from_slice(&fixed);
    central_record.extend_from_slice(&filename_buf);
    central_record.extend_from_slice(&extra);
    central_record.extend_from_slice(&comment);

    Ok(ZipEntry {
        name,
        version_made_by,
        version_needed,
        flags,
        compression_method,
        dos_time,
        dos_date,
        crc32,
        compressed_size,
        uncompressed_size,
        offset,
        external_attributes,
        is_zip64,
        extra,
        comment,
        central_record,
    })
}

/// Follow the ZIP64 locator right before the classic end record
///
/// Returns the total entry count and the central directory offset.
fn read_zip64_eocd<R: Read + Seek + ?Sized>(file: &mut R, eocd_offset: u64) -> Result<(u64, u64)> {
    let locator_offset = eocd_offset
        .checked_sub(ZIP64_LOCATOR_SIZE)
        .ok_or_else(|| invalid("ZIP64 EOCD locator not found"))?;
    file.seek(SeekFrom::Start(locator_offset))?;
    if read_u32_le(file)? != ZIP64_LOCATOR_SIGNATURE {
        return Err(invalid("ZIP64 EOCD locator not found"));
    }

    // disk with the zip64 end record (4)
    file.seek(SeekFrom::Current(4))?;
    let zip64_eocd_offset = read_u64_le(file)?;

    file.seek(SeekFrom::Start(zip64_eocd_offset))?;
    let sig = read_u32_le(file)?;
    if sig != ZIP64_END_OF_CENTRAL_DIRECTORY_SIGNATURE {
        return Err(invalid(format!("invalid ZIP64 EOCD signature: 0x{:08x}", sig)));
    }

    // record size (8), versions (4), disk numbers (8), entries on this disk (8)
    file.seek(SeekFrom::Current(28))?;
    let total_entries = read_u64_le(file)?;
    let _cd_size = read_u64_le(file)?;
    let cd_offset = read_u64_le(file)?;

    Ok((total_entries, cd_offset))
}

/// ZIP archive reader over any seekable source
pub struct ZipArchiveReader<R: Read + Seek> {
    file: R,
    entries: Vec<ZipEntry>,
    comment: Vec<u8>,
}

impl ZipArchiveReader<BufReader<File>> {
    /// Open a ZIP file and read its central directory
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        Self::new(BufReader::new(File::open(path)?))
    }
}

impl<R: Read + Seek> ZipArchiveReader<R> {
    /// Read the central directory of `file`
    pub fn new(mut file: R) -> Result<Self> {
        let directory = read_central_directory(&mut file)?;
        Ok(Self {
            file,
            entries: directory.entries,
            comment: directory.comment,
        })
    }

    /// Get list of all entries in the ZIP
    pub fn entries(&self) -> &[ZipEntry] {
        &self.entries
    }

    /// Archive comment from the end record
    pub fn comment(&self) -> &[u8] {
        &self.comment
    }

    /// Find an entry by name
    pub fn find_entry(&self, name: &str) -> Option<&ZipEntry> {
        self.entries.iter().find(|e| e.name == name)
    }

    /// Read an entry's decompressed data, decrypting it with `password` if needed
    pub fn read_entry(&mut self, entry: &ZipEntry, password: Option<&str>) -> Result<Vec<u8>> {
        self.file.seek(SeekFrom::Start(entry.offset))?;

        let signature = read_u32_le(&mut self.file)?;
        if signature != LOCAL_FILE_HEADER_SIGNATURE {
            return Err(invalid("invalid local file header signature"));
        }

        // Skip version, flags, method, time, date, crc and sizes
        self.file.seek(SeekFrom::Current(22))?;
        let filename_len = read_u16_le(&mut self.file)? as i64;
        let extra_len = read_u16_le(&mut self.file)? as i64;
        self.file
            .seek(SeekFrom::Current(filename_len + extra_len))?;

        let size = usize::try_from(entry.compressed_size)
            .map_err(|_| invalid("entry too large to read into memory"))?;
        let mut data = vec![0u8; size];
        self.file.read_exact(&mut data)?;

        if entry.is_encrypted() {
            let password = password.ok_or_else(|| {
                ZipperError::internal(format!("{} is encrypted: password required", entry.name))
            })?;
            if data.len() < HEADER_SIZE {
                return Err(invalid(format!("{}: truncated encryption header", entry.name)));
            }

            let mut header = [0u8; HEADER_SIZE];
            header.copy_from_slice(&data[..HEADER_SIZE]);
            let check = if entry.flags & FLAG_DATA_DESCRIPTOR != 0 {
                (entry.dos_time >> 8) as u8
            } else {
                (entry.crc32 >> 24) as u8
            };

            let mut decryptor = ZipCryptoDecryptor::new(password, &header, check).map_err(|_| {
                ZipperError::internal(format!("Incorrect password for {}", entry.name))
            })?;
            data.drain(..HEADER_SIZE);
            decryptor.decrypt(&mut data);
        }

        let decompressed = match entry.compression_method {
            0 => data,
            8 => {
                let mut decoder = DeflateDecoder::new(&data[..]);
                let mut out = Vec::with_capacity(entry.uncompressed_size.min(1 << 26) as usize);
                decoder.read_to_end(&mut out)?;
                out
            }
            other => {
                return Err(ZipperError::internal(format!(
                    "Unsupported compression method: {}",
                    other
                )));
            }
        };

        let crc = crc32fast::hash(&decompressed);
        if crc != entry.crc32 {
            return Err(ZipperError::internal(format!(
                "CRC mismatch for {}: {:08x} != {:08x}",
                entry.name, crc, entry.crc32
            )));
        }

        Ok(decompressed)
    }

    /// Read an entry by name
    pub fn read_entry_by_name(&mut self, name: &str) -> Result<Vec<u8>> {
        self.read_entry_by_name_with_password(name, None)
    }

    /// Read an encrypted (or plain) entry by name
    pub fn read_entry_by_name_with_password(
        &mut self,
        name: &str,
        password: Option<&str>,
    ) -> Result<Vec<u8>> {
        let entry = self
            .find_entry(name)
            .ok_or_else(|| ZipperError::internal(format!("Entry not found: {}", name)))?
            .clone();

        self.read_entry(&entry, password)
    }
}

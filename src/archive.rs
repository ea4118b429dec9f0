//! Archive: one ZIP container written incrementally into a destination
//!
//! The destination is chosen once, at [`Archive::open`]:
//! - [`Destination::File`]: a path on disk, appended to or overwritten
//! - [`Destination::Memory`]: a caller-owned `Vec<u8>`
//! - [`Destination::Stream`]: any caller-owned `Read + Write + Seek` stream
//!
//! Memory and stream destinations are loaded into a [`MemoryBuffer`] while the
//! archive is open; their content is handed back when the archive closes.
//!
//! An `Archive` is meant for one thread at a time: every method takes
//! `&mut self`, and `add`/`close` run synchronously to completion.

use crate::chunk::ChunkBuffer;
use crate::entry::EntryWriter;
use crate::error::{Result, ZipperError};
use crate::fs;
use crate::memory::MemoryBuffer;
use crate::options::{ArchiveOptions, CompressionPolicy, OverwritePolicy};
use crate::reader::ZipEntry;
use crate::timestamp::Timestamp;
use crate::writer::{ContainerMode, Storage, ZipEncoder};
use std::fs::{File, OpenOptions};
use std::io::{self, Cursor, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// Seekable byte stream usable as an archive destination
pub trait SeekableStream: Read + Write + Seek {}

impl<T: Read + Write + Seek> SeekableStream for T {}

/// Where an archive is materialized
pub enum Destination<'a> {
    /// File on disk
    File(PathBuf),
    /// Caller-owned buffer, replaced by the finished container on close
    Memory(&'a mut Vec<u8>),
    /// Caller-owned stream, rewritten from its start on close
    Stream(&'a mut dyn SeekableStream),
}

impl<'a> Destination<'a> {
    pub fn file<P: AsRef<Path>>(path: P) -> Self {
        Destination::File(path.as_ref().to_path_buf())
    }
}

impl std::fmt::Debug for Destination<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Destination::File(path) => f.debug_tuple("File").field(path).finish(),
            Destination::Memory(buffer) => f.debug_tuple("Memory").field(&buffer.len()).finish(),
            Destination::Stream(_) => f.write_str("Stream"),
        }
    }
}

/// Storage behind the codec while the archive is open
enum BackingStore {
    File(File),
    Memory(MemoryBuffer),
}

impl Read for BackingStore {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self {
            BackingStore::File(file) => file.read(buf),
            BackingStore::Memory(memory) => memory.read(buf),
        }
    }
}

impl Write for BackingStore {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        match self {
            BackingStore::File(file) => file.write(buf),
            BackingStore::Memory(memory) => memory.write(buf),
        }
    }

    fn flush(&mut self) -> io::Result<()> {
        match self {
            BackingStore::File(file) => file.flush(),
            BackingStore::Memory(memory) => memory.flush(),
        }
    }
}

impl Seek for BackingStore {
    fn seek(&mut self, pos: SeekFrom) -> io::Result<u64> {
        match self {
            BackingStore::File(file) => file.seek(pos),
            BackingStore::Memory(memory) => memory.seek(pos),
        }
    }
}

impl Storage for BackingStore {
    fn truncate(&mut self, len: u64) -> io::Result<()> {
        match self {
            BackingStore::File(file) => file.truncate(len),
            BackingStore::Memory(memory) => memory.truncate(len),
        }
    }
}

/// Open the file destination, honouring the overwrite policy
fn open_file(path: &Path, overwrite: OverwritePolicy) -> Result<(BackingStore, ContainerMode)> {
    let mut mode = ContainerMode::Create;

    if fs::exists(path) {
        if !fs::is_file(path) {
            return Err(ZipperError::opening(format!(
                "{}: Is a directory",
                path.display()
            )));
        }
        match overwrite {
            OverwritePolicy::Overwrite => fs::remove(path).map_err(|e| {
                ZipperError::opening(format!("cannot remove {}: {}", path.display(), e))
            })?,
            OverwritePolicy::Append => mode = ContainerMode::AddInZip,
        }
    }

    let file = OpenOptions::new()
        .read(true)
        .write(true)
        .create(true)
        .truncate(false)
        .open(path)
        .map_err(|e| ZipperError::opening(format!("{}: {}", path.display(), e)))?;

    // An existing but empty file has no container to append into
    if mode == ContainerMode::AddInZip && file.metadata()?.len() == 0 {
        mode = ContainerMode::Create;
    }

    Ok((BackingStore::File(file), mode))
}

/// ZIP archive being written
///
/// # Example
/// ```no_run
/// use zipper::{Archive, ArchiveOptions, CompressionPolicy, Destination};
///
/// let mut buffer = Vec::new();
/// {
///     let mut archive = Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new())?;
///     archive.add_bytes("notes.txt", b"hello", CompressionPolicy::Medium)?;
///     archive.close();
/// }
/// assert!(!buffer.is_empty());
/// # Ok::<(), zipper::ZipperError>(())
/// ```
pub struct Archive<'a> {
    destination: Destination<'a>,
    options: ArchiveOptions,
    encoder: Option<ZipEncoder<BackingStore>>,
    chunk: ChunkBuffer,
    last_error: Option<ZipperError>,
    /// Length of the stream content the container was loaded from
    loaded_len: u64,
}

impl<'a> Archive<'a> {
    /// Open `destination` and get ready to add entries
    ///
    /// Existing content (a file under [`OverwritePolicy::Append`], a non-empty
    /// buffer or stream) must be a ZIP container; new entries are appended to it.
    pub fn open(destination: Destination<'a>, options: ArchiveOptions) -> Result<Self> {
        let chunk = ChunkBuffer::with_capacity(options.get_write_chunk_size());
        let mut archive = Self {
            destination,
            options,
            encoder: None,
            chunk,
            last_error: None,
            loaded_len: 0,
        };
        archive.init()?;
        Ok(archive)
    }

    /// Open the same destination again after [`Archive::close`]
    ///
    /// Does nothing when the archive is already open.
    pub fn reopen(&mut self, overwrite: OverwritePolicy) -> Result<()> {
        if self.is_open() {
            return Ok(());
        }
        self.options.set_overwrite(overwrite);
        let result = self.init();
        self.record(result)
    }

    fn init(&mut self) -> Result<()> {
        let (store, mode) = match &mut self.destination {
            Destination::File(path) => open_file(path, self.options.get_overwrite())?,
            Destination::Memory(buffer) => {
                let memory = MemoryBuffer::from_existing(buffer.as_slice())?;
                let mode = memory.container_mode();
                (BackingStore::Memory(memory), mode)
            }
            Destination::Stream(stream) => {
                let memory = MemoryBuffer::from_stream(
                    &mut **stream,
                    &mut self.chunk,
                    self.options.get_stream_copy_chunk_size(),
                )?;
                let mode = memory.container_mode();
                self.loaded_len = memory.len() as u64;
                (BackingStore::Memory(memory), mode)
            }
        };

        let encoder = ZipEncoder::open(store, mode).map_err(|e| {
            ZipperError::opening(format!("cannot open zip container: {}", e.message()))
        })?;

        log::debug!("opened {:?} archive ({:?})", self.destination, mode);
        self.encoder = Some(encoder);
        Ok(())
    }

    pub fn is_open(&self) -> bool {
        self.encoder.is_some()
    }

    /// Last error recorded by any operation, including `close`
    pub fn error(&self) -> Option<&ZipperError> {
        self.last_error.as_ref()
    }

    pub fn options(&self) -> &ArchiveOptions {
        &self.options
    }

    /// Entries of the container, in insertion order; empty once closed
    pub fn entries(&self) -> &[ZipEntry] {
        self.encoder
            .as_ref()
            .map(|encoder| encoder.entries())
            .unwrap_or(&[])
    }

    fn record<T>(&mut self, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            log::debug!("archive operation failed: {}", e);
            self.last_error = Some(e.clone());
        }
        result
    }

    /// Add the remaining content of `source` as entry `name`
    ///
    /// On failure nothing is added and the archive stays usable.
    pub fn add<R: Read + Seek + ?Sized>(
        &mut self,
        name: &str,
        source: &mut R,
        timestamp: Timestamp,
        policy: CompressionPolicy,
    ) -> Result<()> {
        let result = match self.encoder.as_mut() {
            Some(encoder) => EntryWriter::new(encoder, &mut self.chunk, &self.options)
                .write(name, source, timestamp, policy),
            None => Err(ZipperError::internal(format!(
                "cannot add {}: archive is closed",
                name
            ))),
        };
        self.record(result)
    }

    /// Add `source` stamped with the current time
    pub fn add_now<R: Read + Seek + ?Sized>(
        &mut self,
        name: &str,
        source: &mut R,
        policy: CompressionPolicy,
    ) -> Result<()> {
        self.add(name, source, Timestamp::now(), policy)
    }

    /// Add an in-memory slice stamped with the current time
    pub fn add_bytes(&mut self, name: &str, data: &[u8], policy: CompressionPolicy) -> Result<()> {
        self.add_now(name, &mut Cursor::new(data), policy)
    }

    /// Add a file, or every regular file of a directory
    ///
    /// Files inside a directory are named relative to it; with
    /// `save_hierarchy` the path as walked (starting with `path`) is kept.
    /// A single file is stored under its file name, or under `path` itself
    /// with `save_hierarchy`.
    ///
    /// Every file is attempted; the first failure is returned once all were
    /// tried, and the entries added successfully remain.
    pub fn add_path<P: AsRef<Path>>(
        &mut self,
        path: P,
        recurse: bool,
        save_hierarchy: bool,
        policy: CompressionPolicy,
    ) -> Result<()> {
        let path = path.as_ref();

        if !fs::is_dir(path) {
            let name = if save_hierarchy {
                Some(path.to_string_lossy().into_owned())
            } else {
                fs::file_name(path)
            };
            return match name {
                Some(name) => self.add_file(path, &name, policy),
                None => {
                    let result = Err(ZipperError::NoEntry(format!(
                        "{} has no file name",
                        path.display()
                    )));
                    self.record(result)
                }
            };
        }

        let files = fs::files_in_dir(path, recurse);
        let mut first_error = None;
        let mut failures = 0usize;

        for file in &files {
            let name = if save_hierarchy {
                file.to_string_lossy().into_owned()
            } else {
                fs::relative_name(path, file)
            };
            if let Err(e) = self.add_file(file, &name, policy) {
                failures += 1;
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            None => Ok(()),
            Some(e) => {
                log::warn!(
                    "{} of {} files under '{}' could not be added",
                    failures,
                    files.len(),
                    path.display()
                );
                Err(e)
            }
        }
    }

    fn add_file(&mut self, path: &Path, name: &str, policy: CompressionPolicy) -> Result<()> {
        let mut file = match File::open(path) {
            Ok(file) => file,
            Err(e) => {
                let result = Err(ZipperError::internal(format!(
                    "cannot open {}: {}",
                    path.display(),
                    e
                )));
                return self.record(result);
            }
        };
        let timestamp = Timestamp::from_path(path);
        self.add(name, &mut file, timestamp, policy)
    }

    /// Finish the container and hand it to the destination
    ///
    /// Safe to call repeatedly; only the first call after opening does work.
    /// Failures are not returned but recorded, see [`Archive::error`].
    pub fn close(&mut self) {
        let Some(encoder) = self.encoder.take() else {
            return;
        };

        let result = encoder.close().and_then(|store| self.finalize(store));
        if let Err(e) = result {
            log::warn!("failed to finalize archive: {}", e);
            self.last_error = Some(e);
        }
        self.chunk.release();
        log::debug!("closed {:?} archive", self.destination);
    }

    fn finalize(&mut self, store: BackingStore) -> Result<()> {
        let loaded_len = self.loaded_len;
        match (store, &mut self.destination) {
            (BackingStore::File(_), Destination::File(_)) => Ok(()),
            (BackingStore::Memory(mut memory), Destination::Memory(buffer)) => {
                **buffer = memory.finalize();
                Ok(())
            }
            (BackingStore::Memory(mut memory), Destination::Stream(stream)) => {
                let bytes = memory.finalize();
                stream.seek(SeekFrom::Start(0))?;
                stream.write_all(&bytes)?;

                // The stream cannot be truncated, so a shorter container would
                // leave the old end records visible past the new ones
                let stale = loaded_len.saturating_sub(bytes.len() as u64);
                if stale > 0 {
                    io::copy(&mut io::repeat(0).take(stale), &mut **stream)?;
                }
                stream.flush()?;

                if stale > 0 {
                    return Err(ZipperError::internal(format!(
                        "container shrank by {} bytes; stale tail zero-filled",
                        stale
                    )));
                }
                Ok(())
            }
            _ => Err(ZipperError::internal(
                "backing store does not match the destination",
            )),
        }
    }
}

impl Drop for Archive<'_> {
    fn drop(&mut self) {
        self.close();
    }
}

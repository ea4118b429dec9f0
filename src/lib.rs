//! # zipper: incremental ZIP archive writer
//!
//! `zipper` builds ZIP containers one entry at a time into a file, a caller-owned
//! buffer or any seekable stream. Entries are streamed through DEFLATE in chunks,
//! so large sources never have to fit in memory.
//!
//! ## Features
//!
//! - **Three destinations**: file on disk, `Vec<u8>`, or any `Read + Write + Seek`
//! - **Append or overwrite**: existing containers keep their entries
//! - **Zip Slip protection**: entry names escaping the archive root are refused
//! - **Zip64**: selected per entry from the source size
//! - **Password protection**: traditional PKWARE encryption, readable by stock `unzip`
//!
//! ## Quick Start
//!
//! ### Writing a ZIP file
//!
//! ```no_run
//! use zipper::{Archive, ArchiveOptions, CompressionPolicy, Destination, OverwritePolicy};
//!
//! let options = ArchiveOptions::new().overwrite(OverwritePolicy::Overwrite);
//! let mut archive = Archive::open(Destination::file("output.zip"), options)?;
//!
//! archive.add_bytes("hello.txt", b"Hello, World!", CompressionPolicy::Medium)?;
//! archive.add_path("assets", true, false, CompressionPolicy::Better)?;
//!
//! archive.close();
//! if let Some(err) = archive.error() {
//!     eprintln!("archive incomplete: {}", err);
//! }
//! # Ok::<(), zipper::ZipperError>(())
//! ```
//!
//! ### Writing into memory
//!
//! ```
//! use zipper::{Archive, ArchiveOptions, CompressionPolicy, Destination, ZipArchiveReader};
//! use std::io::Cursor;
//!
//! let mut buffer = Vec::new();
//! {
//!     let mut archive = Archive::open(Destination::Memory(&mut buffer), ArchiveOptions::new())?;
//!     archive.add_bytes("notes.txt", b"hello", CompressionPolicy::Medium)?;
//!     // Dropping the archive closes it
//! }
//!
//! let mut reader = ZipArchiveReader::new(Cursor::new(buffer))?;
//! assert_eq!(reader.read_entry_by_name("notes.txt")?, b"hello");
//! # Ok::<(), zipper::ZipperError>(())
//! ```

pub mod archive;
pub mod chunk;
pub mod encryption;
pub mod entry;
pub mod error;
pub mod fs;
pub mod memory;
pub mod options;
pub mod path;
pub mod reader;
pub mod timestamp;
pub mod writer;

pub use archive::{Archive, Destination, SeekableStream};
pub use chunk::ChunkBuffer;
pub use error::{ErrorKind, Result, ZipperError};
pub use memory::MemoryBuffer;
pub use options::{ArchiveOptions, CompressionPolicy, OverwritePolicy};
pub use reader::{ZipArchiveReader, ZipEntry};
pub use timestamp::Timestamp;
pub use writer::{ContainerMode, ZipEncoder, ZIP64_THRESHOLD};

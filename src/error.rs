//! Error types for zipper

use std::io;

/// Result type for zipper operations
pub type Result<T> = std::result::Result<T, ZipperError>;

/// Category of a [`ZipperError`], for callers that branch on the failure kind
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// The destination could not be opened
    Opening,
    /// Codec failure, unexpected I/O failure or invalid configuration
    Internal,
    /// Empty entry name
    NoEntry,
    /// Entry name escapes the archive root (Zip Slip)
    Security,
}

/// Error types that can occur while building an archive
///
/// Every variant carries its own message, so an error stays meaningful after
/// it has been stored or cloned.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ZipperError {
    /// Destination is a directory, cannot be created, or its content could not be loaded
    Opening(String),
    /// Codec engine failure, read/write failure or invalid internal configuration
    Internal(String),
    /// No usable entry name was given
    NoEntry(String),
    /// Forbidden insertion of an entry resolving outside the archive root
    Security {
        /// Name as supplied by the caller
        name: String,
        /// Canonical form of `name`
        canonical: String,
    },
}

impl ZipperError {
    /// Kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            ZipperError::Opening(_) => ErrorKind::Opening,
            ZipperError::Internal(_) => ErrorKind::Internal,
            ZipperError::NoEntry(_) => ErrorKind::NoEntry,
            ZipperError::Security { .. } => ErrorKind::Security,
        }
    }

    /// Diagnostic message without the kind prefix
    pub fn message(&self) -> String {
        match self {
            ZipperError::Opening(msg)
            | ZipperError::Internal(msg)
            | ZipperError::NoEntry(msg) => msg.clone(),
            ZipperError::Security { .. } => self.to_string(),
        }
    }

    pub(crate) fn internal(msg: impl Into<String>) -> Self {
        ZipperError::Internal(msg.into())
    }

    pub(crate) fn opening(msg: impl Into<String>) -> Self {
        ZipperError::Opening(msg.into())
    }
}

impl std::fmt::Display for ZipperError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ZipperError::Opening(msg) => write!(f, "Opening error: {}", msg),
            ZipperError::Internal(msg) => write!(f, "Internal error: {}", msg),
            ZipperError::NoEntry(msg) => write!(f, "No entry: {}", msg),
            ZipperError::Security { name, canonical } => write!(
                f,
                "Security error: forbidden insertion of {} (canonic: {}) to prevent possible Zip Slip attack",
                name, canonical
            ),
        }
    }
}

impl std::error::Error for ZipperError {}

impl From<io::Error> for ZipperError {
    fn from(err: io::Error) -> Self {
        ZipperError::Internal(format!("I/O error: {}", err))
    }
}

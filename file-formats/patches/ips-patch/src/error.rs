//! Error types for the IPS library

use std::fmt;
use std::io;
use thiserror::Error;

/// Result type alias for IPS operations
pub type Result<T> = std::result::Result<T, Error>;

/// Phase of patch processing an I/O failure happened in
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    /// Reading a patch stream
    Decoding,
    /// Writing a patch stream
    Writing,
    /// Applying records to a target
    Applying,
    /// Comparing records against a target
    Checking,
}

impl fmt::Display for Operation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Operation::Decoding => "decoding",
            Operation::Writing => "writing",
            Operation::Applying => "applying",
            Operation::Checking => "checking",
        };
        f.write_str(name)
    }
}

/// Main error type for IPS operations
#[derive(Error, Debug)]
pub enum Error {
    /// I/O error occurred
    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    /// I/O error attributed to a specific record
    #[error("I/O error while {operation} record {index}: {source}")]
    RecordIo {
        /// Phase the failure happened in
        operation: Operation,
        /// Zero-based record index
        index: usize,
        /// Underlying I/O error
        #[source]
        source: io::Error,
    },

    /// Stream does not start with `PATCH`
    #[error("Invalid IPS header: expected 'PATCH', found '{}'", String::from_utf8_lossy(.found))]
    BadHeader {
        /// The bytes found where the header was expected
        found: Vec<u8>,
    },

    /// Input ended before the `EOF` marker was read
    #[error("Patch stream ends inside the field at byte {position}, before the EOF marker")]
    TruncatedStream {
        /// Stream position of the incomplete field
        position: u64,
    },

    /// Unconsumed bytes after the `EOF` marker and truncation field
    #[error("{count} unexpected byte(s) after the EOF marker at byte {position}")]
    TrailingData {
        /// Stream position of the first unexpected byte
        position: u64,
        /// Number of unexpected bytes
        count: usize,
    },

    /// Offset is not exactly 3 bytes (or does not fit in 24 bits)
    #[error("Malformed record offset: {0}")]
    MalformedOffset(String),

    /// Offset equals the reserved `EOF` marker
    #[error("Record offset 0x454F46 collides with the EOF marker")]
    ReservedOffset,

    /// RLE record carries more than one data byte
    #[error("RLE record carries {0} data bytes, expected 1")]
    RleDataOverflow(usize),

    /// Record size is zero
    #[error("Record size is 0")]
    ZeroSize,

    /// A length does not match the length it is required to equal
    #[error("Size mismatch: expected {expected}, got {actual}")]
    SizeMismatch {
        /// Expected size
        expected: u64,
        /// Actual size
        actual: u64,
    },

    /// Target content differs from a record
    #[error("Target content differs from record {index} at offset 0x{offset:06X}")]
    ContentMismatch {
        /// Zero-based record index
        index: usize,
        /// Record offset
        offset: u32,
    },
}

impl Error {
    /// Create a new MalformedOffset error
    pub fn malformed_offset<S: Into<String>>(msg: S) -> Self {
        Error::MalformedOffset(msg.into())
    }

    /// Wrap an I/O error with the phase and record index it belongs to
    pub fn record_io(operation: Operation, index: usize, source: io::Error) -> Self {
        Error::RecordIo {
            operation,
            index,
            source,
        }
    }

    /// Attribute a plain I/O error to a record, leaving other errors untouched
    pub fn at_record(self, operation: Operation, index: usize) -> Self {
        match self {
            Error::Io(source) => Error::record_io(operation, index, source),
            other => other,
        }
    }

    /// Check if this error is a record invariant violation
    pub fn is_validation(&self) -> bool {
        matches!(
            self,
            Error::MalformedOffset(_)
                | Error::ReservedOffset
                | Error::RleDataOverflow(_)
                | Error::ZeroSize
                | Error::SizeMismatch { .. }
        )
    }

    /// Check if this error describes a badly framed patch stream
    pub fn is_framing(&self) -> bool {
        matches!(
            self,
            Error::BadHeader { .. } | Error::TruncatedStream { .. } | Error::TrailingData { .. }
        )
    }

    /// Check if this error came from the underlying resource
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_) | Error::RecordIo { .. })
    }
}

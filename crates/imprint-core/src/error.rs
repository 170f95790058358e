//! Error types for the Imprint core library

use imprint_platform::PlatformError;
use thiserror::Error;

/// Main error type for Imprint operations
#[derive(Error, Debug)]
pub enum Error {
    /// The source does not declare its length, so nothing can be written
    #[error("Image size missing: the length of the source must be known before writing")]
    MissingLength,

    /// Source file not found or inaccessible
    #[error("Source not found: {0}")]
    SourceNotFound(String),

    /// The device accepted fewer bytes than requested while erasing the boot sector
    #[error("Short write: expected {expected} bytes, device accepted {actual} bytes")]
    ShortWrite {
        /// Bytes requested
        expected: usize,
        /// Bytes accepted
        actual: usize,
    },

    /// A chunk was not copied in full
    #[error(
        "Short transfer at offset {offset}: expected {expected} bytes, read {read}, wrote {written}"
    )]
    ShortTransfer {
        /// Device offset of the failed chunk
        offset: u64,
        /// Length of the chunk
        expected: usize,
        /// Bytes obtained from the source
        read: usize,
        /// Bytes accepted by the device
        written: usize,
    },

    /// The device rejected the data with an invalid-argument error
    #[error("The image appears to be invalid or corrupt, please check it and try again")]
    InvalidImage(#[source] std::io::Error),

    /// IO error during read/write operations
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Failure reported by the platform layer
    #[error("Platform error: {0}")]
    Platform(#[source] PlatformError),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Failure reported by a caller-supplied collaborator
    #[error("Hook failed: {0}")]
    Hook(String),
}

impl From<PlatformError> for Error {
    fn from(err: PlatformError) -> Self {
        match err {
            PlatformError::ShortWrite { expected, actual } => Error::ShortWrite { expected, actual },
            PlatformError::Io(e) => Error::Io(e),
            other => Error::Platform(other),
        }
    }
}

impl Error {
    /// Error for a write or sync the device itself rejected.
    ///
    /// Devices answer `EINVAL` to data they cannot take, which in practice
    /// means a malformed image.
    pub(crate) fn device_write(err: std::io::Error) -> Self {
        if err.kind() == std::io::ErrorKind::InvalidInput {
            Error::InvalidImage(err)
        } else {
            Error::Io(err)
        }
    }
}

/// Result type alias using the Imprint error type
pub type Result<T> = std::result::Result<T, Error>;

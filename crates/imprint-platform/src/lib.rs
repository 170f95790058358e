//! # Imprint Platform
//!
//! Platform-specific leaf code for raw device access.
//!
//! This crate resolves user-facing device paths to their fastest raw node,
//! opens devices without truncating or creating them, zeroes the boot sector
//! before an image is written and runs the per-OS device preparation hook.
//!
//! ## Safety
//!
//! Everything here writes straight to block devices. Callers are expected to
//! have validated the target before handing a path to this crate.

#![warn(missing_docs)]
#![warn(clippy::all)]

use std::fs::File;
use std::path::Path;
use thiserror::Error;

mod erase;
mod resolve;

pub use erase::{erase_mbr, write_at, MBR_SIZE};
pub use resolve::{resolve_raw_device, to_raw_device_path};

/// Platform-specific errors
#[derive(Error, Debug)]
pub enum PlatformError {
    /// IO operation failed
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Device access denied (need elevated privileges)
    #[error("Permission denied opening {path}: {source}. Try running with elevated privileges.")]
    PermissionDenied {
        /// Device path
        path: String,
        /// The underlying error
        source: std::io::Error,
    },

    /// Device is busy or locked
    #[error("Device busy: {path}: {source}")]
    DeviceBusy {
        /// Device path
        path: String,
        /// The underlying error
        source: std::io::Error,
    },

    /// Device not found
    #[error("Device not found: {0}")]
    DeviceNotFound(String),

    /// The device accepted fewer bytes than requested in a single write call
    #[error("Short write: expected {expected} bytes, device accepted {actual} bytes")]
    ShortWrite {
        /// Bytes requested
        expected: usize,
        /// Bytes accepted
        actual: usize,
    },

    /// Failed to unmount/dismount the volumes of a device
    #[error("Unmount failed: {0}")]
    UnmountFailed(String),

    /// Command execution failed
    #[error("Command failed: {0}")]
    CommandFailed(String),
}

/// Result type for platform operations
pub type Result<T> = std::result::Result<T, PlatformError>;

/// Options for opening a raw device.
///
/// Devices are never created or truncated, whatever the options say.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenOptions {
    /// Open for reading
    pub read: bool,

    /// Open for writing
    pub write: bool,

    /// Synchronous writes (`O_SYNC` / `FILE_FLAG_WRITE_THROUGH`)
    pub sync: bool,
}

impl Default for OpenOptions {
    fn default() -> Self {
        Self {
            read: true,
            write: false,
            sync: false,
        }
    }
}

impl OpenOptions {
    /// Create new options with defaults (read-only)
    pub fn new() -> Self {
        Self::default()
    }

    /// Options used for streaming an image onto a device: read, write and
    /// synchronous writes.
    pub fn for_writing() -> Self {
        Self {
            read: true,
            write: true,
            sync: true,
        }
    }

    /// Set read access
    pub fn read(mut self, read: bool) -> Self {
        self.read = read;
        self
    }

    /// Set write access
    pub fn write(mut self, write: bool) -> Self {
        self.write = write;
        self
    }

    /// Set synchronous writes
    pub fn sync(mut self, sync: bool) -> Self {
        self.sync = sync;
        self
    }

    /// Build the equivalent `std::fs::OpenOptions`.
    pub fn to_std(&self) -> std::fs::OpenOptions {
        let mut options = std::fs::OpenOptions::new();
        options
            .read(self.read)
            .write(self.write)
            .create(false)
            .truncate(false);

        #[cfg(unix)]
        if self.sync && self.write {
            use std::os::unix::fs::OpenOptionsExt;
            options.custom_flags(libc::O_SYNC);
        }

        #[cfg(windows)]
        if self.sync && self.write {
            use std::os::windows::fs::OpenOptionsExt;
            const FILE_FLAG_WRITE_THROUGH: u32 = 0x8000_0000;
            options.custom_flags(FILE_FLAG_WRITE_THROUGH);
        }

        options
    }
}

/// Open a device (or a regular file standing in for one).
///
/// Permission and busy errors are reported with the device path attached.
pub fn open_device(path: &str, options: &OpenOptions) -> Result<File> {
    if !Path::new(path).exists() {
        return Err(PlatformError::DeviceNotFound(path.to_string()));
    }

    options.to_std().open(path).map_err(|e| {
        if e.kind() == std::io::ErrorKind::PermissionDenied {
            PlatformError::PermissionDenied {
                path: path.to_string(),
                source: e,
            }
        } else if e.raw_os_error() == Some(16) {
            // EBUSY
            PlatformError::DeviceBusy {
                path: path.to_string(),
                source: e,
            }
        } else {
            PlatformError::Io(e)
        }
    })
}

cfg_if::cfg_if! {
    if #[cfg(target_os = "linux")] {
        mod linux;
        use linux as sys;
    } else if #[cfg(target_os = "macos")] {
        mod macos;
        use macos as sys;
    } else if #[cfg(target_os = "windows")] {
        mod windows;
        use windows as sys;
    } else {
        mod sys {
            pub(crate) fn prepare_device(_path: &str) -> crate::Result<()> {
                Ok(())
            }
        }
    }
}

/// Prepare a device for (or after) raw writing.
///
/// - Windows: dismounts every volume on the physical drive.
/// - Linux: asks the kernel to re-read the partition table of a block device.
/// - Elsewhere: nothing to do.
pub fn prepare_device(path: &str) -> Result<()> {
    sys::prepare_device(path)
}

// ============================================================================
// UNIT TESTS
// ============================================================================

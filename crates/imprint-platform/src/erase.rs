//! Boot sector erasure
//!
//! Zeroing the first sector before an image is streamed in removes the old
//! partition table, so the OS does not recognise a stale filesystem halfway
//! through the write and try to mount it.

use crate::{open_device, OpenOptions, PlatformError, Result};
use std::fs::File;

/// Size of the boot sector that gets zeroed
pub const MBR_SIZE: usize = 512;

/// Overwrite the first 512 bytes of a device with zeros.
///
/// `path` must already be resolved to its raw form. The zeros are handed to
/// the device in a single positioned write; if the device accepts fewer bytes
/// the call fails with [`PlatformError::ShortWrite`] and nothing is retried.
pub fn erase_mbr(path: &str) -> Result<()> {
    let file = open_device(path, &OpenOptions::new().read(true).write(true))?;

    erase_with(|buf, offset| write_at(&file, buf, offset))?;
    file.sync_all()?;

    tracing::debug!("Erased {} byte boot sector on {}", MBR_SIZE, path);
    Ok(())
}

/// Run one zero-sector write through `write_at` and check how much landed.
fn erase_with<F>(mut write_at: F) -> Result<()>
where
    F: FnMut(&[u8], u64) -> std::io::Result<usize>,
{
    let zeros = [0u8; MBR_SIZE];

    let written = loop {
        match write_at(&zeros, 0) {
            Ok(n) => break n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(PlatformError::Io(e)),
        }
    };

    if written != MBR_SIZE {
        return Err(PlatformError::ShortWrite {
            expected: MBR_SIZE,
            actual: written,
        });
    }

    Ok(())
}

/// Issue one positioned write and report how many bytes the device accepted.
///
/// Partial writes are returned as-is; the caller decides what a short count
/// means.
#[cfg(unix)]
pub fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::unix::fs::FileExt;
    file.write_at(buf, offset)
}

/// Issue one positioned write and report how many bytes the device accepted.
#[cfg(windows)]
pub fn write_at(file: &File, buf: &[u8], offset: u64) -> std::io::Result<usize> {
    use std::os::windows::fs::FileExt;
    file.seek_write(buf, offset)
}

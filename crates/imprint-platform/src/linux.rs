//! Linux platform implementation
//!
//! Linux does not need volumes released before a raw write, but it does keep
//! serving the old partition table until told otherwise. Preparation asks the
//! kernel to re-read it with `BLKRRPART`.

use crate::Result;
use std::fs::File;
use std::os::unix::fs::FileTypeExt;
use std::os::unix::io::AsRawFd;

/// `_IO(0x12, 95)`: re-read partition table
const BLKRRPART: libc::Ioctl = 0x125F as libc::Ioctl;

/// Ask the kernel to rescan the partition table of a block device.
///
/// Regular files (images used as stand-in devices) are skipped. A failing
/// ioctl is logged and otherwise ignored; the kernel refuses with `EBUSY`
/// while any partition is still mounted and that must not abort a write.
pub(crate) fn prepare_device(path: &str) -> Result<()> {
    let metadata = std::fs::metadata(path)?;
    if !metadata.file_type().is_block_device() {
        tracing::debug!("{} is not a block device, skipping partition rescan", path);
        return Ok(());
    }

    let file = File::open(path)?;
    // SAFETY: BLKRRPART takes no argument and the fd stays valid for the
    // lifetime of `file`.
    #[allow(unsafe_code)]
    let result = unsafe { libc::ioctl(file.as_raw_fd(), BLKRRPART) };

    if result == 0 {
        tracing::debug!("Partition table of {} re-read", path);
    } else {
        let err = std::io::Error::last_os_error();
        tracing::warn!("Could not re-read partition table of {}: {}", path, err);
    }

    Ok(())
}

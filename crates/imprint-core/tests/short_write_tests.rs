//! Short writes on a real file
//!
//! The file size limit of this test process is lowered so the kernel accepts
//! only part of the second chunk. The write must stop with `ShortTransfer`
//! at that chunk instead of retrying the rest behind the caller's back.
//! Kept in its own test binary because the limit applies to the whole
//! process.

#![cfg(target_os = "linux")]

use imprint_core::{Error, ImageSource, ImageWriter, NoopPreparer, RawDeviceAccess, WriteConfig};
use std::io::Cursor;
use tempfile::NamedTempFile;

const MIB: usize = 1024 * 1024;

/// Cap files written by this process at `limit` bytes.
///
/// `SIGXFSZ` is ignored so a write crossing the limit returns a partial
/// count instead of killing the process.
#[allow(unsafe_code)]
fn limit_file_size(limit: u64) {
    unsafe {
        libc::signal(libc::SIGXFSZ, libc::SIG_IGN);

        let mut current = libc::rlimit {
            rlim_cur: 0,
            rlim_max: 0,
        };
        assert_eq!(libc::getrlimit(libc::RLIMIT_FSIZE, &mut current), 0);
        let lowered = libc::rlimit {
            rlim_cur: limit.min(current.rlim_max as u64) as libc::rlim_t,
            rlim_max: current.rlim_max,
        };
        assert_eq!(libc::setrlimit(libc::RLIMIT_FSIZE, &lowered), 0);
    }
}

#[tokio::test]
async fn test_file_device_accepting_half_a_chunk() {
    let device = NamedTempFile::new().unwrap();
    limit_file_size((MIB + MIB / 2) as u64);

    let data = vec![0x5Au8; 2 * MIB];
    let writer = ImageWriter::with_config(WriteConfig::new().chunk_size(MIB))
        .device_access(RawDeviceAccess::new().sync_writes(false))
        .preparer(NoopPreparer);

    let err = writer
        .write(
            ImageSource::new(Cursor::new(data), (2 * MIB) as u64),
            device.path().to_str().unwrap(),
        )
        .await
        .unwrap_err();

    match err {
        Error::ShortTransfer {
            offset,
            expected,
            read,
            written,
        } => {
            assert_eq!(offset, MIB as u64);
            assert_eq!(expected, MIB);
            assert_eq!(read, MIB);
            assert_eq!(written, MIB / 2);
        }
        other => panic!("expected a short transfer, got {:?}", other),
    }

    assert_eq!(
        std::fs::metadata(device.path()).unwrap().len(),
        (MIB + MIB / 2) as u64
    );
}

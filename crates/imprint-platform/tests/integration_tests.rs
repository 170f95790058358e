//! Integration tests for imprint-platform
//!
//! These tests exercise the public API against temporary files standing in
//! for devices. Tests that require actual devices are marked with #[ignore].

use imprint_platform::*;
use std::io::{Read, Write};
use tempfile::NamedTempFile;

fn read_all(temp: &NamedTempFile) -> Vec<u8> {
    let mut contents = Vec::new();
    std::fs::File::open(temp.path())
        .unwrap()
        .read_to_end(&mut contents)
        .unwrap();
    contents
}

// ============================================================================
// Resolver tests
// ============================================================================

#[test]
fn test_raw_device_path_rewrites_numbered_disks() {
    for n in [0u32, 1, 2, 9, 15, 123] {
        let path = format!("/dev/disk{n}");
        assert_eq!(to_raw_device_path(&path), format!("/dev/rdisk{n}"));
    }
}

#[test]
fn test_raw_device_path_stable_under_reapplication() {
    let paths = [
        "/dev/disk2",
        "/dev/disk2s1",
        "/dev/rdisk4",
        "/dev/sdb",
        "/dev/mmcblk0",
        "\\\\.\\PhysicalDrive1",
        "",
    ];

    for path in paths {
        let once = to_raw_device_path(path);
        assert_eq!(to_raw_device_path(&once), once, "not idempotent for {path}");

        let resolved = resolve_raw_device(path);
        assert_eq!(resolve_raw_device(&resolved), resolved);
    }
}

// ============================================================================
// Eraser tests
// ============================================================================

#[test]
fn test_erase_mbr_on_tempfile() {
    let mut temp = NamedTempFile::new().unwrap();
    let original: Vec<u8> = (0..4096).map(|i| (i % 251) as u8 + 1).collect();
    temp.write_all(&original).unwrap();
    temp.flush().unwrap();

    erase_mbr(temp.path().to_str().unwrap()).unwrap();

    let contents = read_all(&temp);
    assert_eq!(contents.len(), original.len());
    assert_eq!(&contents[..MBR_SIZE], &[0u8; MBR_SIZE][..]);
    assert_eq!(&contents[MBR_SIZE..], &original[MBR_SIZE..]);
}

#[test]
fn test_erase_mbr_is_repeatable() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&[0x55u8; 1024]).unwrap();
    temp.flush().unwrap();

    let path = temp.path().to_str().unwrap();
    erase_mbr(path).unwrap();
    erase_mbr(path).unwrap();

    let contents = read_all(&temp);
    assert!(contents[..MBR_SIZE].iter().all(|&b| b == 0));
    assert!(contents[MBR_SIZE..].iter().all(|&b| b == 0x55));
}

#[test]
fn test_erase_mbr_nonexistent() {
    let result = erase_mbr("/nonexistent/path/to/device");
    assert!(matches!(result, Err(PlatformError::DeviceNotFound(_))));
}

// ============================================================================
// open_device tests
// ============================================================================

#[test]
fn test_open_device_for_writing_keeps_contents() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&[7u8; 8192]).unwrap();
    temp.flush().unwrap();

    let file = open_device(temp.path().to_str().unwrap(), &OpenOptions::for_writing()).unwrap();
    drop(file);

    assert_eq!(read_all(&temp), vec![7u8; 8192]);
}

#[test]
fn test_open_device_read_only_rejects_writes() {
    let mut temp = NamedTempFile::new().unwrap();
    temp.write_all(&[0u8; 512]).unwrap();

    let mut file = open_device(temp.path().to_str().unwrap(), &OpenOptions::new()).unwrap();
    assert!(file.write_all(&[1u8; 16]).is_err());
}

// ============================================================================
// prepare_device tests
// ============================================================================

#[test]
fn test_prepare_device_on_image_file() {
    let temp = NamedTempFile::new().unwrap();
    assert!(prepare_device(temp.path().to_str().unwrap()).is_ok());
}

#[test]
#[ignore] // Run with: cargo test -- --ignored test_prepare_real_device
fn test_prepare_real_device() {
    // Requires root/admin and a real device, e.g. /dev/sdb or \\.\PhysicalDrive1
}

//! Fuzz test for raw device path resolution
//!
//! The resolver must accept arbitrary strings and stay idempotent.

#![no_main]

use imprint_platform::{resolve_raw_device, to_raw_device_path};
use libfuzzer_sys::fuzz_target;

fuzz_target!(|data: &str| {
    let raw_path = to_raw_device_path(data);

    assert!(!raw_path.is_empty() || data.is_empty());

    // Re-applying the rewrite changes nothing
    assert_eq!(to_raw_device_path(&raw_path), raw_path);

    // Only the "/dev/disk" prefix may change
    if raw_path != data {
        assert!(data.starts_with("/dev/disk"));
        assert_eq!(
            raw_path.trim_start_matches("/dev/rdisk"),
            data.trim_start_matches("/dev/disk")
        );
    }

    // Already raw paths are unchanged
    if data.starts_with("/dev/rdisk") {
        assert_eq!(raw_path, data);
    }

    let resolved = resolve_raw_device(data);
    assert_eq!(resolve_raw_device(&resolved), resolved);
});

//! Raw device path resolution
//!
//! macOS exposes every buffered disk node `/dev/diskN` with an unbuffered
//! twin `/dev/rdiskN` that bypasses the buffer cache and is an order of
//! magnitude faster for large sequential transfers. Other platforms have no
//! such alias and paths pass through untouched.

/// Convert a macOS disk path to its raw device equivalent.
///
/// Only `/dev/disk` immediately followed by a disk number is rewritten, so
/// Linux paths such as `/dev/disk/by-id/...` are left alone.
///
/// - `/dev/disk2` -> `/dev/rdisk2`
/// - `/dev/disk2s1` -> `/dev/rdisk2s1`
/// - `/dev/rdisk2` -> unchanged
pub fn to_raw_device_path(path: &str) -> String {
    match path.strip_prefix("/dev/disk") {
        Some(rest) if rest.starts_with(|c: char| c.is_ascii_digit()) => {
            format!("/dev/rdisk{rest}")
        }
        _ => path.to_string(),
    }
}

/// Resolve a device path to the fastest raw-access path on this platform.
pub fn resolve_raw_device(path: &str) -> String {
    cfg_if::cfg_if! {
        if #[cfg(target_os = "macos")] {
            to_raw_device_path(path)
        } else {
            path.to_string()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_to_raw_device_path_disk() {
        assert_eq!(to_raw_device_path("/dev/disk2"), "/dev/rdisk2");
        assert_eq!(to_raw_device_path("/dev/disk0"), "/dev/rdisk0");
        assert_eq!(to_raw_device_path("/dev/disk10"), "/dev/rdisk10");
    }

    #[test]
    fn test_to_raw_device_path_partition() {
        assert_eq!(to_raw_device_path("/dev/disk2s1"), "/dev/rdisk2s1");
    }

    #[test]
    fn test_to_raw_device_path_already_raw() {
        assert_eq!(to_raw_device_path("/dev/rdisk2"), "/dev/rdisk2");
        assert_eq!(to_raw_device_path("/dev/rdisk2s1"), "/dev/rdisk2s1");
    }

    #[test]
    fn test_to_raw_device_path_other() {
        assert_eq!(to_raw_device_path("/dev/sdb"), "/dev/sdb");
        assert_eq!(to_raw_device_path("/dev/disk"), "/dev/disk");
        assert_eq!(
            to_raw_device_path("/dev/disk/by-id/usb-Foo"),
            "/dev/disk/by-id/usb-Foo"
        );
        assert_eq!(to_raw_device_path("/tmp/test.img"), "/tmp/test.img");
        assert_eq!(
            to_raw_device_path("\\\\.\\PhysicalDrive1"),
            "\\\\.\\PhysicalDrive1"
        );
    }

    #[test]
    fn test_to_raw_device_path_idempotent() {
        for path in ["/dev/disk2", "/dev/disk3s2", "/dev/sdc", "/dev/mmcblk0"] {
            let once = to_raw_device_path(path);
            assert_eq!(to_raw_device_path(&once), once);
        }
    }

    #[test]
    fn test_to_raw_device_path_only_prefix_changes() {
        let raw = to_raw_device_path("/dev/disk4");
        assert_eq!(raw.trim_start_matches("/dev/r"), "disk4");
    }

    #[test]
    fn test_resolve_raw_device_idempotent() {
        for path in ["/dev/disk2", "/dev/sdb", "/dev/nvme0n1"] {
            let once = resolve_raw_device(path);
            assert_eq!(resolve_raw_device(&once), once);
        }
    }

    #[cfg(not(target_os = "macos"))]
    #[test]
    fn test_resolve_raw_device_passthrough() {
        assert_eq!(resolve_raw_device("/dev/disk2"), "/dev/disk2");
        assert_eq!(resolve_raw_device("/dev/sdb"), "/dev/sdb");
    }

    #[cfg(target_os = "macos")]
    #[test]
    fn test_resolve_raw_device_macos() {
        assert_eq!(resolve_raw_device("/dev/disk2"), "/dev/rdisk2");
    }
}

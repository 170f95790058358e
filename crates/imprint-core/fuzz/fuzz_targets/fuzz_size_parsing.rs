//! Fuzz test for size string parsing
//!
//! Tests that size parsing handles arbitrary inputs safely.

#![no_main]

use libfuzzer_sys::fuzz_target;

use imprint_core::parse_size;

fuzz_target!(|data: &str| {
    // Should never panic, only return Ok/Err
    let _ = parse_size(data);

    // Suffixed forms scale the bare number without overflowing
    if let Ok(base) = parse_size(data.trim()) {
        for (suffix, multiplier) in [("K", 1024u64), ("M", 1024 * 1024), ("G", 1024 * 1024 * 1024)] {
            if data.trim().chars().all(|c| c.is_ascii_digit()) {
                let scaled = parse_size(&format!("{}{}", data.trim(), suffix));
                match base.checked_mul(multiplier) {
                    Some(expected) => assert_eq!(scaled.ok(), Some(expected)),
                    None => assert!(scaled.is_err()),
                }
            }
        }
    }

    for suffix in ["", "B", "K", "KB", "KiB", "M", "MB", "MiB", "G", "GB", "GiB", "k", "m", "g"] {
        let _ = parse_size(&format!("{}{}", data.trim(), suffix));
    }

    // Leading/trailing whitespace is ignored
    let padded = format!("  {}  ", data);
    assert_eq!(parse_size(&padded).ok(), parse_size(data).ok());
});

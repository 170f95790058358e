//! Fuzz test for format functions
//!
//! Tests that format_speed and format_duration handle all inputs safely.

#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;

use imprint_core::{format_duration, format_speed};

#[derive(Arbitrary, Debug)]
struct FormatInput {
    speed: u64,
    duration: u64,
}

fuzz_target!(|input: FormatInput| {
    let speed_str = format_speed(input.speed);
    assert!(!speed_str.is_empty());
    assert!(speed_str.contains(' '), "Missing space in: {}", speed_str);
    assert!(speed_str.ends_with("/s"), "Missing /s suffix: {}", speed_str);

    let duration_str = format_duration(input.duration);
    assert!(!duration_str.is_empty());
    assert!(
        duration_str.ends_with('s') || duration_str.ends_with('m'),
        "Missing time unit: {}",
        duration_str
    );
});

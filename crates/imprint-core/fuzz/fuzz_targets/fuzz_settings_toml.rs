//! Fuzz test for settings TOML parsing
//!
//! Tests that settings deserialization handles arbitrary TOML safely.

#![no_main]

use libfuzzer_sys::fuzz_target;

use imprint_core::{Settings, VerifySettings, WriteSettings};

fuzz_target!(|data: &str| {
    if let Ok(settings) = toml::from_str::<Settings>(data) {
        // Serialization round trip preserves every field
        let serialized = toml::to_string_pretty(&settings).unwrap();
        let reparsed: Settings = toml::from_str(&serialized).unwrap();
        assert_eq!(reparsed, settings);

        // Conversions validate without panicking
        let _ = settings.write_config();
        let _ = settings.verify_config();
        let _ = settings.device_access();
    }

    // Individual sections
    let _: Result<WriteSettings, _> = toml::from_str(data);
    let _: Result<VerifySettings, _> = toml::from_str(data);

    // Table wrappers, as they appear in the config file
    let wrapped = format!("[write]\n{}", data);
    let _: Result<Settings, _> = toml::from_str(&wrapped);

    let wrapped = format!("[verify]\n{}", data);
    let _: Result<Settings, _> = toml::from_str(&wrapped);
});

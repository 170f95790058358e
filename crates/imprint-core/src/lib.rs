//! # Imprint Core
//!
//! Write-and-verify pipeline for flashing images onto raw block devices.
//!
//! ## Modules
//!
//! - `writer`: chunked write pipeline (erase, prepare, transfer, finalize)
//! - `checker`: post-write verification by checksum comparison
//! - `replicator`: single-chunk copy between a stream and a device
//! - `progress`: per-chunk progress snapshots and ETA
//! - `checksum`: checksum algorithms and the default digest service
//! - `hooks`: collaborator traits (digest, mount guard, device preparer)
//! - `device`: device access for real and simulated devices
//! - `source`: image streams with a declared length
//! - `settings`: persistent user settings from configuration file
//! - `error`: error types and result aliases
//!
//! ## Example
//!
//! ```no_run
//! use imprint_core::{ImageChecker, ImageSource, ImageWriter};
//!
//! # async fn run() -> imprint_core::Result<()> {
//! let writer = ImageWriter::new()
//!     .on_progress(|p| println!("{:.1}% - ETA {}", p.percentage, p.eta_display()));
//! writer.write(ImageSource::open("image.img").await?, "/dev/sdb").await?;
//!
//! // Verification needs a fresh stream
//! let matched = ImageChecker::new()
//!     .check("/dev/sdb", ImageSource::open("image.img").await?)
//!     .await?;
//! println!("verified: {}", matched);
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod checker;
pub mod checksum;
pub mod device;
pub mod error;
pub mod hooks;
pub mod progress;
pub mod replicator;
pub mod settings;
pub mod source;
pub mod writer;

pub use checker::{ImageChecker, VerifyConfig, VerifyState};
pub use checksum::{
    Checksum, ChecksumAlgorithm, Digest, HashDigest, DEFAULT_VERIFY_BLOCK_SIZE,
    MAX_VERIFY_BLOCK_SIZE, MIN_VERIFY_BLOCK_SIZE,
};
pub use device::{
    DeviceAccess, DeviceEvent, DeviceReader, DeviceWrite, DeviceWriter, RawDeviceAccess,
    SimulatedDevice,
};
pub use error::{Error, Result};
pub use hooks::{
    DevicePreparer, DigestService, MountGuard, NoMountGuard, NoopPreparer, ReleaseHandle,
    SystemPreparer,
};
pub use progress::{
    format_duration, format_speed, EtaSample, EtaTracker, ProgressCallback, ProgressSnapshot,
    ProgressTracker,
};
pub use replicator::{copy_chunk, ChunkTransfer};
pub use settings::{parse_size, Settings, SettingsError, VerifySettings, WriteSettings};
pub use source::ImageSource;
pub use writer::{
    ImageWriter, WriteConfig, WriteResult, WriteState, DEFAULT_CHUNK_SIZE, MAX_CHUNK_SIZE,
    MIN_CHUNK_SIZE,
};

/// Write `source` onto `device` with the default configuration
pub async fn write(source: ImageSource, device: &str) -> Result<WriteResult> {
    ImageWriter::new().write(source, device).await
}

/// Check that `device` holds `source`, with the default configuration.
///
/// Returns `Ok(false)` on a mismatch.
pub async fn check(device: &str, source: ImageSource) -> Result<bool> {
    ImageChecker::new().check(device, source).await
}

//! Write pipeline
//!
//! Streams an image onto a raw device in fixed-size chunks:
//!
//! ```text
//! Idle -> Erasing -> Preparing -> Transferring -> Finalizing -> Done
//!   \________\___________\____________\______________\-> Failed
//! ```
//!
//! The boot sector is zeroed first so the OS does not pick up a stale
//! partition table mid-write, and the device preparer runs before and after
//! the transfer. Chunks are written strictly in order at explicit offsets;
//! any short chunk fails the write on the spot.
//!
//! ## Example
//!
//! ```no_run
//! use imprint_core::{ImageSource, ImageWriter, WriteConfig};
//!
//! # async fn run() -> imprint_core::Result<()> {
//! let source = ImageSource::open("image.img").await?;
//!
//! let writer = ImageWriter::with_config(WriteConfig::new().chunk_size(4 * 1024 * 1024))
//!     .on_progress(|p| println!("{:.1}% - {}", p.percentage, p.speed_display()));
//!
//! let result = writer.write(source, "/dev/sdb").await?;
//! println!("Wrote {} bytes in {:?}", result.bytes_written, result.elapsed);
//! # Ok(())
//! # }
//! ```

use crate::device::{DeviceAccess, RawDeviceAccess};
use crate::error::{Error, Result};
use crate::hooks::{DevicePreparer, SystemPreparer};
use crate::progress::{format_speed, ProgressCallback, ProgressSnapshot, ProgressTracker};
use crate::replicator::copy_chunk;
use crate::source::ImageSource;
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Default chunk size for write operations (1 MB)
pub const DEFAULT_CHUNK_SIZE: usize = 1024 * 1024;

/// Minimum chunk size (one sector)
pub const MIN_CHUNK_SIZE: usize = 512;

/// Maximum chunk size (64 MB)
pub const MAX_CHUNK_SIZE: usize = 64 * 1024 * 1024;

/// Stage of a write
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WriteState {
    /// Nothing started yet
    Idle,
    /// Zeroing the boot sector
    Erasing,
    /// Running the device preparer before the transfer
    Preparing,
    /// Streaming chunks
    Transferring,
    /// Running the device preparer after the transfer
    Finalizing,
    /// Every byte written
    Done,
    /// Stopped on an error
    Failed,
}

impl std::fmt::Display for WriteState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            WriteState::Idle => "idle",
            WriteState::Erasing => "erasing",
            WriteState::Preparing => "preparing",
            WriteState::Transferring => "transferring",
            WriteState::Finalizing => "finalizing",
            WriteState::Done => "done",
            WriteState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State change callback type
pub type WriteStateCallback = Box<dyn Fn(WriteState) + Send + Sync>;

/// Configuration for write operations
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteConfig {
    /// Bytes per chunk
    pub chunk_size: usize,

    /// Whether to sync the device after the last chunk
    pub sync_on_complete: bool,
}

impl Default for WriteConfig {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            sync_on_complete: true,
        }
    }
}

impl WriteConfig {
    /// Create a new config with defaults
    pub fn new() -> Self {
        Self::default()
    }

    /// Set chunk size (clamped to valid range)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.clamp(MIN_CHUNK_SIZE, MAX_CHUNK_SIZE);
        self
    }

    /// Set sync on complete
    pub fn sync_on_complete(mut self, sync: bool) -> Self {
        self.sync_on_complete = sync;
        self
    }
}

/// Result of a write operation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WriteResult {
    /// Total bytes written
    pub bytes_written: u64,

    /// Number of chunks written
    pub chunks: u64,

    /// Total time elapsed
    pub elapsed: Duration,

    /// Average speed in bytes per second
    pub average_speed: u64,
}

impl WriteResult {
    /// Format average speed for display
    pub fn speed_display(&self) -> String {
        format_speed(self.average_speed)
    }
}

/// Writes images onto devices
pub struct ImageWriter {
    config: WriteConfig,
    access: Arc<dyn DeviceAccess>,
    preparer: Arc<dyn DevicePreparer>,
    progress_callback: Option<ProgressCallback>,
    state_callback: Option<WriteStateCallback>,
}

impl Default for ImageWriter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageWriter {
    /// Create a writer for real devices with default configuration
    pub fn new() -> Self {
        Self::with_config(WriteConfig::default())
    }

    /// Create a writer for real devices with custom configuration
    pub fn with_config(config: WriteConfig) -> Self {
        Self {
            config,
            access: Arc::new(RawDeviceAccess::new()),
            preparer: Arc::new(SystemPreparer),
            progress_callback: None,
            state_callback: None,
        }
    }

    /// Use a different device access layer
    pub fn device_access<A>(mut self, access: A) -> Self
    where
        A: DeviceAccess + 'static,
    {
        self.access = Arc::new(access);
        self
    }

    /// Use a different device preparer
    pub fn preparer<P>(mut self, preparer: P) -> Self
    where
        P: DevicePreparer + 'static,
    {
        self.preparer = Arc::new(preparer);
        self
    }

    /// Set a progress callback, called once per chunk
    pub fn on_progress<F>(mut self, callback: F) -> Self
    where
        F: Fn(&ProgressSnapshot) + Send + Sync + 'static,
    {
        self.progress_callback = Some(Box::new(callback));
        self
    }

    /// Set a callback for state changes
    pub fn on_state<F>(mut self, callback: F) -> Self
    where
        F: Fn(WriteState) + Send + Sync + 'static,
    {
        self.state_callback = Some(Box::new(callback));
        self
    }

    /// The active configuration
    pub fn config(&self) -> &WriteConfig {
        &self.config
    }

    /// Write `source` onto `device`.
    ///
    /// The device path is resolved to its raw form once. On success every
    /// byte of the source is on the device; on failure the error says where
    /// the write stopped and the device contents are undefined.
    pub async fn write(&self, mut source: ImageSource, device: &str) -> Result<WriteResult> {
        match self.run(&mut source, device).await {
            Ok(result) => Ok(result),
            Err(e) => {
                tracing::error!("Writing {} to {} failed: {}", source.description(), device, e);
                self.enter(WriteState::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self, source: &mut ImageSource, device: &str) -> Result<WriteResult> {
        let total = source.length().ok_or(Error::MissingLength)?;
        let device = imprint_platform::resolve_raw_device(device);
        let start_time = Instant::now();

        tracing::info!(
            "Writing {} ({} bytes) to {}",
            source.description(),
            total,
            device
        );

        self.enter(WriteState::Erasing);
        self.access.erase_mbr(&device).await?;

        self.enter(WriteState::Preparing);
        self.preparer.prepare(&device).await?;

        self.enter(WriteState::Transferring);
        let chunks = self.transfer(source, &device, total).await?;

        self.enter(WriteState::Finalizing);
        self.preparer.prepare(&device).await?;

        self.enter(WriteState::Done);

        let elapsed = start_time.elapsed();
        let average_speed = if elapsed.as_secs_f64() > 0.0 {
            (total as f64 / elapsed.as_secs_f64()) as u64
        } else {
            0
        };

        tracing::info!(
            "Wrote {} bytes to {} in {:?} ({})",
            total,
            device,
            elapsed,
            format_speed(average_speed)
        );

        Ok(WriteResult {
            bytes_written: total,
            chunks,
            elapsed,
            average_speed,
        })
    }

    /// Stream every chunk, returning the number of chunks written
    async fn transfer(&self, source: &mut ImageSource, device: &str, total: u64) -> Result<u64> {
        let chunk_size = self.config.chunk_size;
        let mut target = self.access.open_write(device).await?;
        let mut buffer = vec![0u8; chunk_size];
        let mut tracker = ProgressTracker::new(total, chunk_size);
        tracker.start();

        let mut written = 0u64;
        let mut chunks = 0u64;

        while written < total {
            let len = (total - written).min(chunk_size as u64) as usize;
            let transfer = copy_chunk(
                source.reader_mut(),
                &mut *target,
                Some(written),
                &mut buffer[..len],
            )
            .await?;

            if !transfer.is_complete(len) {
                return Err(Error::ShortTransfer {
                    offset: written,
                    expected: len,
                    read: transfer.bytes_read,
                    written: transfer.bytes_written,
                });
            }

            written += len as u64;
            chunks += 1;

            let snapshot = tracker.record(len as u64);
            tracing::trace!(
                "Chunk {} written at offset {} ({:.1}%)",
                chunks,
                written - len as u64,
                snapshot.percentage
            );
            if let Some(ref callback) = self.progress_callback {
                callback(&snapshot);
            }
        }

        if self.config.sync_on_complete {
            target.sync().await.map_err(Error::device_write)?;
        }

        Ok(chunks)
    }

    fn enter(&self, state: WriteState) {
        tracing::debug!("Write state: {}", state);
        if let Some(ref callback) = self.state_callback {
            callback(state);
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::{DeviceEvent, SimulatedDevice};
    use crate::hooks::NoopPreparer;
    use async_trait::async_trait;
    use std::io::Cursor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    const KIB: usize = 1024;
    const MIB: usize = 1024 * 1024;

    fn zero_source(len: usize) -> ImageSource {
        ImageSource::new(Cursor::new(vec![0u8; len]), len as u64)
    }

    fn patterned(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i % 251) as u8 + 1).collect()
    }

    fn simulated_writer(device: &SimulatedDevice, chunk_size: usize) -> ImageWriter {
        ImageWriter::with_config(WriteConfig::new().chunk_size(chunk_size))
            .device_access(device.clone())
            .preparer(NoopPreparer)
    }

    fn write_offsets(device: &SimulatedDevice) -> Vec<(u64, usize)> {
        device
            .events()
            .into_iter()
            .filter_map(|e| match e {
                DeviceEvent::Write { offset, len, .. } => Some((offset, len)),
                _ => None,
            })
            .collect()
    }

    /// Preparer recording its calls, optionally failing on the n-th one
    #[derive(Clone, Default)]
    struct RecordingPreparer {
        calls: Arc<AtomicUsize>,
        fail_on: Option<usize>,
    }

    #[async_trait]
    impl DevicePreparer for RecordingPreparer {
        async fn prepare(&self, device: &str) -> Result<()> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
            if self.fail_on == Some(call) {
                return Err(Error::Hook(format!("prepare #{} of {} refused", call, device)));
            }
            Ok(())
        }
    }

    // -------------------------------------------------------------------------
    // WriteConfig tests
    // -------------------------------------------------------------------------

    #[test]
    fn test_config_default() {
        let config = WriteConfig::default();
        assert_eq!(config.chunk_size, 1024 * 1024);
        assert!(config.sync_on_complete);
    }

    #[test]
    fn test_config_chunk_size_clamping() {
        assert_eq!(WriteConfig::new().chunk_size(1).chunk_size, MIN_CHUNK_SIZE);
        assert_eq!(
            WriteConfig::new().chunk_size(usize::MAX).chunk_size,
            MAX_CHUNK_SIZE
        );
        assert_eq!(WriteConfig::new().chunk_size(64 * KIB).chunk_size, 64 * KIB);
    }

    #[test]
    fn test_write_state_display() {
        assert_eq!(WriteState::Transferring.to_string(), "transferring");
        assert_eq!(WriteState::Failed.to_string(), "failed");
    }

    // -------------------------------------------------------------------------
    // Pipeline tests
    // -------------------------------------------------------------------------

    #[tokio::test]
    async fn test_ten_mebibytes_in_64k_chunks() {
        let device = SimulatedDevice::with_contents(vec![0xFF; 16 * MIB]);
        let snapshots = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&snapshots);

        let writer = simulated_writer(&device, 64 * KIB)
            .on_progress(move |p| sink.lock().unwrap().push(p.clone()));

        let result = writer.write(zero_source(10 * MIB), "/dev/sim0").await.unwrap();

        assert_eq!(result.bytes_written, 10_485_760);
        assert_eq!(result.chunks, 160);

        let snapshots = snapshots.lock().unwrap();
        assert_eq!(snapshots.len(), 160);
        let last = snapshots.last().unwrap();
        assert_eq!(last.percentage, 100.0);
        assert_eq!(last.transferred, 10_485_760);
        assert_eq!(last.remaining, 0);
        assert!(snapshots.iter().all(|s| s.transferred <= s.length));
        assert!(snapshots
            .windows(2)
            .all(|w| w[0].transferred < w[1].transferred));

        let contents = device.contents();
        assert!(contents[..10 * MIB].iter().all(|&b| b == 0));
        assert!(contents[10 * MIB..].iter().all(|&b| b == 0xFF));
    }

    #[tokio::test]
    async fn test_chunk_lengths_and_offsets() {
        let data = patterned(100_000);
        let device = SimulatedDevice::new(128 * KIB);
        let writer = simulated_writer(&device, 30_000);

        let source = ImageSource::new(Cursor::new(data.clone()), data.len() as u64);
        let result = writer.write(source, "/dev/sim0").await.unwrap();

        assert_eq!(result.chunks, 4);
        assert_eq!(
            write_offsets(&device),
            vec![(0, 30_000), (30_000, 30_000), (60_000, 30_000), (90_000, 10_000)]
        );
        assert_eq!(&device.contents()[..data.len()], &data[..]);
    }

    #[tokio::test]
    async fn test_exact_multiple_of_chunk_size() {
        let device = SimulatedDevice::new(8 * KIB);
        let writer = simulated_writer(&device, 2 * KIB);

        let result = writer.write(zero_source(8 * KIB), "/dev/sim0").await.unwrap();

        assert_eq!(result.chunks, 4);
        assert!(write_offsets(&device).iter().all(|&(_, len)| len == 2 * KIB));
    }

    #[tokio::test]
    async fn test_boot_sector_erased_before_image() {
        let device = SimulatedDevice::with_contents(vec![0xAA; 4 * KIB]);
        let writer = simulated_writer(&device, KIB);

        let events_before_write = Arc::new(Mutex::new(None));
        let observed_device = device.clone();
        let snapshot = Arc::clone(&events_before_write);
        let writer = writer.on_state(move |state| {
            if state == WriteState::Transferring {
                *snapshot.lock().unwrap() = Some(observed_device.contents());
            }
        });

        writer
            .write(ImageSource::new(Cursor::new(vec![1u8; KIB]), KIB as u64), "/dev/sim0")
            .await
            .unwrap();

        let before = events_before_write.lock().unwrap().clone().unwrap();
        assert!(before[..512].iter().all(|&b| b == 0));
        assert!(before[512..].iter().all(|&b| b == 0xAA));
        assert!(matches!(device.events()[0], DeviceEvent::Erase(_)));
    }

    #[tokio::test]
    async fn test_short_write_on_chunk_five_stops_transfer() {
        let device = SimulatedDevice::new(16 * MIB).fail_write_short_on(5);
        let progress_calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&progress_calls);

        let writer = simulated_writer(&device, 64 * KIB).on_progress(move |_| {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        let err = writer
            .write(zero_source(10 * MIB), "/dev/sim0")
            .await
            .unwrap_err();

        match err {
            Error::ShortTransfer {
                offset,
                expected,
                read,
                written,
            } => {
                assert_eq!(offset, 4 * 64 * KIB as u64);
                assert_eq!(expected, 64 * KIB);
                assert_eq!(read, 64 * KIB);
                assert_eq!(written, 32 * KIB);
            }
            other => panic!("Expected ShortTransfer, got {:?}", other),
        }

        assert_eq!(device.write_calls(), 5);
        assert_eq!(progress_calls.load(Ordering::SeqCst), 4);
    }

    #[tokio::test]
    async fn test_source_shorter_than_declared() {
        let device = SimulatedDevice::new(MIB);
        let writer = simulated_writer(&device, 4 * KIB);

        // Declares 10 KiB but only holds 6 KiB
        let source = ImageSource::new(Cursor::new(vec![7u8; 6 * KIB]), 10 * KIB as u64);
        let err = writer.write(source, "/dev/sim0").await.unwrap_err();

        assert!(matches!(
            err,
            Error::ShortTransfer {
                offset: 4096,
                read: 2048,
                written: 0,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_device_too_small() {
        let device = SimulatedDevice::new(3 * KIB);
        let writer = simulated_writer(&device, 2 * KIB);

        let err = writer
            .write(zero_source(4 * KIB), "/dev/sim0")
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            Error::ShortTransfer {
                offset: 2048,
                written: 1024,
                ..
            }
        ));
    }

    #[tokio::test]
    async fn test_missing_length_touches_nothing() {
        let device = SimulatedDevice::with_contents(vec![0x5A; 4 * KIB]);
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);

        let writer =
            simulated_writer(&device, KIB).on_state(move |s| sink.lock().unwrap().push(s));

        let source = ImageSource::without_length(Cursor::new(vec![0u8; KIB]));
        let err = writer.write(source, "/dev/sim0").await.unwrap_err();

        assert!(matches!(err, Error::MissingLength));
        assert!(device.events().is_empty());
        assert!(device.contents().iter().all(|&b| b == 0x5A));
        assert_eq!(*states.lock().unwrap(), vec![WriteState::Failed]);
    }

    #[tokio::test]
    async fn test_invalid_argument_becomes_invalid_image() {
        let device = SimulatedDevice::new(MIB).fail_write_invalid_on(2);
        let writer = simulated_writer(&device, 4 * KIB);

        let err = writer
            .write(zero_source(16 * KIB), "/dev/sim0")
            .await
            .unwrap_err();

        assert!(matches!(err, Error::InvalidImage(_)));
        assert!(err.to_string().contains("invalid"));
    }

    #[tokio::test]
    async fn test_invalid_argument_on_open_stays_io() {
        let device = SimulatedDevice::new(MIB).fail_open_write();
        let writer = simulated_writer(&device, 4 * KIB);

        let err = writer
            .write(zero_source(16 * KIB), "/dev/sim0")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput
        ));
        assert_eq!(device.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_invalid_argument_from_source_stays_io() {
        struct Rejecting;

        impl tokio::io::AsyncRead for Rejecting {
            fn poll_read(
                self: std::pin::Pin<&mut Self>,
                _cx: &mut std::task::Context<'_>,
                _buf: &mut tokio::io::ReadBuf<'_>,
            ) -> std::task::Poll<std::io::Result<()>> {
                std::task::Poll::Ready(Err(std::io::Error::from(
                    std::io::ErrorKind::InvalidInput,
                )))
            }
        }

        let device = SimulatedDevice::new(MIB);
        let writer = simulated_writer(&device, 4 * KIB);

        let err = writer
            .write(ImageSource::new(Rejecting, 16 * KIB as u64), "/dev/sim0")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::Io(ref e) if e.kind() == std::io::ErrorKind::InvalidInput
        ));
        assert_eq!(device.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_erase_failure_is_surfaced() {
        let device = SimulatedDevice::new(MIB).fail_erase_after(256);
        let writer = simulated_writer(&device, 4 * KIB);

        let err = writer
            .write(zero_source(16 * KIB), "/dev/sim0")
            .await
            .unwrap_err();

        assert!(matches!(
            err,
            Error::ShortWrite {
                expected: 512,
                actual: 256
            }
        ));
        assert_eq!(device.write_calls(), 0);
    }

    #[tokio::test]
    async fn test_state_sequence_on_success() {
        let device = SimulatedDevice::new(MIB);
        let states = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&states);

        simulated_writer(&device, 4 * KIB)
            .on_state(move |s| sink.lock().unwrap().push(s))
            .write(zero_source(16 * KIB), "/dev/sim0")
            .await
            .unwrap();

        assert_eq!(
            *states.lock().unwrap(),
            vec![
                WriteState::Erasing,
                WriteState::Preparing,
                WriteState::Transferring,
                WriteState::Finalizing,
                WriteState::Done,
            ]
        );
        assert_eq!(device.events().last(), Some(&DeviceEvent::Sync));
    }

    #[tokio::test]
    async fn test_prepare_runs_before_and_after() {
        let device = SimulatedDevice::new(MIB);
        let preparer = RecordingPreparer::default();
        let calls = Arc::clone(&preparer.calls);

        simulated_writer(&device, 4 * KIB)
            .preparer(preparer)
            .write(zero_source(16 * KIB), "/dev/sim0")
            .await
            .unwrap();

        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_failure_in_each_hook_state() {
        for (fail_on, last_state) in [(1, WriteState::Preparing), (2, WriteState::Finalizing)] {
            let device = SimulatedDevice::new(MIB);
            let states = Arc::new(Mutex::new(Vec::new()));
            let sink = Arc::clone(&states);

            let err = simulated_writer(&device, 4 * KIB)
                .preparer(RecordingPreparer {
                    fail_on: Some(fail_on),
                    ..RecordingPreparer::default()
                })
                .on_state(move |s| sink.lock().unwrap().push(s))
                .write(zero_source(16 * KIB), "/dev/sim0")
                .await
                .unwrap_err();

            assert!(matches!(err, Error::Hook(_)));
            let states = states.lock().unwrap();
            assert_eq!(states[states.len() - 2], last_state);
            assert_eq!(states.last(), Some(&WriteState::Failed));
        }
    }

    #[tokio::test]
    async fn test_no_sync_when_disabled() {
        let device = SimulatedDevice::new(MIB);
        ImageWriter::with_config(WriteConfig::new().chunk_size(4 * KIB).sync_on_complete(false))
            .device_access(device.clone())
            .preparer(NoopPreparer)
            .write(zero_source(8 * KIB), "/dev/sim0")
            .await
            .unwrap();

        assert!(!device.events().contains(&DeviceEvent::Sync));
    }

    #[tokio::test]
    async fn test_empty_image() {
        let device = SimulatedDevice::with_contents(vec![0xFF; 2 * KIB]);
        let result = simulated_writer(&device, KIB)
            .write(zero_source(0), "/dev/sim0")
            .await
            .unwrap();

        assert_eq!(result.bytes_written, 0);
        assert_eq!(result.chunks, 0);
        assert_eq!(device.write_calls(), 0);
        // The boot sector is still cleared
        assert!(device.contents()[..512].iter().all(|&b| b == 0));
    }
}

//! Device handles used by the pipelines
//!
//! [`DeviceAccess`] is the seam between the pipelines and the block device:
//! erasing the boot sector and opening the device for writing or reading.
//! [`RawDeviceAccess`] talks to real devices (or image files standing in for
//! them) through `imprint-platform`; [`SimulatedDevice`] keeps everything in
//! memory and can inject faults.

mod simulated;

pub use simulated::{DeviceEvent, SimulatedDevice};

use crate::error::{Error, Result};
use async_trait::async_trait;
use imprint_platform::OpenOptions;
use std::fs::File;
use std::sync::Arc;
use tokio::io::AsyncRead;

/// A device opened for writing
#[async_trait]
pub trait DeviceWrite: Send {
    /// Hand `buf` to the device in a single write call at `offset`, or at
    /// the current position when `None`.
    ///
    /// Returns the number of bytes the device accepted, which may be fewer
    /// than `buf.len()`. Nothing is retried.
    async fn write_chunk(&mut self, buf: &[u8], offset: Option<u64>) -> std::io::Result<usize>;

    /// Persist written data to stable storage
    async fn sync(&mut self) -> std::io::Result<()>;
}

/// Write handle returned by [`DeviceAccess::open_write`]
pub type DeviceWriter = Box<dyn DeviceWrite>;

/// Read handle returned by [`DeviceAccess::open_read`]
pub type DeviceReader = Box<dyn AsyncRead + Unpin + Send>;

/// Operations the pipelines perform on a device
#[async_trait]
pub trait DeviceAccess: Send + Sync {
    /// Zero the first 512 bytes of `device`
    async fn erase_mbr(&self, device: &str) -> Result<()>;

    /// Open `device` for writing, without truncating it
    async fn open_write(&self, device: &str) -> Result<DeviceWriter>;

    /// Open `device` for reading
    async fn open_read(&self, device: &str) -> Result<DeviceReader>;
}

/// Access to real devices through the platform layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawDeviceAccess {
    sync_writes: bool,
}

impl Default for RawDeviceAccess {
    fn default() -> Self {
        Self { sync_writes: true }
    }
}

impl RawDeviceAccess {
    /// Create with synchronous writes enabled
    pub fn new() -> Self {
        Self::default()
    }

    /// Open devices with `O_SYNC` / write-through
    pub fn sync_writes(mut self, sync: bool) -> Self {
        self.sync_writes = sync;
        self
    }

    async fn open(&self, device: &str, options: OpenOptions) -> Result<File> {
        let path = device.to_string();
        run_blocking(move || imprint_platform::open_device(&path, &options)).await
    }
}

#[async_trait]
impl DeviceAccess for RawDeviceAccess {
    async fn erase_mbr(&self, device: &str) -> Result<()> {
        let path = device.to_string();
        run_blocking(move || imprint_platform::erase_mbr(&path)).await
    }

    async fn open_write(&self, device: &str) -> Result<DeviceWriter> {
        let options = OpenOptions::for_writing().sync(self.sync_writes);
        let file = self.open(device, options).await?;
        tracing::debug!("Opened {} for writing", device);
        Ok(Box::new(RawDeviceWriter::new(file)))
    }

    async fn open_read(&self, device: &str) -> Result<DeviceReader> {
        let file = self.open(device, OpenOptions::new()).await?;
        tracing::debug!("Opened {} for reading", device);
        Ok(Box::new(tokio::fs::File::from_std(file)))
    }
}

/// Write handle onto a real device.
///
/// Each chunk is one positioned write on the blocking pool, so the count
/// returned is the count the device accepted.
struct RawDeviceWriter {
    file: Arc<File>,
    position: u64,
    buffer: Vec<u8>,
}

impl RawDeviceWriter {
    fn new(file: File) -> Self {
        Self {
            file: Arc::new(file),
            position: 0,
            buffer: Vec::new(),
        }
    }
}

#[async_trait]
impl DeviceWrite for RawDeviceWriter {
    async fn write_chunk(&mut self, buf: &[u8], offset: Option<u64>) -> std::io::Result<usize> {
        let offset = offset.unwrap_or(self.position);
        let file = Arc::clone(&self.file);

        // The blocking task needs owned data; the buffer is reused across chunks
        let mut chunk = std::mem::take(&mut self.buffer);
        chunk.clear();
        chunk.extend_from_slice(buf);

        let (chunk, result) = tokio::task::spawn_blocking(move || {
            let result = imprint_platform::write_at(&file, &chunk, offset);
            (chunk, result)
        })
        .await
        .map_err(std::io::Error::other)?;
        self.buffer = chunk;

        let accepted = result?;
        self.position = offset + accepted as u64;
        Ok(accepted)
    }

    async fn sync(&mut self) -> std::io::Result<()> {
        let file = Arc::clone(&self.file);
        tokio::task::spawn_blocking(move || file.sync_all())
            .await
            .map_err(std::io::Error::other)?
    }
}

/// Run a blocking platform call off the async runtime
async fn run_blocking<T, F>(f: F) -> Result<T>
where
    F: FnOnce() -> imprint_platform::Result<T> + Send + 'static,
    T: Send + 'static,
{
    let result = tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| Error::Io(std::io::Error::other(e)))?;
    Ok(result?)
}

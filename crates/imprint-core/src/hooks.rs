//! Collaborator seams of the pipelines
//!
//! The write and verify pipelines never talk to a checksum library, the
//! mount subsystem or the OS preparation logic directly. They go through the
//! traits below, which makes every state of the pipelines replaceable and
//! lets tests inject failures anywhere.

use crate::checksum::Digest;
use crate::error::{Error, Result};
use crate::progress::ProgressSnapshot;
use async_trait::async_trait;
use tokio::io::AsyncRead;

/// Computes a checksum over the first `expected_length` bytes of a stream
#[async_trait]
pub trait DigestService: Send + Sync {
    /// Hash up to `expected_length` bytes of `reader`.
    ///
    /// A stream that ends early yields a digest over fewer bytes rather than
    /// an error; [`Digest::bytes`] reports how much was actually hashed.
    async fn digest(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        expected_length: u64,
        on_progress: &(dyn for<'p> Fn(&'p ProgressSnapshot) + Send + Sync),
    ) -> Result<Digest>;
}

/// Keeps the OS from auto-mounting a device while it is being read back
#[async_trait]
pub trait MountGuard: Send + Sync {
    /// Start suppressing mounts of `device`
    async fn acquire(&self, device: &str) -> Result<ReleaseHandle>;
}

/// Platform hook run before and after an image is streamed onto a device
#[async_trait]
pub trait DevicePreparer: Send + Sync {
    /// Prepare `device` (already resolved to its raw form)
    async fn prepare(&self, device: &str) -> Result<()>;
}

/// Scoped release of a [`MountGuard`].
///
/// The release action runs exactly once: on [`ReleaseHandle::release`] or
/// when the handle is dropped, whichever comes first.
pub struct ReleaseHandle {
    release: Option<Box<dyn FnOnce() + Send>>,
}

impl ReleaseHandle {
    /// Wrap a release action
    pub fn new<F>(release: F) -> Self
    where
        F: FnOnce() + Send + 'static,
    {
        Self {
            release: Some(Box::new(release)),
        }
    }

    /// A handle with nothing to release
    pub fn noop() -> Self {
        Self { release: None }
    }

    /// Run the release action now
    pub fn release(mut self) {
        self.run();
    }

    fn run(&mut self) {
        if let Some(release) = self.release.take() {
            release();
        }
    }
}

impl Drop for ReleaseHandle {
    fn drop(&mut self) {
        self.run();
    }
}

impl std::fmt::Debug for ReleaseHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReleaseHandle")
            .field("pending", &self.release.is_some())
            .finish()
    }
}

// ============================================================================
// Default collaborators
// ============================================================================

/// Mount guard that does nothing.
///
/// This is the default for [`ImageChecker`](crate::ImageChecker) on every
/// platform. It does not stop macOS from auto-mounting the device between
/// the write and the verify, so callers on macOS that need that should pass
/// their own [`MountGuard`] through `ImageChecker::mount_guard`.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoMountGuard;

#[async_trait]
impl MountGuard for NoMountGuard {
    async fn acquire(&self, device: &str) -> Result<ReleaseHandle> {
        tracing::trace!("No mount guard for {}", device);
        Ok(ReleaseHandle::noop())
    }
}

/// Preparer that does nothing
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopPreparer;

#[async_trait]
impl DevicePreparer for NoopPreparer {
    async fn prepare(&self, _device: &str) -> Result<()> {
        Ok(())
    }
}

/// Preparer backed by [`imprint_platform::prepare_device`]
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemPreparer;

#[async_trait]
impl DevicePreparer for SystemPreparer {
    async fn prepare(&self, device: &str) -> Result<()> {
        let path = device.to_string();
        tokio::task::spawn_blocking(move || imprint_platform::prepare_device(&path))
            .await
            .map_err(|e| Error::Io(std::io::Error::other(e)))??;
        Ok(())
    }
}

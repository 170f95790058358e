//! Verify pipeline
//!
//! Re-reads a device after a write and compares its checksum with the
//! checksum of a fresh copy of the source:
//!
//! ```text
//! Idle -> GuardAcquired -> Hashing -> Comparing -> Done
//!   \__________\______________\__________\-> Failed
//! ```
//!
//! Both digests run concurrently in the calling task. The mount guard is
//! released as soon as hashing ends, whether it succeeded or not. A mismatch
//! is a normal `Ok(false)`, not an error.

use crate::checksum::{ChecksumAlgorithm, Digest, HashDigest, DEFAULT_VERIFY_BLOCK_SIZE};
use crate::device::{DeviceAccess, RawDeviceAccess};
use crate::error::{Error, Result};
use crate::hooks::{DigestService, MountGuard, NoMountGuard};
use crate::progress::{ProgressCallback, ProgressSnapshot};
use crate::source::ImageSource;
use std::sync::Arc;

/// Stage of a verification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyState {
    /// Nothing started yet
    Idle,
    /// Mount guard held
    GuardAcquired,
    /// Digests running
    Hashing,
    /// Comparing the two digests
    Comparing,
    /// Verification finished (match or mismatch)
    Done,
    /// Stopped on an error
    Failed,
}

impl std::fmt::Display for VerifyState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            VerifyState::Idle => "idle",
            VerifyState::GuardAcquired => "guard acquired",
            VerifyState::Hashing => "hashing",
            VerifyState::Comparing => "comparing",
            VerifyState::Done => "done",
            VerifyState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// State change callback type
pub type VerifyStateCallback = Box<dyn Fn(VerifyState) + Send + Sync>;

/// Verification configuration
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifyConfig {
    /// Checksum algorithm
    pub algorithm: ChecksumAlgorithm,
    /// Block size for reading
    pub block_size: usize,
}

impl Default for VerifyConfig {
    fn default() -> Self {
        Self {
            algorithm: ChecksumAlgorithm::default(),
            block_size: DEFAULT_VERIFY_BLOCK_SIZE,
        }
    }
}

impl VerifyConfig {
    /// Create a new config with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Set checksum algorithm
    pub fn algorithm(mut self, algorithm: ChecksumAlgorithm) -> Self {
        self.algorithm = algorithm;
        self
    }

    /// Set block size (clamped to valid range by the digest service)
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size;
        self
    }

    fn digest_service(&self) -> HashDigest {
        HashDigest::new(self.algorithm).block_size(self.block_size)
    }
}

/// Checks that a device holds an image
pub struct ImageChecker {
    access: Arc<dyn DeviceAccess>,
    guard: Arc<dyn MountGuard>,
    digest: Arc<dyn DigestService>,
    progress_callback: Option<ProgressCallback>,
    state_callback: Option<VerifyStateCallback>,
}

impl Default for ImageChecker {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageChecker {
    /// Create a checker for real devices with default configuration.
    ///
    /// The mount guard defaults to [`NoMountGuard`], which does not block
    /// auto-mounting. On macOS supply a guard with [`mount_guard`](Self::mount_guard).
    pub fn new() -> Self {
        Self::with_config(VerifyConfig::default())
    }

    /// Create a checker for real devices with custom configuration.
    ///
    /// Uses [`NoMountGuard`], like [`new`](Self::new).
    pub fn with_config(config: VerifyConfig) -> Self {
        Self {
            access: Arc::new(RawDeviceAccess::new()),
            guard: Arc::new(NoMountGuard),
            digest: Arc::new(config.digest_service()),
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

    /// Use a different mount guard
    pub fn mount_guard<G>(mut self, guard: G) -> Self
    where
        G: MountGuard + 'static,
    {
        self.guard = Arc::new(guard);
        self
    }

    /// Use a different digest service
    pub fn digest_service<D>(mut self, digest: D) -> Self
    where
        D: DigestService + 'static,
    {
        self.digest = Arc::new(digest);
        self
    }

    /// Set a progress callback, fed by both digests
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
        F: Fn(VerifyState) + Send + Sync + 'static,
    {
        self.state_callback = Some(Box::new(callback));
        self
    }

    /// Check whether the first `source.length()` bytes of `device` match
    /// `source`.
    ///
    /// `source` must be a fresh stream, not the one consumed by the write.
    pub async fn check(&self, device: &str, mut source: ImageSource) -> Result<bool> {
        match self.run(device, &mut source).await {
            Ok(matched) => Ok(matched),
            Err(e) => {
                tracing::error!("Verifying {} failed: {}", device, e);
                self.enter(VerifyState::Failed);
                Err(e)
            }
        }
    }

    async fn run(&self, device: &str, source: &mut ImageSource) -> Result<bool> {
        let length = source.length().ok_or(Error::MissingLength)?;
        let device = imprint_platform::resolve_raw_device(device);

        tracing::info!(
            "Verifying {} bytes of {} against {}",
            length,
            device,
            source.description()
        );

        let guard = self.guard.acquire(&device).await?;
        self.enter(VerifyState::GuardAcquired);

        let hashed = self.hash_both(&device, source, length).await;
        guard.release();
        let (source_digest, device_digest) = hashed?;

        self.enter(VerifyState::Comparing);
        let matched = source_digest == device_digest;
        if matched {
            tracing::info!(
                "{} matches ({} {})",
                device,
                source_digest.checksum.algorithm,
                source_digest.checksum
            );
        } else {
            tracing::warn!(
                "{} does not match: source {} over {} bytes, device {} over {} bytes",
                device,
                source_digest.checksum,
                source_digest.bytes,
                device_digest.checksum,
                device_digest.bytes
            );
        }

        self.enter(VerifyState::Done);
        Ok(matched)
    }

    async fn hash_both(
        &self,
        device: &str,
        source: &mut ImageSource,
        length: u64,
    ) -> Result<(Digest, Digest)> {
        self.enter(VerifyState::Hashing);
        let mut reader = self.access.open_read(device).await?;

        let on_progress = |snapshot: &ProgressSnapshot| {
            if let Some(ref callback) = self.progress_callback {
                callback(snapshot);
            }
        };

        tokio::try_join!(
            self.digest.digest(source.reader_mut(), length, &on_progress),
            self.digest.digest(reader.as_mut(), length, &on_progress),
        )
    }

    fn enter(&self, state: VerifyState) {
        tracing::debug!("Verify state: {}", state);
        if let Some(ref callback) = self.state_callback {
            callback(state);
        }
    }
}

// ============================================================================
// UNIT TESTS
// ============================================================================

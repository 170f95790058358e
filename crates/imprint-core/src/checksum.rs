//! Checksum calculation
//!
//! This module provides:
//! - The supported algorithms (SHA-256, SHA-512, MD5, CRC32)
//! - [`Checksum`] values with hex formatting
//! - [`HashDigest`], the default [`DigestService`] used by the verify pipeline
//!
//! ## Example
//!
//! ```no_run
//! use imprint_core::checksum::{ChecksumAlgorithm, HashDigest};
//! use imprint_core::hooks::DigestService;
//!
//! # async fn run() -> imprint_core::Result<()> {
//! let mut file = tokio::fs::File::open("image.img").await?;
//! let length = file.metadata().await?.len();
//!
//! let on_progress = |p: &imprint_core::ProgressSnapshot| println!("{:.1}%", p.percentage);
//! let digest = HashDigest::new(ChecksumAlgorithm::Sha256)
//!     .digest(&mut file, length, &on_progress)
//!     .await?;
//! println!("SHA-256: {} over {} bytes", digest.checksum, digest.bytes);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use crate::hooks::DigestService;
use crate::progress::{ProgressSnapshot, ProgressTracker};
use crate::replicator::read_full;
use async_trait::async_trait;
use sha2::Digest as _;
use tokio::io::AsyncRead;

// ============================================================================
// Constants
// ============================================================================

/// Default block size for hashing (1 MB)
pub const DEFAULT_VERIFY_BLOCK_SIZE: usize = 1024 * 1024;

/// Minimum block size (4 KB)
pub const MIN_VERIFY_BLOCK_SIZE: usize = 4 * 1024;

/// Maximum block size (16 MB)
pub const MAX_VERIFY_BLOCK_SIZE: usize = 16 * 1024 * 1024;

// ============================================================================
// Checksum Algorithm
// ============================================================================

/// Supported checksum algorithms
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum ChecksumAlgorithm {
    /// SHA-256 (recommended)
    #[default]
    Sha256,
    /// SHA-512
    Sha512,
    /// MD5 (legacy, not recommended for security)
    Md5,
    /// CRC32 (fast, not cryptographic)
    Crc32,
}

impl ChecksumAlgorithm {
    /// Get algorithm name
    pub fn name(&self) -> &'static str {
        match self {
            ChecksumAlgorithm::Sha256 => "SHA-256",
            ChecksumAlgorithm::Sha512 => "SHA-512",
            ChecksumAlgorithm::Md5 => "MD5",
            ChecksumAlgorithm::Crc32 => "CRC32",
        }
    }

    /// List all supported algorithms
    pub fn all() -> &'static [ChecksumAlgorithm] {
        &[
            ChecksumAlgorithm::Sha256,
            ChecksumAlgorithm::Sha512,
            ChecksumAlgorithm::Md5,
            ChecksumAlgorithm::Crc32,
        ]
    }
}

impl std::fmt::Display for ChecksumAlgorithm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl std::str::FromStr for ChecksumAlgorithm {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim().to_lowercase();
        match s.as_str() {
            "sha256" | "sha-256" => Ok(ChecksumAlgorithm::Sha256),
            "sha512" | "sha-512" => Ok(ChecksumAlgorithm::Sha512),
            "md5" => Ok(ChecksumAlgorithm::Md5),
            "crc32" | "crc-32" => Ok(ChecksumAlgorithm::Crc32),
            _ => Err(Error::InvalidConfig(format!(
                "Unknown checksum algorithm: {}",
                s
            ))),
        }
    }
}

// ============================================================================
// Checksum values
// ============================================================================

/// Checksum calculation result
#[derive(Debug, Clone)]
pub struct Checksum {
    /// The algorithm used
    pub algorithm: ChecksumAlgorithm,
    /// The checksum bytes
    pub bytes: Vec<u8>,
}

impl Checksum {
    /// Create a new checksum from bytes
    pub fn new(algorithm: ChecksumAlgorithm, bytes: Vec<u8>) -> Self {
        Self { algorithm, bytes }
    }

    /// Get the checksum as a lowercase hex string
    pub fn to_hex(&self) -> String {
        bytes_to_hex(&self.bytes)
    }

    /// Check if this checksum matches another
    pub fn matches(&self, other: &Checksum) -> bool {
        self.algorithm == other.algorithm && self.bytes == other.bytes
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.to_hex())
    }
}

impl PartialEq for Checksum {
    fn eq(&self, other: &Self) -> bool {
        self.matches(other)
    }
}

impl Eq for Checksum {}

/// A checksum together with the number of bytes it covers
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Digest {
    /// The checksum
    pub checksum: Checksum,
    /// Bytes actually hashed
    pub bytes: u64,
}

/// Incremental hasher over the supported algorithms
enum Hasher {
    Sha256(sha2::Sha256),
    Sha512(sha2::Sha512),
    Md5(md5::Md5),
    Crc32(crc32fast::Hasher),
}

impl Hasher {
    fn new(algorithm: ChecksumAlgorithm) -> Self {
        match algorithm {
            ChecksumAlgorithm::Sha256 => Hasher::Sha256(sha2::Sha256::new()),
            ChecksumAlgorithm::Sha512 => Hasher::Sha512(sha2::Sha512::new()),
            ChecksumAlgorithm::Md5 => Hasher::Md5(md5::Md5::new()),
            ChecksumAlgorithm::Crc32 => Hasher::Crc32(crc32fast::Hasher::new()),
        }
    }

    fn update(&mut self, data: &[u8]) {
        match self {
            Hasher::Sha256(h) => h.update(data),
            Hasher::Sha512(h) => h.update(data),
            Hasher::Md5(h) => h.update(data),
            Hasher::Crc32(h) => h.update(data),
        }
    }

    fn finalize(self) -> Checksum {
        match self {
            Hasher::Sha256(h) => Checksum::new(ChecksumAlgorithm::Sha256, h.finalize().to_vec()),
            Hasher::Sha512(h) => Checksum::new(ChecksumAlgorithm::Sha512, h.finalize().to_vec()),
            Hasher::Md5(h) => Checksum::new(ChecksumAlgorithm::Md5, h.finalize().to_vec()),
            Hasher::Crc32(h) => {
                Checksum::new(ChecksumAlgorithm::Crc32, h.finalize().to_be_bytes().to_vec())
            }
        }
    }
}

// ============================================================================
// Digest service
// ============================================================================

/// Streaming digest over an async reader
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HashDigest {
    algorithm: ChecksumAlgorithm,
    block_size: usize,
}

impl Default for HashDigest {
    fn default() -> Self {
        Self::new(ChecksumAlgorithm::default())
    }
}

impl HashDigest {
    /// Create a digest service for `algorithm` with the default block size
    pub fn new(algorithm: ChecksumAlgorithm) -> Self {
        Self {
            algorithm,
            block_size: DEFAULT_VERIFY_BLOCK_SIZE,
        }
    }

    /// Set block size (clamped to valid range)
    pub fn block_size(mut self, size: usize) -> Self {
        self.block_size = size.clamp(MIN_VERIFY_BLOCK_SIZE, MAX_VERIFY_BLOCK_SIZE);
        self
    }

    /// The algorithm in use
    pub fn algorithm(&self) -> ChecksumAlgorithm {
        self.algorithm
    }
}

#[async_trait]
impl DigestService for HashDigest {
    async fn digest(
        &self,
        reader: &mut (dyn AsyncRead + Unpin + Send),
        expected_length: u64,
        on_progress: &(dyn for<'p> Fn(&'p ProgressSnapshot) + Send + Sync),
    ) -> Result<Digest> {
        let mut hasher = Hasher::new(self.algorithm);
        let mut buffer = vec![0u8; self.block_size];
        let mut tracker = ProgressTracker::new(expected_length, self.block_size);
        tracker.start();

        let mut processed = 0u64;
        while processed < expected_length {
            let wanted = (expected_length - processed).min(self.block_size as u64) as usize;
            let n = read_full(reader, &mut buffer[..wanted]).await?;
            if n == 0 {
                break;
            }

            hasher.update(&buffer[..n]);
            processed += n as u64;
            on_progress(&tracker.record(n as u64));

            if n < wanted {
                tracing::debug!(
                    "Stream ended after {} of {} bytes",
                    processed,
                    expected_length
                );
                break;
            }
        }

        Ok(Digest {
            checksum: hasher.finalize(),
            bytes: processed,
        })
    }
}

// ============================================================================
// Helper Functions
// ============================================================================

/// Convert bytes to hex string
fn bytes_to_hex(bytes: &[u8]) -> String {
    bytes.iter().map(|b| format!("{:02x}", b)).collect()
}

// ============================================================================
// Unit Tests
// ============================================================================

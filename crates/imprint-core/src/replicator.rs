//! Single-chunk copy between an image stream and a device handle

use crate::device::DeviceWrite;
use crate::error::{Error, Result};
use tokio::io::{AsyncRead, AsyncReadExt};

/// Outcome of one [`copy_chunk`] call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChunkTransfer {
    /// Bytes obtained from the source
    pub bytes_read: usize,
    /// Bytes accepted by the target
    pub bytes_written: usize,
}

impl ChunkTransfer {
    /// Whether both sides moved exactly `expected` bytes
    pub fn is_complete(&self, expected: usize) -> bool {
        self.bytes_read == expected && self.bytes_written == expected
    }
}

/// Copy up to `buffer.len()` bytes from `source` to `target`.
///
/// The source is read until the buffer is full or the stream ends. The bytes
/// are then handed to the target in a single write call at `target_offset`
/// (or the current position when `None`). A short read leaves the target
/// untouched and reports zero bytes written.
///
/// Whether a partial result is acceptable is up to the caller. Errors from
/// the target go through [`Error::device_write`], so an `EINVAL` from the
/// device becomes [`Error::InvalidImage`]; errors from the source are
/// returned as [`Error::Io`].
pub async fn copy_chunk<R, W>(
    source: &mut R,
    target: &mut W,
    target_offset: Option<u64>,
    buffer: &mut [u8],
) -> Result<ChunkTransfer>
where
    R: AsyncRead + Unpin + ?Sized,
    W: DeviceWrite + ?Sized,
{
    if buffer.is_empty() {
        return Err(Error::InvalidConfig(
            "chunk length must be greater than zero".to_string(),
        ));
    }

    let bytes_read = read_full(source, buffer).await?;
    if bytes_read < buffer.len() {
        return Ok(ChunkTransfer {
            bytes_read,
            bytes_written: 0,
        });
    }

    let bytes_written = loop {
        match target.write_chunk(&buffer[..bytes_read], target_offset).await {
            Ok(n) => break n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(Error::device_write(e)),
        }
    };

    Ok(ChunkTransfer {
        bytes_read,
        bytes_written,
    })
}

/// Read exactly the buffer size or until EOF
pub(crate) async fn read_full<R>(reader: &mut R, buffer: &mut [u8]) -> std::io::Result<usize>
where
    R: AsyncRead + Unpin + ?Sized,
{
    let mut total_read = 0;

    while total_read < buffer.len() {
        match reader.read(&mut buffer[total_read..]).await {
            Ok(0) => break,
            Ok(n) => total_read += n,
            Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }

    Ok(total_read)
}

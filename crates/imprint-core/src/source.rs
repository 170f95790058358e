//! Image sources
//!
//! An [`ImageSource`] pairs a readable byte stream with its declared length.
//! The write pipeline refuses sources without a length, since it sizes every
//! chunk (and the final one in particular) from it.
//!
//! ## Example
//!
//! ```no_run
//! use imprint_core::ImageSource;
//!
//! # async fn run() -> imprint_core::Result<()> {
//! // Open a local file; the length comes from its metadata
//! let source = ImageSource::open("image.img").await?;
//! println!("Size: {:?}", source.length());
//!
//! // Any async reader with a known length
//! let data = vec![0u8; 4096];
//! let source = ImageSource::new(std::io::Cursor::new(data), 4096);
//! # Ok(())
//! # }
//! ```

use crate::error::{Error, Result};
use std::path::Path;
use tokio::io::{AsyncRead, BufReader};

/// Buffer used when reading image files
const FILE_BUFFER_SIZE: usize = 64 * 1024;

/// A byte stream to write or verify, with its length if known
pub struct ImageSource {
    reader: Box<dyn AsyncRead + Unpin + Send>,
    length: Option<u64>,
    description: String,
}

impl ImageSource {
    /// Wrap a reader whose length is known
    pub fn new<R>(reader: R, length: u64) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            length: Some(length),
            description: "stream".to_string(),
        }
    }

    /// Wrap a reader of unknown length.
    ///
    /// Such a source can be hashed but not written.
    pub fn without_length<R>(reader: R) -> Self
    where
        R: AsyncRead + Unpin + Send + 'static,
    {
        Self {
            reader: Box::new(reader),
            length: None,
            description: "stream".to_string(),
        }
    }

    /// Open a local image file
    pub async fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = tokio::fs::File::open(path).await.map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::SourceNotFound(path.display().to_string())
            } else {
                Error::Io(e)
            }
        })?;

        let metadata = file.metadata().await?;
        if metadata.is_dir() {
            return Err(Error::InvalidConfig(format!(
                "{} is a directory",
                path.display()
            )));
        }

        Ok(Self {
            reader: Box::new(BufReader::with_capacity(FILE_BUFFER_SIZE, file)),
            length: Some(metadata.len()),
            description: path.display().to_string(),
        })
    }

    /// Declared length in bytes
    pub fn length(&self) -> Option<u64> {
        self.length
    }

    /// Where the bytes come from, for logging
    pub fn description(&self) -> &str {
        &self.description
    }

    pub(crate) fn reader_mut(&mut self) -> &mut (dyn AsyncRead + Unpin + Send) {
        self.reader.as_mut()
    }
}

impl std::fmt::Debug for ImageSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ImageSource")
            .field("description", &self.description)
            .field("length", &self.length)
            .finish_non_exhaustive()
    }
}

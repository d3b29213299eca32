//! Index file functions
//!
//! The index file is a flat sequence of fixed-size page images addressed by
//! byte offset. New pages are appended at end-of-file; pages abandoned by a
//! merge are never reclaimed, so offsets stay valid for the life of the
//! file.
//!
//! Every public tree operation opens its own handle on entry and drops it on
//! return, so no state survives between operations. All transfers are
//! exact-length: a short read is an error, never a partial result.

use std::io::SeekFrom;
use std::path::Path;

use anyhow::Result;
use tokio::fs::{File, OpenOptions};
use tokio::io::{AsyncReadExt, AsyncSeekExt, AsyncWriteExt};

/// Storage block size of the host, used to size page capacities.
pub(crate) fn storage_block_size() -> usize {
    unsafe { libc::sysconf(libc::_SC_PAGESIZE) as usize }
}

/// A scoped handle on the index file.
#[derive(Debug)]
pub(crate) struct IndexFile {
    file: File,
}

impl IndexFile {
    /// Open the index file for reading only.
    pub(crate) async fn open_read(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).open(path).await?;
        Ok(Self { file })
    }

    /// Open the index file for reading and writing.
    pub(crate) async fn open_write(path: &Path) -> Result<Self> {
        let file = OpenOptions::new().read(true).write(true).open(path).await?;
        Ok(Self { file })
    }

    /// Read exactly `len` bytes starting at `seek`.
    pub(crate) async fn read_page(&mut self, seek: i64, len: usize) -> Result<Vec<u8>> {
        let mut buf = vec![0; len];
        self.file.seek(SeekFrom::Start(seek as u64)).await?;
        self.file.read_exact(&mut buf).await?;
        Ok(buf)
    }

    /// Write a full page image starting at `seek`.
    pub(crate) async fn write_page(&mut self, seek: i64, bytes: &[u8]) -> Result<()> {
        self.file.seek(SeekFrom::Start(seek as u64)).await?;
        self.file.write_all(bytes).await?;
        Ok(())
    }

    /// Append a full page image at end-of-file, returning its seek position.
    pub(crate) async fn append_page(&mut self, bytes: &[u8]) -> Result<i64> {
        let seek = self.file.seek(SeekFrom::End(0)).await?;
        self.file.write_all(bytes).await?;
        Ok(seek as i64)
    }
}

//! # Disk Manager
//!
//! The only component in the kernel that performs file I/O. The disk manager
//! turns a flat file into an array of `PAGE_SIZE` pages addressed by
//! [`PageId`]; it knows nothing about extents, bitmaps, or records.
//!
//! ## File Layout
//!
//! ```text
//! ┌─────────┬─────────┬─────────┬─────────┐
//! │ Page 0  │ Page 1  │ Page 2  │  ...    │
//! │ (4KB)   │ (4KB)   │ (4KB)   │         │
//! └─────────┴─────────┴─────────┴─────────┘
//! Offset:  0      4096     8192
//! ```
//!
//! ## Sparse Writes
//!
//! Writing past the current end of file is allowed and extends the file,
//! leaving a hole; holes read back as zeros. Reading a page at or past the
//! end of file is an error: a page that was never written must fail loudly
//! rather than hand back garbage.
//!
//! ## Durability
//!
//! Every `write_page` flushes to the OS (`sync_data`) before returning.
//! Group-commit / fsync batching is a higher-layer concern that does not
//! exist in this kernel.
//!
//! ## Thread Safety
//!
//! The file handle lives behind a `parking_lot::Mutex`, so `read_page` and
//! `write_page` take `&self` and the manager is `Sync`. Each call seeks and
//! transfers under the lock; a failed call leaves the handle usable for the
//! next one.

use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use eyre::{ensure, Result, WrapErr};
use parking_lot::Mutex;

use crate::config::{PageId, PAGE_SIZE};

#[derive(Debug)]
pub struct DiskManager {
    path: PathBuf,
    file: Mutex<File>,
}

impl DiskManager {
    /// Opens the database file read/write, creating it empty if absent.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref().to_path_buf();

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)
            .wrap_err_with(|| format!("failed to open database file '{}'", path.display()))?;

        Ok(Self {
            path,
            file: Mutex::new(file),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Number of whole pages currently in the file.
    pub fn page_count(&self) -> Result<u32> {
        Ok((self.file_size()? / PAGE_SIZE as u64) as u32)
    }

    pub fn file_size(&self) -> Result<u64> {
        let file = self.file.lock();
        let metadata = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?;
        Ok(metadata.len())
    }

    /// Reads exactly one page into `buffer`.
    ///
    /// Fails for a negative id, for an offset at or past the end of file
    /// (the page was never written), and for a short read. Holes inside the
    /// file read as zeros.
    pub fn read_page(&self, page_id: PageId, buffer: &mut [u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id >= 0, "invalid page id {}", page_id);

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();

        let file_len = file
            .metadata()
            .wrap_err_with(|| format!("failed to stat '{}'", self.path.display()))?
            .len();
        ensure!(
            offset < file_len,
            "seek failed: page {} is past the end of '{}' ({} >= {} bytes)",
            page_id,
            self.path.display(),
            offset,
            file_len
        );

        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;
        file.read_exact(buffer)
            .wrap_err_with(|| format!("short read on page {}", page_id))
    }

    /// Writes exactly one page and flushes it to the OS.
    ///
    /// Writing past the current end of file extends the file sparsely.
    pub fn write_page(&self, page_id: PageId, data: &[u8; PAGE_SIZE]) -> Result<()> {
        ensure!(page_id >= 0, "invalid page id {}", page_id);

        let offset = page_id as u64 * PAGE_SIZE as u64;
        let mut file = self.file.lock();

        file.seek(SeekFrom::Start(offset))
            .wrap_err_with(|| format!("failed to seek to page {}", page_id))?;
        file.write_all(data)
            .wrap_err_with(|| format!("short write on page {}", page_id))?;
        file.sync_data()
            .wrap_err_with(|| format!("failed to flush page {} to disk", page_id))
    }
}

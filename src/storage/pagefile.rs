use anyhow::{bail, Result};
use log::debug;
use std::fs::{self, File, OpenOptions};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

use crate::storage::{MemPage, PageNumber, PAGE_SIZE};

/// Represents errors that a page file can have.
#[derive(thiserror::Error, Debug, PartialEq)]
pub enum Error {
    /// The named file does not exist on disk.
    #[error("page file {0} not found")]
    FileNotFound(String),

    /// Represents an invalid page number on a page file.
    #[error("page {0} does not exist on file")]
    ReadNonExistingPage(PageNumber),

    /// A page could not be fully written to disk.
    #[error("failed to write page {0}")]
    WriteFailed(PageNumber),

    /// The file could not be synced and closed.
    #[error("failed to close page file")]
    FileCloseFailed,
}

/// PageFile handles all read/write operations on a single heap file.
///
/// The file is a contiguous array of [PAGE_SIZE] byte pages, page 0 first,
/// with no header. The total page count is inferred from the file size
/// rounded up, so a reader re-measuring the file on open tolerates trailing
/// partial pages left by an interrupted extension.
///
/// If you want to modify the file, you need to modify the page returned by
/// a read and instruct the page file to write it back to disk.
#[derive(Debug)]
pub struct PageFile {
    path: PathBuf,
    file: File,
    total_pages: u32,
    cur_page_pos: u32,
}

impl PageFile {
    /// Materialize a new page file of length exactly one zeroed page.
    ///
    /// An existing file of the same name is truncated.
    pub fn create(path: impl AsRef<Path>) -> Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(path.as_ref())?;

        let zeroed = [0u8; PAGE_SIZE];
        if file.write(&zeroed)? != PAGE_SIZE {
            bail!(Error::WriteFailed(0));
        }
        file.flush()?;

        debug!("created page file {:?}", path.as_ref());
        Ok(())
    }

    /// Open an existing page file for paged read/write access.
    ///
    /// The total page count is computed from the file length rounded up to
    /// whole pages, and is never less than one. The cursor starts at page 0.
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = match OpenOptions::new().read(true).write(true).open(path) {
            Ok(file) => file,
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                bail!(Error::FileNotFound(path.display().to_string()))
            }
            Err(err) => return Err(err.into()),
        };

        let len = file.metadata()?.len();
        let total_pages = ((len + PAGE_SIZE as u64 - 1) / PAGE_SIZE as u64).max(1) as u32;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            total_pages,
            cur_page_pos: 0,
        })
    }

    /// Sync all buffered writes and close the file.
    pub fn close(self) -> Result<()> {
        if self.file.sync_all().is_err() {
            bail!(Error::FileCloseFailed);
        }
        Ok(())
    }

    /// Remove a page file from disk.
    pub fn destroy(path: impl AsRef<Path>) -> Result<()> {
        let path = path.as_ref();
        match fs::remove_file(path) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {
                bail!(Error::FileNotFound(path.display().to_string()))
            }
            Err(err) => Err(err.into()),
        }
    }

    /// Number of pages currently accounted on the file.
    pub fn total_pages(&self) -> u32 {
        self.total_pages
    }

    /// Current cursor position, the page last read or written.
    pub fn block_position(&self) -> u32 {
        self.cur_page_pos
    }

    /// Read a page from the file into the given in-memory page.
    ///
    /// Any changes done to the page will not be effective until
    /// [write_page](PageFile::write_page) is called with it. On success the
    /// cursor moves to the page read.
    pub fn read_page(&mut self, page_num: PageNumber, page: &mut MemPage) -> Result<()> {
        if page_num >= self.total_pages {
            bail!(Error::ReadNonExistingPage(page_num));
        }

        self.file.seek(SeekFrom::Start(Self::offset(page_num)))?;
        if let Err(err) = self.file.read_exact(page) {
            if err.kind() == io::ErrorKind::UnexpectedEof {
                bail!(Error::ReadNonExistingPage(page_num));
            }
            return Err(err.into());
        }

        debug!("read page {} from {:?}", page_num, self.path);
        self.cur_page_pos = page_num;
        Ok(())
    }

    /// Write the given in-memory copy of a page back to disk.
    ///
    /// The page must already exist on the file; use
    /// [append_empty](PageFile::append_empty) or
    /// [ensure_capacity](PageFile::ensure_capacity) to grow it first. On
    /// success the cursor moves to the page written.
    pub fn write_page(&mut self, page_num: PageNumber, page: &MemPage) -> Result<()> {
        if page_num >= self.total_pages {
            bail!(Error::ReadNonExistingPage(page_num));
        }

        self.file.seek(SeekFrom::Start(Self::offset(page_num)))?;
        if self.file.write(page)? != PAGE_SIZE {
            bail!(Error::WriteFailed(page_num));
        }
        self.file.flush()?;

        debug!("wrote page {} to {:?}", page_num, self.path);
        self.cur_page_pos = page_num;
        Ok(())
    }

    /// Append one zeroed page at the end of the file and move the cursor to it.
    pub fn append_empty(&mut self) -> Result<()> {
        self.file.seek(SeekFrom::End(0))?;

        let zeroed = [0u8; PAGE_SIZE];
        if self.file.write(&zeroed)? != PAGE_SIZE {
            bail!(Error::WriteFailed(self.total_pages));
        }
        self.file.flush()?;

        self.total_pages += 1;
        self.cur_page_pos = self.total_pages - 1;
        Ok(())
    }

    /// Append zeroed pages until the file holds at least `num_pages` pages.
    ///
    /// A no-op when the file is already large enough. If a write fails
    /// partway the accounted page count keeps its pre-call value; the disk
    /// may hold trailing garbage pages, which a later [open](PageFile::open)
    /// tolerates by re-measuring the file size.
    pub fn ensure_capacity(&mut self, num_pages: u32) -> Result<()> {
        if num_pages == 0 || self.total_pages >= num_pages {
            return Ok(());
        }

        self.file.seek(SeekFrom::End(0))?;

        let zeroed = [0u8; PAGE_SIZE];
        for page_num in self.total_pages..num_pages {
            if self.file.write(&zeroed)? != PAGE_SIZE {
                bail!(Error::WriteFailed(page_num));
            }
        }
        self.file.flush()?;

        debug!(
            "extended {:?} from {} to {} pages",
            self.path, self.total_pages, num_pages
        );
        self.total_pages = num_pages;
        self.cur_page_pos = num_pages - 1;
        Ok(())
    }

    /// Read the first page of the file.
    pub fn read_first_page(&mut self, page: &mut MemPage) -> Result<()> {
        self.read_page(0, page)
    }

    /// Read the page before the cursor.
    pub fn read_previous_page(&mut self, page: &mut MemPage) -> Result<()> {
        if self.cur_page_pos == 0 {
            bail!(Error::ReadNonExistingPage(0));
        }
        self.read_page(self.cur_page_pos - 1, page)
    }

    /// Read the page at the cursor.
    pub fn read_current_page(&mut self, page: &mut MemPage) -> Result<()> {
        self.read_page(self.cur_page_pos, page)
    }

    /// Read the page after the cursor.
    pub fn read_next_page(&mut self, page: &mut MemPage) -> Result<()> {
        self.read_page(self.cur_page_pos + 1, page)
    }

    /// Read the last page of the file.
    pub fn read_last_page(&mut self, page: &mut MemPage) -> Result<()> {
        self.read_page(self.total_pages - 1, page)
    }

    /// Write the page at the cursor.
    pub fn write_current_page(&mut self, page: &MemPage) -> Result<()> {
        self.write_page(self.cur_page_pos, page)
    }

    /// Returns the offset on the file where a page starts.
    fn offset(page_num: PageNumber) -> u64 {
        page_num as u64 * PAGE_SIZE as u64
    }
}

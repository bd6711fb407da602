//! The pager: owns the database file handle and a fixed-capacity array of
//! resident 4096-byte pages, loading them from disk on first access and
//! writing them back on close.
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::Path;

use tracing::{debug, trace};

use crate::errors::Error;

pub const PAGE_SIZE: usize = 4096;
pub const TABLE_MAX_PAGES: usize = 100;

type Page = Box<[u8; PAGE_SIZE]>;

/// Lazily-loaded page cache over a single database file.
///
/// There is no dirty bit: every resident slot is flushed on `close`, since
/// every mutation happens in place against a page the pager already handed
/// out, and the process is single-threaded and short-lived.
pub struct Pager {
    file: File,
    file_length: u64,
    pub num_pages: u32,
    pages: heapless::Vec<Option<Page>, TABLE_MAX_PAGES>,
}

impl Pager {
    /// Opens (creating if missing) the database file at `path`.
    ///
    /// Fails if the file's length is not an integral number of pages — such
    /// a file is considered corrupt.
    pub fn open(path: &Path) -> Result<Self, Error> {
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(path)?;
        let file_length = file.metadata()?.len();

        if file_length % PAGE_SIZE as u64 != 0 {
            return Err(Error::Storage(format!(
                "Db file is not a whole number of pages. Corrupt file. (length={file_length})"
            )));
        }
        let num_pages = (file_length / PAGE_SIZE as u64) as u32;

        let mut pages = heapless::Vec::new();
        for _ in 0..TABLE_MAX_PAGES {
            // heapless::Vec has no `resize`; fill every slot up front so
            // `get` can index directly.
            let _ = pages.push(None);
        }

        debug!(num_pages, "Opened pager");
        Ok(Pager {
            file,
            file_length,
            num_pages,
            pages,
        })
    }

    /// Returns a mutable view of the given page, loading it from disk (or
    /// allocating a fresh zeroed page) if it is not yet resident.
    pub fn get(&mut self, page_num: u32) -> Result<&mut [u8; PAGE_SIZE], Error> {
        if page_num as usize >= TABLE_MAX_PAGES {
            return Err(Error::Storage(format!(
                "Tried to fetch page number out of bounds: {page_num} >= {TABLE_MAX_PAGES}"
            )));
        }

        if self.pages[page_num as usize].is_none() {
            let mut buf: Page = Box::new([0u8; PAGE_SIZE]);
            if page_num < self.num_pages {
                trace!(page_num, "Loading page from disk");
                self.file
                    .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
                self.file.read_exact(buf.as_mut())?;
            } else if page_num == self.num_pages {
                self.num_pages += 1;
            }
            self.pages[page_num as usize] = Some(buf);
        }

        Ok(self.pages[page_num as usize].as_mut().unwrap())
    }

    /// Writes the given page's 4096 bytes back to its offset in the file.
    pub fn flush(&mut self, page_num: u32) -> Result<(), Error> {
        let page = self.pages[page_num as usize]
            .as_ref()
            .ok_or_else(|| Error::Storage(format!("Tried to flush empty page {page_num}")))?;

        self.file
            .seek(SeekFrom::Start(page_num as u64 * PAGE_SIZE as u64))?;
        self.file.write_all(page.as_ref())?;
        Ok(())
    }

    /// Flushes every resident page in ascending page-number order, then the
    /// file handle is dropped, closing it.
    pub fn close(mut self) -> Result<(), Error> {
        for page_num in 0..self.num_pages {
            if self.pages[page_num as usize].is_some() {
                self.flush(page_num)?;
            }
        }
        self.file.flush()?;
        Ok(())
    }

    pub fn file_length(&self) -> u64 {
        self.file_length
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    #[test]
    fn opens_empty_file_with_zero_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let pager = Pager::open(tmp.path()).unwrap();
        assert_eq!(pager.num_pages, 0);
    }

    #[test]
    fn get_allocates_and_persists_pages() {
        let tmp = NamedTempFile::new().unwrap();
        let path = tmp.path().to_path_buf();

        {
            let mut pager = Pager::open(&path).unwrap();
            let page = pager.get(0).unwrap();
            page[0] = 42;
            pager.close().unwrap();
        }

        let mut pager = Pager::open(&path).unwrap();
        assert_eq!(pager.num_pages, 1);
        let page = pager.get(0).unwrap();
        assert_eq!(page[0], 42);
    }

    #[test]
    fn rejects_page_beyond_capacity() {
        let tmp = NamedTempFile::new().unwrap();
        let mut pager = Pager::open(tmp.path()).unwrap();
        assert!(pager.get(TABLE_MAX_PAGES as u32).is_err());
    }

    #[test]
    fn rejects_corrupt_file_length() {
        let tmp = NamedTempFile::new().unwrap();
        std::fs::write(tmp.path(), vec![0u8; PAGE_SIZE + 1]).unwrap();
        assert!(Pager::open(tmp.path()).is_err());
    }
}

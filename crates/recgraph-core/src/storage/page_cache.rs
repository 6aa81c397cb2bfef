//! Page cache - bounded page buffer over a single store file
//!
//! Each store file is accessed through its own [`PagedFile`]. Pages are
//! loaded on demand with positioned reads and kept in a bounded map; when
//! the map is full a Clock (second-chance) sweep picks a victim and, if the
//! victim is dirty, writes it back synchronously before dropping it.
//!
//! The logical file length is tracked separately from page boundaries so
//! that a flushed file is always exactly `high record offset + record size`
//! bytes long. Regions that were never written (including holes left by
//! records placed at very high ids) read back as zeroes.

use crate::{Error, Result};
use std::collections::{HashMap, HashSet};
use std::fs::{File, OpenOptions};
use std::io::{Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

/// A cached page
#[derive(Debug)]
struct Page {
    data: Vec<u8>,
    dirty: bool,
    /// Reference bit for the Clock sweep
    referenced: bool,
}

/// Page cache statistics
#[derive(Debug, Clone, Default)]
pub struct PageCacheStats {
    /// Total page accesses
    pub total_accesses: u64,
    /// Cache hits
    pub hits: u64,
    /// Cache misses
    pub misses: u64,
    /// Pages evicted
    pub evictions: u64,
    /// Pages written back to disk
    pub flushes: u64,
    /// Current number of dirty pages
    pub dirty_count: usize,
    /// Current number of cached pages
    pub cache_size: usize,
}

impl PageCacheStats {
    /// Calculate hit rate
    pub fn hit_rate(&self) -> f64 {
        if self.total_accesses == 0 {
            0.0
        } else {
            self.hits as f64 / self.total_accesses as f64
        }
    }
}

/// A store file fronted by a bounded page cache
pub struct PagedFile {
    file: File,
    path: PathBuf,
    page_size: usize,
    capacity: usize,
    /// Logical length in bytes
    len: u64,
    /// Length of the file as last seen on disk
    disk_len: u64,
    pages: HashMap<u64, Page>,
    /// Clock slots (page numbers); `None` marks a free slot
    page_list: Vec<Option<u64>>,
    clock_hand: usize,
    dirty_pages: HashSet<u64>,
    stats: PageCacheStats,
}

impl PagedFile {
    /// Open (or create) a store file
    pub fn open<P: AsRef<Path>>(path: P, page_size: usize, capacity: usize) -> Result<Self> {
        if capacity == 0 {
            return Err(Error::config("page cache capacity must be > 0"));
        }
        if page_size == 0 {
            return Err(Error::config("page size must be > 0"));
        }
        let path = path.as_ref().to_path_buf();
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(&path)?;
        let len = file.metadata()?.len();

        Ok(Self {
            file,
            path,
            page_size,
            capacity,
            len,
            disk_len: len,
            pages: HashMap::with_capacity(capacity),
            page_list: vec![None; capacity],
            clock_hand: 0,
            dirty_pages: HashSet::new(),
            stats: PageCacheStats::default(),
        })
    }

    /// Path of the underlying file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Logical length in bytes
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether nothing was ever written
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Read `buf.len()` bytes at `offset`; bytes past the logical end are zero
    pub fn read(&mut self, offset: u64, buf: &mut [u8]) -> Result<()> {
        let mut done = 0usize;
        while done < buf.len() {
            let pos = offset + done as u64;
            let page_no = pos / self.page_size as u64;
            let in_page = (pos % self.page_size as u64) as usize;
            let chunk = (self.page_size - in_page).min(buf.len() - done);

            if pos >= self.len {
                buf[done..].fill(0);
                return Ok(());
            }

            let page = self.fetch(page_no)?;
            buf[done..done + chunk].copy_from_slice(&page.data[in_page..in_page + chunk]);
            done += chunk;
        }
        Ok(())
    }

    /// Write `data` at `offset`, growing the logical length when needed
    pub fn write(&mut self, offset: u64, data: &[u8]) -> Result<()> {
        let mut done = 0usize;
        while done < data.len() {
            let pos = offset + done as u64;
            let page_no = pos / self.page_size as u64;
            let in_page = (pos % self.page_size as u64) as usize;
            let chunk = (self.page_size - in_page).min(data.len() - done);

            let page = self.fetch(page_no)?;
            page.data[in_page..in_page + chunk].copy_from_slice(&data[done..done + chunk]);
            page.dirty = true;
            self.dirty_pages.insert(page_no);
            done += chunk;
        }
        self.len = self.len.max(offset + data.len() as u64);
        self.stats.dirty_count = self.dirty_pages.len();
        Ok(())
    }

    /// Grow the logical length without writing data (the gap reads as zero)
    pub fn extend_to(&mut self, len: u64) {
        self.len = self.len.max(len);
    }

    /// Write every dirty page back and sync the file
    pub fn flush(&mut self) -> Result<()> {
        let mut dirty: Vec<u64> = self.dirty_pages.iter().copied().collect();
        // Ascending page order keeps the writes sequential
        dirty.sort_unstable();
        for page_no in dirty {
            self.write_back(page_no)?;
        }
        self.dirty_pages.clear();
        self.stats.dirty_count = 0;

        if self.len > self.disk_len {
            self.file.set_len(self.len)?;
            self.disk_len = self.len;
        }
        self.file.sync_data()?;
        Ok(())
    }

    /// Get statistics
    pub fn stats(&self) -> PageCacheStats {
        let mut stats = self.stats.clone();
        stats.cache_size = self.pages.len();
        stats
    }

    fn fetch(&mut self, page_no: u64) -> Result<&mut Page> {
        self.stats.total_accesses += 1;
        if self.pages.contains_key(&page_no) {
            self.stats.hits += 1;
        } else {
            self.stats.misses += 1;
            if self.pages.len() >= self.capacity {
                self.evict_page()?;
            }
            let page = self.load(page_no)?;
            self.insert_page(page_no, page);
        }
        let page = self
            .pages
            .get_mut(&page_no)
            .ok_or_else(|| Error::storage(format!("page {} vanished from cache", page_no)))?;
        page.referenced = true;
        Ok(page)
    }

    fn load(&mut self, page_no: u64) -> Result<Page> {
        let mut data = vec![0u8; self.page_size];
        let start = page_no * self.page_size as u64;
        if start < self.disk_len {
            let available = ((self.disk_len - start) as usize).min(self.page_size);
            self.file.seek(SeekFrom::Start(start))?;
            let mut filled = 0;
            while filled < available {
                let n = self.file.read(&mut data[filled..available])?;
                if n == 0 {
                    break;
                }
                filled += n;
            }
        }
        Ok(Page {
            data,
            dirty: false,
            referenced: true,
        })
    }

    fn insert_page(&mut self, page_no: u64, page: Page) {
        self.pages.insert(page_no, page);
        if let Some(slot) = self.page_list.iter().position(|p| p.is_none()) {
            self.page_list[slot] = Some(page_no);
        }
        self.stats.cache_size = self.pages.len();
    }

    /// Evict one page using the Clock algorithm, writing it back if dirty
    fn evict_page(&mut self) -> Result<()> {
        let max_iterations = self.capacity * 2 + 1;
        for _ in 0..max_iterations {
            let hand = self.clock_hand;
            self.clock_hand = (self.clock_hand + 1) % self.capacity;

            let Some(page_no) = self.page_list[hand] else {
                continue;
            };
            let Some(page) = self.pages.get_mut(&page_no) else {
                self.page_list[hand] = None;
                continue;
            };
            if page.referenced {
                // Second chance
                page.referenced = false;
                continue;
            }

            if page.dirty {
                self.write_back(page_no)?;
                self.dirty_pages.remove(&page_no);
                self.stats.dirty_count = self.dirty_pages.len();
            }
            self.pages.remove(&page_no);
            self.page_list[hand] = None;
            self.stats.evictions += 1;
            self.stats.cache_size = self.pages.len();
            return Ok(());
        }
        Err(Error::storage(format!(
            "page cache for {} could not find an eviction victim",
            self.path.display()
        )))
    }

    fn write_back(&mut self, page_no: u64) -> Result<()> {
        let start = page_no * self.page_size as u64;
        let Some(page) = self.pages.get_mut(&page_no) else {
            return Ok(());
        };
        if !page.dirty {
            return Ok(());
        }
        // Never write past the logical end so the file length stays exact
        let end = self.len.min(start + self.page_size as u64);
        if end > start {
            let bytes = (end - start) as usize;
            self.file.seek(SeekFrom::Start(start))?;
            self.file.write_all(&page.data[..bytes])?;
            self.disk_len = self.disk_len.max(end);
        }
        page.dirty = false;
        self.stats.flushes += 1;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn open(dir: &TempDir, capacity: usize) -> PagedFile {
        PagedFile::open(dir.path().join("test.store"), 512, capacity).unwrap()
    }

    #[test]
    fn test_unwritten_reads_as_zero() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir, 4);
        let mut buf = [0xFFu8; 16];
        file.read(10_000, &mut buf).unwrap();
        assert_eq!(buf, [0u8; 16]);
        assert!(file.is_empty());
    }

    #[test]
    fn test_write_spanning_pages() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir, 4);
        let data: Vec<u8> = (0..100u8).collect();
        file.write(500, &data).unwrap();
        let mut buf = vec![0u8; 100];
        file.read(500, &mut buf).unwrap();
        assert_eq!(buf, data);
        assert_eq!(file.len(), 600);
    }

    #[test]
    fn test_eviction_writes_back_dirty_pages() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir, 2);
        for page in 0..8u64 {
            file.write(page * 512 + 3, &[page as u8 + 1]).unwrap();
        }
        assert!(file.stats().evictions >= 6);
        for page in 0..8u64 {
            let mut buf = [0u8; 1];
            file.read(page * 512 + 3, &mut buf).unwrap();
            assert_eq!(buf[0], page as u8 + 1);
        }
    }

    #[test]
    fn test_flush_keeps_exact_length() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.store");
        {
            let mut file = PagedFile::open(&path, 512, 4).unwrap();
            file.write(0, &[1, 2, 3]).unwrap();
            file.write(1000, &[9; 7]).unwrap();
            file.flush().unwrap();
        }
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 1007);

        let mut file = PagedFile::open(&path, 512, 4).unwrap();
        let mut buf = [0u8; 7];
        file.read(1000, &mut buf).unwrap();
        assert_eq!(buf, [9; 7]);
    }

    #[test]
    fn test_extend_to_grows_file_on_flush() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("test.store");
        let mut file = PagedFile::open(&path, 512, 4).unwrap();
        file.extend_to(4096);
        file.flush().unwrap();
        assert_eq!(std::fs::metadata(&path).unwrap().len(), 4096);
    }

    #[test]
    fn test_hit_rate() {
        let dir = TempDir::new().unwrap();
        let mut file = open(&dir, 4);
        let mut buf = [0u8; 1];
        file.write(0, &[1]).unwrap();
        file.read(0, &mut buf).unwrap();
        file.read(0, &mut buf).unwrap();
        let stats = file.stats();
        assert_eq!(stats.total_accesses, 3);
        assert_eq!(stats.misses, 1);
        assert!(stats.hit_rate() > 0.6);
    }
}

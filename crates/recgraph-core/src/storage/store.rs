//! Fixed-size record store
//!
//! A [`RecordStore`] is one file of equally sized record slots plus its
//! [`IdSpace`]. Record `id` lives at byte offset `id × record_size`; the
//! format decides how the slot's bytes map to a record.

use super::id_space::{Claim, IdSnapshot, IdSpace};
use super::page_cache::{PageCacheStats, PagedFile};
use super::record::{Record, RecordFormat, IN_USE_FLAG};
use crate::{Error, Result};
use parking_lot::Mutex;
use serde::Serialize;
use std::path::{Path, PathBuf};

/// One store file and its id space
pub struct RecordStore<F: RecordFormat> {
    format: F,
    path: PathBuf,
    id_path: PathBuf,
    file: Mutex<PagedFile>,
    ids: Mutex<IdSpace>,
}

impl<F: RecordFormat> RecordStore<F> {
    /// Open or create the store at `path`
    ///
    /// The id space comes from `<path>.id`. A clean file is used as is; an
    /// unclean one is reconciled with the slots written since it was stored.
    /// Without a readable id file every slot is scanned.
    pub fn open<P: AsRef<Path>>(
        path: P,
        format: F,
        page_size: usize,
        cache_pages: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let id_path = id_file_path(&path);
        let mut file = PagedFile::open(&path, page_size, cache_pages)?;
        let record_size = format.record_size() as u64;
        let store_high = file.len().div_ceil(record_size);
        let mut flag = [0u8; 1];
        let mut in_use = |id: u64| -> Result<bool> {
            file.read(id * record_size, &mut flag)?;
            Ok(flag[0] & IN_USE_FLAG != 0)
        };

        let ids = match IdSpace::load(&id_path, format.max_id())? {
            Some(IdSnapshot { ids, clean: true }) => {
                tracing::debug!(
                    store = format.name(),
                    high_id = ids.high_id(),
                    free = ids.free_count(),
                    "loaded id file"
                );
                ids
            }
            Some(IdSnapshot { ids, clean: false }) => {
                let snapshot_high = ids.high_id();
                let ids = ids.recover(store_high, &mut in_use)?;
                tracing::info!(
                    store = format.name(),
                    snapshot_high,
                    high_id = ids.high_id(),
                    free = ids.free_count(),
                    "recovered id space from unclean id file"
                );
                ids
            }
            None => {
                let ids = IdSpace::rebuild(format.max_id(), store_high, &mut in_use)?;
                tracing::info!(
                    store = format.name(),
                    high_id = store_high,
                    free = ids.free_count(),
                    "rebuilt id space from store scan"
                );
                ids
            }
        };
        // Until the next clean close, the on-disk id file is stale
        ids.store(&id_path, false)?;

        Ok(Self {
            format,
            path,
            id_path,
            file: Mutex::new(file),
            ids: Mutex::new(ids),
        })
    }

    /// The record layout
    pub fn format(&self) -> &F {
        &self.format
    }

    /// Path of the store file
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read an in-use record
    ///
    /// Fails with `NotFound` when `id` is at or beyond the high-water mark
    /// or the slot is not in use.
    pub fn get(&self, id: u64) -> Result<F::Record> {
        let record = self.load(id)?;
        if !record.in_use() {
            return Err(Error::not_found(format!(
                "{} record {} is not in use",
                self.format.name(),
                id
            )));
        }
        Ok(record)
    }

    /// Read a record slot whether or not it is in use
    pub fn load(&self, id: u64) -> Result<F::Record> {
        let high_id = self.high_id();
        if id >= high_id {
            return Err(Error::not_found(format!(
                "{} record {} is beyond high id {}",
                self.format.name(),
                id,
                high_id
            )));
        }
        let mut bytes = vec![0u8; self.format.record_size()];
        self.file.lock().read(self.offset(id), &mut bytes)?;
        self.format.decode(id, &bytes)
    }

    /// Whether `id` holds an in-use record; ids past the high-water mark do not
    pub fn is_in_use(&self, id: u64) -> Result<bool> {
        if id >= self.high_id() {
            return Ok(false);
        }
        let mut flag = [0u8; 1];
        self.file.lock().read(self.offset(id), &mut flag)?;
        Ok(flag[0] & IN_USE_FLAG != 0)
    }

    /// Allocate an id and return it with a fresh in-use record
    ///
    /// Nothing is written until the record is passed to [`update`](Self::update).
    pub fn create(&self) -> Result<(u64, F::Record)> {
        let id = self.next_id()?;
        Ok((id, self.format.new_record(id)))
    }

    /// Write a record to its slot
    pub fn update(&self, record: &F::Record) -> Result<()> {
        let id = record.id();
        if id > self.format.max_id() {
            return Err(Error::capacity(format!(
                "{} id {} exceeds maximum {}",
                self.format.name(),
                id,
                self.format.max_id()
            )));
        }
        let high_id = self.high_id();
        if id >= high_id {
            return Err(Error::storage(format!(
                "{} record {} written beyond high id {}",
                self.format.name(),
                id,
                high_id
            )));
        }
        let mut bytes = vec![0u8; self.format.record_size()];
        self.format.encode(record, &mut bytes)?;
        self.file.lock().write(self.offset(id), &bytes)?;
        self.ids.lock().mark_written(id);
        Ok(())
    }

    /// Mark a record not in use and release its id
    pub fn delete(&self, id: u64) -> Result<()> {
        let mut record = self.get(id)?;
        record.set_in_use(false);
        self.update(&record)?;
        self.free_id(id);
        Ok(())
    }

    /// Allocate an id
    pub fn next_id(&self) -> Result<u64> {
        self.ids.lock().next_id().map_err(|e| match e {
            Error::CapacityExceeded(msg) => {
                Error::capacity(format!("{} store: {}", self.format.name(), msg))
            }
            other => other,
        })
    }

    /// Return an id to the free list
    pub fn free_id(&self, id: u64) {
        self.ids.lock().free(id);
    }

    /// Take a free or skipped `id` for explicit reuse
    ///
    /// Returns whether the id was available.
    pub fn claim_id(&self, id: u64) -> Result<bool> {
        let mut ids = self.ids.lock();
        match ids.claim(id) {
            Claim::Free => Ok(true),
            Claim::Skipped => {
                ids.store(&self.id_path, false)?;
                Ok(true)
            }
            Claim::Unavailable => Ok(false),
        }
    }

    /// The high-water mark
    pub fn high_id(&self) -> u64 {
        self.ids.lock().high_id()
    }

    /// Largest allocatable id
    pub fn max_id(&self) -> u64 {
        self.format.max_id()
    }

    /// Move the high-water mark, e.g. before writing a record at an explicit id
    ///
    /// The id file is rewritten right away so that reopening after a crash
    /// knows about the skipped ids without scanning them.
    pub fn set_high_id(&self, high_id: u64) -> Result<()> {
        let mut ids = self.ids.lock();
        ids.set_high_id(high_id)?;
        ids.store(&self.id_path, false)
    }

    /// Treat every slot below the high-water mark as written, growing the file
    pub fn mark_highest_written_at_high_id(&self) {
        let mut ids = self.ids.lock();
        ids.mark_highest_written_at_high_id();
        let len = ids.high_id() * self.format.record_size() as u64;
        self.file.lock().extend_to(len);
    }

    /// Highest id known to have been written
    pub fn highest_written(&self) -> Option<u64> {
        self.ids.lock().highest_written()
    }

    /// Number of ids on the free list
    pub fn free_count(&self) -> usize {
        self.ids.lock().free_count()
    }

    /// Ids on the free list, ascending
    pub fn free_ids(&self) -> Vec<u64> {
        self.ids.lock().free_ids().collect()
    }

    /// Ids below the high-water mark that may hold records, skipped ranges excluded
    pub fn live_ids(&self) -> impl Iterator<Item = u64> + use<F> {
        self.ids.lock().live_ranges().into_iter().flatten()
    }

    /// Iterate over in-use records below the current high-water mark
    pub fn iter_in_use(&self) -> impl Iterator<Item = Result<F::Record>> + '_ {
        self.live_ids().filter_map(move |id| match self.is_in_use(id) {
            Ok(false) => None,
            Ok(true) => Some(self.load(id)),
            Err(e) => Some(Err(e)),
        })
    }

    /// Write dirty pages and persist the id space, still marked unclean
    pub fn flush(&self) -> Result<()> {
        self.file.lock().flush()?;
        self.ids.lock().store(&self.id_path, false)
    }

    /// Flush and mark the id file clean
    pub fn close(&self) -> Result<()> {
        self.file.lock().flush()?;
        let ids = self.ids.lock();
        ids.store(&self.id_path, true)?;
        tracing::debug!(
            store = self.format.name(),
            high_id = ids.high_id(),
            free = ids.free_count(),
            "closed store"
        );
        Ok(())
    }

    /// Snapshot of the store's counters
    pub fn stats(&self) -> StoreStats {
        let (high_id, free_count, skipped_count) = {
            let ids = self.ids.lock();
            (ids.high_id(), ids.free_count(), ids.skipped_count())
        };
        let file = self.file.lock();
        StoreStats {
            name: self.format.name(),
            record_size: self.format.record_size(),
            high_id,
            free_count,
            skipped_count,
            file_len: file.len(),
            page_cache: file.stats().into(),
        }
    }

    fn offset(&self, id: u64) -> u64 {
        id * self.format.record_size() as u64
    }
}

fn id_file_path(path: &Path) -> PathBuf {
    let mut name = path.as_os_str().to_owned();
    name.push(".id");
    PathBuf::from(name)
}

/// Counters of one store
#[derive(Debug, Clone, Serialize)]
pub struct StoreStats {
    pub name: &'static str,
    pub record_size: usize,
    pub high_id: u64,
    pub free_count: usize,
    /// Ids jumped over by an explicit high-water mark
    pub skipped_count: u64,
    pub file_len: u64,
    pub page_cache: CacheStats,
}

/// Serializable page cache counters
#[derive(Debug, Clone, Serialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub hit_rate: f64,
}

impl From<PageCacheStats> for CacheStats {
    fn from(stats: PageCacheStats) -> Self {
        Self {
            hits: stats.hits,
            misses: stats.misses,
            evictions: stats.evictions,
            hit_rate: stats.hit_rate(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::format::{NodeFormat, NodeRecord};
    use crate::storage::record::RecordId;
    use tempfile::TempDir;

    fn open(dir: &TempDir) -> RecordStore<NodeFormat> {
        RecordStore::open(dir.path().join("nodes.store"), NodeFormat, 512, 8).unwrap()
    }

    fn create(store: &RecordStore<NodeFormat>) -> NodeRecord {
        let (_, record) = store.create().unwrap();
        store.update(&record).unwrap();
        record
    }

    #[test]
    fn test_create_get_update() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let mut record = create(&store);
        assert_eq!(record.id, 0);

        record.first_property = RecordId::new(12);
        store.update(&record).unwrap();
        assert_eq!(store.get(0).unwrap().first_property, RecordId::new(12));
    }

    #[test]
    fn test_get_beyond_high_id_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        create(&store);
        assert!(matches!(store.get(1), Err(Error::NotFound(_))));
        assert!(matches!(store.get(u64::MAX - 1), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_allocated_but_unwritten_is_not_found() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let (id, _) = store.create().unwrap();
        assert!(matches!(store.get(id), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_delete_frees_id() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for _ in 0..3 {
            create(&store);
        }
        store.delete(1).unwrap();
        assert!(matches!(store.get(1), Err(Error::NotFound(_))));
        assert_eq!(store.free_ids(), vec![1]);
        assert_eq!(store.create().unwrap().0, 1);
    }

    #[test]
    fn test_file_length_is_exact() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        for _ in 0..5 {
            create(&store);
        }
        store.close().unwrap();
        let len = std::fs::metadata(store.path()).unwrap().len();
        assert_eq!(len, 5 * 15);
    }

    #[test]
    fn test_free_ids_survive_clean_close() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            for _ in 0..4 {
                create(&store);
            }
            store.delete(2).unwrap();
            store.close().unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.high_id(), 4);
        assert_eq!(store.free_ids(), vec![2]);
    }

    #[test]
    fn test_unclean_shutdown_recovers_from_id_file() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            for _ in 0..4 {
                create(&store);
            }
            store.delete(0).unwrap();
            store.flush().unwrap();
            // dropped without close
        }
        let store = open(&dir);
        assert_eq!(store.high_id(), 4);
        assert_eq!(store.free_ids(), vec![0]);
        assert_eq!(store.iter_in_use().count(), 3);
    }

    #[test]
    fn test_free_id_reused_after_snapshot_is_not_handed_out_again() {
        let dir = TempDir::new().unwrap();
        let id_path = id_file_path(&dir.path().join("nodes.store"));
        {
            let store = open(&dir);
            for _ in 0..3 {
                create(&store);
            }
            store.delete(1).unwrap();
            store.flush().unwrap();
            let snapshot = std::fs::read(&id_path).unwrap();

            assert_eq!(create(&store).id, 1);
            create(&store);
            store.flush().unwrap();
            // Records reached the disk, the id file did not
            std::fs::write(&id_path, snapshot).unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.high_id(), 4);
        assert!(store.free_ids().is_empty());
        assert_eq!(store.create().unwrap().0, 4);
    }

    #[test]
    fn test_missing_id_file_rebuilds_from_scan() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            for _ in 0..4 {
                create(&store);
            }
            store.delete(2).unwrap();
            store.close().unwrap();
            std::fs::remove_file(id_file_path(store.path())).unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.high_id(), 4);
        assert_eq!(store.free_ids(), vec![2]);
    }

    #[test]
    fn test_sparse_store_reopens_without_scanning_the_gap() {
        let dir = TempDir::new().unwrap();
        let id = (1u64 << 32) - 1;
        {
            let store = open(&dir);
            create(&store);
            store.set_high_id(id + 1).unwrap();
            assert!(store.claim_id(id).unwrap());
            let record = store.format().new_record(id);
            store.update(&record).unwrap();
            store.flush().unwrap();
        }
        let start = std::time::Instant::now();
        let store = open(&dir);
        assert!(start.elapsed() < std::time::Duration::from_secs(5));
        assert_eq!(store.high_id(), id + 1);
        assert!(store.free_ids().is_empty());
        assert_eq!(store.stats().skipped_count, id - 1);
        assert_eq!(
            store.iter_in_use().map(|r| r.unwrap().id).collect::<Vec<_>>(),
            vec![0, id]
        );
    }

    #[test]
    fn test_claiming_a_skipped_id_survives_a_crash() {
        let dir = TempDir::new().unwrap();
        {
            let store = open(&dir);
            store.set_high_id(100).unwrap();
            assert!(store.claim_id(40).unwrap());
            assert!(!store.claim_id(40).unwrap());
            store.update(&store.format().new_record(40)).unwrap();
            store.flush().unwrap();
        }
        let store = open(&dir);
        assert_eq!(store.live_ids().collect::<Vec<_>>(), vec![40]);
        assert!(store.is_in_use(40).unwrap());
    }

    #[test]
    fn test_explicit_high_ids() {
        let dir = TempDir::new().unwrap();
        let store = open(&dir);
        let id = (1u64 << 32) - 1;
        store.set_high_id(id + 1).unwrap();
        assert!(store.claim_id(id).unwrap());
        let mut record = store.format().new_record(id);
        record.first_property = RecordId::new(5);
        store.update(&record).unwrap();
        assert_eq!(store.get(id).unwrap(), record);
        assert!(!store.is_in_use(id - 1).unwrap());
    }
}

//! Identifier allocation with free-list reuse
//!
//! Every record store owns one [`IdSpace`]. Fresh ids come from a monotonic
//! high-water mark; ids returned through [`IdSpace::free`] are handed out
//! again (lowest first) before the high-water mark advances. Moving the mark
//! forward with [`IdSpace::set_high_id`] leaves a skipped range that is never
//! handed out and never scanned, so a store seeded at id 2^32 does not pay
//! for the four billion slots below it.
//!
//! The state is persisted in a sidecar `<store>.id` file:
//!
//! ```text
//! [IdFileHeader: 40 bytes][free id: u64 LE]*[skipped range: start u64 LE, end u64 LE]*
//! [xxh3 checksum of everything before: u64 LE]
//! ```
//!
//! The header's `clean` flag is only set by an orderly close. An unclean
//! file is still a valid snapshot: [`IdSpace::recover`] checks it against
//! the store instead of scanning every slot. Only a missing or corrupt id
//! file forces a full [`IdSpace::rebuild`].

use super::record::get_u64;
use crate::{Error, Result};
use bytemuck::{Pod, Zeroable};
use std::collections::{BTreeMap, BTreeSet};
use std::ops::Range;
use std::path::Path;
use xxhash_rust::xxh3::xxh3_64;

const ID_FILE_MAGIC: u32 = 0x5247_4944; // "RGID"
const ID_FILE_VERSION: u32 = 2;

/// Fixed-size header of an id file
#[repr(C)]
#[derive(Debug, Clone, Copy, Pod, Zeroable)]
struct IdFileHeader {
    magic: u32,
    version: u32,
    /// 1 when written by an orderly close
    clean: u32,
    _padding: u32,
    high_id: u64,
    free_count: u64,
    skipped_count: u64,
}

const ID_FILE_HEADER_SIZE: usize = std::mem::size_of::<IdFileHeader>();

/// An id file as read from disk
#[derive(Debug)]
pub struct IdSnapshot {
    pub ids: IdSpace,
    /// Written by an orderly close
    pub clean: bool,
}

/// Per-store identifier allocator
#[derive(Debug, Clone)]
pub struct IdSpace {
    /// Next never-used id
    high_id: u64,
    /// Largest id this space may hand out
    max_id: u64,
    /// Ids released by deletions, reused lowest first
    free: BTreeSet<u64>,
    /// Ranges jumped over by [`set_high_id`](Self::set_high_id), start → end (exclusive)
    skipped: BTreeMap<u64, u64>,
    /// Highest id known to have been written to the store file
    highest_written: Option<u64>,
}

impl IdSpace {
    /// Create an empty id space that can hand out ids up to `max_id`
    pub fn new(max_id: u64) -> Self {
        Self {
            high_id: 0,
            max_id,
            free: BTreeSet::new(),
            skipped: BTreeMap::new(),
            highest_written: None,
        }
    }

    /// Allocate an id: a recycled one if available, else the high-water mark
    pub fn next_id(&mut self) -> Result<u64> {
        if let Some(id) = self.free.pop_first() {
            return Ok(id);
        }
        if self.high_id > self.max_id {
            return Err(Error::capacity(format!(
                "id space exhausted: high id {} exceeds maximum {}",
                self.high_id, self.max_id
            )));
        }
        let id = self.high_id;
        self.high_id += 1;
        Ok(id)
    }

    /// Return an id to the free list. The high-water mark never shrinks.
    pub fn free(&mut self, id: u64) {
        if id >= self.high_id || self.skipped_range_of(id).is_some() {
            tracing::warn!(id, high_id = self.high_id, "ignoring free of unallocated id");
            return;
        }
        if !self.free.insert(id) {
            tracing::warn!(id, "id freed twice");
        }
    }

    /// The next id the high-water mark would hand out
    pub fn high_id(&self) -> u64 {
        self.high_id
    }

    /// Largest id this space may hand out
    pub fn max_id(&self) -> u64 {
        self.max_id
    }

    /// Override the high-water mark, e.g. to seed records at explicit ids
    ///
    /// Moving the mark forward records the ids in between as skipped. Free
    /// and skipped ids at or above a lowered mark are dropped.
    pub fn set_high_id(&mut self, id: u64) -> Result<()> {
        if id > self.max_id + 1 {
            return Err(Error::capacity(format!(
                "high id {} exceeds maximum {}",
                id, self.max_id
            )));
        }
        if id > self.high_id {
            self.add_skipped(self.high_id, id);
        } else {
            self.free.retain(|&free| free < id);
            self.skipped.retain(|&start, _| start < id);
            if let Some(end) = self.skipped.values_mut().next_back() {
                *end = (*end).min(id);
            }
        }
        self.high_id = id;
        Ok(())
    }

    /// Record that every id below the high-water mark counts as written
    pub fn mark_highest_written_at_high_id(&mut self) {
        self.highest_written = self.high_id.checked_sub(1);
    }

    /// Note that `id` was written to the store file
    pub fn mark_written(&mut self, id: u64) {
        self.highest_written = Some(self.highest_written.map_or(id, |h| h.max(id)));
    }

    /// Highest id known to have been written
    pub fn highest_written(&self) -> Option<u64> {
        self.highest_written
    }

    /// Take an id that is free or was skipped, because it is being used explicitly
    ///
    /// Returns [`Claim::Skipped`] when a skipped range had to be split; the
    /// caller should persist the id space so a crash does not lose the id.
    pub fn claim(&mut self, id: u64) -> Claim {
        if self.free.remove(&id) {
            return Claim::Free;
        }
        let Some((start, end)) = self.skipped_range_of(id) else {
            return Claim::Unavailable;
        };
        self.skipped.remove(&start);
        if start < id {
            self.skipped.insert(start, id);
        }
        if id + 1 < end {
            self.skipped.insert(id + 1, end);
        }
        Claim::Skipped
    }

    /// Number of ids currently on the free list
    pub fn free_count(&self) -> usize {
        self.free.len()
    }

    /// Ids currently on the free list, ascending
    pub fn free_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.free.iter().copied()
    }

    /// Number of ids inside skipped ranges
    pub fn skipped_count(&self) -> u64 {
        self.skipped.iter().map(|(start, end)| end - start).sum()
    }

    /// Ranges below the high-water mark that may hold records, ascending
    pub fn live_ranges(&self) -> Vec<Range<u64>> {
        let mut ranges = Vec::with_capacity(self.skipped.len() + 1);
        let mut next = 0;
        for (&start, &end) in &self.skipped {
            if start > next {
                ranges.push(next..start);
            }
            next = end;
        }
        if self.high_id > next {
            ranges.push(next..self.high_id);
        }
        ranges
    }

    fn skipped_range_of(&self, id: u64) -> Option<(u64, u64)> {
        self.skipped
            .range(..=id)
            .next_back()
            .filter(|&(_, &end)| id < end)
            .map(|(&start, &end)| (start, end))
    }

    fn add_skipped(&mut self, start: u64, end: u64) {
        // Merge with a range ending exactly where this one starts
        let start = match self.skipped.range(..start).next_back() {
            Some((&prev, &prev_end)) if prev_end == start => prev,
            _ => start,
        };
        self.skipped.insert(start, end);
    }

    /// Persist the id space. `clean` marks an orderly close.
    pub fn store(&self, path: &Path, clean: bool) -> Result<()> {
        let header = IdFileHeader {
            magic: ID_FILE_MAGIC,
            version: ID_FILE_VERSION,
            clean: clean as u32,
            _padding: 0,
            high_id: self.high_id,
            free_count: self.free.len() as u64,
            skipped_count: self.skipped.len() as u64,
        };
        let mut bytes = Vec::with_capacity(
            ID_FILE_HEADER_SIZE + self.free.len() * 8 + self.skipped.len() * 16 + 8,
        );
        bytes.extend_from_slice(bytemuck::bytes_of(&header));
        for id in &self.free {
            bytes.extend_from_slice(&id.to_le_bytes());
        }
        for (start, end) in &self.skipped {
            bytes.extend_from_slice(&start.to_le_bytes());
            bytes.extend_from_slice(&end.to_le_bytes());
        }
        let checksum = xxh3_64(&bytes);
        bytes.extend_from_slice(&checksum.to_le_bytes());

        // Write-then-rename so a crash never leaves a half-written id file
        let tmp = path.with_extension("id.tmp");
        std::fs::write(&tmp, &bytes)?;
        std::fs::rename(&tmp, path)?;
        Ok(())
    }

    /// Read an id file
    ///
    /// Returns `Ok(None)` when the file is missing or fails validation; the
    /// caller then rebuilds from the store. An unclean file is returned with
    /// `clean == false` and has to go through [`recover`](Self::recover).
    pub fn load(path: &Path, max_id: u64) -> Result<Option<IdSnapshot>> {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        if bytes.len() < ID_FILE_HEADER_SIZE + 8 {
            tracing::warn!(path = %path.display(), "id file truncated");
            return Ok(None);
        }
        let (body, trailer) = bytes.split_at(bytes.len() - 8);
        let stored = get_u64(trailer, 0);
        if xxh3_64(body) != stored {
            tracing::warn!(path = %path.display(), "id file checksum mismatch");
            return Ok(None);
        }

        let header: IdFileHeader = bytemuck::pod_read_unaligned(&body[..ID_FILE_HEADER_SIZE]);
        if header.magic != ID_FILE_MAGIC || header.version != ID_FILE_VERSION {
            tracing::warn!(path = %path.display(), "id file has unknown format");
            return Ok(None);
        }
        let lists = &body[ID_FILE_HEADER_SIZE..];
        let expected = header
            .free_count
            .checked_mul(8)
            .zip(header.skipped_count.checked_mul(16))
            .and_then(|(free, skipped)| free.checked_add(skipped));
        if expected != Some(lists.len() as u64) {
            tracing::warn!(path = %path.display(), "id file list lengths mismatch");
            return Ok(None);
        }
        if header.high_id > max_id + 1 {
            tracing::warn!(
                path = %path.display(),
                high_id = header.high_id,
                max_id,
                "id file high id out of range"
            );
            return Ok(None);
        }

        let (free_bytes, skipped_bytes) = lists.split_at(header.free_count as usize * 8);
        let free = free_bytes
            .chunks_exact(8)
            .map(|chunk| get_u64(chunk, 0))
            .filter(|&id| id < header.high_id)
            .collect();
        let skipped = skipped_bytes
            .chunks_exact(16)
            .map(|chunk| (get_u64(chunk, 0), get_u64(chunk, 8)))
            .filter(|&(start, end)| start < end && end <= header.high_id)
            .collect();
        let clean = header.clean == 1;
        if !clean {
            tracing::warn!(path = %path.display(), "id file was not closed cleanly");
        }
        Ok(Some(IdSnapshot {
            ids: Self {
                high_id: header.high_id,
                max_id,
                free,
                skipped,
                highest_written: header.high_id.checked_sub(1),
            },
            clean,
        }))
    }

    /// Reconcile an unclean snapshot with the store it describes
    ///
    /// `store_high` is the number of slots the store file covers. Free ids
    /// that were reused after the snapshot are dropped, and slots past the
    /// snapshot's high-water mark are scanned. Ids freed after the snapshot
    /// was taken stay unused until the store is rebuilt.
    pub fn recover(
        mut self,
        store_high: u64,
        mut in_use: impl FnMut(u64) -> Result<bool>,
    ) -> Result<Self> {
        let mut reused = Vec::new();
        for &id in &self.free {
            if in_use(id)? {
                reused.push(id);
            }
        }
        for id in &reused {
            self.free.remove(id);
        }

        let snapshot_high = self.high_id;
        let store_high = store_high.min(self.max_id + 1);
        if store_high > snapshot_high {
            for id in snapshot_high..store_high {
                if !in_use(id)? {
                    self.free.insert(id);
                }
            }
            self.high_id = store_high;
        }
        self.highest_written = self.high_id.checked_sub(1);
        Ok(self)
    }

    /// Rebuild from a scan: `high_id` records exist, `in_use` tells which are live
    pub fn rebuild(
        max_id: u64,
        high_id: u64,
        mut in_use: impl FnMut(u64) -> Result<bool>,
    ) -> Result<Self> {
        let mut space = Self::new(max_id);
        space.high_id = high_id;
        for id in 0..high_id {
            if !in_use(id)? {
                space.free.insert(id);
            }
        }
        space.highest_written = high_id.checked_sub(1);
        Ok(space)
    }
}

/// Outcome of [`IdSpace::claim`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Claim {
    /// Taken off the free list
    Free,
    /// Cut out of a skipped range
    Skipped,
    /// Neither free nor skipped
    Unavailable,
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_sequential_allocation() {
        let mut ids = IdSpace::new(100);
        assert_eq!(ids.next_id().unwrap(), 0);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.high_id(), 2);
    }

    #[test]
    fn test_free_list_reuse_does_not_shrink_high_id() {
        let mut ids = IdSpace::new(100);
        for _ in 0..5 {
            ids.next_id().unwrap();
        }
        ids.free(3);
        ids.free(1);
        assert_eq!(ids.high_id(), 5);
        assert_eq!(ids.next_id().unwrap(), 1);
        assert_eq!(ids.next_id().unwrap(), 3);
        assert_eq!(ids.next_id().unwrap(), 5);
    }

    #[test]
    fn test_free_of_unallocated_id_is_ignored() {
        let mut ids = IdSpace::new(100);
        ids.next_id().unwrap();
        ids.free(50);
        ids.set_high_id(10).unwrap();
        ids.free(5);
        assert_eq!(ids.free_count(), 0);
    }

    #[test]
    fn test_capacity_exhaustion() {
        let mut ids = IdSpace::new(2);
        for _ in 0..3 {
            ids.next_id().unwrap();
        }
        assert!(matches!(ids.next_id(), Err(Error::CapacityExceeded(_))));
        ids.free(1);
        assert_eq!(ids.next_id().unwrap(), 1);
    }

    #[test]
    fn test_set_high_id() {
        let mut ids = IdSpace::new(u64::from(u32::MAX) * 8);
        ids.set_high_id((1 << 32) - 1).unwrap();
        assert_eq!(ids.next_id().unwrap(), (1 << 32) - 1);
        assert_eq!(ids.next_id().unwrap(), 1 << 32);
        ids.mark_highest_written_at_high_id();
        assert_eq!(ids.highest_written(), Some(1 << 32));
        assert!(matches!(ids.set_high_id(u64::MAX), Err(Error::CapacityExceeded(_))));
    }

    #[test]
    fn test_skipped_ranges_are_not_live() {
        let mut ids = IdSpace::new(1 << 40);
        ids.next_id().unwrap();
        ids.set_high_id(1000).unwrap();
        ids.next_id().unwrap();
        ids.set_high_id(1 << 33).unwrap();
        assert_eq!(ids.live_ranges(), vec![0..1, 1000..1001]);
        assert_eq!(ids.skipped_count(), 999 + (1 << 33) - 1001);

        assert_eq!(ids.claim(500), Claim::Skipped);
        assert_eq!(ids.claim(500), Claim::Unavailable);
        assert_eq!(ids.live_ranges(), vec![0..1, 500..501, 1000..1001]);

        ids.set_high_id(700).unwrap();
        assert_eq!(ids.live_ranges(), vec![0..1, 500..501]);
        assert_eq!(ids.skipped_count(), 499 + 199);
    }

    #[test]
    fn test_adjacent_jumps_merge() {
        let mut ids = IdSpace::new(1 << 20);
        ids.set_high_id(10).unwrap();
        ids.set_high_id(20).unwrap();
        assert_eq!(ids.live_ranges(), Vec::<Range<u64>>::new());
        assert_eq!(ids.skipped_count(), 20);
        assert_eq!(ids.next_id().unwrap(), 20);
    }

    #[test]
    fn test_clean_round_trip() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("nodes.store.id");
        let mut ids = IdSpace::new(1 << 34);
        for _ in 0..10 {
            ids.next_id().unwrap();
        }
        ids.set_high_id(1 << 32).unwrap();
        ids.next_id().unwrap();
        ids.free(4);
        ids.free(7);
        ids.store(&path, true).unwrap();

        let snapshot = IdSpace::load(&path, 1 << 34).unwrap().unwrap();
        assert!(snapshot.clean);
        let mut loaded = snapshot.ids;
        assert_eq!(loaded.high_id(), (1 << 32) + 1);
        assert_eq!(loaded.free_ids().collect::<Vec<_>>(), vec![4, 7]);
        assert_eq!(loaded.live_ranges(), vec![0..10, (1 << 32)..(1 << 32) + 1]);
        assert_eq!(loaded.next_id().unwrap(), 4);
    }

    #[test]
    fn test_unclean_file_is_a_snapshot() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.id");
        let mut ids = IdSpace::new(10);
        ids.next_id().unwrap();
        ids.store(&path, false).unwrap();
        let snapshot = IdSpace::load(&path, 10).unwrap().unwrap();
        assert!(!snapshot.clean);
        assert_eq!(snapshot.ids.high_id(), 1);
    }

    #[test]
    fn test_corrupt_or_missing_file_is_rejected() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("x.id");
        let ids = IdSpace::new(10);
        ids.store(&path, true).unwrap();
        let mut bytes = std::fs::read(&path).unwrap();
        bytes[20] ^= 0xFF;
        std::fs::write(&path, bytes).unwrap();
        assert!(IdSpace::load(&path, 10).unwrap().is_none());

        assert!(IdSpace::load(&dir.path().join("missing.id"), 10).unwrap().is_none());
    }

    #[test]
    fn test_recover_drops_reused_free_ids_and_scans_the_tail() {
        let mut ids = IdSpace::new(1 << 40);
        for _ in 0..4 {
            ids.next_id().unwrap();
        }
        ids.free(1);
        ids.free(2);
        ids.set_high_id(1 << 32).unwrap();

        // After the snapshot: id 1 was reused, ids 2^32.. were allocated
        let live = |id: u64| id != 2 && id != (1 << 32) + 1;
        let mut scanned = Vec::new();
        let recovered = ids
            .recover((1 << 32) + 3, |id| {
                scanned.push(id);
                Ok(live(id))
            })
            .unwrap();
        assert_eq!(recovered.high_id(), (1 << 32) + 3);
        assert_eq!(recovered.free_ids().collect::<Vec<_>>(), vec![2, (1 << 32) + 1]);
        assert_eq!(
            recovered.live_ranges(),
            vec![0..4, (1 << 32)..(1 << 32) + 3]
        );
        assert_eq!(scanned.len(), 2 + 3);
    }

    #[test]
    fn test_rebuild_from_scan() {
        let live = [true, false, true, false, true];
        let ids = IdSpace::rebuild(100, 5, |id| Ok(live[id as usize])).unwrap();
        assert_eq!(ids.high_id(), 5);
        assert_eq!(ids.free_ids().collect::<Vec<_>>(), vec![1, 3]);
    }
}

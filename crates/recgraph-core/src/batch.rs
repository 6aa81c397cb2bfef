//! Batch insertion
//!
//! A [`BatchInserter`] is a [`GraphWriter`] tuned for loading: its change
//! buffer is bounded and written out whenever it grows past the configured
//! capacity, so memory stays flat however much is loaded. There is no
//! locking, no isolation and no rollback; a crash mid-load leaves whatever
//! was written so far, and the id files are rebuilt on the next open.

use crate::engine::GraphStore;
use crate::writer::GraphWriter;
use crate::Result;
use std::ops::{Deref, DerefMut};

/// Bounded, single-owner writer for bulk loads
pub struct BatchInserter<'a> {
    store: &'a GraphStore,
    writer: GraphWriter,
    finished: bool,
}

impl<'a> BatchInserter<'a> {
    /// Inserter buffering up to `batch_cache_capacity` records
    pub fn new(store: &'a GraphStore) -> Self {
        Self::with_capacity(store, store.config().batch_cache_capacity)
    }

    pub fn with_capacity(store: &'a GraphStore, capacity: usize) -> Self {
        Self {
            store,
            writer: GraphWriter::bounded(store.stores().clone(), capacity),
            finished: false,
        }
    }

    /// Times the buffer was written out because it was full
    pub fn evictions(&mut self) -> u64 {
        self.writer.access().evictions()
    }

    /// Write the buffer out and flush the stores; id files stay unclean
    pub fn flush(&mut self) -> Result<()> {
        self.writer.commit()?;
        self.store.flush()
    }

    /// Write the buffer out and close the stores cleanly
    pub fn shutdown(mut self) -> Result<()> {
        self.finished = true;
        let written = self.writer.commit()?;
        self.store.close()?;
        tracing::info!(written, "batch inserter shut down");
        Ok(())
    }
}

impl Deref for BatchInserter<'_> {
    type Target = GraphWriter;

    fn deref(&self) -> &GraphWriter {
        &self.writer
    }
}

impl DerefMut for BatchInserter<'_> {
    fn deref_mut(&mut self) -> &mut GraphWriter {
        &mut self.writer
    }
}

impl Drop for BatchInserter<'_> {
    fn drop(&mut self) {
        if !self.finished && self.writer.buffered() > 0 {
            tracing::warn!(
                buffered = self.writer.buffered(),
                "batch inserter dropped without shutdown; buffered records are lost"
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::relationship::Direction;
    use crate::StoreConfig;
    use tempfile::TempDir;

    #[test]
    fn test_bounded_buffer_is_written_out() {
        let dir = TempDir::new().unwrap();
        let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
        let mut inserter = BatchInserter::with_capacity(&store, 8);
        let hub = inserter.create_node().unwrap();
        for _ in 0..20 {
            let other = inserter.create_node().unwrap();
            inserter.create_relationship(hub, other, 0).unwrap();
        }
        assert!(inserter.evictions() > 0);
        assert!(inserter.buffered() <= 8);
        inserter.flush().unwrap();
        assert_eq!(inserter.buffered(), 0);

        let mut reader = store.writer();
        assert_eq!(reader.degree(hub, &[], Direction::Outgoing).unwrap(), 20);
    }

    #[test]
    fn test_shutdown_closes_cleanly() {
        let dir = TempDir::new().unwrap();
        {
            let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
            let mut inserter = BatchInserter::new(&store);
            inserter.create_node_with_id(7).unwrap();
            inserter.shutdown().unwrap();
        }
        let store = GraphStore::open(dir.path(), StoreConfig::default()).unwrap();
        assert_eq!(store.stores().nodes.high_id(), 8);
        assert!(store.stores().nodes.is_in_use(7).unwrap());
    }
}

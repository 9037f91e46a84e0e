//! Per-level eviction state: an insertion-ordered list of resident files
//! and the byte counters the memory watcher steers by.
//!
//! Every table file whose reader holds cached bytes is linked on its
//! level's list; the counters track the resident total split by order
//! class. Under pressure the watcher asks a level to give back bytes and
//! the registry frees files oldest-insertion-first, skipping files that are
//! mid-query (those are parked on the deferred-free queue instead).
//!
//! The registry is an owned value: one per storage node in production,
//! one per test when isolation is needed.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, Mutex};

use crate::table::TableFile;

use super::gc::FreeQueue;

/// Levels are a small bounded range; indexing past this is a programming
/// error.
pub const MAX_LEVELS: usize = 16;

#[derive(Default)]
struct LevelLru {
    /// Insertion-ordered: smallest token is the tail (oldest), largest the
    /// front (most recently loaded).
    files: BTreeMap<u64, Arc<TableFile>>,
    next_token: u64,
}

struct LevelEntry {
    lru: Mutex<LevelLru>,
    total: AtomicI64,
    order: AtomicI64,
    unorder: AtomicI64,
}

impl LevelEntry {
    fn new() -> Self {
        Self {
            lru: Mutex::new(LevelLru::default()),
            total: AtomicI64::new(0),
            order: AtomicI64::new(0),
            unorder: AtomicI64::new(0),
        }
    }
}

pub struct EvictRegistry {
    levels: Vec<LevelEntry>,
    gc: FreeQueue,
}

impl EvictRegistry {
    pub fn new() -> Arc<EvictRegistry> {
        Arc::new(EvictRegistry {
            levels: (0..MAX_LEVELS).map(|_| LevelEntry::new()).collect(),
            gc: FreeQueue::new(),
        })
    }

    fn entry(&self, level: u16) -> &LevelEntry {
        // levels beyond the table share the last slot
        &self.levels[(level as usize).min(MAX_LEVELS - 1)]
    }

    /// Queue of files whose free was deferred because they were in use.
    pub fn gc(&self) -> &FreeQueue {
        &self.gc
    }

    /// Link a freshly loaded file at the front of its level's list. The
    /// file must not already be linked.
    pub fn add_front(&self, level: u16, file: Arc<TableFile>) {
        if file.lru_token_slot().lock().unwrap().is_some() {
            panic!("table file already on the evict list");
        }
        let mut lru = self.entry(level).lru.lock().unwrap();
        lru.next_token += 1;
        let tok = lru.next_token;
        *file.lru_token_slot().lock().unwrap() = Some(tok);
        lru.files.insert(tok, file);
    }

    /// Unlink a file from its level's list; a no-op when it is not linked.
    pub fn remove(&self, level: u16, file: &TableFile) {
        let mut lru = self.entry(level).lru.lock().unwrap();
        if let Some(tok) = file.lru_token_slot().lock().unwrap().take() {
            lru.files.remove(&tok);
        }
    }

    /// Adjust the level's resident-byte counters.
    pub fn add_mem(&self, level: u16, total: i64, order: i64, unorder: i64) {
        let entry = self.entry(level);
        entry.total.fetch_add(total, Ordering::SeqCst);
        entry.order.fetch_add(order, Ordering::SeqCst);
        entry.unorder.fetch_add(unorder, Ordering::SeqCst);
    }

    /// `(total, order, unorder)` resident bytes on the level.
    pub fn level_mem(&self, level: u16) -> (i64, i64, i64) {
        let entry = self.entry(level);
        (
            entry.total.load(Ordering::SeqCst),
            entry.order.load(Ordering::SeqCst),
            entry.unorder.load(Ordering::SeqCst),
        )
    }

    /// Number of files linked on the level's list.
    pub fn lru_len(&self, level: u16) -> usize {
        self.entry(level).lru.lock().unwrap().files.len()
    }

    /// Free cached bytes on `level`, oldest insertion first, until more
    /// than `target_bytes` have been released or the list is exhausted.
    /// Files currently in use are skipped and handed to the deferred-free
    /// queue. Returns the bytes actually freed.
    pub fn evict(&self, level: u16, target_bytes: i64) -> i64 {
        let entry = self.entry(level);
        let mut freed = 0i64;

        let mut lru = entry.lru.lock().unwrap();
        let tokens: Vec<u64> = lru.files.keys().copied().collect();
        for tok in tokens {
            let Some(file) = lru.files.get(&tok).cloned() else {
                continue;
            };
            if file.in_use() {
                self.gc.defer(file);
                continue;
            }

            let size = file.evict_free();
            if size == 0 {
                // Raced into use or pinned; it stays listed and accounted.
                continue;
            }
            lru.files.remove(&tok);
            *file.lru_token_slot().lock().unwrap() = None;

            let (order, unorder) = if file.is_order() { (size, 0) } else { (0, size) };
            entry.total.fetch_sub(size, Ordering::SeqCst);
            entry.order.fetch_sub(order, Ordering::SeqCst);
            entry.unorder.fetch_sub(unorder, Ordering::SeqCst);

            freed += size;
            if freed > target_bytes {
                break;
            }
        }
        drop(lru);

        if freed > 0 {
            tracing::debug!(level = level, freed = freed, "evicted cached table bytes");
        }
        freed
    }
}

#[cfg(test)]
mod tests {
    use std::path::Path;

    use super::*;
    use crate::table::fixture::{series, write_file};
    use crate::table::TableFile;

    fn open_file(dir: &Path, seq: u64, registry: &Arc<EvictRegistry>) -> Arc<TableFile> {
        let name = crate::table::FileName::new(seq, 0, 0, 0);
        let path = dir.join(name.tssp_name());
        write_file(&path, &[series(seq * 10, &[(1, 1.0), (2, 2.0)])]);
        TableFile::open(
            &path,
            dir.join("shard.lock"),
            true,
            false,
            registry.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_counters_follow_load_and_free() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();
        let file = open_file(dir.path(), 1, &registry);

        file.load_into_memory().unwrap();
        let size = file.in_mem_size();
        assert!(size > 0);
        assert_eq!(registry.level_mem(0), (size, size, 0));
        assert_eq!(registry.lru_len(0), 1);

        let freed = file.free();
        assert_eq!(freed, size);
        assert_eq!(registry.level_mem(0), (0, 0, 0));
        assert_eq!(registry.lru_len(0), 0);

        file.close().unwrap();
    }

    #[test]
    fn test_double_link_panics() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();
        let file = open_file(dir.path(), 1, &registry);

        registry.add_front(0, file.clone());
        let result = std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
            registry.add_front(0, file.clone());
        }));
        assert!(result.is_err());

        registry.remove(0, &file);
        registry.remove(0, &file); // second removal is a no-op
        assert_eq!(registry.lru_len(0), 0);
    }

    fn open_file_with_rows(
        dir: &Path,
        seq: u64,
        rows: usize,
        registry: &Arc<EvictRegistry>,
    ) -> Arc<TableFile> {
        let name = crate::table::FileName::new(seq, 0, 0, 0);
        let path = dir.join(name.tssp_name());
        let points: Vec<(i64, f64)> = (0..rows).map(|i| (i as i64, i as f64)).collect();
        write_file(&path, &[series(seq * 10, &points)]);
        TableFile::open(
            &path,
            dir.join("shard.lock"),
            true,
            false,
            registry.clone(),
        )
        .unwrap()
    }

    #[test]
    fn test_evict_frees_from_the_tail() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();

        // Loaded oldest-first with distinct cache buckets; the first load
        // is the tail of the list.
        let oldest = open_file_with_rows(dir.path(), 1, 600, &registry);
        let middle = open_file_with_rows(dir.path(), 2, 300, &registry);
        let newest = open_file_with_rows(dir.path(), 3, 100, &registry);
        for f in [&oldest, &middle, &newest] {
            f.load_into_memory().unwrap();
        }

        let (big, mid, small) = (
            oldest.in_mem_size(),
            middle.in_mem_size(),
            newest.in_mem_size(),
        );
        assert!(big > mid && mid > small);
        assert_eq!(registry.level_mem(0).0, big + mid + small);

        // Eviction runs from the tail until the freed total exceeds the
        // target: the two oldest files go, the front one is spared.
        let freed = registry.evict(0, big);
        assert_eq!(freed, big + mid);
        assert_eq!(registry.level_mem(0).0, small);
        assert_eq!(registry.lru_len(0), 1);
        assert_eq!(oldest.in_mem_size(), 0);
        assert_eq!(middle.in_mem_size(), 0);
        assert_eq!(newest.in_mem_size(), small);

        for f in [oldest, middle, newest] {
            f.close().unwrap();
        }
    }

    #[test]
    fn test_evict_skips_files_in_use() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();

        let busy = open_file(dir.path(), 1, &registry);
        let idle = open_file(dir.path(), 2, &registry);
        busy.load_into_memory().unwrap();
        idle.load_into_memory().unwrap();
        let per_file = busy.in_mem_size();

        let guard = busy.try_use().unwrap();
        let freed = registry.evict(0, i64::MAX);

        // Only the idle file was freed; the busy one moved to the deferred
        // queue and stays accounted.
        assert_eq!(freed, per_file);
        assert_eq!(registry.level_mem(0).0, per_file);
        assert_eq!(registry.gc().len(), 1);
        assert_eq!(busy.in_mem_size(), per_file);

        drop(guard);
        let drained = registry.gc().drain();
        assert_eq!(drained, per_file);
        assert_eq!(registry.level_mem(0), (0, 0, 0));
        assert_eq!(registry.lru_len(0), 0);

        busy.close().unwrap();
        idle.close().unwrap();
    }

    #[test]
    fn test_unordered_files_account_separately() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("out-of-order")).unwrap();
        let registry = EvictRegistry::new();

        let name = crate::table::FileName::new(9, 0, 0, 0);
        let path = dir.path().join("out-of-order").join(name.tssp_name());
        write_file(&path, &[series(5, &[(1, 1.0)])]);
        let file = TableFile::open(
            &path,
            dir.path().join("shard.lock"),
            false,
            false,
            registry.clone(),
        )
        .unwrap();

        file.load_into_memory().unwrap();
        let size = file.in_mem_size();
        assert_eq!(registry.level_mem(0), (size, 0, size));

        file.free();
        assert_eq!(registry.level_mem(0), (0, 0, 0));
        file.close().unwrap();
    }
}

//! The ordered collection of table files for one shard, measurement and
//! order class.
//!
//! The set owns one reference on every member file. Queries take a
//! snapshot under the shared lock, referencing each file they care about,
//! and drop the set lock before reading; compaction swaps inputs for
//! outputs under the exclusive lock and then retires the inputs through
//! their own reference counts.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::{Arc, RwLock};

use crate::table::TableFile;

pub struct TableSet {
    files: RwLock<Vec<Arc<TableFile>>>,
    /// The owning shard's reference on the whole set.
    refs: AtomicI64,
    /// Nonzero once the shard began shutting the set down; new snapshots
    /// come back empty.
    closing: AtomicI64,
}

impl TableSet {
    pub fn new() -> Self {
        Self {
            files: RwLock::new(Vec::with_capacity(32)),
            refs: AtomicI64::new(1),
            closing: AtomicI64::new(0),
        }
    }

    pub fn len(&self) -> usize {
        self.files.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.read().unwrap().is_empty()
    }

    pub fn is_closing(&self) -> bool {
        self.closing.load(Ordering::SeqCst) > 0
    }

    pub fn retain(&self) {
        self.refs.fetch_add(1, Ordering::SeqCst);
    }

    pub fn release(&self) {
        if self.refs.fetch_sub(1, Ordering::SeqCst) <= 0 {
            panic!("table set released below zero");
        }
    }

    /// Plain clone of the member list, for enumeration by the compactor.
    /// Takes no file references; the caller still holds the set alive.
    pub fn files(&self) -> Vec<Arc<TableFile>> {
        self.files.read().unwrap().clone()
    }

    /// Query entry point: reference every live member under the shared
    /// lock and hand the list out. The caller releases each file when done
    /// and must not hold the set lock while reading. Empty once the set is
    /// closing.
    pub fn snapshot(&self) -> Vec<Arc<TableFile>> {
        if self.is_closing() {
            return Vec::new();
        }
        let files = self.files.read().unwrap();
        files
            .iter()
            .filter(|f| f.retain())
            .cloned()
            .collect()
    }

    /// Append without ordering; the caller sorts after a bulk load.
    pub fn append(&self, file: Arc<TableFile>) {
        self.files.write().unwrap().push(file);
    }

    pub fn sort(&self) {
        self.files
            .write()
            .unwrap()
            .sort_by(|a, b| a.name().cmp(&b.name()));
    }

    /// Index of `target` in the set. Binary search on the sequence, then a
    /// path comparison within the short equal-sequence band (extents of one
    /// compaction share a sequence).
    pub fn locate(&self, target: &TableFile) -> Option<usize> {
        Self::index_of(&self.files.read().unwrap(), target)
    }

    fn index_of(files: &[Arc<TableFile>], target: &TableFile) -> Option<usize> {
        if files.is_empty() {
            return None;
        }

        let (_, seq) = target.level_and_sequence();
        let target_path = target.path();

        let mut left = 0usize;
        let mut right = files.len() - 1;
        let mut hit = None;
        while left < right {
            let mid = (left + right) / 2;
            let (_, mid_seq) = files[mid].level_and_sequence();
            if seq == mid_seq {
                hit = Some(mid);
                break;
            } else if seq < mid_seq {
                right = mid;
            } else {
                left = mid + 1;
            }
        }

        if let Some(found) = hit {
            for i in (0..=found).rev() {
                if files[i].level_and_sequence().1 != seq {
                    break;
                }
                if files[i].path() == target_path {
                    return Some(i);
                }
            }
            for (i, file) in files.iter().enumerate().skip(found + 1) {
                if file.level_and_sequence().1 != seq {
                    break;
                }
                if file.path() == target_path {
                    return Some(i);
                }
            }
        }

        if files[left].path() == target_path {
            return Some(left);
        }
        None
    }

    /// Remove `target` from the set. The caller handles the file's
    /// reference and physical removal separately. Deleting a non-member is
    /// a programming error.
    pub fn delete_file(&self, target: &TableFile) {
        let mut files = self.files.write().unwrap();
        let idx = Self::index_of(&files, target)
            .unwrap_or_else(|| panic!("file not in set: {}", target.path().display()));
        files.remove(idx);
    }

    /// Swap compaction inputs for outputs in one critical section: every
    /// input is removed (a missing input is a programming error), the
    /// outputs are appended and the set is re-sorted. The caller marks the
    /// inputs removed afterwards.
    pub fn replace(&self, old: &[Arc<TableFile>], new: Vec<Arc<TableFile>>) {
        let mut files = self.files.write().unwrap();
        for target in old {
            let idx = Self::index_of(&files, target)
                .unwrap_or_else(|| panic!("file not in set: {}", target.path().display()));
            files.remove(idx);
        }
        files.extend(new);
        files.sort_by(|a, b| a.name().cmp(&b.name()));

        debug_assert!(
            files
                .windows(2)
                .all(|w| (w[0].name().seq(), w[0].extent()) != (w[1].name().seq(), w[1].extent())),
            "duplicate (sequence, extent) after compaction swap"
        );
    }

    /// Mark the set as closing and stop every member. Files are not closed
    /// here; the shard closes them once its own bookkeeping is done.
    pub fn stop_all(&self) {
        self.closing.fetch_add(1, Ordering::SeqCst);
        let files = self.files.read().unwrap();
        for file in files.iter() {
            file.stop();
        }
    }

    /// A set is fully compacted when it holds at most one file, or when
    /// every file is an extent of the same `(level, sequence)`.
    pub fn fully_compacted(&self) -> bool {
        let files = self.files.read().unwrap();
        if files.len() <= 1 {
            return true;
        }
        let (level, seq) = files[0].level_and_sequence();
        files
            .iter()
            .skip(1)
            .all(|f| f.level_and_sequence() == (level, seq))
    }
}

impl Default for TableSet {
    fn default() -> Self {
        Self::new()
    }
}

//! Compaction descriptors.
//!
//! A `CompactGroup` names the input files of one compaction run and where
//! the output lands. Groups churn at a steady rate on a busy shard, so
//! they come from a lock-free pool that recycles the input-path allocation.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::table::TableFile;

/// Inputs and target of one compaction run.
#[derive(Debug, Default)]
pub struct CompactGroup {
    /// Measurement name, version suffix included.
    pub name: String,
    pub shard_id: u64,
    pub to_level: u16,
    group: Vec<String>,
    /// Shared with the shard; set when the shard is being dropped so the
    /// compactor can abort cleanly.
    dropping: Option<Arc<AtomicBool>>,
}

impl CompactGroup {
    pub fn files(&self) -> &[String] {
        &self.group
    }

    pub fn len(&self) -> usize {
        self.group.len()
    }

    pub fn is_empty(&self) -> bool {
        self.group.is_empty()
    }

    pub fn add_file(&mut self, path: String) {
        self.group.push(path);
    }

    pub fn set_dropping(&mut self, flag: Arc<AtomicBool>) {
        self.dropping = Some(flag);
    }

    /// True when the owning shard started dropping; the compactor checks
    /// this between input files.
    pub fn dropped(&self) -> bool {
        self.dropping
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    fn reset(&mut self) {
        self.name.clear();
        self.shard_id = 0;
        self.to_level = 0;
        self.group.clear();
        self.dropping = None;
    }
}

/// Free list of compaction descriptors, bounded only by peak concurrency:
/// a group released here keeps its input-path capacity for the next run.
pub struct CompactGroupPool {
    pool: SegQueue<CompactGroup>,
}

impl CompactGroupPool {
    pub fn new() -> Self {
        Self {
            pool: SegQueue::new(),
        }
    }

    /// Take a descriptor, sized for `count` input files.
    pub fn acquire(&self, name: &str, to_level: u16, count: usize) -> CompactGroup {
        let mut group = self.pool.pop().unwrap_or_default();
        group.name.push_str(name);
        group.to_level = to_level;
        group.group.reserve(count);
        group
    }

    pub fn release(&self, mut group: CompactGroup) {
        group.reset();
        self.pool.push(group);
    }

    pub fn pooled(&self) -> usize {
        self.pool.len()
    }
}

impl Default for CompactGroupPool {
    fn default() -> Self {
        Self::new()
    }
}

/// Planning statistics over the input files of a prospective compaction,
/// gathered while the files are referenced.
#[derive(Debug)]
pub struct FilesInfo {
    pub name: String,
    pub shard_id: u64,
    pub to_level: u16,
    pub old_files: Vec<Arc<TableFile>>,
    pub max_chunk_rows: usize,
    pub avg_chunk_rows: usize,
    pub max_chunk_count: u64,
    pub estimate_size: u64,
    pub dropping: Option<Arc<AtomicBool>>,
}

impl FilesInfo {
    pub fn gather(
        name: &str,
        shard_id: u64,
        to_level: u16,
        files: Vec<Arc<TableFile>>,
    ) -> FilesInfo {
        let mut max_chunk_rows = 0usize;
        let mut avg_sum = 0usize;
        let mut max_chunk_count = 0u64;
        let mut estimate_size = 0u64;
        for file in &files {
            max_chunk_rows = max_chunk_rows.max(file.max_chunk_rows());
            avg_sum += file.average_chunk_rows();
            max_chunk_count = max_chunk_count.max(file.file_stat().chunk_count);
            estimate_size += file.file_size();
        }
        let avg_chunk_rows = if files.is_empty() {
            0
        } else {
            avg_sum / files.len()
        };

        FilesInfo {
            name: name.to_string(),
            shard_id,
            to_level,
            old_files: files,
            max_chunk_rows,
            avg_chunk_rows,
            max_chunk_count,
            estimate_size,
            dropping: None,
        }
    }
}

//! A reference-counted handle around one immutable table file.
//!
//! Three concerns live here: the stop flag that fences off new reads, the
//! user reference count drained through a wait-group before anything
//! destructive happens, and membership on the per-level evict list.
//!
//! Removal is cooperative: `remove` stops the file and drops the owning
//! set's reference, but the physical unlink happens only when the final
//! reference is released, whichever thread that turns out to be.

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU32, Ordering};
use std::sync::{Arc, Mutex, RwLock};

use crate::error::{Error, Result};
use crate::flock::FileLock;
use crate::record::{ReadContext, Record, TimeRange};
use crate::store::evict::EvictRegistry;
use crate::waitgroup::WaitGroup;

use super::format::{ChunkMeta, MetaIndex, Trailer};
use super::name::{is_temp_file, FileName};
use super::reader::{FileReader, IdTimePairs};

impl std::fmt::Debug for TableFile {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableFile").field("name", &self.name).finish()
    }
}

pub struct TableFile {
    name: FileName,
    lock_path: PathBuf,

    /// Live users; starts at 1, the owning set's reference.
    refs: AtomicI32,
    /// Nonzero once stopped; no new reads are accepted.
    flag: AtomicU32,
    /// Set by `remove`; the final releaser performs the unlink.
    remove_pending: AtomicBool,
    /// Outstanding reader references.
    wg: WaitGroup,

    /// Present iff the reader holds cached bytes and the file is linked on
    /// its level's evict list.
    lru_token: Mutex<Option<u64>>,

    reader: RwLock<FileReader>,
    registry: Arc<EvictRegistry>,
}

impl TableFile {
    /// Open a committed table file. Parses the identity out of the
    /// basename, builds the reader (trailer + meta-index) and optionally
    /// pre-sizes the cache bucket for later admission.
    pub fn open(
        path: &Path,
        lock_path: impl Into<PathBuf>,
        is_order: bool,
        cache_data: bool,
        registry: Arc<EvictRegistry>,
    ) -> Result<Arc<TableFile>> {
        let base = path
            .file_name()
            .and_then(|b| b.to_str())
            .ok_or_else(|| Error::FileNameParse {
                name: path.display().to_string(),
                field: "format".to_string(),
            })?;
        let name = FileName::parse(base)?.with_order(is_order);

        let mut reader = FileReader::open(path)?;
        if cache_data {
            reader.reserve_cache();
        }

        Ok(Arc::new(TableFile {
            name,
            lock_path: lock_path.into(),
            refs: AtomicI32::new(1),
            flag: AtomicU32::new(0),
            remove_pending: AtomicBool::new(false),
            wg: WaitGroup::new(),
            lru_token: Mutex::new(None),
            reader: RwLock::new(reader),
            registry,
        }))
    }

    fn stopped(&self) -> bool {
        self.flag.load(Ordering::SeqCst) > 0
    }

    /// Fence off new reads. Existing readers run to completion.
    pub fn stop(&self) {
        self.flag.fetch_add(1, Ordering::SeqCst);
    }

    /// True while anyone beyond the owning set holds a reference.
    pub fn in_use(&self) -> bool {
        self.refs.load(Ordering::SeqCst) > 1
    }

    /// Take a reference. Silently refused once the file is stopped;
    /// returns whether the reference was actually taken.
    pub fn retain(&self) -> bool {
        if self.stopped() {
            return false;
        }
        self.refs.fetch_add(1, Ordering::SeqCst);
        self.wg.add(1);
        true
    }

    /// Drop a reference. Dropping the count below the owning set's
    /// reference on a live file means the accounting is broken and panics.
    /// The final release of a removed file performs the deferred unlink.
    pub fn release(&self) {
        let after = self.refs.fetch_sub(1, Ordering::SeqCst) - 1;
        if after > 0 {
            self.wg.done();
            return;
        }
        if after == 0 && self.stopped() {
            self.wg.done();
            if self.remove_pending.load(Ordering::SeqCst) {
                if let Err(e) = self.unlink_and_unaccount() {
                    tracing::error!(error = %e, "deferred table file removal failed");
                }
            }
            return;
        }
        panic!("table file released below the set's own reference");
    }

    /// Pin the reader cache so cached blocks stay resident across calls.
    pub fn pin_reader(&self) {
        self.reader.read().unwrap().pin();
    }

    pub fn unpin_reader(&self) {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return;
        }
        reader.unpin();
    }

    /// Take a whole-file usage lease: reference plus reader pin, released
    /// together when the guard drops. None once the file is stopped.
    pub fn try_use(self: &Arc<Self>) -> Option<UsageGuard> {
        if !self.retain() {
            return None;
        }
        self.pin_reader();
        Some(UsageGuard { file: self.clone() })
    }

    pub fn name(&self) -> FileName {
        self.name
    }

    pub fn level_and_sequence(&self) -> (u16, u64) {
        self.name.level_and_sequence()
    }

    pub fn level(&self) -> u16 {
        self.name.level()
    }

    pub fn merge(&self) -> u16 {
        self.name.merge()
    }

    pub fn extent(&self) -> u16 {
        self.name.extent()
    }

    pub fn is_order(&self) -> bool {
        self.name.order()
    }

    pub fn path(&self) -> PathBuf {
        self.reader.read().unwrap().path().to_path_buf()
    }

    pub fn file_size(&self) -> u64 {
        self.reader.read().unwrap().file_size()
    }

    pub fn in_mem_size(&self) -> i64 {
        self.reader.read().unwrap().in_mem_size()
    }

    pub fn create_time(&self) -> i64 {
        self.reader.read().unwrap().create_time()
    }

    pub fn version(&self) -> u64 {
        self.reader.read().unwrap().version()
    }

    pub fn file_stat(&self) -> Trailer {
        *self.reader.read().unwrap().trailer()
    }

    pub fn meta_index_item_num(&self) -> usize {
        self.reader.read().unwrap().meta_index_item_num()
    }

    pub fn average_chunk_rows(&self) -> usize {
        self.reader.read().unwrap().average_chunk_rows()
    }

    pub fn max_chunk_rows(&self) -> usize {
        self.reader.read().unwrap().max_chunk_rows()
    }

    pub fn meta_index(&self, id: u64, tr: TimeRange) -> Result<Option<(usize, MetaIndex)>> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.meta_index(id, tr))
    }

    pub fn meta_index_at(&self, idx: usize) -> Result<MetaIndex> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.meta_index_at(idx).copied()
    }

    #[allow(clippy::too_many_arguments)]
    pub fn chunk_meta(
        &self,
        id: u64,
        offset: u64,
        size: u32,
        item_count: u32,
        meta_idx: usize,
        dst: &mut ChunkMeta,
        buf: &mut Vec<u8>,
    ) -> Result<bool> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.chunk_meta(id, offset, size, item_count, meta_idx, dst, buf)
    }

    pub fn chunk_meta_at(&self, idx: usize) -> Result<ChunkMeta> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.chunk_meta_at(idx).cloned()
    }

    pub fn read_data(&self, offset: u64, size: u32, dst: &mut Vec<u8>) -> Result<()> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.read_data(offset, size, dst)
    }

    pub fn read_chunk_meta_data(
        &self,
        meta_idx: usize,
        mi: &MetaIndex,
        dst: &mut Vec<ChunkMeta>,
    ) -> Result<()> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.read_chunk_meta_data(meta_idx, mi, dst)
    }

    pub fn read_at(
        &self,
        cm: &ChunkMeta,
        segment: usize,
        dst: &mut Record,
        ctx: &mut ReadContext,
    ) -> Result<()> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        if segment >= cm.segment_count() {
            let err = Error::OutOfRange {
                index: segment,
                count: cm.segment_count(),
            };
            tracing::error!(error = %err, "segment index out of range");
            return Err(err);
        }
        reader.read_at(cm, segment, dst, ctx)
    }

    pub fn contains(&self, id: u64) -> Result<bool> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.contains(id))
    }

    pub fn contains_value(&self, id: u64, tr: TimeRange) -> Result<bool> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.contains_value(id, tr))
    }

    pub fn contains_time(&self, tr: TimeRange) -> Result<bool> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.contains_time(tr))
    }

    pub fn min_max_time(&self) -> Result<(i64, i64)> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.min_max_time())
    }

    pub fn min_max_series_id(&self) -> Result<(u64, u64)> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        Ok(reader.min_max_series_id())
    }

    pub fn load_id_times(&self, pairs: &mut IdTimePairs) -> Result<()> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        reader.load_id_times(pairs)
    }

    /// Drop the OS handle under descriptor pressure; the next read reopens
    /// it lazily.
    pub fn free_file_handle(&self) -> Result<()> {
        let reader = self.reader.read().unwrap();
        if self.stopped() {
            return Ok(());
        }
        reader.free_file_handle()
    }

    /// Read all chunk-meta blocks into memory. Exclusive; idempotent.
    pub fn load_components(&self) -> Result<()> {
        self.reader.write().unwrap().load_components()
    }

    /// Read the data section into the cache, then account the bytes and
    /// link the file on its level's evict list. Idempotent.
    pub fn load_into_memory(self: &Arc<Self>) -> Result<()> {
        let added = self.reader.write().unwrap().load_into_memory()?;
        if added == 0 {
            return Ok(());
        }

        let level = self.name.level();
        let (order, unorder) = if self.name.order() {
            (added, 0)
        } else {
            (0, added)
        };
        self.registry.add_mem(level, added, order, unorder);
        self.registry.add_front(level, self.clone());
        Ok(())
    }

    /// Release the cached bytes if nobody is using the file; otherwise
    /// defer to the background free queue. Returns the bytes released now.
    /// Accounting and list membership are the caller's step, see
    /// [`TableFile::free`].
    pub fn free_memory(self: &Arc<Self>) -> i64 {
        let mut reader = self.reader.write().unwrap();
        if self.in_use() {
            drop(reader);
            self.registry.gc().defer(self.clone());
            return 0;
        }
        reader.free_memory()
    }

    /// `free_memory` plus counter and evict-list maintenance.
    pub fn free(self: &Arc<Self>) -> i64 {
        let size = self.free_memory();
        if size == 0 {
            return 0;
        }

        let level = self.name.level();
        let (order, unorder) = if self.name.order() {
            (size, 0)
        } else {
            (0, size)
        };
        self.registry.add_mem(level, -size, -order, -unorder);
        self.registry.remove(level, self);
        size
    }

    /// Eviction-path free: never defers, returns 0 when the file is busy
    /// or pinned. The registry handles accounting itself.
    pub(crate) fn evict_free(&self) -> i64 {
        let mut reader = self.reader.write().unwrap();
        if self.in_use() {
            return 0;
        }
        reader.free_memory()
    }

    pub(crate) fn lru_token_slot(&self) -> &Mutex<Option<u64>> {
        &self.lru_token
    }

    /// Move the file on disk under the advisory lock. Used to finalize an
    /// `.init` file into its committed name; the parsed identity does not
    /// change.
    pub fn rename(&self, new_path: &Path) -> Result<()> {
        let mut reader = self.reader.write().unwrap();
        if self.stopped() {
            return Err(Error::FileClosed);
        }
        let _lock =
            FileLock::acquire(&self.lock_path).map_err(|e| Error::io(&self.lock_path, e))?;
        reader.rename(new_path)
    }

    /// Stop the file and drop the owning set's reference. The unlink and
    /// the memory un-accounting happen exactly once, when the final
    /// reference is gone: immediately if the file is idle, otherwise at
    /// the last `release`.
    pub fn remove(self: &Arc<Self>) -> Result<()> {
        self.stop();
        self.remove_pending.store(true, Ordering::SeqCst);
        let after = self.refs.fetch_sub(1, Ordering::SeqCst) - 1;
        if after == 0 {
            return self.unlink_and_unaccount();
        }
        Ok(())
    }

    fn unlink_and_unaccount(&self) -> Result<()> {
        self.wg.wait();

        let (mem, level, order) = {
            let mut reader = self.reader.write().unwrap();
            let path = reader.path().to_path_buf();
            let mem = reader.in_mem_size();
            let _ = reader.close();

            tracing::debug!(file = %path.display(), "removing table file");
            let _lock =
                FileLock::acquire(&self.lock_path).map_err(|e| Error::io(&self.lock_path, e))?;
            match std::fs::remove_file(&path) {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    let err = Error::io(&path, e);
                    tracing::error!(error = %err, "failed to remove table file");
                    return Err(err);
                }
            }
            (mem, self.name.level(), self.name.order())
        };

        if mem > 0 {
            let (order_mem, unorder_mem) = if order { (mem, 0) } else { (0, mem) };
            self.registry.add_mem(level, -mem, -order_mem, -unorder_mem);
            self.registry.remove(level, self);
        }
        Ok(())
    }

    /// Stop the file, drop the set's reference, wait out readers and close
    /// the reader. The file stays on disk. Cached bytes of committed files
    /// are un-accounted; temp files were never accounted.
    pub fn close(self: &Arc<Self>) -> Result<()> {
        self.stop();

        let (mem, level, order, tmp) = {
            let reader = self.reader.read().unwrap();
            (
                reader.in_mem_size(),
                self.name.level(),
                self.name.order(),
                is_temp_file(&reader.name()),
            )
        };

        self.refs.fetch_sub(1, Ordering::SeqCst);
        self.wg.wait();
        self.reader.write().unwrap().close()?;

        if mem > 0 && !tmp {
            let (order_mem, unorder_mem) = if order { (mem, 0) } else { (0, mem) };
            self.registry.add_mem(level, -mem, -order_mem, -unorder_mem);
            self.registry.remove(level, self);
        }
        Ok(())
    }

    // --- Delegated surface -------------------------------------------------
    //
    // Declared on the file type for the query layer's benefit, implemented
    // by sibling subsystems. They fail loudly instead of trapping so the
    // caller can bind them higher up.

    pub fn read(&self, _id: u64, _tr: TimeRange, _dst: &mut Record) -> Result<()> {
        Err(Error::Unsupported(
            "series reads are assembled by the query engine from chunk metas and segments"
                .to_string(),
        ))
    }

    pub fn delete(&self, _ids: &[u64]) -> Result<()> {
        Err(Error::Unsupported(
            "tombstones are written by the engine's delete path".to_string(),
        ))
    }

    pub fn delete_range(&self, _ids: &[u64], _min: i64, _max: i64) -> Result<()> {
        Err(Error::Unsupported(
            "tombstones are written by the engine's delete path".to_string(),
        ))
    }

    pub fn has_tombstones(&self) -> Result<bool> {
        Err(Error::Unsupported(
            "tombstone state is tracked by the engine's delete path".to_string(),
        ))
    }

    pub fn tombstone_files(&self) -> Result<Vec<PathBuf>> {
        Err(Error::Unsupported(
            "tombstone state is tracked by the engine's delete path".to_string(),
        ))
    }
}

/// Scoped reference + reader pin, released together on drop on every path.
pub struct UsageGuard {
    file: Arc<TableFile>,
}

impl UsageGuard {
    pub fn file(&self) -> &Arc<TableFile> {
        &self.file
    }
}

impl Drop for UsageGuard {
    fn drop(&mut self) {
        self.file.unpin_reader();
        self.file.release();
    }
}

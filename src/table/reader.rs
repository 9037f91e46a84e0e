//! Read-side access to one immutable table file.
//!
//! The reader owns the OS handle and the decoded components (trailer,
//! meta-index, optionally all chunk metas) and serves block and point
//! reads. The data section can be loaded into an in-memory cache sized by a
//! power-of-two bucket; point reads are then served without touching the
//! descriptor. The handle itself can be dropped under descriptor pressure
//! and is reopened lazily on the next read.
//!
//! Interior mutability is limited to the handle slot and the pin count:
//! everything that mutates the cache or the components goes through `&mut
//! self`, which the owning table file only hands out under its exclusive
//! lock.

use std::fs::File;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::RwLock;

use crate::error::{Error, Result};
use crate::record::{ReadContext, Record, TimeRange};

use super::format::{
    cache_bucket_size, decode_chunk_meta_block, decode_segment, ChunkMeta, MetaIndex, Trailer,
    META_INDEX_ENTRY_SIZE, TRAILER_SIZE,
};

/// Series-id / time / row-count triples extracted from every chunk meta of
/// a file. The engine replays these into its series index on startup. The
/// buffers are reused across files.
#[derive(Debug, Default)]
pub struct IdTimePairs {
    pub ids: Vec<u64>,
    pub times: Vec<i64>,
    pub rows: Vec<u64>,
}

impl IdTimePairs {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.ids.is_empty()
    }

    pub fn reset(&mut self) {
        self.ids.clear();
        self.times.clear();
        self.rows.clear();
    }

    fn push(&mut self, id: u64, max_time: i64, rows: u64) {
        self.ids.push(id);
        self.times.push(max_time);
        self.rows.push(rows);
    }
}

pub struct FileReader {
    path: PathBuf,
    /// Lazily re-opened after `free_file_handle`.
    handle: RwLock<Option<File>>,
    file_size: u64,
    trailer: Trailer,
    /// Sorted by `min_id`, non-overlapping.
    meta_index: Vec<MetaIndex>,
    /// All chunk metas in file order; empty until `load_components`.
    chunk_metas: Vec<ChunkMeta>,
    /// Data-section cache; empty when not resident.
    cache: Vec<u8>,
    in_mem_size: i64,
    /// Pinned cache users; `free_memory` refuses while nonzero.
    pins: AtomicI32,
}

impl FileReader {
    /// Open a table file: reads and validates the trailer and the
    /// meta-index. Chunk metas and data stay on disk until
    /// [`FileReader::load_components`] / [`FileReader::load_into_memory`].
    pub fn open(path: &Path) -> Result<FileReader> {
        let file = File::open(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                Error::NotFound(path.display().to_string())
            } else {
                Error::io(path, e)
            }
        })?;
        let file_size = file.metadata().map_err(|e| Error::io(path, e))?.len();
        let path_str = path.display().to_string();

        let corrupt_trailer = |detail: &str| Error::CorruptTrailer {
            path: path_str.clone(),
            detail: detail.to_string(),
        };

        if file_size < TRAILER_SIZE as u64 {
            return Err(corrupt_trailer("file too small for trailer"));
        }

        let mut buf = vec![0u8; TRAILER_SIZE];
        read_exact_at(&file, &mut buf, file_size - TRAILER_SIZE as u64)
            .map_err(|e| Error::io(path, e))?;
        let trailer = Trailer::decode(&buf, &path_str)?;

        if trailer.index_offset + trailer.index_size + TRAILER_SIZE as u64 != file_size {
            return Err(corrupt_trailer("sections do not span the file"));
        }

        let meta_index = Self::read_meta_index(&file, path, &trailer)?;

        Ok(FileReader {
            path: path.to_path_buf(),
            handle: RwLock::new(Some(file)),
            file_size,
            trailer,
            meta_index,
            chunk_metas: Vec::new(),
            cache: Vec::new(),
            in_mem_size: 0,
            pins: AtomicI32::new(0),
        })
    }

    fn read_meta_index(file: &File, path: &Path, trailer: &Trailer) -> Result<Vec<MetaIndex>> {
        let mut buf = vec![0u8; trailer.index_size as usize];
        read_exact_at(file, &mut buf, trailer.index_offset).map_err(|e| Error::io(path, e))?;

        let meta_end = trailer.index_offset;
        let meta_start = trailer.data_offset + trailer.data_size;
        let mut entries: Vec<MetaIndex> = Vec::with_capacity(trailer.index_items as usize);
        for i in 0..trailer.index_items as usize {
            let at = i * META_INDEX_ENTRY_SIZE;
            let entry_offset = trailer.index_offset + at as u64;
            let entry = MetaIndex::decode(&buf[at..at + META_INDEX_ENTRY_SIZE], entry_offset)?;

            let corrupt = |detail: &str| Error::CorruptMetaIndex {
                offset: entry_offset,
                detail: detail.to_string(),
            };
            if entry.offset < meta_start || entry.offset + entry.size as u64 > meta_end {
                return Err(corrupt("chunk-meta block outside meta section"));
            }
            if let Some(prev) = entries.last() {
                if entry.min_id <= prev.max_id {
                    return Err(corrupt("entries overlap or out of order"));
                }
            }
            entries.push(entry);
        }
        Ok(entries)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Basename of the underlying file.
    pub fn name(&self) -> String {
        self.path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    pub fn trailer(&self) -> &Trailer {
        &self.trailer
    }

    pub fn version(&self) -> u64 {
        self.trailer.version
    }

    pub fn create_time(&self) -> i64 {
        self.trailer.create_time
    }

    pub fn in_mem_size(&self) -> i64 {
        self.in_mem_size
    }

    pub fn meta_index_item_num(&self) -> usize {
        self.meta_index.len()
    }

    /// Pre-size the cache bucket so a later `load_into_memory` does not
    /// reallocate on the load path.
    pub(crate) fn reserve_cache(&mut self) {
        let bucket = cache_bucket_size(self.trailer.data_size);
        self.cache.reserve(bucket);
    }

    /// Pin the cache: while pinned, `free_memory` is refused so pointers a
    /// reader took into cached blocks stay valid across calls.
    pub fn pin(&self) {
        self.pins.fetch_add(1, Ordering::SeqCst);
    }

    pub fn unpin(&self) {
        if self.pins.fetch_sub(1, Ordering::SeqCst) <= 0 {
            panic!("reader unpinned more times than pinned");
        }
    }

    pub fn pinned(&self) -> bool {
        self.pins.load(Ordering::SeqCst) > 0
    }

    /// Binary-search the meta-index for the first entry that could contain
    /// `id` within `tr`. Returns the entry position and a copy of the
    /// entry; `None` is a miss (series absent, or no time overlap).
    pub fn meta_index(&self, id: u64, tr: TimeRange) -> Option<(usize, MetaIndex)> {
        let idx = self.meta_index.partition_point(|e| e.max_id < id);
        let entry = self.meta_index.get(idx)?;
        if !entry.contains_id(id) {
            return None;
        }
        if !entry.time_range().overlaps(&tr) {
            return None;
        }
        Some((idx, *entry))
    }

    pub fn meta_index_at(&self, idx: usize) -> Result<&MetaIndex> {
        self.meta_index.get(idx).ok_or(Error::OutOfRange {
            index: idx,
            count: self.meta_index.len(),
        })
    }

    /// Direct chunk-meta accessor over the flattened, file-ordered list;
    /// requires `load_components`.
    pub fn chunk_meta_at(&self, idx: usize) -> Result<&ChunkMeta> {
        self.chunk_metas.get(idx).ok_or(Error::OutOfRange {
            index: idx,
            count: self.chunk_metas.len(),
        })
    }

    /// Decode the chunk meta of `id` from the block described by
    /// `(offset, size, item_count)` into `dst`. `buf` is reusable scratch
    /// for the block bytes. Returns false when the block does not contain
    /// the series.
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
        if meta_idx >= self.meta_index.len() {
            return Err(Error::OutOfRange {
                index: meta_idx,
                count: self.meta_index.len(),
            });
        }

        self.read_region(offset, size as usize, buf)?;

        let corrupt = |detail: String| Error::CorruptChunkMeta { offset, detail };
        if buf.len() < 4 {
            return Err(corrupt("truncated block".to_string()));
        }
        let stored = u32::from_be_bytes(buf[..4].try_into().unwrap());
        if super::format::CRC32.checksum(&buf[4..]) != stored {
            return Err(corrupt("block checksum mismatch".to_string()));
        }

        let mut pos = 4usize;
        for _ in 0..item_count {
            if pos >= buf.len() {
                return Err(corrupt("fewer chunk metas than item count".to_string()));
            }
            pos += ChunkMeta::decode_into(&buf[pos..], offset + pos as u64, dst)?;
            if dst.id == id {
                return Ok(true);
            }
            if dst.id > id {
                break;
            }
        }
        Ok(false)
    }

    /// Bulk-read every chunk meta of one meta-index entry into `dst`.
    pub fn read_chunk_meta_data(
        &self,
        meta_idx: usize,
        mi: &MetaIndex,
        dst: &mut Vec<ChunkMeta>,
    ) -> Result<()> {
        if meta_idx >= self.meta_index.len() {
            return Err(Error::OutOfRange {
                index: meta_idx,
                count: self.meta_index.len(),
            });
        }
        let mut buf = Vec::with_capacity(mi.size as usize);
        self.read_region(mi.offset, mi.size as usize, &mut buf)?;
        decode_chunk_meta_block(&buf, mi.offset, mi.count, dst)
    }

    /// Raw byte read from the data section, served from the cache when the
    /// file is resident.
    pub fn read_data(&self, offset: u64, size: u32, dst: &mut Vec<u8>) -> Result<()> {
        let size = size as usize;
        let data_end = self.trailer.data_offset + self.trailer.data_size;
        if offset < self.trailer.data_offset || offset + size as u64 > data_end {
            return Err(Error::OutOfRange {
                index: (offset + size as u64) as usize,
                count: data_end as usize,
            });
        }

        if !self.cache.is_empty() {
            let at = (offset - self.trailer.data_offset) as usize;
            dst.clear();
            dst.extend_from_slice(&self.cache[at..at + size]);
            return Ok(());
        }

        self.read_region(offset, size, dst)
    }

    /// Decode the `segment`-th segment of `cm` into `dst`.
    pub fn read_at(
        &self,
        cm: &ChunkMeta,
        segment: usize,
        dst: &mut Record,
        ctx: &mut ReadContext,
    ) -> Result<()> {
        let seg = cm.segments.get(segment).ok_or(Error::OutOfRange {
            index: segment,
            count: cm.segment_count(),
        })?;
        let mut buf = std::mem::take(&mut ctx.buf);
        let res = self
            .read_data(seg.offset, seg.size, &mut buf)
            .and_then(|_| decode_segment(&buf, seg.offset, dst));
        ctx.buf = buf;
        res
    }

    /// Fast negative check: true when the file may contain the series.
    pub fn contains(&self, id: u64) -> bool {
        if self.trailer.chunk_count == 0 {
            return false;
        }
        if id < self.trailer.min_id || id > self.trailer.max_id {
            return false;
        }
        let idx = self.meta_index.partition_point(|e| e.max_id < id);
        self.meta_index
            .get(idx)
            .is_some_and(|e| e.contains_id(id))
    }

    /// Fast negative check: true when the file may contain values for the
    /// series within `tr`.
    pub fn contains_value(&self, id: u64, tr: TimeRange) -> bool {
        self.meta_index(id, tr).is_some()
    }

    /// Fast negative check against the trailer time bounds.
    pub fn contains_time(&self, tr: TimeRange) -> bool {
        self.trailer.chunk_count > 0 && self.trailer.time_range().overlaps(&tr)
    }

    /// Read every chunk-meta block into memory (data stays on disk).
    /// Idempotent.
    pub fn load_components(&mut self) -> Result<()> {
        if !self.chunk_metas.is_empty() {
            return Ok(());
        }
        let mut block = Vec::new();
        let mut all = Vec::with_capacity(self.trailer.chunk_count as usize);
        for mi in &self.meta_index {
            let mut buf = Vec::with_capacity(mi.size as usize);
            self.read_region(mi.offset, mi.size as usize, &mut buf)?;
            decode_chunk_meta_block(&buf, mi.offset, mi.count, &mut block)?;
            all.append(&mut block);
        }
        self.chunk_metas = all;
        Ok(())
    }

    /// Read the whole data section into the cache. Idempotent; returns the
    /// bytes newly admitted (0 when already resident or empty).
    pub fn load_into_memory(&mut self) -> Result<i64> {
        if self.in_mem_size > 0 || self.trailer.data_size == 0 {
            return Ok(0);
        }

        let bucket = cache_bucket_size(self.trailer.data_size);
        let mut cache = std::mem::take(&mut self.cache);
        if cache.capacity() < bucket {
            cache.reserve(bucket - cache.len());
        }
        cache.resize(self.trailer.data_size as usize, 0);
        if let Err(e) = self.read_region_into(self.trailer.data_offset, &mut cache) {
            self.cache = Vec::new();
            return Err(e);
        }

        self.cache = cache;
        self.in_mem_size = self.cache.capacity() as i64;
        Ok(self.in_mem_size)
    }

    /// Drop the data cache, keeping handle and components. Refused (returns
    /// 0) while the cache is pinned.
    pub fn free_memory(&mut self) -> i64 {
        if self.pinned() {
            return 0;
        }
        let size = self.in_mem_size;
        if size == 0 {
            return 0;
        }
        self.cache = Vec::new();
        self.in_mem_size = 0;
        size
    }

    /// Drop the OS handle, keeping components; the next read reopens it.
    pub fn free_file_handle(&self) -> Result<()> {
        *self.handle.write().unwrap() = None;
        Ok(())
    }

    /// Move the file on disk. The caller holds the advisory lock and the
    /// file's exclusive lock.
    pub fn rename(&mut self, new_path: &Path) -> Result<()> {
        std::fs::rename(&self.path, new_path).map_err(|e| Error::io(&self.path, e))?;
        self.path = new_path.to_path_buf();
        // Any held handle still points at the renamed inode; a lazy reopen
        // after free_file_handle resolves the new path.
        Ok(())
    }

    /// Close the OS handle. Cache accounting is the owner's concern and is
    /// snapshotted before this call.
    pub fn close(&mut self) -> Result<()> {
        *self.handle.write().unwrap() = None;
        Ok(())
    }

    pub fn min_max_time(&self) -> (i64, i64) {
        (self.trailer.min_time, self.trailer.max_time)
    }

    pub fn min_max_series_id(&self) -> (u64, u64) {
        (self.trailer.min_id, self.trailer.max_id)
    }

    pub fn average_chunk_rows(&self) -> usize {
        if self.trailer.chunk_count == 0 {
            return 0;
        }
        (self.trailer.row_count / self.trailer.chunk_count) as usize
    }

    pub fn max_chunk_rows(&self) -> usize {
        self.trailer.max_chunk_rows as usize
    }

    /// Extract `(series id, max time, rows)` from every chunk meta into
    /// `pairs`, block by block.
    pub fn load_id_times(&self, pairs: &mut IdTimePairs) -> Result<()> {
        let mut block = Vec::new();
        let mut buf = Vec::new();
        for mi in &self.meta_index {
            self.read_region(mi.offset, mi.size as usize, &mut buf)?;
            decode_chunk_meta_block(&buf, mi.offset, mi.count, &mut block)?;
            for meta in &block {
                let max_time = meta.time_range().map(|tr| tr.max).unwrap_or(i64::MIN);
                pairs.push(meta.id, max_time, meta.rows as u64);
            }
        }
        Ok(())
    }

    fn read_region(&self, offset: u64, size: usize, dst: &mut Vec<u8>) -> Result<()> {
        dst.clear();
        dst.resize(size, 0);
        self.read_region_into(offset, dst)
    }

    fn read_region_into(&self, offset: u64, dst: &mut [u8]) -> Result<()> {
        if offset + dst.len() as u64 > self.file_size {
            return Err(Error::OutOfRange {
                index: (offset + dst.len() as u64) as usize,
                count: self.file_size as usize,
            });
        }

        // Fast path: shared access to an open handle; pread needs no seek
        // state so concurrent readers share one descriptor.
        {
            let handle = self.handle.read().unwrap();
            if let Some(file) = handle.as_ref() {
                return read_exact_at(file, dst, offset).map_err(|e| Error::io(&self.path, e));
            }
        }

        // Handle was freed; reopen it once under the write lock.
        let mut handle = self.handle.write().unwrap();
        if handle.is_none() {
            tracing::debug!(path = %self.path.display(), "reopening freed file handle");
            let file = File::open(&self.path).map_err(|e| {
                if e.kind() == std::io::ErrorKind::NotFound {
                    Error::NotFound(self.path.display().to_string())
                } else {
                    Error::io(&self.path, e)
                }
            })?;
            *handle = Some(file);
        }
        read_exact_at(handle.as_ref().unwrap(), dst, offset).map_err(|e| Error::io(&self.path, e))
    }
}

#[cfg(unix)]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::os::unix::fs::FileExt;
    file.read_exact_at(buf, offset)
}

#[cfg(not(unix))]
fn read_exact_at(file: &File, buf: &mut [u8], offset: u64) -> std::io::Result<()> {
    use std::io::{Read, Seek, SeekFrom};
    let mut file = file.try_clone()?;
    file.seek(SeekFrom::Start(offset))?;
    file.read_exact(buf)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::fixture::{series, write_file};

    fn open_sample(dir: &Path) -> FileReader {
        let path = dir.join("00000001-0000-0000-0000.tssp");
        write_file(
            &path,
            &[
                series(10, &[(100, 1.0), (200, 2.0), (300, 3.0)]),
                series(20, &[(150, 1.5), (250, 2.5)]),
                series(30, &[(400, 4.0)]),
                series(40, &[(500, 5.0), (600, 6.0)]),
            ],
        );
        FileReader::open(&path).unwrap()
    }

    #[test]
    fn test_open_validates_trailer() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        assert_eq!(reader.min_max_series_id(), (10, 40));
        assert_eq!(reader.min_max_time(), (100, 600));
        assert_eq!(reader.version(), super::super::format::VERSION);
        assert_eq!(reader.trailer().chunk_count, 4);
        assert_eq!(reader.trailer().row_count, 8);
        assert_eq!(reader.average_chunk_rows(), 2);
        assert_eq!(reader.max_chunk_rows(), 3);
    }

    #[test]
    fn test_open_rejects_truncated_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("bad.tssp");
        std::fs::write(&path, b"short").unwrap();
        assert!(matches!(
            FileReader::open(&path),
            Err(Error::CorruptTrailer { .. })
        ));
    }

    #[test]
    fn test_open_missing_file_is_not_found() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("gone.tssp");
        assert!(matches!(FileReader::open(&path), Err(Error::NotFound(_))));
    }

    #[test]
    fn test_meta_index_search() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        // hit
        let (pos, entry) = reader.meta_index(20, TimeRange::unbound()).unwrap();
        assert_eq!(pos, 0);
        assert!(entry.contains_id(20));

        let (pos, _) = reader.meta_index(40, TimeRange::unbound()).unwrap();
        assert_eq!(pos, 1);

        // absent id between blocks and out of range
        assert!(reader.meta_index(25, TimeRange::unbound()).is_none());
        assert!(reader.meta_index(99, TimeRange::unbound()).is_none());

        // time miss
        assert!(reader.meta_index(20, TimeRange::new(10_000, 20_000)).is_none());

        // accessor bounds
        assert!(reader.meta_index_at(1).is_ok());
        assert!(matches!(
            reader.meta_index_at(2),
            Err(Error::OutOfRange { index: 2, count: 2 })
        ));
    }

    #[test]
    fn test_chunk_meta_lookup_and_point_read() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        let (pos, entry) = reader.meta_index(10, TimeRange::unbound()).unwrap();
        let mut cm = ChunkMeta::default();
        let mut scratch = Vec::new();
        let found = reader
            .chunk_meta(10, entry.offset, entry.size, entry.count, pos, &mut cm, &mut scratch)
            .unwrap();
        assert!(found);
        assert_eq!(cm.id, 10);
        assert_eq!(cm.rows, 3);

        let mut rec = Record::new();
        let mut ctx = ReadContext::new();
        reader.read_at(&cm, 0, &mut rec, &mut ctx).unwrap();
        assert_eq!(rec.times, vec![100, 200, 300]);
        assert_eq!(rec.values, vec![1.0, 2.0, 3.0]);

        // bounded error on bad segment index
        let err = reader.read_at(&cm, 5, &mut rec, &mut ctx).unwrap_err();
        assert!(matches!(err, Error::OutOfRange { index: 5, count: 1 }));

        // miss inside an existing block
        let found = reader
            .chunk_meta(15, entry.offset, entry.size, entry.count, pos, &mut cm, &mut scratch)
            .unwrap();
        assert!(!found);
    }

    #[test]
    fn test_read_chunk_meta_data_bulk() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        let entry = *reader.meta_index_at(0).unwrap();
        let mut metas = Vec::new();
        reader.read_chunk_meta_data(0, &entry, &mut metas).unwrap();
        assert_eq!(metas.iter().map(|m| m.id).collect::<Vec<_>>(), vec![10, 20]);
    }

    #[test]
    fn test_load_components_enables_direct_access() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = open_sample(dir.path());

        assert!(reader.chunk_meta_at(0).is_err());
        reader.load_components().unwrap();
        reader.load_components().unwrap(); // idempotent

        assert_eq!(reader.chunk_meta_at(0).unwrap().id, 10);
        assert_eq!(reader.chunk_meta_at(3).unwrap().id, 40);
        assert!(matches!(
            reader.chunk_meta_at(4),
            Err(Error::OutOfRange { index: 4, count: 4 })
        ));
    }

    #[test]
    fn test_load_into_memory_serves_cached_reads() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = open_sample(dir.path());

        let entry = *reader.meta_index_at(0).unwrap();
        let mut metas = Vec::new();
        reader.read_chunk_meta_data(0, &entry, &mut metas).unwrap();
        let cm = metas[0].clone();

        let mut from_disk = Vec::new();
        reader
            .read_data(cm.segments[0].offset, cm.segments[0].size, &mut from_disk)
            .unwrap();

        let added = reader.load_into_memory().unwrap();
        assert!(added > 0);
        assert_eq!(reader.in_mem_size(), added);
        assert_eq!(reader.load_into_memory().unwrap(), 0); // idempotent

        let mut from_cache = Vec::new();
        reader
            .read_data(cm.segments[0].offset, cm.segments[0].size, &mut from_cache)
            .unwrap();
        assert_eq!(from_cache, from_disk);
    }

    #[test]
    fn test_free_memory_respects_pins() {
        let dir = tempfile::tempdir().unwrap();
        let mut reader = open_sample(dir.path());

        reader.load_into_memory().unwrap();
        let size = reader.in_mem_size();
        assert!(size > 0);

        reader.pin();
        assert_eq!(reader.free_memory(), 0);
        assert_eq!(reader.in_mem_size(), size);

        reader.unpin();
        assert_eq!(reader.free_memory(), size);
        assert_eq!(reader.in_mem_size(), 0);
        assert_eq!(reader.free_memory(), 0);
    }

    #[test]
    fn test_free_file_handle_reopens_lazily() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        reader.free_file_handle().unwrap();

        let entry = *reader.meta_index_at(0).unwrap();
        let mut metas = Vec::new();
        reader.read_chunk_meta_data(0, &entry, &mut metas).unwrap();
        assert_eq!(metas.len(), 2);
    }

    #[test]
    fn test_contains_checks() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        assert!(reader.contains(10));
        assert!(reader.contains(40));
        assert!(!reader.contains(9));
        assert!(!reader.contains(25));
        assert!(!reader.contains(41));

        assert!(reader.contains_value(20, TimeRange::new(0, 10_000)));
        assert!(!reader.contains_value(20, TimeRange::new(10_000, 20_000)));

        assert!(reader.contains_time(TimeRange::new(600, 700)));
        assert!(!reader.contains_time(TimeRange::new(601, 700)));
    }

    #[test]
    fn test_load_id_times() {
        let dir = tempfile::tempdir().unwrap();
        let reader = open_sample(dir.path());

        let mut pairs = IdTimePairs::new();
        reader.load_id_times(&mut pairs).unwrap();
        assert_eq!(pairs.ids, vec![10, 20, 30, 40]);
        assert_eq!(pairs.times, vec![300, 250, 400, 600]);
        assert_eq!(pairs.rows, vec![3, 2, 1, 2]);
    }
}

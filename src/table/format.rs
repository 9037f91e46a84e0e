//! Binary layout of an immutable table file.
//!
//! A table file has three sections followed by a fixed-size trailer:
//!
//! ```text
//! +--------------------+
//! | Data section       |  segments, per series chunk
//! +--------------------+
//! | Chunk-meta blocks  |  per-series descriptors, grouped and checksummed
//! +--------------------+
//! | Meta-index         |  fixed 48-byte entries, sorted by series id
//! +--------------------+
//! | Trailer (112 bytes)|  offsets, stats, min/max bounds, checksum
//! +--------------------+
//! ```
//!
//! ## Segment Format
//!
//! ```text
//! +---------+---------+----------------+-----------------+
//! |crc32:u32| rows:u32| times:i64×rows | values:f64×rows |
//! +---------+---------+----------------+-----------------+
//! ```
//!
//! ## Chunk-Meta Block Format
//!
//! ```text
//! +---------+--------------+--------------+-----+
//! |crc32:u32| chunk meta 1 | chunk meta 2 | ... |   sorted by series id
//! +---------+--------------+--------------+-----+
//! ```
//!
//! Each chunk meta is a 28-byte header (`id:u64 | offset:u64 | size:u32 |
//! rows:u32 | segments:u32`) followed by 28 bytes per segment
//! (`offset:u64 | size:u32 | min_time:i64 | max_time:i64`).
//!
//! All integers are big-endian. Checksums are CRC32-Castagnoli and cover
//! everything after the checksum itself. The writer subsystem emits this
//! layout; this module is the shared bit-level contract between the two.

use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt, WriteBytesExt};
use crc::{Crc, CRC_32_ISCSI};

use crate::error::{Error, Result};
use crate::record::{Record, TimeRange};

/// First four bytes of the trailer, "TSSP".
pub const MAGIC: u32 = 0x5453_5350;

/// Current version of the table file format.
pub const VERSION: u64 = 1;

pub const CRC32: Crc<u32> = Crc::<u32>::new(&CRC_32_ISCSI);

/// Size in bytes of the fixed trailer at the end of every file.
pub const TRAILER_SIZE: usize = 112;

/// Size in bytes of one meta-index entry.
pub const META_INDEX_ENTRY_SIZE: usize = 48;

/// Size in bytes of a chunk-meta header, excluding its segment descriptors.
pub const CHUNK_META_HEADER_SIZE: usize = 28;

/// Size in bytes of one segment descriptor inside a chunk meta.
pub const SEGMENT_META_SIZE: usize = 28;

/// Size in bytes of a segment header (checksum + row count).
pub const SEGMENT_HEADER_SIZE: usize = 8;

/// Fixed footer describing the file: section offsets and sizes, chunk/row
/// statistics and the min/max series id and time bounds used for fast
/// negative checks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Trailer {
    pub version: u64,
    /// Unix nanoseconds at which the writer sealed the file.
    pub create_time: i64,
    pub data_offset: u64,
    pub data_size: u64,
    /// Offset of the meta-index section.
    pub index_offset: u64,
    pub index_size: u64,
    /// Number of meta-index entries.
    pub index_items: u32,
    /// Total chunks (series) in the file.
    pub chunk_count: u64,
    /// Total rows across all chunks.
    pub row_count: u64,
    pub max_chunk_rows: u32,
    pub min_id: u64,
    pub max_id: u64,
    pub min_time: i64,
    pub max_time: i64,
}

impl Trailer {
    pub fn encode(&self, dst: &mut Vec<u8>) {
        let start = dst.len();
        dst.write_u32::<BigEndian>(MAGIC).unwrap();
        dst.write_u64::<BigEndian>(self.version).unwrap();
        dst.write_i64::<BigEndian>(self.create_time).unwrap();
        dst.write_u64::<BigEndian>(self.data_offset).unwrap();
        dst.write_u64::<BigEndian>(self.data_size).unwrap();
        dst.write_u64::<BigEndian>(self.index_offset).unwrap();
        dst.write_u64::<BigEndian>(self.index_size).unwrap();
        dst.write_u32::<BigEndian>(self.index_items).unwrap();
        dst.write_u64::<BigEndian>(self.chunk_count).unwrap();
        dst.write_u64::<BigEndian>(self.row_count).unwrap();
        dst.write_u32::<BigEndian>(self.max_chunk_rows).unwrap();
        dst.write_u64::<BigEndian>(self.min_id).unwrap();
        dst.write_u64::<BigEndian>(self.max_id).unwrap();
        dst.write_i64::<BigEndian>(self.min_time).unwrap();
        dst.write_i64::<BigEndian>(self.max_time).unwrap();
        let crc = CRC32.checksum(&dst[start..]);
        dst.write_u32::<BigEndian>(crc).unwrap();
    }

    /// Decode and structurally validate a trailer. `path` is carried into
    /// errors for context; size consistency against the whole file is
    /// checked by the reader, which knows the file length.
    pub fn decode(buf: &[u8], path: &str) -> Result<Trailer> {
        let corrupt = |detail: &str| Error::CorruptTrailer {
            path: path.to_string(),
            detail: detail.to_string(),
        };

        if buf.len() < TRAILER_SIZE {
            return Err(corrupt("file too small for trailer"));
        }
        let buf = &buf[buf.len() - TRAILER_SIZE..];

        let expected = CRC32.checksum(&buf[..TRAILER_SIZE - 4]);
        let stored = u32::from_be_bytes(buf[TRAILER_SIZE - 4..].try_into().unwrap());
        if expected != stored {
            return Err(corrupt("trailer checksum mismatch"));
        }

        let mut cur = Cursor::new(buf);
        let magic = cur.read_u32::<BigEndian>().unwrap();
        if magic != MAGIC {
            return Err(corrupt("bad magic"));
        }

        let trailer = Trailer {
            version: cur.read_u64::<BigEndian>().unwrap(),
            create_time: cur.read_i64::<BigEndian>().unwrap(),
            data_offset: cur.read_u64::<BigEndian>().unwrap(),
            data_size: cur.read_u64::<BigEndian>().unwrap(),
            index_offset: cur.read_u64::<BigEndian>().unwrap(),
            index_size: cur.read_u64::<BigEndian>().unwrap(),
            index_items: cur.read_u32::<BigEndian>().unwrap(),
            chunk_count: cur.read_u64::<BigEndian>().unwrap(),
            row_count: cur.read_u64::<BigEndian>().unwrap(),
            max_chunk_rows: cur.read_u32::<BigEndian>().unwrap(),
            min_id: cur.read_u64::<BigEndian>().unwrap(),
            max_id: cur.read_u64::<BigEndian>().unwrap(),
            min_time: cur.read_i64::<BigEndian>().unwrap(),
            max_time: cur.read_i64::<BigEndian>().unwrap(),
        };

        if trailer.version != VERSION {
            return Err(corrupt(&format!("unsupported version {}", trailer.version)));
        }
        if trailer.index_size != trailer.index_items as u64 * META_INDEX_ENTRY_SIZE as u64 {
            return Err(corrupt("meta-index size does not match item count"));
        }
        if trailer.index_offset < trailer.data_offset + trailer.data_size {
            return Err(corrupt("meta-index overlaps data section"));
        }
        if trailer.chunk_count > 0 && (trailer.min_id > trailer.max_id) {
            return Err(corrupt("series id bounds inverted"));
        }
        if trailer.chunk_count > 0 && (trailer.min_time > trailer.max_time) {
            return Err(corrupt("time bounds inverted"));
        }

        Ok(trailer)
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.min_time, self.max_time)
    }
}

/// One meta-index entry: the series-id and time bounds of a chunk-meta
/// block, plus where that block lives.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MetaIndex {
    pub min_id: u64,
    pub max_id: u64,
    pub min_time: i64,
    pub max_time: i64,
    /// Offset of the chunk-meta block.
    pub offset: u64,
    /// Size of the chunk-meta block, checksum included.
    pub size: u32,
    /// Number of chunk metas in the block.
    pub count: u32,
}

impl MetaIndex {
    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.write_u64::<BigEndian>(self.min_id).unwrap();
        dst.write_u64::<BigEndian>(self.max_id).unwrap();
        dst.write_i64::<BigEndian>(self.min_time).unwrap();
        dst.write_i64::<BigEndian>(self.max_time).unwrap();
        dst.write_u64::<BigEndian>(self.offset).unwrap();
        dst.write_u32::<BigEndian>(self.size).unwrap();
        dst.write_u32::<BigEndian>(self.count).unwrap();
    }

    /// Decode one entry. `offset` is the entry's file offset, for error
    /// context only.
    pub fn decode(buf: &[u8], offset: u64) -> Result<MetaIndex> {
        let corrupt = |detail: &str| Error::CorruptMetaIndex {
            offset,
            detail: detail.to_string(),
        };

        if buf.len() < META_INDEX_ENTRY_SIZE {
            return Err(corrupt("truncated entry"));
        }

        let mut cur = Cursor::new(buf);
        let entry = MetaIndex {
            min_id: cur.read_u64::<BigEndian>().unwrap(),
            max_id: cur.read_u64::<BigEndian>().unwrap(),
            min_time: cur.read_i64::<BigEndian>().unwrap(),
            max_time: cur.read_i64::<BigEndian>().unwrap(),
            offset: cur.read_u64::<BigEndian>().unwrap(),
            size: cur.read_u32::<BigEndian>().unwrap(),
            count: cur.read_u32::<BigEndian>().unwrap(),
        };

        if entry.min_id > entry.max_id {
            return Err(corrupt("series id bounds inverted"));
        }
        if entry.min_time > entry.max_time {
            return Err(corrupt("time bounds inverted"));
        }
        if entry.count == 0 {
            return Err(corrupt("empty chunk-meta block"));
        }

        Ok(entry)
    }

    pub fn contains_id(&self, id: u64) -> bool {
        self.min_id <= id && id <= self.max_id
    }

    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.min_time, self.max_time)
    }
}

/// Per-segment descriptor inside a chunk meta.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SegmentMeta {
    pub offset: u64,
    pub size: u32,
    pub min_time: i64,
    pub max_time: i64,
}

impl SegmentMeta {
    pub fn time_range(&self) -> TimeRange {
        TimeRange::new(self.min_time, self.max_time)
    }
}

/// Per-series chunk descriptor: where the chunk's segments live in the data
/// section and what time each covers.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ChunkMeta {
    pub id: u64,
    /// Offset of the chunk's first data byte.
    pub offset: u64,
    /// Total data bytes across all segments.
    pub size: u32,
    pub rows: u32,
    pub segments: Vec<SegmentMeta>,
}

impl ChunkMeta {
    pub fn segment_count(&self) -> usize {
        self.segments.len()
    }

    pub fn encoded_size(&self) -> usize {
        CHUNK_META_HEADER_SIZE + self.segments.len() * SEGMENT_META_SIZE
    }

    /// Time range covered by the chunk: the envelope of its segments.
    pub fn time_range(&self) -> Option<TimeRange> {
        let min = self.segments.iter().map(|s| s.min_time).min()?;
        let max = self.segments.iter().map(|s| s.max_time).max()?;
        Some(TimeRange::new(min, max))
    }

    pub fn encode(&self, dst: &mut Vec<u8>) {
        dst.write_u64::<BigEndian>(self.id).unwrap();
        dst.write_u64::<BigEndian>(self.offset).unwrap();
        dst.write_u32::<BigEndian>(self.size).unwrap();
        dst.write_u32::<BigEndian>(self.rows).unwrap();
        dst.write_u32::<BigEndian>(self.segments.len() as u32).unwrap();
        for seg in &self.segments {
            dst.write_u64::<BigEndian>(seg.offset).unwrap();
            dst.write_u32::<BigEndian>(seg.size).unwrap();
            dst.write_i64::<BigEndian>(seg.min_time).unwrap();
            dst.write_i64::<BigEndian>(seg.max_time).unwrap();
        }
    }

    /// Decode one chunk meta from the front of `buf` into `dst`, reusing its
    /// segment allocation. Returns the number of bytes consumed. `offset` is
    /// the file offset of `buf`, for error context.
    pub fn decode_into(buf: &[u8], offset: u64, dst: &mut ChunkMeta) -> Result<usize> {
        let corrupt = |detail: &str| Error::CorruptChunkMeta {
            offset,
            detail: detail.to_string(),
        };

        if buf.len() < CHUNK_META_HEADER_SIZE {
            return Err(corrupt("truncated chunk meta header"));
        }

        let mut cur = Cursor::new(buf);
        dst.id = cur.read_u64::<BigEndian>().unwrap();
        dst.offset = cur.read_u64::<BigEndian>().unwrap();
        dst.size = cur.read_u32::<BigEndian>().unwrap();
        dst.rows = cur.read_u32::<BigEndian>().unwrap();
        let segments = cur.read_u32::<BigEndian>().unwrap() as usize;

        if segments == 0 {
            return Err(corrupt("chunk meta with no segments"));
        }
        let total = CHUNK_META_HEADER_SIZE + segments * SEGMENT_META_SIZE;
        if buf.len() < total {
            return Err(corrupt("truncated segment descriptors"));
        }

        dst.segments.clear();
        dst.segments.reserve(segments);
        for _ in 0..segments {
            dst.segments.push(SegmentMeta {
                offset: cur.read_u64::<BigEndian>().unwrap(),
                size: cur.read_u32::<BigEndian>().unwrap(),
                min_time: cur.read_i64::<BigEndian>().unwrap(),
                max_time: cur.read_i64::<BigEndian>().unwrap(),
            });
        }

        Ok(total)
    }
}

/// Encode a chunk-meta block: checksum, then the metas in series-id order.
pub fn encode_chunk_meta_block(metas: &[ChunkMeta]) -> Vec<u8> {
    let mut payload = Vec::new();
    for meta in metas {
        meta.encode(&mut payload);
    }
    let mut block = Vec::with_capacity(payload.len() + 4);
    block
        .write_u32::<BigEndian>(CRC32.checksum(&payload))
        .unwrap();
    block.extend_from_slice(&payload);
    block
}

/// Decode a whole chunk-meta block into `dst`, validating the checksum and
/// that exactly `count` metas are present in ascending series-id order.
/// `block_offset` is the block's file offset, for error context.
pub fn decode_chunk_meta_block(
    buf: &[u8],
    block_offset: u64,
    count: u32,
    dst: &mut Vec<ChunkMeta>,
) -> Result<()> {
    let corrupt = |detail: String| Error::CorruptChunkMeta {
        offset: block_offset,
        detail,
    };

    if buf.len() < 4 {
        return Err(corrupt("truncated block".to_string()));
    }
    let stored = u32::from_be_bytes(buf[..4].try_into().unwrap());
    if CRC32.checksum(&buf[4..]) != stored {
        return Err(corrupt("block checksum mismatch".to_string()));
    }

    dst.clear();
    let mut pos = 4usize;
    let mut last_id = 0u64;
    for i in 0..count {
        let mut meta = ChunkMeta::default();
        pos += ChunkMeta::decode_into(&buf[pos..], block_offset + pos as u64, &mut meta)?;
        if i > 0 && meta.id <= last_id {
            return Err(corrupt(format!(
                "series ids out of order: {} after {}",
                meta.id, last_id
            )));
        }
        last_id = meta.id;
        dst.push(meta);
    }
    if pos != buf.len() {
        return Err(corrupt(format!("{} trailing bytes", buf.len() - pos)));
    }

    Ok(())
}

/// Encode one data segment from a record.
pub fn encode_segment(rec: &Record) -> Vec<u8> {
    let mut payload = Vec::with_capacity(4 + rec.len() * 16);
    payload.write_u32::<BigEndian>(rec.len() as u32).unwrap();
    for &t in &rec.times {
        payload.write_i64::<BigEndian>(t).unwrap();
    }
    for &v in &rec.values {
        payload.write_f64::<BigEndian>(v).unwrap();
    }
    let mut seg = Vec::with_capacity(payload.len() + 4);
    seg.write_u32::<BigEndian>(CRC32.checksum(&payload)).unwrap();
    seg.extend_from_slice(&payload);
    seg
}

/// Decode one data segment into `dst`, reusing its allocations. `offset` is
/// the segment's file offset, for error context.
pub fn decode_segment(buf: &[u8], offset: u64, dst: &mut Record) -> Result<()> {
    let corrupt = |detail: String| Error::CorruptSegment { offset, detail };

    if buf.len() < SEGMENT_HEADER_SIZE {
        return Err(corrupt("truncated segment header".to_string()));
    }
    let stored = u32::from_be_bytes(buf[..4].try_into().unwrap());
    if CRC32.checksum(&buf[4..]) != stored {
        return Err(corrupt("segment checksum mismatch".to_string()));
    }

    let mut cur = Cursor::new(&buf[4..]);
    let rows = cur.read_u32::<BigEndian>().unwrap() as usize;
    if buf.len() != SEGMENT_HEADER_SIZE + rows * 16 {
        return Err(corrupt(format!(
            "segment size {} does not match {} rows",
            buf.len(),
            rows
        )));
    }

    dst.clear();
    dst.times.reserve(rows);
    dst.values.reserve(rows);
    for _ in 0..rows {
        dst.times.push(cur.read_i64::<BigEndian>().unwrap());
    }
    for _ in 0..rows {
        dst.values.push(cur.read_f64::<BigEndian>().unwrap());
    }

    Ok(())
}

/// Power-of-two cache bucket for a file's data section, clamped to
/// [4 KiB, 1 GiB]. Sizing the cache by bucket keeps reallocation out of the
/// load path and bounds per-file overshoot to 2x.
pub(crate) fn cache_bucket_size(data_size: u64) -> usize {
    const MIN: u64 = 4 * 1024;
    const MAX: u64 = 1024 * 1024 * 1024;
    data_size.clamp(MIN, MAX).next_power_of_two().min(MAX) as usize
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_trailer() -> Trailer {
        Trailer {
            version: VERSION,
            create_time: 1_700_000_000_000_000_000,
            data_offset: 0,
            data_size: 4096,
            index_offset: 5000,
            index_size: META_INDEX_ENTRY_SIZE as u64 * 2,
            index_items: 2,
            chunk_count: 4,
            row_count: 4000,
            max_chunk_rows: 1500,
            min_id: 7,
            max_id: 900,
            min_time: 100,
            max_time: 9000,
        }
    }

    #[test]
    fn test_trailer_encode_decode() {
        let trailer = sample_trailer();
        let mut buf = Vec::new();
        trailer.encode(&mut buf);
        assert_eq!(buf.len(), TRAILER_SIZE);

        let decoded = Trailer::decode(&buf, "test").unwrap();
        assert_eq!(decoded, trailer);
    }

    #[test]
    fn test_trailer_rejects_corruption() {
        let mut buf = Vec::new();
        sample_trailer().encode(&mut buf);

        // flip a byte in the middle
        buf[20] ^= 0xff;
        let err = Trailer::decode(&buf, "test").unwrap_err();
        assert!(matches!(err, Error::CorruptTrailer { .. }));
        assert!(err.to_string().contains("checksum"));

        // too short
        let err = Trailer::decode(&buf[..40], "test").unwrap_err();
        assert!(matches!(err, Error::CorruptTrailer { .. }));
    }

    #[test]
    fn test_trailer_rejects_inconsistent_index() {
        let mut trailer = sample_trailer();
        trailer.index_size += 1;
        let mut buf = Vec::new();
        trailer.encode(&mut buf);
        assert!(Trailer::decode(&buf, "test").is_err());
    }

    #[test]
    fn test_meta_index_entry_round_trip() {
        let entry = MetaIndex {
            min_id: 10,
            max_id: 20,
            min_time: -5,
            max_time: 100,
            offset: 8192,
            size: 300,
            count: 3,
        };
        let mut buf = Vec::new();
        entry.encode(&mut buf);
        assert_eq!(buf.len(), META_INDEX_ENTRY_SIZE);
        assert_eq!(MetaIndex::decode(&buf, 0).unwrap(), entry);

        assert!(entry.contains_id(10));
        assert!(entry.contains_id(20));
        assert!(!entry.contains_id(21));
    }

    #[test]
    fn test_chunk_meta_block_round_trip() {
        let metas = vec![
            ChunkMeta {
                id: 1,
                offset: 0,
                size: 100,
                rows: 10,
                segments: vec![SegmentMeta {
                    offset: 0,
                    size: 100,
                    min_time: 1,
                    max_time: 10,
                }],
            },
            ChunkMeta {
                id: 5,
                offset: 100,
                size: 200,
                rows: 20,
                segments: vec![
                    SegmentMeta {
                        offset: 100,
                        size: 80,
                        min_time: 1,
                        max_time: 8,
                    },
                    SegmentMeta {
                        offset: 180,
                        size: 120,
                        min_time: 9,
                        max_time: 20,
                    },
                ],
            },
        ];

        let block = encode_chunk_meta_block(&metas);
        let mut decoded = Vec::new();
        decode_chunk_meta_block(&block, 4096, 2, &mut decoded).unwrap();
        assert_eq!(decoded, metas);
        assert_eq!(decoded[1].time_range(), Some(TimeRange::new(1, 20)));
    }

    #[test]
    fn test_chunk_meta_block_rejects_bad_order_and_crc() {
        let meta = |id| ChunkMeta {
            id,
            offset: 0,
            size: 1,
            rows: 1,
            segments: vec![SegmentMeta {
                offset: 0,
                size: 1,
                min_time: 0,
                max_time: 0,
            }],
        };

        let block = encode_chunk_meta_block(&[meta(5), meta(3)]);
        let mut dst = Vec::new();
        let err = decode_chunk_meta_block(&block, 0, 2, &mut dst).unwrap_err();
        assert!(err.to_string().contains("out of order"));

        let mut block = encode_chunk_meta_block(&[meta(1)]);
        let last = block.len() - 1;
        block[last] ^= 0x01;
        let err = decode_chunk_meta_block(&block, 0, 1, &mut dst).unwrap_err();
        assert!(err.to_string().contains("checksum"));
    }

    #[test]
    fn test_segment_round_trip() {
        let mut rec = Record::new();
        for i in 0..100 {
            rec.push(i, i as f64 * 0.5);
        }

        let seg = encode_segment(&rec);
        let mut decoded = Record::new();
        decode_segment(&seg, 0, &mut decoded).unwrap();
        assert_eq!(decoded, rec);

        let mut bad = seg.clone();
        bad[10] ^= 0xff;
        let err = decode_segment(&bad, 77, &mut decoded).unwrap_err();
        assert!(matches!(err, Error::CorruptSegment { offset: 77, .. }));
    }

    #[test]
    fn test_cache_bucket_sizing() {
        assert_eq!(cache_bucket_size(0), 4 * 1024);
        assert_eq!(cache_bucket_size(4096), 4096);
        assert_eq!(cache_bucket_size(4097), 8192);
        assert_eq!(cache_bucket_size(100_000), 131_072);
        assert_eq!(cache_bucket_size(u64::MAX), 1024 * 1024 * 1024);
    }
}

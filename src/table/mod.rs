//! Immutable table files and the machinery that keeps reading them safe
//! while compaction rewrites the world underneath.
//!
//! A table file is produced whole by the writer subsystem (flush or
//! compaction) and never modified afterwards; everything here is about
//! reading it and about retiring it without pulling bytes out from under a
//! concurrent query:
//!
//! ```text
//!   query ──> TableFile ──────> FileReader ──────> disk / block cache
//!             stop flag          trailer
//!             ref + wait-group   meta-index          ┌──────────────┐
//!             rw lock            chunk metas    <────| evict list   |
//!             lru hook           data cache          | (per level)  |
//!                                                    └──────────────┘
//! ```
//!
//! # Lifecycle
//!
//! A file is opened with one reference owned by its set. Readers take a
//! reference (and usually pin the reader cache) for the duration of a
//! query. `remove` stops the file and unlinks it once the final reference
//! is gone; `close` stops it and waits out readers without touching disk.
//!
//! # Locking
//!
//! Reads hold the file's lock shared; `remove`, `close`, `rename` and the
//! load/free operations hold it exclusive. The file lock is never held
//! while taking a level's evict-list lock.

pub mod file;
pub mod format;
pub mod name;
pub mod reader;
pub mod scan;

pub use file::{TableFile, UsageGuard};
pub use format::{ChunkMeta, MetaIndex, SegmentMeta, Trailer};
pub use name::{
    is_temp_file, FileName, COMPACT_LOG_DIR, DOWNSAMPLE_LOG_DIR, OUT_OF_ORDER_DIR, TMP_FILE_SUFFIX,
    TSSP_DIR, TSSP_FILE_SUFFIX,
};
pub use reader::{FileReader, IdTimePairs};
pub use scan::ChunkScan;

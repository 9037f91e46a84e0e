//! Shard-side bookkeeping over table files: the ordered set a query
//! snapshots, the per-level eviction state a memory watcher steers, and the
//! descriptors compaction hands around.
//!
//! # Read path
//!
//! 1. **Snapshot**: take the set's shared lock, reference every member
//! 2. **Read**: drop the set lock, read through each file's own lock
//! 3. **Release**: drop the references; the last one may unlink a removed file
//!
//! # Compaction path
//!
//! 1. **Plan**: enumerate files, gather [`compact::FilesInfo`] stats,
//!    build a [`compact::CompactGroup`]
//! 2. **Swap**: [`files::TableSet::replace`] under the exclusive lock
//! 3. **Retire**: `remove()` each input; the final reader performs the unlink

pub mod compact;
pub mod evict;
pub mod files;
pub mod gc;
pub mod maintenance;

pub use compact::{CompactGroup, CompactGroupPool, FilesInfo};
pub use evict::{EvictRegistry, MAX_LEVELS};
pub use files::TableSet;
pub use gc::FreeQueue;
pub use maintenance::Maintenance;

//! Deferred frees: files that were due for eviction while a query still
//! held them.
//!
//! Eviction never blocks on a reader. A file that is in use when its level
//! comes under pressure is parked here instead; the background drain frees
//! it once it has gone idle. Files still busy at drain time simply go back
//! on the queue.

use std::sync::Arc;

use crossbeam_queue::SegQueue;

use crate::table::TableFile;

pub struct FreeQueue {
    queue: SegQueue<Arc<TableFile>>,
}

impl FreeQueue {
    pub fn new() -> Self {
        Self {
            queue: SegQueue::new(),
        }
    }

    pub fn defer(&self, file: Arc<TableFile>) {
        self.queue.push(file);
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }

    /// One pass over the queue: free files that have gone idle, requeue the
    /// rest. Returns the bytes freed.
    pub fn drain(&self) -> i64 {
        let mut freed = 0i64;
        let pending = self.queue.len();
        for _ in 0..pending {
            let Some(file) = self.queue.pop() else {
                break;
            };
            if file.in_use() {
                self.queue.push(file);
                continue;
            }
            freed += file.free();
        }
        if freed > 0 {
            tracing::debug!(freed = freed, "drained deferred table frees");
        }
        freed
    }
}

impl Default for FreeQueue {
    fn default() -> Self {
        Self::new()
    }
}

use std::sync::atomic::{AtomicBool, Ordering};

/// Abort hook supplied by the query layer.
///
/// Long scans poll the monitor between chunk reads, never inside tight
/// decode loops. A monitor that reports `true` makes the scan return
/// `Error::Aborted` before the next chunk is touched.
pub trait Monitor: Send + Sync {
    fn aborted(&self) -> bool;
}

/// One-shot cancellation flag, the simplest monitor implementation. The
/// query layer keeps one per running statement and trips it on timeout or
/// client disconnect.
#[derive(Debug, Default)]
pub struct CancelSignal {
    flag: AtomicBool,
}

impl CancelSignal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.flag.store(true, Ordering::Release);
    }
}

impl Monitor for CancelSignal {
    fn aborted(&self) -> bool {
        self.flag.load(Ordering::Acquire)
    }
}

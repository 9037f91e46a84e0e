use std::sync::{Condvar, Mutex};

/// Counting wait-group used to drain outstanding readers before a file is
/// closed or unlinked.
///
/// Every reference taken on a live file adds one; every release removes
/// one. `wait` blocks until the count returns to zero. The count must never
/// go negative; that means a release without a matching reference and the
/// accounting can no longer be trusted.
pub struct WaitGroup {
    count: Mutex<i64>,
    cond: Condvar,
}

impl WaitGroup {
    pub fn new() -> Self {
        Self {
            count: Mutex::new(0),
            cond: Condvar::new(),
        }
    }

    pub fn add(&self, n: i64) {
        let mut count = self.count.lock().unwrap();
        *count += n;
        if *count < 0 {
            panic!("wait group counter went negative");
        }
        if *count == 0 {
            self.cond.notify_all();
        }
    }

    pub fn done(&self) {
        self.add(-1);
    }

    /// Block until the counter reaches zero.
    pub fn wait(&self) {
        let mut count = self.count.lock().unwrap();
        while *count > 0 {
            count = self.cond.wait(count).unwrap();
        }
    }
}

impl Default for WaitGroup {
    fn default() -> Self {
        Self::new()
    }
}

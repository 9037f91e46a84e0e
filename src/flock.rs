use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::{Path, PathBuf};

#[cfg(unix)]
use std::os::unix::io::AsRawFd;

/// Advisory lock taken around physical unlink and rename of table files.
///
/// One lock file exists per shard. External backup tooling takes the same
/// lock before copying the shard directory, so destructive operations and
/// backups never interleave. Acquisition blocks; this is the only
/// potentially contended OS-level wait in the subsystem and it is scoped to
/// the remove/rename paths.
///
/// The lock is released when the guard is dropped. The lock file itself is
/// left in place to avoid unlink races between contenders.
pub struct FileLock {
    _file: File,
    path: PathBuf,
}

impl FileLock {
    /// Create the lock file if needed and block until the exclusive lock is
    /// held. The file records the owning process ID for debugging.
    pub fn acquire<P: AsRef<Path>>(path: P) -> io::Result<Self> {
        let path = path.as_ref().to_path_buf();

        let mut file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&path)?;

        Self::lock_exclusive(&file)?;

        writeln!(file, "{}", std::process::id())?;
        file.flush()?;

        Ok(Self { _file: file, path })
    }

    #[cfg(unix)]
    fn lock_exclusive(file: &File) -> io::Result<()> {
        use libc::{flock, LOCK_EX};

        let fd = file.as_raw_fd();
        let result = unsafe { flock(fd, LOCK_EX) };
        if result != 0 {
            return Err(io::Error::last_os_error());
        }
        Ok(())
    }

    #[cfg(not(unix))]
    fn lock_exclusive(_file: &File) -> io::Result<()> {
        // No advisory locking on this platform; removal still works, backup
        // coordination does not.
        Ok(())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for FileLock {
    fn drop(&mut self) {
        // The OS releases the lock when the descriptor closes.
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_acquire_writes_pid() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("shard.lock");

        let lock = FileLock::acquire(&lock_path).expect("failed to acquire lock");
        assert_eq!(lock.path(), lock_path.as_path());

        let content = std::fs::read_to_string(&lock_path).unwrap();
        assert!(content.contains(&std::process::id().to_string()));
    }

    #[test]
    fn test_reacquire_after_drop() {
        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("shard.lock");

        {
            let _lock = FileLock::acquire(&lock_path).unwrap();
            assert!(lock_path.exists());
        }

        // Dropping released the lock even though the file remains.
        let _lock = FileLock::acquire(&lock_path).expect("reacquire after drop");
    }

    #[cfg(unix)]
    #[test]
    fn test_acquire_blocks_until_released() {
        use std::sync::atomic::{AtomicBool, Ordering};
        use std::sync::Arc;
        use std::time::Duration;

        let dir = tempfile::tempdir().unwrap();
        let lock_path = dir.path().join("shard.lock");

        let first = FileLock::acquire(&lock_path).unwrap();
        let acquired = Arc::new(AtomicBool::new(false));

        let handle = {
            let lock_path = lock_path.clone();
            let acquired = acquired.clone();
            std::thread::spawn(move || {
                let _second = FileLock::acquire(&lock_path).unwrap();
                acquired.store(true, Ordering::SeqCst);
            })
        };

        std::thread::sleep(Duration::from_millis(50));
        assert!(!acquired.load(Ordering::SeqCst));

        drop(first);
        handle.join().unwrap();
        assert!(acquired.load(Ordering::SeqCst));
    }
}

//! Background upkeep of the eviction state: a watcher that frees cached
//! table bytes whenever a level outgrows its resident limit, and the drain
//! that retries frees deferred while files were mid-query.
//!
//! Both workers hang off one [`Maintenance`] handle. Shutdown lands
//! between passes, never mid-eviction, so the per-level counters stay
//! consistent with the lists.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::config::StoreConfig;

use super::evict::{EvictRegistry, MAX_LEVELS};

/// Handle over the store's two background workers.
pub struct Maintenance {
    shutdown: watch::Sender<bool>,
    workers: Vec<JoinHandle<()>>,
}

impl Maintenance {
    /// Spawn the eviction watcher and the deferred-free drain over
    /// `registry`. Must be called from within a tokio runtime.
    pub fn start(registry: Arc<EvictRegistry>, config: &StoreConfig) -> Maintenance {
        let (shutdown, _) = watch::channel(false);
        let workers = vec![
            tokio::spawn(evict_watcher(
                registry.clone(),
                config.level_mem_limit,
                config.maintenance.evict_interval,
                shutdown.subscribe(),
            )),
            tokio::spawn(free_queue_drain(
                registry,
                config.maintenance.gc_interval,
                shutdown.subscribe(),
            )),
        ];
        Maintenance { shutdown, workers }
    }

    /// Stop both workers and wait them out.
    pub async fn shutdown(self) {
        let _ = self.shutdown.send(true);
        for worker in self.workers {
            if let Err(e) = worker.await {
                tracing::error!(error = %e, "maintenance worker failed");
            }
        }
    }
}

async fn evict_watcher(
    registry: Arc<EvictRegistry>,
    limit: i64,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    let mut reclaimed = 0i64;
    loop {
        tokio::select! {
            _ = ticker.tick() => reclaimed += evict_over_limit(&registry, limit),
            _ = shutdown.changed() => break,
        }
    }
    tracing::debug!(reclaimed = reclaimed, "eviction watcher stopped");
}

/// One watcher pass: every level holding more than `limit` resident bytes
/// gives back the difference, oldest files first. Files skipped because
/// they were in use land on the free queue for the drain worker.
fn evict_over_limit(registry: &EvictRegistry, limit: i64) -> i64 {
    let mut total = 0i64;
    for level in 0..MAX_LEVELS as u16 {
        let (resident, _, _) = registry.level_mem(level);
        if resident <= limit {
            continue;
        }
        let freed = registry.evict(level, resident - limit);
        total += freed;
        tracing::info!(
            level = level,
            resident = resident,
            freed = freed,
            "level over resident limit"
        );
    }
    total
}

async fn free_queue_drain(
    registry: Arc<EvictRegistry>,
    interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    let mut ticker = tokio::time::interval(interval);
    loop {
        tokio::select! {
            _ = ticker.tick() => { registry.gc().drain(); }
            _ = shutdown.changed() => break,
        }
    }
    // final sweep so files deferred just before shutdown do not stay
    // resident until the next start
    registry.gc().drain();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::MaintenanceConfig;
    use crate::table::fixture::{series, write_file};
    use crate::table::{FileName, TableFile};

    fn open_loaded(
        dir: &std::path::Path,
        seq: u64,
        registry: &Arc<EvictRegistry>,
    ) -> Arc<TableFile> {
        let name = FileName::new(seq, 0, 0, 0);
        let path = dir.join(name.tssp_name());
        write_file(&path, &[series(seq, &[(1, 1.0), (2, 2.0)])]);
        let file = TableFile::open(
            &path,
            dir.join("shard.lock"),
            true,
            false,
            registry.clone(),
        )
        .unwrap();
        file.load_into_memory().unwrap();
        file
    }

    #[test]
    fn test_evict_pass_frees_down_past_the_limit() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();
        let files: Vec<_> = (1..=3)
            .map(|seq| open_loaded(dir.path(), seq, &registry))
            .collect();
        let per_file = files[0].in_mem_size();

        // everything within the limit: the pass is a no-op
        assert_eq!(evict_over_limit(&registry, per_file * 3), 0);
        assert_eq!(registry.level_mem(0).0, per_file * 3);

        let freed = evict_over_limit(&registry, per_file);
        assert!(freed >= per_file * 2);
        assert!(registry.level_mem(0).0 <= per_file);

        for f in files {
            f.close().unwrap();
        }
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_watcher_enforces_limit_and_drains_deferred_frees() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();

        let busy = open_loaded(dir.path(), 1, &registry);
        let idle = open_loaded(dir.path(), 2, &registry);
        let per_file = busy.in_mem_size();
        let guard = busy.try_use().unwrap();

        let config = StoreConfig::new().level_mem_limit(0).maintenance(
            MaintenanceConfig::default()
                .evict_interval(Duration::from_millis(10))
                .gc_interval(Duration::from_millis(10)),
        );
        let maintenance = Maintenance::start(registry.clone(), &config);

        // the idle file goes; the busy one is parked for the drain worker
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(idle.in_mem_size(), 0);
        assert_eq!(busy.in_mem_size(), per_file);
        assert_eq!(registry.level_mem(0).0, per_file);

        // once the query lets go, the drain gives the bytes back
        drop(guard);
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert_eq!(busy.in_mem_size(), 0);
        assert_eq!(registry.level_mem(0), (0, 0, 0));
        assert_eq!(registry.lru_len(0), 0);

        maintenance.shutdown().await;
        busy.close().unwrap();
        idle.close().unwrap();
    }

    #[tokio::test(flavor = "multi_thread")]
    async fn test_shutdown_stops_the_watcher() {
        let dir = tempfile::tempdir().unwrap();
        let registry = EvictRegistry::new();

        let config = StoreConfig::new().level_mem_limit(0).maintenance(
            MaintenanceConfig::default()
                .evict_interval(Duration::from_millis(10))
                .gc_interval(Duration::from_millis(10)),
        );
        let maintenance = Maintenance::start(registry.clone(), &config);
        maintenance.shutdown().await;

        // a file loaded after shutdown stays resident despite the zero limit
        let file = open_loaded(dir.path(), 1, &registry);
        let size = file.in_mem_size();
        assert!(size > 0);
        tokio::time::sleep(Duration::from_millis(50)).await;
        assert_eq!(registry.level_mem(0).0, size);

        file.close().unwrap();
    }
}

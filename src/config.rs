use std::time::Duration;

/// Configuration for the immutable table store
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Admit newly opened files to the block cache (default: false)
    pub cache_data_block: bool,

    /// Resident cache bytes allowed per level before the eviction watcher
    /// kicks in (default: 512MB)
    pub level_mem_limit: i64,

    /// Background maintenance configuration
    pub maintenance: MaintenanceConfig,
}

#[derive(Debug, Clone)]
pub struct MaintenanceConfig {
    /// How often to check per-level memory pressure (default: 10s)
    pub evict_interval: Duration,

    /// How often to drain the deferred-free queue (default: 5s)
    pub gc_interval: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            cache_data_block: false,
            level_mem_limit: 512 * 1024 * 1024, // 512MB
            maintenance: MaintenanceConfig::default(),
        }
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            evict_interval: Duration::from_secs(10),
            gc_interval: Duration::from_secs(5),
        }
    }
}

impl StoreConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Enable block-cache admission on open
    pub fn cache_data_block(mut self, enabled: bool) -> Self {
        self.cache_data_block = enabled;
        self
    }

    /// Set the per-level resident byte limit
    pub fn level_mem_limit(mut self, bytes: i64) -> Self {
        self.level_mem_limit = bytes;
        self
    }

    /// Configure background maintenance
    pub fn maintenance(mut self, config: MaintenanceConfig) -> Self {
        self.maintenance = config;
        self
    }
}

impl MaintenanceConfig {
    /// Set the memory-pressure check interval
    pub fn evict_interval(mut self, interval: Duration) -> Self {
        self.evict_interval = interval;
        self
    }

    /// Set the deferred-free drain interval
    pub fn gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }
}

//! Store configuration.

use std::env;

/// Policy for when the active segment's file is fsynced.
///
/// The upstream implementation this store models never calls fsync; the
/// default here matches that observable behavior rather than assuming it was
/// an oversight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FsyncPolicy {
    /// Fsync after every write, for maximum durability at the cost of
    /// latency.
    Always,
    /// Never fsync; rely on the OS page cache.
    #[default]
    Never,
}

impl FsyncPolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            FsyncPolicy::Always => "fsync after every write",
            FsyncPolicy::Never => "never fsync",
        }
    }
}

/// Store configuration: the segment size cap and the fsync policy.
#[derive(Debug, Clone)]
pub struct StoreConfig {
    /// Maximum size, in bytes, the active segment is allowed to reach before
    /// a write forces a rollover to a new segment.
    pub segment_size: u64,
    pub fsync: FsyncPolicy,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            segment_size: 1024 * 1024,
            fsync: FsyncPolicy::default(),
        }
    }
}

impl StoreConfig {
    pub fn with_segment_size(mut self, segment_size: u64) -> Self {
        self.segment_size = segment_size;
        self
    }

    pub fn with_fsync(mut self, fsync: FsyncPolicy) -> Self {
        self.fsync = fsync;
        self
    }

    /// Overlays `KVSTORE_SEGMENT_SIZE` and `KVSTORE_FSYNC` (`"always"` or
    /// `"never"`) on top of the defaults.
    pub fn from_env() -> Self {
        let mut config = Self::default();
        if let Ok(raw) = env::var("KVSTORE_SEGMENT_SIZE") {
            if let Ok(size) = raw.parse() {
                config.segment_size = size;
            }
        }
        if let Ok(raw) = env::var("KVSTORE_FSYNC") {
            config.fsync = match raw.as_str() {
                "always" => FsyncPolicy::Always,
                _ => FsyncPolicy::Never,
            };
        }
        config
    }

    pub fn summary(&self) -> String {
        format!(
            "StoreConfig: segment_size={} bytes, fsync={}",
            self.segment_size,
            self.fsync.as_str()
        )
    }
}

//! Durability mode configuration
//!
//! Controls commit log sync behavior (Cache, Standard, Always).

/// Durability mode for commit log operations
///
/// # Modes
///
/// | Mode | fsync | Data Loss Window |
/// |------|-------|-----------------|
/// | Cache | No log at all | Everything |
/// | Standard | Every `batch_size` commits | Up to `batch_size - 1` commits on power loss |
/// | Always | Every commit | Zero |
///
/// Standard still flushes every record to the OS before the commit is
/// acknowledged, so a process crash loses nothing; only an OS crash or power
/// loss can.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DurabilityMode {
    /// No commit log. Data lives only in memory.
    Cache,

    /// Flush every commit, fsync every `batch_size` commits
    Standard {
        /// Maximum commits between fsyncs
        batch_size: usize,
    },

    /// fsync after every commit
    Always,
}

impl DurabilityMode {
    /// Check if this mode writes a commit log
    pub fn requires_log(&self) -> bool {
        !matches!(self, DurabilityMode::Cache)
    }

    /// Check whether the commit that brought the unsynced count to
    /// `commits_since_sync` must fsync
    pub fn should_sync(&self, commits_since_sync: usize) -> bool {
        match self {
            DurabilityMode::Cache => false,
            DurabilityMode::Always => true,
            DurabilityMode::Standard { batch_size } => commits_since_sync >= (*batch_size).max(1),
        }
    }

    /// Human-readable description of the mode
    pub fn description(&self) -> &'static str {
        match self {
            DurabilityMode::Cache => "Cache (no commit log, all data lost on exit)",
            DurabilityMode::Standard { .. } => "Standard (flush per commit, batched fsync)",
            DurabilityMode::Always => "Always sync (fsync per commit)",
        }
    }

    /// Standard mode with the recommended batch size of 64 commits
    pub const fn standard_default() -> Self {
        DurabilityMode::Standard { batch_size: 64 }
    }
}

impl Default for DurabilityMode {
    fn default() -> Self {
        Self::standard_default()
    }
}

//! Engine configuration.
//!
//! Knobs that the specification's component design leaves as
//! constructor parameters are collected here so an embedding
//! application can load them from its own config layer (RON, TOML,
//! environment) and hand over one struct. This crate never reads a file
//! itself — that remains an external collaborator's job.

use serde::{Deserialize, Serialize};

/// Top-level engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RenderEngineConfig {
    /// Number of back-buffers (and therefore execution contexts) kept
    /// in flight. Must be at least 1.
    pub back_buffer_count: usize,
    /// Timeout, in nanoseconds, used for each `vkAcquireNextImageKHR`
    /// probe in the forward-progress acquisition loop. The Vulkan spec
    /// does not guarantee forward progress with a longer wait, so this
    /// is kept short and the loop retries on `TIMEOUT`.
    pub acquire_probe_timeout_ns: u64,
    /// Capacity of the [`crate::sync::logbook::SyncLogbook`] ring
    /// buffer.
    pub sync_logbook_capacity: usize,
    /// Number of worker threads backing the [`crate::scheduler::taskflow::TaskflowScheduler`].
    /// `0` means "use the number of available CPUs".
    pub worker_thread_count: usize,
    /// Preferred transfer queue path when a device exposes both a
    /// dedicated transfer family and a combined graphics+transfer
    /// family that could also service the transfer.
    pub transfer_path: TransferPathPreference,
}

impl Default for RenderEngineConfig {
    fn default() -> Self {
        Self {
            back_buffer_count: 3,
            acquire_probe_timeout_ns: 1_000_000, // ~1ms, per spec.md §4.9
            sync_logbook_capacity: 1024,
            worker_thread_count: 0,
            transfer_path: TransferPathPreference::PreferUnified,
        }
    }
}

/// Which transfer path the [`crate::transfer::scheduler::TransferScheduler`]
/// should pick when both a unified and a split-queue path are available
/// for a given resource.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TransferPathPreference {
    /// Use the unified (single-submission) path whenever source,
    /// transfer, and destination queues share a family.
    PreferUnified,
    /// Always use the split-queue ownership-transfer path, even when a
    /// unified path would be available. Useful for exercising the split
    /// path in tests without a multi-family device.
    ForceSplit,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_matches_spec_constants() {
        let config = RenderEngineConfig::default();
        assert_eq!(config.back_buffer_count, 3);
        assert_eq!(config.acquire_probe_timeout_ns, 1_000_000);
        assert_eq!(config.sync_logbook_capacity, 1024);
        assert_eq!(config.transfer_path, TransferPathPreference::PreferUnified);
    }

    #[test]
    fn back_buffer_count_overrides_other_defaults() {
        let config = RenderEngineConfig {
            back_buffer_count: 2,
            ..RenderEngineConfig::default()
        };
        assert_eq!(config.back_buffer_count, 2);
        assert_eq!(config.sync_logbook_capacity, 1024);
    }
}

//! Bounded diagnostic ring buffer of semaphore operations.
//!
//! Grounded on `original_source/render_engine/src/debug/SyncLogbook.cpp`:
//! every host-visible semaphore operation (signal, wait, present-wait,
//! image acquire) is appended to a fixed-capacity ring so a failed wait
//! can be diagnosed after the fact. Re-expressed per spec.md §9 as an
//! explicit context object rather than a process-wide singleton; the
//! `diagnostics` feature additionally exposes a thread-safe global
//! facade for call sites that have no logbook handle threaded through.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex};

/// One recorded semaphore operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LogbookEntry {
    /// A host-side `vkSignalSemaphore` call.
    SignalFromHost {
        /// Name of the semaphore signaled.
        semaphore: String,
        /// Value signaled to (0 for binary semaphores).
        value: u64,
    },
    /// A wait enqueued as part of a submission.
    Wait {
        /// Name of the semaphore waited on.
        semaphore: String,
        /// Value waited for.
        value: u64,
    },
    /// A signal enqueued as part of a submission.
    Signal {
        /// Name of the semaphore signaled.
        semaphore: String,
        /// Value signaled to.
        value: u64,
    },
    /// A wait performed as part of `vkQueuePresentKHR`.
    WaitAtPresent {
        /// Name of the semaphore waited on before present.
        semaphore: String,
    },
    /// A swapchain image acquisition, successful or not.
    ImageAcquire {
        /// Sync slot the acquisition was attempted for.
        sync_slot: usize,
        /// Render-target index returned by the driver, if the
        /// acquisition succeeded within the probe timeout.
        render_target_index: Option<u32>,
    },
}

/// A fixed-capacity ring buffer of [`LogbookEntry`] values. Once full,
/// the oldest entry is evicted on every push.
pub struct SyncLogbook {
    capacity: usize,
    entries: VecDeque<LogbookEntry>,
}

impl SyncLogbook {
    /// Create a logbook holding at most `capacity` entries.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity),
        }
    }

    /// Append an entry, evicting the oldest if at capacity.
    pub fn push(&mut self, entry: LogbookEntry) {
        if self.entries.len() == self.capacity {
            self.entries.pop_front();
        }
        self.entries.push_back(entry);
    }

    /// Entries in oldest-to-newest order.
    pub fn entries(&self) -> impl Iterator<Item = &LogbookEntry> {
        self.entries.iter()
    }

    /// Number of entries currently held.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the logbook holds no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Configured maximum capacity.
    #[must_use]
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Render the entries as a multi-line diagnostic string, suitable
    /// for logging alongside a failed-wait error.
    #[must_use]
    pub fn dump(&self) -> String {
        self.entries
            .iter()
            .map(|e| format!("{e:?}"))
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Thread-safe handle to a [`SyncLogbook`], shared between the engine
/// and any diagnostics call sites that need to append entries
/// concurrently with submission threads.
#[derive(Clone)]
pub struct SharedLogbook(Arc<Mutex<SyncLogbook>>);

impl SharedLogbook {
    /// Wrap a new logbook of the given capacity for shared use.
    #[must_use]
    pub fn new(capacity: usize) -> Self {
        Self(Arc::new(Mutex::new(SyncLogbook::new(capacity))))
    }

    /// Append an entry under the shared lock.
    pub fn push(&self, entry: LogbookEntry) {
        self.0.lock().unwrap().push(entry);
    }

    /// Render the current entries as a diagnostic dump, under the
    /// shared lock.
    #[must_use]
    pub fn dump(&self) -> String {
        self.0.lock().unwrap().dump()
    }
}

#[cfg(feature = "diagnostics")]
mod global {
    use super::SharedLogbook;
    use std::sync::OnceLock;

    static GLOBAL: OnceLock<SharedLogbook> = OnceLock::new();

    /// Install the process-wide diagnostics logbook. Call once, early in
    /// startup; later calls are ignored if one is already installed.
    pub fn install(capacity: usize) {
        let _ = GLOBAL.set(SharedLogbook::new(capacity));
    }

    /// Fetch the process-wide diagnostics logbook, if [`install`] was
    /// called.
    #[must_use]
    pub fn global() -> Option<&'static SharedLogbook> {
        GLOBAL.get()
    }
}

#[cfg(feature = "diagnostics")]
pub use global::{global, install};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ring_buffer_evicts_oldest_entry_past_capacity() {
        let mut log = SyncLogbook::new(2);
        log.push(LogbookEntry::SignalFromHost {
            semaphore: "a".into(),
            value: 1,
        });
        log.push(LogbookEntry::SignalFromHost {
            semaphore: "b".into(),
            value: 2,
        });
        log.push(LogbookEntry::SignalFromHost {
            semaphore: "c".into(),
            value: 3,
        });

        let names: Vec<_> = log
            .entries()
            .map(|e| match e {
                LogbookEntry::SignalFromHost { semaphore, .. } => semaphore.clone(),
                _ => unreachable!(),
            })
            .collect();
        assert_eq!(names, vec!["b", "c"]);
    }

    #[test]
    fn zero_capacity_is_clamped_to_one() {
        let log = SyncLogbook::new(0);
        assert_eq!(log.capacity(), 1);
    }

    #[test]
    fn shared_logbook_push_is_visible_across_clones() {
        let a = SharedLogbook::new(4);
        let b = a.clone();
        a.push(LogbookEntry::WaitAtPresent {
            semaphore: "render_finished".into(),
        });
        assert!(b.dump().contains("render_finished"));
    }
}

//! Per-frame mutable state checked out from a ring sized to the
//! back-buffer count.
//!
//! Grounded on spec.md §3's `ExecutionContext` description: a frame
//! number, the currently bound pool index, a pool of [`SyncObject`]s
//! (one per back-buffer slot), and an event bus fired when a pool index
//! is bound or released — generalized from the original's direct
//! callback registration the way the teacher's `ecs` module exposes
//! event subscription as boxed closures rather than virtual observers.

use crate::sync::object::SyncObject;

/// Identifies a swapchain image and the sync slot chosen to synchronize
/// work on it: `render_target_index` is driver-chosen (the index
/// `vkAcquireNextImageKHR` returns), `sync_object_index` is CPU-chosen
/// (the smallest unoccupied slot).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolIndex {
    /// Swapchain image index the driver handed back.
    pub render_target_index: u32,
    /// Sync slot chosen by [`crate::swapchain::selector::SwapChainImageSelector`].
    pub sync_object_index: usize,
}

type PoolIndexCallback = Box<dyn Fn(PoolIndex) + Send + Sync>;

/// A per-frame mutable record cycling through a ring of size equal to
/// the back-buffer count. A context is "busy" from
/// [`Self::set_pool_index`] until the corresponding render-finished
/// timeline value is reached, at which point the owner calls
/// [`Self::clear_pool_index`].
pub struct ExecutionContext {
    frame_number: u64,
    pool_index: Option<PoolIndex>,
    sync_objects: Vec<SyncObject>,
    on_pool_index_set: Vec<PoolIndexCallback>,
    on_pool_index_clear: Vec<PoolIndexCallback>,
}

impl ExecutionContext {
    /// Construct a context with `slot_count` empty named sync objects
    /// (`slot_count` equals the back-buffer count).
    #[must_use]
    pub fn new(slot_count: usize) -> Self {
        let sync_objects = (0..slot_count)
            .map(|i| SyncObject::new(format!("execution_context_slot_{i}")))
            .collect();
        Self {
            frame_number: 0,
            pool_index: None,
            sync_objects,
            on_pool_index_set: Vec::new(),
            on_pool_index_clear: Vec::new(),
        }
    }

    /// Current frame number, incremented by [`Self::advance_frame`].
    #[must_use]
    pub fn frame_number(&self) -> u64 {
        self.frame_number
    }

    /// Advance to the next frame number.
    pub fn advance_frame(&mut self) {
        self.frame_number += 1;
    }

    /// The pool index this context is currently bound to, if any.
    #[must_use]
    pub fn pool_index(&self) -> Option<PoolIndex> {
        self.pool_index
    }

    /// Bind this context to `index`, firing every `on_pool_index_set`
    /// subscriber.
    pub fn set_pool_index(&mut self, index: PoolIndex) {
        self.pool_index = Some(index);
        for callback in &self.on_pool_index_set {
            callback(index);
        }
    }

    /// Release the currently bound pool index, firing every
    /// `on_pool_index_clear` subscriber. No-op if no index is bound.
    pub fn clear_pool_index(&mut self) {
        if let Some(index) = self.pool_index.take() {
            for callback in &self.on_pool_index_clear {
                callback(index);
            }
        }
    }

    /// Subscribe to pool-index-bound events.
    pub fn on_pool_index_set(&mut self, callback: impl Fn(PoolIndex) + Send + Sync + 'static) {
        self.on_pool_index_set.push(Box::new(callback));
    }

    /// Subscribe to pool-index-released events.
    pub fn on_pool_index_clear(&mut self, callback: impl Fn(PoolIndex) + Send + Sync + 'static) {
        self.on_pool_index_clear.push(Box::new(callback));
    }

    /// The sync object for the currently bound slot, if a pool index is
    /// bound.
    #[must_use]
    pub fn current_sync_object(&self) -> Option<&SyncObject> {
        let index = self.pool_index?;
        self.sync_objects.get(index.sync_object_index)
    }

    /// Mutable access to the sync object for the currently bound slot.
    pub fn current_sync_object_mut(&mut self) -> Option<&mut SyncObject> {
        let index = self.pool_index?;
        self.sync_objects.get_mut(index.sync_object_index)
    }

    /// Sync object for an arbitrary slot, regardless of which is
    /// currently bound — used when acquiring a new image before binding
    /// its slot.
    #[must_use]
    pub fn sync_object(&self, slot: usize) -> Option<&SyncObject> {
        self.sync_objects.get(slot)
    }

    /// Mutable access to an arbitrary slot's sync object.
    pub fn sync_object_mut(&mut self, slot: usize) -> Option<&mut SyncObject> {
        self.sync_objects.get_mut(slot)
    }

    /// Number of slots in this context's ring (equals the back-buffer
    /// count).
    #[must_use]
    pub fn slot_count(&self) -> usize {
        self.sync_objects.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    #[test]
    fn set_pool_index_fires_subscribers() {
        let mut ctx = ExecutionContext::new(3);
        let seen = Arc::new(AtomicUsize::new(0));
        let seen_clone = Arc::clone(&seen);
        ctx.on_pool_index_set(move |_| {
            seen_clone.fetch_add(1, Ordering::SeqCst);
        });

        ctx.set_pool_index(PoolIndex { render_target_index: 0, sync_object_index: 1 });
        assert_eq!(seen.load(Ordering::SeqCst), 1);
        assert_eq!(ctx.pool_index().unwrap().sync_object_index, 1);
    }

    #[test]
    fn clear_pool_index_is_a_no_op_when_nothing_is_bound() {
        let mut ctx = ExecutionContext::new(2);
        let fired = Arc::new(AtomicUsize::new(0));
        let fired_clone = Arc::clone(&fired);
        ctx.on_pool_index_clear(move |_| {
            fired_clone.fetch_add(1, Ordering::SeqCst);
        });
        ctx.clear_pool_index();
        assert_eq!(fired.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn current_sync_object_tracks_bound_slot() {
        let mut ctx = ExecutionContext::new(3);
        assert!(ctx.current_sync_object().is_none());
        ctx.set_pool_index(PoolIndex { render_target_index: 2, sync_object_index: 2 });
        assert_eq!(ctx.current_sync_object().unwrap().name(), "execution_context_slot_2");
    }
}

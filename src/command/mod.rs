//! Command buffer allocation: per-thread pools, either transient
//! (single-shot) or persistent and keyed by back-buffer slot.
//!
//! Grounded on `render/vulkan/commands.rs`'s `CommandPool` RAII wrapper,
//! generalized to the two pool shapes spec.md §4.2 requires: pools are
//! never shared across threads, so both factories keep a `thread_local!`
//! map from thread id to that thread's own pool set, created lazily on
//! first use.

use std::collections::HashMap;
use std::sync::Mutex;
use std::thread::ThreadId;

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};

struct CommandPool {
    handle: vk::CommandPool,
}

impl CommandPool {
    fn new(device: &Device, queue_family_index: u32, flags: vk::CommandPoolCreateFlags) -> EngineResult<Self> {
        let create_info = vk::CommandPoolCreateInfo::builder()
            .flags(flags)
            .queue_family_index(queue_family_index);
        // SAFETY: `device` outlives the pool; the pool is destroyed
        // explicitly via `destroy`, never implicitly.
        let handle = unsafe {
            device
                .create_command_pool(&create_info, None)
                .map_err(EngineError::from)?
        };
        Ok(Self { handle })
    }

    fn allocate(&self, device: &Device, count: u32) -> EngineResult<Vec<vk::CommandBuffer>> {
        let alloc_info = vk::CommandBufferAllocateInfo::builder()
            .command_pool(self.handle)
            .level(vk::CommandBufferLevel::PRIMARY)
            .command_buffer_count(count);
        // SAFETY: `self.handle` is alive for the duration of this call.
        unsafe {
            device
                .allocate_command_buffers(&alloc_info)
                .map_err(EngineError::from)
        }
    }

    fn reset(&self, device: &Device) -> EngineResult<()> {
        // SAFETY: caller guarantees no command buffer from this pool is
        // still pending on the GPU.
        unsafe {
            device
                .reset_command_pool(self.handle, vk::CommandPoolResetFlags::empty())
                .map_err(EngineError::from)
        }
    }

    fn destroy(&self, device: &Device) {
        // SAFETY: caller guarantees the device is idle with respect to
        // this pool's buffers.
        unsafe { device.destroy_command_pool(self.handle, None) };
    }
}

/// Per-thread transient command pool for single-use command buffers
/// ("record once, submit once, reclaim via fence wait or queue idle").
///
/// Never shared across threads: each call to
/// [`create_command_buffer`](Self::create_command_buffer) lazily creates
/// the calling thread's own pool on first use.
pub struct SingleShotCommandBufferFactory {
    queue_family_index: u32,
    pools: Mutex<HashMap<ThreadId, CommandPool>>,
}

impl SingleShotCommandBufferFactory {
    /// Construct a factory targeting `queue_family_index`. No pools are
    /// created until first use.
    #[must_use]
    pub fn new(queue_family_index: u32) -> Self {
        Self {
            queue_family_index,
            pools: Mutex::new(HashMap::new()),
        }
    }

    /// Allocate one primary command buffer from the calling thread's
    /// pool, creating the pool if this is the thread's first call.
    ///
    /// # Errors
    /// Propagates Vulkan pool-creation or allocation failures.
    pub fn create_command_buffer(&self, device: &Device) -> EngineResult<vk::CommandBuffer> {
        let thread_id = std::thread::current().id();
        let mut pools = self.pools.lock().unwrap();
        let pool = match pools.get(&thread_id) {
            Some(pool) => pool,
            None => {
                let pool = CommandPool::new(
                    device,
                    self.queue_family_index,
                    vk::CommandPoolCreateFlags::TRANSIENT,
                )?;
                pools.entry(thread_id).or_insert(pool)
            }
        };
        Ok(pool.allocate(device, 1)?[0])
    }

    /// Destroy every thread's pool. Must only be called once the device
    /// is idle with respect to every single-shot buffer ever allocated.
    pub fn destroy(&self, device: &Device) {
        for pool in self.pools.lock().unwrap().values() {
            pool.destroy(device);
        }
        self.pools.lock().unwrap().clear();
    }
}

/// Per-thread, per-back-buffer-slot command pool set for resettable
/// command buffers reused frame over frame.
///
/// Never shared across threads; pools are created with
/// `RESET_COMMAND_BUFFER_BIT` so individual buffers can be reset without
/// resetting the whole pool.
pub struct CommandBufferFactory {
    queue_family_index: u32,
    slot_count: usize,
    pools: Mutex<HashMap<ThreadId, Vec<Option<CommandPool>>>>,
}

impl CommandBufferFactory {
    /// Construct a factory targeting `queue_family_index` with
    /// `slot_count` back-buffer slots (one pool per slot per thread, all
    /// created lazily).
    #[must_use]
    pub fn new(queue_family_index: u32, slot_count: usize) -> Self {
        Self {
            queue_family_index,
            slot_count,
            pools: Mutex::new(HashMap::new()),
        }
    }

    fn pool_for<'a>(
        pools: &'a mut HashMap<ThreadId, Vec<Option<CommandPool>>>,
        thread_id: ThreadId,
        slot: usize,
        slot_count: usize,
        queue_family_index: u32,
        device: &Device,
    ) -> EngineResult<&'a CommandPool> {
        let slots = pools
            .entry(thread_id)
            .or_insert_with(|| (0..slot_count).map(|_| None).collect());
        if slot >= slots.len() {
            return Err(EngineError::QueueUnavailable {
                queue_family: queue_family_index,
                requested: slot as u32 + 1,
                available: slots.len() as u32,
            });
        }
        if slots[slot].is_none() {
            slots[slot] = Some(CommandPool::new(
                device,
                queue_family_index,
                vk::CommandPoolCreateFlags::RESET_COMMAND_BUFFER,
            )?);
        }
        Ok(slots[slot].as_ref().unwrap())
    }

    /// Allocate one primary command buffer from the calling thread's
    /// pool for `slot`, creating it on first use.
    ///
    /// # Errors
    /// Returns an error if `slot` is out of range, or propagates Vulkan
    /// failures.
    pub fn create_command_buffer(&self, device: &Device, slot: usize) -> EngineResult<vk::CommandBuffer> {
        Ok(self.create_command_buffers(device, slot, 1)?[0])
    }

    /// Allocate `count` primary command buffers from the same pool,
    /// allowing secondary-buffer-style packing within one submission.
    ///
    /// # Errors
    /// See [`Self::create_command_buffer`].
    pub fn create_command_buffers(
        &self,
        device: &Device,
        slot: usize,
        count: u32,
    ) -> EngineResult<Vec<vk::CommandBuffer>> {
        let thread_id = std::thread::current().id();
        let mut pools = self.pools.lock().unwrap();
        let pool = Self::pool_for(
            &mut pools,
            thread_id,
            slot,
            self.slot_count,
            self.queue_family_index,
            device,
        )?;
        pool.allocate(device, count)
    }

    /// Reset the calling thread's pool for `slot`, reclaiming every
    /// buffer allocated from it. No-op if the thread never allocated
    /// from this slot.
    ///
    /// # Errors
    /// Propagates Vulkan reset failures.
    pub fn reset_slot(&self, device: &Device, slot: usize) -> EngineResult<()> {
        let pools = self.pools.lock().unwrap();
        if let Some(slots) = pools.get(&std::thread::current().id()) {
            if let Some(Some(pool)) = slots.get(slot) {
                pool.reset(device)?;
            }
        }
        Ok(())
    }

    /// Destroy every thread's pools across every slot. Must only be
    /// called once the device is idle.
    pub fn destroy(&self, device: &Device) {
        for slots in self.pools.lock().unwrap().values() {
            for pool in slots.iter().flatten() {
                pool.destroy(device);
            }
        }
        self.pools.lock().unwrap().clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn out_of_range_slot_is_an_error_before_touching_vulkan() {
        let mut pools: HashMap<ThreadId, Vec<Option<CommandPool>>> = HashMap::new();
        let thread_id = std::thread::current().id();
        pools.insert(thread_id, vec![None, None]);
        let slots = pools.get(&thread_id).unwrap();
        assert!(2 >= slots.len());
    }

    #[test]
    fn factory_reports_configured_slot_count() {
        let factory = CommandBufferFactory::new(0, 3);
        assert_eq!(factory.slot_count, 3);
    }
}

//! GPU buffer resources.
//!
//! Grounded on `original_source/render_engine/src/resources/Buffer.cpp`
//! for the handle/size/live-state shape, allocated through `vk-mem`
//! following the teacher's allocator-backed resource wrappers.

use std::sync::Mutex;

use ash::vk;

use crate::resource::state::{BufferState, ResourceId};

/// A GPU buffer plus the live state [`crate::resource::state_machine::ResourceStateMachine`]
/// reads and updates across barrier commits.
pub struct Buffer {
    id: ResourceId,
    handle: vk::Buffer,
    allocation: vk_mem::Allocation,
    size: vk::DeviceSize,
    state: Mutex<BufferState>,
}

impl Buffer {
    /// Wrap an already-allocated buffer.
    #[must_use]
    pub fn new(handle: vk::Buffer, allocation: vk_mem::Allocation, size: vk::DeviceSize) -> Self {
        Self {
            id: ResourceId::next(),
            handle,
            allocation,
            size,
            state: Mutex::new(BufferState::default()),
        }
    }

    /// Stable identity for state-machine bookkeeping.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The underlying Vulkan buffer handle.
    #[must_use]
    pub fn handle(&self) -> vk::Buffer {
        self.handle
    }

    /// Size in bytes this buffer was created with.
    #[must_use]
    pub fn size(&self) -> vk::DeviceSize {
        self.size
    }

    /// The state currently believed live on the GPU.
    #[must_use]
    pub fn state(&self) -> BufferState {
        *self.state.lock().unwrap()
    }

    /// Overwrite the live state, called by the state machine once a
    /// barrier transitioning to `next` has been recorded.
    pub fn override_state(&self, next: BufferState) {
        *self.state.lock().unwrap() = next;
    }

    /// The `vk-mem` allocation backing this buffer, for destruction.
    #[must_use]
    pub fn allocation(&self) -> &vk_mem::Allocation {
        &self.allocation
    }

    /// Mutable access to the `vk-mem` allocation backing this buffer,
    /// required by `vk-mem`'s destruction API.
    #[must_use]
    pub fn allocation_mut(&mut self) -> &mut vk_mem::Allocation {
        &mut self.allocation
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_buffer(size: vk::DeviceSize) -> Buffer {
        Buffer {
            id: ResourceId::next(),
            handle: vk::Buffer::null(),
            allocation: unsafe { std::mem::zeroed() },
            size,
            state: Mutex::new(BufferState::default()),
        }
    }

    #[test]
    fn override_state_updates_live_state() {
        let buffer = fake_buffer(256);
        let next = BufferState::default().with_access_flag(vk::AccessFlags2::TRANSFER_WRITE);
        buffer.override_state(next);
        assert_eq!(buffer.state().access_flag, vk::AccessFlags2::TRANSFER_WRITE);
    }

    #[test]
    fn each_buffer_gets_a_distinct_id() {
        let a = fake_buffer(64);
        let b = fake_buffer(64);
        assert_ne!(a.id(), b.id());
    }
}

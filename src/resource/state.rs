//! Resource state descriptors: the barrier-relevant fields a texture or
//! buffer carries between commands.
//!
//! Grounded on the committed
//! `synchronization/ResourceStateMachine.h` (`TextureState`/`BufferState`);
//! per spec.md's Open Questions the WIP `resources/ResourceStates.h`
//! variant is not authoritative, so this module follows the
//! synchronization header's shape, including the owning queue family
//! (used for ownership-transfer barriers) rather than a weak pointer to
//! a command context.

use std::sync::atomic::{AtomicU64, Ordering};

use ash::vk;

/// Stable identity for a [`crate::resource::texture::Texture`] or
/// [`crate::resource::buffer::Buffer`], used as the
/// [`crate::resource::state_machine::ResourceStateMachine`]'s map key in
/// place of the original's raw pointer identity.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ResourceId(u64);

impl ResourceId {
    /// Allocate a fresh, process-wide unique id.
    #[must_use]
    pub fn next() -> Self {
        static COUNTER: AtomicU64 = AtomicU64::new(1);
        Self(COUNTER.fetch_add(1, Ordering::Relaxed))
    }
}

/// Barrier-relevant state of a texture: pipeline stage, access mask,
/// image layout, and the queue family that currently owns it (if it has
/// ever been submitted on one).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TextureState {
    /// Pipeline stage the last write/read against this resource
    /// happened in.
    pub pipeline_stage: vk::PipelineStageFlags2,
    /// Access mask of the last write/read.
    pub access_flag: vk::AccessFlags2,
    /// Current Vulkan image layout.
    pub layout: vk::ImageLayout,
    /// Queue family that currently owns this resource, if known.
    pub queue_family_index: Option<u32>,
}

impl Default for TextureState {
    fn default() -> Self {
        Self {
            pipeline_stage: vk::PipelineStageFlags2::NONE,
            access_flag: vk::AccessFlags2::NONE,
            layout: vk::ImageLayout::UNDEFINED,
            queue_family_index: None,
        }
    }
}

impl TextureState {
    /// Builder-style stage setter.
    #[must_use]
    pub fn with_pipeline_stage(mut self, stage: vk::PipelineStageFlags2) -> Self {
        self.pipeline_stage = stage;
        self
    }

    /// Builder-style access setter.
    #[must_use]
    pub fn with_access_flag(mut self, access: vk::AccessFlags2) -> Self {
        self.access_flag = access;
        self
    }

    /// Builder-style layout setter.
    #[must_use]
    pub fn with_layout(mut self, layout: vk::ImageLayout) -> Self {
        self.layout = layout;
        self
    }

    /// Builder-style owning-queue-family setter.
    #[must_use]
    pub fn with_queue_family(mut self, queue_family_index: u32) -> Self {
        self.queue_family_index = Some(queue_family_index);
        self
    }

    /// Zero stage and access while keeping layout and ownership, used at
    /// frame boundaries to prevent a stale read mask surviving into the
    /// next frame.
    #[must_use]
    pub fn reset_stages(self) -> Self {
        Self {
            pipeline_stage: vk::PipelineStageFlags2::NONE,
            access_flag: vk::AccessFlags2::NONE,
            ..self
        }
    }
}

/// Barrier-relevant state of a buffer: pipeline stage, access mask, and
/// the queue family that currently owns it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BufferState {
    /// Pipeline stage the last write/read against this resource
    /// happened in.
    pub pipeline_stage: vk::PipelineStageFlags2,
    /// Access mask of the last write/read.
    pub access_flag: vk::AccessFlags2,
    /// Queue family that currently owns this resource, if known.
    pub queue_family_index: Option<u32>,
}

impl Default for BufferState {
    fn default() -> Self {
        Self {
            pipeline_stage: vk::PipelineStageFlags2::NONE,
            access_flag: vk::AccessFlags2::NONE,
            queue_family_index: None,
        }
    }
}

impl BufferState {
    /// Builder-style stage setter.
    #[must_use]
    pub fn with_pipeline_stage(mut self, stage: vk::PipelineStageFlags2) -> Self {
        self.pipeline_stage = stage;
        self
    }

    /// Builder-style access setter.
    #[must_use]
    pub fn with_access_flag(mut self, access: vk::AccessFlags2) -> Self {
        self.access_flag = access;
        self
    }

    /// Builder-style owning-queue-family setter.
    #[must_use]
    pub fn with_queue_family(mut self, queue_family_index: u32) -> Self {
        self.queue_family_index = Some(queue_family_index);
        self
    }

    /// Zero stage and access while keeping ownership.
    #[must_use]
    pub fn reset_stages(self) -> Self {
        Self {
            pipeline_stage: vk::PipelineStageFlags2::NONE,
            access_flag: vk::AccessFlags2::NONE,
            ..self
        }
    }
}

/// Whether an access mask can make changes to memory (a write), per the
/// access-flag narrowing rule: read-only current states don't need their
/// caches flushed, so barriers built against them have their
/// `srcStage`/`srcAccess` collapsed to `NONE`.
#[must_use]
pub fn access_can_write(access: vk::AccessFlags2) -> bool {
    const WRITE_MASK: vk::AccessFlags2 = vk::AccessFlags2::from_raw(
        vk::AccessFlags2::SHADER_WRITE.as_raw()
            | vk::AccessFlags2::COLOR_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::DEPTH_STENCIL_ATTACHMENT_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFER_WRITE.as_raw()
            | vk::AccessFlags2::HOST_WRITE.as_raw()
            | vk::AccessFlags2::MEMORY_WRITE.as_raw()
            | vk::AccessFlags2::SHADER_STORAGE_WRITE.as_raw()
            | vk::AccessFlags2::TRANSFORM_FEEDBACK_WRITE_EXT.as_raw()
            | vk::AccessFlags2::TRANSFORM_FEEDBACK_COUNTER_WRITE_EXT.as_raw()
            | vk::AccessFlags2::ACCELERATION_STRUCTURE_WRITE_KHR.as_raw()
            | vk::AccessFlags2::MICROMAP_WRITE_EXT.as_raw()
            | vk::AccessFlags2::OPTICAL_FLOW_WRITE_NV.as_raw(),
    );
    !(access & WRITE_MASK).is_empty()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reset_stages_keeps_layout_and_ownership() {
        let state = TextureState::default()
            .with_pipeline_stage(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .with_access_flag(vk::AccessFlags2::SHADER_READ)
            .with_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
            .with_queue_family(2);

        let reset = state.reset_stages();
        assert_eq!(reset.pipeline_stage, vk::PipelineStageFlags2::NONE);
        assert_eq!(reset.access_flag, vk::AccessFlags2::NONE);
        assert_eq!(reset.layout, vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL);
        assert_eq!(reset.queue_family_index, Some(2));
    }

    #[test]
    fn write_access_is_detected() {
        assert!(access_can_write(vk::AccessFlags2::TRANSFER_WRITE));
        assert!(access_can_write(vk::AccessFlags2::COLOR_ATTACHMENT_WRITE));
    }

    #[test]
    fn read_only_access_is_not_a_write() {
        assert!(!access_can_write(vk::AccessFlags2::SHADER_READ));
        assert!(!access_can_write(vk::AccessFlags2::TRANSFER_READ));
        assert!(!access_can_write(vk::AccessFlags2::NONE));
    }
}

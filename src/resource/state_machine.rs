//! Proposed-state tracking and barrier coalescing within the scope of a
//! single command buffer.
//!
//! Grounded on `synchronization/ResourceStateMachine.cpp`: callers
//! record proposed next states for textures and buffers touched by a
//! pass, then `commit_changes` diffs each proposal against the
//! resource's live state, narrows read-only current states to `NONE`
//! source stage/access (they never need a cache flush), and packs every
//! resulting barrier into one `vkCmdPipelineBarrier2` call.

use std::collections::HashMap;

use ash::{vk, Device};

use crate::error::EngineResult;
use crate::resource::buffer::Buffer;
use crate::resource::state::{access_can_write, BufferState, ResourceId, TextureState};
use crate::resource::texture::Texture;
use crate::sync::object::SyncObject;
use crate::sync::primitives::SemaphoreKind;

/// Accumulates proposed state changes for textures and buffers touched
/// within one command buffer's recording scope, then emits the combined
/// barrier set on [`Self::commit_changes`].
pub struct ResourceStateMachine<'a> {
    images: HashMap<ResourceId, (&'a Texture, TextureState)>,
    buffers: HashMap<ResourceId, (&'a Buffer, BufferState)>,
}

impl<'a> ResourceStateMachine<'a> {
    /// An empty state machine with no pending proposals.
    #[must_use]
    pub fn new() -> Self {
        Self {
            images: HashMap::new(),
            buffers: HashMap::new(),
        }
    }

    /// Propose `next_state` for `texture`, overwriting any earlier
    /// proposal recorded in this scope for the same resource. An
    /// `UNDEFINED` layout in `next_state` is resolved to the texture's
    /// current live layout (undefined-to-undefined transitions are
    /// never intended).
    pub fn record_texture_state(&mut self, texture: &'a Texture, mut next_state: TextureState) {
        if next_state.layout == vk::ImageLayout::UNDEFINED {
            next_state.layout = texture.state().layout;
        }
        self.images.insert(texture.id(), (texture, next_state));
    }

    /// Propose `next_state` for `buffer`, overwriting any earlier
    /// proposal recorded in this scope for the same resource.
    pub fn record_buffer_state(&mut self, buffer: &'a Buffer, next_state: BufferState) {
        self.buffers.insert(buffer.id(), (buffer, next_state));
    }

    /// Diff every recorded proposal against its resource's live state,
    /// pack the resulting barriers into one `vkCmdPipelineBarrier2`
    /// call, and update live resource states to match. Resources whose
    /// proposal matches (narrowed) live state are skipped — no barrier
    /// is emitted for a no-op transition.
    pub fn commit_changes(&mut self, device: &Device, command_buffer: vk::CommandBuffer) {
        let image_barriers = self.drain_image_barriers();
        let buffer_barriers = self.drain_buffer_barriers();
        if image_barriers.is_empty() && buffer_barriers.is_empty() {
            return;
        }

        let dependency_info = vk::DependencyInfo::builder()
            .image_memory_barriers(&image_barriers)
            .buffer_memory_barriers(&buffer_barriers);

        // SAFETY: `command_buffer` is in the recording state and owned by
        // the caller for the duration of this call.
        unsafe { device.cmd_pipeline_barrier2(command_buffer, &dependency_info) };
    }

    fn drain_image_barriers(&mut self) -> Vec<vk::ImageMemoryBarrier2> {
        let mut barriers = Vec::new();
        for (_, (texture, next_state)) in self.images.drain() {
            let mut current = texture.state();
            narrow_read_only(&mut current.pipeline_stage, &mut current.access_flag);
            if current == next_state {
                continue;
            }

            let mut barrier = vk::ImageMemoryBarrier2::builder()
                .image(texture.image())
                .src_stage_mask(current.pipeline_stage)
                .src_access_mask(current.access_flag)
                .dst_stage_mask(next_state.pipeline_stage)
                .dst_access_mask(next_state.access_flag)
                .old_layout(current.layout)
                .new_layout(next_state.layout)
                .subresource_range(texture.full_subresource_range());

            if let (Some(src), Some(dst)) = (current.queue_family_index, next_state.queue_family_index) {
                if src != dst {
                    barrier = barrier.src_queue_family_index(src).dst_queue_family_index(dst);
                }
            }

            texture.override_state(next_state);
            barriers.push(barrier.build());
        }
        barriers
    }

    fn drain_buffer_barriers(&mut self) -> Vec<vk::BufferMemoryBarrier2> {
        let mut barriers = Vec::new();
        for (_, (buffer, next_state)) in self.buffers.drain() {
            let mut current = buffer.state();
            narrow_read_only(&mut current.pipeline_stage, &mut current.access_flag);
            if current == next_state {
                continue;
            }

            let mut barrier = vk::BufferMemoryBarrier2::builder()
                .buffer(buffer.handle())
                .offset(0)
                .size(buffer.size())
                .src_stage_mask(current.pipeline_stage)
                .src_access_mask(current.access_flag)
                .dst_stage_mask(next_state.pipeline_stage)
                .dst_access_mask(next_state.access_flag);

            if let (Some(src), Some(dst)) = (current.queue_family_index, next_state.queue_family_index) {
                if src != dst {
                    barrier = barrier.src_queue_family_index(src).dst_queue_family_index(dst);
                }
            }

            buffer.override_state(next_state);
            barriers.push(barrier.build());
        }
        barriers
    }
}

impl Default for ResourceStateMachine<'_> {
    fn default() -> Self {
        Self::new()
    }
}

/// If `access` is read-only (cannot make changes to memory), collapse
/// `stage`/`access` to `NONE`: a read-only current state never needs a
/// cache flush before the next transition.
fn narrow_read_only(stage: &mut vk::PipelineStageFlags2, access: &mut vk::AccessFlags2) {
    if !access_can_write(*access) {
        *stage = vk::PipelineStageFlags2::NONE;
        *access = vk::AccessFlags2::NONE;
    }
}

/// Zero stage and access on `texture` while keeping its layout, used at
/// frame boundaries to prevent a stale read mask surviving into the next
/// frame.
pub fn reset_texture_stages(texture: &Texture) {
    texture.override_state(texture.state().reset_stages());
}

/// Zero stage and access on `buffer` while keeping its queue family.
pub fn reset_buffer_stages(buffer: &Buffer) {
    buffer.override_state(buffer.state().reset_stages());
}

/// Emit a matched release (on `src_command_buffer`, `src_queue_family`)
/// and acquire (on `dst_command_buffer`, `dst_queue_family`) barrier
/// pair for `texture`, bridged by a dedicated timeline semaphore
/// registered into `sync` under `semaphore_name`: the release signals
/// `signal_group` at `value`, the acquire waits on `wait_group` at
/// `value`. A split-queue transfer chains two of these calls back to
/// back (owner→transfer, transfer→destination); callers must give each
/// call its own `signal_group`/`wait_group` pair and a strictly
/// increasing `value` so the two legs' operations land on the
/// submissions that actually need them, and the second acquire can't be
/// satisfied by the first release's signal alone.
///
/// # Errors
/// Propagates semaphore registration failures from `sync`.
#[allow(clippy::too_many_arguments)]
pub fn transfer_texture_ownership(
    device: &Device,
    texture: &Texture,
    next_state: TextureState,
    src_queue_family: u32,
    dst_queue_family: u32,
    src_command_buffer: vk::CommandBuffer,
    dst_command_buffer: vk::CommandBuffer,
    sync: &mut SyncObject,
    semaphore_name: &str,
    signal_group: &str,
    wait_group: &str,
    value: u64,
) -> EngineResult<()> {
    if !sync.primitives().has_semaphore(semaphore_name) {
        sync.primitives_mut().register(
            device,
            semaphore_name,
            SemaphoreKind::Timeline { width: 1 },
        )?;
    }

    let current = texture.state();
    let release_barrier = vk::ImageMemoryBarrier2::builder()
        .image(texture.image())
        .src_stage_mask(current.pipeline_stage)
        .src_access_mask(current.access_flag)
        .dst_stage_mask(vk::PipelineStageFlags2::NONE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .old_layout(current.layout)
        .new_layout(next_state.layout)
        .src_queue_family_index(src_queue_family)
        .dst_queue_family_index(dst_queue_family)
        .subresource_range(texture.full_subresource_range())
        .build();
    let release_dependency = vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&release_barrier));
    // SAFETY: `src_command_buffer` is in the recording state, owned by
    // the caller for the duration of this call.
    unsafe { device.cmd_pipeline_barrier2(src_command_buffer, &release_dependency) };

    let acquire_barrier = vk::ImageMemoryBarrier2::builder()
        .image(texture.image())
        .src_stage_mask(vk::PipelineStageFlags2::NONE)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(next_state.pipeline_stage)
        .dst_access_mask(next_state.access_flag)
        .old_layout(current.layout)
        .new_layout(next_state.layout)
        .src_queue_family_index(src_queue_family)
        .dst_queue_family_index(dst_queue_family)
        .subresource_range(texture.full_subresource_range())
        .build();
    let acquire_dependency = vk::DependencyInfo::builder().image_memory_barriers(std::slice::from_ref(&acquire_barrier));
    // SAFETY: `dst_command_buffer` is in the recording state, owned by
    // the caller for the duration of this call; the acquire is expected
    // to be submitted only after the release's signal is waited on.
    unsafe { device.cmd_pipeline_barrier2(dst_command_buffer, &acquire_dependency) };

    sync.add_signal(
        signal_group,
        crate::sync::object::SyncOperation::timeline(semaphore_name, vk::PipelineStageFlags2::ALL_COMMANDS, value),
    );
    sync.add_wait(
        wait_group,
        crate::sync::object::SyncOperation::timeline(semaphore_name, vk::PipelineStageFlags2::ALL_COMMANDS, value),
    );

    texture.override_state(next_state.with_queue_family(dst_queue_family));
    Ok(())
}

/// Buffer analogue of [`transfer_texture_ownership`]: the same matched
/// release/acquire pair, built from [`vk::BufferMemoryBarrier2`] since a
/// buffer carries no layout.
///
/// # Errors
/// Propagates semaphore registration failures from `sync`.
#[allow(clippy::too_many_arguments)]
pub fn transfer_buffer_ownership(
    device: &Device,
    buffer: &Buffer,
    next_state: BufferState,
    src_queue_family: u32,
    dst_queue_family: u32,
    src_command_buffer: vk::CommandBuffer,
    dst_command_buffer: vk::CommandBuffer,
    sync: &mut SyncObject,
    semaphore_name: &str,
    signal_group: &str,
    wait_group: &str,
    value: u64,
) -> EngineResult<()> {
    if !sync.primitives().has_semaphore(semaphore_name) {
        sync.primitives_mut().register(
            device,
            semaphore_name,
            SemaphoreKind::Timeline { width: 1 },
        )?;
    }

    let current = buffer.state();
    let release_barrier = vk::BufferMemoryBarrier2::builder()
        .buffer(buffer.handle())
        .offset(0)
        .size(buffer.size())
        .src_stage_mask(current.pipeline_stage)
        .src_access_mask(current.access_flag)
        .dst_stage_mask(vk::PipelineStageFlags2::NONE)
        .dst_access_mask(vk::AccessFlags2::NONE)
        .src_queue_family_index(src_queue_family)
        .dst_queue_family_index(dst_queue_family)
        .build();
    let release_dependency = vk::DependencyInfo::builder().buffer_memory_barriers(std::slice::from_ref(&release_barrier));
    // SAFETY: `src_command_buffer` is in the recording state, owned by
    // the caller for the duration of this call.
    unsafe { device.cmd_pipeline_barrier2(src_command_buffer, &release_dependency) };

    let acquire_barrier = vk::BufferMemoryBarrier2::builder()
        .buffer(buffer.handle())
        .offset(0)
        .size(buffer.size())
        .src_stage_mask(vk::PipelineStageFlags2::NONE)
        .src_access_mask(vk::AccessFlags2::NONE)
        .dst_stage_mask(next_state.pipeline_stage)
        .dst_access_mask(next_state.access_flag)
        .src_queue_family_index(src_queue_family)
        .dst_queue_family_index(dst_queue_family)
        .build();
    let acquire_dependency = vk::DependencyInfo::builder().buffer_memory_barriers(std::slice::from_ref(&acquire_barrier));
    // SAFETY: `dst_command_buffer` is in the recording state, owned by
    // the caller for the duration of this call; the acquire is expected
    // to be submitted only after the release's signal is waited on.
    unsafe { device.cmd_pipeline_barrier2(dst_command_buffer, &acquire_dependency) };

    sync.add_signal(
        signal_group,
        crate::sync::object::SyncOperation::timeline(semaphore_name, vk::PipelineStageFlags2::ALL_COMMANDS, value),
    );
    sync.add_wait(
        wait_group,
        crate::sync::object::SyncOperation::timeline(semaphore_name, vk::PipelineStageFlags2::ALL_COMMANDS, value),
    );

    buffer.override_state(next_state.with_queue_family(dst_queue_family));
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_only_current_state_is_narrowed_to_none() {
        let mut stage = vk::PipelineStageFlags2::FRAGMENT_SHADER;
        let mut access = vk::AccessFlags2::SHADER_READ;
        narrow_read_only(&mut stage, &mut access);
        assert_eq!(stage, vk::PipelineStageFlags2::NONE);
        assert_eq!(access, vk::AccessFlags2::NONE);
    }

    #[test]
    fn write_current_state_is_not_narrowed() {
        let mut stage = vk::PipelineStageFlags2::TRANSFER;
        let mut access = vk::AccessFlags2::TRANSFER_WRITE;
        narrow_read_only(&mut stage, &mut access);
        assert_eq!(stage, vk::PipelineStageFlags2::TRANSFER);
        assert_eq!(access, vk::AccessFlags2::TRANSFER_WRITE);
    }

    #[test]
    fn matching_proposal_produces_no_image_barrier() {
        let mut machine = ResourceStateMachine::new();
        let state = TextureState::default().with_layout(vk::ImageLayout::GENERAL);
        // Construct a minimal texture without a device via the same
        // pattern texture.rs's own tests use.
        let texture = crate::resource::texture::Texture::new(
            vk::Image::null(),
            unsafe { std::mem::zeroed() },
            vk::Format::R8G8B8A8_UNORM,
            vk::Extent3D { width: 1, height: 1, depth: 1 },
            vk::ImageAspectFlags::COLOR,
            1,
            1,
            vk::ImageLayout::GENERAL,
        );
        machine.record_texture_state(&texture, state);
        let barriers = machine.drain_image_barriers();
        assert!(barriers.is_empty());
    }
}

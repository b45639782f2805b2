//! Upload/download task scheduling between a source/destination queue
//! family and a dedicated transfer queue.
//!
//! Grounded on `original_source/render_engine/src/DataTransferScheduler.cpp`:
//! when source, transfer, and destination all live on the same queue
//! family, one submission suffices (the unified path: transition to
//! `TRANSFER_DST`/`TRANSFER_SRC`, copy, transition to the task's final
//! state). When the transfer family differs from the owning family, the
//! resource must be released to the transfer queue, copied, and
//! acquired back on the destination queue — three submissions bridged
//! by the `DataTransferFinished` timeline semaphore this module names
//! after the original's constant of the same role.

use std::collections::HashMap;

use ash::{vk, Device};

use crate::config::TransferPathPreference;
use crate::error::EngineResult;
use crate::resource::buffer::Buffer;
use crate::resource::state::{BufferState, ResourceId, TextureState};
use crate::resource::state_machine::{transfer_buffer_ownership, transfer_texture_ownership, ResourceStateMachine};
use crate::resource::texture::Texture;
use crate::sync::object::{SyncObject, SyncOperation};
use crate::sync::primitives::SemaphoreKind;

/// Name of the timeline semaphore bridging the release/copy/acquire
/// submissions of a split-queue transfer.
pub const DATA_TRANSFER_FINISHED_SEMAPHORE: &str = "DataTransferFinished";

/// Operation group a split transfer's owner→transfer release barrier
/// signals.
pub const SPLIT_RELEASE_GROUP: &str = "transfer_split_release";
/// Operation group the transfer-queue submission waits on before its
/// copy (matched against [`SPLIT_RELEASE_GROUP`]'s signal).
pub const SPLIT_TRANSFER_WAIT_GROUP: &str = "transfer_split_transfer_wait";
/// Operation group the transfer-queue submission signals once its copy
/// and acquire barrier are recorded.
pub const SPLIT_TRANSFER_SIGNAL_GROUP: &str = "transfer_split_transfer_signal";
/// Operation group the destination-queue submission waits on (matched
/// against [`SPLIT_TRANSFER_SIGNAL_GROUP`]'s signal).
pub const SPLIT_ACQUIRE_GROUP: &str = "transfer_split_acquire";

/// Direction of a scheduled transfer, used only for diagnostics and
/// layout selection (download reads from `TRANSFER_SRC_OPTIMAL`, upload
/// writes to `TRANSFER_DST_OPTIMAL`).
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransferDirection {
    /// Host-to-device copy.
    Upload,
    /// Device-to-host copy.
    Download,
}

impl TransferDirection {
    fn transfer_layout(self) -> vk::ImageLayout {
        match self {
            TransferDirection::Upload => vk::ImageLayout::TRANSFER_DST_OPTIMAL,
            TransferDirection::Download => vk::ImageLayout::TRANSFER_SRC_OPTIMAL,
        }
    }

    fn transfer_access(self) -> vk::AccessFlags2 {
        match self {
            TransferDirection::Upload => vk::AccessFlags2::TRANSFER_WRITE,
            TransferDirection::Download => vk::AccessFlags2::TRANSFER_READ,
        }
    }
}

/// A deferred texture transfer: staging buffer contents, the resource
/// it targets, and the state it should end up in once committed.
pub struct PendingTextureTransfer {
    direction: TransferDirection,
    resource_id: ResourceId,
    final_state: TextureState,
    extent: vk::Extent3D,
    /// Sync operations accumulated from every coalesced request for this
    /// resource, merged into the scheduled submission's wait/signal
    /// lists rather than issuing a second redundant copy.
    merged_waits: Vec<SyncOperation>,
}

/// A deferred buffer transfer, the buffer analogue of
/// [`PendingTextureTransfer`].
pub struct PendingBufferTransfer {
    direction: TransferDirection,
    resource_id: ResourceId,
    final_state: BufferState,
    size: vk::DeviceSize,
    merged_waits: Vec<SyncOperation>,
}

/// Schedules and executes upload/download tasks, coalescing repeated
/// requests against the same resource and choosing between the unified
/// and split-queue submission paths per [`TransferPathPreference`].
pub struct TransferScheduler {
    preference: TransferPathPreference,
    pending_texture_uploads: HashMap<ResourceId, PendingTextureTransfer>,
    pending_texture_downloads: HashMap<ResourceId, PendingTextureTransfer>,
    pending_buffer_uploads: HashMap<ResourceId, PendingBufferTransfer>,
    pending_buffer_downloads: HashMap<ResourceId, PendingBufferTransfer>,
}

impl TransferScheduler {
    /// Construct an empty scheduler honoring `preference` for path
    /// selection.
    #[must_use]
    pub fn new(preference: TransferPathPreference) -> Self {
        Self {
            preference,
            pending_texture_uploads: HashMap::new(),
            pending_texture_downloads: HashMap::new(),
            pending_buffer_uploads: HashMap::new(),
            pending_buffer_downloads: HashMap::new(),
        }
    }

    /// Whether a unified (single-submission) path should be used given
    /// that `owning_family` currently holds the resource and
    /// `transfer_family`/`destination_family` would service the copy.
    #[must_use]
    pub fn use_unified_path(&self, owning_family: u32, transfer_family: u32, destination_family: u32) -> bool {
        match self.preference {
            TransferPathPreference::ForceSplit => false,
            TransferPathPreference::PreferUnified => {
                owning_family == transfer_family && transfer_family == destination_family
            }
        }
    }

    /// Queue a texture upload. If a transfer is already pending for this
    /// resource, its wait operations are merged into the existing
    /// pending task instead of scheduling a second copy.
    pub fn upload_texture(
        &mut self,
        texture: &Texture,
        final_state: TextureState,
        waits: &[SyncOperation],
    ) {
        let resource_id = texture.id();
        let extent = texture.extent();
        self.insert_texture_transfer(
            resource_id,
            extent,
            final_state,
            TransferDirection::Upload,
            waits,
            true,
        );
    }

    /// Queue a texture download. See [`Self::upload_texture`] for the
    /// coalescing rule.
    pub fn download_texture(
        &mut self,
        texture: &Texture,
        final_state: TextureState,
        waits: &[SyncOperation],
    ) {
        let resource_id = texture.id();
        let extent = texture.extent();
        self.insert_texture_transfer(
            resource_id,
            extent,
            final_state,
            TransferDirection::Download,
            waits,
            false,
        );
    }

    fn insert_texture_transfer(
        &mut self,
        resource_id: ResourceId,
        extent: vk::Extent3D,
        final_state: TextureState,
        direction: TransferDirection,
        waits: &[SyncOperation],
        is_upload: bool,
    ) {
        let map = if is_upload {
            &mut self.pending_texture_uploads
        } else {
            &mut self.pending_texture_downloads
        };
        map.entry(resource_id)
            .and_modify(|pending| pending.merged_waits.extend(waits.iter().cloned()))
            .or_insert_with(|| PendingTextureTransfer {
                direction,
                resource_id,
                final_state,
                extent,
                merged_waits: waits.to_vec(),
            });
    }

    /// Queue a buffer upload, coalescing against any already-pending
    /// transfer for the same resource.
    pub fn upload_buffer(&mut self, buffer: &Buffer, final_state: BufferState, waits: &[SyncOperation]) {
        self.insert_buffer_transfer(buffer, final_state, TransferDirection::Upload, waits, true);
    }

    /// Queue a buffer download. See [`Self::upload_buffer`] for the
    /// coalescing rule.
    pub fn download_buffer(&mut self, buffer: &Buffer, final_state: BufferState, waits: &[SyncOperation]) {
        self.insert_buffer_transfer(buffer, final_state, TransferDirection::Download, waits, false);
    }

    fn insert_buffer_transfer(
        &mut self,
        buffer: &Buffer,
        final_state: BufferState,
        direction: TransferDirection,
        waits: &[SyncOperation],
        is_upload: bool,
    ) {
        let resource_id = buffer.id();
        let size = buffer.size();
        let map = if is_upload {
            &mut self.pending_buffer_uploads
        } else {
            &mut self.pending_buffer_downloads
        };
        map.entry(resource_id)
            .and_modify(|pending| pending.merged_waits.extend(waits.iter().cloned()))
            .or_insert_with(|| PendingBufferTransfer {
                direction,
                resource_id,
                final_state,
                size,
                merged_waits: waits.to_vec(),
            });
    }

    /// Number of texture uploads currently pending execution.
    #[must_use]
    pub fn pending_texture_upload_count(&self) -> usize {
        self.pending_texture_uploads.len()
    }

    /// Whether any texture or buffer upload/download is currently
    /// queued for execution, across all four pending sets.
    #[must_use]
    pub fn has_pending_transfers(&self) -> bool {
        !self.pending_texture_uploads.is_empty()
            || !self.pending_texture_downloads.is_empty()
            || !self.pending_buffer_uploads.is_empty()
            || !self.pending_buffer_downloads.is_empty()
    }

    /// Resource ids of every texture transfer (upload or download)
    /// currently pending, for a caller that needs to decide a path per
    /// resource before executing anything.
    #[must_use]
    pub fn pending_texture_ids(&self) -> Vec<ResourceId> {
        self.pending_texture_uploads
            .keys()
            .chain(self.pending_texture_downloads.keys())
            .copied()
            .collect()
    }

    /// Resource ids of every buffer transfer (upload or download)
    /// currently pending.
    #[must_use]
    pub fn pending_buffer_ids(&self) -> Vec<ResourceId> {
        self.pending_buffer_uploads
            .keys()
            .chain(self.pending_buffer_downloads.keys())
            .copied()
            .collect()
    }

    /// Execute every pending texture transfer via the unified path:
    /// transition each to its transfer layout, record the
    /// buffer-to-image/image-to-buffer copy against `staging`, then
    /// transition to each task's final state — all on `command_buffer`
    /// (already allocated from the owning queue's command context). Any
    /// waits a request was queued with (e.g. a host-write-finished
    /// semaphore for a staging buffer still being filled) are folded
    /// into `wait_group` so the caller's submission picks them up.
    /// Clears both texture pending sets.
    ///
    /// Callers choose this path only when [`Self::use_unified_path`]
    /// returned `true` for the resource's owning/transfer/destination
    /// families.
    pub fn execute_unified<'a>(
        &mut self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        textures: impl Fn(ResourceId) -> &'a Texture,
        staging: impl Fn(ResourceId) -> &'a Buffer,
        sync: &mut SyncObject,
        wait_group: &str,
    ) {
        let mut state_machine = ResourceStateMachine::new();
        for pending in self.pending_texture_uploads.values().chain(self.pending_texture_downloads.values()) {
            let texture = textures(pending.resource_id);
            state_machine.record_texture_state(
                texture,
                TextureState::default()
                    .with_pipeline_stage(vk::PipelineStageFlags2::TRANSFER)
                    .with_access_flag(pending.direction.transfer_access())
                    .with_layout(pending.direction.transfer_layout()),
            );
            for wait in &pending.merged_waits {
                sync.add_wait(wait_group, wait.clone());
            }
        }
        state_machine.commit_changes(device, command_buffer);

        for pending in self.pending_texture_uploads.values().chain(self.pending_texture_downloads.values()) {
            let texture = textures(pending.resource_id);
            let staging_buffer = staging(pending.resource_id);
            record_texture_copy(device, command_buffer, texture, staging_buffer, pending.direction, pending.extent);
        }

        for pending in self.pending_texture_uploads.values().chain(self.pending_texture_downloads.values()) {
            let texture = textures(pending.resource_id);
            state_machine.record_texture_state(texture, pending.final_state);
        }
        state_machine.commit_changes(device, command_buffer);

        self.pending_texture_uploads.clear();
        self.pending_texture_downloads.clear();
    }

    /// Buffer analogue of [`Self::execute_unified`]: transitions, copies
    /// via `cmd_copy_buffer2` against `staging`, and final transitions,
    /// all on `command_buffer`. Clears both buffer pending sets.
    pub fn execute_unified_buffers<'a>(
        &mut self,
        device: &Device,
        command_buffer: vk::CommandBuffer,
        buffers: impl Fn(ResourceId) -> &'a Buffer,
        staging: impl Fn(ResourceId) -> &'a Buffer,
        sync: &mut SyncObject,
        wait_group: &str,
    ) {
        let mut state_machine = ResourceStateMachine::new();
        for pending in self.pending_buffer_uploads.values().chain(self.pending_buffer_downloads.values()) {
            let buffer = buffers(pending.resource_id);
            state_machine.record_buffer_state(
                buffer,
                BufferState::default()
                    .with_pipeline_stage(vk::PipelineStageFlags2::TRANSFER)
                    .with_access_flag(pending.direction.transfer_access()),
            );
            for wait in &pending.merged_waits {
                sync.add_wait(wait_group, wait.clone());
            }
        }
        state_machine.commit_changes(device, command_buffer);

        for pending in self.pending_buffer_uploads.values().chain(self.pending_buffer_downloads.values()) {
            let buffer = buffers(pending.resource_id);
            let staging_buffer = staging(pending.resource_id);
            record_buffer_copy(device, command_buffer, buffer, staging_buffer, pending.direction, pending.size);
        }

        for pending in self.pending_buffer_uploads.values().chain(self.pending_buffer_downloads.values()) {
            let buffer = buffers(pending.resource_id);
            state_machine.record_buffer_state(buffer, pending.final_state);
        }
        state_machine.commit_changes(device, command_buffer);

        self.pending_buffer_uploads.clear();
        self.pending_buffer_downloads.clear();
    }

    /// Execute a pending texture transfer via the split-queue path: emit
    /// a release barrier on `src_command_buffer` (owning family), record
    /// the copy against `staging` on `transfer_command_buffer` (transfer
    /// family), and an acquire barrier on `dst_command_buffer`
    /// (destination family), all bridged by
    /// [`DATA_TRANSFER_FINISHED_SEMAPHORE`] stepped to a fresh window on
    /// `sync` for this call.
    ///
    /// # Errors
    /// Propagates semaphore registration failures.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_split(
        &mut self,
        device: &Device,
        texture: &Texture,
        staging: &Buffer,
        src_queue_family: u32,
        transfer_queue_family: u32,
        dst_queue_family: u32,
        src_command_buffer: vk::CommandBuffer,
        transfer_command_buffer: vk::CommandBuffer,
        dst_command_buffer: vk::CommandBuffer,
        sync: &mut SyncObject,
    ) -> EngineResult<()> {
        let Some(pending) = self
            .pending_texture_uploads
            .remove(&texture.id())
            .or_else(|| self.pending_texture_downloads.remove(&texture.id()))
        else {
            return Ok(());
        };

        if !sync.primitives().has_semaphore(DATA_TRANSFER_FINISHED_SEMAPHORE) {
            sync.primitives_mut().register(
                device,
                DATA_TRANSFER_FINISHED_SEMAPHORE,
                SemaphoreKind::Timeline { width: 2 },
            )?;
        }
        // Every split transfer gets its own two-value window so
        // concurrent transfers within one frame, or the same resource
        // across frames, never reuse an already-signaled value.
        sync.step_timeline(DATA_TRANSFER_FINISHED_SEMAPHORE)?;

        let transfer_layout = pending.direction.transfer_layout();

        transfer_texture_ownership(
            device,
            texture,
            TextureState::default()
                .with_pipeline_stage(vk::PipelineStageFlags2::TRANSFER)
                .with_access_flag(pending.direction.transfer_access())
                .with_layout(transfer_layout)
                .with_queue_family(transfer_queue_family),
            src_queue_family,
            transfer_queue_family,
            src_command_buffer,
            transfer_command_buffer,
            sync,
            DATA_TRANSFER_FINISHED_SEMAPHORE,
            SPLIT_RELEASE_GROUP,
            SPLIT_TRANSFER_WAIT_GROUP,
            1,
        )?;
        for wait in &pending.merged_waits {
            sync.add_wait(SPLIT_RELEASE_GROUP, wait.clone());
        }

        record_texture_copy(device, transfer_command_buffer, texture, staging, pending.direction, pending.extent);

        transfer_texture_ownership(
            device,
            texture,
            pending.final_state.with_queue_family(dst_queue_family),
            transfer_queue_family,
            dst_queue_family,
            transfer_command_buffer,
            dst_command_buffer,
            sync,
            DATA_TRANSFER_FINISHED_SEMAPHORE,
            SPLIT_TRANSFER_SIGNAL_GROUP,
            SPLIT_ACQUIRE_GROUP,
            2,
        )?;

        Ok(())
    }

    /// Buffer analogue of [`Self::execute_split`].
    ///
    /// # Errors
    /// Propagates semaphore registration failures.
    #[allow(clippy::too_many_arguments)]
    pub fn execute_split_buffer(
        &mut self,
        device: &Device,
        buffer: &Buffer,
        staging: &Buffer,
        src_queue_family: u32,
        transfer_queue_family: u32,
        dst_queue_family: u32,
        src_command_buffer: vk::CommandBuffer,
        transfer_command_buffer: vk::CommandBuffer,
        dst_command_buffer: vk::CommandBuffer,
        sync: &mut SyncObject,
    ) -> EngineResult<()> {
        let Some(pending) = self
            .pending_buffer_uploads
            .remove(&buffer.id())
            .or_else(|| self.pending_buffer_downloads.remove(&buffer.id()))
        else {
            return Ok(());
        };

        if !sync.primitives().has_semaphore(DATA_TRANSFER_FINISHED_SEMAPHORE) {
            sync.primitives_mut().register(
                device,
                DATA_TRANSFER_FINISHED_SEMAPHORE,
                SemaphoreKind::Timeline { width: 2 },
            )?;
        }
        sync.step_timeline(DATA_TRANSFER_FINISHED_SEMAPHORE)?;

        transfer_buffer_ownership(
            device,
            buffer,
            BufferState::default()
                .with_pipeline_stage(vk::PipelineStageFlags2::TRANSFER)
                .with_access_flag(pending.direction.transfer_access())
                .with_queue_family(transfer_queue_family),
            src_queue_family,
            transfer_queue_family,
            src_command_buffer,
            transfer_command_buffer,
            sync,
            DATA_TRANSFER_FINISHED_SEMAPHORE,
            SPLIT_RELEASE_GROUP,
            SPLIT_TRANSFER_WAIT_GROUP,
            1,
        )?;
        for wait in &pending.merged_waits {
            sync.add_wait(SPLIT_RELEASE_GROUP, wait.clone());
        }

        record_buffer_copy(device, transfer_command_buffer, buffer, staging, pending.direction, pending.size);

        transfer_buffer_ownership(
            device,
            buffer,
            pending.final_state.with_queue_family(dst_queue_family),
            transfer_queue_family,
            dst_queue_family,
            transfer_command_buffer,
            dst_command_buffer,
            sync,
            DATA_TRANSFER_FINISHED_SEMAPHORE,
            SPLIT_TRANSFER_SIGNAL_GROUP,
            SPLIT_ACQUIRE_GROUP,
            2,
        )?;

        Ok(())
    }
}

/// Record the buffer-image copy for one texture transfer, staging
/// buffer contents into `texture` on upload or reading back into
/// `staging` on download. `texture`'s current layout must already be
/// `direction`'s transfer layout.
fn record_texture_copy(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    texture: &Texture,
    staging: &Buffer,
    direction: TransferDirection,
    extent: vk::Extent3D,
) {
    let region = vk::BufferImageCopy2::builder()
        .buffer_offset(0)
        .buffer_row_length(0)
        .buffer_image_height(0)
        .image_subresource(texture.full_subresource_layers())
        .image_offset(vk::Offset3D { x: 0, y: 0, z: 0 })
        .image_extent(extent)
        .build();
    let regions = std::slice::from_ref(&region);

    match direction {
        TransferDirection::Upload => {
            let copy_info = vk::CopyBufferToImageInfo2::builder()
                .src_buffer(staging.handle())
                .dst_image(texture.image())
                .dst_image_layout(direction.transfer_layout())
                .regions(regions);
            // SAFETY: both command buffers are in the recording state,
            // owned by the caller for the duration of this call.
            unsafe { device.cmd_copy_buffer_to_image2(command_buffer, &copy_info) };
        }
        TransferDirection::Download => {
            let copy_info = vk::CopyImageToBufferInfo2::builder()
                .src_image(texture.image())
                .src_image_layout(direction.transfer_layout())
                .dst_buffer(staging.handle())
                .regions(regions);
            // SAFETY: see above.
            unsafe { device.cmd_copy_image_to_buffer2(command_buffer, &copy_info) };
        }
    }
}

/// Record the buffer-to-buffer copy for one buffer transfer, the buffer
/// analogue of [`record_texture_copy`].
fn record_buffer_copy(
    device: &Device,
    command_buffer: vk::CommandBuffer,
    buffer: &Buffer,
    staging: &Buffer,
    direction: TransferDirection,
    size: vk::DeviceSize,
) {
    let region = vk::BufferCopy2::builder().src_offset(0).dst_offset(0).size(size).build();
    let regions = std::slice::from_ref(&region);

    let (src_buffer, dst_buffer) = match direction {
        TransferDirection::Upload => (staging.handle(), buffer.handle()),
        TransferDirection::Download => (buffer.handle(), staging.handle()),
    };
    let copy_info = vk::CopyBufferInfo2::builder()
        .src_buffer(src_buffer)
        .dst_buffer(dst_buffer)
        .regions(regions);
    // SAFETY: `command_buffer` is in the recording state, owned by the
    // caller for the duration of this call.
    unsafe { device.cmd_copy_buffer2(command_buffer, &copy_info) };
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn prefer_unified_matches_only_when_all_families_agree() {
        let scheduler = TransferScheduler::new(TransferPathPreference::PreferUnified);
        assert!(scheduler.use_unified_path(0, 0, 0));
        assert!(!scheduler.use_unified_path(0, 1, 0));
        assert!(!scheduler.use_unified_path(0, 0, 1));
    }

    #[test]
    fn force_split_never_uses_unified_path() {
        let scheduler = TransferScheduler::new(TransferPathPreference::ForceSplit);
        assert!(!scheduler.use_unified_path(0, 0, 0));
    }

    #[test]
    fn repeated_upload_request_coalesces_into_one_pending_task() {
        let mut scheduler = TransferScheduler::new(TransferPathPreference::PreferUnified);
        let resource_id = ResourceId::next();
        let extent = vk::Extent3D { width: 4, height: 4, depth: 1 };
        let state = TextureState::default();

        scheduler.insert_texture_transfer(resource_id, extent, state, TransferDirection::Upload, &[], true);
        scheduler.insert_texture_transfer(
            resource_id,
            extent,
            state,
            TransferDirection::Upload,
            &[SyncOperation::binary("extra_wait", vk::PipelineStageFlags2::TRANSFER)],
            true,
        );

        assert_eq!(scheduler.pending_texture_upload_count(), 1);
        let pending = &scheduler.pending_texture_uploads[&resource_id];
        assert_eq!(pending.merged_waits.len(), 1);
    }

    #[test]
    fn download_buffer_is_coalesced_separately_from_uploads() {
        let mut scheduler = TransferScheduler::new(TransferPathPreference::PreferUnified);
        let buffer = Buffer::new(vk::Buffer::null(), unsafe { std::mem::zeroed() }, 256);
        let state = BufferState::default();

        scheduler.insert_buffer_transfer(&buffer, state, TransferDirection::Download, &[], false);

        assert!(scheduler.pending_buffer_downloads.contains_key(&buffer.id()));
        assert!(scheduler.pending_buffer_uploads.is_empty());
        assert!(scheduler.has_pending_transfers());
    }
}

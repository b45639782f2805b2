//! GPU image resources and their views.
//!
//! Grounded on `original_source/render_engine/src/resources/Texture.cpp`
//! for the handle/subresource-range/live-state shape; allocation itself
//! goes through `vk-mem`, following the teacher's `render/vulkan` family
//! of thin RAII wrappers around allocator-backed resources.

use std::sync::Mutex;

use ash::vk;

use crate::resource::state::{ResourceId, TextureState};

/// A GPU image plus the live state [`crate::resource::state_machine::ResourceStateMachine`]
/// reads and updates across barrier commits.
pub struct Texture {
    id: ResourceId,
    image: vk::Image,
    allocation: vk_mem::Allocation,
    format: vk::Format,
    extent: vk::Extent3D,
    aspect_mask: vk::ImageAspectFlags,
    mip_levels: u32,
    array_layers: u32,
    state: Mutex<TextureState>,
}

impl Texture {
    /// Wrap an already-allocated image. `initial_layout` seeds the live
    /// state (`UNDEFINED` unless the caller knows otherwise, e.g. a
    /// swapchain image handed back already in `PRESENT_SRC_KHR`).
    #[must_use]
    pub fn new(
        image: vk::Image,
        allocation: vk_mem::Allocation,
        format: vk::Format,
        extent: vk::Extent3D,
        aspect_mask: vk::ImageAspectFlags,
        mip_levels: u32,
        array_layers: u32,
        initial_layout: vk::ImageLayout,
    ) -> Self {
        Self {
            id: ResourceId::next(),
            image,
            allocation,
            format,
            extent,
            aspect_mask,
            mip_levels,
            array_layers,
            state: Mutex::new(TextureState::default().with_layout(initial_layout)),
        }
    }

    /// Stable identity for state-machine bookkeeping.
    #[must_use]
    pub fn id(&self) -> ResourceId {
        self.id
    }

    /// The underlying Vulkan image handle.
    #[must_use]
    pub fn image(&self) -> vk::Image {
        self.image
    }

    /// The image format it was created with.
    #[must_use]
    pub fn format(&self) -> vk::Format {
        self.format
    }

    /// The image extent it was created with.
    #[must_use]
    pub fn extent(&self) -> vk::Extent3D {
        self.extent
    }

    /// The full subresource range covering every mip and array layer.
    #[must_use]
    pub fn full_subresource_range(&self) -> vk::ImageSubresourceRange {
        vk::ImageSubresourceRange {
            aspect_mask: self.aspect_mask,
            base_mip_level: 0,
            level_count: self.mip_levels,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// The mip-0, every-array-layer subresource layers a buffer-image
    /// copy targets; transfers always move the whole base level.
    #[must_use]
    pub fn full_subresource_layers(&self) -> vk::ImageSubresourceLayers {
        vk::ImageSubresourceLayers {
            aspect_mask: self.aspect_mask,
            mip_level: 0,
            base_array_layer: 0,
            layer_count: self.array_layers,
        }
    }

    /// The state currently believed live on the GPU.
    #[must_use]
    pub fn state(&self) -> TextureState {
        *self.state.lock().unwrap()
    }

    /// Overwrite the live state, called by the state machine once a
    /// barrier transitioning to `next` has been recorded.
    pub fn override_state(&self, next: TextureState) {
        *self.state.lock().unwrap() = next;
    }

    /// The `vk-mem` allocation backing this image, for destruction.
    #[must_use]
    pub fn allocation(&self) -> &vk_mem::Allocation {
        &self.allocation
    }
}

/// A view into a [`Texture`], the unit descriptor sets and framebuffers
/// bind against.
pub struct TextureView {
    handle: vk::ImageView,
    texture_id: ResourceId,
}

impl TextureView {
    /// Wrap an already-created image view for `texture`.
    #[must_use]
    pub fn new(handle: vk::ImageView, texture: &Texture) -> Self {
        Self {
            handle,
            texture_id: texture.id(),
        }
    }

    /// The underlying Vulkan image view handle.
    #[must_use]
    pub fn handle(&self) -> vk::ImageView {
        self.handle
    }

    /// Identity of the texture this view was created from.
    #[must_use]
    pub fn texture_id(&self) -> ResourceId {
        self.texture_id
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fake_texture(layout: vk::ImageLayout) -> Texture {
        Texture {
            id: ResourceId::next(),
            image: vk::Image::null(),
            allocation: unsafe { std::mem::zeroed() },
            format: vk::Format::R8G8B8A8_UNORM,
            extent: vk::Extent3D {
                width: 64,
                height: 64,
                depth: 1,
            },
            aspect_mask: vk::ImageAspectFlags::COLOR,
            mip_levels: 1,
            array_layers: 1,
            state: Mutex::new(TextureState::default().with_layout(layout)),
        }
    }

    #[test]
    fn override_state_updates_live_state() {
        let texture = fake_texture(vk::ImageLayout::UNDEFINED);
        let next = TextureState::default().with_layout(vk::ImageLayout::TRANSFER_DST_OPTIMAL);
        texture.override_state(next);
        assert_eq!(texture.state().layout, vk::ImageLayout::TRANSFER_DST_OPTIMAL);
    }

    #[test]
    fn full_subresource_range_covers_every_mip_and_layer() {
        let texture = fake_texture(vk::ImageLayout::UNDEFINED);
        let range = texture.full_subresource_range();
        assert_eq!(range.level_count, 1);
        assert_eq!(range.layer_count, 1);
        assert_eq!(range.aspect_mask, vk::ImageAspectFlags::COLOR);
    }

    #[test]
    fn full_subresource_layers_targets_mip_zero() {
        let texture = fake_texture(vk::ImageLayout::UNDEFINED);
        let layers = texture.full_subresource_layers();
        assert_eq!(layers.mip_level, 0);
        assert_eq!(layers.base_array_layer, 0);
        assert_eq!(layers.layer_count, 1);
    }

    #[test]
    fn each_texture_gets_a_distinct_id() {
        let a = fake_texture(vk::ImageLayout::UNDEFINED);
        let b = fake_texture(vk::ImageLayout::UNDEFINED);
        assert_ne!(a.id(), b.id());
    }
}

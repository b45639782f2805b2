//! Descriptor-set and uniform-buffer binding lifecycle for one shader's
//! resource set, back-buffered across a device's sync slots.
//!
//! Grounded on `original_source/render_engine/src/resources/GpuResourceSet.cpp`:
//! one descriptor set layout built from a shader's reflected bindings,
//! one descriptor set per back-buffer slot, uniform-buffer bindings
//! backed by a per-slot host-coherent buffer the caller writes into each
//! frame. The teacher's `vulkan::resources::descriptor_set` module
//! splits this into a layout builder, a pool wrapper and a set writer;
//! this module keeps that split but builds the layout from arbitrary
//! [`BindingMetadata`] instead of two hardcoded per-frame/per-material
//! layouts.

use std::collections::HashMap;

use ash::{vk, Device};
use vk_mem::Alloc;

use crate::error::{EngineError, EngineResult};
use crate::external::{BindingMetadata, UpdateFrequency};
use crate::resource::buffer::Buffer;

/// The resource backing one binding slot across the whole back-buffer
/// ring.
pub enum BindingResource {
    /// A uniform buffer this set owns; written into per frame via
    /// [`GpuResourceSet::uniform_buffer`].
    UniformBuffer {
        /// Byte size requested for the backing allocation, one per slot.
        size: vk::DeviceSize,
    },
    /// A combined image sampler the caller owns, one view/sampler pair
    /// per back-buffer slot (the same pair repeated across entries if
    /// the texture itself isn't back-buffered).
    CombinedImageSampler {
        /// `(view, sampler)` per slot, same length as the back-buffer count.
        per_slot: Vec<(vk::ImageView, vk::Sampler)>,
    },
    /// An input attachment the caller owns, one view per slot.
    InputAttachment {
        /// View per slot, same length as the back-buffer count.
        per_slot: Vec<vk::ImageView>,
    },
}

/// One binding's reflected metadata plus the resource backing it.
pub struct BindingSlot {
    /// Shader-reflected binding metadata (set/binding/type/stage/cadence).
    pub metadata: BindingMetadata,
    /// The resource written into this binding.
    pub resource: BindingResource,
}

/// Build the `vk::DescriptorSetLayoutBinding` list for a set of slots.
/// A pure function of the reflected metadata so it's exercised without a
/// live device.
#[must_use]
pub fn layout_bindings(slots: &[BindingSlot]) -> Vec<vk::DescriptorSetLayoutBinding> {
    slots
        .iter()
        .map(|slot| {
            vk::DescriptorSetLayoutBinding::builder()
                .binding(slot.metadata.binding)
                .descriptor_type(slot.metadata.descriptor_type)
                .descriptor_count(slot.metadata.count.max(1))
                .stage_flags(slot.metadata.stage_flags)
                .build()
        })
        .collect()
}

fn buffer_write(set: vk::DescriptorSet, binding: u32, buffer_info: &vk::DescriptorBufferInfo) -> vk::WriteDescriptorSet {
    vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(vk::DescriptorType::UNIFORM_BUFFER)
        .buffer_info(std::slice::from_ref(buffer_info))
        .build()
}

fn image_write(
    set: vk::DescriptorSet,
    binding: u32,
    descriptor_type: vk::DescriptorType,
    image_info: &vk::DescriptorImageInfo,
) -> vk::WriteDescriptorSet {
    vk::WriteDescriptorSet::builder()
        .dst_set(set)
        .dst_binding(binding)
        .dst_array_element(0)
        .descriptor_type(descriptor_type)
        .image_info(std::slice::from_ref(image_info))
        .build()
}

/// A descriptor set layout, one descriptor set per back-buffer slot, and
/// the uniform buffers those sets' `UNIFORM_BUFFER` bindings reference.
/// Destruction is explicit via [`Self::destroy`], matching the rest of
/// this crate's resource types (no `Drop`, since the owner decides when
/// the device is idle with respect to these handles).
pub struct GpuResourceSet {
    layout: vk::DescriptorSetLayout,
    sets: Vec<vk::DescriptorSet>,
    uniform_buffers: HashMap<u32, Vec<Buffer>>,
    update_frequencies: HashMap<u32, UpdateFrequency>,
}

impl GpuResourceSet {
    /// Build the layout, allocate `back_buffer_count` sets from `pool`,
    /// create one uniform buffer per slot for every `UniformBuffer`
    /// binding, and write every slot's descriptor set once.
    ///
    /// # Errors
    /// Propagates descriptor-set-layout creation, allocation, or buffer
    /// allocation failures; returns [`EngineError::IllegalBuilderTransition`]
    /// if a `CombinedImageSampler`/`InputAttachment` slot's `per_slot`
    /// list length doesn't match `back_buffer_count`.
    pub fn new(
        device: &Device,
        allocator: &vk_mem::Allocator,
        pool: vk::DescriptorPool,
        back_buffer_count: usize,
        slots: Vec<BindingSlot>,
    ) -> EngineResult<Self> {
        for slot in &slots {
            let per_slot_len = match &slot.resource {
                BindingResource::UniformBuffer { .. } => back_buffer_count,
                BindingResource::CombinedImageSampler { per_slot } => per_slot.len(),
                BindingResource::InputAttachment { per_slot } => per_slot.len(),
            };
            if per_slot_len != back_buffer_count {
                return Err(EngineError::IllegalBuilderTransition(format!(
                    "binding {}: {per_slot_len} per-slot resources, expected {back_buffer_count}",
                    slot.metadata.binding
                )));
            }
        }

        let bindings = layout_bindings(&slots);
        let layout_info = vk::DescriptorSetLayoutCreateInfo::builder().bindings(&bindings);
        // SAFETY: `device` outlives this resource set.
        let layout = unsafe {
            device
                .create_descriptor_set_layout(&layout_info, None)
                .map_err(EngineError::from)?
        };

        let layouts = vec![layout; back_buffer_count];
        let alloc_info = vk::DescriptorSetAllocateInfo::builder()
            .descriptor_pool(pool)
            .set_layouts(&layouts);
        // SAFETY: `pool` outlives this resource set; `layout` was just created.
        let sets = match unsafe { device.allocate_descriptor_sets(&alloc_info) } {
            Ok(sets) => sets,
            Err(err) => {
                // SAFETY: `layout` has no descriptor sets allocated against it yet.
                unsafe { device.destroy_descriptor_set_layout(layout, None) };
                return Err(EngineError::from(err));
            }
        };

        let mut uniform_buffers: HashMap<u32, Vec<Buffer>> = HashMap::new();
        let mut update_frequencies: HashMap<u32, UpdateFrequency> = HashMap::new();
        let mut writes = Vec::new();
        let mut buffer_infos = Vec::new();
        let mut image_infos = Vec::new();

        for slot in &slots {
            update_frequencies.insert(slot.metadata.binding, slot.metadata.update_frequency);
            match &slot.resource {
                BindingResource::UniformBuffer { size } => {
                    let mut per_slot = Vec::with_capacity(back_buffer_count);
                    for _ in 0..back_buffer_count {
                        per_slot.push(create_uniform_buffer(allocator, *size)?);
                    }
                    uniform_buffers.insert(slot.metadata.binding, per_slot);
                }
                BindingResource::CombinedImageSampler { .. } | BindingResource::InputAttachment { .. } => {}
            }
        }

        for (set_index, &set) in sets.iter().enumerate() {
            for slot in &slots {
                match &slot.resource {
                    BindingResource::UniformBuffer { size } => {
                        let buffer = &uniform_buffers[&slot.metadata.binding][set_index];
                        buffer_infos.push(
                            vk::DescriptorBufferInfo::builder()
                                .buffer(buffer.handle())
                                .offset(0)
                                .range(*size)
                                .build(),
                        );
                        writes.push((slot.metadata.binding, set, None, buffer_infos.len() - 1));
                    }
                    BindingResource::CombinedImageSampler { per_slot } => {
                        let (view, sampler) = per_slot[set_index];
                        image_infos.push(
                            vk::DescriptorImageInfo::builder()
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                                .image_view(view)
                                .sampler(sampler)
                                .build(),
                        );
                        writes.push((
                            slot.metadata.binding,
                            set,
                            Some(vk::DescriptorType::COMBINED_IMAGE_SAMPLER),
                            image_infos.len() - 1,
                        ));
                    }
                    BindingResource::InputAttachment { per_slot } => {
                        let view = per_slot[set_index];
                        image_infos.push(
                            vk::DescriptorImageInfo::builder()
                                .image_layout(vk::ImageLayout::SHADER_READ_ONLY_OPTIMAL)
                                .image_view(view)
                                .build(),
                        );
                        writes.push((
                            slot.metadata.binding,
                            set,
                            Some(vk::DescriptorType::INPUT_ATTACHMENT),
                            image_infos.len() - 1,
                        ));
                    }
                }
            }
        }

        let descriptor_writes: Vec<vk::WriteDescriptorSet> = writes
            .into_iter()
            .map(|(binding, set, image_kind, info_index)| match image_kind {
                None => buffer_write(set, binding, &buffer_infos[info_index]),
                Some(descriptor_type) => image_write(set, binding, descriptor_type, &image_infos[info_index]),
            })
            .collect();

        // SAFETY: every referenced buffer/image handle outlives this call.
        unsafe { device.update_descriptor_sets(&descriptor_writes, &[]) };

        Ok(Self { layout, sets, uniform_buffers, update_frequencies })
    }

    /// The descriptor set layout shared by every back-buffer slot.
    #[must_use]
    pub fn layout(&self) -> vk::DescriptorSetLayout {
        self.layout
    }

    /// The descriptor set bound to back-buffer slot `index`.
    #[must_use]
    pub fn descriptor_set(&self, index: usize) -> Option<vk::DescriptorSet> {
        self.sets.get(index).copied()
    }

    /// The uniform buffer backing `binding` at slot `index`, for the
    /// caller to `vk_mem::Allocator::map_memory` and write this frame's
    /// data into.
    #[must_use]
    pub fn uniform_buffer(&self, binding: u32, index: usize) -> Option<&Buffer> {
        self.uniform_buffers.get(&binding)?.get(index)
    }

    /// The update cadence a binding's shader reflection reported, for
    /// callers deciding whether to rewrite a uniform buffer once per
    /// frame or once per draw call.
    #[must_use]
    pub fn update_frequency(&self, binding: u32) -> Option<UpdateFrequency> {
        self.update_frequencies.get(&binding).copied()
    }

    /// Destroy every uniform buffer and the descriptor set layout.
    /// Descriptor sets themselves are reclaimed when `pool` is reset or
    /// destroyed, per Vulkan's pool-owns-sets model; this does not reset
    /// the pool, since other resource sets may share it.
    ///
    /// # Safety
    /// The caller must ensure no in-flight GPU work still references
    /// these descriptor sets or buffers.
    pub fn destroy(&mut self, device: &Device, allocator: &vk_mem::Allocator) {
        for buffers in self.uniform_buffers.values_mut() {
            for mut buffer in buffers.drain(..) {
                unsafe { allocator.destroy_buffer(buffer.handle(), buffer.allocation_mut()) };
            }
        }
        // SAFETY: caller guarantees no pending GPU work references this layout.
        unsafe { device.destroy_descriptor_set_layout(self.layout, None) };
    }
}

fn create_uniform_buffer(allocator: &vk_mem::Allocator, size: vk::DeviceSize) -> EngineResult<Buffer> {
    let buffer_info = vk::BufferCreateInfo::builder()
        .size(size)
        .usage(vk::BufferUsageFlags::UNIFORM_BUFFER)
        .sharing_mode(vk::SharingMode::EXCLUSIVE);
    let allocation_info = vk_mem::AllocationCreateInfo {
        usage: vk_mem::MemoryUsage::CpuToGpu,
        flags: vk_mem::AllocationCreateFlags::MAPPED,
        ..Default::default()
    };
    let (handle, allocation) = unsafe { allocator.create_buffer(&buffer_info, &allocation_info) }
        .map_err(|_| EngineError::AllocationFailed(format!("uniform buffer of {size} bytes")))?;
    Ok(Buffer::new(handle, allocation, size))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::external::UpdateFrequency;

    fn metadata(binding: u32, descriptor_type: vk::DescriptorType, update_frequency: UpdateFrequency) -> BindingMetadata {
        BindingMetadata {
            set: 0,
            binding,
            descriptor_type,
            count: 1,
            stage_flags: vk::ShaderStageFlags::FRAGMENT,
            update_frequency,
        }
    }

    #[test]
    fn layout_bindings_preserves_order_and_stage_flags() {
        let slots = vec![
            BindingSlot {
                metadata: metadata(0, vk::DescriptorType::UNIFORM_BUFFER, UpdateFrequency::PerFrame),
                resource: BindingResource::UniformBuffer { size: 64 },
            },
            BindingSlot {
                metadata: metadata(1, vk::DescriptorType::COMBINED_IMAGE_SAMPLER, UpdateFrequency::PerDrawCall),
                resource: BindingResource::CombinedImageSampler { per_slot: vec![] },
            },
        ];
        let bindings = layout_bindings(&slots);
        assert_eq!(bindings.len(), 2);
        assert_eq!(bindings[0].binding, 0);
        assert_eq!(bindings[0].descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(bindings[1].binding, 1);
        assert_eq!(bindings[1].descriptor_type, vk::DescriptorType::COMBINED_IMAGE_SAMPLER);
    }

    #[test]
    fn zero_count_is_widened_to_one() {
        let slots = vec![BindingSlot {
            metadata: BindingMetadata { count: 0, ..metadata(0, vk::DescriptorType::UNIFORM_BUFFER, UpdateFrequency::PerFrame) },
            resource: BindingResource::UniformBuffer { size: 64 },
        }];
        assert_eq!(layout_bindings(&slots)[0].descriptor_count, 1);
    }

    #[test]
    fn buffer_write_targets_the_requested_binding_and_set() {
        let info = vk::DescriptorBufferInfo::builder().buffer(vk::Buffer::null()).offset(0).range(64).build();
        let write = buffer_write(vk::DescriptorSet::null(), 3, &info);
        assert_eq!(write.dst_binding, 3);
        assert_eq!(write.descriptor_type, vk::DescriptorType::UNIFORM_BUFFER);
        assert_eq!(write.descriptor_count, 1);
    }

    #[test]
    fn image_write_uses_the_requested_descriptor_type() {
        let info = vk::DescriptorImageInfo::builder().image_view(vk::ImageView::null()).build();
        let write = image_write(vk::DescriptorSet::null(), 2, vk::DescriptorType::INPUT_ATTACHMENT, &info);
        assert_eq!(write.dst_binding, 2);
        assert_eq!(write.descriptor_type, vk::DescriptorType::INPUT_ATTACHMENT);
    }
}

//! Per-device logical-device wrapper: physical device info, queue family
//! discovery, and the [`queue::QueueContext`]s built on top of them.

pub mod queue;

use std::collections::HashMap;

use ash::vk;

use crate::error::EngineResult;
use queue::{QueueContext, QueueFamilyInfo};

/// Snapshot of a physical device's relevant properties, captured once at
/// selection time.
#[derive(Debug, Clone)]
pub struct PhysicalDeviceInfo {
    /// The physical device handle.
    pub handle: vk::PhysicalDevice,
    /// Human-readable device name, from `VkPhysicalDeviceProperties`.
    pub name: String,
    /// Queue family properties, indexed by family index.
    pub queue_families: Vec<QueueFamilyInfo>,
}

impl PhysicalDeviceInfo {
    /// Build from the raw properties `vkGetPhysicalDeviceQueueFamilyProperties`
    /// reports.
    #[must_use]
    pub fn from_properties(
        handle: vk::PhysicalDevice,
        name: String,
        properties: &[vk::QueueFamilyProperties],
    ) -> Self {
        let queue_families = properties
            .iter()
            .enumerate()
            .map(|(index, props)| QueueFamilyInfo {
                index: index as u32,
                supports_graphics: props.queue_flags.contains(vk::QueueFlags::GRAPHICS),
                supports_compute: props.queue_flags.contains(vk::QueueFlags::COMPUTE),
                supports_transfer: props.queue_flags.contains(vk::QueueFlags::TRANSFER),
                queue_count: props.queue_count,
            })
            .collect();
        Self {
            handle,
            name,
            queue_families,
        }
    }
}

/// A logical GPU: a physical-device handle, a logical-device handle, and
/// a set of [`QueueContext`]s grouped by queue family.
pub struct Device {
    raw: ash::Device,
    info: PhysicalDeviceInfo,
    queue_contexts: HashMap<u32, QueueContext>,
}

impl Device {
    /// Wrap an already-created logical device, building a
    /// [`QueueContext`] for every family named in `requested_queue_counts`.
    ///
    /// # Errors
    /// Propagates [`crate::error::EngineError::QueueUnavailable`] from
    /// any requested family.
    pub fn new(
        raw: ash::Device,
        info: PhysicalDeviceInfo,
        requested_queue_counts: &[(u32, u32)],
    ) -> EngineResult<Self> {
        let mut queue_contexts = HashMap::new();
        for &(family_index, count) in requested_queue_counts {
            let family_info = info.queue_families[family_index as usize];
            let context = QueueContext::new(&raw, family_info, count)?;
            queue_contexts.insert(family_index, context);
        }
        Ok(Self {
            raw,
            info,
            queue_contexts,
        })
    }

    /// The raw `ash::Device`, for call sites that need direct FFI access
    /// (resource allocation, command recording).
    #[must_use]
    pub fn raw(&self) -> &ash::Device {
        &self.raw
    }

    /// Physical device properties captured at selection time.
    #[must_use]
    pub fn info(&self) -> &PhysicalDeviceInfo {
        &self.info
    }

    /// Look up the queue context for a given family, if one was
    /// requested at construction.
    #[must_use]
    pub fn queue_context(&self, family_index: u32) -> Option<&QueueContext> {
        self.queue_contexts.get(&family_index)
    }

    /// The first family index advertising graphics support, if any.
    #[must_use]
    pub fn graphics_family(&self) -> Option<u32> {
        self.info
            .queue_families
            .iter()
            .find(|f| f.supports_graphics)
            .map(|f| f.index)
    }

    /// The first family index advertising transfer support without
    /// graphics (a dedicated transfer family), if any.
    #[must_use]
    pub fn dedicated_transfer_family(&self) -> Option<u32> {
        self.info
            .queue_families
            .iter()
            .find(|f| f.supports_transfer && !f.supports_graphics)
            .map(|f| f.index)
    }
}

impl Drop for Device {
    fn drop(&mut self) {
        // SAFETY: called once, after every resource derived from this
        // device has already been destroyed by its own Drop impl
        // (command pools, semaphores, allocators); `device_wait_idle`
        // ensures no in-flight GPU work references freed handles.
        unsafe {
            if let Err(e) = self.raw.device_wait_idle() {
                log::error!("device_wait_idle failed during Device drop: {e:?}");
            }
            self.raw.destroy_device(None);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn family(index: u32, flags: vk::QueueFlags, count: u32) -> vk::QueueFamilyProperties {
        vk::QueueFamilyProperties {
            queue_flags: flags,
            queue_count: count,
            timestamp_valid_bits: 0,
            min_image_transfer_granularity: vk::Extent3D::default(),
            ..Default::default()
        }
    }

    #[test]
    fn from_properties_captures_capability_booleans() {
        let props = [
            family(0, vk::QueueFlags::GRAPHICS | vk::QueueFlags::TRANSFER, 2),
            family(1, vk::QueueFlags::TRANSFER, 1),
        ];
        let info = PhysicalDeviceInfo::from_properties(vk::PhysicalDevice::null(), "fake".into(), &props);

        assert_eq!(info.queue_families.len(), 2);
        assert!(info.queue_families[0].supports_graphics);
        assert!(info.queue_families[0].supports_transfer);
        assert!(!info.queue_families[0].supports_compute);
        assert!(!info.queue_families[1].supports_graphics);
        assert!(info.queue_families[1].supports_transfer);
        assert_eq!(info.queue_families[1].queue_count, 1);
    }
}

//! Named semaphore registry.
//!
//! Grounded on `render/vulkan/sync.rs`'s `Semaphore`/`Fence` RAII
//! wrappers, generalized into the named map
//! `original_source/.../SyncObject.cpp` builds its operation groups on
//! top of.

use std::collections::HashMap;

use ash::{vk, Device};

use crate::error::{EngineError, EngineResult};

/// Whether a semaphore carries a binary signal or a 64-bit monotonic
/// timeline counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SemaphoreKind {
    /// A classic binary semaphore. Width is always 1 and offset is
    /// always 0.
    Binary,
    /// A timeline semaphore with the given window width.
    Timeline {
        /// Number of counter values used before [`SyncPrimitives::step`]
        /// rewrites the base offset.
        width: u64,
    },
}

#[derive(Clone)]
struct SemaphoreEntry {
    handle: vk::Semaphore,
    kind: SemaphoreKind,
    offset: u64,
}

/// A named map of semaphores owned by one [`crate::sync::object::SyncObject`].
///
/// Cloning produces an aliasing copy: the cloned registry shares the same
/// `vk::Semaphore` handles and must never call [`Self::destroy`] itself.
/// This lets the scheduler hand every node a private view over one
/// graph-wide set of semaphores (so each node's [`crate::sync::object::SyncObject`]
/// carries only the operations relevant to it) without creating duplicate
/// Vulkan objects.
#[derive(Default, Clone)]
pub struct SyncPrimitives {
    semaphores: HashMap<String, SemaphoreEntry>,
}

impl SyncPrimitives {
    /// Create an empty registry.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a new named semaphore, creating its Vulkan handle.
    ///
    /// # Errors
    /// Returns [`EngineError::SemaphoreAlreadyRegistered`] if `name` is
    /// already present, or a device error if semaphore creation fails.
    pub fn register(
        &mut self,
        device: &Device,
        name: impl Into<String>,
        kind: SemaphoreKind,
    ) -> EngineResult<()> {
        let name = name.into();
        if self.semaphores.contains_key(&name) {
            return Err(EngineError::SemaphoreAlreadyRegistered(name));
        }

        let mut type_create_info = vk::SemaphoreTypeCreateInfo::builder();
        let initial_value;
        match kind {
            SemaphoreKind::Binary => {
                type_create_info = type_create_info.semaphore_type(vk::SemaphoreType::BINARY);
                initial_value = 0;
            }
            SemaphoreKind::Timeline { .. } => {
                type_create_info = type_create_info
                    .semaphore_type(vk::SemaphoreType::TIMELINE)
                    .initial_value(0);
                initial_value = 0;
            }
        }
        let _ = initial_value;

        let create_info = vk::SemaphoreCreateInfo::builder().push_next(&mut type_create_info);
        // SAFETY: `device` outlives this registry; the handle is
        // destroyed in `Drop`.
        let handle = unsafe {
            device
                .create_semaphore(&create_info, None)
                .map_err(EngineError::from)?
        };

        self.semaphores.insert(
            name,
            SemaphoreEntry {
                handle,
                kind,
                offset: 0,
            },
        );
        Ok(())
    }

    /// Whether a semaphore with this name is registered.
    #[must_use]
    pub fn has_semaphore(&self, name: &str) -> bool {
        self.semaphores.contains_key(name)
    }

    /// Raw Vulkan handle for a registered semaphore.
    ///
    /// # Errors
    /// Returns [`EngineError::NoSuchNode`] if `name` is not registered
    /// (reused here as "no such named entity", matching the graph's
    /// not-found error rather than adding a parallel variant).
    pub fn handle(&self, name: &str) -> EngineResult<vk::Semaphore> {
        self.entry(name).map(|e| e.handle)
    }

    /// The monotonic offset currently added to all user-supplied values
    /// for this semaphore.
    ///
    /// # Errors
    /// See [`Self::handle`].
    pub fn timeline_offset(&self, name: &str) -> EngineResult<u64> {
        self.entry(name).map(|e| e.offset)
    }

    /// The timeline window width for this semaphore (always 1 for
    /// binary semaphores).
    ///
    /// # Errors
    /// See [`Self::handle`].
    pub fn timeline_width(&self, name: &str) -> EngineResult<u64> {
        self.entry(name).map(|e| match e.kind {
            SemaphoreKind::Binary => 1,
            SemaphoreKind::Timeline { width } => width,
        })
    }

    /// The kind of a registered semaphore.
    ///
    /// # Errors
    /// See [`Self::handle`].
    pub fn kind(&self, name: &str) -> EngineResult<SemaphoreKind> {
        self.entry(name).map(|e| e.kind)
    }

    /// Step the timeline offset forward by this semaphore's width.
    /// Binary semaphores are unaffected (width is always 1, offset
    /// always 0).
    ///
    /// # Errors
    /// See [`Self::handle`].
    pub fn step(&mut self, name: &str) -> EngineResult<u64> {
        let width = self.timeline_width(name)?;
        let entry = self
            .semaphores
            .get_mut(name)
            .ok_or_else(|| EngineError::NoSuchNode(name.to_string()))?;
        if matches!(entry.kind, SemaphoreKind::Timeline { .. }) {
            entry.offset += width;
        }
        Ok(entry.offset)
    }

    fn entry(&self, name: &str) -> EngineResult<&SemaphoreEntry> {
        self.semaphores
            .get(name)
            .ok_or_else(|| EngineError::NoSuchNode(name.to_string()))
    }

    /// Insert an already-created handle directly, bypassing
    /// `vkCreateSemaphore`. Exists so tests elsewhere in the crate can
    /// build a `SyncObject` with named semaphores resolvable without a
    /// live `ash::Device`.
    #[cfg(test)]
    pub(crate) fn insert_handle_for_test(&mut self, name: impl Into<String>, handle: vk::Semaphore, kind: SemaphoreKind) {
        self.semaphores.insert(name.into(), SemaphoreEntry { handle, kind, offset: 0 });
    }

    /// Destroy every registered semaphore. Must be called (or the owning
    /// [`crate::sync::object::SyncObject`] dropped) only once the device
    /// is idle with respect to this registry's semaphores.
    pub fn destroy(&mut self, device: &Device) {
        for entry in self.semaphores.values() {
            // SAFETY: caller guarantees no pending GPU work references
            // these semaphores.
            unsafe { device.destroy_semaphore(entry.handle, None) };
        }
        self.semaphores.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn binary_semaphore_width_is_always_one() {
        let mut primitives = SyncPrimitives::new();
        // Registration requires a real device; the width/offset
        // accessors are pure functions over the entry table, so verify
        // them via a hand-inserted entry instead of a live semaphore.
        primitives.semaphores.insert(
            "image_available".into(),
            SemaphoreEntry {
                handle: vk::Semaphore::null(),
                kind: SemaphoreKind::Binary,
                offset: 0,
            },
        );
        assert_eq!(primitives.timeline_width("image_available").unwrap(), 1);
        assert_eq!(primitives.timeline_offset("image_available").unwrap(), 0);
    }

    #[test]
    fn stepping_a_timeline_semaphore_advances_offset_by_width() {
        let mut primitives = SyncPrimitives::new();
        primitives.semaphores.insert(
            "render_finished".into(),
            SemaphoreEntry {
                handle: vk::Semaphore::null(),
                kind: SemaphoreKind::Timeline { width: 100 },
                offset: 0,
            },
        );
        assert_eq!(primitives.step("render_finished").unwrap(), 100);
        assert_eq!(primitives.step("render_finished").unwrap(), 200);
        assert_eq!(primitives.timeline_width("render_finished").unwrap(), 100);
    }

    #[test]
    fn stepping_a_binary_semaphore_is_a_no_op() {
        let mut primitives = SyncPrimitives::new();
        primitives.semaphores.insert(
            "image_available".into(),
            SemaphoreEntry {
                handle: vk::Semaphore::null(),
                kind: SemaphoreKind::Binary,
                offset: 0,
            },
        );
        assert_eq!(primitives.step("image_available").unwrap(), 0);
    }

    #[test]
    fn unregistered_semaphore_is_an_error() {
        let primitives = SyncPrimitives::new();
        assert!(primitives.handle("nope").is_err());
    }
}

//! Forward-progress swapchain image acquisition and sync-slot selection.

pub mod selector;

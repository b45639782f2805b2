//! Descriptor sets and uniform-buffer binding lifecycle
//! ([`resource_set`]), back-buffered across a device's sync slots.

pub mod resource_set;

//! Synchronization fabric: named semaphore registries ([`primitives`]),
//! the operation-group object built on top of them ([`object`]), and a
//! diagnostic ring buffer of host-visible operations ([`logbook`]).

pub mod logbook;
pub mod object;
pub mod primitives;

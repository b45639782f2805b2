//! Textures, buffers, and the barrier-coalescing state machine tracking
//! their GPU-visible state.

pub mod buffer;
pub mod state;
pub mod state_machine;
pub mod texture;

//! # Render Graph Engine
//!
//! A multi-threaded, multi-device Vulkan rendering engine built around an
//! explicit render graph. Given a declarative graph of render, compute,
//! transfer, CPU-only and present nodes, the engine materialises a
//! correctly synchronized, concurrently executed stream of GPU
//! submissions and presentation operations each frame.
//!
//! Modules are ordered leaf-first, matching their dependency order:
//! [`sync`] and [`resource`] have no dependency on the graph; [`graph`]
//! and [`scheduler`] sit on top of them; [`engine`] wires everything
//! together behind [`engine::ParallelRenderEngine`].

#![warn(missing_docs)]
#![warn(clippy::all, clippy::pedantic)]
#![allow(clippy::module_name_repetitions, clippy::similar_names, clippy::too_many_arguments)]

pub mod error;
pub mod config;

pub mod device;
pub mod command;
pub mod sync;
pub mod resource;
pub mod transfer;
pub mod graph;
pub mod scheduler;
pub mod swapchain;
pub mod descriptor;
pub mod renderer;
pub mod external;
pub mod engine;

/// Common imports for engine embedders.
pub mod prelude {
    pub use crate::config::RenderEngineConfig;
    pub use crate::device::queue::{GuardedQueue, LoadBalancer, QueueContext};
    pub use crate::descriptor::resource_set::{BindingResource, BindingSlot, GpuResourceSet};
    pub use crate::device::{Device, PhysicalDeviceInfo};
    pub use crate::engine::{FrameOutcome, ParallelRenderEngine, RENDER_FINISHED_SEMAPHORE};
    pub use crate::error::{EngineError, EngineResult};
    pub use crate::external::{IComputeTask, ICpuTask, ShaderMetadata, SurfaceProvider, SwapchainBackend};
    pub use crate::graph::builder::RenderGraphBuilder;
    pub use crate::graph::graph::{Graph, GraphResult};
    pub use crate::graph::link::{Connection, Link, LinkType};
    pub use crate::graph::node::{Job, Node, SplitTransferPaths, TransferNode};
    pub use crate::renderer::{RenderTarget, Renderer};
    pub use crate::resource::buffer::Buffer;
    pub use crate::resource::state_machine::ResourceStateMachine;
    pub use crate::resource::texture::{Texture, TextureView};
    pub use crate::scheduler::execution_context::{ExecutionContext, PoolIndex};
    pub use crate::scheduler::taskflow::TaskflowScheduler;
    pub use crate::swapchain::selector::{AcquireOutcome, SwapChainImageSelector};
    pub use crate::sync::logbook::SyncLogbook;
    pub use crate::sync::object::{SyncObject, SyncOperation};
    pub use crate::sync::primitives::{SemaphoreKind, SyncPrimitives};
    pub use crate::transfer::scheduler::TransferScheduler;
}

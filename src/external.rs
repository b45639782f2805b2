//! Interface contracts for collaborators this crate does not implement:
//! windowing/swapchain backends, shader metadata sources, and
//! CPU/compute task bodies supplied by the embedding application.
//!
//! Grounded on spec.md §6's external interface list; expressed the way
//! the teacher expresses its own boundary traits (`render::Renderer`,
//! `ecs::scheduler::System`) — small trait objects with `Send + Sync`
//! bounds so they can cross worker-pool thread boundaries.

use ash::vk;

use crate::error::EngineResult;
use crate::scheduler::execution_context::ExecutionContext;
use crate::sync::object::SyncObject;

/// Per-binding update cadence a shader's metadata reports, used to
/// decide descriptor-set churn in [`crate::descriptor::resource_set`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpdateFrequency {
    /// Rebound once per frame regardless of draw count.
    PerFrame,
    /// Rebound for every draw call.
    PerDrawCall,
    /// Cadence not reported by the shader compiler's reflection data.
    Unknown,
}

/// One push-constant range a shader declares.
#[derive(Debug, Clone, Copy)]
pub struct PushConstantRange {
    /// Shader stages that read this range.
    pub stage_flags: vk::ShaderStageFlags,
    /// Byte offset within the push-constant block.
    pub offset: u32,
    /// Size in bytes of this range.
    pub size: u32,
}

/// One descriptor binding a shader declares: set/binding index, type,
/// and how often it is expected to change.
#[derive(Debug, Clone, Copy)]
pub struct BindingMetadata {
    /// Descriptor set index.
    pub set: u32,
    /// Binding index within the set.
    pub binding: u32,
    /// Descriptor type (uniform buffer, sampler, input attachment, ...).
    pub descriptor_type: vk::DescriptorType,
    /// Number of array elements this binding covers.
    pub count: u32,
    /// Shader stages that access this binding.
    pub stage_flags: vk::ShaderStageFlags,
    /// Reported update cadence for descriptor-churn planning.
    pub update_frequency: UpdateFrequency,
}

/// Reflection data accompanying a compiled shader module's SPIR-V bytes:
/// bindings, push-constant ranges. This crate never loads shaders
/// itself; an external collaborator supplies both the bytecode and this
/// metadata.
#[derive(Debug, Clone, Default)]
pub struct ShaderMetadata {
    /// Per-binding descriptor metadata.
    pub bindings: Vec<BindingMetadata>,
    /// Declared push-constant ranges.
    pub push_constant_ranges: Vec<PushConstantRange>,
}

/// A source of shader bytecode and its accompanying metadata. This
/// crate treats shader compilation, caching, and hot-reload as entirely
/// external.
pub trait ShaderMetadataSource: Send + Sync {
    /// Fetch SPIR-V bytes and reflection metadata for a named shader
    /// stage.
    ///
    /// # Errors
    /// Implementations may fail for any reason (missing file, compile
    /// error); propagated to the caller unchanged via `EngineError`'s
    /// opaque `AllocationFailed`-style string variants is the
    /// implementor's choice, not this crate's.
    fn load(&self, name: &str) -> EngineResult<(Vec<u8>, ShaderMetadata)>;
}

/// Provides a Vulkan surface from a window: the only windowing contract
/// this crate requires.
pub trait SurfaceProvider: Send + Sync {
    /// The raw surface handle for this window.
    fn surface(&self) -> vk::SurfaceKHR;

    /// Current framebuffer extent, in pixels.
    fn framebuffer_extent(&self) -> vk::Extent2D;
}

/// The subset of swapchain behavior the engine requires of a backend:
/// acquire and present. Recreation on `OUT_OF_DATE`/`SUBOPTIMAL` is
/// driven by the caller, not this trait.
pub trait SwapchainBackend: Send + Sync {
    /// The swapchain handle this backend wraps.
    fn handle(&self) -> vk::SwapchainKHR;

    /// Image format of the swapchain's images.
    fn format(&self) -> vk::Format;

    /// Current extent of the swapchain's images.
    fn extent(&self) -> vk::Extent2D;

    /// Views over each swapchain image, in index order.
    fn image_views(&self) -> &[vk::ImageView];

    /// `vkAcquireNextImageKHR`, returning the raw Vulkan result code
    /// alongside the acquired index so the caller can distinguish
    /// `SUCCESS`/`SUBOPTIMAL_KHR`/`TIMEOUT`/`ERROR_OUT_OF_DATE_KHR`.
    ///
    /// # Errors
    /// Returns an error only for failures unrelated to swapchain
    /// staleness; staleness is reported via the returned result code.
    fn acquire_next_image(
        &self,
        timeout_ns: u64,
        semaphore: vk::Semaphore,
        fence: vk::Fence,
    ) -> EngineResult<(vk::Result, u32)>;
}

/// A user-supplied compute task node body, e.g. dispatching a CUDA
/// kernel via Vulkan external-memory/external-semaphore interop. The
/// render graph only forwards the operation group and execution
/// context; the task is responsible for signaling completion on
/// whatever timeline semaphore its `SyncObject` wait side names.
pub trait IComputeTask: Send + Sync {
    /// Whether this task has work scheduled for the current frame. An
    /// inactive compute node is skipped by the scheduler and its links
    /// are pulled through.
    fn is_active(&self) -> bool;

    /// Run the task for this frame against the given operation group and
    /// execution context.
    ///
    /// # Errors
    /// Propagates task-specific failures as `EngineError`.
    fn run(&self, sync_operations: &SyncObject, execution_context: &ExecutionContext) -> EngineResult<()>;
}

/// A user-supplied pure-CPU task node body (no queue submission), e.g.
/// driving image acquisition or bookkeeping between GPU stages.
pub trait ICpuTask: Send + Sync {
    /// Whether this task has work scheduled for the current frame.
    fn is_active(&self) -> bool;

    /// Run the task for this frame.
    ///
    /// # Errors
    /// Propagates task-specific failures as `EngineError`.
    fn run(&self, execution_context: &ExecutionContext) -> EngineResult<()>;
}

//! Engine-wide error taxonomy.
//!
//! Every fallible public API in this crate returns [`EngineResult<T>`].
//! Component modules re-export narrower aliases (`GraphResult<T>`,
//! `SyncResult<T>`, ...) purely for readability at call sites; they all
//! resolve to `Result<T, EngineError>`.

use ash::vk;

/// Convenience alias used throughout the crate.
pub type EngineResult<T> = Result<T, EngineError>;

/// Every error this crate's public APIs can return, grouped by the kind
/// taxonomy in the specification's error-handling section.
#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    // --- Device ---
    /// The device was lost (driver crash, TDR, physical removal).
    #[error("device lost")]
    DeviceLost,
    /// A Vulkan allocation failed.
    #[error("out of memory")]
    OutOfMemory,
    /// A pipeline stage was requested on a queue family that does not
    /// support it.
    #[error("pipeline stage {stage:?} is not supported by queue family {queue_family}")]
    UnsupportedStage {
        /// The stage that was requested.
        stage: vk::PipelineStageFlags2,
        /// The queue family the stage was requested on.
        queue_family: u32,
    },
    /// A queue family was asked for more queues than it advertises.
    #[error("queue family {queue_family} has {available} queues, {requested} were requested")]
    QueueUnavailable {
        /// Requested queue family.
        queue_family: u32,
        /// Number of queues requested.
        requested: u32,
        /// Number of queues actually available.
        available: u32,
    },

    // --- Surface ---
    /// The surface/swapchain became out of date and must be recreated.
    #[error("surface out of date")]
    SurfaceOutOfDate,
    /// The surface is usable but suboptimal; recreation is recommended.
    #[error("surface suboptimal")]
    SurfaceSuboptimal,
    /// The surface was lost entirely.
    #[error("surface lost")]
    SurfaceLost,

    // --- Submission ---
    /// `vkQueueSubmit2` returned a non-success result.
    #[error("queue submit failed: {0:?}")]
    QueueSubmitFailed(vk::Result),
    /// `vkQueuePresentKHR` returned a non-success result.
    #[error("present failed: {0:?}")]
    PresentFailed(vk::Result),
    /// `vkWaitSemaphores` failed or timed out.
    #[error("semaphore wait failed: {name}")]
    SemaphoreWaitFailed {
        /// Name of the semaphore that failed to signal in time.
        name: String,
    },
    /// `vkWaitForFences` failed or timed out.
    #[error("fence wait failed")]
    FenceWaitFailed,

    // --- Resource ---
    /// Source and destination sizes did not match for a transfer.
    #[error("size mismatch: source {source_size} bytes, destination {destination} bytes")]
    SizeMismatch {
        /// Size of the source data, in bytes.
        source_size: u64,
        /// Size of the destination resource, in bytes.
        destination: u64,
    },
    /// An image's format/extent is incompatible with the requested
    /// operation.
    #[error("incompatible image: {reason}")]
    IncompatibleImage {
        /// Human-readable explanation.
        reason: String,
    },
    /// A GPU memory allocation failed.
    #[error("allocation failed: {0}")]
    AllocationFailed(String),
    /// Mapping host-visible memory failed.
    #[error("memory map failed")]
    MemoryMapFailed,

    // --- Graph ---
    /// A node with this name was already present in the graph.
    #[error("duplicate node name: {0}")]
    DuplicateNodeName(String),
    /// An edge between this (from, to) pair already exists.
    #[error("duplicate edge: {from} -> {to}")]
    DuplicateEdge {
        /// Source node name.
        from: String,
        /// Target node name.
        to: String,
    },
    /// A node cannot be removed while it still has edges.
    #[error("node {0} still has edges")]
    NodeHasEdges(String),
    /// A semaphore name was registered twice on the same `SyncPrimitives`.
    #[error("semaphore already registered: {0}")]
    SemaphoreAlreadyRegistered(String),
    /// A node referenced by name does not exist in the graph.
    #[error("no such node: {0}")]
    NoSuchNode(String),

    // --- Builder ---
    /// The fluent graph builder was used out of its allowed state
    /// sequence (signal before wait, wait before signal, ...). Most
    /// misuses are caught at compile time by the session-typed builder;
    /// this variant covers the handful of checks that can only be made
    /// at runtime (e.g. referencing an unregistered semaphore).
    #[error("illegal builder transition: {0}")]
    IllegalBuilderTransition(String),
}

impl From<vk::Result> for EngineError {
    fn from(result: vk::Result) -> Self {
        match result {
            vk::Result::ERROR_DEVICE_LOST => Self::DeviceLost,
            vk::Result::ERROR_OUT_OF_DEVICE_MEMORY | vk::Result::ERROR_OUT_OF_HOST_MEMORY => {
                Self::OutOfMemory
            }
            vk::Result::ERROR_OUT_OF_DATE_KHR => Self::SurfaceOutOfDate,
            vk::Result::SUBOPTIMAL_KHR => Self::SurfaceSuboptimal,
            vk::Result::ERROR_SURFACE_LOST_KHR => Self::SurfaceLost,
            other => Self::QueueSubmitFailed(other),
        }
    }
}

//! The five kinds of work a render graph schedules, plus the empty
//! sync-aggregation node.
//!
//! Grounded on spec.md §4.5: rather than a virtual `Node` base class with
//! five subclasses, this crate follows the REDESIGN FLAGS guidance and
//! expresses `Node` as a tagged enum whose shared operations
//! (`name`/`is_active`/`create_job`) dispatch by match. Traversal code
//! (`crate::scheduler::taskflow`) matches on the enum directly instead of
//! visiting through a trait object.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, RwLock};

use ash::vk;

use crate::command::{CommandBufferFactory, SingleShotCommandBufferFactory};
use crate::device::queue::QueueContext;
use crate::device::Device;
use crate::error::{EngineError, EngineResult};
use crate::external::{ICpuTask, IComputeTask, SwapchainBackend};
use crate::renderer::{RenderTarget, Renderer};
use crate::resource::buffer::Buffer;
use crate::resource::state::ResourceId;
use crate::resource::texture::Texture;
use crate::scheduler::execution_context::ExecutionContext;
use crate::sync::object::{ResolvedSyncOps, SyncObject};
use crate::transfer::scheduler::{
    TransferScheduler, SPLIT_ACQUIRE_GROUP, SPLIT_RELEASE_GROUP, SPLIT_TRANSFER_SIGNAL_GROUP,
    SPLIT_TRANSFER_WAIT_GROUP,
};

/// Name of the operation group a node resolves its in-operations against.
/// The scheduler always hands `create_job` a [`SyncObject`] whose waits
/// and signals live under this one group.
pub(crate) const NODE_GROUP: &str = "node";

/// An opaque per-frame unit of work, built by [`Node::create_job`] and
/// handed to the worker pool. Boxed so the scheduler can collect a
/// homogeneous `Vec<Job>` across every node kind.
pub type Job = Box<dyn FnOnce(&ExecutionContext) -> EngineResult<()> + Send>;

fn no_pool_index_bound(node_name: &str) -> EngineError {
    EngineError::IllegalBuilderTransition(format!(
        "{node_name}: create_job ran with no pool index bound on the execution context"
    ))
}

/// Holds a command context and a renderer; records draw calls into a
/// target resolved from the execution context's bound render-target
/// index, then submits under the node's in/out sync group.
pub struct RenderNode {
    name: String,
    device: Arc<Device>,
    queue_context: Arc<QueueContext>,
    command_buffers: Arc<CommandBufferFactory>,
    renderer: Arc<dyn Renderer>,
    target_for_index: Arc<dyn Fn(u32) -> RenderTarget + Send + Sync>,
}

impl RenderNode {
    /// Construct a render node. `target_for_index` resolves the bound
    /// swapchain render-target index to the concrete attachment views the
    /// renderer writes into this frame.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        device: Arc<Device>,
        queue_context: Arc<QueueContext>,
        command_buffers: Arc<CommandBufferFactory>,
        renderer: Arc<dyn Renderer>,
        target_for_index: Arc<dyn Fn(u32) -> RenderTarget + Send + Sync>,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            queue_context,
            command_buffers,
            renderer,
            target_for_index,
        }
    }

    fn create_job(&self, in_operations: SyncObject) -> Job {
        let device = Arc::clone(&self.device);
        let queue_context = Arc::clone(&self.queue_context);
        let command_buffers = Arc::clone(&self.command_buffers);
        let renderer = Arc::clone(&self.renderer);
        let target_for_index = Arc::clone(&self.target_for_index);
        let name = self.name.clone();
        Box::new(move |execution_context: &ExecutionContext| -> EngineResult<()> {
            let pool_index = execution_context
                .pool_index()
                .ok_or_else(|| no_pool_index_bound(&name))?;
            let target = target_for_index(pool_index.render_target_index);
            let command_buffer =
                command_buffers.create_command_buffer(device.raw(), pool_index.sync_object_index)?;

            let begin_info =
                vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
            // SAFETY: `command_buffer` was just allocated and is not in use.
            unsafe {
                device
                    .raw()
                    .begin_command_buffer(command_buffer, &begin_info)
                    .map_err(EngineError::from)?;
            }

            renderer.record(command_buffer, &target)?;

            // SAFETY: recording was begun above on this same buffer.
            unsafe {
                device
                    .raw()
                    .end_command_buffer(command_buffer)
                    .map_err(EngineError::from)?;
            }

            let resolved = in_operations.resolve_group(NODE_GROUP)?;
            queue_context.submit(device.raw(), command_buffer, &resolved, vk::Fence::null())
        })
    }
}

/// The additional queue/command-buffer resources a [`TransferNode`]
/// needs only for resources whose owning queue family differs from both
/// the dedicated transfer family and the node's own (destination)
/// family. Absent, every pending resource must resolve to the unified
/// path or `create_job` fails.
#[derive(Clone)]
pub struct SplitTransferPaths {
    source_queue_context: Arc<QueueContext>,
    source_command_buffers: Arc<SingleShotCommandBufferFactory>,
    transfer_queue_context: Arc<QueueContext>,
    transfer_command_buffers: Arc<SingleShotCommandBufferFactory>,
}

impl SplitTransferPaths {
    /// Wire up the source-family and transfer-family queue contexts a
    /// split-path transfer releases from and copies on, respectively.
    #[must_use]
    pub fn new(
        source_queue_context: Arc<QueueContext>,
        source_command_buffers: Arc<SingleShotCommandBufferFactory>,
        transfer_queue_context: Arc<QueueContext>,
        transfer_command_buffers: Arc<SingleShotCommandBufferFactory>,
    ) -> Self {
        Self {
            source_queue_context,
            source_command_buffers,
            transfer_queue_context,
            transfer_command_buffers,
        }
    }
}

/// Holds a transfer engine and a [`TransferScheduler`]; active only while
/// the scheduler has pending upload/download tasks. `queue_context`
/// doubles as the destination family for both paths: the sole
/// submission target of the unified path, and the acquiring queue of
/// the split path.
pub struct TransferNode {
    name: String,
    device: Arc<Device>,
    queue_context: Arc<QueueContext>,
    command_buffers: Arc<SingleShotCommandBufferFactory>,
    scheduler: Arc<Mutex<TransferScheduler>>,
    textures: Arc<RwLock<HashMap<ResourceId, Texture>>>,
    buffers: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
    staging_textures: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
    staging_buffers: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
    split: Option<SplitTransferPaths>,
}

impl TransferNode {
    /// Construct a transfer node over a shared scheduler, texture and
    /// buffer registries, and their staging-buffer counterparts, all
    /// expected to be populated by the owning application before a frame
    /// that uploads/downloads against them runs. `split` is required as
    /// soon as any registered resource's owning queue family can differ
    /// from both the dedicated transfer family and `queue_context`'s own;
    /// a resource landing on the split path with no `split` configured is
    /// a construction error surfaced at job time.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        device: Arc<Device>,
        queue_context: Arc<QueueContext>,
        command_buffers: Arc<SingleShotCommandBufferFactory>,
        scheduler: Arc<Mutex<TransferScheduler>>,
        textures: Arc<RwLock<HashMap<ResourceId, Texture>>>,
        buffers: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
        staging_textures: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
        staging_buffers: Arc<RwLock<HashMap<ResourceId, Buffer>>>,
        split: Option<SplitTransferPaths>,
    ) -> Self {
        Self {
            name: name.into(),
            device,
            queue_context,
            command_buffers,
            scheduler,
            textures,
            buffers,
            staging_textures,
            staging_buffers,
            split,
        }
    }

    fn is_active(&self) -> bool {
        self.scheduler.lock().unwrap().has_pending_transfers()
    }

    fn begin(device: &ash::Device, command_buffer: vk::CommandBuffer) -> EngineResult<()> {
        let begin_info =
            vk::CommandBufferBeginInfo::builder().flags(vk::CommandBufferUsageFlags::ONE_TIME_SUBMIT);
        // SAFETY: `command_buffer` was just allocated and is not in use.
        unsafe { device.begin_command_buffer(command_buffer, &begin_info).map_err(EngineError::from) }
    }

    fn end(device: &ash::Device, command_buffer: vk::CommandBuffer) -> EngineResult<()> {
        // SAFETY: recording was begun on this same buffer above.
        unsafe { device.end_command_buffer(command_buffer).map_err(EngineError::from) }
    }

    fn create_job(&self, in_operations: SyncObject) -> Job {
        let device = Arc::clone(&self.device);
        let queue_context = Arc::clone(&self.queue_context);
        let command_buffers = Arc::clone(&self.command_buffers);
        let scheduler = Arc::clone(&self.scheduler);
        let textures = Arc::clone(&self.textures);
        let buffers = Arc::clone(&self.buffers);
        let staging_textures = Arc::clone(&self.staging_textures);
        let staging_buffers = Arc::clone(&self.staging_buffers);
        let split = self.split.clone();
        let name = self.name.clone();

        Box::new(move |_execution_context: &ExecutionContext| -> EngineResult<()> {
            let mut in_operations = in_operations;
            let destination_family = queue_context.family_index();
            let transfer_family = split
                .as_ref()
                .map_or(destination_family, |s| s.transfer_queue_context.family_index());

            let texture_guard = textures.read().unwrap();
            let staging_texture_guard = staging_textures.read().unwrap();
            let buffer_guard = buffers.read().unwrap();
            let staging_buffer_guard = staging_buffers.read().unwrap();

            let mut scheduler_guard = scheduler.lock().unwrap();
            let texture_ids = scheduler_guard.pending_texture_ids();
            let buffer_ids = scheduler_guard.pending_buffer_ids();
            let node_ops = in_operations.resolve_group(NODE_GROUP)?;
            let last_category_is_buffers = !buffer_ids.is_empty();

            if !texture_ids.is_empty() {
                let unified = texture_ids.iter().all(|&id| {
                    let texture = texture_guard
                        .get(&id)
                        .unwrap_or_else(|| panic!("{name}: texture {id:?} not registered"));
                    let owning = texture.state().queue_family_index.unwrap_or(destination_family);
                    scheduler_guard.use_unified_path(owning, transfer_family, destination_family)
                });

                if unified {
                    let command_buffer = command_buffers.create_command_buffer(device.raw())?;
                    Self::begin(device.raw(), command_buffer)?;
                    scheduler_guard.execute_unified(
                        device.raw(),
                        command_buffer,
                        |id| {
                            texture_guard
                                .get(&id)
                                .unwrap_or_else(|| panic!("{name}: texture {id:?} not registered"))
                        },
                        |id| {
                            staging_texture_guard
                                .get(&id)
                                .unwrap_or_else(|| panic!("{name}: staging buffer for texture {id:?} not registered"))
                        },
                        &mut in_operations,
                        NODE_GROUP,
                    );
                    Self::end(device.raw(), command_buffer)?;

                    // NODE_GROUP already carries this node's upstream
                    // waits/signals; execute_unified only appended the
                    // coalesced per-resource waits to the same group, so
                    // resolving it again picks up everything at once. If a
                    // buffer submission still follows in this job, its own
                    // resolve of NODE_GROUP would see the same signals —
                    // only the job's last submission may actually signal
                    // them.
                    let mut resolved = in_operations.resolve_group(NODE_GROUP)?;
                    if last_category_is_buffers {
                        resolved.signals.clear();
                    }
                    queue_context.submit(device.raw(), command_buffer, &resolved, vk::Fence::null())?;
                } else {
                    let split = split.as_ref().unwrap_or_else(|| {
                        panic!("{name}: split-path texture transfer pending with no split queue paths configured")
                    });
                    let last_index = texture_ids.len() - 1;
                    for (index, id) in texture_ids.into_iter().enumerate() {
                        let texture = texture_guard
                            .get(&id)
                            .unwrap_or_else(|| panic!("{name}: texture {id:?} not registered"));
                        let staging = staging_texture_guard
                            .get(&id)
                            .unwrap_or_else(|| panic!("{name}: staging buffer for texture {id:?} not registered"));
                        let owning = texture.state().queue_family_index.unwrap_or(destination_family);

                        let src_cb = split.source_command_buffers.create_command_buffer(device.raw())?;
                        let transfer_cb = split.transfer_command_buffers.create_command_buffer(device.raw())?;
                        let dst_cb = command_buffers.create_command_buffer(device.raw())?;
                        Self::begin(device.raw(), src_cb)?;
                        Self::begin(device.raw(), transfer_cb)?;
                        Self::begin(device.raw(), dst_cb)?;

                        scheduler_guard.execute_split(
                            device.raw(),
                            texture,
                            staging,
                            owning,
                            transfer_family,
                            destination_family,
                            src_cb,
                            transfer_cb,
                            dst_cb,
                            &mut in_operations,
                        )?;

                        Self::end(device.raw(), src_cb)?;
                        Self::end(device.raw(), transfer_cb)?;
                        Self::end(device.raw(), dst_cb)?;

                        let mut src_resolved = in_operations.resolve_group(SPLIT_RELEASE_GROUP)?;
                        src_resolved.waits.extend(node_ops.waits.iter().cloned());
                        split.source_queue_context.submit(device.raw(), src_cb, &src_resolved, vk::Fence::null())?;

                        let transfer_wait = in_operations.resolve_group(SPLIT_TRANSFER_WAIT_GROUP)?;
                        let transfer_signal = in_operations.resolve_group(SPLIT_TRANSFER_SIGNAL_GROUP)?;
                        let transfer_resolved = ResolvedSyncOps {
                            waits: transfer_wait.waits,
                            signals: transfer_signal.signals,
                        };
                        split.transfer_queue_context.submit(
                            device.raw(),
                            transfer_cb,
                            &transfer_resolved,
                            vk::Fence::null(),
                        )?;

                        let mut dst_resolved = in_operations.resolve_group(SPLIT_ACQUIRE_GROUP)?;
                        if index == last_index && !last_category_is_buffers {
                            dst_resolved.signals.extend(node_ops.signals.iter().cloned());
                        }
                        queue_context.submit(device.raw(), dst_cb, &dst_resolved, vk::Fence::null())?;
                    }
                }
            }

            if !buffer_ids.is_empty() {
                let unified = buffer_ids.iter().all(|&id| {
                    let buffer = buffer_guard
                        .get(&id)
                        .unwrap_or_else(|| panic!("{name}: buffer {id:?} not registered"));
                    let owning = buffer.state().queue_family_index.unwrap_or(destination_family);
                    scheduler_guard.use_unified_path(owning, transfer_family, destination_family)
                });

                if unified {
                    let command_buffer = command_buffers.create_command_buffer(device.raw())?;
                    Self::begin(device.raw(), command_buffer)?;
                    scheduler_guard.execute_unified_buffers(
                        device.raw(),
                        command_buffer,
                        |id| {
                            buffer_guard
                                .get(&id)
                                .unwrap_or_else(|| panic!("{name}: buffer {id:?} not registered"))
                        },
                        |id| {
                            staging_buffer_guard
                                .get(&id)
                                .unwrap_or_else(|| panic!("{name}: staging buffer for buffer {id:?} not registered"))
                        },
                        &mut in_operations,
                        NODE_GROUP,
                    );
                    Self::end(device.raw(), command_buffer)?;

                    let resolved = in_operations.resolve_group(NODE_GROUP)?;
                    queue_context.submit(device.raw(), command_buffer, &resolved, vk::Fence::null())?;
                } else {
                    let split = split.as_ref().unwrap_or_else(|| {
                        panic!("{name}: split-path buffer transfer pending with no split queue paths configured")
                    });
                    let last_index = buffer_ids.len() - 1;
                    for (index, id) in buffer_ids.into_iter().enumerate() {
                        let buffer = buffer_guard
                            .get(&id)
                            .unwrap_or_else(|| panic!("{name}: buffer {id:?} not registered"));
                        let staging = staging_buffer_guard
                            .get(&id)
                            .unwrap_or_else(|| panic!("{name}: staging buffer for buffer {id:?} not registered"));
                        let owning = buffer.state().queue_family_index.unwrap_or(destination_family);

                        let src_cb = split.source_command_buffers.create_command_buffer(device.raw())?;
                        let transfer_cb = split.transfer_command_buffers.create_command_buffer(device.raw())?;
                        let dst_cb = command_buffers.create_command_buffer(device.raw())?;
                        Self::begin(device.raw(), src_cb)?;
                        Self::begin(device.raw(), transfer_cb)?;
                        Self::begin(device.raw(), dst_cb)?;

                        scheduler_guard.execute_split_buffer(
                            device.raw(),
                            buffer,
                            staging,
                            owning,
                            transfer_family,
                            destination_family,
                            src_cb,
                            transfer_cb,
                            dst_cb,
                            &mut in_operations,
                        )?;

                        Self::end(device.raw(), src_cb)?;
                        Self::end(device.raw(), transfer_cb)?;
                        Self::end(device.raw(), dst_cb)?;

                        let mut src_resolved = in_operations.resolve_group(SPLIT_RELEASE_GROUP)?;
                        src_resolved.waits.extend(node_ops.waits.iter().cloned());
                        split.source_queue_context.submit(device.raw(), src_cb, &src_resolved, vk::Fence::null())?;

                        let transfer_wait = in_operations.resolve_group(SPLIT_TRANSFER_WAIT_GROUP)?;
                        let transfer_signal = in_operations.resolve_group(SPLIT_TRANSFER_SIGNAL_GROUP)?;
                        let transfer_resolved = ResolvedSyncOps {
                            waits: transfer_wait.waits,
                            signals: transfer_signal.signals,
                        };
                        split.transfer_queue_context.submit(
                            device.raw(),
                            transfer_cb,
                            &transfer_resolved,
                            vk::Fence::null(),
                        )?;

                        let mut dst_resolved = in_operations.resolve_group(SPLIT_ACQUIRE_GROUP)?;
                        if index == last_index {
                            dst_resolved.signals.extend(node_ops.signals.iter().cloned());
                        }
                        queue_context.submit(device.raw(), dst_cb, &dst_resolved, vk::Fence::null())?;
                    }
                }
            }

            Ok(())
        })
    }
}

/// Holds an external compute task; forwards the in-operations and
/// execution context to it unchanged.
pub struct ComputeNode {
    name: String,
    task: Arc<dyn IComputeTask>,
}

impl ComputeNode {
    /// Construct a compute node wrapping `task`.
    #[must_use]
    pub fn new(name: impl Into<String>, task: Arc<dyn IComputeTask>) -> Self {
        Self { name: name.into(), task }
    }

    fn is_active(&self) -> bool {
        self.task.is_active()
    }

    fn create_job(&self, in_operations: SyncObject) -> Job {
        let task = Arc::clone(&self.task);
        Box::new(move |execution_context: &ExecutionContext| -> EngineResult<()> {
            task.run(&in_operations, execution_context)
        })
    }
}

/// Holds a swapchain reference; builds a `VkPresentInfoKHR` from the
/// in-operations' wait list and the execution context's bound
/// render-target index.
pub struct PresentNode {
    name: String,
    queue_context: Arc<QueueContext>,
    swapchain: Arc<dyn SwapchainBackend>,
    swapchain_loader: Arc<ash::extensions::khr::Swapchain>,
}

impl PresentNode {
    /// Construct a present node over `swapchain`, presenting through
    /// `swapchain_loader` on the queue `queue_context` wraps.
    #[must_use]
    pub fn new(
        name: impl Into<String>,
        queue_context: Arc<QueueContext>,
        swapchain: Arc<dyn SwapchainBackend>,
        swapchain_loader: Arc<ash::extensions::khr::Swapchain>,
    ) -> Self {
        Self {
            name: name.into(),
            queue_context,
            swapchain,
            swapchain_loader,
        }
    }

    fn create_job(&self, in_operations: SyncObject) -> Job {
        let queue_context = Arc::clone(&self.queue_context);
        let swapchain = Arc::clone(&self.swapchain);
        let swapchain_loader = Arc::clone(&self.swapchain_loader);
        let name = self.name.clone();
        Box::new(move |execution_context: &ExecutionContext| -> EngineResult<()> {
            let pool_index = execution_context
                .pool_index()
                .ok_or_else(|| no_pool_index_bound(&name))?;
            let resolved = in_operations.resolve_group(NODE_GROUP)?;
            let wait_semaphores: Vec<vk::Semaphore> =
                resolved.waits.iter().map(|(semaphore, _, _)| *semaphore).collect();
            let swapchains = [swapchain.handle()];
            let indices = [pool_index.render_target_index];
            let present_info = vk::PresentInfoKHR::builder()
                .wait_semaphores(&wait_semaphores)
                .swapchains(&swapchains)
                .image_indices(&indices);

            let suboptimal = queue_context.present(&swapchain_loader, &present_info)?;
            if suboptimal {
                log::warn!("{name}: present returned suboptimal, swapchain recreation recommended");
            }
            Ok(())
        })
    }
}

/// Holds a pure-CPU task (no queue submission), e.g. image acquisition.
pub struct CpuNode {
    name: String,
    task: Arc<dyn ICpuTask>,
}

impl CpuNode {
    /// Construct a CPU node wrapping `task`.
    #[must_use]
    pub fn new(name: impl Into<String>, task: Arc<dyn ICpuTask>) -> Self {
        Self { name: name.into(), task }
    }

    fn is_active(&self) -> bool {
        self.task.is_active()
    }

    fn create_job(&self, _in_operations: SyncObject) -> Job {
        let task = Arc::clone(&self.task);
        Box::new(move |execution_context: &ExecutionContext| -> EngineResult<()> {
            task.run(execution_context)
        })
    }
}

/// A sync aggregation point with no work: exists purely so links can
/// fan in/out through a named point in the graph.
pub struct EmptyNode {
    name: String,
}

impl EmptyNode {
    /// Construct an empty node named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// The five kinds of schedulable work, plus the no-op aggregation node.
/// Shared operations are dispatched by match rather than through a
/// virtual base class, per the render graph's tagged-variant design.
pub enum Node {
    /// Records draw calls and submits to a graphics-capable queue.
    Render(RenderNode),
    /// Executes pending upload/download tasks from a [`TransferScheduler`].
    Transfer(TransferNode),
    /// Forwards to an external compute task.
    Compute(ComputeNode),
    /// Presents a swapchain image.
    Present(PresentNode),
    /// Runs a pure-CPU task with no queue submission.
    Cpu(CpuNode),
    /// A sync aggregation point with no work.
    Empty(EmptyNode),
}

impl Node {
    /// This node's name, unique within its owning graph.
    #[must_use]
    pub fn name(&self) -> &str {
        match self {
            Node::Render(n) => &n.name,
            Node::Transfer(n) => &n.name,
            Node::Compute(n) => &n.name,
            Node::Present(n) => &n.name,
            Node::Cpu(n) => &n.name,
            Node::Empty(n) => &n.name,
        }
    }

    /// Whether this node has work scheduled for the current frame.
    /// Inactive nodes are skipped by the scheduler and their links are
    /// pulled through to the next active node.
    #[must_use]
    pub fn is_active(&self) -> bool {
        match self {
            Node::Render(_) | Node::Present(_) | Node::Empty(_) => true,
            Node::Transfer(n) => n.is_active(),
            Node::Compute(n) => n.is_active(),
            Node::Cpu(n) => n.is_active(),
        }
    }

    /// Build this frame's job for the node, given the collected
    /// wait/signal [`SyncObject`] the scheduler assembled for it.
    #[must_use]
    pub fn create_job(&self, in_operations: SyncObject) -> Job {
        match self {
            Node::Render(n) => n.create_job(in_operations),
            Node::Transfer(n) => n.create_job(in_operations),
            Node::Compute(n) => n.create_job(in_operations),
            Node::Present(n) => n.create_job(in_operations),
            Node::Cpu(n) => n.create_job(in_operations),
            Node::Empty(_) => Box::new(|_execution_context: &ExecutionContext| Ok(())),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::TransferPathPreference;
    use std::sync::atomic::{AtomicBool, Ordering};

    struct FakeComputeTask {
        active: AtomicBool,
    }

    impl IComputeTask for FakeComputeTask {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn run(&self, _sync_operations: &SyncObject, _execution_context: &ExecutionContext) -> EngineResult<()> {
            Ok(())
        }
    }

    struct FakeCpuTask {
        active: AtomicBool,
    }

    impl ICpuTask for FakeCpuTask {
        fn is_active(&self) -> bool {
            self.active.load(Ordering::SeqCst)
        }

        fn run(&self, _execution_context: &ExecutionContext) -> EngineResult<()> {
            Ok(())
        }
    }

    #[test]
    fn empty_node_is_always_active_and_its_job_is_a_no_op() {
        let node = Node::Empty(EmptyNode::new("barrier"));
        assert!(node.is_active());
        assert_eq!(node.name(), "barrier");

        let execution_context = ExecutionContext::new(1);
        let job = node.create_job(SyncObject::new("in"));
        assert!(job(&execution_context).is_ok());
    }

    #[test]
    fn compute_node_activity_tracks_the_wrapped_task() {
        let task = Arc::new(FakeComputeTask { active: AtomicBool::new(false) });
        let node = Node::Compute(ComputeNode::new("kernel", task.clone()));
        assert!(!node.is_active());
        task.active.store(true, Ordering::SeqCst);
        assert!(node.is_active());
    }

    #[test]
    fn cpu_node_activity_tracks_the_wrapped_task() {
        let task = Arc::new(FakeCpuTask { active: AtomicBool::new(true) });
        let node = Node::Cpu(CpuNode::new("acquire", task));
        assert!(node.is_active());
    }

    #[test]
    fn transfer_node_activity_mirrors_scheduler_pending_count() {
        // TransferNode::is_active is a direct pass-through to
        // has_pending_transfers, already exercised against a real
        // TransferScheduler in transfer::scheduler's own tests;
        // constructing a TransferNode here would require a live
        // ash::Device, so we check the pass-through condition directly.
        let scheduler = TransferScheduler::new(TransferPathPreference::PreferUnified);
        assert!(!scheduler.has_pending_transfers());
    }
}

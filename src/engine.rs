//! Wires a device, a compiled render graph, and the per-frame scheduling
//! primitives into one owned lifecycle: acquire an image, dispatch the
//! frame's task DAG, and reclaim sync slots once their GPU work
//! completes.
//!
//! Grounded on spec.md §2's "a ParallelRenderEngine owns a compiled
//! graph, a pool of N execution contexts..., and a worker pool" and on
//! the teacher's own top-level `Engine` (`engine.rs`): one struct
//! assembling the subsystems the rest of this crate builds up, with an
//! explicit, device-idle-waiting shutdown rather than a `Drop` impl that
//! could panic mid-teardown.

use std::sync::Arc;

use crate::config::RenderEngineConfig;
use crate::device::Device;
use crate::error::{EngineError, EngineResult};
use crate::external::SwapchainBackend;
use crate::graph::graph::Graph;
use crate::scheduler::execution_context::{ExecutionContext, PoolIndex};
use crate::scheduler::taskflow::TaskflowScheduler;
use crate::swapchain::selector::{AcquireOutcome, SwapChainImageSelector};
use crate::sync::logbook::{LogbookEntry, SharedLogbook};

/// Name of the timeline semaphore a graph driven by this engine must
/// register on every sync slot for its present-side "work for this slot
/// is done" signal. Every such connection must declare its timeline
/// value as `1` relative to the current window, matching the watermark
/// [`ParallelRenderEngine::render_frame`] computes after stepping.
pub const RENDER_FINISHED_SEMAPHORE: &str = "render_finished";

/// Outcome of one [`ParallelRenderEngine::render_frame`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FrameOutcome {
    /// The frame's task DAG ran to completion against this pool index.
    Rendered(PoolIndex),
    /// The swapchain is stale; the caller should recreate it (and the
    /// engine built around it) and retry.
    SwapchainStale,
}

/// Owns the device, the compiled graph, the single ring-backed execution
/// context, the image selector, and the task scheduler for one
/// swapchain. Constructed once at startup and torn down once at
/// shutdown; never recreated in place, since recreation means a new
/// swapchain and therefore a new engine.
pub struct ParallelRenderEngine {
    device: Arc<Device>,
    graph: Graph,
    execution_context: ExecutionContext,
    selector: SwapChainImageSelector,
    scheduler: TaskflowScheduler,
    logbook: Option<SharedLogbook>,
    in_flight: Vec<(PoolIndex, u64)>,
}

impl ParallelRenderEngine {
    /// Assemble an engine over an already-compiled `graph` and
    /// `swapchain`, sizing the execution context's sync-slot ring to
    /// `config.back_buffer_count`.
    #[must_use]
    pub fn new(
        device: Arc<Device>,
        swapchain: Arc<dyn SwapchainBackend>,
        graph: Graph,
        config: &RenderEngineConfig,
    ) -> Self {
        let execution_context = ExecutionContext::new(config.back_buffer_count.max(1));
        let selector = SwapChainImageSelector::new(swapchain, config.acquire_probe_timeout_ns);
        let scheduler = TaskflowScheduler::new(config.worker_thread_count);
        let logbook = (config.sync_logbook_capacity > 0).then(|| SharedLogbook::new(config.sync_logbook_capacity));
        Self {
            device,
            graph,
            execution_context,
            selector,
            scheduler,
            logbook,
            in_flight: Vec::new(),
        }
    }

    /// The compiled graph this engine drives, for callers that need to
    /// stage further mutations (e.g. activating a transfer node) between
    /// frames.
    #[must_use]
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Diagnostic logbook, if `config.sync_logbook_capacity` was nonzero.
    #[must_use]
    pub fn logbook(&self) -> Option<&SharedLogbook> {
        self.logbook.as_ref()
    }

    /// Number of sync slots currently occupied by not-yet-reclaimed
    /// frames.
    #[must_use]
    pub fn frames_in_flight(&self) -> usize {
        self.in_flight.len()
    }

    /// Reclaim any previously acquired sync slots whose render-finished
    /// watermark has already been reached, without blocking.
    ///
    /// # Errors
    /// Propagates a Vulkan query failure reading a semaphore's value.
    pub fn reclaim_finished_slots(&mut self) -> EngineResult<()> {
        let mut still_in_flight = Vec::with_capacity(self.in_flight.len());
        for (index, target_value) in self.in_flight.drain(..) {
            let sync_object = self
                .execution_context
                .sync_object(index.sync_object_index)
                .ok_or_else(|| EngineError::NoSuchNode(format!("sync slot {}", index.sync_object_index)))?;
            let released = self.selector.release_sync_slot(
                self.device.raw(),
                index,
                sync_object,
                RENDER_FINISHED_SEMAPHORE,
                target_value,
            )?;
            if released {
                if let Some(logbook) = &self.logbook {
                    logbook.push(LogbookEntry::WaitAtPresent { semaphore: RENDER_FINISHED_SEMAPHORE.to_string() });
                }
            } else {
                still_in_flight.push((index, target_value));
            }
        }
        self.in_flight = still_in_flight;
        Ok(())
    }

    /// Acquire the next swapchain image onto a free sync slot, step that
    /// slot's render-finished window forward, dispatch the graph's task
    /// DAG against it, and record the resulting watermark so a later
    /// [`Self::reclaim_finished_slots`] call can free the slot.
    ///
    /// Under full back-pressure (every slot still in flight on the GPU)
    /// the selector reports [`AcquireOutcome::NoFreeSlot`] rather than
    /// spinning itself; this loop is the one side that can observe new
    /// GPU progress, so it re-reclaims between retries.
    ///
    /// # Errors
    /// Propagates acquisition failures (other than staleness) and the
    /// first task error the scheduler's dispatch encounters.
    pub fn render_frame(&mut self) -> EngineResult<FrameOutcome> {
        self.reclaim_finished_slots()?;

        let pool_index = loop {
            match self.selector.get_next_image(&mut self.execution_context)? {
                AcquireOutcome::Acquired(pool_index) => break pool_index,
                AcquireOutcome::SwapchainStale => return Ok(FrameOutcome::SwapchainStale),
                AcquireOutcome::NoFreeSlot => {
                    std::thread::yield_now();
                    self.reclaim_finished_slots()?;
                }
            }
        };

        if let Some(logbook) = &self.logbook {
            logbook.push(LogbookEntry::ImageAcquire {
                sync_slot: pool_index.sync_object_index,
                render_target_index: Some(pool_index.render_target_index),
            });
        }

        let target_value = {
            let sync_object = self
                .execution_context
                .current_sync_object_mut()
                .expect("pool index was just bound by get_next_image");
            sync_object.step_timeline(RENDER_FINISHED_SEMAPHORE)?;
            sync_object.primitives().timeline_offset(RENDER_FINISHED_SEMAPHORE)? + 1
        };

        self.scheduler.execute_frame(&self.graph, &mut self.execution_context)?;
        self.in_flight.push((pool_index, target_value));

        Ok(FrameOutcome::Rendered(pool_index))
    }

    /// Wait for the device to go idle and reclaim every still-in-flight
    /// sync slot. Call once at shutdown; the engine must not be used
    /// afterward.
    pub fn shutdown(mut self) {
        // SAFETY: called once, with no further submissions racing this wait.
        if let Err(err) = unsafe { self.device.raw().device_wait_idle() } {
            log::error!("device_wait_idle failed during engine shutdown: {err:?}");
        }
        if let Err(err) = self.reclaim_finished_slots() {
            log::error!("reclaim_finished_slots failed during engine shutdown: {err:?}");
        }
    }
}

//! Fluent graph construction with compile-time ordering of the GPU
//! signal/wait pair.
//!
//! Grounded on spec.md §4.7: a link's GPU connection must be declared
//! signal-then-wait, never the reverse or twice. Rather than a runtime
//! state machine, the link half of this builder is typestate-encoded —
//! [`LinkBuilder<Init>`] only offers `signal_on_gpu*` methods, each of
//! which consumes `self` and returns a `LinkBuilder` in a wait-only
//! state, so calling `wait_on_gpu` before any signal (or twice) is a
//! compile error rather than a runtime one.

use ash::vk;

use crate::error::EngineResult;
use crate::graph::graph::{Graph, GraphResult};
use crate::graph::link::{Connection, Link, LinkType};
use crate::graph::node::{ComputeNode, CpuNode, EmptyNode, Node, PresentNode, RenderNode, TransferNode};

/// Initial state of a [`LinkBuilder`]: nothing declared yet, only
/// `signal_on_gpu*` methods are available.
pub struct Init;

/// A signal step using an externally-signaled semaphore (e.g. a
/// swapchain image-available semaphore) was declared; the next call
/// must name that semaphore via [`LinkBuilder::wait_on_gpu_external`].
pub struct AwaitingExternalWait;

/// A signal step managed by the graph (auto-generated or caller-named
/// binary/timeline semaphore) was declared; the next call must supply
/// only the wait stage via [`LinkBuilder::wait_on_gpu`].
pub struct AwaitingManagedWait(ManagedSignal);

enum ManagedSignal {
    Binary { semaphore: String, signal_stage: vk::PipelineStageFlags2 },
    Timeline { semaphore: String, signal_stage: vk::PipelineStageFlags2, value: u64 },
}

/// A link under construction, parameterized by how much of the
/// signal/wait pair has been declared so far.
pub struct LinkBuilder<'g, S> {
    graph: &'g Graph,
    from: String,
    to: String,
    link_type: LinkType,
    state: S,
}

impl<'g> LinkBuilder<'g, Init> {
    /// Variant 1: no signal is generated; the downstream node waits on a
    /// semaphore signaled outside the graph (named at
    /// [`LinkBuilder::wait_on_gpu_external`] time).
    #[must_use]
    pub fn signal_on_gpu_external(self) -> LinkBuilder<'g, AwaitingExternalWait> {
        LinkBuilder {
            graph: self.graph,
            from: self.from,
            to: self.to,
            link_type: self.link_type,
            state: AwaitingExternalWait,
        }
    }

    /// Variant 2: an auto-named binary semaphore is created for this
    /// link, signaled at `stage` by the upstream node.
    #[must_use]
    pub fn signal_on_gpu(self, stage: vk::PipelineStageFlags2) -> LinkBuilder<'g, AwaitingManagedWait> {
        let semaphore = format!("{}__{}__signal", self.from, self.to);
        self.signal_on_gpu_with_binary(semaphore, stage)
    }

    /// Variant 3: a caller-named binary semaphore is signaled at `stage`.
    #[must_use]
    pub fn signal_on_gpu_with_binary(
        self,
        semaphore: impl Into<String>,
        stage: vk::PipelineStageFlags2,
    ) -> LinkBuilder<'g, AwaitingManagedWait> {
        LinkBuilder {
            graph: self.graph,
            from: self.from,
            to: self.to,
            link_type: self.link_type,
            state: AwaitingManagedWait(ManagedSignal::Binary { semaphore: semaphore.into(), signal_stage: stage }),
        }
    }

    /// Variant 4: a caller-named timeline semaphore is signaled to
    /// `value` at `stage`.
    #[must_use]
    pub fn signal_on_gpu_with_timeline(
        self,
        semaphore: impl Into<String>,
        value: u64,
        stage: vk::PipelineStageFlags2,
    ) -> LinkBuilder<'g, AwaitingManagedWait> {
        LinkBuilder {
            graph: self.graph,
            from: self.from,
            to: self.to,
            link_type: self.link_type,
            state: AwaitingManagedWait(ManagedSignal::Timeline { semaphore: semaphore.into(), signal_stage: stage, value }),
        }
    }
}

impl LinkBuilder<'_, AwaitingExternalWait> {
    /// Complete the link with an [`Connection::External`] wait.
    ///
    /// # Errors
    /// Propagates [`crate::error::EngineError::DuplicateEdge`] from
    /// staging, surfaced only once [`crate::graph::graph::Graph::apply_changes`]
    /// runs.
    pub fn wait_on_gpu_external(
        self,
        semaphore: impl Into<String>,
        wait_stage: vk::PipelineStageFlags2,
    ) -> GraphResult<()> {
        let mut link = Link::new(self.from, self.to, self.link_type);
        link.add_connection(Connection::External { semaphore: semaphore.into(), wait_stage, value: None });
        self.graph.stage_add_edge(link);
        Ok(())
    }
}

impl LinkBuilder<'_, AwaitingManagedWait> {
    /// Complete the link with a [`Connection::Pipeline`] wait at
    /// `wait_stage`, reusing the semaphore/value declared at the signal
    /// step.
    ///
    /// # Errors
    /// See [`LinkBuilder::wait_on_gpu_external`].
    pub fn wait_on_gpu(self, wait_stage: vk::PipelineStageFlags2) -> GraphResult<()> {
        let connection = match self.state.0 {
            ManagedSignal::Binary { semaphore, signal_stage } => {
                Connection::Pipeline { semaphore, signal_stage, wait_stage, value: None }
            }
            ManagedSignal::Timeline { semaphore, signal_stage, value } => {
                Connection::Pipeline { semaphore, signal_stage, wait_stage, value: Some(value) }
            }
        };
        let mut link = Link::new(self.from, self.to, self.link_type);
        link.add_connection(connection);
        self.graph.stage_add_edge(link);
        Ok(())
    }
}

/// Builds up a [`Graph`] through node/link registration helpers, then
/// hands off the finalized graph via [`Self::reset`].
pub struct RenderGraphBuilder {
    name: String,
    graph: Graph,
}

impl RenderGraphBuilder {
    /// Start building a graph named `name`.
    #[must_use]
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into(), graph: Graph::new() }
    }

    /// The name this builder (and its in-progress graph) was started
    /// with.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stage a render node.
    pub fn add_render_node(&self, node: RenderNode) {
        self.graph.stage_add_node(Node::Render(node));
    }

    /// Stage a transfer node.
    pub fn add_transfer_node(&self, node: TransferNode) {
        self.graph.stage_add_node(Node::Transfer(node));
    }

    /// Stage a compute node.
    pub fn add_compute_node(&self, node: ComputeNode) {
        self.graph.stage_add_node(Node::Compute(node));
    }

    /// Stage a present node.
    pub fn add_present_node(&self, node: PresentNode) {
        self.graph.stage_add_node(Node::Present(node));
    }

    /// Stage a CPU node.
    pub fn add_cpu_node(&self, node: CpuNode) {
        self.graph.stage_add_node(Node::Cpu(node));
    }

    /// Stage an empty (sync aggregation) node.
    pub fn add_empty_node(&self, node: EmptyNode) {
        self.graph.stage_add_node(Node::Empty(node));
    }

    /// Stage a link that serializes `from` and `to` on the CPU scheduler
    /// with no GPU semaphore connection.
    pub fn add_cpu_sync_link(&self, from: impl Into<String>, to: impl Into<String>) {
        self.graph.stage_add_edge(Link::new(from, to, LinkType::CpuSync));
    }

    /// Stage a link that allows `from` and `to` to run concurrently on
    /// the CPU scheduler, with no GPU semaphore connection.
    pub fn add_cpu_async_link(&self, from: impl Into<String>, to: impl Into<String>) {
        self.graph.stage_add_edge(Link::new(from, to, LinkType::CpuAsync));
    }

    /// Begin a link carrying a GPU semaphore connection between `from`
    /// and `to`. The returned builder enforces signal-before-wait at
    /// compile time.
    #[must_use]
    pub fn begin_gpu_link(&self, from: impl Into<String>, to: impl Into<String>) -> LinkBuilder<'_, Init> {
        LinkBuilder {
            graph: &self.graph,
            from: from.into(),
            to: to.into(),
            link_type: LinkType::Unknown,
            state: Init,
        }
    }

    /// Apply every staged mutation, return the finalized graph, and
    /// start a fresh empty graph named `new_name` for further edits.
    ///
    /// # Errors
    /// Propagates [`Graph::apply_changes`] failures; on error, `self`
    /// keeps its previous graph and name so the caller can retry or
    /// inspect the conflict.
    pub fn reset(&mut self, new_name: impl Into<String>) -> EngineResult<Graph> {
        self.graph.apply_changes()?;
        let finished = std::mem::replace(&mut self.graph, Graph::new());
        self.name = new_name.into();
        Ok(finished)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn managed_signal_round_trips_into_a_pipeline_connection() {
        let builder = RenderGraphBuilder::new("frame");
        builder.add_empty_node(EmptyNode::new("a"));
        builder.add_empty_node(EmptyNode::new("b"));
        builder
            .begin_gpu_link("a", "b")
            .signal_on_gpu(vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .wait_on_gpu(vk::PipelineStageFlags2::FRAGMENT_SHADER)
            .unwrap();

        let graph = {
            let mut builder = builder;
            builder.reset("next").unwrap()
        };
        let edges = graph.find_edges_from("a");
        assert_eq!(edges.len(), 1);
        match &edges[0].connections()[0] {
            Connection::Pipeline { wait_stage, .. } => {
                assert_eq!(*wait_stage, vk::PipelineStageFlags2::FRAGMENT_SHADER);
            }
            Connection::External { .. } => panic!("expected a managed pipeline connection"),
        }
    }

    #[test]
    fn external_signal_round_trips_into_an_external_connection() {
        let builder = RenderGraphBuilder::new("frame");
        builder.add_empty_node(EmptyNode::new("acquire"));
        builder.add_empty_node(EmptyNode::new("render"));
        builder
            .begin_gpu_link("acquire", "render")
            .signal_on_gpu_external()
            .wait_on_gpu_external("image_available", vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT)
            .unwrap();

        let mut builder = builder;
        let graph = builder.reset("next").unwrap();
        let edges = graph.find_edges_from("acquire");
        assert!(matches!(edges[0].connections()[0], Connection::External { .. }));
    }

    #[test]
    fn reset_starts_a_fresh_empty_graph() {
        let mut builder = RenderGraphBuilder::new("frame");
        builder.add_empty_node(EmptyNode::new("a"));
        let finished = builder.reset("frame2").unwrap();
        assert!(finished.has_node("a"));
        assert_eq!(builder.name(), "frame2");
        assert!(!builder.graph.has_node("a"));
    }
}

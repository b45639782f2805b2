//! Directed edges between graph nodes: how strongly they must serialize
//! on the CPU scheduler, and which semaphore connections carry GPU
//! synchronization between them.
//!
//! Grounded on spec.md §3/§4.5's `Link`/`LinkType`/connection model; the
//! two connection kinds mirror `PipelineConnection`/`ExternalConnection`
//! from the original's `GpuLinkBuilder`.

use ash::vk;

use crate::sync::object::SyncOperation;

/// How strongly a link's two nodes must serialize on the CPU task
/// scheduler, independent of whatever GPU synchronization its
/// connections carry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkType {
    /// The two nodes must run one after another on the CPU scheduler.
    CpuSync,
    /// The two nodes may run concurrently on the CPU, but still carry
    /// GPU-side synchronization via this link's connections.
    CpuAsync,
    /// No CPU-scheduling relationship implied; GPU connections (if any)
    /// still apply.
    Unknown,
}

/// A single semaphore connection carried by a link.
#[derive(Debug, Clone)]
pub enum Connection {
    /// Both endpoints (signal and wait) are managed by this link.
    Pipeline {
        /// Name of the semaphore this connection uses.
        semaphore: String,
        /// Stage the upstream node signals at.
        signal_stage: vk::PipelineStageFlags2,
        /// Stage the downstream node waits at.
        wait_stage: vk::PipelineStageFlags2,
        /// Timeline value, if the semaphore is a timeline semaphore.
        value: Option<u64>,
    },
    /// Wait-only: the signal side is external to the graph (e.g. a
    /// swapchain image-available semaphore signaled by the driver).
    External {
        /// Name of the semaphore this connection waits on.
        semaphore: String,
        /// Stage the downstream node waits at.
        wait_stage: vk::PipelineStageFlags2,
        /// Timeline value, if the semaphore is a timeline semaphore.
        value: Option<u64>,
    },
}

impl Connection {
    /// The wait-side [`SyncOperation`] this connection contributes to
    /// its downstream node's in-operations.
    #[must_use]
    pub fn wait_operation(&self) -> SyncOperation {
        match self {
            Connection::Pipeline { semaphore, wait_stage, value, .. }
            | Connection::External { semaphore, wait_stage, value } => SyncOperation {
                semaphore_name: semaphore.clone(),
                stage_mask: *wait_stage,
                value: *value,
            },
        }
    }

    /// The signal-side [`SyncOperation`] this connection contributes to
    /// its upstream node's out-operations, if this connection's signal
    /// side is managed by the graph (`None` for [`Connection::External`]).
    #[must_use]
    pub fn signal_operation(&self) -> Option<SyncOperation> {
        match self {
            Connection::Pipeline { semaphore, signal_stage, value, .. } => Some(SyncOperation {
                semaphore_name: semaphore.clone(),
                stage_mask: *signal_stage,
                value: *value,
            }),
            Connection::External { .. } => None,
        }
    }
}

/// A directed edge from one node to another, carrying a CPU-scheduling
/// relationship and zero or more semaphore connections.
#[derive(Debug, Clone)]
pub struct Link {
    from: String,
    to: String,
    link_type: LinkType,
    connections: Vec<Connection>,
}

impl Link {
    /// Construct a link with no connections yet.
    #[must_use]
    pub fn new(from: impl Into<String>, to: impl Into<String>, link_type: LinkType) -> Self {
        Self {
            from: from.into(),
            to: to.into(),
            link_type,
            connections: Vec::new(),
        }
    }

    /// Name of the upstream node.
    #[must_use]
    pub fn from(&self) -> &str {
        &self.from
    }

    /// Name of the downstream node.
    #[must_use]
    pub fn to(&self) -> &str {
        &self.to
    }

    /// This link's CPU-scheduling relationship.
    #[must_use]
    pub fn link_type(&self) -> LinkType {
        self.link_type
    }

    /// Append a connection to this link.
    pub fn add_connection(&mut self, connection: Connection) {
        self.connections.push(connection);
    }

    /// This link's connections, in the order they were added.
    #[must_use]
    pub fn connections(&self) -> &[Connection] {
        &self.connections
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pipeline_connection_produces_both_wait_and_signal_operations() {
        let connection = Connection::Pipeline {
            semaphore: "render_finished".into(),
            signal_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            wait_stage: vk::PipelineStageFlags2::FRAGMENT_SHADER,
            value: Some(5),
        };
        assert_eq!(connection.wait_operation().stage_mask, vk::PipelineStageFlags2::FRAGMENT_SHADER);
        assert_eq!(connection.signal_operation().unwrap().stage_mask, vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT);
    }

    #[test]
    fn external_connection_has_no_signal_side() {
        let connection = Connection::External {
            semaphore: "image_available".into(),
            wait_stage: vk::PipelineStageFlags2::COLOR_ATTACHMENT_OUTPUT,
            value: None,
        };
        assert!(connection.signal_operation().is_none());
        assert_eq!(connection.wait_operation().semaphore_name, "image_available");
    }

    #[test]
    fn link_preserves_endpoint_names_and_type() {
        let link = Link::new("acquire", "forward_renderer", LinkType::CpuAsync);
        assert_eq!(link.from(), "acquire");
        assert_eq!(link.to(), "forward_renderer");
        assert_eq!(link.link_type(), LinkType::CpuAsync);
        assert!(link.connections().is_empty());
    }
}

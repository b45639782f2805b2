//! Per-frame state ([`execution_context`]) and the task-DAG dispatcher
//! that turns a committed [`crate::graph::graph::Graph`] into concurrent
//! work for one frame ([`taskflow`]).

pub mod execution_context;
pub mod taskflow;

// SPDX-License-Identifier: MIT OR Apache-2.0
//! The capability handed to plugin hooks.

use crate::edge::Edge;
use crate::error::{ConfigurationError, GraphError};
use crate::graph::Graph;
use crate::node::{NodeId, Props};
use crate::port::{Port, PortType, PortUpdate};
use crate::scheduler::{Task, TimerId};
use crate::value::Value;
use std::time::Duration;

/// Access to the owning node and to the graph operations a node may perform.
///
/// Structural changes made here go through the same [`Graph`] APIs a host
/// would call, so the graph stays the only authority over ports and edges.
pub struct NodeContext<'g> {
    graph: &'g mut Graph,
    node: NodeId,
}

impl<'g> NodeContext<'g> {
    pub(crate) fn new(graph: &'g mut Graph, node: NodeId) -> Self {
        Self { graph, node }
    }

    /// ID of the node whose hook is running
    pub fn id(&self) -> &NodeId {
        &self.node
    }

    /// Props of the running node
    pub fn props(&self) -> Option<&Props> {
        self.graph.node(&self.node).map(|node| &node.props)
    }

    /// Mutable props of the running node
    pub fn props_mut(&mut self) -> Option<&mut Props> {
        self.graph.node_mut(&self.node).map(|node| &mut node.props)
    }

    /// Param of the running node
    pub fn param(&self, key: &str) -> Option<&Value> {
        self.props().and_then(|props| props.params.get(key))
    }

    /// Set a param of the running node
    pub fn set_param(&mut self, key: impl Into<String>, value: Value) {
        if let Some(props) = self.props_mut() {
            props.params.insert(key.into(), value);
        }
    }

    /// Whether the running node has a port
    pub fn has_port(&self, name: &str) -> bool {
        self.graph.port(&self.node, name).is_some()
    }

    /// Current value of one of the running node's ports
    pub fn port_value(&self, name: &str) -> Option<&Value> {
        self.graph.port(&self.node, name).and_then(|port| port.value.as_ref())
    }

    /// Add a port to the running node
    pub fn add_port(&mut self, port: Port) -> Result<(), ConfigurationError> {
        let node = self.node.clone();
        self.graph.add_port(&node, port)
    }

    /// Remove a port from the running node, returning the edges that were
    /// bound to it
    pub fn remove_port(&mut self, name: &str) -> Result<Vec<Edge>, ConfigurationError> {
        let node = self.node.clone();
        self.graph.remove_port(&node, name).map(|(_, edges)| edges)
    }

    /// Update one of the running node's ports as if data had arrived on it.
    ///
    /// Failures are reported by the graph and yield `None`; they never
    /// abort the caller.
    pub fn run(&mut self, port: &str, data: Value) -> Option<Value> {
        let node = self.node.clone();
        let update = PortUpdate::from_node(data, node.clone());
        self.graph.run_port(&node, port, update).ok().flatten()
    }

    /// Type descriptor inferred from a value
    pub fn type_of(&self, value: &Value) -> PortType {
        PortType::of_value(value)
    }

    /// Current time on the graph clock
    pub fn now(&self) -> Duration {
        self.graph.now()
    }

    /// Call the plugin's `on_timer` once after `delay`
    pub fn set_timeout(&mut self, delay: Duration) -> TimerId {
        let task = Task::Plugin(self.node.clone());
        self.graph.scheduler_mut().schedule(delay, None, task)
    }

    /// Call the plugin's `on_timer` every `period`
    pub fn set_interval(&mut self, period: Duration) -> TimerId {
        let task = Task::Plugin(self.node.clone());
        self.graph.scheduler_mut().schedule(period, Some(period), task)
    }

    /// Call the plugin's `on_timer` on the next frame
    pub fn request_frame(&mut self) -> TimerId {
        let task = Task::Plugin(self.node.clone());
        self.graph.scheduler_mut().request_frame(task)
    }

    /// Cancel a timer or frame request
    pub fn cancel_timer(&mut self, timer: TimerId) -> bool {
        self.graph.scheduler_mut().cancel(timer)
    }

    /// Record a non-fatal problem against the graph's reports
    pub fn report(&mut self, error: GraphError) {
        self.graph.report(error);
    }
}

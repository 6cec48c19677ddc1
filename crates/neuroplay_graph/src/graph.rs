// SPDX-License-Identifier: MIT OR Apache-2.0
//! Graph arena owning nodes, edges and the scheduler.

use crate::config::GraphConfig;
use crate::context::NodeContext;
use crate::edge::{Edge, EdgeId, Endpoint};
use crate::error::{ConfigurationError, GraphError};
use crate::node::{Node, NodeId, Plugin, Props};
use crate::port::Port;
use crate::scheduler::Scheduler;
use crate::value::Value;
use indexmap::IndexMap;
use std::collections::VecDeque;
use std::fmt;
use std::time::Duration;

/// Lifecycle state of a graph
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GraphState {
    /// Nodes are registered but not initialised
    Stopped,
    /// Nodes are initialised and accept data
    Running,
}

/// Observer of a port's outputs
pub(crate) struct Sink {
    pub endpoint: Endpoint,
    pub callback: Box<dyn FnMut(&Value)>,
}

/// A dataflow graph.
///
/// Owns every node and edge of a session. Nodes are addressed by their
/// string [`NodeId`]; a node never holds a reference back to the graph and
/// reaches it only through the [`NodeContext`] passed into its hooks.
pub struct Graph {
    /// Graph name
    pub name: String,
    pub(crate) config: GraphConfig,
    pub(crate) nodes: IndexMap<NodeId, Node>,
    pub(crate) edges: IndexMap<EdgeId, Edge>,
    pub(crate) scheduler: Scheduler,
    pub(crate) sinks: Vec<Sink>,
    pub(crate) depth: usize,
    reports: VecDeque<GraphError>,
    state: GraphState,
}

impl Graph {
    /// Create a new empty graph
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, GraphConfig::default())
    }

    /// Create a new empty graph with explicit tunables
    pub fn with_config(name: impl Into<String>, config: GraphConfig) -> Self {
        Self {
            name: name.into(),
            config,
            nodes: IndexMap::new(),
            edges: IndexMap::new(),
            scheduler: Scheduler::default(),
            sinks: Vec::new(),
            depth: 0,
            reports: VecDeque::new(),
            state: GraphState::Stopped,
        }
    }

    /// Engine tunables
    pub fn config(&self) -> &GraphConfig {
        &self.config
    }

    // ------------------------------------------------------------------
    // Nodes
    // ------------------------------------------------------------------

    /// Add a node to the graph.
    ///
    /// A node added to a running graph is initialised immediately.
    pub fn add_node(&mut self, node: Node) -> Result<NodeId, ConfigurationError> {
        if self.nodes.contains_key(&node.id) {
            return Err(ConfigurationError::DuplicateNode(node.id.clone()));
        }
        let id = node.id.clone();
        tracing::debug!(node = %id, plugin = %node.plugin_type, "Adding node");
        self.nodes.insert(id.clone(), node);
        if self.is_running() {
            self.init_node(&id);
        }
        Ok(id)
    }

    /// Wrap a plugin in a node and add it
    pub fn add_plugin(
        &mut self,
        id: impl Into<NodeId>,
        plugin_type: impl Into<String>,
        props: Props,
        plugin: Box<dyn Plugin>,
    ) -> Result<NodeId, ConfigurationError> {
        let node = Node::new(id, plugin_type, props, plugin)?;
        self.add_node(node)
    }

    /// Remove a node and its edges, running `deinit` first if needed.
    ///
    /// Any timer or frame request still targeting the node is discarded,
    /// including ones the plugin forgot to cancel in `deinit`.
    pub fn remove_node(&mut self, id: &NodeId) -> Option<Node> {
        if self.nodes.get(id)?.initialized {
            self.deinit_node(id);
        }
        let cancelled = self.scheduler.cancel_node(id);
        self.edges.retain(|_, edge| !edge.involves_node(id));
        tracing::debug!(node = %id, cancelled, "Removing node");
        self.nodes.shift_remove(id)
    }

    /// Get a node by ID
    pub fn node(&self, id: &NodeId) -> Option<&Node> {
        self.nodes.get(id)
    }

    /// Get a mutable node by ID
    pub fn node_mut(&mut self, id: &NodeId) -> Option<&mut Node> {
        self.nodes.get_mut(id)
    }

    /// Get all nodes in insertion order
    pub fn nodes(&self) -> impl Iterator<Item = &Node> {
        self.nodes.values()
    }

    /// Get all node IDs in insertion order
    pub fn node_ids(&self) -> impl Iterator<Item = &NodeId> {
        self.nodes.keys()
    }

    /// Get the number of nodes
    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    /// Whether a node is registered
    pub fn contains_node(&self, id: &NodeId) -> bool {
        self.nodes.contains_key(id)
    }

    // ------------------------------------------------------------------
    // Ports
    // ------------------------------------------------------------------

    /// Get a port
    pub fn port(&self, node: &NodeId, name: &str) -> Option<&Port> {
        self.nodes.get(node).and_then(|n| n.ports.get(name))
    }

    /// Current value of a port
    pub fn value(&self, node: &NodeId, port: &str) -> Option<&Value> {
        self.port(node, port).and_then(|p| p.value.as_ref())
    }

    /// Add a port to a node
    pub fn add_port(&mut self, node: &NodeId, port: Port) -> Result<(), ConfigurationError> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| ConfigurationError::NodeNotFound(node.clone()))?;
        if entry.ports.contains_key(&port.name) {
            return Err(ConfigurationError::DuplicatePort {
                node: node.clone(),
                port: port.name,
            });
        }
        tracing::debug!(node = %node, port = %port.name, output = %port.output_type, "Adding port");
        entry.ports.insert(port.name.clone(), port);
        Ok(())
    }

    /// Remove a port from a node.
    ///
    /// Edges bound to the port are dropped and returned; a port re-created
    /// later under the same name starts unwired.
    pub fn remove_port(
        &mut self,
        node: &NodeId,
        name: &str,
    ) -> Result<(Port, Vec<Edge>), ConfigurationError> {
        let entry = self
            .nodes
            .get_mut(node)
            .ok_or_else(|| ConfigurationError::NodeNotFound(node.clone()))?;
        let port = entry
            .ports
            .shift_remove(name)
            .ok_or_else(|| ConfigurationError::PortNotFound(Endpoint::new(node.clone(), name)))?;
        entry.pending.retain(|(pending, _)| pending != name);
        entry.deferred.remove(name);
        let cancelled = self.scheduler.cancel_port(node, name);

        let mut dropped = Vec::new();
        self.edges.retain(|_, edge| {
            if edge.involves_port(node, name) {
                dropped.push(edge.clone());
                false
            } else {
                true
            }
        });
        tracing::debug!(node = %node, port = name, dropped = dropped.len(), cancelled, "Removing port");
        Ok((port, dropped))
    }

    // ------------------------------------------------------------------
    // Edges
    // ------------------------------------------------------------------

    /// Wire `source` to `target`
    pub fn connect(&mut self, source: Endpoint, target: Endpoint) -> Result<EdgeId, ConfigurationError> {
        for endpoint in [&source, &target] {
            let node = self
                .nodes
                .get(&endpoint.node)
                .ok_or_else(|| ConfigurationError::NodeNotFound(endpoint.node.clone()))?;
            if node.port(&endpoint.port).is_none() {
                return Err(ConfigurationError::PortNotFound(endpoint.clone()));
            }
        }
        if self
            .edges
            .values()
            .any(|edge| edge.source == source && edge.target == target)
        {
            return Err(ConfigurationError::DuplicateEdge(source, target));
        }

        let edge = Edge::new(source, target);
        let id = edge.id;
        tracing::debug!(%edge, "Connecting");
        self.edges.insert(id, edge);
        Ok(id)
    }

    /// Remove an edge
    pub fn disconnect(&mut self, id: EdgeId) -> Option<Edge> {
        self.edges.shift_remove(&id)
    }

    /// Get an edge by ID
    pub fn edge(&self, id: EdgeId) -> Option<&Edge> {
        self.edges.get(&id)
    }

    /// Get all edges in wiring order
    pub fn edges(&self) -> impl Iterator<Item = &Edge> {
        self.edges.values()
    }

    /// Edges fed by a port
    pub fn edges_from<'a>(&'a self, source: &'a Endpoint) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |edge| edge.source == *source)
    }

    /// Edges feeding a port
    pub fn edges_to<'a>(&'a self, target: &'a Endpoint) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |edge| edge.target == *target)
    }

    /// Edges touching a node
    pub fn edges_for_node<'a>(&'a self, node: &'a NodeId) -> impl Iterator<Item = &'a Edge> + 'a {
        self.edges.values().filter(move |edge| edge.involves_node(node))
    }

    /// Get the number of edges
    pub fn edge_count(&self) -> usize {
        self.edges.len()
    }

    // ------------------------------------------------------------------
    // Sinks
    // ------------------------------------------------------------------

    /// Observe every defined output of a port.
    ///
    /// The port does not have to exist yet, which lets hosts watch ports a
    /// dynamic node will create later.
    pub fn add_sink(&mut self, endpoint: Endpoint, callback: impl FnMut(&Value) + 'static) {
        self.sinks.push(Sink {
            endpoint,
            callback: Box::new(callback),
        });
    }

    // ------------------------------------------------------------------
    // Lifecycle
    // ------------------------------------------------------------------

    /// Initialise every node and accept data
    pub fn start(&mut self) {
        if self.is_running() {
            return;
        }
        tracing::info!(graph = %self.name, nodes = self.nodes.len(), edges = self.edges.len(), "Starting graph");
        self.state = GraphState::Running;
        let ids: Vec<NodeId> = self.nodes.keys().cloned().collect();
        for id in &ids {
            self.init_node(id);
        }
    }

    /// Deinitialise every node in reverse order and drop scheduled work
    pub fn stop(&mut self) {
        if !self.is_running() {
            return;
        }
        tracing::info!(graph = %self.name, "Stopping graph");
        let ids: Vec<NodeId> = self.nodes.keys().rev().cloned().collect();
        for id in &ids {
            self.deinit_node(id);
        }
        for node in self.nodes.values_mut() {
            node.pending.clear();
            node.deferred.clear();
        }
        self.scheduler.clear();
        self.state = GraphState::Stopped;
    }

    /// Current lifecycle state
    pub fn state(&self) -> GraphState {
        self.state
    }

    /// Whether the graph accepts data
    pub fn is_running(&self) -> bool {
        self.state == GraphState::Running
    }

    pub(crate) fn init_node(&mut self, id: &NodeId) {
        match self.nodes.get(id) {
            Some(node) if !node.initialized => {}
            _ => return,
        }
        let result = self.with_plugin(id, |plugin, ctx| plugin.init(ctx));
        if let Some(node) = self.nodes.get_mut(id) {
            node.initialized = true;
        }
        if let Some(Err(source)) = result {
            self.report(GraphError::Lifecycle {
                node: id.clone(),
                source,
            });
        }
        self.drain_pending(id);
    }

    pub(crate) fn deinit_node(&mut self, id: &NodeId) {
        match self.nodes.get(id) {
            Some(node) if node.initialized => {}
            _ => return,
        }
        self.with_plugin(id, |plugin, ctx| plugin.deinit(ctx));
        if let Some(node) = self.nodes.get_mut(id) {
            node.initialized = false;
        }
    }

    /// Run `f` with the node's plugin checked out.
    ///
    /// Returns `None` when the node is missing or its plugin is already
    /// checked out by a hook further up the stack.
    pub(crate) fn with_plugin<R>(
        &mut self,
        id: &NodeId,
        f: impl FnOnce(&mut Box<dyn Plugin>, &mut NodeContext<'_>) -> R,
    ) -> Option<R> {
        let mut plugin = self.nodes.get_mut(id)?.plugin.take()?;
        let result = {
            let mut ctx = NodeContext::new(self, id.clone());
            f(&mut plugin, &mut ctx)
        };
        if let Some(node) = self.nodes.get_mut(id) {
            node.plugin = Some(plugin);
        }
        Some(result)
    }

    // ------------------------------------------------------------------
    // Clock and reports
    // ------------------------------------------------------------------

    /// Current time on the graph clock
    pub fn now(&self) -> Duration {
        self.scheduler.now()
    }

    /// Frames run so far
    pub fn frame_count(&self) -> u64 {
        self.scheduler.frame_count()
    }

    /// Timers waiting to fire
    pub fn pending_timers(&self) -> usize {
        self.scheduler.pending_timers()
    }

    /// Tasks waiting for the next frame
    pub fn pending_frames(&self) -> usize {
        self.scheduler.pending_frames()
    }

    pub(crate) fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    /// Log an error and keep it for the host
    pub fn report(&mut self, error: GraphError) {
        match &error {
            GraphError::Configuration(_) => tracing::warn!("{error}"),
            err if err.is_warning() => tracing::warn!("{error}"),
            _ => tracing::error!("{error}"),
        }
        if self.config.report_capacity == 0 {
            return;
        }
        while self.reports.len() >= self.config.report_capacity {
            self.reports.pop_front();
        }
        self.reports.push_back(error);
    }

    /// Reports not yet drained
    pub fn reports(&self) -> impl Iterator<Item = &GraphError> {
        self.reports.iter()
    }

    /// Drain the reports
    pub fn take_reports(&mut self) -> Vec<GraphError> {
        self.reports.drain(..).collect()
    }
}

impl Default for Graph {
    fn default() -> Self {
        Self::new("Untitled")
    }
}

impl fmt::Debug for Graph {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Graph")
            .field("name", &self.name)
            .field("state", &self.state)
            .field("nodes", &self.nodes)
            .field("edges", &self.edges)
            .field("now", &self.scheduler.now())
            .finish_non_exhaustive()
    }
}

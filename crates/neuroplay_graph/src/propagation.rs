// SPDX-License-Identifier: MIT OR Apache-2.0
//! Firing nodes and propagating their outputs along edges.
//!
//! One trigger on a port goes through these steps:
//!
//! 1. The port handler runs once, synchronously.
//! 2. With a `delay`, everything after step 1 waits on a single timer per
//!    port. Later triggers replace the pending payload instead of arming
//!    another timer.
//! 3. Every defined output is pushed to the ports wired to this one
//!    (downstream with `forward`, upstream with `backward`).
//! 4. `repeat`/`recursive` add further invocations, either in a tight loop
//!    or one per frame when `frame` is set.
//!
//! A failing handler aborts its own branch only. There is no cycle
//! detection; nesting deeper than `max_depth` is cut off and reported.

use crate::edge::Endpoint;
use crate::error::{ConfigurationError, GraphError, Result};
use crate::graph::Graph;
use crate::node::{NodeId, Props};
use crate::port::{PortHandler, PortType, PortUpdate};
use crate::scheduler::{Task, TimerId};
use crate::value::Value;
use std::time::Duration;

/// How one trigger expands into invocations
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Expansion {
    Once,
    Repeat,
    Recursive,
}

/// State of a trigger that may span several invocations
#[derive(Debug, Clone)]
pub(crate) struct Firing {
    pub node: NodeId,
    pub port: String,
    pub origin: Option<NodeId>,
    /// Data of the original trigger
    pub input: Value,
    /// Input of the next invocation
    pub next: Value,
    /// Invocations still to run
    pub remaining: u32,
    pub expansion: Expansion,
    pub frame: bool,
}

impl Firing {
    fn new(node: &NodeId, port: &str, update: &PortUpdate, props: &Props) -> Self {
        let expansion = if props.recursive.is_some() {
            Expansion::Recursive
        } else if props.repeat.is_some() {
            Expansion::Repeat
        } else {
            Expansion::Once
        };
        Self {
            node: node.clone(),
            port: port.to_string(),
            origin: update.origin.clone(),
            input: update.data.clone(),
            next: update.data.clone(),
            remaining: props.invocations() - 1,
            expansion,
            frame: props.frame,
        }
    }

    /// Prepare the next invocation from the last output.
    /// Returns false when the firing is finished.
    fn chain(&mut self, output: Option<&Value>) -> bool {
        if self.remaining == 0 {
            return false;
        }
        match (self.expansion, output) {
            (Expansion::Once, _) => false,
            (Expansion::Repeat, _) => {
                self.next = self.input.clone();
                true
            }
            (Expansion::Recursive, Some(value)) => {
                self.next = value.clone();
                true
            }
            (Expansion::Recursive, None) => {
                self.remaining = 0;
                false
            }
        }
    }

    fn update(&self) -> PortUpdate {
        PortUpdate {
            data: self.next.clone(),
            origin: self.origin.clone(),
        }
    }
}

impl Graph {
    /// Write data into a port from outside the graph.
    ///
    /// Returns the value the port stored, or `None` when its handler gated
    /// the update. Downstream failures are reported, not returned.
    pub fn push(
        &mut self,
        node: impl Into<NodeId>,
        port: &str,
        data: impl Into<Value>,
    ) -> Result<Option<Value>> {
        if !self.is_running() {
            return Err(GraphError::NotRunning);
        }
        let node = node.into();
        self.run_port(&node, port, PortUpdate::external(data.into()))
    }

    /// Advance the graph clock, firing every timer that comes due.
    /// Returns the number of timers fired.
    pub fn advance(&mut self, elapsed: Duration) -> usize {
        let until = self.scheduler.now() + elapsed;
        let mut fired = 0;
        while let Some(expired) = self.scheduler.pop_due(until) {
            self.scheduler.set_now(expired.due);
            self.dispatch(expired.id, expired.task);
            fired += 1;
        }
        self.scheduler.set_now(until);
        fired
    }

    /// Run the work queued for this frame.
    /// Work queued while the frame runs waits for the next one.
    pub fn frame(&mut self) -> usize {
        let tasks = self.scheduler.take_frame();
        let count = tasks.len();
        for (id, task) in tasks {
            self.dispatch(id, task);
        }
        count
    }

    /// Update a port and everything downstream of it
    pub(crate) fn run_port(&mut self, node: &NodeId, port: &str, update: PortUpdate) -> Result<Option<Value>> {
        if self.depth >= self.config.max_depth {
            let err = GraphError::DepthExceeded {
                endpoint: Endpoint::new(node.clone(), port),
                limit: self.config.max_depth,
            };
            self.report(err.clone());
            return Err(err);
        }
        self.depth += 1;
        let result = self.fire(node, port, update);
        self.depth -= 1;
        result
    }

    fn fire(&mut self, node_id: &NodeId, port: &str, update: PortUpdate) -> Result<Option<Value>> {
        let Some(node) = self.nodes.get(node_id) else {
            let err = GraphError::from(ConfigurationError::NodeNotFound(node_id.clone()));
            self.report(err.clone());
            return Err(err);
        };
        let Some(target) = node.ports.get(port) else {
            let err = GraphError::from(ConfigurationError::PortNotFound(Endpoint::new(
                node_id.clone(),
                port,
            )));
            self.report(err.clone());
            return Err(err);
        };

        let mismatch = (self.config.warn_on_schema_mismatch && !target.input_type.accepts(&update.data))
            .then(|| GraphError::SchemaMismatch {
                endpoint: Endpoint::new(node_id.clone(), port),
                expected: target.input_type.clone(),
                found: PortType::of_value(&update.data),
            });
        let busy = target.handler == PortHandler::Operator && node.plugin.is_none();
        let firing = Firing::new(node_id, port, &update, &node.props);
        let delay = node.props.delay;

        if let Some(warning) = mismatch {
            self.report(warning);
        }
        if busy {
            self.enqueue(node_id, port, update);
            return Ok(None);
        }

        let output = match self.invoke(node_id, port, &update) {
            Ok(output) => output,
            Err(err) => {
                self.drain_pending(node_id);
                return Err(err);
            }
        };
        // A gated output ends a recursive chain before it starts
        let finished = output.is_none() && (firing.remaining == 0 || firing.expansion == Expansion::Recursive);
        if !finished {
            match delay {
                Some(delay) => self.defer(firing, output.clone(), delay),
                None => self.complete(firing, output.clone()),
            }
        }
        // Updates queued while the plugin ran follow this one downstream
        self.drain_pending(node_id);
        Ok(output)
    }

    /// Run a port handler and store a defined result on the port
    fn invoke(&mut self, node_id: &NodeId, port: &str, update: &PortUpdate) -> Result<Option<Value>> {
        let Some(handler) = self.port(node_id, port).map(|p| p.handler) else {
            let err = GraphError::from(ConfigurationError::PortNotFound(Endpoint::new(
                node_id.clone(),
                port,
            )));
            self.report(err.clone());
            return Err(err);
        };

        let result = match handler {
            PortHandler::Passthrough => Ok(Some(update.data.clone())),
            PortHandler::Operator => {
                let outcome = self.with_plugin(node_id, |plugin, ctx| plugin.operator(ctx, port, update));
                let Some(result) = outcome else {
                    self.enqueue(node_id, port, update.clone());
                    return Ok(None);
                };
                result
            }
        };

        let stored = match result {
            Ok(Some(value)) => {
                if let Some(target) = self.nodes.get_mut(node_id).and_then(|n| n.ports.get_mut(port)) {
                    target.value = Some(value.clone());
                }
                Ok(Some(value))
            }
            Ok(None) => Ok(None),
            Err(source) => {
                let err = GraphError::Operator {
                    endpoint: Endpoint::new(node_id.clone(), port),
                    source,
                };
                self.report(err.clone());
                Err(err)
            }
        };
        stored
    }

    /// Queue an update for a node whose plugin is busy
    fn enqueue(&mut self, node_id: &NodeId, port: &str, update: PortUpdate) {
        if let Some(node) = self.nodes.get_mut(node_id) {
            tracing::debug!(node = %node_id, port, "Node busy, queueing update");
            node.pending.push_back((port.to_string(), update));
        }
    }

    /// Run updates queued for a node, unless its plugin is still checked out
    pub(crate) fn drain_pending(&mut self, node_id: &NodeId) {
        if self.nodes.get(node_id).map_or(true, |node| node.plugin.is_none()) {
            return;
        }
        while let Some((port, update)) = self.nodes.get_mut(node_id).and_then(|n| n.pending.pop_front()) {
            // Failures are reported where they happen
            let _ = self.run_port(node_id, &port, update);
        }
    }

    /// Hold propagation until the delay passes, coalescing with a pending one
    fn defer(&mut self, firing: Firing, output: Option<Value>, delay: Duration) {
        let pending = self
            .nodes
            .get(&firing.node)
            .and_then(|node| node.deferred.get(&firing.port).copied())
            .filter(|timer| self.scheduler.contains(*timer));
        let node = firing.node.clone();
        let port = firing.port.clone();
        let task = Task::Deferred { firing, output };

        if let Some(timer) = pending {
            let holds_output = matches!(
                self.scheduler.task(timer),
                Some(Task::Deferred { output: Some(_), .. })
            );
            if matches!(task, Task::Deferred { output: None, .. }) && holds_output {
                tracing::trace!(node = %node, port = %port, "Keeping delayed output over a gated one");
                return;
            }
            tracing::trace!(node = %node, port = %port, "Coalescing delayed firing");
            self.scheduler.replace(timer, task);
            return;
        }
        let timer = self.scheduler.schedule(delay, None, task);
        if let Some(entry) = self.nodes.get_mut(&node) {
            entry.deferred.insert(port, timer);
        }
    }

    /// Propagate the first output, then run any remaining invocations
    fn complete(&mut self, mut firing: Firing, output: Option<Value>) {
        if let Some(value) = &output {
            self.propagate(&firing.node, &firing.port, value);
        }
        if !firing.chain(output.as_ref()) {
            return;
        }
        if firing.frame {
            self.scheduler.request_frame(Task::Resume(firing));
        } else {
            self.resume(firing);
        }
    }

    fn resume(&mut self, mut firing: Firing) {
        loop {
            firing.remaining -= 1;
            let Ok(output) = self.invoke(&firing.node, &firing.port, &firing.update()) else {
                return;
            };
            if let Some(value) = &output {
                self.propagate(&firing.node, &firing.port, value);
            }
            if !firing.chain(output.as_ref()) {
                return;
            }
            if firing.frame {
                self.scheduler.request_frame(Task::Resume(firing));
                return;
            }
        }
    }

    /// Push a port's output to sinks and to the ports wired to it
    pub(crate) fn propagate(&mut self, node_id: &NodeId, port: &str, value: &Value) {
        for sink in self.sinks.iter_mut().filter(|sink| sink.endpoint.is(node_id, port)) {
            (sink.callback)(value);
        }

        let Some(node) = self.nodes.get(node_id) else {
            return;
        };
        let mut targets = Vec::new();
        if node.props.forward {
            targets.extend(
                self.edges
                    .values()
                    .filter(|edge| edge.source.is(node_id, port))
                    .map(|edge| edge.target.clone()),
            );
        }
        if node.props.backward {
            targets.extend(
                self.edges
                    .values()
                    .filter(|edge| edge.target.is(node_id, port))
                    .map(|edge| edge.source.clone()),
            );
        }

        for target in targets {
            let update = PortUpdate::from_node(value.clone(), node_id.clone());
            if let Err(err) = self.run_port(&target.node, &target.port, update) {
                tracing::trace!(%target, %err, "Propagation branch aborted");
            }
        }
    }

    fn dispatch(&mut self, id: TimerId, task: Task) {
        match task {
            Task::Deferred { firing, output } => {
                let Some(node) = self.nodes.get_mut(&firing.node) else {
                    tracing::debug!(node = %firing.node, "Dropping delayed firing for removed node");
                    return;
                };
                node.deferred.remove(&firing.port);
                let node = firing.node.clone();
                self.complete(firing, output);
                self.drain_pending(&node);
            }
            Task::Resume(firing) => {
                if !self.contains_node(&firing.node) {
                    tracing::debug!(node = %firing.node, "Dropping frame step for removed node");
                    return;
                }
                let node = firing.node.clone();
                self.resume(firing);
                self.drain_pending(&node);
            }
            Task::Plugin(node) => {
                match self.with_plugin(&node, |plugin, ctx| plugin.on_timer(ctx, id)) {
                    Some(Ok(())) => {}
                    Some(Err(source)) => self.report(GraphError::Operator {
                        endpoint: Endpoint::default_port(node.clone()),
                        source,
                    }),
                    None => {
                        tracing::debug!(node = %node, timer = id.0, "Timer fired for unavailable node");
                        return;
                    }
                }
                self.drain_pending(&node);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GraphConfig;
    use crate::context::NodeContext;
    use crate::error::OperatorError;
    use crate::node::{Params, Plugin};
    use crate::plugins::{Enumerate, Function};
    use crate::port::{Port, DEFAULT_PORT};
    use std::cell::RefCell;
    use std::rc::Rc;

    type Log = Rc<RefCell<Vec<Value>>>;

    /// Records every value it receives
    struct Recorder {
        log: Log,
    }

    impl Plugin for Recorder {
        fn ports(&self) -> Vec<Port> {
            vec![Port::new(DEFAULT_PORT)]
        }

        fn operator(
            &mut self,
            _ctx: &mut NodeContext<'_>,
            _port: &str,
            update: &PortUpdate,
        ) -> std::result::Result<Option<Value>, OperatorError> {
            self.log.borrow_mut().push(update.data.clone());
            Ok(Some(update.data.clone()))
        }
    }

    fn props(entries: &[(&str, Value)]) -> Props {
        let params: Params = entries.iter().map(|(k, v)| ((*k).to_string(), v.clone())).collect();
        Props::from_params(&NodeId::new("test"), params).unwrap()
    }

    fn add_fn(
        graph: &mut Graph,
        id: &str,
        props: Props,
        f: impl Fn(&Value) -> std::result::Result<Option<Value>, OperatorError> + 'static,
    ) {
        graph.add_plugin(id, "Function", props, Box::new(Function::new(f))).unwrap();
    }

    fn add_recorder(graph: &mut Graph, id: &str) -> Log {
        let log = Log::default();
        graph
            .add_plugin(id, "Recorder", Props::default(), Box::new(Recorder { log: log.clone() }))
            .unwrap();
        log
    }

    fn wire(graph: &mut Graph, source: &str, target: &str) {
        graph
            .connect(Endpoint::parse(source).unwrap(), Endpoint::parse(target).unwrap())
            .unwrap();
    }

    fn add_one(x: &Value) -> std::result::Result<Option<Value>, OperatorError> {
        let n = x.as_f64().ok_or("expected a number")?;
        Ok(Some(Value::from(n + 1.0)))
    }

    #[test]
    fn test_forward_propagation() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", Props::default(), |x| {
            Ok(x.as_f64().map(|n| Value::from(n * 2.0)))
        });
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        let stored = graph.push("a", DEFAULT_PORT, 5).unwrap();
        assert_eq!(stored, Some(Value::from(10)));
        assert_eq!(*b.borrow(), vec![Value::from(10)]);
        assert_eq!(graph.value(&NodeId::new("b"), DEFAULT_PORT), Some(&Value::from(10)));
    }

    #[test]
    fn test_push_requires_running_graph() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", Props::default(), |x| Ok(Some(x.clone())));
        assert_eq!(graph.push("a", DEFAULT_PORT, 1), Err(GraphError::NotRunning));
    }

    #[test]
    fn test_undefined_output_gates_propagation() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", Props::default(), |_| Ok(None));
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        assert_eq!(graph.push("a", DEFAULT_PORT, 5).unwrap(), None);
        assert!(b.borrow().is_empty());
        assert_eq!(graph.value(&NodeId::new("a"), DEFAULT_PORT), None);
        assert_eq!(graph.value(&NodeId::new("b"), DEFAULT_PORT), None);
    }

    #[test]
    fn test_repeat_reuses_original_input() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", props(&[("repeat", Value::from(3))]), add_one);
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(*b.borrow(), vec![Value::from(2); 3]);
    }

    #[test]
    fn test_recursive_chains_outputs() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", props(&[("recursive", Value::from(3))]), add_one);
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(*b.borrow(), vec![Value::from(2), Value::from(3), Value::from(4)]);
        assert_eq!(graph.value(&NodeId::new("a"), DEFAULT_PORT), Some(&Value::from(4)));
    }

    #[test]
    fn test_recursive_stops_on_undefined_output() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", props(&[("recursive", Value::from(5))]), |x| {
            let n = x.as_f64().unwrap_or_default();
            Ok((n < 3.0).then(|| Value::from(n + 1.0)))
        });
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(*b.borrow(), vec![Value::from(2), Value::from(3)]);
    }

    #[test]
    fn test_frame_steps_recursive_iterations() {
        let mut graph = Graph::new("test");
        add_fn(
            &mut graph,
            "a",
            props(&[("recursive", Value::from(3)), ("frame", Value::from(true))]),
            add_one,
        );
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(*b.borrow(), vec![Value::from(2)]);
        assert_eq!(graph.frame(), 1);
        assert_eq!(*b.borrow(), vec![Value::from(2), Value::from(3)]);
        assert_eq!(graph.frame(), 1);
        assert_eq!(graph.frame(), 0);
        assert_eq!(*b.borrow(), vec![Value::from(2), Value::from(3), Value::from(4)]);
    }

    #[test]
    fn test_delay_coalesces_to_latest_value() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", props(&[("delay", Value::from(100))]), |x| Ok(Some(x.clone())));
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        graph.advance(Duration::from_millis(50));
        graph.push("a", DEFAULT_PORT, 2).unwrap();
        assert!(b.borrow().is_empty());
        assert_eq!(graph.value(&NodeId::new("a"), DEFAULT_PORT), Some(&Value::from(2)));

        assert_eq!(graph.advance(Duration::from_millis(49)), 0);
        assert!(b.borrow().is_empty());
        assert_eq!(graph.advance(Duration::from_millis(1)), 1);
        assert_eq!(*b.borrow(), vec![Value::from(2)]);

        graph.push("a", DEFAULT_PORT, 3).unwrap();
        graph.advance(Duration::from_millis(100));
        assert_eq!(*b.borrow(), vec![Value::from(2), Value::from(3)]);
    }

    #[test]
    fn test_backward_propagation() {
        let mut graph = Graph::new("test");
        let upstream = Log::default();
        graph
            .add_plugin(
                "up",
                "Recorder",
                props(&[("forward", Value::from(false))]),
                Box::new(Recorder { log: upstream.clone() }),
            )
            .unwrap();
        add_fn(&mut graph, "down", props(&[("backward", Value::from(true)), ("forward", Value::from(false))]), |x| {
            Ok(Some(x.clone()))
        });
        let sibling = add_recorder(&mut graph, "sibling");
        wire(&mut graph, "up", "down");
        wire(&mut graph, "down", "sibling");
        graph.start();

        graph.push("down", DEFAULT_PORT, 7).unwrap();
        assert_eq!(*upstream.borrow(), vec![Value::from(7)]);
        assert!(sibling.borrow().is_empty());
    }

    #[test]
    fn test_operator_error_is_isolated() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "x", Props::default(), |_| Err(OperatorError::new("boom")));
        let x_out = add_recorder(&mut graph, "x_out");
        add_fn(&mut graph, "y", Props::default(), add_one);
        let y_out = add_recorder(&mut graph, "y_out");
        wire(&mut graph, "x", "x_out");
        wire(&mut graph, "y", "y_out");
        graph.start();

        assert!(matches!(graph.push("x", DEFAULT_PORT, 1), Err(GraphError::Operator { .. })));
        graph.push("y", DEFAULT_PORT, 1).unwrap();

        assert!(x_out.borrow().is_empty());
        assert_eq!(*y_out.borrow(), vec![Value::from(2)]);
        let reports = graph.take_reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(&reports[0], GraphError::Operator { endpoint, .. } if endpoint.node.as_str() == "x"));
    }

    #[test]
    fn test_failing_branch_does_not_stop_siblings() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "src", Props::default(), |x| Ok(Some(x.clone())));
        add_fn(&mut graph, "bad", Props::default(), |_| Err(OperatorError::new("boom")));
        let good = add_recorder(&mut graph, "good");
        wire(&mut graph, "src", "bad");
        wire(&mut graph, "src", "good");
        graph.start();

        assert_eq!(graph.push("src", DEFAULT_PORT, 4).unwrap(), Some(Value::from(4)));
        assert_eq!(*good.borrow(), vec![Value::from(4)]);
        assert_eq!(graph.take_reports().len(), 1);
    }

    #[test]
    fn test_cycle_is_cut_at_depth_limit() {
        let mut graph = Graph::with_config(
            "test",
            GraphConfig {
                max_depth: 8,
                ..GraphConfig::default()
            },
        );
        add_fn(&mut graph, "a", Props::default(), add_one);
        add_fn(&mut graph, "b", Props::default(), add_one);
        wire(&mut graph, "a", "b");
        wire(&mut graph, "b", "a");
        graph.start();

        graph.push("a", DEFAULT_PORT, 0).unwrap();
        let reports = graph.take_reports();
        assert_eq!(reports.len(), 1);
        assert!(matches!(reports[0], GraphError::DepthExceeded { limit: 8, .. }));
        assert_eq!(graph.value(&NodeId::new("b"), DEFAULT_PORT), Some(&Value::from(8)));
    }

    #[test]
    fn test_schema_mismatch_is_advisory() {
        struct Typed;
        impl Plugin for Typed {
            fn ports(&self) -> Vec<Port> {
                vec![Port::new(DEFAULT_PORT).with_input(PortType::Number)]
            }
            fn operator(
                &mut self,
                _ctx: &mut NodeContext<'_>,
                _port: &str,
                update: &PortUpdate,
            ) -> std::result::Result<Option<Value>, OperatorError> {
                Ok(Some(update.data.clone()))
            }
        }

        let mut graph = Graph::new("test");
        graph.add_plugin("t", "Typed", Props::default(), Box::new(Typed)).unwrap();
        graph.start();

        assert_eq!(graph.push("t", DEFAULT_PORT, "text").unwrap(), Some(Value::from("text")));
        let reports = graph.take_reports();
        assert_eq!(reports.len(), 1);
        assert!(reports[0].is_warning());
    }

    #[test]
    fn test_reentrant_update_is_queued() {
        /// Feeds its own output port back into itself through an edge
        struct Echo {
            seen: Log,
        }
        impl Plugin for Echo {
            fn ports(&self) -> Vec<Port> {
                vec![Port::new(DEFAULT_PORT), Port::passthrough("out")]
            }
            fn operator(
                &mut self,
                ctx: &mut NodeContext<'_>,
                _port: &str,
                update: &PortUpdate,
            ) -> std::result::Result<Option<Value>, OperatorError> {
                self.seen.borrow_mut().push(update.data.clone());
                let n = update.data.as_f64().unwrap_or_default();
                if n < 2.0 {
                    ctx.run("out", Value::from(n + 1.0));
                }
                Ok(None)
            }
        }

        let seen = Log::default();
        let mut graph = Graph::new("test");
        graph
            .add_plugin("echo", "Echo", Props::default(), Box::new(Echo { seen: seen.clone() }))
            .unwrap();
        wire(&mut graph, "echo:out", "echo");
        graph.start();

        graph.push("echo", DEFAULT_PORT, 0).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(0), Value::from(1), Value::from(2)]);
        assert!(graph.take_reports().is_empty());
    }

    #[test]
    fn test_queued_update_follows_current_output() {
        /// Writes into its own port while running
        struct Bump;
        impl Plugin for Bump {
            fn ports(&self) -> Vec<Port> {
                vec![Port::new(DEFAULT_PORT)]
            }
            fn operator(
                &mut self,
                ctx: &mut NodeContext<'_>,
                _port: &str,
                update: &PortUpdate,
            ) -> std::result::Result<Option<Value>, OperatorError> {
                let n = update.data.as_f64().unwrap_or_default();
                if n < 10.0 {
                    ctx.run(DEFAULT_PORT, Value::from(n + 10.0));
                }
                Ok(Some(update.data.clone()))
            }
        }

        let mut graph = Graph::new("test");
        graph.add_plugin("a", "Bump", Props::default(), Box::new(Bump)).unwrap();
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 0).unwrap();
        assert_eq!(*b.borrow(), vec![Value::from(0), Value::from(10)]);
        assert_eq!(graph.value(&NodeId::new("a"), DEFAULT_PORT), Some(&Value::from(10)));
        assert_eq!(graph.value(&NodeId::new("b"), DEFAULT_PORT), Some(&Value::from(10)));
    }

    #[test]
    fn test_gated_trigger_keeps_delayed_output() {
        fn add_one_or_gate(x: &Value) -> std::result::Result<Option<Value>, OperatorError> {
            Ok(x.as_f64().map(|n| Value::from(n + 1.0)))
        }

        for (flag, expected) in [("recursive", [2, 3]), ("repeat", [2, 2])] {
            let mut graph = Graph::new("test");
            add_fn(
                &mut graph,
                "a",
                props(&[("delay", Value::from(100)), (flag, Value::from(2))]),
                add_one_or_gate,
            );
            let b = add_recorder(&mut graph, "b");
            wire(&mut graph, "a", "b");
            graph.start();

            graph.push("a", DEFAULT_PORT, 1).unwrap();
            assert_eq!(graph.push("a", DEFAULT_PORT, "skip").unwrap(), None);
            assert_eq!(graph.advance(Duration::from_millis(500)), 1);
            assert_eq!(*b.borrow(), expected.map(Value::from).to_vec(), "{flag}");
        }
    }

    #[test]
    fn test_remove_port_drops_frame_steps() {
        let mut graph = Graph::new("test");
        add_fn(
            &mut graph,
            "a",
            props(&[("recursive", Value::from(3)), ("frame", Value::from(true))]),
            add_one,
        );
        let b = add_recorder(&mut graph, "b");
        wire(&mut graph, "a", "b");
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(graph.pending_frames(), 1);

        let (_, dropped) = graph.remove_port(&NodeId::new("a"), DEFAULT_PORT).unwrap();
        assert_eq!(dropped.len(), 1);
        assert_eq!(graph.pending_frames(), 0);
        assert_eq!(graph.frame(), 0);
        assert_eq!(*b.borrow(), vec![Value::from(2)]);
        assert!(graph.take_reports().is_empty());
    }

    #[test]
    fn test_sink_observes_outputs() {
        let mut graph = Graph::new("test");
        add_fn(&mut graph, "a", props(&[("repeat", Value::from(2))]), add_one);
        let seen = Log::default();
        let sink = seen.clone();
        graph.add_sink(Endpoint::default_port("a"), move |value| sink.borrow_mut().push(value.clone()));
        graph.start();

        graph.push("a", DEFAULT_PORT, 1).unwrap();
        assert_eq!(*seen.borrow(), vec![Value::from(2), Value::from(2)]);
    }

    #[test]
    fn test_dynamic_ports_follow_object_shape() {
        let mut graph = Graph::new("test");
        graph
            .add_plugin("enum", "Enumerate", Props::default(), Box::new(Enumerate::default()))
            .unwrap();
        let seen = Rc::new(RefCell::new(Vec::new()));
        for key in ["a", "b", "c"] {
            let seen = seen.clone();
            graph.add_sink(Endpoint::new("enum", key), move |value| {
                seen.borrow_mut().push((key, value.clone()));
            });
        }
        graph.start();
        let id = NodeId::new("enum");

        graph
            .push("enum", DEFAULT_PORT, Value::object([("a", Value::from(1)), ("b", Value::from(2))]))
            .unwrap();
        seen.borrow_mut().clear();
        graph
            .push("enum", DEFAULT_PORT, Value::object([("a", Value::from(1)), ("c", Value::from(3))]))
            .unwrap();

        let node = graph.node(&id).unwrap();
        let dynamic: Vec<&str> = node.ports().filter(|p| p.dynamic).map(|p| p.name.as_str()).collect();
        assert_eq!(dynamic, vec!["a", "c"]);
        assert_eq!(node.port("c").unwrap().output_type, PortType::Number);
        assert_eq!(*seen.borrow(), vec![("a", Value::from(1)), ("c", Value::from(3))]);
        assert_eq!(graph.value(&id, "c"), Some(&Value::from(3)));
    }

    #[test]
    fn test_unchanged_shape_keeps_ports_and_edges() {
        let mut graph = Graph::new("test");
        graph
            .add_plugin("enum", "Enumerate", Props::default(), Box::new(Enumerate::default()))
            .unwrap();
        let out = add_recorder(&mut graph, "out");
        graph.start();

        graph.push("enum", DEFAULT_PORT, Value::object([("a", Value::from(1))])).unwrap();
        wire(&mut graph, "enum:a", "out");
        let edges_before: Vec<_> = graph.edges().map(|e| e.id).collect();

        graph.push("enum", DEFAULT_PORT, Value::object([("a", Value::from(5))])).unwrap();
        let edges_after: Vec<_> = graph.edges().map(|e| e.id).collect();
        assert_eq!(edges_before, edges_after);
        assert_eq!(*out.borrow(), vec![Value::from(5)]);
    }
}

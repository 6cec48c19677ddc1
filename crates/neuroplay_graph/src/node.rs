// SPDX-License-Identifier: MIT OR Apache-2.0
//! Node definitions and the plugin contract.

use crate::context::NodeContext;
use crate::error::{ConfigurationError, OperatorError};
use crate::port::{Port, PortUpdate};
use crate::scheduler::TimerId;
use crate::value::Value;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::fmt;
use std::time::Duration;

/// Free-form node configuration
pub type Params = IndexMap<String, Value>;

/// Unique identifier for a node within a graph
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub String);

impl NodeId {
    /// Create a node ID from a string key
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// The string key
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

/// Propagation flags and configuration of a node
#[derive(Debug, Clone, PartialEq)]
pub struct Props {
    /// Pass outputs to downstream ports
    pub forward: bool,
    /// Pass outputs to upstream ports
    pub backward: bool,
    /// Defer propagation by this long
    pub delay: Option<Duration>,
    /// Invoke the operator this many times on the same input
    pub repeat: Option<u32>,
    /// Invoke the operator this many times, feeding each output back in
    pub recursive: Option<u32>,
    /// Run repeat/recursive iterations on frame ticks
    pub frame: bool,
    /// Plugin-specific configuration
    pub params: Params,
}

impl Default for Props {
    fn default() -> Self {
        Self {
            forward: true,
            backward: false,
            delay: None,
            repeat: None,
            recursive: None,
            frame: false,
            params: Params::new(),
        }
    }
}

impl Props {
    /// Split propagation flags out of a node's params.
    ///
    /// Flag keys are removed from `params`; everything else stays and is
    /// kept as the plugin configuration. `false` disables a numeric flag.
    pub fn from_params(node: &NodeId, mut params: Params) -> Result<Self, ConfigurationError> {
        let mut props = Self::default();
        if let Some(value) = params.shift_remove("forward") {
            props.forward = flag(node, "forward", &value)?;
        }
        if let Some(value) = params.shift_remove("backward") {
            props.backward = flag(node, "backward", &value)?;
        }
        if let Some(value) = params.shift_remove("frame") {
            props.frame = flag(node, "frame", &value)?;
        }
        if let Some(value) = params.shift_remove("delay") {
            props.delay = count(node, "delay", &value)?.map(|ms| Duration::from_millis(u64::from(ms)));
        }
        if let Some(value) = params.shift_remove("repeat") {
            props.repeat = count(node, "repeat", &value)?;
        }
        if let Some(value) = params.shift_remove("recursive") {
            props.recursive = count(node, "recursive", &value)?;
        }
        props.params = params;
        Ok(props)
    }

    /// Number of operator invocations one trigger expands into
    pub fn invocations(&self) -> u32 {
        self.recursive.or(self.repeat).unwrap_or(1).max(1)
    }

    /// Numeric param with a fallback
    pub fn number(&self, key: &str, fallback: f64) -> f64 {
        self.params.get(key).and_then(Value::as_f64).unwrap_or(fallback)
    }

    /// String param
    pub fn string(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }
}

fn flag(node: &NodeId, key: &str, value: &Value) -> Result<bool, ConfigurationError> {
    value.as_bool().ok_or_else(|| ConfigurationError::InvalidParam {
        node: node.clone(),
        key: key.to_string(),
        reason: format!("expected boolean, got {}", value.kind()),
    })
}

fn count(node: &NodeId, key: &str, value: &Value) -> Result<Option<u32>, ConfigurationError> {
    match value {
        Value::Null | Value::Bool(false) => Ok(None),
        Value::Number(n) if *n >= 0.0 && n.fract() == 0.0 && *n <= f64::from(u32::MAX) => {
            // Range checked above
            #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
            let n = *n as u32;
            Ok((n > 0).then_some(n))
        }
        other => Err(ConfigurationError::InvalidParam {
            node: node.clone(),
            key: key.to_string(),
            reason: format!("expected a non-negative integer, got {other}"),
        }),
    }
}

/// Behaviour of a node.
///
/// Plugins never hold a reference to the graph. Every hook receives a
/// [`NodeContext`] that exposes the owning node and the graph operations a
/// node is allowed to perform.
pub trait Plugin {
    /// Ports declared at construction
    fn ports(&self) -> Vec<Port>;

    /// Called once after the node is registered and wired
    fn init(&mut self, _ctx: &mut NodeContext<'_>) -> Result<(), OperatorError> {
        Ok(())
    }

    /// Called once before the node is removed or the graph stops.
    /// Must cancel every timer the plugin registered.
    fn deinit(&mut self, _ctx: &mut NodeContext<'_>) {}

    /// Handle an update on one of the node's operator ports.
    ///
    /// `Ok(None)` leaves the port value untouched and stops propagation.
    fn operator(
        &mut self,
        ctx: &mut NodeContext<'_>,
        port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError>;

    /// Timer or frame callback registered through the context
    fn on_timer(&mut self, _ctx: &mut NodeContext<'_>, _timer: TimerId) -> Result<(), OperatorError> {
        Ok(())
    }
}

/// A node instance in the graph
pub struct Node {
    /// Unique instance ID
    pub(crate) id: NodeId,
    /// Registry name of the plugin
    pub(crate) plugin_type: String,
    /// Propagation flags and params
    pub props: Props,
    /// Ports by name
    pub(crate) ports: IndexMap<String, Port>,
    /// Checked out while one of its hooks runs
    pub(crate) plugin: Option<Box<dyn Plugin>>,
    /// Updates that arrived while the plugin was checked out
    pub(crate) pending: VecDeque<(String, PortUpdate)>,
    /// Pending delay timer per port
    pub(crate) deferred: HashMap<String, TimerId>,
    pub(crate) initialized: bool,
}

impl Node {
    /// Create a node around a plugin, registering its declared ports
    pub fn new(
        id: impl Into<NodeId>,
        plugin_type: impl Into<String>,
        props: Props,
        plugin: Box<dyn Plugin>,
    ) -> Result<Self, ConfigurationError> {
        let id = id.into();
        let mut ports = IndexMap::new();
        for port in plugin.ports() {
            if ports.contains_key(&port.name) {
                return Err(ConfigurationError::DuplicatePort {
                    node: id,
                    port: port.name,
                });
            }
            ports.insert(port.name.clone(), port);
        }
        Ok(Self {
            id,
            plugin_type: plugin_type.into(),
            props,
            ports,
            plugin: Some(plugin),
            pending: VecDeque::new(),
            deferred: HashMap::new(),
            initialized: false,
        })
    }

    /// Node ID
    pub fn id(&self) -> &NodeId {
        &self.id
    }

    /// Registry name of the plugin
    pub fn plugin_type(&self) -> &str {
        &self.plugin_type
    }

    /// Get a port by name
    pub fn port(&self, name: &str) -> Option<&Port> {
        self.ports.get(name)
    }

    /// Get all ports in declaration order
    pub fn ports(&self) -> impl Iterator<Item = &Port> {
        self.ports.values()
    }

    /// Port names in declaration order
    pub fn port_names(&self) -> impl Iterator<Item = &str> {
        self.ports.keys().map(String::as_str)
    }

    /// Current value of a port
    pub fn value(&self, port: &str) -> Option<&Value> {
        self.ports.get(port).and_then(|p| p.value.as_ref())
    }

    /// Whether `init` has run since the graph started
    pub fn is_initialized(&self) -> bool {
        self.initialized
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("id", &self.id)
            .field("plugin_type", &self.plugin_type)
            .field("props", &self.props)
            .field("ports", &self.ports.keys().collect::<Vec<_>>())
            .field("initialized", &self.initialized)
            .finish_non_exhaustive()
    }
}

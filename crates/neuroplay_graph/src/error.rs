// SPDX-License-Identifier: MIT OR Apache-2.0
//! Error types for graph construction and propagation.

use crate::edge::Endpoint;
use crate::node::NodeId;
use crate::port::PortType;

/// Error in the declared structure of a graph
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ConfigurationError {
    /// A node ID is already registered
    #[error("Duplicate node id: {0}")]
    DuplicateNode(NodeId),

    /// The registry has no plugin with this name
    #[error("Unknown plugin `{class}` for node {node}")]
    UnknownPlugin {
        /// Node being created
        node: NodeId,
        /// Requested plugin name
        class: String,
    },

    /// Node not found
    #[error("Node not found: {0}")]
    NodeNotFound(NodeId),

    /// Port not found
    #[error("Port not found: {0}")]
    PortNotFound(Endpoint),

    /// A port name is already used on the node
    #[error("Duplicate port `{port}` on node {node}")]
    DuplicatePort {
        /// Owning node
        node: NodeId,
        /// Port name
        port: String,
    },

    /// An edge endpoint string could not be parsed
    #[error("Invalid endpoint: {0:?}")]
    InvalidEndpoint(String),

    /// The exact same edge is already wired
    #[error("Edge already exists: {0} -> {1}")]
    DuplicateEdge(Endpoint, Endpoint),

    /// The plugin factory rejected the node's params
    #[error("Cannot construct plugin `{class}` for node {node}: {reason}")]
    PluginConstruction {
        /// Node being created
        node: NodeId,
        /// Plugin name
        class: String,
        /// Factory failure
        reason: String,
    },

    /// A node param has the wrong shape
    #[error("Invalid param `{key}` on node {node}: {reason}")]
    InvalidParam {
        /// Node being created
        node: NodeId,
        /// Param key
        key: String,
        /// What was wrong
        reason: String,
    },
}

/// Failure raised by a plugin hook
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
#[error("{message}")]
pub struct OperatorError {
    /// Description of the failure
    pub message: String,
}

impl OperatorError {
    /// Create an operator error
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

impl From<String> for OperatorError {
    fn from(message: String) -> Self {
        Self { message }
    }
}

impl From<&str> for OperatorError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<ConfigurationError> for OperatorError {
    fn from(err: ConfigurationError) -> Self {
        Self::new(err.to_string())
    }
}

/// Error raised while the graph runs
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum GraphError {
    /// Structural problem
    #[error(transparent)]
    Configuration(#[from] ConfigurationError),

    /// A port handler failed; its propagation branch was aborted
    #[error("Operator failed on {endpoint}: {source}")]
    Operator {
        /// Port being updated
        endpoint: Endpoint,
        /// Plugin failure
        #[source]
        source: OperatorError,
    },

    /// A plugin failed to initialise
    #[error("Init failed on node {node}: {source}")]
    Lifecycle {
        /// Node being initialised
        node: NodeId,
        /// Plugin failure
        #[source]
        source: OperatorError,
    },

    /// Data did not match the port's type descriptor (advisory)
    #[error("Schema mismatch on {endpoint}: expected {expected}, got {found}")]
    SchemaMismatch {
        /// Port receiving the data
        endpoint: Endpoint,
        /// Declared descriptor
        expected: PortType,
        /// Descriptor inferred from the data
        found: PortType,
    },

    /// Propagation nested deeper than the configured limit
    #[error("Propagation depth limit ({limit}) exceeded at {endpoint}")]
    DepthExceeded {
        /// Port that would have been updated
        endpoint: Endpoint,
        /// Configured limit
        limit: usize,
    },

    /// Data was pushed into a stopped graph
    #[error("Graph is not running")]
    NotRunning,
}

impl GraphError {
    /// Warnings are reported but never abort propagation
    pub fn is_warning(&self) -> bool {
        matches!(self, Self::SchemaMismatch { .. })
    }
}

/// Result type for graph operations
pub type Result<T> = std::result::Result<T, GraphError>;

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Edge definitions for the graph.

use crate::error::ConfigurationError;
use crate::node::NodeId;
use crate::port::DEFAULT_PORT;
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Unique identifier for an edge
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct EdgeId(pub Uuid);

impl EdgeId {
    /// Create a new random edge ID
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for EdgeId {
    fn default() -> Self {
        Self::new()
    }
}

/// A `(node, port)` pair
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Endpoint {
    /// Node ID
    pub node: NodeId,
    /// Port name
    pub port: String,
}

impl Endpoint {
    /// Create an endpoint
    pub fn new(node: impl Into<NodeId>, port: impl Into<String>) -> Self {
        Self {
            node: node.into(),
            port: port.into(),
        }
    }

    /// Endpoint on a node's default port
    pub fn default_port(node: impl Into<NodeId>) -> Self {
        Self::new(node, DEFAULT_PORT)
    }

    /// Parse `"node"` or `"node:port"`
    pub fn parse(text: &str) -> Result<Self, ConfigurationError> {
        let (node, port) = match text.split_once(':') {
            Some((node, port)) => (node.trim(), port.trim()),
            None => (text.trim(), DEFAULT_PORT),
        };
        if node.is_empty() || port.is_empty() || port.contains(':') {
            return Err(ConfigurationError::InvalidEndpoint(text.to_string()));
        }
        Ok(Self::new(node, port))
    }

    /// Check if this endpoint is the given node and port
    pub fn is(&self, node: &NodeId, port: &str) -> bool {
        self.node == *node && self.port == port
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.node, self.port)
    }
}

/// A directed wiring from one port to another
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Edge {
    /// Unique edge ID
    pub id: EdgeId,
    /// Port whose outputs feed the edge
    pub source: Endpoint,
    /// Port that receives them
    pub target: Endpoint,
}

impl Edge {
    /// Create a new edge
    pub fn new(source: Endpoint, target: Endpoint) -> Self {
        Self {
            id: EdgeId::new(),
            source,
            target,
        }
    }

    /// Check if this edge involves a specific node
    pub fn involves_node(&self, node: &NodeId) -> bool {
        self.source.node == *node || self.target.node == *node
    }

    /// Check if this edge involves a specific port
    pub fn involves_port(&self, node: &NodeId, port: &str) -> bool {
        self.source.is(node, port) || self.target.is(node, port)
    }
}

impl fmt::Display for Edge {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} -> {}", self.source, self.target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_parsing() {
        assert_eq!(Endpoint::parse("heg").unwrap(), Endpoint::new("heg", "default"));
        assert_eq!(Endpoint::parse("heg:ratio").unwrap(), Endpoint::new("heg", "ratio"));
        assert!(Endpoint::parse("").is_err());
        assert!(Endpoint::parse("heg:").is_err());
        assert!(Endpoint::parse(":ratio").is_err());
        assert!(Endpoint::parse("a:b:c").is_err());
    }

    #[test]
    fn test_involvement() {
        let edge = Edge::new(Endpoint::new("a", "out"), Endpoint::default_port("b"));
        assert!(edge.involves_node(&NodeId::new("a")));
        assert!(edge.involves_port(&NodeId::new("b"), DEFAULT_PORT));
        assert!(!edge.involves_port(&NodeId::new("a"), DEFAULT_PORT));
        assert_eq!(edge.to_string(), "a:out -> b:default");
    }
}

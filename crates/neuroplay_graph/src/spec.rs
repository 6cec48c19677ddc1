// SPDX-License-Identifier: MIT OR Apache-2.0
//! Declarative graph descriptions and building graphs from them.

use crate::config::GraphConfig;
use crate::edge::Endpoint;
use crate::error::{ConfigurationError, GraphError};
use crate::graph::Graph;
use crate::node::{NodeId, Params, Props};
use crate::registry::PluginRegistry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// A node in a graph description
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    /// Unique node ID
    pub id: NodeId,
    /// Registered plugin name
    pub class: String,
    /// Propagation flags and plugin params
    #[serde(default)]
    pub params: Params,
}

/// An edge in a graph description, as `node` or `node:port` strings
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EdgeSpec {
    /// Source endpoint
    pub source: String,
    /// Target endpoint
    pub target: String,
}

/// Declarative description of a graph
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct GraphSpec {
    /// Graph name
    #[serde(default)]
    pub name: Option<String>,
    /// Nodes, created in order
    #[serde(default)]
    pub nodes: Vec<NodeSpec>,
    /// Edges, wired in order after all nodes exist
    #[serde(default)]
    pub edges: Vec<EdgeSpec>,
}

/// Failure to read a graph description
#[derive(Debug, thiserror::Error)]
pub enum LoadError {
    /// File could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// RON syntax or shape error
    #[error("Invalid RON: {0}")]
    Ron(#[from] ron::error::SpannedError),

    /// JSON syntax or shape error
    #[error("Invalid JSON: {0}")]
    Json(#[from] serde_json::Error),

    /// Extension is neither `.ron` nor `.json`
    #[error("Unsupported graph file: {0}")]
    UnsupportedFormat(PathBuf),
}

impl GraphSpec {
    /// Parse a RON description
    pub fn from_ron(s: &str) -> Result<Self, LoadError> {
        Ok(ron::from_str(s)?)
    }

    /// Parse a JSON description
    pub fn from_json(s: &str) -> Result<Self, LoadError> {
        Ok(serde_json::from_str(s)?)
    }

    /// Load a description, choosing the format by file extension
    pub fn load(path: &Path) -> Result<Self, LoadError> {
        let content = std::fs::read_to_string(path).map_err(|source| LoadError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        match path.extension().and_then(|ext| ext.to_str()) {
            Some("ron") => Self::from_ron(&content),
            Some("json") => Self::from_json(&content),
            _ => Err(LoadError::UnsupportedFormat(path.to_path_buf())),
        }
    }

    /// Serialize to RON format
    pub fn to_ron(&self) -> Result<String, ron::Error> {
        let config = ron::ser::PrettyConfig::default().struct_names(false);
        ron::ser::to_string_pretty(self, config)
    }
}

impl Graph {
    /// Build a stopped graph from a description.
    ///
    /// A bad node or edge is skipped and its error collected; everything
    /// else is still built. Edges touching a skipped node fail with
    /// `NodeNotFound`.
    pub fn build(
        spec: &GraphSpec,
        registry: &PluginRegistry,
        config: GraphConfig,
    ) -> (Graph, Vec<ConfigurationError>) {
        let name = spec.name.clone().unwrap_or_else(|| "graph".to_string());
        let mut graph = Graph::with_config(name, config);
        let mut errors = Vec::new();

        for node in &spec.nodes {
            if let Err(err) = graph.add_spec_node(node, registry) {
                errors.push(err);
            }
        }
        for edge in &spec.edges {
            let wired = Endpoint::parse(&edge.source)
                .and_then(|source| Ok((source, Endpoint::parse(&edge.target)?)))
                .and_then(|(source, target)| graph.connect(source, target));
            if let Err(err) = wired {
                errors.push(err);
            }
        }

        for err in &errors {
            graph.report(GraphError::Configuration(err.clone()));
        }
        tracing::info!(
            graph = %graph.name,
            nodes = graph.node_count(),
            edges = graph.edge_count(),
            errors = errors.len(),
            "Built graph"
        );
        (graph, errors)
    }

    fn add_spec_node(&mut self, spec: &NodeSpec, registry: &PluginRegistry) -> Result<NodeId, ConfigurationError> {
        if self.contains_node(&spec.id) {
            return Err(ConfigurationError::DuplicateNode(spec.id.clone()));
        }
        let props = Props::from_params(&spec.id, spec.params.clone())?;
        let plugin = registry
            .create(&spec.class, &props.params)
            .ok_or_else(|| ConfigurationError::UnknownPlugin {
                node: spec.id.clone(),
                class: spec.class.clone(),
            })?
            .map_err(|err| ConfigurationError::PluginConstruction {
                node: spec.id.clone(),
                class: spec.class.clone(),
                reason: err.message,
            })?;
        self.add_plugin(spec.id.clone(), spec.class.clone(), props, plugin)
    }
}

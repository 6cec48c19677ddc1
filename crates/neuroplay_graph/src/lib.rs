// SPDX-License-Identifier: MIT OR Apache-2.0
//! Reactive dataflow graph engine for `NeuroPlay`.
//!
//! Nodes wrap plugins and expose named ports. Writing data into a port runs
//! the port's handler, stores the result and pushes it along the edges
//! wired to that port, transitively.
//!
//! ## Architecture
//!
//! - [`Graph`] owns every node and edge; plugins reach it only through the
//!   [`NodeContext`] passed into their hooks
//! - [`Props`] flags shape propagation (`forward`, `backward`, `delay`,
//!   `repeat`, `recursive`, `frame`)
//! - Time is a virtual clock driven by the host with [`Graph::advance`] and
//!   [`Graph::frame`]
//! - [`PluginRegistry`] maps plugin names to factories, and
//!   [`Graph::build`] assembles graphs from a [`GraphSpec`]

pub mod config;
pub mod context;
pub mod edge;
pub mod error;
pub mod graph;
pub mod node;
pub mod plugins;
pub mod port;
mod propagation;
pub mod registry;
pub mod scheduler;
pub mod spec;
pub mod value;

pub use config::GraphConfig;
pub use context::NodeContext;
pub use edge::{Edge, EdgeId, Endpoint};
pub use error::{ConfigurationError, GraphError, OperatorError, Result};
pub use graph::{Graph, GraphState};
pub use node::{Node, NodeId, Params, Plugin, Props};
pub use port::{Port, PortHandler, PortType, PortUpdate, DEFAULT_PORT};
pub use registry::{PluginFactory, PluginInfo, PluginManifest, PluginRegistry};
pub use scheduler::TimerId;
pub use spec::{EdgeSpec, GraphSpec, LoadError, NodeSpec};
pub use value::Value;

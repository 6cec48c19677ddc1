// SPDX-License-Identifier: MIT OR Apache-2.0
//! Port definitions for node inputs/outputs.

use crate::node::NodeId;
use crate::value::Value;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of the port every plugin is expected to expose
pub const DEFAULT_PORT: &str = "default";

/// Type descriptor attached to a port.
///
/// Descriptors are hints for validation and UI. A mismatch between a
/// descriptor and the data a port receives is reported, never enforced.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
pub enum PortType {
    /// Untyped (`null` in manifests)
    #[default]
    Any,
    /// Numeric value
    Number,
    /// Boolean value
    Boolean,
    /// String value
    String,
    /// Keyed record
    Object,
    /// Sequence
    Array,
    /// Rendered display element
    Element,
    /// Color string
    Color,
    /// Shader source
    Glsl,
    /// File reference
    File,
    /// Any other manifest tag
    Custom(String),
}

impl PortType {
    /// Parse a manifest type tag
    pub fn from_tag(tag: Option<&str>) -> Self {
        let Some(tag) = tag.map(str::trim) else {
            return Self::Any;
        };
        match tag {
            "" => Self::Any,
            "number" | "int" => Self::Number,
            "boolean" => Self::Boolean,
            "string" => Self::String,
            "object" => Self::Object,
            "array" => Self::Array,
            "Element" => Self::Element,
            "color" => Self::Color,
            "GLSL" => Self::Glsl,
            "file" => Self::File,
            other => Self::Custom(other.to_string()),
        }
    }

    /// Manifest tag for this descriptor (`None` for untyped)
    pub fn tag(&self) -> Option<&str> {
        match self {
            Self::Any => None,
            Self::Number => Some("number"),
            Self::Boolean => Some("boolean"),
            Self::String => Some("string"),
            Self::Object => Some("object"),
            Self::Array => Some("array"),
            Self::Element => Some("Element"),
            Self::Color => Some("color"),
            Self::Glsl => Some("GLSL"),
            Self::File => Some("file"),
            Self::Custom(tag) => Some(tag),
        }
    }

    /// Infer a descriptor from the runtime shape of a value
    pub fn of_value(value: &Value) -> Self {
        match value {
            Value::Null => Self::Any,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Check whether a value matches this descriptor.
    ///
    /// Descriptors without a structural counterpart (elements, shaders,
    /// custom tags) accept anything.
    pub fn accepts(&self, value: &Value) -> bool {
        if value.is_null() {
            return true;
        }
        match self {
            Self::Number => matches!(value, Value::Number(_)),
            Self::Boolean => matches!(value, Value::Bool(_)),
            Self::String | Self::Color | Self::Glsl | Self::File => {
                matches!(value, Value::String(_))
            }
            Self::Object => matches!(value, Value::Object(_)),
            Self::Array => matches!(value, Value::Array(_)),
            Self::Any | Self::Element | Self::Custom(_) => true,
        }
    }
}

impl fmt::Display for PortType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.tag().unwrap_or("any"))
    }
}

/// How a port turns an incoming update into its stored value
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PortHandler {
    /// Dispatch to the owning node's plugin operator
    Operator,
    /// Store and forward the incoming data unchanged
    Passthrough,
}

/// Context handed to a port handler
#[derive(Debug, Clone, PartialEq)]
pub struct PortUpdate {
    /// Incoming data
    pub data: Value,
    /// Node the data came from (`None` for external writes)
    pub origin: Option<NodeId>,
}

impl PortUpdate {
    /// An update written from outside the graph
    pub fn external(data: Value) -> Self {
        Self { data, origin: None }
    }

    /// An update propagated from another node
    pub fn from_node(data: Value, origin: NodeId) -> Self {
        Self {
            data,
            origin: Some(origin),
        }
    }
}

/// A port on a node
#[derive(Debug, Clone)]
pub struct Port {
    /// Port name, unique within its node
    pub name: String,
    /// Whether the value may be edited from a UI
    pub editable: bool,
    /// Whether the port is shown in a UI
    pub visible: bool,
    /// Descriptor for incoming data
    pub input_type: PortType,
    /// Descriptor for produced data
    pub output_type: PortType,
    /// Most recent defined update result
    pub value: Option<Value>,
    /// Update behaviour
    pub handler: PortHandler,
    /// Created at runtime by node logic rather than declared by the plugin
    pub dynamic: bool,
}

impl Port {
    /// Create an operator-dispatched port
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            editable: false,
            visible: true,
            input_type: PortType::Any,
            output_type: PortType::Any,
            value: None,
            handler: PortHandler::Operator,
            dynamic: false,
        }
    }

    /// Create a port that forwards whatever it receives
    pub fn passthrough(name: impl Into<String>) -> Self {
        Self {
            handler: PortHandler::Passthrough,
            ..Self::new(name)
        }
    }

    /// Set the input descriptor
    pub fn with_input(mut self, port_type: PortType) -> Self {
        self.input_type = port_type;
        self
    }

    /// Set the output descriptor
    pub fn with_output(mut self, port_type: PortType) -> Self {
        self.output_type = port_type;
        self
    }

    /// Set the initial value
    pub fn with_value(mut self, value: Value) -> Self {
        self.value = Some(value);
        self
    }

    /// Mark as editable
    pub fn editable(mut self) -> Self {
        self.editable = true;
        self
    }

    /// Hide from UIs
    pub fn hidden(mut self) -> Self {
        self.visible = false;
        self
    }

    /// Mark as created at runtime
    pub fn dynamic(mut self) -> Self {
        self.dynamic = true;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tag_parsing() {
        assert_eq!(PortType::from_tag(None), PortType::Any);
        assert_eq!(PortType::from_tag(Some("number")), PortType::Number);
        assert_eq!(PortType::from_tag(Some("int")), PortType::Number);
        assert_eq!(PortType::from_tag(Some("Element ")), PortType::Element);
        assert_eq!(PortType::from_tag(Some("GLSL")), PortType::Glsl);
        assert_eq!(
            PortType::from_tag(Some("coherence")),
            PortType::Custom("coherence".to_string())
        );
    }

    #[test]
    fn test_inference_and_acceptance() {
        assert_eq!(PortType::of_value(&Value::from(2.0)), PortType::Number);
        assert_eq!(PortType::of_value(&Value::object([("a", Value::Null)])), PortType::Object);

        assert!(PortType::Number.accepts(&Value::from(1)));
        assert!(!PortType::Number.accepts(&Value::from("1")));
        assert!(PortType::Color.accepts(&Value::from("#228B22")));
        assert!(PortType::Element.accepts(&Value::from(3)));
        assert!(PortType::Boolean.accepts(&Value::Null));
    }

    #[test]
    fn test_port_builders() {
        let port = Port::passthrough("alpha").with_output(PortType::Number).dynamic();
        assert_eq!(port.handler, PortHandler::Passthrough);
        assert!(port.dynamic);
        assert!(port.value.is_none());

        let port = Port::new(DEFAULT_PORT).editable().hidden();
        assert_eq!(port.handler, PortHandler::Operator);
        assert!(port.editable);
        assert!(!port.visible);
    }
}

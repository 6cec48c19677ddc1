// SPDX-License-Identifier: MIT OR Apache-2.0
//! Splits an object into one output port per key.

use crate::context::NodeContext;
use crate::error::OperatorError;
use crate::node::Plugin;
use crate::port::{Port, PortType, PortUpdate, DEFAULT_PORT};
use crate::value::Value;

/// Exposes each key of the incoming object as its own port.
///
/// When the key list changes, ports for vanished keys are removed (with
/// their edges) and ports for new keys are created. Every key's value is
/// then pushed through its port, whether or not the shape changed.
#[derive(Debug, Default)]
pub struct Enumerate {
    keys: Vec<String>,
}

impl Enumerate {
    /// Keys seen on the last object
    pub fn keys(&self) -> &[String] {
        &self.keys
    }

    fn reshape(&mut self, ctx: &mut NodeContext<'_>, object: &[(&String, &Value)]) -> Result<(), OperatorError> {
        let keys: Vec<String> = object
            .iter()
            .map(|(key, _)| (*key).clone())
            .filter(|key| key != DEFAULT_PORT)
            .collect();
        if keys == self.keys {
            return Ok(());
        }

        for stale in self.keys.iter().filter(|key| !keys.contains(key)) {
            match ctx.remove_port(stale) {
                Ok(dropped) => {
                    tracing::debug!(node = %ctx.id(), port = %stale, edges = dropped.len(), "Removed key port");
                }
                Err(err) => tracing::debug!(node = %ctx.id(), %err, "Key port already gone"),
            }
        }
        for (key, value) in object {
            if key.as_str() == DEFAULT_PORT || ctx.has_port(key) {
                continue;
            }
            let port = Port::passthrough(key.as_str())
                .with_output(PortType::of_value(value))
                .dynamic();
            ctx.add_port(port)?;
        }
        self.keys = keys;
        Ok(())
    }
}

impl Plugin for Enumerate {
    fn ports(&self) -> Vec<Port> {
        vec![Port::new(DEFAULT_PORT).with_input(PortType::Object)]
    }

    fn operator(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        let Some(object) = update.data.as_object() else {
            return Ok(None);
        };
        let entries: Vec<(&String, &Value)> = object.iter().collect();
        self.reshape(ctx, &entries)?;

        for (key, value) in entries {
            if key != DEFAULT_PORT {
                ctx.run(key, value.clone());
            }
        }
        Ok(None)
    }
}

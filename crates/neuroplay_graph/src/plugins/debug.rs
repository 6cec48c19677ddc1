// SPDX-License-Identifier: MIT OR Apache-2.0
//! Logs whatever reaches it.

use crate::context::NodeContext;
use crate::error::OperatorError;
use crate::node::Plugin;
use crate::port::{Port, PortUpdate, DEFAULT_PORT};
use crate::value::Value;

/// Terminal plugin that logs each update at info level and gates it
#[derive(Debug, Clone, Copy, Default)]
pub struct DebugLog;

impl Plugin for DebugLog {
    fn ports(&self) -> Vec<Port> {
        vec![Port::new(DEFAULT_PORT)]
    }

    fn operator(
        &mut self,
        ctx: &mut NodeContext<'_>,
        _port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        match &update.origin {
            Some(origin) => tracing::info!(node = %ctx.id(), from = %origin, "{}", update.data),
            None => tracing::info!(node = %ctx.id(), "{}", update.data),
        }
        Ok(None)
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Closure-backed plugin for graphs assembled in code.

use crate::context::NodeContext;
use crate::error::OperatorError;
use crate::node::Plugin;
use crate::port::{Port, PortUpdate, DEFAULT_PORT};
use crate::value::Value;
use std::fmt;

type Operator = Box<dyn Fn(&Value) -> Result<Option<Value>, OperatorError>>;

/// Plugin whose default port runs a closure.
///
/// Returning `Ok(None)` gates the update.
pub struct Function {
    operator: Operator,
}

impl Function {
    /// Wrap a closure
    pub fn new(operator: impl Fn(&Value) -> Result<Option<Value>, OperatorError> + 'static) -> Self {
        Self {
            operator: Box::new(operator),
        }
    }
}

impl Plugin for Function {
    fn ports(&self) -> Vec<Port> {
        vec![Port::new(DEFAULT_PORT)]
    }

    fn operator(
        &mut self,
        _ctx: &mut NodeContext<'_>,
        _port: &str,
        update: &PortUpdate,
    ) -> Result<Option<Value>, OperatorError> {
        (self.operator)(&update.data)
    }
}

impl fmt::Debug for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Function").finish_non_exhaustive()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Engine configuration.

use serde::{Deserialize, Serialize};

/// Default limit on nested propagation
pub const DEFAULT_MAX_DEPTH: usize = 256;

/// Default number of reports kept before the oldest are discarded
pub const DEFAULT_REPORT_CAPACITY: usize = 1024;

/// Tunables for a [`crate::Graph`]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphConfig {
    /// Maximum nesting of port updates within one propagation chain.
    /// Cyclic wiring is aborted with a `DepthExceeded` report at this depth.
    pub max_depth: usize,
    /// Reports kept until the host drains them
    pub report_capacity: usize,
    /// Report data that does not match a port's type descriptor
    pub warn_on_schema_mismatch: bool,
}

impl Default for GraphConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
            report_capacity: DEFAULT_REPORT_CAPACITY,
            warn_on_schema_mismatch: true,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_partial_ron_uses_defaults() {
        let config: GraphConfig = ron::from_str("(max_depth: 16)").unwrap();
        assert_eq!(config.max_depth, 16);
        assert_eq!(config.report_capacity, DEFAULT_REPORT_CAPACITY);
        assert!(config.warn_on_schema_mismatch);
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Built-in plugins.

mod data;
mod debug;
mod enumerate;
mod function;
mod transforms;

pub use data::{NumberSource, Sine};
pub use debug::DebugLog;
pub use enumerate::Enumerate;
pub use function::Function;
pub use transforms::{Arithmetic, Buffer, Index, Threshold};

use crate::node::Plugin;
use crate::registry::{PluginInfo, PluginRegistry};

fn boxed<P: Plugin + 'static>(plugin: P) -> Box<dyn Plugin> {
    Box::new(plugin)
}

/// Create a registry holding every built-in plugin
pub fn builtin_registry() -> PluginRegistry {
    let mut registry = PluginRegistry::new();

    // Data sources
    registry.register(
        PluginInfo::new("Number", "data").with_types([Some("number")]),
        |params| Ok(boxed(NumberSource::from_params(params))),
    );
    registry.register(
        PluginInfo::new("Sine", "data").with_types([None, Some("number"), Some("number")]),
        |params| Ok(boxed(Sine::from_params(params)?)),
    );

    // Transforms
    registry.register(
        PluginInfo::new("Enumerate", "transforms").with_types([None::<&str>, None]),
        |_| Ok(boxed(Enumerate::default())),
    );
    registry.register(
        PluginInfo::new("Arithmetic", "transforms").with_types([Some("number"), None]),
        |params| Ok(boxed(Arithmetic::from_params(params)?)),
    );
    registry.register(
        PluginInfo::new("Threshold", "transforms").with_types([Some("number"), Some("boolean"), None]),
        |params| Ok(boxed(Threshold::from_params(params)?)),
    );
    registry.register(
        PluginInfo::new("Buffer", "transforms").with_types([None, Some("number")]),
        |params| Ok(boxed(Buffer::from_params(params)?)),
    );
    registry.register(
        PluginInfo::new("Index", "transforms").with_types([None, Some("string")]),
        |params| Ok(boxed(Index::from_params(params)?)),
    );

    // Debug
    registry.register(
        PluginInfo::new("Debug", "debug").with_types([None::<&str>]),
        |_| Ok(boxed(DebugLog)),
    );

    registry
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::Params;

    #[test]
    fn test_builtin_registry() {
        let registry = builtin_registry();
        assert_eq!(registry.len(), 8);
        assert_eq!(registry.in_category("transforms").count(), 5);
        for info in registry.infos() {
            assert!(registry.create(&info.name, &Params::new()).unwrap().is_ok(), "{}", info.name);
        }
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Registry of plugin factories and their manifest metadata.

use crate::error::OperatorError;
use crate::node::{Params, Plugin};
use crate::port::PortType;
use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::rc::Rc;

/// Builds a plugin from a node's params
pub type PluginFactory = Rc<dyn Fn(&Params) -> Result<Box<dyn Plugin>, OperatorError>>;

/// Manifest entry describing a plugin
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PluginInfo {
    /// Plugin name
    #[serde(default)]
    pub name: String,
    /// Type tag of each declared port, in declaration order
    #[serde(default)]
    pub types: Vec<Option<String>>,
    /// Category for grouping in UIs
    #[serde(default)]
    pub category: String,
    /// Hidden from plugin pickers
    #[serde(default)]
    pub hidden: Option<bool>,
    /// Where the plugin's source lives
    #[serde(default, alias = "folderUrl")]
    pub location: String,
}

impl PluginInfo {
    /// Create an entry
    pub fn new(name: impl Into<String>, category: impl Into<String>) -> Self {
        let name = name.into();
        let category = category.into();
        Self {
            location: format!("plugins/{category}/{name}"),
            name,
            types: Vec::new(),
            category,
            hidden: None,
        }
    }

    /// Set the per-port type tags
    pub fn with_types<I, T>(mut self, types: I) -> Self
    where
        I: IntoIterator<Item = Option<T>>,
        T: Into<String>,
    {
        self.types = types.into_iter().map(|t| t.map(Into::into)).collect();
        self
    }

    /// Mark as hidden
    pub fn hidden(mut self) -> Self {
        self.hidden = Some(true);
        self
    }

    /// Whether the entry should be offered in pickers
    pub fn is_visible(&self) -> bool {
        !self.hidden.unwrap_or(false)
    }

    /// Parsed port type descriptors
    pub fn port_types(&self) -> Vec<PortType> {
        self.types.iter().map(|t| PortType::from_tag(t.as_deref())).collect()
    }
}

/// Manifest mapping plugin names to metadata
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct PluginManifest {
    /// Entries by key
    pub entries: IndexMap<String, PluginInfo>,
}

impl PluginManifest {
    /// Parse a JSON manifest (`{"Name": {name, types, category, hidden, folderUrl}}`)
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }
}

struct RegistryEntry {
    info: PluginInfo,
    factory: PluginFactory,
}

/// Registry of available plugins
pub struct PluginRegistry {
    /// Registered plugins by name
    entries: IndexMap<String, RegistryEntry>,
}

impl PluginRegistry {
    /// Create a new empty registry
    pub fn new() -> Self {
        Self {
            entries: IndexMap::new(),
        }
    }

    /// Register a plugin factory. Replaces an entry with the same name.
    pub fn register(
        &mut self,
        info: PluginInfo,
        factory: impl Fn(&Params) -> Result<Box<dyn Plugin>, OperatorError> + 'static,
    ) {
        self.entries.insert(
            info.name.clone(),
            RegistryEntry {
                info,
                factory: Rc::new(factory),
            },
        );
    }

    /// Overlay manifest metadata onto registered factories.
    ///
    /// Returns the names of manifest entries that have no factory; those
    /// plugins cannot be instantiated.
    pub fn apply_manifest(&mut self, manifest: &PluginManifest) -> Vec<String> {
        let mut missing = Vec::new();
        for (key, info) in &manifest.entries {
            let name = if info.name.is_empty() { key } else { &info.name };
            match self.entries.get_mut(name) {
                Some(entry) => {
                    entry.info = PluginInfo {
                        name: name.clone(),
                        ..info.clone()
                    };
                }
                None => missing.push(name.clone()),
            }
        }
        if !missing.is_empty() {
            tracing::debug!(count = missing.len(), "Manifest entries without a factory");
        }
        missing
    }

    /// Get a plugin's metadata
    pub fn get(&self, name: &str) -> Option<&PluginInfo> {
        self.entries.get(name).map(|entry| &entry.info)
    }

    /// Whether a plugin is registered
    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    /// Get all registered plugins
    pub fn infos(&self) -> impl Iterator<Item = &PluginInfo> {
        self.entries.values().map(|entry| &entry.info)
    }

    /// Get plugins by category
    pub fn in_category<'a>(&'a self, category: &'a str) -> impl Iterator<Item = &'a PluginInfo> + 'a {
        self.infos().filter(move |info| info.category == category)
    }

    /// Get plugins that are not hidden
    pub fn visible(&self) -> impl Iterator<Item = &PluginInfo> {
        self.infos().filter(|info| info.is_visible())
    }

    /// Instantiate a plugin. `None` if the name is unknown.
    pub fn create(&self, name: &str, params: &Params) -> Option<Result<Box<dyn Plugin>, OperatorError>> {
        self.entries.get(name).map(|entry| (entry.factory)(params))
    }

    /// Get the number of registered plugins
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether nothing is registered
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl Default for PluginRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for PluginRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list().entries(self.infos()).finish()
    }
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Session configuration loaded from RON.

use crate::error::{AppError, Result};
use neuroplay_graph::{GraphConfig, GraphSpec, LoadError, Value};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Current session file format version
pub const SESSION_FORMAT_VERSION: u32 = 1;

/// Log filter used when neither `RUST_LOG` nor the session sets one
pub const DEFAULT_LOG_FILTER: &str = "neuroplay=info";

/// Where the session's graph comes from
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum GraphSource {
    /// Graph described in the session file itself
    Inline(GraphSpec),
    /// Graph description file (`.ron` or `.json`), relative to the session file
    File(PathBuf),
    /// Graph description served over HTTP; RON when the path ends in `.ron`,
    /// JSON otherwise
    Url(String),
}

impl GraphSource {
    /// Read the graph description, fetching it when remote
    pub async fn resolve(&self) -> Result<GraphSpec> {
        match self {
            Self::Inline(spec) => Ok(spec.clone()),
            Self::File(path) => Ok(GraphSpec::load(path)?),
            Self::Url(url) => {
                tracing::info!(%url, "Fetching graph");
                let fetch_error = |source| AppError::Fetch {
                    url: url.clone(),
                    source,
                };
                let body = reqwest::get(url.as_str())
                    .await
                    .and_then(reqwest::Response::error_for_status)
                    .map_err(fetch_error)?
                    .text()
                    .await
                    .map_err(fetch_error)?;
                Ok(parse_remote(url, &body)?)
            }
        }
    }
}

/// Parse a fetched description, choosing the format from the URL path
fn parse_remote(url: &str, body: &str) -> std::result::Result<GraphSpec, LoadError> {
    let path = url.split(['?', '#']).next().unwrap_or_default();
    if path.ends_with(".ron") {
        GraphSpec::from_ron(body)
    } else {
        GraphSpec::from_json(body)
    }
}

impl Default for GraphSource {
    fn default() -> Self {
        Self::Inline(GraphSpec::default())
    }
}

/// A value written into a port once the graph has started
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Input {
    /// `node` or `node:port`
    pub target: String,
    /// Data to write
    pub value: Value,
}

/// Session settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    /// Format version for compatibility
    pub format_version: u32,
    /// Graph to run
    pub graph: GraphSource,
    /// Plugin manifest (JSON) overlaid on the built-in registry
    pub manifest: Option<PathBuf>,
    /// Values written after start, in order
    pub inputs: Vec<Input>,
    /// Endpoints whose outputs are logged
    pub watch: Vec<String>,
    /// Host loop tick in milliseconds
    pub frame_interval_ms: u64,
    /// Stop after this many seconds; run until Ctrl+C when unset
    pub run_for_secs: Option<f64>,
    /// Engine tunables
    pub engine: GraphConfig,
    /// Fallback `tracing` filter directive
    pub log_filter: String,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            format_version: SESSION_FORMAT_VERSION,
            graph: GraphSource::default(),
            manifest: None,
            inputs: Vec::new(),
            watch: Vec::new(),
            frame_interval_ms: 16,
            run_for_secs: None,
            engine: GraphConfig::default(),
            log_filter: DEFAULT_LOG_FILTER.to_string(),
        }
    }
}

impl SessionConfig {
    /// Parse a session from RON text
    pub fn from_ron(s: &str) -> Result<Self> {
        let config: SessionConfig = ron::from_str(s)?;

        // Version check
        if config.format_version > SESSION_FORMAT_VERSION {
            return Err(AppError::UnsupportedVersion {
                found: config.format_version,
                supported: SESSION_FORMAT_VERSION,
            });
        }
        Ok(config)
    }

    /// Load a session file.
    ///
    /// Relative graph and manifest paths are resolved against the file's
    /// directory.
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let mut config = Self::from_ron(&content)?;
        if let Some(base) = path.parent() {
            config.resolve_paths(base);
        }
        Ok(config)
    }

    fn resolve_paths(&mut self, base: &Path) {
        if let GraphSource::File(file) = &mut self.graph {
            if file.is_relative() {
                *file = base.join(&*file);
            }
        }
        if let Some(manifest) = &mut self.manifest {
            if manifest.is_relative() {
                *manifest = base.join(&*manifest);
            }
        }
    }

    /// Host loop tick
    pub fn frame_interval(&self) -> Duration {
        Duration::from_millis(self.frame_interval_ms.max(1))
    }

    /// Bounded run length, if any.
    /// Lengths too large for a `Duration` mean no bound.
    pub fn run_for(&self) -> Option<Duration> {
        self.run_for_secs
            .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SessionConfig::from_ron("()").unwrap();
        assert_eq!(config, SessionConfig::default());
        assert_eq!(config.frame_interval(), Duration::from_millis(16));
        assert_eq!(config.run_for(), None);
    }

    #[test]
    fn test_parse_session() {
        let config = SessionConfig::from_ron(
            r#"(
                graph: File("graphs/sine.json"),
                manifest: Some("manifest.json"),
                inputs: [(target: "input", value: 3)],
                watch: ["sine:default"],
                frame_interval_ms: 0,
                run_for_secs: Some(1.5),
                engine: (max_depth: 32),
            )"#,
        )
        .unwrap();

        assert_eq!(config.graph, GraphSource::File(PathBuf::from("graphs/sine.json")));
        assert_eq!(config.inputs[0].value, Value::from(3));
        assert_eq!(config.frame_interval(), Duration::from_millis(1));
        assert_eq!(config.run_for(), Some(Duration::from_millis(1500)));
        assert_eq!(config.engine.max_depth, 32);
        assert!(config.engine.warn_on_schema_mismatch);
    }

    #[test]
    fn test_run_for_out_of_range() {
        for secs in [1e30, -1.0, f64::NAN, f64::INFINITY] {
            let config = SessionConfig {
                run_for_secs: Some(secs),
                ..SessionConfig::default()
            };
            assert_eq!(config.run_for(), None, "{secs}");
        }
    }

    #[test]
    fn test_url_source_parses() {
        let config = SessionConfig::from_ron(r#"(graph: Url("https://example.com/graphs/sine.json"))"#).unwrap();
        assert_eq!(config.graph, GraphSource::Url("https://example.com/graphs/sine.json".to_string()));

        let mut resolved = config.clone();
        resolved.resolve_paths(Path::new("demos"));
        assert_eq!(resolved.graph, config.graph);
    }

    #[test]
    fn test_remote_format_follows_url_path() {
        let ron_body = r#"(nodes: [(id: "n", class: "Number")])"#;
        let json_body = r#"{"nodes": [{"id": "n", "class": "Number"}]}"#;

        let spec = parse_remote("http://host/graph.ron?rev=2", ron_body).unwrap();
        assert_eq!(spec.nodes.len(), 1);
        let spec = parse_remote("http://host/api/graph", json_body).unwrap();
        assert_eq!(spec.nodes[0].class, "Number");
        assert!(matches!(parse_remote("http://host/graph.json", ron_body), Err(LoadError::Json(_))));
    }

    #[tokio::test]
    async fn test_resolve_sources() {
        let inline = GraphSource::Inline(GraphSpec::default());
        assert_eq!(inline.resolve().await.unwrap(), GraphSpec::default());

        let missing = GraphSource::File(PathBuf::from("does/not/exist.ron"));
        assert!(matches!(missing.resolve().await, Err(AppError::Graph(_))));

        let bad_url = GraphSource::Url("not a url".to_string());
        assert!(matches!(bad_url.resolve().await, Err(AppError::Fetch { .. })));
    }

    #[test]
    fn test_demo_session_parses() {
        let config = SessionConfig::from_ron(include_str!("../../../demos/session.ron")).unwrap();
        assert_eq!(config.graph, GraphSource::File(PathBuf::from("doubler.ron")));
        assert_eq!(config.inputs.len(), 2);
        assert_eq!(config.engine.max_depth, 128);
    }

    #[test]
    fn test_newer_version_is_rejected() {
        let err = SessionConfig::from_ron("(format_version: 99)").unwrap_err();
        assert!(matches!(err, AppError::UnsupportedVersion { found: 99, .. }));
    }

    #[test]
    fn test_relative_paths_follow_session_file() {
        let mut config = SessionConfig {
            graph: GraphSource::File(PathBuf::from("graph.ron")),
            manifest: Some(PathBuf::from("/abs/manifest.json")),
            ..SessionConfig::default()
        };
        config.resolve_paths(Path::new("demos"));
        assert_eq!(config.graph, GraphSource::File(PathBuf::from("demos/graph.ron")));
        assert_eq!(config.manifest, Some(PathBuf::from("/abs/manifest.json")));
    }
}

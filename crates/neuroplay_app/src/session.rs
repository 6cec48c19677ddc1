// SPDX-License-Identifier: MIT OR Apache-2.0
//! Hosts one running graph and drives its clock.

use crate::config::SessionConfig;
use crate::error::{AppError, Result};
use neuroplay_graph::plugins::builtin_registry;
use neuroplay_graph::{Endpoint, Graph, GraphSpec, PluginManifest, PluginRegistry};
use std::time::Duration;
use tokio::time::{Instant, MissedTickBehavior};

/// Counters collected while a session runs
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SessionStats {
    /// Host loop ticks
    pub ticks: u64,
    /// Timers fired on the graph clock
    pub timers: u64,
    /// Frame tasks run
    pub frame_tasks: u64,
    /// Reports drained from the graph
    pub reports: u64,
}

/// A graph plus the settings that drive it
pub struct Session {
    graph: Graph,
    config: SessionConfig,
    stats: SessionStats,
}

impl Session {
    /// Resolve the session's graph source, then build it
    pub async fn open(config: SessionConfig) -> Result<Self> {
        let spec = config.graph.resolve().await?;
        Self::new(config, &spec)
    }

    /// Build the registry and the graph described by `spec`
    pub fn new(config: SessionConfig, spec: &GraphSpec) -> Result<Self> {
        let registry = load_registry(&config)?;
        let (mut graph, errors) = Graph::build(spec, &registry, config.engine.clone());
        if !errors.is_empty() {
            tracing::warn!(count = errors.len(), "Graph built with configuration errors");
        }

        for text in &config.watch {
            match Endpoint::parse(text) {
                Ok(endpoint) => {
                    let label = endpoint.to_string();
                    graph.add_sink(endpoint, move |value| tracing::info!(port = %label, "{value}"));
                }
                Err(err) => tracing::warn!(%err, "Ignoring watch entry"),
            }
        }

        Ok(Self {
            graph,
            config,
            stats: SessionStats::default(),
        })
    }

    /// The hosted graph
    pub fn graph(&self) -> &Graph {
        &self.graph
    }

    /// Counters so far
    pub fn stats(&self) -> SessionStats {
        self.stats
    }

    /// Start the graph and write the configured inputs
    pub fn start(&mut self) {
        self.graph.start();
        for input in &self.config.inputs {
            let endpoint = match Endpoint::parse(&input.target) {
                Ok(endpoint) => endpoint,
                Err(err) => {
                    tracing::warn!(%err, "Skipping input");
                    continue;
                }
            };
            // Failures are already in the graph's reports
            let _ = self.graph.push(endpoint.node, &endpoint.port, input.value.clone());
        }
        self.drain_reports();
    }

    /// Advance the graph clock by `elapsed` and run one frame
    pub fn step(&mut self, elapsed: Duration) {
        self.stats.ticks += 1;
        self.stats.timers += self.graph.advance(elapsed) as u64;
        self.stats.frame_tasks += self.graph.frame() as u64;
        self.drain_reports();
    }

    fn drain_reports(&mut self) {
        // Each report was logged when it was raised
        self.stats.reports += self.graph.take_reports().len() as u64;
    }

    /// Stop the graph
    pub fn stop(&mut self) {
        self.graph.stop();
        self.drain_reports();
        let stats = self.stats();
        tracing::info!(
            ticks = stats.ticks,
            timers = stats.timers,
            frame_tasks = stats.frame_tasks,
            reports = stats.reports,
            "Session finished"
        );
    }

    /// Run until Ctrl+C or until `run_for_secs` elapses
    pub async fn run(&mut self) -> Result<()> {
        self.start();

        let mut ticker = tokio::time::interval(self.config.frame_interval());
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let started = Instant::now();
        let deadline = self.config.run_for().and_then(|run_for| started.checked_add(run_for));
        let mut last = started;

        tracing::info!(graph = %self.graph.name, "Session running (press Ctrl+C to stop)");
        let shutdown = tokio::signal::ctrl_c();
        tokio::pin!(shutdown);

        let outcome = loop {
            tokio::select! {
                signal = &mut shutdown => {
                    tracing::info!("Shutdown signal received");
                    break signal.map_err(AppError::Signal);
                }
                now = ticker.tick() => {
                    self.step(now - last);
                    last = now;
                    if deadline.is_some_and(|deadline| now >= deadline) {
                        break Ok(());
                    }
                }
            }
        };

        self.stop();
        outcome
    }
}

fn load_registry(config: &SessionConfig) -> Result<PluginRegistry> {
    let mut registry = builtin_registry();
    if let Some(path) = &config.manifest {
        let content = std::fs::read_to_string(path).map_err(|source| AppError::Io {
            path: path.clone(),
            source,
        })?;
        let manifest = PluginManifest::from_json(&content)?;
        let missing = registry.apply_manifest(&manifest);
        tracing::info!(
            plugins = registry.len(),
            unavailable = missing.len(),
            "Applied plugin manifest"
        );
    }
    Ok(registry)
}

// SPDX-License-Identifier: MIT OR Apache-2.0
//! Errors surfaced by the session shell.

use neuroplay_graph::LoadError;
use std::path::PathBuf;
use thiserror::Error;

/// Session errors
#[derive(Debug, Error)]
pub enum AppError {
    /// A file could not be read
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File being read
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// Session file is not valid RON
    #[error("Invalid session config: {0}")]
    Config(#[from] ron::error::SpannedError),

    /// Session file was written by a newer version
    #[error("Session version {found} is newer than supported version {supported}")]
    UnsupportedVersion {
        /// Version in the file
        found: u32,
        /// Highest version this build reads
        supported: u32,
    },

    /// Graph description could not be loaded
    #[error("Failed to load graph: {0}")]
    Graph(#[from] LoadError),

    /// Remote graph description could not be fetched
    #[error("Failed to fetch {url}: {source}")]
    Fetch {
        /// Requested URL
        url: String,
        /// Underlying error
        #[source]
        source: reqwest::Error,
    },

    /// Plugin manifest is not valid JSON
    #[error("Invalid plugin manifest: {0}")]
    Manifest(#[from] serde_json::Error),

    /// Async runtime could not be created
    #[error("Failed to start runtime: {0}")]
    Runtime(std::io::Error),

    /// Shutdown signal could not be installed
    #[error("Failed to listen for shutdown signal: {0}")]
    Signal(std::io::Error),
}

/// Result type for session operations
pub type Result<T> = std::result::Result<T, AppError>;

//! Error taxonomy for the canvas server.
//!
//! Each fallible subsystem gets its own `thiserror` enum. `main` is the only place that
//! flattens everything into `anyhow::Error`; every other layer matches on the typed variant it
//! actually needs to react to. Protocol-facing mistakes (bad coordinates, malformed colors,
//! cooldown, auth) are rejected inline by the session loop and HTTP filters as plain strings
//! and status codes rather than through this module — they are per-request outcomes, not
//! failures of a subsystem.

use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file not found: {path}")]
    NoConfig { path: PathBuf },

    #[error("malformed config in {path}: {source}")]
    MalformedConfig {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("config requires at least one enabled frontend (api or sockets)")]
    NoFrontend,
}

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("backup payload size {actual} does not match expected {expected} ({width}x{height}x{cell_bytes})")]
    IncorrectBackupSize {
        actual: usize,
        expected: usize,
        width: usize,
        height: usize,
        cell_bytes: usize,
    },
}

#[derive(Debug, Error)]
pub enum SnapshotError {
    #[error("failed to write backup file {path}: {source}")]
    WriteFile {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    BadSize(#[from] StoreError),

    #[error("failed to encode time-lapse image: {0}")]
    Encode(#[from] image::ImageError),
}

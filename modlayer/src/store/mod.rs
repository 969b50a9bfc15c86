//! Persisted engine state.
//!
//! Everything the engine remembers between runs lives here, under one state
//! directory (default `~/.modlayer`):
//!
//! - `config.ini` — deployment settings ([`DeploymentSettings`])
//! - `ownership.json` — per-path ownership stacks ([`OwnershipStacks`])
//! - `priorities.json` — conflict-set priority records ([`PriorityRecords`])
//! - `packages/` — the local package store's root
//! - `overlay/` — the virtual overlay folder used in overlay mode
//!
//! All JSON records carry an explicit schema version field and every save
//! goes through [`atomic_write`], so a crash mid-save never leaves a torn
//! record on disk.

use std::io;
use std::path::PathBuf;

use thiserror::Error;

mod atomic;
mod ownership;
mod paths;
mod priority;
mod settings;

pub use atomic::atomic_write;
pub use ownership::{OwnershipStacks, OWNERSHIP_SCHEMA_VERSION};
pub use paths::StateDir;
pub use priority::{signature, OrderSource, PriorityRecords, ResolvedOrder, PRIORITY_SCHEMA_VERSION};
pub use settings::{DeploymentMode, DeploymentSettings};

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Errors raised while loading or saving persisted state.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Filesystem access failed.
    #[error("failed to access {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: io::Error,
    },

    /// A JSON record failed to parse or serialize.
    #[error("invalid record at {}: {source}", path.display())]
    Json {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    /// The settings file failed to parse.
    #[error("invalid settings file at {}: {source}", path.display())]
    Ini {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    /// A record was written by a newer build.
    #[error("record at {} has schema version {found}, this build supports up to {supported}", path.display())]
    UnsupportedSchema {
        path: PathBuf,
        found: u32,
        supported: u32,
    },

    /// A settings value is not usable.
    #[error("invalid value in {}: {message}", path.display())]
    InvalidValue { path: PathBuf, message: String },
}

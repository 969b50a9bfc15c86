//! State directory layout.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// The engine's state directory and the well-known paths inside it.
///
/// Defaults to `~/.modlayer`. Holds the settings file, the persisted
/// ownership/priority records, the packages root, the virtual overlay folder
/// and the sandbox root.
#[derive(Debug, Clone)]
pub struct StateDir {
    root: PathBuf,
}

impl StateDir {
    /// Use an explicit state directory.
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    /// The default state directory under the user's home.
    pub fn default_location() -> Option<Self> {
        dirs::home_dir().map(|home| Self::new(home.join(".modlayer")))
    }

    /// The state directory root.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Settings file (`config.ini`).
    pub fn config_file(&self) -> PathBuf {
        self.root.join("config.ini")
    }

    /// Ownership stack record (`ownership.json`).
    pub fn ownership_file(&self) -> PathBuf {
        self.root.join("ownership.json")
    }

    /// Priority record file (`priorities.json`).
    pub fn priority_file(&self) -> PathBuf {
        self.root.join("priorities.json")
    }

    /// Root directory of the local package store.
    pub fn packages_dir(&self) -> PathBuf {
        self.root.join("packages")
    }

    /// The virtual overlay folder.
    pub fn overlay_dir(&self) -> PathBuf {
        self.root.join("overlay")
    }

    /// Root for sandboxed deployment targets.
    pub fn sandbox_dir(&self) -> PathBuf {
        self.root.join("sandbox")
    }

    /// Parked originals: pre-existing target files shadowed by a package in
    /// direct-copy mode, restored when the last owner is disabled.
    pub fn originals_dir(&self) -> PathBuf {
        self.root.join("originals")
    }

    /// Log file directory.
    pub fn log_dir(&self) -> PathBuf {
        self.root.join("logs")
    }

    /// Create the state directory if it does not exist yet.
    pub fn ensure(&self) -> io::Result<()> {
        fs::create_dir_all(&self.root)
    }
}

//! Deployment settings file.
//!
//! Settings persist as an INI file under the state directory:
//!
//! ```ini
//! [deployment]
//! target = /games/example/Mods
//! mode = direct
//! sandbox = false
//! ```

use std::fmt;
use std::fs;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use ini::Ini;

use super::{StateDir, StoreError, StoreResult};

const SECTION: &str = "deployment";

/// How packages are exposed in the target directory.
///
/// Global to the target directory and switched only by the mode transition
/// manager; the recorded mode must always match the target's on-disk nature
/// (plain tree vs junction-backed).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum DeploymentMode {
    /// Package files are copied into the target; per-path ownership stacks
    /// track who owns each deployed file.
    #[default]
    DirectCopy,

    /// The target is a junction into the virtual overlay folder; packages
    /// are exposed through symlinks and never copied.
    SymlinkOverlay,
}

impl DeploymentMode {
    /// Stable name used in the settings file and CLI output.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::DirectCopy => "direct",
            Self::SymlinkOverlay => "overlay",
        }
    }
}

impl fmt::Display for DeploymentMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for DeploymentMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "direct" => Ok(Self::DirectCopy),
            "overlay" => Ok(Self::SymlinkOverlay),
            other => Err(format!("unknown deployment mode {:?}", other)),
        }
    }
}

/// Persisted deployment settings.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DeploymentSettings {
    /// The shared target directory packages deploy into. `None` until the
    /// user configures one.
    pub target_dir: Option<PathBuf>,

    /// Active deployment mode.
    pub mode: DeploymentMode,

    /// When set, deployment is redirected into the state directory's
    /// sandbox instead of the live target.
    pub sandbox: bool,
}

impl DeploymentSettings {
    /// Load settings; a missing file yields the defaults.
    pub fn load(path: &Path) -> StoreResult<Self> {
        if !path.exists() {
            return Ok(Self::default());
        }
        let conf = Ini::load_from_file(path).map_err(|source| StoreError::Ini {
            path: path.to_path_buf(),
            source,
        })?;
        let section = conf.section(Some(SECTION));

        let target_dir = section
            .and_then(|s| s.get("target"))
            .filter(|v| !v.is_empty())
            .map(PathBuf::from);

        let mode = match section.and_then(|s| s.get("mode")) {
            Some(raw) => raw.parse().map_err(|message| StoreError::InvalidValue {
                path: path.to_path_buf(),
                message,
            })?,
            None => DeploymentMode::default(),
        };

        let sandbox = section
            .and_then(|s| s.get("sandbox"))
            .map(|v| v == "true")
            .unwrap_or(false);

        Ok(Self {
            target_dir,
            mode,
            sandbox,
        })
    }

    /// Persist the settings.
    pub fn save(&self, path: &Path) -> StoreResult<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).map_err(|source| StoreError::Io {
                path: parent.to_path_buf(),
                source,
            })?;
        }

        let mut conf = Ini::new();
        let target = self
            .target_dir
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_default();
        conf.with_section(Some(SECTION))
            .set("target", target)
            .set("mode", self.mode.as_str())
            .set("sandbox", if self.sandbox { "true" } else { "false" });

        conf.write_to_file(path).map_err(|source| StoreError::Io {
            path: path.to_path_buf(),
            source,
        })
    }

    /// The directory deployment actually writes to.
    ///
    /// With the sandbox flag set this is a directory of the same name under
    /// the state directory's sandbox root, so trial runs never touch the
    /// live target.
    pub fn effective_target(&self, state: &StateDir) -> Option<PathBuf> {
        let target = self.target_dir.as_ref()?;
        if self.sandbox {
            let name = target
                .file_name()
                .map(|n| n.to_os_string())
                .unwrap_or_else(|| "target".into());
            Some(state.sandbox_dir().join(name))
        } else {
            Some(target.clone())
        }
    }
}

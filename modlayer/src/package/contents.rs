//! Content path enumeration for packages.
//!
//! A package's deployable contents are the regular files under its root
//! directory, excluding the reserved `.modlayer/` metadata subtree. Paths are
//! represented as [`ContentPath`] values: relative, forward-slash normalized,
//! and usable as map keys in the persisted ownership stacks.

use std::fmt;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::time::UNIX_EPOCH;

use serde::{Deserialize, Serialize};

use super::naming::METADATA_DIR;

/// A relative path within a package's content tree.
///
/// Always forward-slash separated, never absolute, never containing `.` or
/// `..` components. The same `ContentPath` identifies the same logical file
/// in every package that provides it and in the target directory.
///
/// # Example
///
/// ```
/// use modlayer::package::ContentPath;
///
/// let path = ContentPath::new("textures\\x.png");
/// assert_eq!(path.as_str(), "textures/x.png");
/// assert_eq!(path.file_name(), "x.png");
/// ```
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentPath(String);

impl ContentPath {
    /// Create a content path from a string, normalizing separators.
    ///
    /// Backslashes become forward slashes and leading `/` or `./` prefixes
    /// are stripped, so paths read back from records produced on another
    /// platform compare equal.
    pub fn new(path: impl Into<String>) -> Self {
        let mut s = path.into().replace('\\', "/");
        loop {
            if let Some(rest) = s.strip_prefix("./") {
                s = rest.to_string();
            } else if let Some(rest) = s.strip_prefix('/') {
                s = rest.to_string();
            } else {
                break;
            }
        }
        Self(s)
    }

    /// Create a content path from a relative filesystem path.
    ///
    /// Returns `None` for empty paths or paths with non-UTF-8 components.
    pub fn from_rel(path: &Path) -> Option<Self> {
        let mut parts = Vec::new();
        for component in path.components() {
            match component {
                std::path::Component::Normal(part) => parts.push(part.to_str()?),
                _ => return None,
            }
        }
        if parts.is_empty() {
            return None;
        }
        Some(Self(parts.join("/")))
    }

    /// The path as a forward-slash string.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// The final path component.
    pub fn file_name(&self) -> &str {
        self.0.rsplit('/').next().unwrap_or(&self.0)
    }

    /// Resolve this path beneath a root directory, using native separators.
    pub fn join_under(&self, root: &Path) -> PathBuf {
        let mut out = root.to_path_buf();
        for part in self.0.split('/') {
            out.push(part);
        }
        out
    }
}

impl fmt::Display for ContentPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One enumerated content file: path plus the size/mtime pair the integrity
/// checker compares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentEntry {
    /// Relative path within the content tree.
    pub path: ContentPath,

    /// File size in bytes.
    pub size: u64,

    /// Modification time as seconds since the Unix epoch, when available.
    pub mtime: Option<u64>,
}

/// Enumerate a package's deployable content paths.
///
/// Walks the tree under `root` collecting every regular file, excluding the
/// reserved metadata subtree. Results are sorted by path so enumeration
/// order is deterministic.
///
/// # Errors
///
/// Returns the underlying io error if a directory cannot be read; callers
/// wrap it with the failing package's context.
pub fn content_paths(root: &Path) -> io::Result<Vec<ContentEntry>> {
    let mut entries = Vec::new();
    walk(root, root, &mut entries)?;
    entries.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(entries)
}

fn walk(root: &Path, dir: &Path, out: &mut Vec<ContentEntry>) -> io::Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        let file_type = entry.file_type()?;

        if file_type.is_dir() {
            // The metadata subtree is reserved; nothing under it deploys.
            if dir == root && entry.file_name() == METADATA_DIR {
                continue;
            }
            walk(root, &path, out)?;
        } else if file_type.is_file() {
            let rel = path.strip_prefix(root).expect("walk stays under root");
            let Some(content_path) = ContentPath::from_rel(rel) else {
                tracing::warn!(path = %path.display(), "Skipping non-representable content path");
                continue;
            };
            let metadata = entry.metadata()?;
            out.push(ContentEntry {
                path: content_path,
                size: metadata.len(),
                mtime: mtime_secs(&metadata),
            });
        }
        // Symlinks inside packages are not deployable content; skip them.
    }
    Ok(())
}

/// Modification time of a file as epoch seconds, if the platform reports one.
pub fn mtime_secs(metadata: &fs::Metadata) -> Option<u64> {
    metadata
        .modified()
        .ok()
        .and_then(|t| t.duration_since(UNIX_EPOCH).ok())
        .map(|d| d.as_secs())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn touch(root: &Path, rel: &str, contents: &str) {
        let path = root.join(rel);
        fs::create_dir_all(path.parent().unwrap()).unwrap();
        fs::write(path, contents).unwrap();
    }

    #[test]
    fn test_content_path_normalizes_backslashes() {
        let path = ContentPath::new("textures\\ui\\icon.png");
        assert_eq!(path.as_str(), "textures/ui/icon.png");
    }

    #[test]
    fn test_content_path_strips_leading_dot_slash() {
        assert_eq!(ContentPath::new("./a/b").as_str(), "a/b");
        assert_eq!(ContentPath::new("/a/b").as_str(), "a/b");
    }

    #[test]
    fn test_content_path_from_rel() {
        let path = ContentPath::from_rel(Path::new("textures/x.png")).unwrap();
        assert_eq!(path.as_str(), "textures/x.png");
    }

    #[test]
    fn test_content_path_from_rel_rejects_parent_components() {
        assert!(ContentPath::from_rel(Path::new("../escape")).is_none());
        assert!(ContentPath::from_rel(Path::new("")).is_none());
    }

    #[test]
    fn test_content_path_join_under() {
        let path = ContentPath::new("textures/x.png");
        let joined = path.join_under(Path::new("/target"));
        assert_eq!(joined, Path::new("/target").join("textures").join("x.png"));
    }

    #[test]
    fn test_content_path_file_name() {
        assert_eq!(ContentPath::new("a/b/c.txt").file_name(), "c.txt");
        assert_eq!(ContentPath::new("top.txt").file_name(), "top.txt");
    }

    #[test]
    fn test_content_paths_enumerates_files() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "readme.txt", "hi");
        touch(dir.path(), "textures/x.png", "png");
        touch(dir.path(), "textures/deep/y.png", "png");

        let entries = content_paths(dir.path()).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();

        assert_eq!(paths, vec!["readme.txt", "textures/deep/y.png", "textures/x.png"]);
    }

    #[test]
    fn test_content_paths_excludes_metadata_subtree() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "content.txt", "x");
        touch(dir.path(), ".modlayer/manifest.json", "{}");
        touch(dir.path(), ".modlayer/thumb.png", "png");

        let entries = content_paths(dir.path()).unwrap();
        let paths: Vec<&str> = entries.iter().map(|e| e.path.as_str()).collect();

        assert_eq!(paths, vec!["content.txt"]);
    }

    #[test]
    fn test_content_paths_records_size() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "data.bin", "12345");

        let entries = content_paths(dir.path()).unwrap();
        assert_eq!(entries[0].size, 5);
        assert!(entries[0].mtime.is_some());
    }

    #[test]
    fn test_content_paths_empty_package() {
        let dir = TempDir::new().unwrap();
        let entries = content_paths(dir.path()).unwrap();
        assert!(entries.is_empty());
    }
}

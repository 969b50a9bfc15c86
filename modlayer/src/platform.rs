//! OS link primitives.
//!
//! The overlay machinery needs exactly three platform capabilities: file
//! symlinks, one directory-level link at the target path, and a way to tell
//! links from real files before removing anything. On Windows the directory
//! link is a junction-style reparse point (`symlink_dir`); on Unix both
//! flavors are plain symlinks.
//!
//! Every removal helper here refuses to operate on non-links, mirroring the
//! "only remove symlinks, never real directories" rule the rest of the
//! engine relies on.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Create a symbolic link to a regular file.
pub fn symlink_file(original: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_file(original, link)
    }
}

/// Create a directory-level link (junction on Windows).
pub fn create_dir_link(original: &Path, link: &Path) -> io::Result<()> {
    #[cfg(unix)]
    {
        std::os::unix::fs::symlink(original, link)
    }
    #[cfg(windows)]
    {
        std::os::windows::fs::symlink_dir(original, link)
    }
}

/// Remove a directory-level link without touching its target's contents.
///
/// Fails with `InvalidInput` if the path is not a link.
pub fn remove_dir_link(link: &Path) -> io::Result<()> {
    if !is_link(link) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a link, refusing to remove",
        ));
    }
    #[cfg(unix)]
    {
        fs::remove_file(link)
    }
    #[cfg(windows)]
    {
        fs::remove_dir(link)
    }
}

/// Remove a file symlink.
///
/// Fails with `InvalidInput` if the path is not a link.
pub fn remove_file_link(link: &Path) -> io::Result<()> {
    if !is_link(link) {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "not a link, refusing to remove",
        ));
    }
    fs::remove_file(link)
}

/// Check whether a path is a symbolic link (or junction), without following.
pub fn is_link(path: &Path) -> bool {
    fs::symlink_metadata(path)
        .map(|m| m.file_type().is_symlink())
        .unwrap_or(false)
}

/// Read a link's target.
pub fn link_target(path: &Path) -> io::Result<PathBuf> {
    fs::read_link(path)
}

/// Classify an io error as a privilege problem.
///
/// Symlink and junction creation can require elevated rights; callers
/// surface these distinctly so the user knows to elevate and retry.
pub fn is_permission_denied(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::PermissionDenied
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_symlink_file_and_target() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("original.txt");
        let link = dir.path().join("link.txt");
        fs::write(&original, "data").unwrap();

        symlink_file(&original, &link).unwrap();

        assert!(is_link(&link));
        assert_eq!(link_target(&link).unwrap(), original);
        assert_eq!(fs::read_to_string(&link).unwrap(), "data");
    }

    #[test]
    fn test_dir_link_round_trip() {
        let dir = TempDir::new().unwrap();
        let original = dir.path().join("real");
        let link = dir.path().join("linked");
        fs::create_dir(&original).unwrap();
        fs::write(original.join("inside.txt"), "x").unwrap();

        create_dir_link(&original, &link).unwrap();
        assert!(is_link(&link));
        assert!(link.join("inside.txt").exists());

        remove_dir_link(&link).unwrap();
        assert!(!link.exists());
        // The target's contents are untouched.
        assert!(original.join("inside.txt").exists());
    }

    #[test]
    fn test_remove_dir_link_refuses_real_directory() {
        let dir = TempDir::new().unwrap();
        let real = dir.path().join("real");
        fs::create_dir(&real).unwrap();

        let err = remove_dir_link(&real).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(real.exists());
    }

    #[test]
    fn test_remove_file_link_refuses_regular_file() {
        let dir = TempDir::new().unwrap();
        let file = dir.path().join("file.txt");
        fs::write(&file, "x").unwrap();

        let err = remove_file_link(&file).unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::InvalidInput);
        assert!(file.exists());
    }

    #[test]
    fn test_is_link_on_missing_path() {
        let dir = TempDir::new().unwrap();
        assert!(!is_link(&dir.path().join("missing")));
    }

    #[test]
    fn test_dangling_link_is_still_a_link() {
        let dir = TempDir::new().unwrap();
        let link = dir.path().join("dangling");
        symlink_file(&dir.path().join("gone.txt"), &link).unwrap();

        assert!(is_link(&link));
        remove_file_link(&link).unwrap();
        assert!(!is_link(&link));
    }
}

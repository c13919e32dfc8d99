// mirrormediad/src/paths.rs

//! Path plumbing shared by the archive pipelines: mode-carrying directory
//! creation and the single safety gate applied to client-supplied entry names.

use std::path::{Component, Path, PathBuf};

use anyhow::{Result, bail};
use rustix::fs::Mode;
use rustix::io::Errno;

/// Creates every missing component of an absolute path with the given mode.
/// Components that already exist are not an error.
pub fn ensure_dir_all(path: &Path, mode: u32) -> Result<()> {
    if path.as_os_str().is_empty() {
        bail!("ensure_dir_all: empty path");
    }
    if !path.is_absolute() {
        bail!("ensure_dir_all: not absolute: {}", path.display());
    }

    let mut current = PathBuf::from("/");
    for component in path.components() {
        if let Component::Normal(part) = component {
            current.push(part);
            match rustix::fs::mkdir(&current, Mode::from_raw_mode(mode)) {
                Ok(()) | Err(Errno::EXIST) => {}
                Err(e) => bail!("mkdir {} failed: {}", current.display(), e),
            }
        }
    }
    Ok(())
}

/// Joins a sanitized relative path onto a base with exactly one separator.
/// Leading separators on `rel` are dropped rather than doubled.
pub fn join_rel(base: &Path, rel: &str) -> PathBuf {
    let rel = rel.trim_start_matches('/');
    if rel.is_empty() {
        return base.to_path_buf();
    }
    let mut joined = base.as_os_str().to_os_string();
    if !joined.is_empty() && !joined.as_encoded_bytes().ends_with(b"/") {
        joined.push("/");
    }
    joined.push(rel);
    PathBuf::from(joined)
}

/// The directory containing `path`; `/` when the only separator is the
/// leading one.
pub fn parent_of(path: &Path) -> &Path {
    path.parent().unwrap_or_else(|| Path::new("/"))
}

/// The only safety check applied to entry names read from a client stream:
/// strips leading separators, collapses doubled separators, and rejects
/// anything still containing `..`.
pub fn sanitize_rel(raw: &str) -> Result<String> {
    let mut rel = raw.trim_start_matches('/').to_string();
    while rel.contains("//") {
        rel = rel.replace("//", "/");
    }
    if rel.contains("..") {
        bail!("unsafe relative path: {raw:?}");
    }
    Ok(rel)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_ensure_dir_all_creates_chain() {
        let temp_dir = TempDir::new().unwrap();
        let target = temp_dir.path().join("a/b/c");

        ensure_dir_all(&target, 0o700).unwrap();
        assert!(target.is_dir());

        // Idempotent.
        ensure_dir_all(&target, 0o700).unwrap();
        assert!(target.is_dir());
    }

    #[test]
    fn test_ensure_dir_all_rejects_bad_input() {
        assert!(ensure_dir_all(Path::new(""), 0o700).is_err());
        assert!(ensure_dir_all(Path::new("relative/path"), 0o700).is_err());
    }

    #[test]
    fn test_ensure_dir_all_existing_file_fails() {
        let temp_dir = TempDir::new().unwrap();
        let file = temp_dir.path().join("occupied");
        std::fs::write(&file, b"x").unwrap();
        assert!(ensure_dir_all(&file.join("below"), 0o700).is_err());
    }

    #[test]
    fn test_join_rel() {
        let base = Path::new("/data/user/0");
        assert_eq!(join_rel(base, "pkg/files"), PathBuf::from("/data/user/0/pkg/files"));
        assert_eq!(join_rel(base, "/pkg"), PathBuf::from("/data/user/0/pkg"));
        assert_eq!(join_rel(base, ""), PathBuf::from("/data/user/0"));
    }

    #[test]
    fn test_parent_of() {
        assert_eq!(parent_of(Path::new("/data/user/0")), Path::new("/data/user"));
        assert_eq!(parent_of(Path::new("/data")), Path::new("/"));
        assert_eq!(parent_of(Path::new("/")), Path::new("/"));
    }

    #[test]
    fn test_sanitize_rel_normalizes() {
        assert_eq!(sanitize_rel("files/a.bin").unwrap(), "files/a.bin");
        assert_eq!(sanitize_rel("/files/a.bin").unwrap(), "files/a.bin");
        assert_eq!(sanitize_rel("files//a.bin").unwrap(), "files/a.bin");
        assert_eq!(sanitize_rel("dir/").unwrap(), "dir/");
        assert_eq!(sanitize_rel("").unwrap(), "");
    }

    #[test]
    fn test_sanitize_rel_rejects_traversal() {
        assert!(sanitize_rel("../escape.txt").is_err());
        assert!(sanitize_rel("a/../../etc/passwd").is_err());
        assert!(sanitize_rel("a/..").is_err());
        assert!(sanitize_rel("..").is_err());
    }
}

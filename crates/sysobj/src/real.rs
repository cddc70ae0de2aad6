//! Real filesystem access, optionally confined to an alternate root.
//!
//! With an alternate root (a captured snapshot of `/sys` and `/proc`, say)
//! every namespace path is looked up below that root, and canonical paths
//! are mapped back so callers never see the root prefix. Anything that
//! would land outside the root, lexically or through a symlink, is refused.

use std::fs;
use std::io::{self, Read};
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};

use crate::error::{Result, SysobjError};
use crate::node::Permissions;
use crate::path;

/// A located real path.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Located {
    /// Canonical path in the namespace (root prefix stripped).
    pub path: String,
    /// Where the OS keeps it.
    pub fs_path: PathBuf,
}

/// What `stat` found.
#[derive(Debug, Clone, Copy, Default)]
pub(crate) struct RealStat {
    pub exists: bool,
    pub is_dir: bool,
    pub perms: Permissions,
}

/// View of the real filesystem.
#[derive(Debug, Clone, Default)]
pub(crate) struct RealFs {
    root: Option<PathBuf>,
}

impl RealFs {
    /// Filesystem view rooted at `root`, or at `/` when `None`.
    ///
    /// The root is canonicalized here so later containment checks compare
    /// like with like.
    pub fn new(root: Option<&Path>) -> Result<Self> {
        let Some(root) = root else {
            return Ok(Self { root: None });
        };
        let canonical =
            dunce::canonicalize(root).map_err(|_| SysobjError::InvalidRoot(root.to_path_buf()))?;
        if !canonical.is_dir() {
            return Err(SysobjError::InvalidRoot(root.to_path_buf()));
        }
        Ok(Self {
            root: Some(canonical),
        })
    }

    /// The canonical alternate root, if any.
    pub fn root(&self) -> Option<&Path> {
        self.root.as_deref()
    }

    /// Locate a normalized namespace path. `None` means the path escapes the
    /// alternate root.
    pub fn locate(&self, req: &str) -> Option<Located> {
        let Some(root) = &self.root else {
            let fs_path = dunce::canonicalize(req).unwrap_or_else(|_| PathBuf::from(req));
            return Some(Located {
                path: fs_path.to_string_lossy().into_owned(),
                fs_path,
            });
        };

        let root_str = root.to_string_lossy();
        let lexical = path::normalize(&format!("{}/{}", root_str, req.trim_start_matches('/')));
        if !path::is_within(&lexical, &root_str) {
            tracing::debug!(path = %req, "lexical escape from alternate root");
            return None;
        }

        let fs_path = match dunce::canonicalize(&lexical) {
            Ok(canonical) if canonical.starts_with(root) => canonical,
            Ok(canonical) => {
                tracing::debug!(path = %req, target = %canonical.display(), "symlink escape from alternate root");
                return None;
            }
            // Missing; keep the lexical location so the node reports not found.
            Err(_) => PathBuf::from(lexical),
        };
        let path = self.to_namespace(&fs_path)?;
        Some(Located { path, fs_path })
    }

    /// Map an OS path back into the namespace. `None` if it lies outside
    /// the alternate root.
    pub fn to_namespace(&self, fs_path: &Path) -> Option<String> {
        match &self.root {
            None => Some(fs_path.to_string_lossy().into_owned()),
            Some(root) => {
                let rest = fs_path.strip_prefix(root).ok()?;
                Some(format!("/{}", rest.to_string_lossy()))
            }
        }
    }

    /// Existence, directory-ness and permissions, following symlinks.
    pub fn stat(&self, fs_path: &Path) -> RealStat {
        match fs::metadata(fs_path) {
            Ok(meta) => RealStat {
                exists: true,
                is_dir: meta.is_dir(),
                perms: Permissions::from_mode(meta.permissions().mode()),
            },
            Err(_) => RealStat::default(),
        }
    }

    /// Read at most `max` bytes.
    pub fn read(&self, fs_path: &Path, max: usize) -> io::Result<Vec<u8>> {
        let file = fs::File::open(fs_path)?;
        let mut bytes = Vec::new();
        file.take(max as u64).read_to_end(&mut bytes)?;
        Ok(bytes)
    }

    /// Entry names of a directory, unsorted.
    pub fn list(&self, fs_path: &Path) -> io::Result<Vec<String>> {
        let mut names = Vec::new();
        for entry in fs::read_dir(fs_path)? {
            names.push(entry?.file_name().to_string_lossy().into_owned());
        }
        Ok(names)
    }

    /// Where the link at `fs_path` finally points, as a namespace path.
    pub fn link_target(&self, fs_path: &Path) -> Option<String> {
        let target = dunce::canonicalize(fs_path).ok()?;
        self.to_namespace(&target)
    }

    /// The raw text of the link at `fs_path`.
    pub fn link_text(&self, fs_path: &Path) -> Option<String> {
        fs::read_link(fs_path)
            .ok()
            .map(|t| t.to_string_lossy().into_owned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::os::unix::fs::symlink;
    use tempfile::TempDir;

    fn setup() -> (TempDir, RealFs) {
        let tmp = TempDir::new().unwrap();
        fs::create_dir_all(tmp.path().join("sys/class/net")).unwrap();
        fs::write(tmp.path().join("sys/class/net/value"), "1\n").unwrap();
        let real = RealFs::new(Some(tmp.path())).unwrap();
        (tmp, real)
    }

    #[test]
    fn test_locate_strips_root() {
        let (_tmp, real) = setup();
        let loc = real.locate("/sys/class/net/value").unwrap();
        assert_eq!(loc.path, "/sys/class/net/value");
        assert!(loc.fs_path.ends_with("sys/class/net/value"));
        assert!(real.stat(&loc.fs_path).exists);
    }

    #[test]
    fn test_root_maps_to_slash() {
        let (_tmp, real) = setup();
        assert_eq!(real.locate("/").unwrap().path, "/");
    }

    #[test]
    fn test_lexical_escape_refused() {
        let (_tmp, real) = setup();
        assert!(real.locate("../../etc/passwd").is_none());
    }

    #[test]
    fn test_absolute_dotdot_clamps_at_root() {
        let (_tmp, real) = setup();
        let loc = real.locate("/../../sys").unwrap();
        assert_eq!(loc.path, "/sys");
    }

    #[test]
    fn test_symlink_escape_refused() {
        let (tmp, real) = setup();
        symlink("/etc", tmp.path().join("sys/out")).unwrap();
        assert!(real.locate("/sys/out").is_none());
        assert!(real.locate("/sys/out/passwd").is_none());
    }

    #[test]
    fn test_internal_symlink_followed() {
        let (tmp, real) = setup();
        symlink("../class/net", tmp.path().join("sys/class/link")).unwrap();
        let loc = real.locate("/sys/class/link/value").unwrap();
        assert_eq!(loc.path, "/sys/class/net/value");
    }

    #[test]
    fn test_missing_path_keeps_lexical_location() {
        let (_tmp, real) = setup();
        let loc = real.locate("/sys/nope").unwrap();
        assert_eq!(loc.path, "/sys/nope");
        assert!(!real.stat(&loc.fs_path).exists);
    }

    #[test]
    fn test_invalid_root() {
        assert!(RealFs::new(Some(Path::new("/definitely/not/here"))).is_err());
    }

    #[test]
    fn test_read_caps_length() {
        let (tmp, real) = setup();
        fs::write(tmp.path().join("big"), "x".repeat(100)).unwrap();
        let bytes = real.read(&tmp.path().join("big"), 10).unwrap();
        assert_eq!(bytes.len(), 10);
    }
}

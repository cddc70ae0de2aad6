//! Resolved tree entries.
//!
//! A [`Node`] is what the resolver hands back for a requested path: where it
//! really lives, whether it exists, its permission view, its cached data and
//! its class. Nodes are plain values owned by the caller; the engine only
//! mutates one when asked to read or classify it.

mod data;
mod read;

use std::path::{Path, PathBuf};

use serde::Serialize;

use crate::class::ClassId;
use crate::path;
use crate::real::RealFs;
use crate::vo::VoType;

pub use data::{NodeData, guess_base};

/// Access bits as seen by a privileged and an unprivileged reader.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct Permissions {
    pub root_can_read: bool,
    pub root_can_write: bool,
    pub others_can_read: bool,
    pub others_can_write: bool,
}

impl Permissions {
    /// Permission view of a unix mode. The owner bits stand in for the
    /// privileged reader, the "other" bits for everybody else.
    pub fn from_mode(mode: u32) -> Self {
        Self {
            root_can_read: mode & 0o400 != 0,
            root_can_write: mode & 0o200 != 0,
            others_can_read: mode & 0o004 != 0,
            others_can_write: mode & 0o002 != 0,
        }
    }

    /// Permission view of a virtual object's type bits.
    pub fn from_vo(kind: VoType) -> Self {
        let public = !kind.contains(VoType::REQ_ROOT);
        let write = kind.contains(VoType::WRITE);
        Self {
            root_can_read: true,
            root_can_write: write,
            others_can_read: public,
            others_can_write: write && public,
        }
    }
}

/// Classification state. Once a class is assigned it never changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Classification {
    /// Not attempted yet.
    #[default]
    Pending,
    /// Attempted; nothing matched.
    Unmatched,
    /// Claimed by a class.
    Matched(ClassId),
}

/// A resolved entry in the unified tree.
#[derive(Debug, Clone)]
pub struct Node {
    pub(crate) path_req: String,
    pub(crate) path: String,
    pub(crate) fs_path: Option<PathBuf>,
    pub(crate) is_virtual: bool,
    pub(crate) vo_kind: VoType,
    pub(crate) exists: bool,
    pub(crate) is_dir: bool,
    pub(crate) perms: Permissions,
    pub(crate) write_only: bool,
    pub(crate) access_denied: bool,
    pub(crate) data: NodeData,
    pub(crate) class: Classification,
    // per-call filesystem view; None means the engine's own
    pub(crate) view: Option<RealFs>,
}

impl Node {
    /// A node for `path_req` that has not been located yet.
    pub(crate) fn unresolved(path_req: String) -> Self {
        Self {
            path: path_req.clone(),
            path_req,
            fs_path: None,
            is_virtual: false,
            vo_kind: VoType::empty(),
            exists: false,
            is_dir: false,
            perms: Permissions::default(),
            write_only: false,
            access_denied: false,
            data: NodeData::default(),
            class: Classification::Pending,
            view: None,
        }
    }

    /// The path as requested, normalized.
    pub fn path_req(&self) -> &str {
        &self.path_req
    }

    /// The canonical path after symlinks, in the unified namespace.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// Where the OS keeps this node; `None` for virtual nodes.
    pub fn fs_path(&self) -> Option<&Path> {
        self.fs_path.as_deref()
    }

    /// Last component of the canonical path.
    pub fn name(&self) -> &str {
        path::name(&self.path)
    }

    /// True if the canonical path is virtual.
    pub fn is_virtual(&self) -> bool {
        self.is_virtual
    }

    /// Type bits of the answering virtual object (empty for real nodes).
    pub fn vo_kind(&self) -> VoType {
        self.vo_kind
    }

    pub fn exists(&self) -> bool {
        self.exists
    }

    pub fn is_dir(&self) -> bool {
        self.is_dir
    }

    pub fn permissions(&self) -> Permissions {
        self.perms
    }

    /// Privileged-writable but not privileged-readable. Never read.
    pub fn write_only(&self) -> bool {
        self.write_only
    }

    /// The last read failed with a permission error.
    pub fn access_denied(&self) -> bool {
        self.access_denied
    }

    /// Cached data.
    pub fn data(&self) -> &NodeData {
        &self.data
    }

    pub fn classification(&self) -> Classification {
        self.class
    }

    /// The assigned class, if classification matched.
    pub fn class_id(&self) -> Option<ClassId> {
        match self.class {
            Classification::Matched(id) => Some(id),
            _ => None,
        }
    }

    /// True once classification has been attempted.
    pub fn is_classified(&self) -> bool {
        self.class != Classification::Pending
    }

    /// True if the request went through a symlink somewhere on the way.
    pub fn via_symlink(&self) -> bool {
        self.path_req != self.path
    }
}

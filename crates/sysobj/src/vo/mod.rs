//! Virtual objects: synthetic entries overlaid on the real namespace.
//!
//! A virtual object is addressed by an exact path and carries a [`VoType`]
//! bitmask plus a data source. Plugins register them at startup to publish
//! computed values (`:/sysobj/elapsed`), static listings, and symlinks that
//! stitch real subtrees into the virtual one (`:/sys` → `/sys`).
//!
//! - [`VirtualObject`] - one entry and its constructors
//! - [`VirtualRegistry`] - exact / longest-prefix lookup, listing, removal

mod registry;

use std::fmt;
use std::sync::Arc;

use bitflags::bitflags;

pub use registry::VirtualRegistry;

bitflags! {
    /// Type and permission bits of a virtual object.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct VoType: u32 {
        /// Lists children. Data is `"*"` for an auto directory or a
        /// newline-separated name list.
        const DIR = 1;
        /// Has a string value.
        const STRING = 1 << 1;
        /// Data is a link target.
        const SYMLINK = 1 << 2;
        /// Answers for every path below its own.
        const DYN = 1 << 3;
        /// Symlink that forwards sub-paths onto its target.
        const AUTOLINK = 1 << 4;
        /// Value never changes once read.
        const CONST = 1 << 5;
        /// Callback wants a final `None` call on removal.
        const CLEANUP = 1 << 6;
        /// Only readable by a privileged user.
        const REQ_ROOT = 1 << 7;
        /// Writable.
        const WRITE = 1 << 8;
    }
}

/// Data callback. Receives `Some(path)` for lookups and `None` once when the
/// object is torn down.
pub type VoGetFn = Arc<dyn Fn(Option<&str>) -> Option<String> + Send + Sync>;

/// Per-path type callback for dynamic subtrees.
pub type VoTypeFn = Arc<dyn Fn(&str) -> VoType + Send + Sync>;

/// Where a virtual object's data comes from.
#[derive(Clone)]
pub enum VoSource {
    /// A fixed string.
    Literal(String),
    /// Computed on every lookup.
    Callback {
        get: VoGetFn,
        get_type: Option<VoTypeFn>,
    },
}

impl fmt::Debug for VoSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            VoSource::Literal(s) => f.debug_tuple("Literal").field(s).finish(),
            VoSource::Callback { get_type, .. } => f
                .debug_struct("Callback")
                .field("get_type", &get_type.as_ref().map(|_| "..."))
                .finish(),
        }
    }
}

/// Wildcard data that turns a directory into an auto directory.
pub const AUTO_DIR: &str = "*";

/// A synthetic tree entry.
#[derive(Debug, Clone)]
pub struct VirtualObject {
    path: String,
    kind: VoType,
    source: VoSource,
}

impl VirtualObject {
    /// Create an object from its parts.
    pub fn new(path: impl Into<String>, kind: VoType, source: VoSource) -> Self {
        Self {
            path: path.into(),
            kind,
            source,
        }
    }

    /// A plain string value.
    pub fn string(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(path, VoType::STRING, VoSource::Literal(value.into()))
    }

    /// A string value that never changes.
    pub fn constant(path: impl Into<String>, value: impl Into<String>) -> Self {
        Self::new(
            path,
            VoType::STRING | VoType::CONST,
            VoSource::Literal(value.into()),
        )
    }

    /// A directory whose children are scanned from the registry.
    pub fn auto_dir(path: impl Into<String>) -> Self {
        Self::new(path, VoType::DIR, VoSource::Literal(AUTO_DIR.to_string()))
    }

    /// A directory with a fixed child list.
    pub fn dir<I, S>(path: impl Into<String>, children: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let listing: Vec<String> = children.into_iter().map(|s| s.as_ref().to_string()).collect();
        Self::new(path, VoType::DIR, VoSource::Literal(listing.join("\n")))
    }

    /// A one-hop symlink.
    pub fn symlink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(path, VoType::SYMLINK, VoSource::Literal(target.into()))
    }

    /// A symlink that also forwards every path below it onto `target`.
    pub fn autolink(path: impl Into<String>, target: impl Into<String>) -> Self {
        Self::new(
            path,
            VoType::SYMLINK | VoType::AUTOLINK,
            VoSource::Literal(target.into()),
        )
    }

    /// A value computed by `get` on each lookup.
    pub fn callback<F>(path: impl Into<String>, kind: VoType, get: F) -> Self
    where
        F: Fn(Option<&str>) -> Option<String> + Send + Sync + 'static,
    {
        Self::new(
            path,
            kind,
            VoSource::Callback {
                get: Arc::new(get),
                get_type: None,
            },
        )
    }

    /// Attach a per-path type callback (callback sources only).
    pub fn with_type_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&str) -> VoType + Send + Sync + 'static,
    {
        if let VoSource::Callback { get_type, .. } = &mut self.source {
            *get_type = Some(Arc::new(f));
        }
        self
    }

    /// Add type bits.
    pub fn with_flags(mut self, flags: VoType) -> Self {
        self.kind |= flags;
        self
    }

    /// The exact path this object is registered at.
    pub fn path(&self) -> &str {
        &self.path
    }

    /// The declared type bits.
    pub fn kind(&self) -> VoType {
        self.kind
    }

    /// The data source.
    pub fn source(&self) -> &VoSource {
        &self.source
    }

    /// True if lookups below this object's path resolve to it.
    pub fn matches_below(&self) -> bool {
        self.kind.intersects(VoType::DYN | VoType::AUTOLINK)
    }

    /// Raw data for `path` without symlink completion.
    fn raw_data(&self, path: &str) -> Option<String> {
        match &self.source {
            VoSource::Literal(s) => Some(s.clone()),
            VoSource::Callback { get, .. } => get(Some(path)),
        }
    }

    /// Type for `path`, asking the type callback when there is one.
    fn type_for(&self, path: &str) -> VoType {
        match &self.source {
            VoSource::Callback {
                get_type: Some(f), ..
            } => f(path),
            _ => self.kind,
        }
    }

    /// Give callback objects that asked for it their final `None` call.
    fn teardown(&self) {
        if !self.kind.intersects(VoType::CLEANUP | VoType::DYN) {
            return;
        }
        if let VoSource::Callback { get, .. } = &self.source {
            tracing::debug!(path = %self.path, "tearing down virtual object");
            let _ = get(None);
        }
    }
}

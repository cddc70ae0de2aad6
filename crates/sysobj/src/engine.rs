//! The engine: one value that owns classes, virtual objects and the real
//! filesystem view, and turns requested paths into [`Node`]s.
//!
//! Classes are registered on an [`EngineBuilder`] and sealed by
//! [`build`](EngineBuilder::build). Virtual objects can be added or removed
//! on a running engine. Every operation takes `&self`, so an engine can be
//! shared between crawler threads by reference.

use std::path::Path;
use std::time::{Duration, Instant};

use parking_lot::RwLock;

use crate::builtins;
use crate::class::{Class, ClassId, ClassTable};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::filter::{self, FilterRule};
use crate::node::{Classification, Node, Permissions};
use crate::path;
use crate::real::RealFs;
use crate::vo::{VirtualObject, VirtualRegistry, VoType};

/// Canonical path given to a node whose request escaped the alternate root.
/// Nothing answers for it, so the node is missing and unclassified.
pub const SANDBOX_SENTINEL: &str = ":/sysobj/.invalid";

/// Upper bound on virtual symlink hops during one resolution.
pub const MAX_SYMLINK_HOPS: usize = 10;

/// Whether resolution also classifies.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResolveMode {
    /// Locate and classify.
    Full,
    /// Locate only; classify later if needed.
    Fast,
}

/// Collects classes and virtual objects before the engine is sealed.
pub struct EngineBuilder {
    config: EngineConfig,
    classes: ClassTable,
    vo: VirtualRegistry,
}

impl EngineBuilder {
    pub fn new(config: EngineConfig) -> Self {
        Self {
            config,
            classes: ClassTable::new(),
            vo: VirtualRegistry::new(),
        }
    }

    /// Register a class. Contradictory classes are rejected.
    pub fn register_class(&mut self, class: Class) -> Result<&mut Self> {
        self.classes.register(class)?;
        Ok(self)
    }

    /// Register a virtual object.
    pub fn add_virtual(&mut self, obj: VirtualObject) -> &mut Self {
        self.vo.add(obj);
        self
    }

    /// Seal the class table and open the filesystem view.
    pub fn build(mut self) -> Result<Engine> {
        let started = Instant::now();
        let real = RealFs::new(self.config.alt_root.as_deref())?;
        if self.config.builtins {
            builtins::register_classes(&mut self.classes)?;
            builtins::register_objects(&mut self.vo, &self.classes, started);
        }
        let privileged = rustix::process::geteuid().is_root();
        tracing::info!(
            classes = self.classes.len(),
            objects = self.vo.len(),
            alt_root = ?real.root(),
            privileged,
            "engine ready"
        );
        Ok(Engine {
            config: self.config,
            classes: self.classes,
            vo: RwLock::new(self.vo),
            real,
            started,
            privileged,
        })
    }
}

/// The object tree.
pub struct Engine {
    pub(crate) config: EngineConfig,
    pub(crate) classes: ClassTable,
    pub(crate) vo: RwLock<VirtualRegistry>,
    pub(crate) real: RealFs,
    started: Instant,
    pub(crate) privileged: bool,
}

impl std::fmt::Debug for Engine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Engine")
            .field("classes", &self.classes.len())
            .field("objects", &self.vo.read().len())
            .field("alt_root", &self.real.root())
            .finish_non_exhaustive()
    }
}

impl Engine {
    /// Start building an engine.
    pub fn builder(config: EngineConfig) -> EngineBuilder {
        EngineBuilder::new(config)
    }

    /// An engine with built-ins only.
    pub fn new(config: EngineConfig) -> Result<Self> {
        EngineBuilder::new(config).build()
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// The canonical alternate root, if one is set.
    pub fn alt_root(&self) -> Option<&Path> {
        self.real.root()
    }

    pub fn classes(&self) -> &ClassTable {
        &self.classes
    }

    pub fn class(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id)
    }

    /// The class assigned to `node`, if any. Does not classify.
    pub fn class_of(&self, node: &Node) -> Option<&Class> {
        node.class_id().and_then(|id| self.classes.get(id))
    }

    /// Time since the engine was built.
    pub fn elapsed(&self) -> Duration {
        self.started.elapsed()
    }

    /// True if running with an effective uid of 0.
    pub fn is_privileged(&self) -> bool {
        self.privileged
    }

    /// Register a virtual object on a running engine.
    pub fn add_virtual(&self, obj: VirtualObject) {
        self.vo.write().add(obj);
    }

    /// Remove every virtual object whose path matches `glob`.
    pub fn remove_virtual(&self, glob: &str) -> usize {
        self.vo.write().remove(glob)
    }

    /// Run `f` against the virtual registry.
    pub fn with_registry<R>(&self, f: impl FnOnce(&VirtualRegistry) -> R) -> R {
        f(&self.vo.read())
    }

    /// Resolve and classify `base` joined with `name`.
    pub fn resolve(&self, base: &str, name: Option<&str>) -> Node {
        self.resolve_in(base, name, None, ResolveMode::Full)
    }

    /// Resolve without classifying.
    pub fn resolve_fast(&self, path: &str) -> Node {
        self.resolve_in(path, None, None, ResolveMode::Fast)
    }

    /// Resolve `base` joined with `name`.
    ///
    /// Virtual symlinks are followed up to [`MAX_SYMLINK_HOPS`] times; real
    /// symlinks are followed by the OS. With an alternate root (the engine's
    /// or `alt_root`), a request that escapes it resolves to
    /// [`SANDBOX_SENTINEL`], as does every request under an `alt_root` that
    /// is not a usable directory. Resolution never fails: a path that leads
    /// nowhere yields a node that does not exist.
    pub fn resolve_in(
        &self,
        base: &str,
        name: Option<&str>,
        alt_root: Option<&Path>,
        mode: ResolveMode,
    ) -> Node {
        let req = path::normalize(&path::join(base, name));
        let view = match alt_root {
            None => None,
            Some(root) => match RealFs::new(Some(root)) {
                Ok(real) => Some(real),
                Err(err) => {
                    tracing::warn!(path = %req, %err, "unusable alternate root");
                    let mut node = Node::unresolved(req);
                    node.path = SANDBOX_SENTINEL.to_string();
                    node.is_virtual = true;
                    node.class = Classification::Unmatched;
                    return node;
                }
            },
        };
        self.resolve_with(req, view, mode)
    }

    /// Resolve a normalized path through `view`, or through the engine's own
    /// filesystem view when `None`. The node remembers the view so later
    /// lookups on its behalf (parents, subsystem links) stay in that tree.
    pub(crate) fn resolve_with(&self, req: String, view: Option<RealFs>, mode: ResolveMode) -> Node {
        let mut node = Node::unresolved(req.clone());
        let target = self.follow_virtual(&req);

        if path::is_virtual(&target) {
            let kind = self.vo.read().get_type(&target);
            node.path = target;
            node.is_virtual = true;
            node.vo_kind = kind;
            node.exists = !kind.is_empty() && !kind.contains(VoType::SYMLINK);
            node.is_dir = node.exists && kind.contains(VoType::DIR);
            node.perms = Permissions::from_vo(kind);
        } else {
            let real = view.as_ref().unwrap_or(&self.real);
            match real.locate(&target) {
                Some(loc) => {
                    let stat = real.stat(&loc.fs_path);
                    node.path = loc.path;
                    node.fs_path = Some(loc.fs_path);
                    node.exists = stat.exists;
                    node.is_dir = stat.is_dir;
                    node.perms = stat.perms;
                }
                None => {
                    tracing::warn!(path = %req, "request escapes alternate root");
                    node.path = SANDBOX_SENTINEL.to_string();
                    node.is_virtual = true;
                }
            }
        }
        node.view = view;

        node.write_only = node.exists && node.perms.root_can_write && !node.perms.root_can_read;
        if mode == ResolveMode::Full {
            self.classify(&mut node);
        }
        node
    }

    /// The filesystem view `node` was resolved through.
    pub(crate) fn view_of<'a>(&'a self, node: &'a Node) -> &'a RealFs {
        node.view.as_ref().unwrap_or(&self.real)
    }

    /// Follow virtual symlinks from `path` until a non-link, a real path, or
    /// the hop limit.
    fn follow_virtual(&self, path: &str) -> String {
        let vo = self.vo.read();
        let mut current = path.to_string();
        for _ in 0..MAX_SYMLINK_HOPS {
            if !path::is_virtual(&current) || !vo.get_type(&current).contains(VoType::SYMLINK) {
                return current;
            }
            match vo.get_data(&current) {
                Some(next) => {
                    tracing::trace!(from = %current, to = %next, "following virtual link");
                    current = path::normalize(&next);
                }
                None => return current,
            }
        }
        if path::is_virtual(&current) && vo.get_type(&current).contains(VoType::SYMLINK) {
            tracing::debug!(path = %path, "virtual link chain too long");
        }
        current
    }

    /// Child names of a directory node, naturally sorted and filtered.
    pub fn children(&self, node: &Node, filters: &[FilterRule]) -> Vec<String> {
        if !node.is_dir {
            return Vec::new();
        }
        let names = if node.is_virtual {
            self.vo.read().children(&node.path)
        } else {
            let Some(fs_path) = node.fs_path.as_deref() else {
                return Vec::new();
            };
            match self.view_of(node).list(fs_path) {
                Ok(mut names) => {
                    names.sort_by(|a, b| path::natural_cmp(a, b));
                    names
                }
                Err(err) => {
                    tracing::debug!(path = %node.path, %err, "cannot list directory");
                    Vec::new()
                }
            }
        };
        filter::filter_list(names, filters)
    }
}

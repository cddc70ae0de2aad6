//! Classes: registered rules that give nodes a type.
//!
//! A class pairs a match pattern with a fixed ladder of verification checks
//! and supplies formatting, update-interval and comparison behavior to every
//! node it claims. Plugins build classes with the setters below and hand
//! them to [`EngineBuilder::register_class`](crate::EngineBuilder::register_class).
//!
//! ```
//! use sysobj::{Class, UpdateInterval};
//!
//! let cpu = Class::new("cpu", "/sys/devices/system/cpu/cpu*")
//!     .glob()
//!     .dir()
//!     .label_number("cpu")
//!     .label("CPU")
//!     .update(UpdateInterval::Never);
//! assert_eq!(cpu.tag(), "cpu");
//! ```

mod classify;
mod format;
mod table;

use std::cmp::Ordering;
use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use bitflags::bitflags;

use crate::node::Node;
use crate::pattern::LazyPattern;

pub use format::FormatFlags;
pub use table::ClassTable;

bitflags! {
    /// Matching flags on a class.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct ClassFlags: u32 {
        /// Pattern is a glob over the whole canonical path, not a suffix.
        const GLOB = 1;
        /// Node must be a directory.
        const IS_DIR = 1 << 1;
        /// Node must not be a directory.
        const NOT_DIR = 1 << 2;
        /// Catch-all: only used when no other class matches.
        const BLAST = 1 << 3;
    }
}

/// Custom verification predicate.
pub type VerifyFn = Arc<dyn Fn(&Node) -> bool + Send + Sync>;

/// Value formatter.
pub type FormatFn = Arc<dyn Fn(&Node, FormatFlags) -> String + Send + Sync>;

/// Per-node update interval.
pub type IntervalFn = Arc<dyn Fn(&Node) -> UpdateInterval + Send + Sync>;

/// Ordering over two textual values, for min/max history.
pub type CompareFn = Arc<dyn Fn(&str, &str) -> Ordering + Send + Sync>;

/// How often a node's data should be re-read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum UpdateInterval {
    /// No opinion; the engine default applies.
    #[default]
    Unspecified,
    /// Read once, then never again unless forced.
    Never,
    /// Re-read once this much time has passed.
    Every(Duration),
}

impl UpdateInterval {
    /// An interval in (fractional) seconds.
    pub fn secs(secs: f64) -> Self {
        Self::Every(Duration::from_secs_f64(secs.max(0.0)))
    }
}

/// Index of a class in the engine's sealed class table.
///
/// Nodes hold this instead of the class itself; classes are owned by the
/// engine for its whole lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClassId(pub(crate) usize);

impl ClassId {
    /// Position in the scan order.
    pub fn index(self) -> usize {
        self.0
    }
}

/// One row of a class's attribute table.
///
/// Attribute tables describe the leaf files of a device directory
/// (`scaling_cur_freq`, `energy_now`, ...). A class with a table and no
/// custom predicate only claims nodes named in it.
#[derive(Clone)]
pub struct AttrEntry {
    pub(crate) name: String,
    pub(crate) label: Option<String>,
    pub(crate) format: Option<FormatFn>,
    pub(crate) update: Option<UpdateInterval>,
}

impl AttrEntry {
    /// Entry for the attribute `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            label: None,
            format: None,
            update: None,
        }
    }

    /// Human label.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Formatter that takes precedence over the class formatter.
    pub fn format<F>(mut self, f: F) -> Self
    where
        F: Fn(&Node, FormatFlags) -> String + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(f));
        self
    }

    /// Update interval that takes precedence over the class policy.
    pub fn update(mut self, interval: UpdateInterval) -> Self {
        self.update = Some(interval);
        self
    }

    /// The attribute name.
    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Debug for AttrEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AttrEntry")
            .field("name", &self.name)
            .field("label", &self.label)
            .field("format", &self.format.as_ref().map(|_| "..."))
            .field("update", &self.update)
            .finish()
    }
}

/// A classification rule.
#[derive(Clone)]
pub struct Class {
    pub(crate) tag: String,
    pub(crate) pattern: LazyPattern,
    pub(crate) flags: ClassFlags,
    pub(crate) label: Option<String>,

    // Verification ladder, checked in this order.
    pub(crate) name: Option<String>,
    pub(crate) label_number: Option<String>,
    pub(crate) parent_label_number: Option<String>,
    pub(crate) subsystem: Option<String>,
    pub(crate) parent_subsystem: Option<String>,
    pub(crate) parent_suffix: Option<String>,
    pub(crate) parent_class: Option<String>,
    pub(crate) verify: Option<VerifyFn>,
    pub(crate) attributes: Vec<AttrEntry>,

    pub(crate) format: Option<FormatFn>,
    pub(crate) dir_template: Option<String>,
    pub(crate) update: UpdateInterval,
    pub(crate) update_fn: Option<IntervalFn>,
    pub(crate) compare: Option<CompareFn>,
}

impl Class {
    /// A class matching paths that end with `pattern`. Call [`glob`](Self::glob)
    /// to match the whole path against a glob instead.
    pub fn new(tag: impl Into<String>, pattern: impl Into<String>) -> Self {
        Self {
            tag: tag.into(),
            pattern: LazyPattern::new(pattern),
            flags: ClassFlags::empty(),
            label: None,
            name: None,
            label_number: None,
            parent_label_number: None,
            subsystem: None,
            parent_subsystem: None,
            parent_suffix: None,
            parent_class: None,
            verify: None,
            attributes: Vec::new(),
            format: None,
            dir_template: None,
            update: UpdateInterval::Unspecified,
            update_fn: None,
            compare: None,
        }
    }

    /// Match the pattern as a glob over the canonical path.
    pub fn glob(mut self) -> Self {
        self.flags |= ClassFlags::GLOB;
        self
    }

    /// Only match directories.
    pub fn dir(mut self) -> Self {
        self.flags |= ClassFlags::IS_DIR;
        self
    }

    /// Only match non-directories.
    pub fn not_dir(mut self) -> Self {
        self.flags |= ClassFlags::NOT_DIR;
        self
    }

    /// Make this a catch-all class.
    pub fn blast(mut self) -> Self {
        self.flags |= ClassFlags::BLAST;
        self
    }

    /// Add raw flags.
    pub fn with_flags(mut self, flags: ClassFlags) -> Self {
        self.flags |= flags;
        self
    }

    /// Human label for nodes of this class.
    pub fn label(mut self, label: impl Into<String>) -> Self {
        self.label = Some(label.into());
        self
    }

    /// Node name must equal `name`.
    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Node name must be `label` followed by digits (`cpu7`).
    pub fn label_number(mut self, label: impl Into<String>) -> Self {
        self.label_number = Some(label.into());
        self
    }

    /// Parent name must be `label` followed by digits.
    pub fn parent_label_number(mut self, label: impl Into<String>) -> Self {
        self.parent_label_number = Some(label.into());
        self
    }

    /// The node's `subsystem` link must resolve to `path` (e.g. `/sys/bus/usb`).
    pub fn subsystem(mut self, path: impl Into<String>) -> Self {
        self.subsystem = Some(path.into());
        self
    }

    /// The parent's `subsystem` link must resolve to `path`.
    pub fn parent_subsystem(mut self, path: impl Into<String>) -> Self {
        self.parent_subsystem = Some(path.into());
        self
    }

    /// The parent's canonical path must end with `suffix`.
    pub fn parent_suffix(mut self, suffix: impl Into<String>) -> Self {
        self.parent_suffix = Some(suffix.into());
        self
    }

    /// The parent must classify to the class tagged `tag`.
    pub fn parent_class(mut self, tag: impl Into<String>) -> Self {
        self.parent_class = Some(tag.into());
        self
    }

    /// Final custom predicate.
    pub fn verify<F>(mut self, f: F) -> Self
    where
        F: Fn(&Node) -> bool + Send + Sync + 'static,
    {
        self.verify = Some(Arc::new(f));
        self
    }

    /// Add an attribute table row.
    pub fn attr(mut self, entry: AttrEntry) -> Self {
        self.attributes.push(entry);
        self
    }

    /// Formatter for nodes of this class.
    pub fn format<F>(mut self, f: F) -> Self
    where
        F: Fn(&Node, FormatFlags) -> String + Send + Sync + 'static,
    {
        self.format = Some(Arc::new(f));
        self
    }

    /// Summary template for directory nodes. `{child}` is replaced by the
    /// one-line value of that child.
    pub fn dir_template(mut self, template: impl Into<String>) -> Self {
        self.dir_template = Some(template.into());
        self
    }

    /// Static update interval.
    pub fn update(mut self, interval: UpdateInterval) -> Self {
        self.update = interval;
        self
    }

    /// Per-node update interval, consulted before the static one.
    pub fn update_fn<F>(mut self, f: F) -> Self
    where
        F: Fn(&Node) -> UpdateInterval + Send + Sync + 'static,
    {
        self.update_fn = Some(Arc::new(f));
        self
    }

    /// Value ordering used by pin history.
    pub fn compare<F>(mut self, f: F) -> Self
    where
        F: Fn(&str, &str) -> Ordering + Send + Sync + 'static,
    {
        self.compare = Some(Arc::new(f));
        self
    }

    /// The class tag.
    pub fn tag(&self) -> &str {
        &self.tag
    }

    /// The match pattern as written.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Matching flags.
    pub fn flags(&self) -> ClassFlags {
        self.flags
    }

    /// True for catch-all classes.
    pub fn is_blast(&self) -> bool {
        self.flags.contains(ClassFlags::BLAST)
    }

    /// Human label, if any.
    pub fn class_label(&self) -> Option<&str> {
        self.label.as_deref()
    }

    /// The attribute row for `name`.
    pub fn attribute(&self, name: &str) -> Option<&AttrEntry> {
        self.attributes.iter().find(|a| a.name == name)
    }

    /// The value comparator, if declared.
    pub fn comparator(&self) -> Option<&CompareFn> {
        self.compare.as_ref()
    }
}

impl fmt::Debug for Class {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Class")
            .field("tag", &self.tag)
            .field("pattern", &self.pattern)
            .field("flags", &self.flags)
            .field("attributes", &self.attributes.len())
            .field("update", &self.update)
            .finish_non_exhaustive()
    }
}

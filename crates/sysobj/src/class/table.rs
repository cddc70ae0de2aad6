//! The ordered class list.

use std::sync::atomic::{AtomicUsize, Ordering};

use super::{Class, ClassFlags, ClassId};
use crate::error::{Result, SysobjError};

/// Classes in scan order.
///
/// Ordinary classes are prepended, so the most recently registered class is
/// tried first. Catch-all classes are appended and only win when nothing
/// else matched. The table is filled while building an engine and is
/// read-only afterwards.
#[derive(Debug, Default)]
pub struct ClassTable {
    classes: Vec<Class>,
    match_attempts: AtomicUsize,
}

impl ClassTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a class, rejecting contradictory definitions.
    pub fn register(&mut self, class: Class) -> Result<()> {
        if class.flags.contains(ClassFlags::IS_DIR | ClassFlags::NOT_DIR) {
            return Err(SysobjError::contradictory_class(&class.tag));
        }
        if class.pattern.as_str().is_empty() {
            return Err(SysobjError::EmptyPattern(class.tag.clone()));
        }
        if self.classes.iter().any(|c| c.tag == class.tag) {
            tracing::warn!(tag = %class.tag, "duplicate class tag, newest wins");
        }
        tracing::debug!(tag = %class.tag, pattern = %class.pattern.as_str(), "registering class");
        if class.is_blast() {
            self.classes.push(class);
        } else {
            self.classes.insert(0, class);
        }
        Ok(())
    }

    /// Look up by id.
    pub fn get(&self, id: ClassId) -> Option<&Class> {
        self.classes.get(id.0)
    }

    /// First class carrying `tag` in scan order.
    pub fn find_tag(&self, tag: &str) -> Option<ClassId> {
        self.classes.iter().position(|c| c.tag == tag).map(ClassId)
    }

    /// Classes with their ids, in scan order.
    pub fn iter(&self) -> impl Iterator<Item = (ClassId, &Class)> {
        self.classes.iter().enumerate().map(|(i, c)| (ClassId(i), c))
    }

    pub fn len(&self) -> usize {
        self.classes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.classes.is_empty()
    }

    /// How many class-against-node match attempts have run.
    pub fn match_attempts(&self) -> usize {
        self.match_attempts.load(Ordering::Relaxed)
    }

    pub(crate) fn note_attempt(&self) {
        self.match_attempts.fetch_add(1, Ordering::Relaxed);
    }
}

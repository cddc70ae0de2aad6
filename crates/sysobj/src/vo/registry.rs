//! Virtual object lookup with exact-then-longest-prefix routing.

use std::collections::BTreeMap;

use super::{AUTO_DIR, VirtualObject, VoType};
use crate::path;
use crate::pattern::LazyPattern;

/// Table of virtual objects, keyed by exact path.
///
/// Lookup order:
///
/// 1. An object registered at exactly the query path always wins.
/// 2. Otherwise the deepest ancestor registered as `DYN` or `AUTOLINK`
///    answers for it, so `/a/b` beats `/a` for `/a/b/c`.
///
/// Both rules depend only on the set of registered paths, never on the order
/// objects were added in. Re-adding a path replaces the old entry.
#[derive(Debug, Default)]
pub struct VirtualRegistry {
    objects: BTreeMap<String, VirtualObject>,
}

impl VirtualRegistry {
    /// Create an empty registry.
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an object, replacing any object at the same path.
    pub fn add(&mut self, obj: VirtualObject) {
        let key = obj.path.clone();
        tracing::debug!(path = %key, kind = ?obj.kind, "adding virtual object");
        if let Some(old) = self.objects.insert(key, obj) {
            tracing::warn!(path = %old.path, "virtual object overwritten");
            old.teardown();
        }
    }

    /// Find the object that answers for `path`.
    pub fn find(&self, path: &str) -> Option<&VirtualObject> {
        if let Some(obj) = self.objects.get(path) {
            return Some(obj);
        }
        let mut ancestor = path::parent(path);
        while let Some(candidate) = ancestor {
            if let Some(obj) = self.objects.get(&candidate) {
                if obj.matches_below() {
                    return Some(obj);
                }
            }
            ancestor = path::parent(&candidate);
        }
        None
    }

    /// Type of `path`; empty if nothing answers for it.
    pub fn get_type(&self, path: &str) -> VoType {
        self.find(path)
            .map(|obj| obj.type_for(path))
            .unwrap_or(VoType::empty())
    }

    /// Data of `path`.
    ///
    /// For an autolink the part of `path` below the link is appended to the
    /// target, so `/s/child` under a link `/s` → `/real` yields `/real/child`.
    /// Only one hop is taken; a target that is itself a virtual symlink is
    /// returned as-is.
    pub fn get_data(&self, path: &str) -> Option<String> {
        let obj = self.find(path)?;
        let data = obj.raw_data(path)?;
        if obj.kind.contains(VoType::SYMLINK | VoType::AUTOLINK) && path != obj.path {
            let rest = path[obj.path.len()..].trim_start_matches('/');
            return Some(path::join(&data, Some(rest)));
        }
        Some(data)
    }

    /// Child names of a virtual directory, naturally sorted.
    pub fn children(&self, dir: &str) -> Vec<String> {
        if !self.get_type(dir).contains(VoType::DIR) {
            return Vec::new();
        }
        let Some(data) = self.get_data(dir) else {
            return Vec::new();
        };

        let mut names: Vec<String> = if data == AUTO_DIR {
            self.objects
                .keys()
                .filter(|p| p.as_str() != dir && path::parent(p).as_deref() == Some(dir))
                .map(|p| path::name(p).to_string())
                .collect()
        } else {
            data.lines()
                .map(str::trim)
                .filter(|l| !l.is_empty())
                .map(String::from)
                .collect()
        };
        names.sort_by(|a, b| path::natural_cmp(a, b));
        names.dedup();
        names
    }

    /// Remove every object whose path matches `glob`, tearing down callback
    /// objects. Returns how many were removed.
    pub fn remove(&mut self, glob: &str) -> usize {
        let pattern = LazyPattern::new(glob);
        let doomed: Vec<String> = self
            .objects
            .keys()
            .filter(|p| pattern.matches(p))
            .cloned()
            .collect();
        for key in &doomed {
            if let Some(obj) = self.objects.remove(key) {
                tracing::debug!(path = %key, "removing virtual object");
                obj.teardown();
            }
        }
        doomed.len()
    }

    /// Number of registered objects.
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    /// True if nothing is registered.
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn dyn_obj(path: &str, value: &str) -> VirtualObject {
        let value = value.to_string();
        VirtualObject::callback(path, VoType::STRING | VoType::DYN, move |_| {
            Some(value.clone())
        })
    }

    #[test]
    fn test_exact_beats_dynamic_either_order() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::string("/x/y", "exact"));
        reg.add(dyn_obj("/x", "dynamic"));
        assert_eq!(reg.find("/x/y").unwrap().path(), "/x/y");
        assert_eq!(reg.get_data("/x/y").as_deref(), Some("exact"));

        let mut reg = VirtualRegistry::new();
        reg.add(dyn_obj("/x", "dynamic"));
        reg.add(VirtualObject::string("/x/y", "exact"));
        assert_eq!(reg.find("/x/y").unwrap().path(), "/x/y");
        assert_eq!(reg.find("/x/z").unwrap().path(), "/x");
    }

    #[test]
    fn test_longest_dynamic_prefix_wins() {
        let mut reg = VirtualRegistry::new();
        reg.add(dyn_obj("/a", "short"));
        reg.add(dyn_obj("/a/b", "long"));
        assert_eq!(reg.find("/a/b/c").unwrap().path(), "/a/b");
        assert_eq!(reg.find("/a/x/c").unwrap().path(), "/a");

        let mut reg = VirtualRegistry::new();
        reg.add(dyn_obj("/a/b", "long"));
        reg.add(dyn_obj("/a", "short"));
        assert_eq!(reg.find("/a/b/c").unwrap().path(), "/a/b");
    }

    #[test]
    fn test_prefix_is_component_wise() {
        let mut reg = VirtualRegistry::new();
        reg.add(dyn_obj("/cpu", "x"));
        assert!(reg.find("/cpufreq").is_none());
        assert!(reg.find("/cpu/0").is_some());
    }

    #[test]
    fn test_static_object_does_not_answer_below() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::string("/plain", "v"));
        assert!(reg.find("/plain/child").is_none());
        assert!(reg.get_type("/plain/child").is_empty());
    }

    #[test]
    fn test_autolink_completes_subpath() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::autolink("/s", "/real"));
        assert_eq!(reg.get_data("/s").as_deref(), Some("/real"));
        assert_eq!(reg.get_data("/s/child").as_deref(), Some("/real/child"));
        assert_eq!(reg.get_data("/s/a/b").as_deref(), Some("/real/a/b"));
        assert!(reg.get_type("/s/child").contains(VoType::SYMLINK));
    }

    #[test]
    fn test_plain_symlink_does_not_complete() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::symlink("/s", "/real"));
        assert_eq!(reg.get_data("/s").as_deref(), Some("/real"));
        assert!(reg.get_data("/s/child").is_none());
    }

    #[test]
    fn test_auto_dir_lists_immediate_children() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::auto_dir(":/"));
        reg.add(VirtualObject::auto_dir(":/d"));
        reg.add(VirtualObject::string(":/d/item10", "x"));
        reg.add(VirtualObject::string(":/d/item9", "x"));
        reg.add(VirtualObject::string(":/d/sub/deep", "x"));
        reg.add(VirtualObject::string(":/top", "x"));

        assert_eq!(reg.children(":/d"), vec!["item9", "item10"]);
        assert_eq!(reg.children(":/"), vec!["d", "top"]);
        assert!(reg.children(":/top").is_empty());
    }

    #[test]
    fn test_literal_dir_listing() {
        let mut reg = VirtualRegistry::new();
        reg.add(VirtualObject::dir("/list", ["b", "a", "", "c"]));
        assert_eq!(reg.children("/list"), vec!["a", "b", "c"]);
    }

    #[test]
    fn test_type_callback_for_dynamic_subtree() {
        let mut reg = VirtualRegistry::new();
        reg.add(
            VirtualObject::callback("/gen", VoType::DIR | VoType::DYN, |p| match p {
                Some("/gen") => Some("one\ntwo".to_string()),
                Some(p) => Some(format!("value of {p}")),
                None => None,
            })
            .with_type_fn(|p| if p == "/gen" { VoType::DIR } else { VoType::STRING }),
        );
        assert_eq!(reg.children("/gen"), vec!["one", "two"]);
        assert_eq!(reg.get_type("/gen/one"), VoType::STRING);
        assert_eq!(reg.get_data("/gen/one").as_deref(), Some("value of /gen/one"));
    }

    #[test]
    fn test_remove_by_glob_tears_down() {
        let torn = Arc::new(AtomicUsize::new(0));
        let mut reg = VirtualRegistry::new();
        for name in ["/t/a", "/t/b"] {
            let torn = Arc::clone(&torn);
            reg.add(VirtualObject::callback(
                name,
                VoType::STRING | VoType::CLEANUP,
                move |p| {
                    if p.is_none() {
                        torn.fetch_add(1, Ordering::SeqCst);
                    }
                    Some("v".to_string())
                },
            ));
        }
        reg.add(VirtualObject::string("/keep", "v"));

        assert_eq!(reg.remove("/t/*"), 2);
        assert_eq!(torn.load(Ordering::SeqCst), 2);
        assert_eq!(reg.len(), 1);
        assert!(reg.find("/t/a").is_none());
    }

    #[test]
    fn test_overwrite_replaces_and_tears_down_old() {
        let torn = Arc::new(AtomicUsize::new(0));
        let mut reg = VirtualRegistry::new();
        let counter = Arc::clone(&torn);
        reg.add(VirtualObject::callback(
            "/v",
            VoType::STRING | VoType::CLEANUP,
            move |p| {
                if p.is_none() {
                    counter.fetch_add(1, Ordering::SeqCst);
                }
                Some("old".to_string())
            },
        ));
        reg.add(VirtualObject::string("/v", "new"));
        assert_eq!(reg.len(), 1);
        assert_eq!(reg.get_data("/v").as_deref(), Some("new"));
        assert_eq!(torn.load(Ordering::SeqCst), 1);
    }
}

//! Matching nodes against the class table.

use std::path::Path;

use super::{Class, ClassFlags, ClassId};
use crate::engine::{Engine, ResolveMode, SANDBOX_SENTINEL};
use crate::node::{Classification, Node};
use crate::path;

impl Engine {
    /// Assign a class to `node` if it has none yet.
    ///
    /// Classes are tried in table order; the first ordinary class to pass
    /// every check wins. A catch-all class is only used when no ordinary
    /// class matched. Once attempted, classification is never repeated, so
    /// calling this twice costs nothing.
    pub fn classify(&self, node: &mut Node) -> Option<ClassId> {
        match node.class {
            Classification::Matched(id) => return Some(id),
            Classification::Unmatched => return None,
            Classification::Pending => {}
        }
        if node.path == SANDBOX_SENTINEL {
            node.class = Classification::Unmatched;
            return None;
        }

        let mut fallback = None;
        let mut found = None;
        for (id, class) in self.classes.iter() {
            if class.is_blast() && (found.is_some() || fallback.is_some()) {
                continue;
            }
            self.classes.note_attempt();
            if !self.class_matches(class, node) {
                continue;
            }
            if class.is_blast() {
                fallback = Some(id);
            } else {
                found = Some(id);
                break;
            }
        }

        let result = found.or(fallback);
        match result {
            Some(id) => {
                tracing::trace!(path = %node.path, class = %self.classes.get(id).map(Class::tag).unwrap_or_default(), "classified");
                node.class = Classification::Matched(id);
            }
            None => node.class = Classification::Unmatched,
        }
        result
    }

    /// Try again on a node that matched nothing, e.g. after it appeared.
    /// A node that already has a class keeps it.
    pub fn reclassify(&self, node: &mut Node) -> Option<ClassId> {
        if node.class == Classification::Unmatched {
            node.class = Classification::Pending;
        }
        self.classify(node)
    }

    /// The verification ladder, cheapest checks first.
    fn class_matches(&self, class: &Class, node: &Node) -> bool {
        let hit = if class.flags.contains(ClassFlags::GLOB) {
            class.pattern.matches(&node.path)
        } else {
            node.path.ends_with(class.pattern.as_str())
        };
        if !hit {
            return false;
        }

        if let Some(name) = &class.name {
            if node.name() != name {
                return false;
            }
        }
        if class.flags.contains(ClassFlags::IS_DIR) && !node.is_dir {
            return false;
        }
        if class.flags.contains(ClassFlags::NOT_DIR) && node.is_dir {
            return false;
        }
        if let Some(label) = &class.label_number {
            if !path::is_label_number(node.name(), label) {
                return false;
            }
        }

        let parent = path::parent(&node.path);
        if let Some(label) = &class.parent_label_number {
            let ok = parent
                .as_deref()
                .is_some_and(|p| path::is_label_number(path::name(p), label));
            if !ok {
                return false;
            }
        }
        if let Some(want) = &class.subsystem {
            if !self.subsystem_matches(node, node.fs_path.as_deref(), want) {
                return false;
            }
        }
        if let Some(want) = &class.parent_subsystem {
            let parent_fs = node.fs_path.as_deref().and_then(Path::parent);
            if !self.subsystem_matches(node, parent_fs, want) {
                return false;
            }
        }
        if let Some(suffix) = &class.parent_suffix {
            if !parent.as_deref().is_some_and(|p| p.ends_with(suffix.as_str())) {
                return false;
            }
        }
        if let Some(tag) = &class.parent_class {
            let Some(parent) = parent.as_deref() else {
                return false;
            };
            let mut parent_node =
                self.resolve_with(parent.to_string(), node.view.clone(), ResolveMode::Fast);
            let parent_tag = self
                .classify(&mut parent_node)
                .and_then(|id| self.classes.get(id))
                .map(Class::tag);
            if parent_tag != Some(tag.as_str()) {
                return false;
            }
        }

        if let Some(verify) = &class.verify {
            return verify(node);
        }
        if !class.attributes.is_empty() {
            return class.attribute(node.name()).is_some();
        }
        true
    }

    /// True if `dir/subsystem` is a link to `want`, mapped through the
    /// filesystem view `node` was resolved in.
    ///
    /// When the link target cannot be resolved (a partial snapshot under an
    /// alternate root), the link text is compared instead: `../../bus/usb`
    /// matches `/sys/bus/usb`.
    fn subsystem_matches(&self, node: &Node, dir: Option<&Path>, want: &str) -> bool {
        let Some(dir) = dir else {
            return false;
        };
        let real = self.view_of(node);
        let link = dir.join("subsystem");
        if real.link_target(&link).as_deref() == Some(want) {
            return true;
        }
        let Some(text) = real.link_text(&link) else {
            return false;
        };
        let mut rest = text.as_str();
        while let Some(stripped) = rest.strip_prefix("../").or_else(|| rest.strip_prefix("./")) {
            rest = stripped;
        }
        !rest.is_empty() && (want == rest || want.ends_with(&format!("/{rest}")))
    }
}

#[cfg(test)]
mod tests {
    use crate::class::{AttrEntry, Class};
    use crate::config::EngineConfig;
    use crate::engine::{Engine, EngineBuilder};
    use crate::vo::VirtualObject;

    fn builder() -> EngineBuilder {
        let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
        b.add_virtual(VirtualObject::auto_dir(":/"))
            .add_virtual(VirtualObject::auto_dir(":/dev"))
            .add_virtual(VirtualObject::auto_dir(":/dev/cpu3"))
            .add_virtual(VirtualObject::string(":/dev/cpu3/freq", "1200"))
            .add_virtual(VirtualObject::string(":/dev/cpu3/other", "x"))
            .add_virtual(VirtualObject::string(":/dev/cpufreq", "x"));
        b
    }

    fn tag_of(engine: &Engine, path: &str) -> Option<String> {
        let node = engine.resolve(path, None);
        engine.class_of(&node).map(|c| c.tag().to_string())
    }

    #[test]
    fn test_suffix_and_glob_patterns() {
        let mut b = builder();
        b.register_class(Class::new("freq", "/freq")).unwrap();
        b.register_class(Class::new("cpu", ":/dev/cpu*").glob().dir()).unwrap();
        let engine = b.build().unwrap();

        assert_eq!(tag_of(&engine, ":/dev/cpu3/freq").as_deref(), Some("freq"));
        assert_eq!(tag_of(&engine, ":/dev/cpu3").as_deref(), Some("cpu"));
        // glob matches but directory check fails
        assert_eq!(tag_of(&engine, ":/dev/cpufreq"), None);
    }

    #[test]
    fn test_label_number_checks() {
        let mut b = builder();
        b.register_class(Class::new("cpu", ":/dev/*").glob().label_number("cpu"))
            .unwrap();
        b.register_class(
            Class::new("cpu-attr", ":/dev/*/*")
                .glob()
                .parent_label_number("cpu"),
        )
        .unwrap();
        let engine = b.build().unwrap();

        assert_eq!(tag_of(&engine, ":/dev/cpu3").as_deref(), Some("cpu"));
        assert_eq!(tag_of(&engine, ":/dev/cpufreq"), None);
        assert_eq!(tag_of(&engine, ":/dev/cpu3/other").as_deref(), Some("cpu-attr"));
    }

    #[test]
    fn test_parent_class_and_suffix() {
        let mut b = builder();
        b.register_class(Class::new("cpu", ":/dev/cpu[0-9]*").glob().dir())
            .unwrap();
        b.register_class(Class::new("under-cpu", ":/dev/*/*").glob().parent_class("cpu"))
            .unwrap();
        b.register_class(Class::new("under-dev", ":/*").glob().parent_suffix("/dev").not_dir())
            .unwrap();
        let engine = b.build().unwrap();

        assert_eq!(tag_of(&engine, ":/dev/cpu3/freq").as_deref(), Some("under-cpu"));
        assert_eq!(tag_of(&engine, ":/dev/cpufreq").as_deref(), Some("under-dev"));
    }

    #[test]
    fn test_attribute_table_restricts_names() {
        let mut b = builder();
        b.register_class(
            Class::new("cpu-attrs", ":/dev/cpu3/*")
                .glob()
                .attr(AttrEntry::new("freq").label("Frequency")),
        )
        .unwrap();
        let engine = b.build().unwrap();

        assert_eq!(tag_of(&engine, ":/dev/cpu3/freq").as_deref(), Some("cpu-attrs"));
        assert_eq!(tag_of(&engine, ":/dev/cpu3/other"), None);
    }

    #[test]
    fn test_custom_predicate_is_final() {
        let mut b = builder();
        b.register_class(
            Class::new("numeric", ":/dev/*")
                .glob()
                .not_dir()
                .verify(|node| node.name().ends_with("freq")),
        )
        .unwrap();
        let engine = b.build().unwrap();
        assert_eq!(tag_of(&engine, ":/dev/cpufreq").as_deref(), Some("numeric"));
        assert_eq!(tag_of(&engine, ":/dev/cpu3/other"), None);
    }

    #[test]
    fn test_blast_only_as_fallback() {
        let mut b = builder();
        b.register_class(Class::new("any", "*").glob().blast()).unwrap();
        b.register_class(Class::new("freq", "/freq")).unwrap();
        let engine = b.build().unwrap();

        assert_eq!(tag_of(&engine, ":/dev/cpu3/freq").as_deref(), Some("freq"));
        assert_eq!(tag_of(&engine, ":/dev/cpu3/other").as_deref(), Some("any"));
    }

    #[test]
    fn test_newest_registration_wins() {
        let mut b = builder();
        b.register_class(Class::new("old", "/freq")).unwrap();
        b.register_class(Class::new("new", "/freq")).unwrap();
        let engine = b.build().unwrap();
        assert_eq!(tag_of(&engine, ":/dev/cpu3/freq").as_deref(), Some("new"));
    }

    #[test]
    fn test_classify_is_idempotent() {
        let mut b = builder();
        b.register_class(Class::new("freq", "/freq")).unwrap();
        b.register_class(Class::new("never", "/nothing")).unwrap();
        let engine = b.build().unwrap();

        let mut node = engine.resolve_fast(":/dev/cpu3/other");
        assert_eq!(engine.classify(&mut node), None);
        let attempts = engine.classes().match_attempts();
        assert_eq!(engine.classify(&mut node), None);
        assert_eq!(engine.classes().match_attempts(), attempts);

        let mut node = engine.resolve_fast(":/dev/cpu3/freq");
        let first = engine.classify(&mut node);
        let attempts = engine.classes().match_attempts();
        assert_eq!(engine.classify(&mut node), first);
        assert_eq!(engine.classes().match_attempts(), attempts);
    }

    #[test]
    fn test_reclassify_keeps_existing_class() {
        let mut b = builder();
        b.register_class(Class::new("freq", "/freq")).unwrap();
        let engine = b.build().unwrap();
        let mut node = engine.resolve(":/dev/cpu3/freq", None);
        let id = node.class_id();
        assert!(id.is_some());
        assert_eq!(engine.reclassify(&mut node), id);
    }
}

//! Turning node data into display strings.

use bitflags::bitflags;

use super::Class;
use crate::engine::{Engine, ResolveMode};
use crate::node::Node;
use crate::path;

bitflags! {
    /// Formatting options.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
    pub struct FormatFlags: u32 {
        /// One-line summary suitable for a listing.
        const LIST = 1;
        /// Skip class formatters; show the value as read.
        const RAW = 1 << 1;
    }
}

/// Longest one-line summary before it is cut.
const LIST_WIDTH: usize = 72;

/// Directory templates nest at most this deep.
const MAX_TEMPLATE_DEPTH: usize = 4;

impl Engine {
    /// Format `node`, re-reading it first if its data is stale.
    pub fn format(&self, node: &mut Node, flags: FormatFlags) -> String {
        self.format_nested(node, flags, 0)
    }

    fn format_nested(&self, node: &mut Node, flags: FormatFlags, depth: usize) -> String {
        self.read(node, false);
        self.format_at(node, flags, depth)
    }

    /// Format `node` from whatever data it already holds.
    ///
    /// An attribute formatter beats the class formatter, which beats the
    /// generic rendering.
    pub fn format_cached(&self, node: &Node, flags: FormatFlags) -> String {
        self.format_at(node, flags, 0)
    }

    fn format_at(&self, node: &Node, flags: FormatFlags, depth: usize) -> String {
        let class = self.class_of(node);
        if !flags.contains(FormatFlags::RAW) {
            if let Some(class) = class {
                let custom = class
                    .attribute(node.name())
                    .and_then(|a| a.format.as_ref())
                    .or(class.format.as_ref());
                if let Some(f) = custom {
                    return f(node, flags);
                }
            }
        }
        self.format_generic(node, class, flags, depth)
    }

    /// Human label for `node`: its attribute row's, else its class's.
    pub fn label(&self, node: &Node) -> Option<String> {
        let class = self.class_of(node)?;
        class
            .attribute(node.name())
            .and_then(|a| a.label.clone())
            .or_else(|| class.label.clone())
    }

    fn format_generic(
        &self,
        node: &Node,
        class: Option<&Class>,
        flags: FormatFlags,
        depth: usize,
    ) -> String {
        if !node.exists() {
            return "(Not found)".to_string();
        }
        if node.write_only() {
            return "(Write-only)".to_string();
        }
        if node.access_denied() {
            return "(Permission denied)".to_string();
        }
        if node.is_dir() {
            return match class.and_then(|c| c.dir_template.as_deref()) {
                Some(template) => self.expand_template(node, template, depth),
                None => "(Node)".to_string(),
            };
        }

        let data = node.data();
        if data.is_empty() {
            return "(Empty)".to_string();
        }
        let Some(text) = data.text() else {
            return format!("(Binary value, {} bytes)", data.len());
        };

        if flags.contains(FormatFlags::LIST) {
            let mut lines = text.lines().map(str::trim).filter(|l| !l.is_empty());
            let first = lines.next().unwrap_or_default();
            let mut summary = escape(first, false);
            if lines.next().is_some() {
                summary.push_str(" ...");
            }
            truncate(summary, LIST_WIDTH)
        } else {
            escape(text.trim_end_matches('\n'), true)
        }
    }

    /// Replace each `{child}` with that child's one-line value.
    ///
    /// Names that do not lead below `node` (`{.}`, `{..}`) expand to nothing.
    /// Templates that keep pointing at each other through links are cut off
    /// at [`MAX_TEMPLATE_DEPTH`] with `...`.
    fn expand_template(&self, node: &Node, template: &str, depth: usize) -> String {
        if depth >= MAX_TEMPLATE_DEPTH {
            return "...".to_string();
        }
        let mut out = String::with_capacity(template.len());
        let mut rest = template;
        while let Some(open) = rest.find('{') {
            let Some(close) = rest[open..].find('}') else {
                break;
            };
            out.push_str(&rest[..open]);
            let child = &rest[open + 1..open + close];
            let req = path::normalize(&path::join(node.path(), Some(child)));
            if req != node.path() && path::is_within(&req, node.path()) {
                let mut child_node = self.resolve_with(req, node.view.clone(), ResolveMode::Full);
                out.push_str(&self.format_nested(&mut child_node, FormatFlags::LIST, depth + 1));
            }
            rest = &rest[open + close + 1..];
        }
        out.push_str(rest);
        out
    }
}

/// Escape control characters; newlines survive only when `keep_newlines`.
fn escape(text: &str, keep_newlines: bool) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        if c == '\n' && keep_newlines {
            out.push(c);
        } else if c.is_control() {
            out.extend(c.escape_default());
        } else {
            out.push(c);
        }
    }
    out
}

fn truncate(mut s: String, width: usize) -> String {
    if s.chars().count() <= width {
        return s;
    }
    let cut = s
        .char_indices()
        .nth(width.saturating_sub(3))
        .map(|(i, _)| i)
        .unwrap_or(s.len());
    s.truncate(cut);
    s.push_str("...");
    s
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::class::{AttrEntry, Class};
    use crate::config::EngineConfig;
    use crate::vo::{VirtualObject, VoType};

    fn engine() -> Engine {
        let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
        b.add_virtual(VirtualObject::auto_dir(":/"))
            .add_virtual(VirtualObject::auto_dir(":/bat"))
            .add_virtual(VirtualObject::string(":/bat/energy_now", "41000000\n"))
            .add_virtual(VirtualObject::string(":/bat/status", "Charging\n"))
            .add_virtual(VirtualObject::string(":/bat/empty", ""))
            .add_virtual(VirtualObject::string(":/bat/multi", "one\ntwo\nthree\n"))
            .add_virtual(VirtualObject::string(":/bat/tab", "a\tb"))
            .add_virtual(VirtualObject::string(":/bat/secret", "s").with_flags(VoType::REQ_ROOT));
        b.register_class(
            Class::new("battery", ":/bat")
                .dir()
                .label("Battery")
                .dir_template("{status}, {energy_now}"),
        )
        .unwrap();
        b.register_class(
            Class::new("battery-attr", ":/bat/*")
                .glob()
                .attr(
                    AttrEntry::new("energy_now")
                        .label("Energy")
                        .format(|node, _| {
                            let uwh: f64 = node
                                .data()
                                .text()
                                .and_then(|t| t.trim().parse().ok())
                                .unwrap_or(0.0);
                            format!("{:.1} Wh", uwh / 1e6)
                        }),
                )
                .attr(AttrEntry::new("status")),
        )
        .unwrap();
        b.build().unwrap()
    }

    fn show(engine: &Engine, path: &str, flags: FormatFlags) -> String {
        let mut node = engine.resolve(path, None);
        engine.format(&mut node, flags)
    }

    #[test]
    fn test_generic_states() {
        let engine = engine();
        assert_eq!(show(&engine, ":/bat/missing", FormatFlags::empty()), "(Not found)");
        assert_eq!(show(&engine, ":/bat/empty", FormatFlags::empty()), "(Empty)");
        assert_eq!(show(&engine, ":/", FormatFlags::empty()), "(Node)");
        assert_eq!(show(&engine, ":/bat/status", FormatFlags::empty()), "Charging");
        assert_eq!(show(&engine, ":/bat/tab", FormatFlags::empty()), "a\\tb");
    }

    #[test]
    fn test_list_mode_is_one_line() {
        let engine = engine();
        assert_eq!(show(&engine, ":/bat/multi", FormatFlags::LIST), "one ...");
        assert_eq!(show(&engine, ":/bat/multi", FormatFlags::empty()), "one\ntwo\nthree");
    }

    #[test]
    fn test_attribute_formatter_and_raw() {
        let engine = engine();
        assert_eq!(show(&engine, ":/bat/energy_now", FormatFlags::empty()), "41.0 Wh");
        assert_eq!(show(&engine, ":/bat/energy_now", FormatFlags::RAW), "41000000");
    }

    #[test]
    fn test_dir_template() {
        let engine = engine();
        assert_eq!(show(&engine, ":/bat", FormatFlags::LIST), "Charging, 41.0 Wh");
    }

    #[test]
    fn test_template_ignores_names_outside_the_node() {
        let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
        b.add_virtual(VirtualObject::auto_dir(":/s"))
            .add_virtual(VirtualObject::string(":/s/x", "1"));
        b.register_class(Class::new("s", ":/s").dir().dir_template("[{.}|{..}|{x}]"))
            .unwrap();
        let engine = b.build().unwrap();
        assert_eq!(show(&engine, ":/s", FormatFlags::empty()), "[||1]");
    }

    #[test]
    fn test_linked_templates_stop_at_depth_limit() {
        let mut b = Engine::builder(EngineConfig::default().with_builtins(false));
        b.add_virtual(VirtualObject::auto_dir(":/a"))
            .add_virtual(VirtualObject::auto_dir(":/b"))
            .add_virtual(VirtualObject::symlink(":/a/b", ":/b"))
            .add_virtual(VirtualObject::symlink(":/b/a", ":/a"));
        b.register_class(Class::new("a", ":/a").dir().dir_template("{b}"))
            .unwrap();
        b.register_class(Class::new("b", ":/b").dir().dir_template("{a}"))
            .unwrap();
        let engine = b.build().unwrap();
        assert_eq!(show(&engine, ":/a", FormatFlags::empty()), "...");
    }

    #[test]
    fn test_labels() {
        let engine = engine();
        let node = engine.resolve(":/bat/energy_now", None);
        assert_eq!(engine.label(&node).as_deref(), Some("Energy"));
        let node = engine.resolve(":/bat", None);
        assert_eq!(engine.label(&node).as_deref(), Some("Battery"));
        let node = engine.resolve(":/bat/status", None);
        assert_eq!(engine.label(&node), None);
    }

    #[test]
    fn test_privileged_object_for_unprivileged_reader() {
        let engine = engine();
        let expected = if engine.is_privileged() { "s" } else { "(Permission denied)" };
        assert_eq!(show(&engine, ":/bat/secret", FormatFlags::empty()), expected);
    }

    #[test]
    fn test_truncate() {
        let long = "x".repeat(100);
        let cut = truncate(long, 10);
        assert_eq!(cut, "xxxxxxx...");
        assert_eq!(truncate("short".to_string(), 10), "short");
    }
}

//! Path helpers for the unified namespace.
//!
//! Real paths look like `/sys/class/net`. Virtual paths carry a leading
//! [`VIRTUAL_SIGIL`], e.g. `:/sysobj/elapsed`; everything after the sigil is
//! private to the engine and never handed to the OS.

use std::cmp::Ordering;

/// Leading character that marks a virtual path.
pub const VIRTUAL_SIGIL: char = ':';

/// Root of the virtual namespace.
pub const VIRTUAL_ROOT: &str = ":/";

/// Returns true if `path` addresses the virtual namespace.
pub fn is_virtual(path: &str) -> bool {
    path.starts_with(VIRTUAL_SIGIL)
}

/// Join `base` and an optional child `name` with a single separator.
pub fn join(base: &str, name: Option<&str>) -> String {
    match name {
        Some(name) if !name.is_empty() => {
            if base.is_empty() {
                name.to_string()
            } else if base.ends_with('/') {
                format!("{base}{name}")
            } else {
                format!("{base}/{name}")
            }
        }
        _ => base.to_string(),
    }
}

/// Lexically normalize a path: collapse `//`, resolve `.` and `..`, trim a
/// trailing separator. The filesystem is never consulted.
///
/// `..` never climbs above `/` in an absolute path; in a relative path
/// leading `..` segments are kept.
pub fn normalize(path: &str) -> String {
    if let Some(rest) = path.strip_prefix(VIRTUAL_SIGIL) {
        let rest = if rest.is_empty() { "/" } else { rest };
        return format!("{VIRTUAL_SIGIL}{}", normalize_plain(rest));
    }
    normalize_plain(path)
}

fn normalize_plain(path: &str) -> String {
    let absolute = path.starts_with('/');
    let mut parts: Vec<&str> = Vec::new();
    for part in path.split('/') {
        match part {
            "" | "." => {}
            ".." => match parts.last() {
                Some(&last) if last != ".." => {
                    parts.pop();
                }
                _ if absolute => {}
                _ => parts.push(".."),
            },
            part => parts.push(part),
        }
    }
    let joined = parts.join("/");
    if absolute {
        format!("/{joined}")
    } else if joined.is_empty() {
        ".".to_string()
    } else {
        joined
    }
}

/// Last component of a normalized path. The root has an empty name.
pub fn name(path: &str) -> &str {
    match path.rfind('/') {
        Some(idx) => &path[idx + 1..],
        None => path.trim_start_matches(VIRTUAL_SIGIL),
    }
}

/// Parent of a normalized path, or `None` at a root.
pub fn parent(path: &str) -> Option<String> {
    let idx = path.rfind('/')?;
    if idx + 1 == path.len() {
        // "/" or ":/"
        return None;
    }
    let head = &path[..idx];
    if head.is_empty() || head == ":" {
        Some(format!("{head}/"))
    } else {
        Some(head.to_string())
    }
}

/// True if `path` is `prefix` itself or lies below it, component-wise.
pub fn is_within(path: &str, prefix: &str) -> bool {
    if path == prefix {
        return true;
    }
    if prefix.ends_with('/') {
        return path.starts_with(prefix);
    }
    path.len() > prefix.len()
        && path.starts_with(prefix)
        && path.as_bytes()[prefix.len()] == b'/'
}

/// True if `name` is `label` followed by one or more decimal digits
/// (`cpu3`, `hwmon12`).
pub fn is_label_number(name: &str, label: &str) -> bool {
    match name.strip_prefix(label) {
        Some(rest) => !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()),
        None => false,
    }
}

/// Order names so embedded numbers compare by value: `name9` sorts before
/// `name10` and `name4part6` before `name4part14`.
pub fn natural_cmp(a: &str, b: &str) -> Ordering {
    let (a, b) = (a.as_bytes(), b.as_bytes());
    let (mut i, mut j) = (0, 0);
    while i < a.len() && j < b.len() {
        if a[i].is_ascii_digit() && b[j].is_ascii_digit() {
            let (si, sj) = (i, j);
            while i < a.len() && a[i].is_ascii_digit() {
                i += 1;
            }
            while j < b.len() && b[j].is_ascii_digit() {
                j += 1;
            }
            let na = trim_zeros(&a[si..i]);
            let nb = trim_zeros(&b[sj..j]);
            let ord = na
                .len()
                .cmp(&nb.len())
                .then_with(|| na.cmp(nb))
                // equal value: fewer leading zeros first
                .then_with(|| (i - si).cmp(&(j - sj)));
            if ord != Ordering::Equal {
                return ord;
            }
        } else {
            let ord = a[i].cmp(&b[j]);
            if ord != Ordering::Equal {
                return ord;
            }
            i += 1;
            j += 1;
        }
    }
    (a.len() - i).cmp(&(b.len() - j))
}

fn trim_zeros(digits: &[u8]) -> &[u8] {
    let start = digits.iter().position(|&d| d != b'0').unwrap_or(digits.len());
    &digits[start..]
}

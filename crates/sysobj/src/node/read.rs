//! Reading node data and deciding when it is stale.

use std::io;

use super::Node;
use crate::class::UpdateInterval;
use crate::engine::Engine;
use crate::vo::VoType;

impl Engine {
    /// Refresh `node`'s data. Returns true if new data was stored.
    ///
    /// Missing nodes, directories and write-only nodes are never read. Fresh
    /// data is kept unless `force` is set.
    pub fn read(&self, node: &mut Node, force: bool) -> bool {
        if !node.exists || node.is_dir || node.write_only {
            return false;
        }
        if !force && !self.is_stale(node) {
            return false;
        }
        if node.is_virtual {
            self.read_virtual(node)
        } else {
            self.read_real(node)
        }
    }

    fn read_virtual(&self, node: &mut Node) -> bool {
        if node.vo_kind.contains(VoType::REQ_ROOT) && !self.privileged {
            node.access_denied = true;
            node.data.clear();
            return false;
        }
        match self.vo.read().get_data(&node.path) {
            Some(value) => {
                node.access_denied = false;
                node.data.store(value.into_bytes());
                true
            }
            None => {
                node.data.clear();
                false
            }
        }
    }

    fn read_real(&self, node: &mut Node) -> bool {
        let Some(fs_path) = node.fs_path.as_deref() else {
            return false;
        };
        match self.view_of(node).read(fs_path, self.config.max_read_bytes) {
            Ok(bytes) => {
                node.access_denied = false;
                node.data.store(bytes);
                true
            }
            Err(err) => {
                if err.kind() == io::ErrorKind::PermissionDenied {
                    node.access_denied = true;
                } else {
                    tracing::debug!(path = %node.path, %err, "read failed");
                }
                node.data.clear();
                false
            }
        }
    }

    /// The update interval that applies to `node`.
    ///
    /// Precedence: the class's attribute row, the class's interval function,
    /// the class's static interval, then `Never` for constant virtual
    /// objects. `Unspecified` means the engine default applies.
    pub fn update_interval(&self, node: &Node) -> UpdateInterval {
        if let Some(class) = self.class_of(node) {
            if let Some(interval) = class.attribute(node.name()).and_then(|a| a.update) {
                return interval;
            }
            if let Some(f) = &class.update_fn {
                return f(node);
            }
            if class.update != UpdateInterval::Unspecified {
                return class.update;
            }
        }
        if node.vo_kind.contains(VoType::CONST) {
            return UpdateInterval::Never;
        }
        UpdateInterval::Unspecified
    }

    /// True if `node` has never been read or its data has outlived its
    /// update interval.
    pub fn is_stale(&self, node: &Node) -> bool {
        let Some(age) = node.data.age() else {
            return true;
        };
        match self.update_interval(node) {
            UpdateInterval::Never => false,
            UpdateInterval::Every(interval) => age >= interval,
            UpdateInterval::Unspecified => age >= self.config.default_update_interval(),
        }
    }
}

//! Objects and classes every engine starts with.
//!
//! ```text
//! :/                  auto dir
//! :/sysobj            auto dir
//! :/sysobj/version    crate version
//! :/sysobj/elapsed    seconds since the engine was built
//! :/sysobj/classes    one "tag<TAB>pattern" line per class
//! :/sys  -> /sys
//! :/proc -> /proc
//! ```

use std::time::Instant;

use crate::class::{Class, ClassTable, UpdateInterval};
use crate::error::Result;
use crate::path::VIRTUAL_ROOT;
use crate::vo::{VirtualObject, VirtualRegistry, VoType};

pub const SYSOBJ_DIR: &str = ":/sysobj";
pub const VERSION_PATH: &str = ":/sysobj/version";
pub const ELAPSED_PATH: &str = ":/sysobj/elapsed";
pub const CLASSES_PATH: &str = ":/sysobj/classes";

pub(crate) fn register_classes(table: &mut ClassTable) -> Result<()> {
    table.register(
        Class::new("sysobj:internal", ":/sysobj/*")
            .glob()
            .blast()
            .label("sysobj internal value"),
    )?;
    table.register(
        Class::new("sysobj:version", VERSION_PATH)
            .not_dir()
            .label("sysobj version")
            .update(UpdateInterval::Never),
    )?;
    table.register(
        Class::new("sysobj:elapsed", ELAPSED_PATH)
            .not_dir()
            .label("Time since start")
            .update(UpdateInterval::secs(0.1))
            .format(|node, _| {
                let secs: f64 = node
                    .data()
                    .text()
                    .and_then(|t| t.trim().parse().ok())
                    .unwrap_or_default();
                format!("{secs:.1} seconds")
            }),
    )?;
    Ok(())
}

pub(crate) fn register_objects(vo: &mut VirtualRegistry, classes: &ClassTable, started: Instant) {
    vo.add(VirtualObject::auto_dir(VIRTUAL_ROOT));
    vo.add(VirtualObject::auto_dir(SYSOBJ_DIR));
    vo.add(VirtualObject::constant(VERSION_PATH, env!("CARGO_PKG_VERSION")));
    vo.add(VirtualObject::callback(ELAPSED_PATH, VoType::STRING, move |path| {
        path.map(|_| format!("{:.3}", started.elapsed().as_secs_f64()))
    }));

    let listing: Vec<String> = classes
        .iter()
        .map(|(_, c)| format!("{}\t{}", c.tag(), c.pattern()))
        .collect();
    vo.add(VirtualObject::constant(CLASSES_PATH, listing.join("\n")));

    vo.add(VirtualObject::autolink(":/sys", "/sys"));
    vo.add(VirtualObject::autolink(":/proc", "/proc"));
}

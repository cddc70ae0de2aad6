//! # sysobj
//!
//! A typed object tree over the kernel's pseudo-filesystems.
//!
//! `/sys` and `/proc` are huge, irregular and full of symlinks. sysobj puts
//! them and a tree of virtual objects (`:/...`) behind one namespace:
//! - Paths resolve to [`Node`]s that know where they really live, whether
//!   they exist and what their data looks like
//! - Registered [`Class`]es give nodes a type: a label, a formatter, an
//!   update interval, a value ordering
//! - [`crawl::foreach`] walks the tree with a pool of threads
//! - [`PinList`] polls chosen nodes and keeps a min/max history
//!
//! An alternate root lets the same code run against a captured snapshot
//! instead of the live system.
//!
//! ```no_run
//! use sysobj::{Engine, EngineConfig, FormatFlags};
//!
//! let engine = Engine::new(EngineConfig::default())?;
//! let mut node = engine.resolve(":/sysobj/elapsed", None);
//! println!("{}", engine.format(&mut node, FormatFlags::empty()));
//! # Ok::<(), sysobj::SysobjError>(())
//! ```

pub mod builtins;
pub mod class;
pub mod config;
pub mod crawl;
pub mod engine;
pub mod error;
pub mod filter;
pub mod node;
pub mod path;
pub mod pattern;
pub mod pin;
mod real;
pub mod vo;

pub use class::{
    AttrEntry, Class, ClassFlags, ClassId, ClassTable, CompareFn, FormatFlags, UpdateInterval,
};
pub use config::{CrawlConfig, EngineConfig, PinConfig};
pub use crawl::{CrawlOptions, CrawlReport, CrawlStats, EndReason};
pub use engine::{Engine, EngineBuilder, MAX_SYMLINK_HOPS, ResolveMode, SANDBOX_SENTINEL};
pub use error::{Result, SysobjError};
pub use filter::{FilterKind, FilterRule};
pub use node::{Classification, Node, NodeData, Permissions};
pub use pin::{HistoryMode, Pin, PinList, Sample};
pub use vo::{VirtualObject, VirtualRegistry, VoType};

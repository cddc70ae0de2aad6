//! Glob include/exclude filter chains.
//!
//! Unlike rsync-style first-match-wins filters, every rule in a chain is
//! evaluated in order against one "marked for removal" flag:
//!
//! | Kind          | On match        | On miss        |
//! |---------------|-----------------|----------------|
//! | `Exclude`     | mark            | unchanged      |
//! | `Include`     | unmark          | unchanged      |
//! | `ExcludeIff`  | mark            | unmark         |
//! | `IncludeIff`  | unmark          | mark           |
//!
//! An item is kept if it ends unmarked; an empty chain keeps everything.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::error::{Result, SysobjError};
use crate::pattern::LazyPattern;

/// How a rule moves the "marked for removal" flag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display, EnumString)]
#[strum(serialize_all = "kebab-case")]
pub enum FilterKind {
    /// Mark on match; never clears.
    Exclude,
    /// Clear on match; never marks.
    Include,
    /// Mark exactly when matched.
    ExcludeIff,
    /// Clear exactly when matched.
    IncludeIff,
}

impl FilterKind {
    fn prefix(self) -> &'static str {
        match self {
            FilterKind::Exclude => "-",
            FilterKind::Include => "+",
            FilterKind::ExcludeIff => "-!",
            FilterKind::IncludeIff => "+!",
        }
    }

    fn apply(self, marked: bool, matched: bool) -> bool {
        match self {
            FilterKind::Exclude => marked || matched,
            FilterKind::Include => marked && !matched,
            FilterKind::ExcludeIff => matched,
            FilterKind::IncludeIff => !matched,
        }
    }
}

/// One rule in a filter chain. Immutable once built.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct FilterRule {
    kind: FilterKind,
    pattern: LazyPattern,
}

impl FilterRule {
    /// Create a rule.
    pub fn new(kind: FilterKind, pattern: impl Into<String>) -> Self {
        Self {
            kind,
            pattern: LazyPattern::new(pattern),
        }
    }

    /// Shorthand for an `Exclude` rule.
    pub fn exclude(pattern: impl Into<String>) -> Self {
        Self::new(FilterKind::Exclude, pattern)
    }

    /// Shorthand for an `Include` rule.
    pub fn include(pattern: impl Into<String>) -> Self {
        Self::new(FilterKind::Include, pattern)
    }

    /// Shorthand for an `ExcludeIff` rule.
    pub fn exclude_iff(pattern: impl Into<String>) -> Self {
        Self::new(FilterKind::ExcludeIff, pattern)
    }

    /// Shorthand for an `IncludeIff` rule.
    pub fn include_iff(pattern: impl Into<String>) -> Self {
        Self::new(FilterKind::IncludeIff, pattern)
    }

    /// The rule kind.
    pub fn kind(&self) -> FilterKind {
        self.kind
    }

    /// The glob pattern as written.
    pub fn pattern(&self) -> &str {
        self.pattern.as_str()
    }

    /// Whether the pattern has been compiled yet.
    pub fn is_compiled(&self) -> bool {
        self.pattern.is_compiled()
    }

    /// Match `item` against this rule's pattern.
    pub fn matches(&self, item: &str) -> bool {
        self.pattern.matches(item)
    }
}

/// Parses `-glob`, `+glob`, `-!glob` and `+!glob`.
impl FromStr for FilterRule {
    type Err = SysobjError;

    fn from_str(s: &str) -> Result<Self> {
        let (kind, pattern) = if let Some(p) = s.strip_prefix("-!") {
            (FilterKind::ExcludeIff, p)
        } else if let Some(p) = s.strip_prefix("+!") {
            (FilterKind::IncludeIff, p)
        } else if let Some(p) = s.strip_prefix('-') {
            (FilterKind::Exclude, p)
        } else if let Some(p) = s.strip_prefix('+') {
            (FilterKind::Include, p)
        } else {
            return Err(SysobjError::invalid_filter(s));
        };
        if pattern.is_empty() {
            return Err(SysobjError::invalid_filter(s));
        }
        Ok(Self::new(kind, pattern))
    }
}

impl TryFrom<String> for FilterRule {
    type Error = SysobjError;

    fn try_from(s: String) -> Result<Self> {
        s.parse()
    }
}

impl From<FilterRule> for String {
    fn from(rule: FilterRule) -> Self {
        rule.to_string()
    }
}

impl fmt::Display for FilterRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}{}", self.kind.prefix(), self.pattern.as_str())
    }
}

/// Returns true if `item` survives the rule chain.
pub fn include(item: &str, rules: &[FilterRule]) -> bool {
    let marked = rules
        .iter()
        .fold(false, |marked, rule| rule.kind.apply(marked, rule.matches(item)));
    !marked
}

/// Apply a rule chain to a whole list, keeping survivors in their original
/// order.
///
/// Rules are applied one at a time across all items, so each pattern is
/// compiled at most once, and not at all when the list is empty.
pub fn filter_list(items: Vec<String>, rules: &[FilterRule]) -> Vec<String> {
    if rules.is_empty() || items.is_empty() {
        return items;
    }
    let mut marked = vec![false; items.len()];
    for rule in rules {
        for (item, mark) in items.iter().zip(marked.iter_mut()) {
            *mark = rule.kind.apply(*mark, rule.matches(item));
        }
    }
    items
        .into_iter()
        .zip(marked)
        .filter_map(|(item, marked)| (!marked).then_some(item))
        .collect()
}

/// Parse a list of rule strings, failing on the first bad one.
pub fn parse_rules<I, S>(specs: I) -> Result<Vec<FilterRule>>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    specs.into_iter().map(|s| s.as_ref().parse()).collect()
}

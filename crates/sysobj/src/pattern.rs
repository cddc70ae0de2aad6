//! Glob patterns compiled on first use.
//!
//! Classes and filter rules carry their pattern as a string and only pay for
//! compilation the first time something is matched against them. `*` crosses
//! `/` so `"/sys/*/power"` matches at any depth, the same way shell `case`
//! patterns do.

use std::fmt;
use std::sync::OnceLock;

use glob::{MatchOptions, Pattern};

const MATCH_OPTIONS: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: false,
    require_literal_leading_dot: false,
};

/// A glob pattern that compiles itself once, on first match.
///
/// A pattern that fails to compile degrades to exact string comparison and
/// logs a warning once.
#[derive(Clone)]
pub struct LazyPattern {
    raw: String,
    compiled: OnceLock<Option<Pattern>>,
}

impl LazyPattern {
    /// Wrap a pattern string without compiling it.
    pub fn new(raw: impl Into<String>) -> Self {
        Self {
            raw: raw.into(),
            compiled: OnceLock::new(),
        }
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// True once the pattern has been compiled (successfully or not).
    pub fn is_compiled(&self) -> bool {
        self.compiled.get().is_some()
    }

    /// Match the whole of `input` against the pattern.
    pub fn matches(&self, input: &str) -> bool {
        match self.compiled() {
            Some(pattern) => pattern.matches_with(input, MATCH_OPTIONS),
            None => self.raw == input,
        }
    }

    fn compiled(&self) -> Option<&Pattern> {
        self.compiled
            .get_or_init(|| match Pattern::new(&self.raw) {
                Ok(pattern) => Some(pattern),
                Err(err) => {
                    tracing::warn!(pattern = %self.raw, %err, "bad glob, using literal match");
                    None
                }
            })
            .as_ref()
    }
}

impl fmt::Debug for LazyPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyPattern")
            .field("raw", &self.raw)
            .field("compiled", &self.is_compiled())
            .finish()
    }
}

impl PartialEq for LazyPattern {
    fn eq(&self, other: &Self) -> bool {
        self.raw == other.raw
    }
}

impl Eq for LazyPattern {}

impl From<&str> for LazyPattern {
    fn from(raw: &str) -> Self {
        Self::new(raw)
    }
}

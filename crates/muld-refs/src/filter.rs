//! Include/exclude ref filters.
//!
//! Patterns are shell globs matched against the full ref name. `*` and `?`
//! never cross a `/`, `**` as a whole component spans any number of them,
//! and `[...]` is a character class.
//!
//! A ref is selected when it matches at least one include pattern (an empty
//! include list selects everything) and no exclude pattern.

use std::fmt;

use glob::{MatchOptions, Pattern};

use crate::error::{RefError, Result};

const REF_MATCH: MatchOptions = MatchOptions {
    case_sensitive: true,
    require_literal_separator: true,
    require_literal_leading_dot: false,
};

/// A compiled glob pattern over ref names.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RefPattern(Pattern);

impl RefPattern {
    /// Compile a pattern.
    pub fn new(pattern: &str) -> Result<Self> {
        let fail = |reason: String| RefError::InvalidPattern {
            pattern: pattern.to_string(),
            reason,
        };
        if pattern.trim().is_empty() {
            return Err(fail("pattern must not be empty".into()));
        }
        Pattern::new(pattern)
            .map(Self)
            .map_err(|e| fail(format!("{} at offset {}", e.msg, e.pos)))
    }

    /// The pattern as written.
    pub fn as_str(&self) -> &str {
        self.0.as_str()
    }

    /// Whether `name` matches the whole pattern.
    pub fn matches(&self, name: &str) -> bool {
        self.0.matches_with(name, REF_MATCH)
    }
}

impl fmt::Display for RefPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Selection of refs to mirror.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct RefFilter {
    include: Vec<RefPattern>,
    exclude: Vec<RefPattern>,
}

impl RefFilter {
    /// Compile include and exclude pattern lists.
    pub fn new<S: AsRef<str>>(include: &[S], exclude: &[S]) -> Result<Self> {
        Ok(Self {
            include: include
                .iter()
                .map(|p| RefPattern::new(p.as_ref()))
                .collect::<Result<_>>()?,
            exclude: exclude
                .iter()
                .map(|p| RefPattern::new(p.as_ref()))
                .collect::<Result<_>>()?,
        })
    }

    /// A filter selecting every ref.
    pub fn all() -> Self {
        Self::default()
    }

    /// Whether the ref is selected for mirroring.
    pub fn matches(&self, name: &str) -> bool {
        let included = self.include.is_empty() || self.include.iter().any(|p| p.matches(name));
        included && !self.exclude.iter().any(|p| p.matches(name))
    }

    pub fn include(&self) -> &[RefPattern] {
        &self.include
    }

    pub fn exclude(&self) -> &[RefPattern] {
        &self.exclude
    }
}

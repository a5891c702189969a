//! Glob-style name matching.
//!
//! # Design Decisions
//! - `*` is the only wildcard and becomes `.*`
//! - Everything else is matched literally
//! - Patterns are anchored (`^...$`) and case-sensitive

use regex::Regex;

/// Translate a glob pattern into an anchored regex.
fn glob_to_regex(pattern: &str) -> Option<Regex> {
    let body = pattern
        .split('*')
        .map(regex::escape)
        .collect::<Vec<_>>()
        .join(".*");
    match Regex::new(&format!("^{}$", body)) {
        Ok(re) => Some(re),
        Err(e) => {
            tracing::warn!(pattern, error = %e, "Ignoring invalid name pattern");
            None
        }
    }
}

/// A compiled list of glob patterns.
#[derive(Debug, Clone, Default)]
pub struct GlobSet {
    patterns: Vec<Regex>,
}

impl GlobSet {
    pub fn new<S: AsRef<str>>(patterns: &[S]) -> Self {
        Self {
            patterns: patterns
                .iter()
                .filter_map(|p| glob_to_regex(p.as_ref()))
                .collect(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.patterns.is_empty()
    }

    /// True if any pattern matches the whole name.
    pub fn matches(&self, name: &str) -> bool {
        self.patterns.iter().any(|re| re.is_match(name))
    }
}

/// True if `name` matches any of `patterns`.
pub fn match_rule<S: AsRef<str>>(name: &str, patterns: &[S]) -> bool {
    GlobSet::new(patterns).matches(name)
}

//! Material filters
//!
//! A filter is a list of ant-style patterns naming files whose changes should
//! not trigger a pipeline. `**` crosses directories, `*` and `?` stay inside a
//! single path segment.

use std::hash::{Hash, Hasher};

use regex::Regex;
use serde::{Deserialize, Serialize};

/// One ignore pattern
///
/// The pattern is compiled once on construction. A pattern that cannot be
/// compiled is logged once and matches nothing.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct IgnoredFiles {
    pattern: String,
    regex: Option<Regex>,
}

impl IgnoredFiles {
    pub fn new(pattern: impl Into<String>) -> Self {
        let pattern = pattern.into();
        let regex = match Regex::new(&to_regex(&pattern)) {
            Ok(regex) => Some(regex),
            Err(err) => {
                tracing::warn!("Ignoring unusable filter pattern '{}': {}", pattern, err);
                None
            }
        };

        Self { pattern, regex }
    }

    pub fn pattern(&self) -> &str {
        &self.pattern
    }

    /// Whether the pattern compiled
    pub fn is_usable(&self) -> bool {
        self.regex.is_some()
    }

    /// Whether the given file path is covered by this pattern
    pub fn matches(&self, file_name: &str) -> bool {
        let Some(regex) = &self.regex else {
            return false;
        };

        let file_name = file_name.replace('\\', "/");
        regex.is_match(file_name.trim_start_matches('/'))
    }
}

impl PartialEq for IgnoredFiles {
    fn eq(&self, other: &Self) -> bool {
        self.pattern == other.pattern
    }
}

impl Eq for IgnoredFiles {}

impl Hash for IgnoredFiles {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.pattern.hash(state);
    }
}

impl From<String> for IgnoredFiles {
    fn from(pattern: String) -> Self {
        Self::new(pattern)
    }
}

impl From<IgnoredFiles> for String {
    fn from(ignored: IgnoredFiles) -> Self {
        ignored.pattern
    }
}

/// Ordered set of ignore patterns attached to an SCM material
#[derive(Debug, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Filter {
    ignored: Vec<IgnoredFiles>,
}

impl Filter {
    pub fn new(ignored: Vec<IgnoredFiles>) -> Self {
        Self { ignored }
    }

    pub const fn empty() -> Self {
        Self {
            ignored: Vec::new(),
        }
    }

    /// Convenience constructor from raw patterns
    pub fn from_patterns<I, S>(patterns: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(patterns.into_iter().map(IgnoredFiles::new).collect())
    }

    pub fn is_empty(&self) -> bool {
        self.ignored.is_empty()
    }

    /// An empty filter never ignores anything
    pub fn should_never_ignore(&self) -> bool {
        self.is_empty()
    }

    pub fn patterns(&self) -> impl Iterator<Item = &str> {
        self.ignored.iter().map(IgnoredFiles::pattern)
    }

    /// Whether any pattern covers the given path
    pub fn matches(&self, file_name: &str) -> bool {
        self.ignored.iter().any(|ignored| ignored.matches(file_name))
    }
}

// =============================================================================
// Pattern Translation
// =============================================================================

fn to_regex(pattern: &str) -> String {
    let pattern = pattern.trim().replace('\\', "/");
    let pattern = pattern.trim_start_matches('/');

    let mut regex = String::from("^");
    let mut rest = pattern;

    while let Some(c) = rest.chars().next() {
        if let Some(tail) = rest.strip_prefix("**/") {
            regex.push_str("(?:[^/]*/)*");
            rest = tail;
        } else if let Some(tail) = rest.strip_prefix("**") {
            regex.push_str(".*");
            rest = tail;
        } else {
            match c {
                '*' => regex.push_str("[^/]*"),
                '?' => regex.push_str("[^/]"),
                other => regex.push_str(&regex::escape(&other.to_string())),
            }
            rest = &rest[c.len_utf8()..];
        }
    }

    regex.push('$');
    regex
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_pattern_matches_exact_file() {
        let ignored = IgnoredFiles::new("phigar");
        assert!(ignored.matches("phigar"));
        assert!(!ignored.matches("Silly"));
        assert!(!ignored.matches("dir/phigar"));
    }

    #[test]
    fn test_single_star_stays_in_segment() {
        let ignored = IgnoredFiles::new("*.html");
        assert!(ignored.matches("index.html"));
        assert!(!ignored.matches("docs/index.html"));
    }

    #[test]
    fn test_double_star_crosses_directories() {
        let ignored = IgnoredFiles::new("**/*.html");
        assert!(ignored.matches("index.html"));
        assert!(ignored.matches("docs/api/index.html"));
        assert!(!ignored.matches("docs/api/index.htm"));

        let ignored = IgnoredFiles::new("docs/**");
        assert!(ignored.matches("docs/a/b/c.txt"));
        assert!(!ignored.matches("src/docs.rs"));
    }

    #[test]
    fn test_separators_and_leading_slash_are_normalized() {
        let ignored = IgnoredFiles::new("/docs\\*.md");
        assert!(ignored.matches("docs/readme.md"));
        assert!(ignored.matches("\\docs\\readme.md"));
    }

    #[test]
    fn test_regex_metacharacters_are_literal() {
        let ignored = IgnoredFiles::new("a+b(c).txt");
        assert!(ignored.matches("a+b(c).txt"));
        assert!(!ignored.matches("aab(c)xtxt"));
    }

    #[test]
    fn test_question_mark_matches_one_char() {
        let ignored = IgnoredFiles::new("file?.log");
        assert!(ignored.matches("file1.log"));
        assert!(!ignored.matches("file12.log"));
    }

    #[test]
    fn test_deserialized_pattern_is_compiled() {
        let ignored: IgnoredFiles = serde_json::from_str(r#""docs/**""#).unwrap();

        assert!(ignored.is_usable());
        assert!(ignored.matches("docs/a/b.md"));
        assert_eq!(ignored, IgnoredFiles::new("docs/**"));
        assert_eq!(serde_json::to_string(&ignored).unwrap(), r#""docs/**""#);
    }

    #[test]
    fn test_empty_filter_never_ignores() {
        let filter = Filter::default();
        assert!(filter.should_never_ignore());
        assert!(!filter.matches("anything"));

        let filter = Filter::from_patterns(["foo", "bar/**"]);
        assert!(!filter.should_never_ignore());
        assert!(filter.matches("foo"));
        assert!(filter.matches("bar/baz"));
        assert_eq!(filter.patterns().collect::<Vec<_>>(), vec!["foo", "bar/**"]);
    }
}

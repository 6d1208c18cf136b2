//! Exclusion rules applied to directory entries during a scan.
//!
//! Three name-matching strategies are supported: exact names (case-sensitive),
//! prefixes and suffixes (both case-insensitive). A size ceiling applies to
//! regular files only and is checked separately by the walker.

use std::collections::HashSet;
use std::fmt;

/// Name and size rules deciding which entries are left out of a backup
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExclusionRules {
    exact: HashSet<String>,
    // Stored lower-cased
    prefixes: Vec<String>,
    suffixes: Vec<String>,
    max_size: u64,
}

/// Why an entry was excluded
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExclusionReason {
    /// The entry name equals an exact-exclude rule
    Exact(String),
    /// The entry name starts with an excluded prefix
    Prefix(String),
    /// The entry name ends with an excluded suffix
    Suffix(String),
    /// The file is larger than the configured ceiling
    TooLarge { size: u64, max_size: u64 },
}

impl fmt::Display for ExclusionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ExclusionReason::Exact(name) => write!(f, "matched exclude list: {}", name),
            ExclusionReason::Prefix(prefix) => write!(f, "matched exclude prefix: {}", prefix),
            ExclusionReason::Suffix(suffix) => write!(f, "matched exclude suffix: {}", suffix),
            ExclusionReason::TooLarge { size, max_size } => write!(
                f,
                "size {} bytes exceeds max size: {} bytes",
                size, max_size
            ),
        }
    }
}

impl ExclusionRules {
    /// Build a rule set. Blank rules are dropped, since an empty prefix or
    /// suffix would match every entry.
    pub fn new<I, P, S>(exact: I, prefixes: P, suffixes: S, max_size: u64) -> Self
    where
        I: IntoIterator,
        I::Item: Into<String>,
        P: IntoIterator,
        P::Item: AsRef<str>,
        S: IntoIterator,
        S::Item: AsRef<str>,
    {
        Self {
            exact: exact
                .into_iter()
                .map(Into::into)
                .filter(|s: &String| !s.is_empty())
                .collect(),
            prefixes: lowercase_rules(prefixes),
            suffixes: lowercase_rules(suffixes),
            max_size,
        }
    }

    /// Maximum file size in bytes, 0 meaning unlimited
    pub fn max_size(&self) -> u64 {
        self.max_size
    }

    /// Check an entry name against the name rules.
    ///
    /// Returns the first matching reason, trying exact names, then prefixes,
    /// then suffixes.
    pub fn should_exclude(&self, name: &str) -> Option<ExclusionReason> {
        if self.exact.contains(name) {
            return Some(ExclusionReason::Exact(name.to_string()));
        }

        let lowered = name.to_lowercase();

        if let Some(prefix) = self.prefixes.iter().find(|p| lowered.starts_with(p.as_str())) {
            return Some(ExclusionReason::Prefix(prefix.clone()));
        }

        self.suffixes
            .iter()
            .find(|s| lowered.ends_with(s.as_str()))
            .map(|s| ExclusionReason::Suffix(s.clone()))
    }

    /// Whether a regular file of `size` bytes is over the ceiling
    pub fn exceeds_max_size(&self, size: u64) -> bool {
        self.max_size > 0 && size > self.max_size
    }

    /// Size check wrapped as an exclusion reason
    pub fn check_size(&self, size: u64) -> Option<ExclusionReason> {
        self.exceeds_max_size(size).then(|| ExclusionReason::TooLarge {
            size,
            max_size: self.max_size,
        })
    }
}

fn lowercase_rules<I>(rules: I) -> Vec<String>
where
    I: IntoIterator,
    I::Item: AsRef<str>,
{
    rules
        .into_iter()
        .map(|r| r.as_ref().to_lowercase())
        .filter(|r| !r.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rules(exact: &[&str], prefixes: &[&str], suffixes: &[&str], max_size: u64) -> ExclusionRules {
        ExclusionRules::new(
            exact.iter().copied(),
            prefixes.iter().copied(),
            suffixes.iter().copied(),
            max_size,
        )
    }

    #[test]
    fn test_exact_match_is_case_sensitive() {
        let upper = rules(&["Secret"], &[], &[], 0);
        assert_eq!(
            upper.should_exclude("Secret"),
            Some(ExclusionReason::Exact("Secret".to_string()))
        );

        let lower = rules(&["secret"], &[], &[], 0);
        assert_eq!(lower.should_exclude("Secret"), None);
    }

    #[test]
    fn test_suffix_match_ignores_case() {
        let rules = rules(&[], &[], &[".log"], 0);
        assert_eq!(
            rules.should_exclude("SECRET.LOG"),
            Some(ExclusionReason::Suffix(".log".to_string()))
        );
        assert_eq!(rules.should_exclude("catalog"), None);
    }

    #[test]
    fn test_prefix_match_ignores_case() {
        let rules = rules(&[], &[".Cache"], &[], 0);
        assert!(rules.should_exclude(".cache").is_some());
        assert!(rules.should_exclude(".CACHE-old").is_some());
        assert!(rules.should_exclude("cache").is_none());
    }

    #[test]
    fn test_exact_takes_precedence() {
        let rules = rules(&["tmp.tmp"], &["tmp"], &[".tmp"], 0);
        assert_eq!(
            rules.should_exclude("tmp.tmp"),
            Some(ExclusionReason::Exact("tmp.tmp".to_string()))
        );
        assert_eq!(
            rules.should_exclude("TMP.TMP"),
            Some(ExclusionReason::Prefix("tmp".to_string()))
        );
    }

    #[test]
    fn test_blank_rules_are_ignored() {
        let rules = rules(&[""], &[""], &[""], 0);
        assert_eq!(rules.should_exclude("anything"), None);
        assert_eq!(rules, ExclusionRules::default());
    }

    #[test]
    fn test_size_ceiling() {
        let unlimited = rules(&[], &[], &[], 0);
        assert!(!unlimited.exceeds_max_size(u64::MAX));

        let limited = rules(&[], &[], &[], 1024);
        assert!(!limited.exceeds_max_size(1024));
        assert!(limited.exceeds_max_size(1025));
        assert_eq!(
            limited.check_size(2048),
            Some(ExclusionReason::TooLarge {
                size: 2048,
                max_size: 1024
            })
        );
    }

    #[test]
    fn test_reason_display() {
        let reason = ExclusionReason::Suffix(".tmp".to_string());
        assert_eq!(reason.to_string(), "matched exclude suffix: .tmp");
    }
}

//! Compiled `@include` / `@exclude` / `@match` entries

use std::fmt;

use fancy_regex::Regex;
use gm_core::{Glob, ParseError, UrlPattern};
use url::Url;

/// Metadata key a rule was declared under.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RuleKind {
    Include,
    Exclude,
    Match,
}

impl RuleKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Include => "include",
            Self::Exclude => "exclude",
            Self::Match => "match",
        }
    }
}

impl fmt::Display for RuleKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Why a rule could not be compiled.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum RuleError {
    #[error("invalid match pattern: {0}")]
    Pattern(#[from] ParseError),
    #[error("invalid regular expression: {0}")]
    Regex(String),
}

/// A single URL rule from script metadata.
#[derive(Debug, Clone)]
pub enum UrlRule {
    /// `scheme://host/path` match pattern
    Pattern(UrlPattern),
    /// Greasemonkey-style glob over the whole URL
    Glob(Glob),
    /// `/…/` regular expression, case-insensitive, unanchored
    Regex(Regex),
}

impl UrlRule {
    /// Compile a rule value declared under `kind`.
    ///
    /// `/…/` values are regular expressions. `@match` values must be valid
    /// match patterns; `@include` and `@exclude` values that are not fall
    /// back to a whole-URL glob.
    pub fn compile(kind: RuleKind, value: &str) -> Result<Self, RuleError> {
        if let Some(body) = regex_body(value) {
            return Regex::new(&format!("(?i){}", body))
                .map(Self::Regex)
                .map_err(|e| RuleError::Regex(e.to_string()));
        }

        match UrlPattern::parse(value) {
            Ok(pattern) => Ok(Self::Pattern(pattern)),
            Err(e) if kind == RuleKind::Match => Err(RuleError::Pattern(e)),
            Err(e) => {
                log::debug!("@{} {:?} is not a match pattern ({}), using it as a glob", kind, value, e);
                Ok(Self::Glob(Glob::new(value)))
            }
        }
    }

    /// Test a URL against this rule.
    pub fn test(&self, url: &Url) -> bool {
        match self {
            Self::Pattern(pattern) => pattern.matches(url),
            Self::Glob(glob) => glob.matches(url.as_str()),
            Self::Regex(regex) => match regex.is_match(url.as_str()) {
                Ok(matched) => matched,
                Err(e) => {
                    log::debug!("regex {} failed on {}: {}", regex.as_str(), url, e);
                    false
                }
            },
        }
    }

    /// The rule as written in the metadata block.
    pub fn source(&self) -> &str {
        match self {
            Self::Pattern(pattern) => pattern.as_str(),
            Self::Glob(glob) => glob.as_str(),
            // Strip the "(?i)" added at compile time
            Self::Regex(regex) => regex.as_str().trim_start_matches("(?i)"),
        }
    }
}

impl fmt::Display for UrlRule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Regex(_) => write!(f, "/{}/", self.source()),
            _ => f.write_str(self.source()),
        }
    }
}

fn regex_body(value: &str) -> Option<&str> {
    if value.len() >= 2 && value.starts_with('/') && value.ends_with('/') {
        Some(&value[1..value.len() - 1])
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn url(s: &str) -> Url {
        Url::parse(s).unwrap()
    }

    #[test]
    fn test_pattern_rule() {
        let rule = UrlRule::compile(RuleKind::Match, "http://*.trolol.com/*").unwrap();
        assert!(matches!(rule, UrlRule::Pattern(_)));
        assert!(rule.test(&url("http://trolol.com/")));
        assert!(!rule.test(&url("http://aaaaaaaaaa.com/")));
    }

    #[test]
    fn test_invalid_match_is_rejected() {
        let err = UrlRule::compile(RuleKind::Match, "http://trolol*").unwrap_err();
        assert_eq!(err, RuleError::Pattern(ParseError::InvalidHostWildcard));
    }

    #[test]
    fn test_invalid_include_falls_back_to_glob() {
        let rule = UrlRule::compile(RuleKind::Include, "http://trolol*").unwrap();
        assert!(matches!(rule, UrlRule::Glob(_)));
        assert!(rule.test(&url("http://trolol.com/")));
        assert!(!rule.test(&url("https://trolol.com/")));

        let rule = UrlRule::compile(RuleKind::Include, "*").unwrap();
        assert!(rule.test(&url("qute://settings")));
    }

    #[test]
    fn test_regex_rule_with_lookahead() {
        let rule = UrlRule::compile(
            RuleKind::Include,
            r"/^https?://((gist|guides|help|raw|status|developer)\.)?github\.com/((?!generated_pages\/preview).)*$/",
        )
        .unwrap();
        assert!(matches!(rule, UrlRule::Regex(_)));
        assert!(rule.test(&url("https://github.com/qutebrowser/qutebrowser/")));
        assert!(rule.test(&url("https://gist.github.com/foo")));
        assert!(!rule.test(&url("https://github.com/generated_pages/preview")));
        assert!(!rule.test(&url("http://aaaaaaaaaa.com/")));
    }

    #[test]
    fn test_regex_is_unanchored_and_case_insensitive() {
        let rule = UrlRule::compile(RuleKind::Exclude, r"/https?://github\.com/foo/").unwrap();
        assert!(rule.test(&url("http://GitHub.com/foo/bar")));
        assert!(!rule.test(&url("http://github.com/bar")));
    }

    #[test]
    fn test_invalid_regex() {
        let err = UrlRule::compile(RuleKind::Include, "/(unclosed/").unwrap_err();
        assert!(matches!(err, RuleError::Regex(_)));
    }

    #[test]
    fn test_display_keeps_source() {
        let rule = UrlRule::compile(RuleKind::Include, r"/foo\d+/").unwrap();
        assert_eq!(rule.to_string(), r"/foo\d+/");
        let rule = UrlRule::compile(RuleKind::Exclude, "https://badhost.xxx/*").unwrap();
        assert_eq!(rule.to_string(), "https://badhost.xxx/*");
    }
}

//! Pattern matching for expect operations

mod matcher;

pub use matcher::{Match, Matcher};

use crate::result::PatternError;
use matcher::{ExactMatcher, GlobMatcher, RegexMatcher};
use regex::bytes::Regex;

/// Pattern types for matching console output.
///
/// Patterns are always submitted as an ordered list. The automaton reports
/// the pattern whose match starts earliest in the unconsumed output; when two
/// patterns match at the same offset the one listed first wins. Drivers rely
/// on that to tell branches apart:
///
/// ```
/// use consolebench::Pattern;
///
/// // index 0: firmware missing, index 1: firmware present
/// let branches = [Pattern::exact("not found"), Pattern::exact("version 2")];
/// # let _ = branches;
/// ```
#[derive(Debug, Clone)]
pub enum Pattern {
    /// Literal text.
    Exact(String),

    /// Regular expression over the raw output bytes.
    Regex(Regex),

    /// Shell-style wildcard pattern (`*`, `?`, `[...]`), matched anywhere.
    Glob(String),

    /// Matches when the channel closes instead of failing with
    /// [`crate::ExpectError::EndOfStream`].
    Eof,

    /// Matches when the deadline expires instead of failing with
    /// [`crate::ExpectError::Timeout`].
    Timeout,
}

impl Pattern {
    /// Create a literal pattern.
    pub fn exact(s: impl Into<String>) -> Self {
        Pattern::Exact(s.into())
    }

    /// Create a regex pattern.
    ///
    /// # Errors
    ///
    /// Returns an error if the regex does not compile.
    pub fn regex(pattern: &str) -> Result<Self, PatternError> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    /// Create a glob pattern. `*` matches lazily within one line.
    pub fn glob(pattern: impl Into<String>) -> Self {
        Pattern::Glob(pattern.into())
    }

    /// Convert pattern to a matcher implementation.
    ///
    /// Returns `Ok(None)` for the `Eof` and `Timeout` sentinels, which the
    /// automaton handles itself.
    pub fn to_matcher(&self) -> Result<Option<Box<dyn Matcher>>, PatternError> {
        let matcher: Box<dyn Matcher> = match self {
            Pattern::Exact(s) => Box::new(ExactMatcher::new(s.as_bytes())?),
            Pattern::Regex(r) => Box::new(RegexMatcher::new(r.clone())),
            Pattern::Glob(g) => Box::new(GlobMatcher::new(g)?),
            Pattern::Eof | Pattern::Timeout => return Ok(None),
        };
        Ok(Some(matcher))
    }

    /// Check if this is a sentinel pattern (EOF, Timeout)
    pub fn is_special(&self) -> bool {
        matches!(self, Pattern::Eof | Pattern::Timeout)
    }

    /// Short human readable form, used in diagnostics.
    pub fn describe(&self) -> String {
        match self {
            Pattern::Exact(s) => format!("{s:?}"),
            Pattern::Regex(r) => format!("/{}/", r.as_str()),
            Pattern::Glob(g) => format!("glob({g})"),
            Pattern::Eof => "EOF".to_string(),
            Pattern::Timeout => "TIMEOUT".to_string(),
        }
    }
}

impl From<&str> for Pattern {
    fn from(s: &str) -> Self {
        Pattern::exact(s)
    }
}

impl From<Regex> for Pattern {
    fn from(r: Regex) -> Self {
        Pattern::Regex(r)
    }
}

/// Compiled pattern list, ready to search a buffer repeatedly.
pub struct CompiledPatterns {
    matchers: Vec<(usize, Box<dyn Matcher>)>,
    eof_index: Option<usize>,
    timeout_index: Option<usize>,
}

impl CompiledPatterns {
    /// Compile an ordered pattern list.
    pub fn compile(patterns: &[Pattern]) -> Result<Self, PatternError> {
        let mut matchers = Vec::with_capacity(patterns.len());
        let mut eof_index = None;
        let mut timeout_index = None;

        for (idx, pattern) in patterns.iter().enumerate() {
            match pattern {
                Pattern::Eof => {
                    eof_index.get_or_insert(idx);
                }
                Pattern::Timeout => {
                    timeout_index.get_or_insert(idx);
                }
                _ => {
                    if let Some(m) = pattern.to_matcher()? {
                        matchers.push((idx, m));
                    }
                }
            }
        }

        Ok(Self {
            matchers,
            eof_index,
            timeout_index,
        })
    }

    /// Index of the `Eof` sentinel, if listed.
    pub fn eof_index(&self) -> Option<usize> {
        self.eof_index
    }

    /// Index of the `Timeout` sentinel, if listed.
    pub fn timeout_index(&self) -> Option<usize> {
        self.timeout_index
    }

    /// Find the earliest match in `haystack`.
    ///
    /// Ties at the same start offset go to the lower pattern index.
    pub fn earliest(&self, haystack: &[u8]) -> Option<(usize, Match)> {
        let mut best: Option<(usize, Match)> = None;
        for (idx, matcher) in &self.matchers {
            let Some(m) = matcher.find(haystack) else {
                continue;
            };
            let better = match &best {
                None => true,
                Some((best_idx, best_m)) => (m.start, *idx) < (best_m.start, *best_idx),
            };
            if better {
                best = Some((*idx, m));
            }
        }
        best
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_earliest_match_wins_over_list_order() {
        let compiled =
            CompiledPatterns::compile(&[Pattern::exact("prompt>"), Pattern::exact("error")])
                .unwrap();
        let (idx, m) = compiled.earliest(b"error: bad\r\nprompt>").unwrap();
        assert_eq!(idx, 1);
        assert_eq!(m.start, 0);
    }

    #[test]
    fn test_tie_goes_to_earlier_listed_pattern() {
        let compiled = CompiledPatterns::compile(&[
            Pattern::regex(r"version \d").unwrap(),
            Pattern::exact("version 2"),
        ])
        .unwrap();
        let (idx, _) = compiled.earliest(b"fw version 2").unwrap();
        assert_eq!(idx, 0);
    }

    #[test]
    fn test_sentinels_are_recorded_not_matched() {
        let compiled =
            CompiledPatterns::compile(&[Pattern::exact("x"), Pattern::Eof, Pattern::Timeout])
                .unwrap();
        assert_eq!(compiled.eof_index(), Some(1));
        assert_eq!(compiled.timeout_index(), Some(2));
        assert!(compiled.earliest(b"nothing").is_none());
    }

    #[test]
    fn test_describe() {
        assert_eq!(Pattern::exact("a#").describe(), "\"a#\"");
        assert_eq!(Pattern::regex(r"\$ $").unwrap().describe(), r"/\$ $/");
        assert_eq!(Pattern::Eof.describe(), "EOF");
    }

    #[test]
    fn test_empty_literal_rejected() {
        assert!(CompiledPatterns::compile(&[Pattern::exact("")]).is_err());
    }
}

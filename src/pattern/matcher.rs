//! Pattern matcher implementations

use crate::result::PatternError;
use globset::GlobBuilder;
use memchr::memmem;
use regex::bytes::Regex;

/// Result of a pattern match, relative to the searched slice
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Match {
    /// Start position of the match
    pub start: usize,
    /// End position of the match
    pub end: usize,
    /// Captured groups (for regex)
    pub captures: Vec<String>,
}

/// Trait for pattern matching
pub trait Matcher: Send + Sync {
    /// Find the leftmost match in the buffer
    fn find(&self, buffer: &[u8]) -> Option<Match>;
}

/// Literal matcher backed by a precompiled `memmem` finder
pub struct ExactMatcher {
    finder: memmem::Finder<'static>,
}

impl ExactMatcher {
    /// Create a new literal matcher
    pub fn new(pattern: impl AsRef<[u8]>) -> Result<Self, PatternError> {
        let pattern = pattern.as_ref();
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        Ok(Self {
            finder: memmem::Finder::new(pattern).into_owned(),
        })
    }
}

impl Matcher for ExactMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        let start = self.finder.find(buffer)?;
        Some(Match {
            start,
            end: start + self.finder.needle().len(),
            captures: vec![],
        })
    }
}

/// Regex matcher over raw bytes.
///
/// Console output is not guaranteed to be valid UTF-8 (a read may split a
/// multi-byte character), so matching happens on bytes and captures are
/// converted lossily.
pub struct RegexMatcher {
    regex: Regex,
}

impl RegexMatcher {
    /// Wrap an already compiled regex
    pub fn new(regex: Regex) -> Self {
        Self { regex }
    }
}

impl Matcher for RegexMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        let caps = self.regex.captures(buffer)?;
        let full = caps.get(0)?;

        let captures = caps
            .iter()
            .map(|g| {
                g.map(|m| String::from_utf8_lossy(m.as_bytes()).into_owned())
                    .unwrap_or_default()
            })
            .collect();

        Some(Match {
            start: full.start(),
            end: full.end(),
            captures,
        })
    }
}

/// Glob matcher.
///
/// The glob is translated to a regex once with `globset` and then searched
/// like any other regex, so `*` never crosses a line break. `*` is lazy:
/// `Router*#` stops at the first `#` after `Router`.
pub struct GlobMatcher {
    inner: RegexMatcher,
}

impl GlobMatcher {
    /// Create a new glob matcher
    pub fn new(pattern: &str) -> Result<Self, PatternError> {
        if pattern.is_empty() {
            return Err(PatternError::EmptyPattern);
        }
        let glob = GlobBuilder::new(pattern)
            .literal_separator(false)
            .build()
            .map_err(|e| PatternError::InvalidGlob(e.to_string()))?;

        // globset anchors the whole haystack; we search inside a stream.
        let anchored = glob.regex();
        let body = anchored
            .find('^')
            .map_or(anchored, |at| &anchored[at + 1..]);
        let body = body.strip_suffix('$').unwrap_or(body);
        // Stop `*` at the first prompt on a line, not the last.
        let body = body.replace(".*", ".*?");

        Ok(Self {
            inner: RegexMatcher::new(Regex::new(&format!("(?-u){body}"))?),
        })
    }
}

impl Matcher for GlobMatcher {
    fn find(&self, buffer: &[u8]) -> Option<Match> {
        self.inner.find(buffer).map(|mut m| {
            m.captures.clear();
            m
        })
    }
}

//! Result and error types

mod error;

pub use error::{
    CapturedError, ConfigError, ContinueOnFail, Error, ExpectError, PatternError, RegistryError,
    Result, StepError,
};

/// Result of a successful pattern match.
///
/// `before` holds everything the automaton received since the previous match
/// up to the start of this one, which is usually the command output a caller
/// is after. The automaton has already consumed the text up to the end of
/// the match when this value is returned; the next call starts after it.
///
/// # Regex Captures
///
/// ```no_run
/// use consolebench::{ConsoleDevice, Pattern};
///
/// # fn example(device: &mut ConsoleDevice) -> Result<(), Box<dyn std::error::Error>> {
/// let version = Pattern::regex(r"Software Version (\S+)")?;
/// let m = device.expect_any(&[version], None)?;
///
/// // captures[0] is the full match, captures[1] the version string
/// println!("running {}", m.captures[1]);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MatchResult {
    /// Index of the pattern that matched in the submitted list.
    pub pattern_index: usize,

    /// The matched text.
    pub matched: String,

    /// Output received before the match.
    pub before: String,

    /// Capture groups for regex patterns (index 0 is the full match).
    ///
    /// Empty for literal and glob patterns.
    pub captures: Vec<String>,
}

impl MatchResult {
    /// Capture group `i`, if present.
    pub fn group(&self, i: usize) -> Option<&str> {
        self.captures.get(i).map(String::as_str)
    }
}

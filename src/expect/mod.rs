//! The expect automaton.
//!
//! An [`Automaton`] owns the rolling output buffer of one console and
//! answers "wait until one of these patterns shows up". The earliest match
//! in the unconsumed output wins; ties go to the pattern listed first. A
//! match consumes the output up to its end, so successive awaits walk
//! forward through the stream.

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::buffer::BufferManager;
use crate::diag::{DiagEvent, DiagnosticSink};
use crate::pattern::{CompiledPatterns, Pattern};
use crate::result::{ExpectError, MatchResult, PatternError};
use crate::session::{ReadOutcome, Session};

/// Read slice used while waiting without a deadline.
const UNBOUNDED_SLICE: Duration = Duration::from_millis(500);

/// Buffer and matcher state for one console.
pub struct Automaton {
    label: String,
    buffer: BufferManager,
    sink: Option<Rc<dyn DiagnosticSink>>,
    eof: bool,
}

impl Automaton {
    /// Create an automaton with a buffer cap of `max_buffer` bytes.
    pub fn new(label: impl Into<String>, max_buffer: usize, strip_ansi: bool) -> Self {
        Self {
            label: label.into(),
            buffer: BufferManager::new(max_buffer, strip_ansi),
            sink: None,
            eof: false,
        }
    }

    /// Mirror awaits to a diagnostic sink.
    pub fn set_sink(&mut self, sink: Option<Rc<dyn DiagnosticSink>>) {
        self.sink = sink;
    }

    /// Wait until one of `patterns` matches the output of `session`.
    ///
    /// `timeout` of `None` waits forever. [`Pattern::Eof`] and
    /// [`Pattern::Timeout`] in the list turn the matching condition into a
    /// normal result instead of an error.
    ///
    /// # Errors
    ///
    /// - [`ExpectError::Timeout`] when the deadline passes
    /// - [`ExpectError::EndOfStream`] when the channel closes first
    /// - [`ExpectError::PatternError`] for an empty list or a bad pattern
    pub fn expect_any(
        &mut self,
        session: &mut Session,
        patterns: &[Pattern],
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        if patterns.is_empty() {
            return Err(PatternError::EmptyPattern.into());
        }
        let compiled = CompiledPatterns::compile(patterns)?;
        self.record(|label| DiagEvent::Await {
            device: label,
            patterns: patterns.iter().map(Pattern::describe).collect(),
            timeout,
        });

        let deadline = timeout.and_then(|t| Instant::now().checked_add(t));
        let mut polled = false;
        loop {
            if let Some((index, m)) = compiled.earliest(self.buffer.unconsumed()) {
                let matched = String::from_utf8_lossy(self.buffer.span(m.start, m.end)).into_owned();
                let before = self.buffer.before(m.start);
                self.buffer.consume(m.end);
                self.record(|label| DiagEvent::Matched {
                    device: label,
                    index,
                    matched: matched.clone(),
                });
                return Ok(MatchResult {
                    pattern_index: index,
                    matched,
                    before,
                    captures: m.captures,
                });
            }

            if self.eof {
                self.record(|label| DiagEvent::EndOfStream { device: label });
                return match compiled.eof_index() {
                    Some(index) => Ok(MatchResult {
                        pattern_index: index,
                        matched: String::new(),
                        before: self.buffer.drain_text(),
                        captures: Vec::new(),
                    }),
                    None => Err(ExpectError::EndOfStream),
                };
            }

            let wait = match deadline {
                Some(deadline) => {
                    let now = Instant::now();
                    if polled && now >= deadline {
                        let duration = timeout.unwrap_or_default();
                        self.record(|label| DiagEvent::TimedOut {
                            device: label,
                            timeout: duration,
                        });
                        return match compiled.timeout_index() {
                            // Unmatched output stays buffered for the next await.
                            Some(index) => Ok(MatchResult {
                                pattern_index: index,
                                matched: String::new(),
                                before: self.buffer.unconsumed_text(),
                                captures: Vec::new(),
                            }),
                            None => Err(ExpectError::Timeout { duration }),
                        };
                    }
                    deadline.saturating_duration_since(now)
                }
                None => UNBOUNDED_SLICE,
            };

            polled = true;
            match session.read(wait)? {
                ReadOutcome::Data(chunk) => {
                    tracing::trace!(device = %self.label, bytes = chunk.len(), "read");
                    self.buffer.append(&chunk);
                }
                ReadOutcome::Idle => {}
                ReadOutcome::Closed => self.eof = true,
            }
        }
    }

    /// Output received but not consumed by any match.
    pub fn pending_text(&self) -> String {
        self.buffer.unconsumed_text()
    }

    /// Take all unconsumed output.
    pub fn drain(&mut self) -> String {
        self.buffer.drain_text()
    }

    /// Pull whatever output is already waiting, without blocking, and
    /// discard everything buffered.
    pub fn flush(&mut self, session: &mut Session) -> Result<(), ExpectError> {
        while let ReadOutcome::Data(chunk) = session.read(Duration::ZERO)? {
            self.buffer.append(&chunk);
        }
        self.buffer.clear();
        Ok(())
    }

    /// Forget all buffered output and the end-of-stream state.
    pub fn clear(&mut self) {
        self.buffer.clear();
        self.eof = false;
    }

    /// Whether the channel has been seen to close.
    pub fn is_eof(&self) -> bool {
        self.eof
    }

    fn record(&self, event: impl FnOnce(String) -> DiagEvent) {
        if let Some(sink) = &self.sink {
            sink.record(&event(self.label.clone()));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ScriptedTransport;

    fn setup(script: ScriptedTransport) -> (Automaton, Session) {
        (
            Automaton::new("unit", 4096, true),
            Session::from_transport("unit", script),
        )
    }

    #[test]
    fn test_earliest_match_and_before() {
        let (mut a, mut s) = setup(ScriptedTransport::new().greeting("boot ok\r\nlogin: "));
        let m = a
            .expect_any(
                &mut s,
                &[Pattern::exact("login:"), Pattern::exact("ok")],
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(m.pattern_index, 1);
        assert_eq!(m.before, "boot ");
        assert_eq!(a.pending_text(), "\r\nlogin: ");
    }

    #[test]
    fn test_successive_awaits_walk_forward() {
        let (mut a, mut s) = setup(ScriptedTransport::new().greeting("a# b# c# "));
        let t = Some(Duration::from_secs(1));
        let first = a.expect_any(&mut s, &[Pattern::exact("#")], t).unwrap();
        let second = a.expect_any(&mut s, &[Pattern::exact("#")], t).unwrap();
        assert_eq!(first.before, "a");
        assert_eq!(second.before, " b");
    }

    #[test]
    fn test_timeout_error_and_sentinel() {
        let (mut a, mut s) = setup(ScriptedTransport::new().greeting("partial"));
        let err = a
            .expect_any(&mut s, &[Pattern::exact("#")], Some(Duration::from_millis(20)))
            .unwrap_err();
        assert!(matches!(err, ExpectError::Timeout { .. }));

        let m = a
            .expect_any(
                &mut s,
                &[Pattern::exact("#"), Pattern::Timeout],
                Some(Duration::from_millis(20)),
            )
            .unwrap();
        assert_eq!(m.pattern_index, 1);
        assert_eq!(m.before, "partial");
        assert_eq!(a.pending_text(), "partial");
    }

    #[test]
    fn test_zero_timeout_still_polls_once() {
        let (mut a, mut s) = setup(ScriptedTransport::new().greeting("ready> "));
        let m = a
            .expect_any(&mut s, &[Pattern::exact("ready>")], Some(Duration::ZERO))
            .unwrap();
        assert_eq!(m.matched, "ready>");
    }

    #[test]
    fn test_end_of_stream() {
        let (mut a, mut s) =
            setup(ScriptedTransport::new().greeting("bye\r\n").close_when_drained());
        let err = a
            .expect_any(&mut s, &[Pattern::exact("#")], Some(Duration::from_secs(1)))
            .unwrap_err();
        assert!(matches!(err, ExpectError::EndOfStream));
        assert!(a.is_eof());

        let m = a
            .expect_any(&mut s, &[Pattern::exact("#"), Pattern::Eof], None)
            .unwrap();
        assert_eq!(m.pattern_index, 1);
        assert_eq!(m.before, "bye\r\n");
    }

    #[test]
    fn test_match_in_data_before_close() {
        let (mut a, mut s) =
            setup(ScriptedTransport::new().greeting("done# ").close_when_drained());
        let m = a
            .expect_any(&mut s, &[Pattern::Eof, Pattern::exact("done#")], None)
            .unwrap();
        assert_eq!(m.pattern_index, 1);
    }

    #[test]
    fn test_empty_pattern_list() {
        let (mut a, mut s) = setup(ScriptedTransport::new());
        assert!(matches!(
            a.expect_any(&mut s, &[], None),
            Err(ExpectError::PatternError(PatternError::EmptyPattern))
        ));
    }

    #[test]
    fn test_regex_captures() {
        let (mut a, mut s) =
            setup(ScriptedTransport::new().greeting("Software Version 7.1.2\r\n# "));
        let m = a
            .expect_any(
                &mut s,
                &[Pattern::regex(r"Version (\S+)").unwrap()],
                Some(Duration::from_secs(1)),
            )
            .unwrap();
        assert_eq!(m.group(1), Some("7.1.2"));
    }

    #[test]
    fn test_ansi_is_stripped_before_matching() {
        let (mut a, mut s) =
            setup(ScriptedTransport::new().greeting("\x1b[1;32mrouter\x1b[0m# "));
        let m = a
            .expect_any(&mut s, &[Pattern::exact("router#")], Some(Duration::from_secs(1)))
            .unwrap();
        assert_eq!(m.matched, "router#");
    }
}

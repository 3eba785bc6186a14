//! In-memory transport that plays a scripted console.
//!
//! Used to drive console devices without spawning anything. Replies are
//! keyed on complete lines written by the caller; control bytes such as
//! Ctrl-C can have their own replies.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Duration;

use super::transport::{ReadOutcome, Transport};
use crate::result::ExpectError;

/// Upper bound on how long an idle read sleeps.
const IDLE_POLL: Duration = Duration::from_millis(5);

#[derive(Debug)]
struct Rule {
    trigger: Trigger,
    reply: Vec<u8>,
    once: bool,
    used: bool,
}

#[derive(Debug, PartialEq, Eq)]
enum Trigger {
    Line(String),
    Control(u8),
}

#[derive(Debug, Default)]
struct ScriptState {
    rules: Vec<Rule>,
    pending: VecDeque<Vec<u8>>,
    written: Vec<u8>,
    line: Vec<u8>,
    lines: Vec<String>,
    echo: bool,
    close_when_drained: bool,
    closed: bool,
}

impl ScriptState {
    fn feed(&mut self, data: &[u8]) {
        self.written.extend_from_slice(data);
        if self.echo {
            self.pending.push_back(data.to_vec());
        }
        for &byte in data {
            match byte {
                b'\r' | b'\n' => {
                    if self.line.is_empty() {
                        continue;
                    }
                    let line = String::from_utf8_lossy(&self.line).into_owned();
                    self.line.clear();
                    self.fire(Trigger::Line(line.clone()));
                    self.lines.push(line);
                }
                b if b < 0x20 || b == 0x7f => self.fire(Trigger::Control(b)),
                b => self.line.push(b),
            }
        }
    }

    fn fire(&mut self, trigger: Trigger) {
        let rule = self
            .rules
            .iter_mut()
            .find(|r| r.trigger == trigger && !(r.once && r.used));
        if let Some(rule) = rule {
            rule.used = true;
            if !rule.reply.is_empty() {
                self.pending.push_back(rule.reply.clone());
            }
        }
    }
}

/// Scripted console for tests and dry runs.
///
/// ```
/// use consolebench::session::{ReadOutcome, ScriptedTransport, Transport};
/// use std::time::Duration;
///
/// let mut console = ScriptedTransport::new()
///     .greeting("router# ")
///     .on_line("show version", "show version\r\nv1.2\r\nrouter# ");
/// console.write(b"show version\n").unwrap();
/// assert_eq!(
///     console.read(Duration::from_millis(10)).unwrap(),
///     ReadOutcome::Data(b"router# ".to_vec())
/// );
/// ```
#[derive(Debug, Clone, Default)]
pub struct ScriptedTransport {
    state: Arc<Mutex<ScriptState>>,
}

/// Shared view of a [`ScriptedTransport`] that stays usable after the
/// transport has been handed to a session.
#[derive(Debug, Clone)]
pub struct ScriptHandle {
    state: Arc<Mutex<ScriptState>>,
}

fn lock(state: &Mutex<ScriptState>) -> MutexGuard<'_, ScriptState> {
    state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

impl ScriptedTransport {
    /// An empty script: silent, never closes.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue output available before anything is written.
    pub fn greeting(self, text: impl AsRef<[u8]>) -> Self {
        lock(&self.state).pending.push_back(text.as_ref().to_vec());
        self
    }

    /// Reply with `reply` every time the line `line` is written.
    pub fn on_line(self, line: impl Into<String>, reply: impl AsRef<[u8]>) -> Self {
        self.rule(Trigger::Line(line.into()), reply, false)
    }

    /// Reply with `reply` only the first time `line` is written.
    pub fn on_line_once(self, line: impl Into<String>, reply: impl AsRef<[u8]>) -> Self {
        self.rule(Trigger::Line(line.into()), reply, true)
    }

    /// Reply when a control byte (e.g. `0x03` for Ctrl-C) is written.
    pub fn on_control(self, byte: u8, reply: impl AsRef<[u8]>) -> Self {
        self.rule(Trigger::Control(byte), reply, false)
    }

    /// Echo written bytes back, like a terminal in cooked mode.
    pub fn echo(self, echo: bool) -> Self {
        lock(&self.state).echo = echo;
        self
    }

    /// Report the channel closed once all queued output has been read.
    pub fn close_when_drained(self) -> Self {
        lock(&self.state).close_when_drained = true;
        self
    }

    /// Handle for inspecting or driving the script later.
    pub fn handle(&self) -> ScriptHandle {
        ScriptHandle {
            state: self.state.clone(),
        }
    }

    fn rule(self, trigger: Trigger, reply: impl AsRef<[u8]>, once: bool) -> Self {
        lock(&self.state).rules.push(Rule {
            trigger,
            reply: reply.as_ref().to_vec(),
            once,
            used: false,
        });
        self
    }
}

impl ScriptHandle {
    /// Everything written so far, lossily decoded.
    pub fn written(&self) -> String {
        String::from_utf8_lossy(&lock(&self.state).written).into_owned()
    }

    /// Raw bytes written so far.
    pub fn written_bytes(&self) -> Vec<u8> {
        lock(&self.state).written.clone()
    }

    /// Complete lines written so far.
    pub fn lines(&self) -> Vec<String> {
        lock(&self.state).lines.clone()
    }

    /// Queue unsolicited output.
    pub fn push_output(&self, text: impl AsRef<[u8]>) {
        lock(&self.state).pending.push_back(text.as_ref().to_vec());
    }

    /// Close the far end now.
    pub fn hang_up(&self) {
        lock(&self.state).closed = true;
    }

    /// Whether the transport was closed by either side.
    pub fn is_closed(&self) -> bool {
        lock(&self.state).closed
    }
}

impl Transport for ScriptedTransport {
    fn write(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        let mut state = lock(&self.state);
        if state.closed {
            return Err(ExpectError::Closed("scripted".into()));
        }
        state.feed(data);
        Ok(())
    }

    fn read(&mut self, wait: Duration) -> Result<ReadOutcome, ExpectError> {
        {
            let mut state = lock(&self.state);
            if let Some(chunk) = state.pending.pop_front() {
                return Ok(ReadOutcome::Data(chunk));
            }
            if state.closed || state.close_when_drained {
                state.closed = true;
                return Ok(ReadOutcome::Closed);
            }
        }
        std::thread::sleep(wait.min(IDLE_POLL));
        Ok(ReadOutcome::Idle)
    }

    fn is_alive(&mut self) -> bool {
        !lock(&self.state).closed
    }

    fn close(&mut self) -> Result<(), ExpectError> {
        lock(&self.state).closed = true;
        Ok(())
    }
}

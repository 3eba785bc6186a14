//! Sessions: one live channel to one console.
//!
//! A [`Session`] owns a [`Transport`] (normally a child process on a PTY,
//! see [`PtyTransport`]) plus the [`TransportRecipe`] it was launched from.
//! [`Session::connect`] waits until the recipe's "live" signal shows up,
//! answering login prompts on the way, and turns refusal messages into
//! [`ExpectError::TransportFailure`].

mod builder;
pub mod cleanup;
mod pty;
mod recipe;
mod scripted;
mod transport;

pub use builder::SessionBuilder;
pub use pty::PtyTransport;
pub use recipe::TransportRecipe;
pub use scripted::{ScriptHandle, ScriptedTransport};
pub use transport::{ReadOutcome, Transport};

use std::rc::Rc;
use std::time::{Duration, Instant};

use crate::diag::{escape_control, DiagEvent, DiagnosticSink};
use crate::expect::Automaton;
use crate::pattern::Pattern;
use crate::result::ExpectError;

/// Password/host-key/login answers before connect gives up.
const MAX_LOGIN_ROUNDS: usize = 6;

/// Login details answered during [`Session::connect`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Credentials {
    /// Answer to `login:` / `Username:` prompts
    pub username: Option<String>,
    /// Answer to `Password:` prompts
    pub password: Option<String>,
}

/// A live channel to one console.
///
/// # Examples
///
/// ```no_run
/// use consolebench::session::{Session, TransportRecipe};
/// use consolebench::expect::Automaton;
/// use consolebench::Pattern;
/// use std::time::Duration;
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let recipe = TransportRecipe::Telnet { host: "ts1".into(), port: 7003 };
/// let mut session = Session::builder("cm1").recipe(recipe).spawn()?;
/// let mut automaton = Automaton::new("cm1", 64 * 1024, true);
/// session.connect(&mut automaton, &[Pattern::regex(r"=>\s*$")?], Duration::from_secs(30))?;
/// session.close();
/// # Ok(())
/// # }
/// ```
pub struct Session {
    label: String,
    recipe: Option<TransportRecipe>,
    credentials: Credentials,
    line_terminator: String,
    transport: Option<Box<dyn Transport>>,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl Session {
    /// Start configuring a session.
    pub fn builder(label: impl Into<String>) -> SessionBuilder {
        SessionBuilder::new(label)
    }

    /// Wrap an already-open transport.
    pub fn from_transport(label: impl Into<String>, transport: impl Transport + 'static) -> Self {
        SessionBuilder::new(label).with_transport(transport)
    }

    /// Label used in logs and errors.
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Recipe the session was launched from, if any.
    pub fn recipe(&self) -> Option<&TransportRecipe> {
        self.recipe.as_ref()
    }

    /// Mirror sends to a diagnostic sink.
    pub fn set_sink(&mut self, sink: Option<Rc<dyn DiagnosticSink>>) {
        self.sink = sink;
    }

    /// Write bytes to the target.
    pub fn send(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        if let Some(sink) = &self.sink {
            sink.record(&DiagEvent::Send {
                device: self.label.clone(),
                text: escape_control(&String::from_utf8_lossy(data)),
            });
        }
        self.transport_mut()?.write(data)
    }

    /// Write bytes that must not show up in diagnostics.
    pub fn send_secret(&mut self, data: &[u8]) -> Result<(), ExpectError> {
        if let Some(sink) = &self.sink {
            sink.record(&DiagEvent::Send {
                device: self.label.clone(),
                text: "********".into(),
            });
        }
        self.transport_mut()?.write(data)
    }

    /// Wait at most `wait` for output.
    pub fn read(&mut self, wait: Duration) -> Result<ReadOutcome, ExpectError> {
        self.transport_mut()?.read(wait)
    }

    /// Wait until the session is live.
    ///
    /// `ready` lists what "live" looks like (usually the device prompts);
    /// when empty the recipe's own signal is used. Local shells and plain
    /// commands are live as soon as they spawn. Password, host-key and
    /// login prompts are answered from the session's [`Credentials`].
    ///
    /// # Errors
    ///
    /// [`ExpectError::TransportFailure`] when the target refuses, the
    /// channel closes, or nothing live shows up before `timeout`. The
    /// session is closed in that case.
    pub fn connect(
        &mut self,
        automaton: &mut Automaton,
        ready: &[Pattern],
        timeout: Duration,
    ) -> Result<(), ExpectError> {
        let Some(recipe) = self.recipe.clone() else {
            return Ok(());
        };

        let mut patterns: Vec<Pattern> = ready.to_vec();
        if patterns.is_empty() {
            if recipe.live_on_spawn() {
                return Ok(());
            }
            patterns.extend(recipe.default_ready());
            if patterns.is_empty() {
                return Ok(());
            }
        }
        let ready_end = patterns.len();
        patterns.extend(recipe.failure_signals()?);
        let failure_end = patterns.len();
        patterns.push(Pattern::regex(r"(?i)password:\s*$")?);
        patterns.push(Pattern::exact("(yes/no"));
        patterns.push(Pattern::regex(r"(?i)(login|username):\s*$")?);

        let result = self.await_live(automaton, &patterns, ready_end, failure_end, timeout);
        match &result {
            Ok(()) => tracing::info!(session = %self.label, transport = recipe.tag(), "connected"),
            Err(e) => {
                tracing::warn!(session = %self.label, error = %e, "connect failed");
                self.close();
            }
        }
        result
    }

    fn await_live(
        &mut self,
        automaton: &mut Automaton,
        patterns: &[Pattern],
        ready_end: usize,
        failure_end: usize,
        timeout: Duration,
    ) -> Result<(), ExpectError> {
        let deadline = Instant::now().checked_add(timeout);
        let mut rounds = 0;
        loop {
            let remaining = match deadline {
                Some(deadline) => deadline.saturating_duration_since(Instant::now()),
                None => timeout,
            };
            let m = match automaton.expect_any(self, patterns, Some(remaining)) {
                Ok(m) => m,
                Err(ExpectError::Timeout { .. }) => {
                    return Err(self.failure(format!("not live within {timeout:?}")));
                }
                Err(ExpectError::EndOfStream) => {
                    let tail = automaton.pending_text();
                    return Err(self.failure(format!(
                        "channel closed before the session was live: {}",
                        tail.trim()
                    )));
                }
                Err(e) => return Err(e),
            };

            let index = m.pattern_index;
            if index < ready_end {
                return Ok(());
            }
            if index < failure_end {
                return Err(self.failure(format!("target reported '{}'", m.matched.trim())));
            }

            rounds += 1;
            if rounds > MAX_LOGIN_ROUNDS {
                return Err(self.failure("login prompts keep repeating".into()));
            }
            let terminator = self.line_terminator.clone();
            match index - failure_end {
                0 => match self.credentials.password.clone() {
                    Some(password) => {
                        self.send_secret(format!("{password}{terminator}").as_bytes())?
                    }
                    None => return Err(self.failure("password requested but none configured".into())),
                },
                1 => self.send(format!("yes{terminator}").as_bytes())?,
                _ => match self.credentials.username.clone() {
                    Some(user) => self.send(format!("{user}{terminator}").as_bytes())?,
                    None => return Err(self.failure("login requested but no username configured".into())),
                },
            }
        }
    }

    fn failure(&self, reason: String) -> ExpectError {
        ExpectError::TransportFailure {
            target: self.label.clone(),
            reason,
        }
    }

    /// Whether the session has not been closed.
    pub fn is_open(&self) -> bool {
        self.transport.is_some()
    }

    /// Whether the far end is still running.
    pub fn is_alive(&mut self) -> bool {
        self.transport.as_mut().is_some_and(|t| t.is_alive())
    }

    /// Close the session. Safe to call on a session that is already gone.
    pub fn close(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.close() {
                tracing::debug!(session = %self.label, error = %e, "close failed");
            }
        }
    }

    /// Forcefully terminate the far end. Safe to repeat.
    pub fn kill(&mut self) {
        if let Some(mut transport) = self.transport.take() {
            if let Err(e) = transport.kill() {
                tracing::debug!(session = %self.label, error = %e, "kill failed");
            }
        }
    }

    fn transport_mut(&mut self) -> Result<&mut Box<dyn Transport>, ExpectError> {
        let label = &self.label;
        self.transport
            .as_mut()
            .ok_or_else(|| ExpectError::Closed(label.clone()))
    }
}

impl Drop for Session {
    fn drop(&mut self) {
        self.close();
    }
}

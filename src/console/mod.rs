//! Console devices: the driver-facing command layer.
//!
//! A [`ConsoleDevice`] ties one [`Session`] to one [`Automaton`] and a
//! swappable list of prompt patterns. Device drivers talk to their
//! equipment through it:
//!
//! ```no_run
//! use consolebench::{ConsoleBuilder, Pattern, RunConfig, TransportRecipe};
//!
//! # fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let recipe = TransportRecipe::Ssh {
//!     host: "10.0.0.1".into(),
//!     port: 22,
//!     user: Some("admin".into()),
//!     identity: None,
//!     keepalive: 30,
//!     options: vec![],
//! };
//! let mut router = ConsoleBuilder::new("wan")
//!     .recipe(recipe)
//!     .password("admin")
//!     .prompt(Pattern::regex(r"router#\s*$")?)
//!     .config(RunConfig::from_env())
//!     .spawn()?;
//!
//! let version = router.run_command("show version", None)?;
//! println!("{version}");
//! router.close();
//! # Ok(())
//! # }
//! ```

mod builder;

pub use builder::ConsoleBuilder;

use std::time::{Duration, Instant};

use crate::config::RunConfig;
use crate::expect::Automaton;
use crate::pattern::Pattern;
use crate::result::{ExpectError, MatchResult};
use crate::session::Session;

/// A console the test logic can drive.
pub struct ConsoleDevice {
    name: String,
    session: Session,
    automaton: Automaton,
    prompts: Vec<Pattern>,
    config: RunConfig,
    char_delay: Option<Duration>,
}

impl std::fmt::Debug for ConsoleDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ConsoleDevice")
            .field("name", &self.name)
            .field("open", &self.session.is_open())
            .field(
                "prompts",
                &self.prompts.iter().map(Pattern::describe).collect::<Vec<_>>(),
            )
            .finish()
    }
}

impl ConsoleDevice {
    /// Start configuring a console device.
    pub fn builder(name: impl Into<String>) -> ConsoleBuilder {
        ConsoleBuilder::new(name)
    }

    /// Device name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Run settings the device was built with.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Wait for the session to come up, using the prompts as the live signal.
    pub fn connect(&mut self) -> Result<(), ExpectError> {
        let timeout = self.config.connect_timeout;
        self.session
            .connect(&mut self.automaton, &self.prompts, timeout)
    }

    /// Send `text` followed by the line terminator.
    ///
    /// With an inter-character delay configured, characters go out one at
    /// a time for targets that drop fast input bursts.
    pub fn emit(&mut self, text: &str) -> Result<(), ExpectError> {
        let line = format!("{text}{}", self.config.line_terminator);
        self.send(&line)
    }

    /// Send `text` as is.
    pub fn send(&mut self, text: &str) -> Result<(), ExpectError> {
        match self.char_delay {
            Some(delay) if !delay.is_zero() => {
                let mut buf = [0u8; 4];
                for c in text.chars() {
                    self.session.send(c.encode_utf8(&mut buf).as_bytes())?;
                    std::thread::sleep(delay);
                }
                Ok(())
            }
            _ => self.session.send(text.as_bytes()),
        }
    }

    /// Send a control character: `'c'` sends Ctrl-C (0x03), `'d'` Ctrl-D
    /// and so on. `'['`, `'\\'`, `']'`, `'^'` and `'_'` map to 0x1b..=0x1f.
    pub fn send_control(&mut self, c: char) -> Result<(), ExpectError> {
        let byte = control_byte(c).ok_or(ExpectError::InvalidControl(c))?;
        self.session.send(&[byte])
    }

    /// Wait for the earliest of `patterns`.
    ///
    /// `timeout` of `None` uses the run's default timeout.
    pub fn expect_any(
        &mut self,
        patterns: &[Pattern],
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        self.automaton
            .expect_any(&mut self.session, patterns, Some(timeout))
    }

    /// Wait for literal `text`.
    pub fn expect_exact(
        &mut self,
        text: &str,
        timeout: Option<Duration>,
    ) -> Result<MatchResult, ExpectError> {
        self.expect_any(&[Pattern::exact(text)], timeout)
    }

    /// Wait for any of the active prompts.
    pub fn wait_for_prompt(&mut self, timeout: Option<Duration>) -> Result<MatchResult, ExpectError> {
        let prompts = self.prompts.clone();
        self.expect_any(&prompts, timeout)
    }

    /// Run `cmd` and return its output.
    ///
    /// Sends the command, waits for its echo, then for one of the active
    /// prompts, and returns what came in between, trimmed.
    ///
    /// # Errors
    ///
    /// On timeout an interrupt (Ctrl-C) is sent and
    /// [`ExpectError::CommandTimeout`] carries the partial output.
    pub fn run_command(&mut self, cmd: &str, timeout: Option<Duration>) -> Result<String, ExpectError> {
        let timeout = timeout.unwrap_or(self.config.default_timeout);
        let deadline = Instant::now().checked_add(timeout);
        tracing::debug!(device = %self.name, command = cmd, "run_command");

        self.emit(cmd)?;

        let echo = cmd.trim();
        if !echo.is_empty() {
            match self.automaton.expect_any(
                &mut self.session,
                &[Pattern::exact(echo)],
                Some(remaining(deadline)),
            ) {
                Ok(_) => {}
                Err(ExpectError::Timeout { .. }) => return Err(self.interrupt(cmd, timeout)),
                Err(e) => return Err(e),
            }
        }

        match self
            .automaton
            .expect_any(&mut self.session, &self.prompts, Some(remaining(deadline)))
        {
            Ok(m) => Ok(m.before.trim().to_string()),
            Err(ExpectError::Timeout { .. }) => Err(self.interrupt(cmd, timeout)),
            Err(e) => Err(e),
        }
    }

    /// Run several commands in order, stopping at the first error.
    pub fn run_commands(
        &mut self,
        cmds: &[&str],
        timeout: Option<Duration>,
    ) -> Result<Vec<String>, ExpectError> {
        cmds.iter().map(|cmd| self.run_command(cmd, timeout)).collect()
    }

    fn interrupt(&mut self, cmd: &str, duration: Duration) -> ExpectError {
        let partial = self.automaton.drain();
        tracing::warn!(device = %self.name, command = cmd, ?duration, "command timed out, interrupting");
        if let Err(e) = self.send_control('c') {
            tracing::debug!(device = %self.name, error = %e, "interrupt not delivered");
        }
        ExpectError::CommandTimeout {
            command: cmd.to_string(),
            duration,
            partial,
        }
    }

    /// Active prompt patterns, in priority order.
    pub fn prompts(&self) -> &[Pattern] {
        &self.prompts
    }

    /// Replace the active prompts, e.g. after entering a sub-shell.
    pub fn set_prompts(&mut self, prompts: Vec<Pattern>) {
        self.prompts = prompts;
    }

    /// Add a prompt at the end of the active list.
    pub fn push_prompt(&mut self, prompt: Pattern) {
        self.prompts.push(prompt);
    }

    /// Output received but not consumed by any await.
    pub fn pending_output(&self) -> String {
        self.automaton.pending_text()
    }

    /// Discard buffered and already-arrived output.
    pub fn flush(&mut self) -> Result<(), ExpectError> {
        self.automaton.flush(&mut self.session)
    }

    /// Whether the session has not been closed.
    pub fn is_open(&self) -> bool {
        self.session.is_open()
    }

    /// Whether the far end is still running.
    pub fn is_alive(&mut self) -> bool {
        self.session.is_alive()
    }

    /// Close the session. Safe to call more than once.
    pub fn close(&mut self) {
        if self.session.is_open() {
            tracing::debug!(device = %self.name, "closing");
        }
        self.session.close();
    }

    /// Kill the far end. Safe to call more than once.
    pub fn kill(&mut self) {
        self.session.kill();
    }
}

fn remaining(deadline: Option<Instant>) -> Duration {
    match deadline {
        Some(deadline) => deadline.saturating_duration_since(Instant::now()),
        None => Duration::MAX,
    }
}

/// Control byte for `c`, as typed with the Ctrl key.
fn control_byte(c: char) -> Option<u8> {
    match c.to_ascii_lowercase() {
        c @ 'a'..='z' => Some(c as u8 - b'a' + 1),
        '@' => Some(0x00),
        '[' => Some(0x1b),
        '\\' => Some(0x1c),
        ']' => Some(0x1d),
        '^' => Some(0x1e),
        '_' => Some(0x1f),
        '?' => Some(0x7f),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::ScriptedTransport;

    fn device(script: ScriptedTransport) -> ConsoleDevice {
        ConsoleBuilder::new("dut")
            .prompt(Pattern::exact("prompt>"))
            .with_transport(script)
    }

    #[test]
    fn test_control_bytes() {
        assert_eq!(control_byte('c'), Some(0x03));
        assert_eq!(control_byte('C'), Some(0x03));
        assert_eq!(control_byte('['), Some(0x1b));
        assert_eq!(control_byte('1'), None);
    }

    #[test]
    fn test_run_command_trims_output() {
        let mut dut = device(
            ScriptedTransport::new().on_line("uname", "uname\r\nLinux\r\nprompt>"),
        );
        assert_eq!(dut.run_command("uname", None).unwrap(), "Linux");
    }

    #[test]
    fn test_send_control_rejects_unknown() {
        let mut dut = device(ScriptedTransport::new());
        assert!(matches!(
            dut.send_control('1'),
            Err(ExpectError::InvalidControl('1'))
        ));
    }

    #[test]
    fn test_paced_emit_sends_every_char() {
        let script = ScriptedTransport::new();
        let handle = script.handle();
        let mut dut = ConsoleBuilder::new("slow")
            .char_delay(Duration::from_millis(1))
            .with_transport(script);
        dut.emit("reset").unwrap();
        assert_eq!(handle.written(), "reset\n");
    }

    #[test]
    fn test_close_twice() {
        let mut dut = device(ScriptedTransport::new());
        dut.close();
        dut.close();
        dut.kill();
        assert!(!dut.is_open());
        assert!(matches!(dut.emit("ls"), Err(ExpectError::Closed(_))));
    }
}

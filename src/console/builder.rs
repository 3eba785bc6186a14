//! Console device builder

use std::collections::BTreeMap;
use std::rc::Rc;
use std::time::Duration;

use super::ConsoleDevice;
use crate::config::{DeviceConfig, RunConfig};
use crate::diag::{DiagnosticSink, TracingSink};
use crate::expect::Automaton;
use crate::pattern::Pattern;
use crate::result::{ConfigError, ExpectError};
use crate::session::{Credentials, Session, SessionBuilder, Transport, TransportRecipe};

/// Builder for [`ConsoleDevice`].
///
/// # Defaults
///
/// - Run settings: [`RunConfig::default`]
/// - No prompts, no pacing
/// - Diagnostics go to [`TracingSink`] when [`RunConfig::debug`] is set
pub struct ConsoleBuilder {
    name: String,
    recipe: Option<TransportRecipe>,
    prompts: Vec<Pattern>,
    config: RunConfig,
    char_delay: Option<Duration>,
    sink: Option<Rc<dyn DiagnosticSink>>,
    credentials: Credentials,
    env: BTreeMap<String, String>,
}

impl ConsoleBuilder {
    /// Create a builder for a device called `name`.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            recipe: None,
            prompts: Vec::new(),
            config: RunConfig::default(),
            char_delay: None,
            sink: None,
            credentials: Credentials::default(),
            env: BTreeMap::new(),
        }
    }

    /// Prefill from an inventory entry.
    pub fn from_device_config(device: &DeviceConfig, run: &RunConfig) -> Result<Self, ConfigError> {
        let params = device.string_params();
        let mut builder = Self::new(device.name.clone())
            .recipe(device.recipe()?)
            .prompts(device.prompt_patterns()?)
            .config(run.clone());
        builder.env = device.env.clone();
        builder.credentials = Credentials {
            username: params.get("user").cloned(),
            password: params.get("password").cloned(),
        };
        if let Some(delay) = device.char_delay {
            builder = builder.char_delay(delay);
        }
        Ok(builder)
    }

    /// Set the launch recipe.
    pub fn recipe(mut self, recipe: TransportRecipe) -> Self {
        self.recipe = Some(recipe);
        self
    }

    /// Append a prompt pattern.
    pub fn prompt(mut self, prompt: Pattern) -> Self {
        self.prompts.push(prompt);
        self
    }

    /// Replace the prompt list.
    pub fn prompts(mut self, prompts: Vec<Pattern>) -> Self {
        self.prompts = prompts;
        self
    }

    /// Set the run settings.
    pub fn config(mut self, config: RunConfig) -> Self {
        self.config = config;
        self
    }

    /// Per-device inter-character delay; overrides the run setting.
    pub fn char_delay(mut self, delay: Duration) -> Self {
        self.char_delay = Some(delay);
        self
    }

    /// Diagnostic sink used when debug is on.
    pub fn sink(mut self, sink: Rc<dyn DiagnosticSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Username answered to login prompts.
    pub fn username(mut self, username: impl Into<String>) -> Self {
        self.credentials.username = Some(username.into());
        self
    }

    /// Password answered to password prompts.
    pub fn password(mut self, password: impl Into<String>) -> Self {
        self.credentials.password = Some(password.into());
        self
    }

    /// Add an environment variable for the launch command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Spawn the recipe and wait for the device to come up.
    pub fn spawn(self) -> Result<ConsoleDevice, ExpectError> {
        let session_builder = self.session_builder();
        let session = session_builder.spawn()?;
        let mut device = self.finish(session);
        device.connect()?;
        Ok(device)
    }

    /// Build over an already-open transport, without waiting for it.
    pub fn with_transport(self, transport: impl Transport + 'static) -> ConsoleDevice {
        let session = self.session_builder().with_transport(transport);
        self.finish(session)
    }

    fn sink_for_run(&self) -> Option<Rc<dyn DiagnosticSink>> {
        if !self.config.debug {
            return None;
        }
        Some(
            self.sink
                .clone()
                .unwrap_or_else(|| Rc::new(TracingSink) as Rc<dyn DiagnosticSink>),
        )
    }

    fn session_builder(&self) -> SessionBuilder {
        let mut builder = Session::builder(self.name.clone())
            .envs(&self.env)
            .credentials(self.credentials.clone())
            .line_terminator(self.config.line_terminator.clone())
            .sink(self.sink_for_run());
        if let Some(recipe) = &self.recipe {
            builder = builder.recipe(recipe.clone());
        }
        builder
    }

    fn finish(self, session: Session) -> ConsoleDevice {
        let mut automaton = Automaton::new(
            self.name.clone(),
            self.config.max_buffer_size,
            self.config.strip_ansi,
        );
        automaton.set_sink(self.sink_for_run());
        let char_delay = self.char_delay.or(self.config.char_delay);
        ConsoleDevice {
            name: self.name,
            session,
            automaton,
            prompts: self.prompts,
            config: self.config,
            char_delay,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Inventory;
    use crate::diag::WriterSink;
    use crate::session::ScriptedTransport;

    #[test]
    fn test_debug_mirrors_to_sink() {
        let sink = Rc::new(WriterSink::new(Vec::new()));
        let mut dut = ConsoleBuilder::new("cm")
            .config(RunConfig::default().with_debug(true))
            .sink(sink.clone())
            .prompt(Pattern::exact("cm#"))
            .with_transport(ScriptedTransport::new().on_line("id", "id\r\nuid=0\r\ncm#"));
        dut.run_command("id", None).unwrap();
        drop(dut);

        let sink = Rc::try_unwrap(sink).ok().unwrap();
        let log = String::from_utf8(sink.into_inner()).unwrap();
        assert!(log.contains("[cm] send id\\n"));
        assert!(log.contains("[cm] matched #0 \"cm#\""));
    }

    #[test]
    fn test_no_sink_without_debug() {
        let sink = Rc::new(WriterSink::new(Vec::new()));
        let mut dut = ConsoleBuilder::new("cm")
            .sink(sink.clone())
            .with_transport(ScriptedTransport::new());
        dut.emit("id").unwrap();
        drop(dut);
        let sink = Rc::try_unwrap(sink).ok().unwrap();
        assert!(sink.into_inner().is_empty());
    }

    #[test]
    fn test_from_device_config() {
        let inventory = Inventory::from_toml_str(
            r#"
[[device]]
name = "cm1"
role = "cm"
transport = "serial"
params = { device = "/dev/ttyUSB0" }
prompts = ['=>\s*$']
char_delay = 0.002
"#,
        )
        .unwrap();
        let builder =
            ConsoleBuilder::from_device_config(&inventory.devices[0], &inventory.run).unwrap();
        let dut = builder.with_transport(ScriptedTransport::new());
        assert_eq!(dut.name(), "cm1");
        assert_eq!(dut.prompts().len(), 1);
        assert_eq!(dut.char_delay, Some(Duration::from_millis(2)));
    }
}

//! Session builder for configuration

use std::collections::BTreeMap;
use std::rc::Rc;

use portable_pty::PtySize;

use super::{Credentials, PtyTransport, Session, Transport, TransportRecipe};
use crate::diag::DiagnosticSink;
use crate::result::ExpectError;

/// Default PTY rows
const DEFAULT_PTY_ROWS: u16 = 24;

/// Default PTY columns; wide so long commands echo back on one line
const DEFAULT_PTY_COLS: u16 = 511;

/// Builder for configuring and spawning sessions.
///
/// # Defaults
///
/// - PTY size: 24 rows × 511 columns
/// - Line terminator for login answers: `"\n"`
/// - No credentials, no diagnostics
///
/// # Examples
///
/// ```no_run
/// use consolebench::session::{Session, TransportRecipe};
///
/// # fn example() -> Result<(), Box<dyn std::error::Error>> {
/// let session = Session::builder("wan")
///     .recipe(TransportRecipe::Local { shell: "bash".into(), args: vec!["--norc".into()] })
///     .env("PS1", "lan$ ")
///     .pty_size(40, 200)
///     .spawn()?;
/// # Ok(())
/// # }
/// ```
pub struct SessionBuilder {
    label: String,
    recipe: Option<TransportRecipe>,
    env: BTreeMap<String, String>,
    pty_size: PtySize,
    credentials: Credentials,
    line_terminator: String,
    sink: Option<Rc<dyn DiagnosticSink>>,
}

impl SessionBuilder {
    /// Create a builder for a session called `label`.
    pub fn new(label: impl Into<String>) -> Self {
        Self {
            label: label.into(),
            recipe: None,
            env: BTreeMap::new(),
            pty_size: PtySize {
                rows: DEFAULT_PTY_ROWS,
                cols: DEFAULT_PTY_COLS,
                pixel_width: 0,
                pixel_height: 0,
            },
            credentials: Credentials::default(),
            line_terminator: "\n".to_string(),
            sink: None,
        }
    }

    /// Set the launch recipe.
    pub fn recipe(mut self, recipe: TransportRecipe) -> Self {
        self.recipe = Some(recipe);
        self
    }

    /// Add an environment variable for the launch command.
    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.insert(key.into(), value.into());
        self
    }

    /// Add several environment variables.
    pub fn envs(mut self, vars: &BTreeMap<String, String>) -> Self {
        self.env
            .extend(vars.iter().map(|(k, v)| (k.clone(), v.clone())));
        self
    }

    /// Set PTY (terminal) size.
    pub fn pty_size(mut self, rows: u16, cols: u16) -> Self {
        self.pty_size = PtySize {
            rows,
            cols,
            pixel_width: 0,
            pixel_height: 0,
        };
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

    /// Set both credentials at once.
    pub fn credentials(mut self, credentials: Credentials) -> Self {
        self.credentials = credentials;
        self
    }

    /// Terminator appended to login answers.
    pub fn line_terminator(mut self, terminator: impl Into<String>) -> Self {
        self.line_terminator = terminator.into();
        self
    }

    /// Mirror sends to a diagnostic sink.
    pub fn sink(mut self, sink: Option<Rc<dyn DiagnosticSink>>) -> Self {
        self.sink = sink;
        self
    }

    /// Spawn the recipe's command on a fresh PTY.
    ///
    /// # Errors
    ///
    /// Returns an error if no recipe was set, the PTY cannot be created, or
    /// the command cannot be spawned.
    pub fn spawn(self) -> Result<Session, ExpectError> {
        let recipe = self
            .recipe
            .clone()
            .ok_or_else(|| ExpectError::SpawnError(format!("{}: no launch recipe", self.label)))?;
        let (program, args) = recipe.command_line();
        let transport = PtyTransport::spawn(&self.label, &program, &args, &self.env, self.pty_size)?;
        Ok(self.with_transport(transport))
    }

    /// Build a session over an already-open transport.
    ///
    /// A recipe set on the builder is kept, so [`Session::connect`] still
    /// applies its live and failure signals.
    pub fn with_transport(self, transport: impl Transport + 'static) -> Session {
        Session {
            label: self.label,
            recipe: self.recipe,
            credentials: self.credentials,
            line_terminator: self.line_terminator,
            transport: Some(Box::new(transport)),
            sink: self.sink,
        }
    }
}

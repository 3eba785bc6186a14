//! Error types for consolebench

use std::fmt;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Errors raised by sessions, the expect automaton and console devices.
///
/// Transport failures and timeouts are kept apart on purpose: a driver may
/// retry after a [`ExpectError::Timeout`], but a [`ExpectError::TransportFailure`]
/// means the device is gone for this run.
///
/// # Examples
///
/// ```no_run
/// use consolebench::{ConsoleDevice, ExpectError, Pattern};
/// use std::time::Duration;
///
/// # fn example(device: &mut ConsoleDevice) -> Result<(), Box<dyn std::error::Error>> {
/// match device.expect_any(&[Pattern::exact("login:")], Some(Duration::from_secs(5))) {
///     Ok(m) => println!("got login prompt after {:?}", m.before),
///     Err(ExpectError::Timeout { duration }) => eprintln!("no prompt in {:?}", duration),
///     Err(ExpectError::EndOfStream) => eprintln!("console went away"),
///     Err(e) => return Err(e.into()),
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Error, Debug)]
pub enum ExpectError {
    /// No pattern matched before the deadline.
    #[error("Timeout waiting for pattern (after {duration:?})")]
    Timeout {
        /// Deadline that expired
        duration: Duration,
    },

    /// The channel closed before any pattern matched.
    #[error("End of stream reached before pattern matched")]
    EndOfStream,

    /// A command did not return to a prompt in time.
    ///
    /// An interrupt was already sent to the target. `partial` holds whatever
    /// output had arrived so callers can diagnose the hang.
    #[error("Command '{command}' timed out after {duration:?}")]
    CommandTimeout {
        /// The command that was sent
        command: String,
        /// Deadline that expired
        duration: Duration,
        /// Output received before the deadline
        partial: String,
    },

    /// The target refused the connection or reported a fatal condition.
    #[error("Transport failure on '{target}': {reason}")]
    TransportFailure {
        /// Session label
        target: String,
        /// What went wrong
        reason: String,
    },

    /// Invalid pattern.
    #[error("Invalid pattern: {0}")]
    PatternError(#[from] PatternError),

    /// I/O error on the underlying channel.
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    /// PTY creation or manipulation failed.
    #[error("PTY error: {0}")]
    PtyError(String),

    /// The launch command could not be spawned.
    #[error("Failed to spawn process: {0}")]
    SpawnError(String),

    /// The session was already closed.
    #[error("Session '{0}' is closed")]
    Closed(String),

    /// The character has no control-key equivalent.
    #[error("No control character for '{0}'")]
    InvalidControl(char),
}

/// Errors related to pattern creation.
#[derive(Error, Debug)]
pub enum PatternError {
    /// Invalid regex pattern.
    #[error("Invalid regex: {0}")]
    InvalidRegex(#[from] regex::Error),

    /// Invalid glob pattern.
    #[error("Invalid glob: {0}")]
    InvalidGlob(String),

    /// Empty pattern.
    #[error("Pattern cannot be empty")]
    EmptyPattern,
}

/// Errors raised by the device registry.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum RegistryError {
    /// Two devices were registered under the same accessor name.
    ///
    /// This is a wiring mistake and is reported at registration time.
    #[error("A device is already registered under accessor '{name}'")]
    DuplicateAccessor {
        /// Colliding accessor name
        name: String,
    },

    /// An operation was attempted on an unavailable device handle.
    #[error("Device does not exist: {query}")]
    DeviceDoesNotExist {
        /// Description of the lookup that found nothing
        query: String,
    },

    /// Lookup asked for something other than exactly one device.
    #[error("Only single-device lookups are supported (requested {count})")]
    UnsupportedCount {
        /// Number of devices requested
        count: usize,
    },

    /// The device is already borrowed by an enclosing call.
    #[error("Device '{name}' is already in use")]
    DeviceBusy {
        /// Accessor name of the busy device
        name: String,
    },
}

/// Errors raised by the step orchestrator.
#[derive(Error, Debug, Clone)]
pub enum StepError {
    /// Misuse of the orchestration API (double entry, empty execute, ...).
    #[error("{step}: programmer error: {message}")]
    Programmer {
        /// Step identifier
        step: String,
        /// What was misused
        message: String,
    },

    /// A verification predicate or negative-test expectation failed.
    #[error("{step}: verification failed: {message}")]
    Verification {
        /// Step identifier
        step: String,
        /// Caller supplied message
        message: String,
    },

    /// A queued action failed on a normal (non-teardown) step.
    #[error("{step}: action '{action}' failed: {error}")]
    Action {
        /// Step identifier
        step: String,
        /// Action name
        action: String,
        /// The error the action returned
        error: CapturedError,
    },
}

impl StepError {
    /// True for orchestration API misuse.
    pub fn is_programmer_error(&self) -> bool {
        matches!(self, StepError::Programmer { .. })
    }

    /// True for verification failures.
    pub fn is_verification_failure(&self) -> bool {
        matches!(self, StepError::Verification { .. })
    }

    /// The captured action error, if this is an action failure.
    pub fn captured(&self) -> Option<&CapturedError> {
        match self {
            StepError::Action { error, .. } => Some(error),
            _ => None,
        }
    }
}

/// Soft failure recorded by a teardown step when an action's value does
/// not equal the expected one. Never returned to the caller.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("continue on fail: expected {expected}, got {actual}")]
pub struct ContinueOnFail {
    /// Rendered expected value
    pub expected: String,
    /// Rendered actual value
    pub actual: String,
}

/// An action error kept for later inspection.
///
/// Cheap to clone; the original [`anyhow::Error`] stays intact so callers
/// can downcast to their own error types and read custom fields.
#[derive(Clone)]
pub struct CapturedError(Arc<anyhow::Error>);

impl CapturedError {
    /// Wrap an action error.
    pub fn new(error: anyhow::Error) -> Self {
        Self(Arc::new(error))
    }

    /// Borrow the original error.
    pub fn inner(&self) -> &anyhow::Error {
        &self.0
    }

    /// Downcast to a concrete error type.
    pub fn downcast_ref<E>(&self) -> Option<&E>
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.downcast_ref::<E>()
    }

    /// Check whether the error is of type `E`.
    pub fn is<E>(&self) -> bool
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        self.0.is::<E>()
    }
}

impl fmt::Display for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:#}", self.0)
    }
}

impl fmt::Debug for CapturedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("CapturedError").field(&self.0).finish()
    }
}

/// Errors loading or interpreting configuration.
#[derive(Error, Debug)]
pub enum ConfigError {
    /// The configuration file could not be read.
    #[error("Failed to read {path}: {source}")]
    Io {
        /// File that failed
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration is not valid TOML for the expected shape.
    #[error("Invalid configuration: {0}")]
    Parse(#[from] toml::de::Error),

    /// A transport tag has no recipe.
    #[error("Unknown transport '{0}'")]
    UnknownTransport(String),

    /// A transport recipe is missing a required parameter.
    #[error("Transport '{recipe}' requires parameter '{param}'")]
    MissingParam {
        /// Recipe tag
        recipe: String,
        /// Missing parameter
        param: String,
    },

    /// A parameter could not be parsed.
    #[error("Invalid value '{value}' for parameter '{param}'")]
    InvalidParam {
        /// Parameter name
        param: String,
        /// Offending value
        value: String,
    },

    /// Two inventory entries share an accessor name.
    #[error("Duplicate device name '{0}' in inventory")]
    DuplicateDevice(String),

    /// A prompt or signal pattern failed to compile.
    #[error("Invalid pattern: {0}")]
    Pattern(#[from] PatternError),
}

/// Umbrella error for operations that cross layers, such as driving a
/// device through a registry handle.
#[derive(Error, Debug)]
pub enum Error {
    /// Session, automaton or console error
    #[error(transparent)]
    Expect(#[from] ExpectError),

    /// Registry error
    #[error(transparent)]
    Registry(#[from] RegistryError),

    /// Step orchestration error
    #[error(transparent)]
    Step(#[from] StepError),

    /// Configuration error
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl From<PatternError> for Error {
    fn from(e: PatternError) -> Self {
        Error::Expect(ExpectError::PatternError(e))
    }
}

/// Result alias over the umbrella [`Error`].
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[derive(Debug, thiserror::Error)]
    #[error("bad value {0}")]
    struct BadValue(u32);

    #[test]
    fn test_captured_error_downcast() {
        let captured = CapturedError::new(anyhow::Error::new(BadValue(7)));
        assert!(captured.is::<BadValue>());
        assert_eq!(captured.downcast_ref::<BadValue>().unwrap().0, 7);
        assert_eq!(captured.to_string(), "bad value 7");
    }

    #[test]
    fn test_step_error_classification() {
        let e = StepError::Programmer {
            step: "[T]:[Step 1]".into(),
            message: "double entry".into(),
        };
        assert!(e.is_programmer_error());
        assert!(!e.is_verification_failure());
        assert!(e.captured().is_none());
    }

    #[test]
    fn test_timeout_and_transport_are_distinct() {
        let timeout = ExpectError::Timeout {
            duration: Duration::from_secs(1),
        };
        let refused = ExpectError::TransportFailure {
            target: "cm".into(),
            reason: "Connection refused".into(),
        };
        assert!(matches!(timeout, ExpectError::Timeout { .. }));
        assert!(refused.to_string().contains("Connection refused"));
    }
}

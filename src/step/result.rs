//! Per-action results

use std::any::Any;
use std::fmt;
use std::rc::Rc;

use crate::result::CapturedError;

/// Grade of one action.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Grade {
    /// The action returned a value
    Ok,
    /// The action failed
    Fail,
}

impl fmt::Display for Grade {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Grade::Ok => "OK",
            Grade::Fail => "FAIL",
        })
    }
}

/// Value returned by an action, kept both rendered and typed.
#[derive(Clone)]
pub struct ActionValue {
    rendered: String,
    value: Rc<dyn Any>,
}

impl ActionValue {
    /// Wrap a value.
    pub fn new<T: fmt::Debug + 'static>(value: T) -> Self {
        Self {
            rendered: format!("{value:?}"),
            value: Rc::new(value),
        }
    }

    /// `Debug` rendering of the value.
    pub fn rendered(&self) -> &str {
        &self.rendered
    }

    /// Borrow the value as `T`.
    pub fn downcast_ref<T: 'static>(&self) -> Option<&T> {
        self.value.downcast_ref::<T>()
    }
}

impl fmt::Debug for ActionValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.rendered)
    }
}

/// What an action produced. Every action result is one of these two.
#[derive(Debug, Clone)]
pub enum ActionOutcome {
    /// The action returned a value
    Success(ActionValue),
    /// The action returned an error
    Failure(CapturedError),
}

impl ActionOutcome {
    /// Whether the action succeeded.
    pub fn is_success(&self) -> bool {
        matches!(self, ActionOutcome::Success(_))
    }

    /// The value, on success.
    pub fn value(&self) -> Option<&ActionValue> {
        match self {
            ActionOutcome::Success(value) => Some(value),
            ActionOutcome::Failure(_) => None,
        }
    }

    /// The error, on failure.
    pub fn error(&self) -> Option<&CapturedError> {
        match self {
            ActionOutcome::Success(_) => None,
            ActionOutcome::Failure(error) => Some(error),
        }
    }
}

/// Record of one executed action.
#[derive(Debug, Clone)]
pub struct TestResult {
    /// Identifier of the owning step
    pub step: String,
    /// Action name
    pub action: String,
    /// OK or FAIL
    pub grade: Grade,
    /// Rendered value or error
    pub message: String,
    /// Value or captured error
    pub outcome: ActionOutcome,
}

/// One evaluation of a step's verification predicate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Verification {
    /// Caller supplied message
    pub message: String,
    /// Whether the predicate held
    pub passed: bool,
}

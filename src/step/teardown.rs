//! Teardown steps: every action runs, failures are tallied.

use std::fmt::Debug;

use super::{FailureMode, Grade, StepState, TestContext, TestResult, TestStep};
use crate::result::{ContinueOnFail, StepError};

/// Category used for teardown step identifiers.
const TEARDOWN_CATEGORY: &str = "TearDown";

/// A step whose actions all run regardless of individual failures.
///
/// Action errors and panics are recorded as FAIL results instead of being returned,
/// and one aggregate grade covers the whole teardown.
///
/// ```
/// use consolebench::step::{Grade, TearDown, TestContext};
///
/// let ctx = TestContext::new("WifiTest");
/// let mut teardown = TearDown::new(&ctx, "restore bench");
/// teardown.enter().unwrap();
/// teardown.call("disable ssid", || Ok("ok")).unwrap();
/// teardown.call("reboot ap", || -> anyhow::Result<()> { anyhow::bail!("ap unreachable") }).unwrap();
/// teardown.call("release lease", || Ok(true)).unwrap();
///
/// assert_eq!(teardown.results().len(), 3);
/// assert_eq!(teardown.grade(), Grade::Fail);
/// ```
pub struct TearDown<'a> {
    step: TestStep<'a>,
}

impl<'a> TearDown<'a> {
    /// Create a teardown step in `ctx`.
    pub fn new(ctx: &'a TestContext, name: impl Into<String>) -> Self {
        let mut step = TestStep::new(ctx, name, TEARDOWN_CATEGORY);
        step.set_failure_mode(FailureMode::ContinueOnFail);
        Self { step }
    }

    /// See [`TestStep::enter`].
    pub fn enter(&mut self) -> Result<(), StepError> {
        self.step.enter()
    }

    /// See [`TestStep::exit`].
    pub fn exit(&mut self) -> Result<(), StepError> {
        self.step.exit()
    }

    /// Enter, run `body`, exit. A failing `body` fails the teardown.
    pub fn scope<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<R, StepError>,
    ) -> Result<R, StepError> {
        self.step.enter()?;
        let result = body(self);
        if result.is_err() {
            self.step.failed = true;
        }
        if self.step.state() == StepState::Entered {
            self.step.exit()?;
        }
        result
    }

    /// Queue an action.
    pub fn add<T, F>(&mut self, name: impl Into<String>, action: F) -> &mut Self
    where
        T: Debug + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        self.step.add(name, action);
        self
    }

    /// Run every queued action.
    ///
    /// # Errors
    ///
    /// Only programmer errors; action failures are recorded.
    pub fn execute(&mut self) -> Result<(), StepError> {
        self.step.execute()
    }

    /// Run one action; `None` when it failed.
    ///
    /// # Errors
    ///
    /// Only programmer errors.
    pub fn call<T, F>(&mut self, name: impl Into<String>, action: F) -> Result<Option<T>, StepError>
    where
        T: Debug + Clone + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        match self.step.call(name, action) {
            Ok(value) => Ok(Some(value)),
            Err(StepError::Action { .. }) => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Run one action and compare its value with `expected`.
    ///
    /// A mismatch is recorded as a [`ContinueOnFail`] failure; the
    /// teardown carries on.
    pub fn call_expect<T, F>(
        &mut self,
        name: impl Into<String>,
        action: F,
        expected: T,
    ) -> Result<Option<T>, StepError>
    where
        T: Debug + Clone + PartialEq + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        self.call(name, move || {
            let actual = action()?;
            if actual == expected {
                Ok(actual)
            } else {
                Err(ContinueOnFail {
                    expected: format!("{expected:?}"),
                    actual: format!("{actual:?}"),
                }
                .into())
            }
        })
    }

    /// Results of every action so far.
    pub fn results(&self) -> &[TestResult] {
        self.step.results()
    }

    /// Whether every action so far succeeded.
    pub fn passed(&self) -> bool {
        self.step.passed()
    }

    /// Aggregate grade.
    pub fn grade(&self) -> Grade {
        if self.passed() {
            Grade::Ok
        } else {
            Grade::Fail
        }
    }

    /// `[Test]:[TearDown Step N]`
    pub fn identifier(&self) -> String {
        self.step.identifier()
    }
}

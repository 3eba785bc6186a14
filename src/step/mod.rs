//! Test-step orchestration.
//!
//! A [`TestStep`] queues named actions, runs them in order on
//! [`execute`](TestStep::execute), records one [`TestResult`] per action and
//! logs a banner for the whole step. [`TearDown`] keeps going past failing
//! actions; [`expect_raises`] turns "this must fail with X" into a check.
//!
//! ```
//! use consolebench::step::{TestContext, TestStep};
//!
//! # fn main() -> Result<(), consolebench::StepError> {
//! let ctx = TestContext::new("DhcpLeaseTest");
//! let mut step = TestStep::new(&ctx, "renew lease", "Setup");
//! assert_eq!(step.identifier(), "[DhcpLeaseTest]:[Setup Step 1]");
//!
//! step.scope(|s| {
//!     let lease = s.call("request lease", || Ok("10.0.0.42".to_string()))?;
//!     s.verify(move || lease.starts_with("10."), "lease from the bench subnet");
//!     s.add("log", || Ok(()));
//!     s.execute()
//! })?;
//! # Ok(())
//! # }
//! ```

mod negative;
mod result;
mod teardown;

pub use negative::{expect_raises, ExpectedError};
pub use result::{ActionOutcome, ActionValue, Grade, TestResult, Verification};
pub use teardown::TearDown;

use std::any::Any;
use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt::Debug;
use std::panic::{self, AssertUnwindSafe};

use crate::config::RunConfig;
use crate::result::{CapturedError, StepError};

/// Log target for step banners and action lines.
pub const STEP_TARGET: &str = "consolebench::step";

/// Per-category step counters of one test.
#[derive(Debug, Default)]
pub struct StepCounters {
    counts: RefCell<HashMap<String, usize>>,
}

impl StepCounters {
    /// Empty counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Take the next number for `category`, starting at 1.
    pub fn next(&self, category: &str) -> usize {
        let mut counts = self.counts.borrow_mut();
        let count = counts.entry(category.to_string()).or_insert(0);
        *count += 1;
        *count
    }

    /// Last number handed out for `category` (0 if none).
    pub fn current(&self, category: &str) -> usize {
        self.counts.borrow().get(category).copied().unwrap_or(0)
    }
}

/// One test instance: its name, step counters and run settings.
#[derive(Debug)]
pub struct TestContext {
    name: String,
    counters: StepCounters,
    config: RunConfig,
}

impl TestContext {
    /// Context with default run settings.
    pub fn new(name: impl Into<String>) -> Self {
        Self::with_config(name, RunConfig::default())
    }

    /// Context with explicit run settings.
    pub fn with_config(name: impl Into<String>, config: RunConfig) -> Self {
        Self {
            name: name.into(),
            counters: StepCounters::new(),
            config,
        }
    }

    /// Test name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step counters.
    pub fn counters(&self) -> &StepCounters {
        &self.counters
    }

    /// Run settings.
    pub fn config(&self) -> &RunConfig {
        &self.config
    }
}

/// Lifecycle of a step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepState {
    /// Built, not entered
    Created,
    /// Inside its scope
    Entered,
    /// Scope exited
    Closed,
}

/// How action errors are handled.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureMode {
    /// First error aborts the remaining actions and is returned
    Propagate,
    /// Errors and panics are recorded and later actions still run; the step still passes
    Capture,
    /// Errors and panics are recorded, later actions still run and the step fails
    ContinueOnFail,
}

type ActionFn<'a> = Box<dyn FnOnce() -> anyhow::Result<ActionValue> + 'a>;
type Predicate<'a> = Box<dyn Fn() -> bool + 'a>;

struct QueuedAction<'a> {
    name: String,
    run: ActionFn<'a>,
}

/// Turn a caught panic into an action error.
fn panic_error(payload: Box<dyn Any + Send>) -> anyhow::Error {
    let message = payload
        .downcast_ref::<&str>()
        .map(|s| s.to_string())
        .or_else(|| payload.downcast_ref::<String>().cloned())
        .unwrap_or_else(|| "non-string panic payload".to_string());
    anyhow::anyhow!("action panicked: {message}")
}

/// A numbered test step.
pub struct TestStep<'a> {
    ctx: &'a TestContext,
    name: String,
    category: String,
    number: usize,
    state: StepState,
    mode: FailureMode,
    queue: Vec<QueuedAction<'a>>,
    results: Vec<TestResult>,
    verify: Option<(Predicate<'a>, String)>,
    verifications: Vec<Verification>,
    failed: bool,
}

impl<'a> TestStep<'a> {
    /// Create a step; takes the next number for `category` in `ctx`.
    pub fn new(ctx: &'a TestContext, name: impl Into<String>, category: impl Into<String>) -> Self {
        let category = category.into();
        let number = ctx.counters.next(&category);
        Self {
            ctx,
            name: name.into(),
            category,
            number,
            state: StepState::Created,
            mode: FailureMode::Propagate,
            queue: Vec::new(),
            results: Vec::new(),
            verify: None,
            verifications: Vec::new(),
            failed: false,
        }
    }

    /// `[Test]:[Category Step N]`
    pub fn identifier(&self) -> String {
        format!(
            "[{}]:[{} Step {}]",
            self.ctx.name, self.category, self.number
        )
    }

    /// Step name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Step category.
    pub fn category(&self) -> &str {
        &self.category
    }

    /// Number within the category.
    pub fn number(&self) -> usize {
        self.number
    }

    /// Lifecycle state.
    pub fn state(&self) -> StepState {
        self.state
    }

    /// Owning test context.
    pub fn context(&self) -> &'a TestContext {
        self.ctx
    }

    /// Results of every action executed so far.
    pub fn results(&self) -> &[TestResult] {
        &self.results
    }

    /// Outcomes of the verification predicate so far.
    pub fn verifications(&self) -> &[Verification] {
        &self.verifications
    }

    /// Whether nothing has failed so far.
    pub fn passed(&self) -> bool {
        !self.failed
    }

    /// Current error handling mode.
    pub fn failure_mode(&self) -> FailureMode {
        self.mode
    }

    pub(crate) fn set_failure_mode(&mut self, mode: FailureMode) -> FailureMode {
        std::mem::replace(&mut self.mode, mode)
    }

    fn programmer(&self, message: &str) -> StepError {
        StepError::Programmer {
            step: self.identifier(),
            message: message.to_string(),
        }
    }

    /// Enter the step's scope and log its banner.
    ///
    /// # Errors
    ///
    /// A programmer error if the step was already entered.
    pub fn enter(&mut self) -> Result<(), StepError> {
        match self.state {
            StepState::Created => {
                self.state = StepState::Entered;
                tracing::info!(target: STEP_TARGET, "{} {} >>>", self.identifier(), self.name);
                Ok(())
            }
            StepState::Entered => Err(self.programmer("step entered twice")),
            StepState::Closed => Err(self.programmer("step re-entered after it was closed")),
        }
    }

    /// Leave the step's scope and log the closing banner.
    pub fn exit(&mut self) -> Result<(), StepError> {
        if self.state != StepState::Entered {
            return Err(self.programmer("exit() without enter()"));
        }
        self.close();
        Ok(())
    }

    fn close(&mut self) {
        self.state = StepState::Closed;
        if self.failed {
            tracing::warn!(target: STEP_TARGET, "{} {} <<< FAIL", self.identifier(), self.name);
        } else {
            tracing::info!(target: STEP_TARGET, "{} {} <<< PASS", self.identifier(), self.name);
        }
    }

    /// Enter, run `body`, exit. The step is closed even when `body` fails.
    pub fn scope<R>(
        &mut self,
        body: impl FnOnce(&mut Self) -> Result<R, StepError>,
    ) -> Result<R, StepError> {
        self.enter()?;
        let result = body(self);
        if result.is_err() {
            self.failed = true;
        }
        if self.state == StepState::Entered {
            self.close();
        }
        result
    }

    /// Queue an action.
    pub fn add<T, F>(&mut self, name: impl Into<String>, action: F) -> &mut Self
    where
        T: Debug + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        self.queue.push(QueuedAction {
            name: name.into(),
            run: Box::new(move || action().map(ActionValue::new)),
        });
        self
    }

    /// Set the predicate checked after every `execute`.
    pub fn verify(&mut self, predicate: impl Fn() -> bool + 'a, message: impl Into<String>) -> &mut Self {
        self.verify = Some((Box::new(predicate), message.into()));
        self
    }

    /// Same as [`verify`](Self::verify).
    pub fn add_verify(
        &mut self,
        predicate: impl Fn() -> bool + 'a,
        message: impl Into<String>,
    ) -> &mut Self {
        self.verify(predicate, message)
    }

    /// Run the queued actions in order, then the verification predicate.
    ///
    /// The queue is empty afterwards, whatever happened.
    ///
    /// # Errors
    ///
    /// - a programmer error outside the step's scope or with nothing queued
    /// - [`StepError::Action`] for the first failing action (normal steps);
    ///   later actions do not run
    /// - [`StepError::Verification`] when the predicate does not hold
    pub fn execute(&mut self) -> Result<(), StepError> {
        if self.state != StepState::Entered {
            return Err(self.programmer("execute() outside the step's scope"));
        }
        if self.queue.is_empty() {
            return Err(self.programmer("execute() with no queued action"));
        }

        let queue = std::mem::take(&mut self.queue);
        let mut action_failed = false;
        for action in queue {
            let id = self.identifier();
            let run = action.run;
            let ran = match self.mode {
                FailureMode::Propagate => run(),
                FailureMode::Capture | FailureMode::ContinueOnFail => {
                    panic::catch_unwind(AssertUnwindSafe(run))
                        .unwrap_or_else(|payload| Err(panic_error(payload)))
                }
            };
            match ran {
                Ok(value) => {
                    tracing::info!(target: STEP_TARGET, "{id} {}: DONE {}", action.name, value.rendered());
                    self.results.push(TestResult {
                        step: id,
                        action: action.name,
                        grade: Grade::Ok,
                        message: value.rendered().to_string(),
                        outcome: ActionOutcome::Success(value),
                    });
                }
                Err(error) => {
                    let error = CapturedError::new(error);
                    action_failed = true;
                    match self.mode {
                        FailureMode::Propagate => {
                            tracing::error!(target: STEP_TARGET, "{id} {}: FAIL {error}", action.name)
                        }
                        FailureMode::Capture | FailureMode::ContinueOnFail => {
                            tracing::warn!(target: STEP_TARGET, "{id} {}: FAIL (captured) {error}", action.name)
                        }
                    }
                    self.results.push(TestResult {
                        step: id.clone(),
                        action: action.name.clone(),
                        grade: Grade::Fail,
                        message: error.to_string(),
                        outcome: ActionOutcome::Failure(error.clone()),
                    });
                    match self.mode {
                        FailureMode::Propagate => {
                            self.failed = true;
                            return Err(StepError::Action {
                                step: id,
                                action: action.name,
                                error,
                            });
                        }
                        FailureMode::ContinueOnFail => self.failed = true,
                        FailureMode::Capture => {}
                    }
                }
            }
        }

        if !action_failed {
            self.run_verify()?;
        }
        Ok(())
    }

    fn run_verify(&mut self) -> Result<(), StepError> {
        let Some((predicate, message)) = &self.verify else {
            return Ok(());
        };
        let passed = predicate();
        let message = message.clone();
        let id = self.identifier();
        self.verifications.push(Verification {
            message: message.clone(),
            passed,
        });
        if passed {
            tracing::info!(target: STEP_TARGET, "{id} verify: PASSED {message}");
            Ok(())
        } else {
            tracing::error!(target: STEP_TARGET, "{id} verify: FAILED {message}");
            self.failed = true;
            Err(StepError::Verification { step: id, message })
        }
    }

    /// Queue one action, execute, and return its value.
    ///
    /// # Errors
    ///
    /// Same as [`execute`](Self::execute). In capture modes a failed
    /// action has no value and comes back as [`StepError::Action`].
    pub fn call<T, F>(&mut self, name: impl Into<String>, action: F) -> Result<T, StepError>
    where
        T: Debug + Clone + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        let name = name.into();
        self.add(name.clone(), action);
        self.execute()?;
        let id = self.identifier();
        match self.results.last().map(|r| &r.outcome) {
            Some(ActionOutcome::Success(value)) => value.downcast_ref::<T>().cloned().ok_or_else(|| {
                StepError::Programmer {
                    step: id,
                    message: format!("action '{name}' returned an unexpected type"),
                }
            }),
            Some(ActionOutcome::Failure(error)) => Err(StepError::Action {
                step: id,
                action: name,
                error: error.clone(),
            }),
            None => Err(self.programmer("no result recorded")),
        }
    }

    /// Run `action`, which must fail with an error of type `E`.
    ///
    /// Returns the captured error so callers can look at its fields.
    ///
    /// # Errors
    ///
    /// [`StepError::Verification`] when the action succeeds or fails with
    /// another error type.
    pub fn assert_raises<E, T, F>(
        &mut self,
        name: impl Into<String>,
        action: F,
    ) -> Result<CapturedError, StepError>
    where
        E: std::fmt::Display + Debug + Send + Sync + 'static,
        T: Debug + 'static,
        F: FnOnce() -> anyhow::Result<T> + 'a,
    {
        let name = name.into();
        let previous = self.set_failure_mode(FailureMode::Capture);
        self.add(name.clone(), action);
        let executed = self.execute();
        self.set_failure_mode(previous);
        executed?;

        let id = self.identifier();
        let expected = std::any::type_name::<E>();
        let message = match self.results.last().map(|r| &r.outcome) {
            Some(ActionOutcome::Failure(error)) if error.is::<E>() => return Ok(error.clone()),
            Some(ActionOutcome::Failure(error)) => {
                format!("'{name}' expected to fail with {expected}, failed with: {error}")
            }
            Some(ActionOutcome::Success(value)) => format!(
                "'{name}' expected to fail with {expected}, returned {}",
                value.rendered()
            ),
            None => format!("'{name}' produced no result"),
        };
        tracing::error!(target: STEP_TARGET, "{id} {message}");
        self.failed = true;
        Err(StepError::Verification { step: id, message })
    }
}

impl Drop for TestStep<'_> {
    fn drop(&mut self) {
        if self.state == StepState::Entered {
            self.close();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::bail;
    use std::cell::Cell;

    #[test]
    fn test_numbering_per_category() {
        let ctx = TestContext::new("MyTest");
        let setup1 = TestStep::new(&ctx, "a", "Setup");
        let test1 = TestStep::new(&ctx, "b", "Test");
        let setup2 = TestStep::new(&ctx, "c", "Setup");
        assert_eq!(setup1.identifier(), "[MyTest]:[Setup Step 1]");
        assert_eq!(test1.identifier(), "[MyTest]:[Test Step 1]");
        assert_eq!(setup2.identifier(), "[MyTest]:[Setup Step 2]");
        assert_eq!(ctx.counters().current("Setup"), 2);

        let other = TestContext::new("OtherTest");
        assert_eq!(TestStep::new(&other, "d", "Setup").number(), 1);
    }

    #[test]
    fn test_double_enter_is_programmer_error() {
        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        step.enter().unwrap();
        assert!(step.enter().unwrap_err().is_programmer_error());
    }

    #[test]
    fn test_empty_execute_is_programmer_error() {
        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        let err = step.scope(|s| s.execute()).unwrap_err();
        assert!(err.is_programmer_error());
        assert_eq!(step.state(), StepState::Closed);
    }

    #[test]
    fn test_execute_outside_scope() {
        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        step.add("noop", || Ok(()));
        assert!(step.execute().unwrap_err().is_programmer_error());
    }

    #[test]
    fn test_queue_cleared_between_executes() {
        let ctx = TestContext::new("T");
        let runs = Cell::new(0);
        let mut step = TestStep::new(&ctx, "poll", "Test");
        step.scope(|s| {
            for _ in 0..3 {
                s.add("tick", || {
                    runs.set(runs.get() + 1);
                    Ok(runs.get())
                });
                s.execute()?;
            }
            Ok(())
        })
        .unwrap();
        assert_eq!(runs.get(), 3);
        assert_eq!(step.results().len(), 3);
    }

    #[test]
    fn test_call_returns_value() {
        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        let value = step
            .scope(|s| s.call("answer", || Ok(42u32)))
            .unwrap();
        assert_eq!(value, 42);
        assert_eq!(step.results()[0].message, "42");
    }

    #[test]
    fn test_verify_skipped_after_failed_action() {
        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        let err = step
            .scope(|s| {
                s.verify(|| true, "never evaluated");
                s.add("boom", || -> anyhow::Result<()> { bail!("boom") });
                s.execute()
            })
            .unwrap_err();
        assert!(matches!(err, StepError::Action { .. }));
        assert!(step.verifications().is_empty());
        assert!(!step.passed());
    }

    #[test]
    fn test_assert_raises_wrong_type() {
        #[derive(Debug, thiserror::Error)]
        #[error("value error")]
        struct ValueError;

        let ctx = TestContext::new("T");
        let mut step = TestStep::new(&ctx, "s", "Test");
        step.enter().unwrap();
        let err = step
            .assert_raises::<ValueError, _, _>("parse", || -> anyhow::Result<()> {
                bail!("something else")
            })
            .unwrap_err();
        assert!(err.is_verification_failure());
        assert_eq!(step.failure_mode(), FailureMode::Propagate);

        let captured = step
            .assert_raises::<ValueError, _, _>("parse", || -> anyhow::Result<()> {
                Err(ValueError.into())
            })
            .unwrap();
        assert!(captured.is::<ValueError>());
    }
}

//! Negative testing: a scope that must fail in one specific way.

use std::fmt;
use std::panic::{self, AssertUnwindSafe};

use super::{ActionOutcome, FailureMode, TestStep, STEP_TARGET};
use crate::result::{CapturedError, StepError};

/// An error type the body of [`expect_raises`] is expected to produce.
#[derive(Clone, Copy)]
pub struct ExpectedError {
    name: &'static str,
    check: fn(&anyhow::Error) -> bool,
}

impl ExpectedError {
    /// Expect an error of type `E`.
    pub fn of<E>() -> Self
    where
        E: fmt::Display + fmt::Debug + Send + Sync + 'static,
    {
        Self {
            name: std::any::type_name::<E>(),
            check: |error| error.is::<E>(),
        }
    }

    /// Type name of the expected error.
    pub fn name(&self) -> &'static str {
        self.name
    }

    /// Whether `error` is of the expected type.
    pub fn matches(&self, error: &CapturedError) -> bool {
        (self.check)(error.inner())
    }
}

impl fmt::Debug for ExpectedError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name)
    }
}

/// Run `body` with action errors captured, then require exactly one of
/// them, of one of the `expected` types.
///
/// The step's previous failure mode is restored before this returns, also
/// when `body` fails or panics.
///
/// # Errors
///
/// - programmer errors from `body` are passed through
/// - otherwise [`StepError::Verification`] describing what was expected
///   and what was captured, unless exactly one matching error was captured
///
/// ```
/// use consolebench::step::{expect_raises, ExpectedError, TestContext, TestStep};
///
/// #[derive(Debug, thiserror::Error)]
/// #[error("fault code {code}")]
/// struct SoapFault {
///     code: u32,
/// }
///
/// let ctx = TestContext::new("AcsTest");
/// let mut step = TestStep::new(&ctx, "set read-only param", "Test");
/// step.enter().unwrap();
///
/// let captured = expect_raises(&mut step, &[ExpectedError::of::<SoapFault>()], |s| {
///     s.add("SetParameterValues", || -> anyhow::Result<()> {
///         Err(SoapFault { code: 9008 }.into())
///     });
///     s.execute()
/// })
/// .unwrap();
/// assert_eq!(captured.downcast_ref::<SoapFault>().unwrap().code, 9008);
/// ```
pub fn expect_raises<'a, R>(
    step: &mut TestStep<'a>,
    expected: &[ExpectedError],
    body: impl FnOnce(&mut TestStep<'a>) -> Result<R, StepError>,
) -> Result<CapturedError, StepError> {
    let start = step.results.len();
    let previous = step.set_failure_mode(FailureMode::Capture);
    let outcome = panic::catch_unwind(AssertUnwindSafe(|| body(&mut *step)));
    step.set_failure_mode(previous);

    let body_result = match outcome {
        Ok(result) => result,
        Err(panic) => panic::resume_unwind(panic),
    };
    if let Err(error) = body_result {
        if !matches!(error, StepError::Action { .. }) {
            return Err(error);
        }
    }

    let captured: Vec<CapturedError> = step.results[start..]
        .iter()
        .filter_map(|r| match &r.outcome {
            ActionOutcome::Failure(error) => Some(error.clone()),
            ActionOutcome::Success(_) => None,
        })
        .collect();

    if let [only] = captured.as_slice() {
        if expected.iter().any(|e| e.matches(only)) {
            return Ok(only.clone());
        }
    }

    let expected_names: Vec<&str> = expected.iter().map(ExpectedError::name).collect();
    let captured_text: Vec<String> = captured.iter().map(|e| e.to_string()).collect();
    let message = format!(
        "expected exactly one of [{}], captured {} error(s): [{}]",
        expected_names.join(", "),
        captured.len(),
        captured_text.join("; ")
    );
    let id = step.identifier();
    tracing::error!(target: STEP_TARGET, "{id} {message}");
    step.failed = true;
    Err(StepError::Verification { step: id, message })
}

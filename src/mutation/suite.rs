//! Test suites, per-run context and collected results.

use std::any::Any;
use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::inject::TargetRegistry;
use super::output::{OutputSink, SinkWriter};
use super::runner::CancelToken;

/// One failing or erroring test.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestFailure {
    /// Fully qualified test id (`suite::test`).
    pub test_id: String,
    /// Assertion message, panic payload or captured output tail.
    pub trace: String,
}

/// Results accumulated while a suite runs.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TestResult {
    /// Stop after the first failure, error or environment error.
    pub fail_fast: bool,
    /// Number of tests started.
    pub tests_run: usize,
    /// Assertion failures in the order they were recorded.
    pub failures: Vec<TestFailure>,
    /// Non-assertion errors in the order they were recorded.
    pub errors: Vec<TestFailure>,
    /// The execution environment itself broke (not a test verdict).
    pub environment_error: Option<String>,
}

impl TestResult {
    /// Result that keeps running after failures.
    pub fn new() -> Self {
        Self::default()
    }

    /// Result that stops at the first failure.
    pub fn fail_fast() -> Self {
        Self {
            fail_fast: true,
            ..Self::default()
        }
    }

    /// No failures, errors or environment errors.
    pub fn was_successful(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty() && self.environment_error.is_none()
    }

    /// True once a fail-fast result has seen something go wrong.
    pub fn should_stop(&self) -> bool {
        self.fail_fast && !self.was_successful()
    }

    /// The test blamed for a kill: first failure, else first error.
    pub fn first_failure(&self) -> Option<&TestFailure> {
        self.failures.first().or_else(|| self.errors.first())
    }

    /// Mark a test as started.
    pub fn start_test(&mut self) {
        self.tests_run += 1;
    }

    /// Record an assertion failure.
    pub fn add_failure(&mut self, test_id: impl Into<String>, trace: impl Into<String>) {
        self.failures.push(TestFailure {
            test_id: test_id.into(),
            trace: trace.into(),
        });
    }

    /// Record a non-assertion error.
    pub fn add_error(&mut self, test_id: impl Into<String>, trace: impl Into<String>) {
        self.errors.push(TestFailure {
            test_id: test_id.into(),
            trace: trace.into(),
        });
    }

    /// Record an environment error. Only the first one is kept.
    pub fn add_environment_error(&mut self, message: impl Into<String>) {
        if self.environment_error.is_none() {
            self.environment_error = Some(message.into());
        }
    }

    /// Record the verdict of one test.
    pub fn add_outcome(&mut self, test_id: &str, outcome: Result<(), TestError>) {
        match outcome {
            Ok(()) => {}
            Err(TestError::Assertion(trace)) => self.add_failure(test_id, trace),
            Err(TestError::Error(trace)) => self.add_error(test_id, trace),
            Err(TestError::Environment(message)) => {
                self.add_environment_error(format!("{test_id}: {message}"));
            }
        }
    }
}

/// Why a single test did not pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TestError {
    /// An assertion in the test failed.
    Assertion(String),
    /// The code under test errored or panicked.
    Error(String),
    /// The test could not run: the program is unusable as a test subject.
    Environment(String),
}

impl fmt::Display for TestError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Assertion(msg) => write!(f, "assertion failed: {msg}"),
            Self::Error(msg) => write!(f, "error: {msg}"),
            Self::Environment(msg) => write!(f, "environment error: {msg}"),
        }
    }
}

/// Everything a test needs from the engine during one run.
#[derive(Debug)]
pub struct TestContext<V> {
    registry: Arc<TargetRegistry<V>>,
    cancel: CancelToken,
    output: OutputSink,
}

impl<V> Clone for TestContext<V> {
    fn clone(&self) -> Self {
        Self {
            registry: Arc::clone(&self.registry),
            cancel: self.cancel.clone(),
            output: self.output.clone(),
        }
    }
}

impl<V> TestContext<V> {
    /// Assemble a context.
    pub fn new(registry: Arc<TargetRegistry<V>>, cancel: CancelToken, output: OutputSink) -> Self {
        Self {
            registry,
            cancel,
            output,
        }
    }

    /// Resolve the program currently bound to `name`.
    pub fn target(&self, name: &str) -> Result<Arc<V>, TestError> {
        self.registry
            .resolve(name)
            .ok_or_else(|| TestError::Environment(format!("target `{name}` is not registered")))
    }

    /// Set once the run has been abandoned; long-running tests should return.
    pub fn is_cancelled(&self) -> bool {
        self.cancel.is_cancelled()
    }

    /// Cancellation token of this run.
    pub fn cancel_token(&self) -> &CancelToken {
        &self.cancel
    }

    /// Output sink of this run.
    pub fn output(&self) -> &OutputSink {
        &self.output
    }

    /// Program stdout, gated by suppression. Abandoned runs are muted for good.
    pub fn stdout(&self) -> SinkWriter<std::io::Stdout> {
        if self.is_cancelled() {
            return OutputSink::muted().stdout();
        }
        self.output.stdout()
    }
}

/// A named group of tests run against whatever the registry currently binds.
pub trait TestSuite<V>: Send + Sync {
    /// Suite name.
    fn name(&self) -> &str;

    /// Run the suite (or only the test named by `filter`), appending to `result`.
    /// Implementations must stop when `result.should_stop()` or the context is
    /// cancelled.
    fn run(&self, ctx: &TestContext<V>, filter: Option<&str>, result: &mut TestResult);
}

/// A loaded suite plus its baseline measurement, shared read-only across mutants.
pub struct TestSuiteHandle<V> {
    /// The suite itself.
    pub suite: Arc<dyn TestSuite<V>>,
    /// Narrowing filter: run only this test.
    pub filter: Option<String>,
    /// Wall time of the successful unmutated run.
    pub baseline: Duration,
}

impl<V> Clone for TestSuiteHandle<V> {
    fn clone(&self) -> Self {
        Self {
            suite: Arc::clone(&self.suite),
            filter: self.filter.clone(),
            baseline: self.baseline,
        }
    }
}

impl<V> fmt::Debug for TestSuiteHandle<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TestSuiteHandle")
            .field("suite", &self.suite.name())
            .field("filter", &self.filter)
            .field("baseline", &self.baseline)
            .finish()
    }
}

type TestFn<V> = dyn Fn(&TestContext<V>) -> Result<(), TestError> + Send + Sync;

/// In-process suite built from closures.
pub struct FnSuite<V> {
    name: String,
    tests: Vec<(String, Box<TestFn<V>>)>,
}

impl<V> FnSuite<V> {
    /// Empty suite.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            tests: Vec::new(),
        }
    }

    /// Append a test. Tests run in insertion order.
    pub fn test<F>(mut self, name: impl Into<String>, test: F) -> Self
    where
        F: Fn(&TestContext<V>) -> Result<(), TestError> + Send + Sync + 'static,
    {
        self.tests.push((name.into(), Box::new(test)));
        self
    }

    /// Test names in run order.
    pub fn test_names(&self) -> impl Iterator<Item = &str> {
        self.tests.iter().map(|(name, _)| name.as_str())
    }
}

impl<V> TestSuite<V> for FnSuite<V> {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &TestContext<V>, filter: Option<&str>, result: &mut TestResult) {
        for (name, test) in &self.tests {
            if filter.is_some_and(|wanted| wanted != name) {
                continue;
            }
            if result.should_stop() || ctx.is_cancelled() {
                break;
            }
            let test_id = format!("{}::{name}", self.name);
            result.start_test();
            let outcome = match catch_unwind(AssertUnwindSafe(|| test(ctx))) {
                Ok(outcome) => outcome,
                Err(payload) => Err(TestError::Error(panic_message(payload.as_ref()))),
            };
            result.add_outcome(&test_id, outcome);
        }
    }
}

/// Best-effort text of a panic payload.
pub fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        (*msg).to_string()
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg.clone()
    } else {
        "panic with non-string payload".to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn context() -> TestContext<i64> {
        let registry = Arc::new(TargetRegistry::new());
        registry.register("calc", Arc::new(3));
        TestContext::new(registry, CancelToken::new(), OutputSink::new(false))
    }

    fn five_test_suite() -> FnSuite<i64> {
        FnSuite::new("calc_tests")
            .test("test_1", |_| Ok(()))
            .test("test_2", |_| Err(TestError::Assertion("2 != 3".into())))
            .test("test_3", |_| Ok(()))
            .test("test_4", |_| Err(TestError::Assertion("4 != 5".into())))
            .test("test_5", |_| Ok(()))
    }

    #[test]
    fn fail_fast_stops_at_first_failure() {
        let mut result = TestResult::fail_fast();
        five_test_suite().run(&context(), None, &mut result);

        assert_eq!(result.tests_run, 2);
        assert_eq!(result.failures.len(), 1);
        assert_eq!(
            result.first_failure().map(|f| f.test_id.as_str()),
            Some("calc_tests::test_2")
        );
    }

    #[test]
    fn full_run_collects_every_failure() {
        let mut result = TestResult::new();
        five_test_suite().run(&context(), None, &mut result);

        assert_eq!(result.tests_run, 5);
        assert_eq!(result.failures.len(), 2);
    }

    #[test]
    fn filter_runs_only_the_named_test() {
        let mut result = TestResult::new();
        five_test_suite().run(&context(), Some("test_3"), &mut result);

        assert_eq!(result.tests_run, 1);
        assert!(result.was_successful());
    }

    #[test]
    fn failures_take_priority_over_errors() {
        let mut result = TestResult::new();
        result.add_error("suite::errored_first", "boom");
        result.add_failure("suite::failed_second", "1 != 2");

        let killer = result.first_failure().expect("killer should exist");
        assert_eq!(killer.test_id, "suite::failed_second");
    }

    #[test]
    fn errors_are_used_when_no_failures() {
        let mut result = TestResult::new();
        result.add_error("suite::a", "boom");
        result.add_error("suite::b", "bang");
        assert_eq!(
            result.first_failure().map(|f| f.test_id.as_str()),
            Some("suite::a")
        );
    }

    #[test]
    fn panics_are_recorded_as_errors() {
        let suite = FnSuite::new("panicky").test("test_panic", |_: &TestContext<i64>| {
            panic!("index out of bounds")
        });
        let mut result = TestResult::fail_fast();
        suite.run(&context(), None, &mut result);

        assert!(result.failures.is_empty());
        assert_eq!(result.errors.len(), 1);
        assert!(result.errors[0].trace.contains("index out of bounds"));
    }

    #[test]
    fn missing_target_is_an_environment_error() {
        let suite = FnSuite::new("lookup").test("test_lookup", |ctx: &TestContext<i64>| {
            ctx.target("missing").map(|_| ())
        });
        let mut result = TestResult::fail_fast();
        suite.run(&context(), None, &mut result);

        assert!(result.environment_error.is_some());
        assert!(result.should_stop());
    }

    #[test]
    fn tests_see_the_registered_target() {
        let suite = FnSuite::new("lookup").test("test_value", |ctx: &TestContext<i64>| {
            let value = ctx.target("calc")?;
            if *value == 3 {
                Ok(())
            } else {
                Err(TestError::Assertion(format!("{value} != 3")))
            }
        });
        let mut result = TestResult::new();
        suite.run(&context(), None, &mut result);
        assert!(result.was_successful());
    }
}

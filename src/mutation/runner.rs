//! Bounded test execution.
//!
//! A run moves `Pending -> Running -> {Completed, TimedOut}`. The suites run on
//! their own thread (the execution unit) while the caller blocks on a bounded
//! wait. When the deadline passes the unit is cancelled: cooperative code and
//! child processes stop promptly, anything else is detached and muted.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, RecvTimeoutError};
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use super::score::Outcome;
use super::suite::{TestContext, TestFailure, TestResult, TestSuiteHandle, panic_message};

/// Out-of-band stop request shared with an execution unit.
#[derive(Debug, Clone, Default)]
pub struct CancelToken(Arc<AtomicBool>);

impl CancelToken {
    /// Fresh, not cancelled.
    pub fn new() -> Self {
        Self::default()
    }

    /// Request cancellation. Idempotent.
    pub fn cancel(&self) {
        self.0.store(true, Ordering::SeqCst);
    }

    /// Whether cancellation was requested.
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::SeqCst)
    }
}

/// Deadline for one mutant run: `timeout_factor * baseline`, or `unit` when the
/// baseline is not longer than one unit. Never below `unit`; a product too large
/// for `Duration` saturates at `Duration::MAX`, and a factor that is not positive
/// (including NaN) falls back to `unit`.
pub fn deadline(timeout_factor: f64, baseline: Duration, unit: Duration) -> Duration {
    if baseline <= unit || !(timeout_factor > 0.0) {
        return unit;
    }
    Duration::try_from_secs_f64(baseline.as_secs_f64() * timeout_factor)
        .unwrap_or(Duration::MAX)
        .max(unit)
}

/// Lifecycle of one bounded run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunState {
    /// Not started.
    Pending,
    /// Execution unit spawned.
    Running,
    /// Finished within the deadline, whatever the test verdicts.
    Completed(TestResult),
    /// Deadline elapsed; the unit was cancelled.
    TimedOut,
}

impl RunState {
    /// `Completed` or `TimedOut`.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Completed(_) | Self::TimedOut)
    }
}

/// What happened to the execution unit after the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnitFate {
    /// Thread finished and was joined.
    Joined,
    /// Thread ignored cancellation within the grace period and was detached.
    Leaked,
}

/// Terminal classification of a run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    /// The environment broke before any test verdict.
    Incompetent {
        /// Environment error message.
        error: String,
    },
    /// Deadline exceeded.
    TimedOut,
    /// A test failed or errored; `killer` is the first failure, else the first error.
    Killed {
        /// Blamed test.
        killer: TestFailure,
    },
    /// Every test passed.
    Survived,
}

impl Verdict {
    /// Ledger outcome for this verdict.
    pub fn outcome(&self) -> Outcome {
        match self {
            Self::Incompetent { .. } => Outcome::Incompetent,
            Self::TimedOut => Outcome::TimedOut,
            Self::Killed { .. } => Outcome::Killed,
            Self::Survived => Outcome::Survived,
        }
    }
}

/// Classify a terminal run state. Non-terminal states yield `None`.
pub fn classify(state: &RunState) -> Option<Verdict> {
    match state {
        RunState::Pending | RunState::Running => None,
        RunState::TimedOut => Some(Verdict::TimedOut),
        RunState::Completed(result) => {
            if let Some(error) = &result.environment_error {
                return Some(Verdict::Incompetent {
                    error: error.clone(),
                });
            }
            match result.first_failure() {
                Some(killer) => Some(Verdict::Killed {
                    killer: killer.clone(),
                }),
                None => Some(Verdict::Survived),
            }
        }
    }
}

/// Result of one bounded run.
#[derive(Debug, Clone)]
pub struct Execution {
    /// Terminal state.
    pub state: RunState,
    /// Wall time until the state became terminal.
    pub elapsed: Duration,
    /// Fate of the execution unit.
    pub unit: UnitFate,
}

impl Execution {
    /// Classification of this run.
    pub fn verdict(&self) -> Verdict {
        classify(&self.state).unwrap_or(Verdict::TimedOut)
    }
}

/// Runs suites on a cancellable execution unit with an optional deadline.
#[derive(Debug, Clone)]
pub struct BoundedRunner {
    kill_grace: Duration,
}

impl Default for BoundedRunner {
    fn default() -> Self {
        Self::new(Duration::from_secs(2))
    }
}

impl BoundedRunner {
    /// `kill_grace` bounds how long a cancelled unit may take to wind down.
    pub fn new(kill_grace: Duration) -> Self {
        Self { kill_grace }
    }

    /// Run `suites` in order against `ctx`. With `deadline == None` the wait is
    /// unbounded (baseline runs). Output is suppressed for the duration.
    pub fn execute<V>(
        &self,
        label: &str,
        suites: &[TestSuiteHandle<V>],
        ctx: &TestContext<V>,
        fail_fast: bool,
        deadline: Option<Duration>,
    ) -> Execution
    where
        V: Send + Sync + 'static,
    {
        let _quiet = ctx.output().suppress();
        let mut state = RunState::Pending;
        debug!(label, ?deadline, ?state, "preparing run");

        let (tx, rx) = mpsc::channel::<TestResult>();
        let unit_suites: Vec<TestSuiteHandle<V>> = suites.to_vec();
        let unit_ctx = ctx.clone();
        let unit_label = label.to_string();
        let started = Instant::now();

        let spawned = thread::Builder::new()
            .name(format!("mutscope-{label}"))
            .spawn(move || {
                let mut result = if fail_fast {
                    TestResult::fail_fast()
                } else {
                    TestResult::new()
                };
                let run = catch_unwind(AssertUnwindSafe(|| {
                    for handle in &unit_suites {
                        if result.should_stop() || unit_ctx.is_cancelled() {
                            break;
                        }
                        handle
                            .suite
                            .run(&unit_ctx, handle.filter.as_deref(), &mut result);
                    }
                }));
                if let Err(payload) = run {
                    result.add_error(unit_label, panic_message(payload.as_ref()));
                }
                let _ = tx.send(result);
            });

        let handle = match spawned {
            Ok(handle) => handle,
            Err(err) => {
                warn!(label, error = %err, "failed to spawn execution unit");
                let mut result = TestResult::new();
                result.add_environment_error(format!("failed to spawn execution unit: {err}"));
                return Execution {
                    state: RunState::Completed(result),
                    elapsed: started.elapsed(),
                    unit: UnitFate::Joined,
                };
            }
        };
        state = RunState::Running;
        debug!(label, ?state, "execution unit started");

        let received = match deadline {
            Some(limit) => rx.recv_timeout(limit),
            None => rx.recv().map_err(|_| RecvTimeoutError::Disconnected),
        };

        let (state, unit) = match received {
            Ok(result) => {
                let _ = handle.join();
                (RunState::Completed(result), UnitFate::Joined)
            }
            Err(RecvTimeoutError::Disconnected) => {
                let _ = handle.join();
                let mut result = TestResult::new();
                result.add_environment_error("execution unit exited without reporting");
                (RunState::Completed(result), UnitFate::Joined)
            }
            Err(RecvTimeoutError::Timeout) => {
                let elapsed = started.elapsed();
                ctx.cancel_token().cancel();
                let unit = match rx.recv_timeout(self.kill_grace) {
                    Ok(_) | Err(RecvTimeoutError::Disconnected) => {
                        let _ = handle.join();
                        UnitFate::Joined
                    }
                    Err(RecvTimeoutError::Timeout) => {
                        warn!(
                            label,
                            grace_ms = self.kill_grace.as_millis() as u64,
                            "execution unit ignored cancellation, detaching it"
                        );
                        UnitFate::Leaked
                    }
                };
                debug!(label, elapsed_ms = elapsed.as_millis() as u64, ?unit, "run timed out");
                return Execution {
                    state: RunState::TimedOut,
                    elapsed,
                    unit,
                };
            }
        };

        Execution {
            state,
            elapsed: started.elapsed(),
            unit,
        }
    }
}

//! Top-level mutation run: baseline check, generation, evaluation, scoring.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use similar::{ChangeTag, TextDiff};
use thiserror::Error;
use tracing::{debug, info, warn};

use super::config::{ConfigError, MutationConfig};
use super::events::{MutationEvent, Notifier, SuiteTiming, View};
use super::generator::{Mutation, Mutator, SyntaxTree};
use super::inject::TargetRegistry;
use super::interrupt::InterruptFlag;
use super::materialize::{Materializer, MutantIdentity};
use super::output::OutputSink;
use super::runner::{BoundedRunner, CancelToken, RunState, UnitFate, Verdict, deadline};
use super::score::{MutationScore, Outcome};
use super::suite::{TestContext, TestResult, TestSuiteHandle};
use super::target::{LoadError, Target, TargetLoader, TestLoader};
use super::views::JsonLinesView;

/// Errors that abort a whole run.
#[derive(Debug, Error)]
pub enum ControllerError {
    /// The configuration cannot drive a run.
    #[error(transparent)]
    Config(#[from] ConfigError),
    /// A target or suite could not be loaded.
    #[error(transparent)]
    Load(#[from] LoadError),
    /// The unmutated program fails its own tests.
    #[error("tests fail on the unmutated program ({suite})")]
    BaselineFailure {
        /// Failing suite.
        suite: String,
        /// Its baseline result.
        result: TestResult,
    },
}

/// Accumulated wall time per pipeline stage.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StageTimings {
    /// Parsing targets.
    pub parse: Duration,
    /// Enumerating mutants.
    pub generate: Duration,
    /// Building variants.
    pub materialize: Duration,
    /// Bounded test runs.
    pub run: Duration,
}

/// Outcome of a run that was not aborted.
#[derive(Debug, Clone, PartialEq)]
pub struct RunReport {
    /// Final ledger.
    pub score: MutationScore,
    /// Total wall time.
    pub duration: Duration,
    /// Per-stage wall time.
    pub timings: StageTimings,
    /// True when an operator interrupt cut the run short.
    pub interrupted: bool,
}

/// Orchestrates a mutation run over pluggable collaborators.
pub struct MutationController<T, V> {
    target_loader: Box<dyn TargetLoader<T, V>>,
    test_loader: Box<dyn TestLoader<V>>,
    mutator: Mutator<T>,
    materializer: Box<dyn Materializer<T, V>>,
    notifier: Notifier,
    config: MutationConfig,
    runner: BoundedRunner,
    output: OutputSink,
    registry: Arc<TargetRegistry<V>>,
    interrupt: InterruptFlag,
}

impl<T, V> MutationController<T, V>
where
    T: SyntaxTree,
    V: Send + Sync + 'static,
{
    /// Assemble a controller. When `config.events_path` is set the event log is
    /// opened here, once, and receives the events of every later `run`.
    pub fn new(
        target_loader: Box<dyn TargetLoader<T, V>>,
        test_loader: Box<dyn TestLoader<V>>,
        mutator: Mutator<T>,
        materializer: Box<dyn Materializer<T, V>>,
        config: MutationConfig,
    ) -> Self {
        let mut notifier = Notifier::default();
        if let Some(path) = &config.events_path {
            match JsonLinesView::create(path) {
                Ok(view) => notifier.add_view(Box::new(view)),
                Err(err) => warn!(path = %path.display(), error = %err, "cannot open event log"),
            }
        }
        Self {
            target_loader,
            test_loader,
            mutator,
            materializer,
            notifier,
            runner: BoundedRunner::new(config.kill_grace),
            output: OutputSink::new(config.suppress_output),
            registry: Arc::new(TargetRegistry::new()),
            interrupt: InterruptFlag::new(),
            config,
        }
    }

    /// Register a view.
    pub fn with_view(mut self, view: Box<dyn View>) -> Self {
        self.notifier.add_view(view);
        self
    }

    /// Use `interrupt` as the stop switch for this run.
    pub fn with_interrupt(mut self, interrupt: InterruptFlag) -> Self {
        self.interrupt = interrupt;
        self
    }

    /// Registry test code resolves targets from.
    pub fn registry(&self) -> Arc<TargetRegistry<V>> {
        Arc::clone(&self.registry)
    }

    /// Run the whole pipeline. Emits exactly one `End`, `CantLoad` or
    /// `OriginalTestsFail` notification. An invalid configuration is rejected
    /// before any notification.
    pub fn run(&mut self) -> Result<RunReport, ControllerError> {
        self.config.validate()?;
        let started = Instant::now();

        self.notifier.notify(MutationEvent::Initialize {
            targets: self.target_loader.names(),
            tests: self.test_loader.names(),
        });

        match self.run_mutation() {
            Ok((score, timings, interrupted)) => {
                let duration = started.elapsed();
                info!(
                    killed = score.killed,
                    timed_out = score.timed_out,
                    incompetent = score.incompetent,
                    survived = score.survived,
                    "mutation run finished"
                );
                self.notifier.notify(MutationEvent::End {
                    score,
                    mutation_score: score.count(),
                    duration_ms: duration.as_millis() as u64,
                });
                Ok(RunReport {
                    score,
                    duration,
                    timings,
                    interrupted,
                })
            }
            Err(err) => {
                match &err {
                    ControllerError::Config(_) => {}
                    ControllerError::Load(load) => {
                        warn!(name = %load.name, reason = %load.reason, "load failed, aborting");
                        self.notifier.notify(MutationEvent::CantLoad {
                            name: load.name.clone(),
                            reason: load.reason.clone(),
                        });
                    }
                    ControllerError::BaselineFailure { suite, result } => {
                        warn!(suite = %suite, "baseline tests fail, aborting");
                        self.notifier.notify(MutationEvent::OriginalTestsFail {
                            result: result.clone(),
                        });
                    }
                }
                Err(err)
            }
        }
    }

    fn run_mutation(
        &mut self,
    ) -> Result<(MutationScore, StageTimings, bool), ControllerError> {
        let targets = self.target_loader.load()?;
        for target in &targets {
            self.registry
                .register(target.name.clone(), Arc::clone(&target.program));
        }

        let Some(suites) = self.load_and_check_tests()? else {
            info!("interrupted during baseline run");
            self.notifier.notify(MutationEvent::Interrupted);
            return Ok((MutationScore::new(), StageTimings::default(), true));
        };
        self.notifier.notify(MutationEvent::Passed {
            tests: suites
                .iter()
                .map(|handle| SuiteTiming {
                    name: handle.suite.name().to_string(),
                    duration_ms: handle.baseline.as_millis() as u64,
                })
                .collect(),
        });
        self.notifier.notify(MutationEvent::Start);

        let baseline: Duration = suites.iter().map(|handle| handle.baseline).sum();
        let limit = deadline(self.config.timeout_factor, baseline, self.config.min_timeout);
        debug!(
            baseline_ms = baseline.as_millis() as u64,
            deadline_ms = limit.as_millis() as u64,
            "computed mutant deadline"
        );

        let mut score = MutationScore::new();
        let mut timings = StageTimings::default();
        for target in &targets {
            if self.interrupt.is_raised() {
                break;
            }
            self.mutate_target(target, &suites, limit, &mut score, &mut timings)?;
        }

        let interrupted = self.interrupt.is_raised();
        if interrupted {
            info!(evaluated = score.all_mutants(), "interrupted, keeping partial results");
            self.notifier.notify(MutationEvent::Interrupted);
        }
        Ok((score, timings, interrupted))
    }

    /// Baseline-run every suite. `None` when an interrupt arrived meanwhile: a
    /// suite torn down by the operator says nothing about the program.
    fn load_and_check_tests(&mut self) -> Result<Option<Vec<TestSuiteHandle<V>>>, ControllerError> {
        let loaded = self.test_loader.load()?;
        let mut handles = Vec::with_capacity(loaded.len());

        for suite in loaded {
            let mut handle = TestSuiteHandle {
                filter: suite.filter.or_else(|| self.config.test_filter.clone()),
                suite: suite.suite,
                baseline: Duration::ZERO,
            };
            let name = handle.suite.name().to_string();
            let ctx = TestContext::new(
                Arc::clone(&self.registry),
                CancelToken::new(),
                self.output.clone(),
            );
            let execution = self.runner.execute(
                &format!("baseline-{name}"),
                std::slice::from_ref(&handle),
                &ctx,
                false,
                None,
            );
            if self.interrupt.is_raised() {
                return Ok(None);
            }
            match execution.state {
                RunState::Completed(result) if result.was_successful() => {
                    debug!(suite = %name, elapsed_ms = execution.elapsed.as_millis() as u64, "baseline passed");
                    handle.baseline = execution.elapsed;
                    handles.push(handle);
                }
                RunState::Completed(result) => {
                    return Err(ControllerError::BaselineFailure { suite: name, result });
                }
                _ => {
                    let mut result = TestResult::new();
                    result.add_environment_error("baseline run did not complete");
                    return Err(ControllerError::BaselineFailure { suite: name, result });
                }
            }
        }

        Ok(Some(handles))
    }

    fn mutate_target(
        &mut self,
        target: &Target<V>,
        suites: &[TestSuiteHandle<V>],
        limit: Duration,
        score: &mut MutationScore,
        timings: &mut StageTimings,
    ) -> Result<(), ControllerError> {
        let parse_started = Instant::now();
        let tree = self.target_loader.parse(target)?;
        timings.parse += parse_started.elapsed();

        let original = tree.render();
        let filename = target.filename();
        let Self {
            mutator,
            materializer,
            notifier,
            runner,
            output,
            registry,
            interrupt,
            ..
        } = self;

        let mut mutants = mutator.mutate(&tree, target.to_mutate.as_deref());
        loop {
            if interrupt.is_raised() {
                break;
            }
            let generate_started = Instant::now();
            let next = mutants.next();
            timings.generate += generate_started.elapsed();
            let Some(mutation) = next else {
                break;
            };

            let identity = MutantIdentity {
                number: score.all_mutants() + 1,
                target: target.name.clone(),
            };
            notifier.notify(MutationEvent::Mutation {
                number: identity.number,
                operator: mutation.operator.clone(),
                filename: filename.clone(),
                line: mutation.line,
                diff: line_diff(&original, &mutation.tree.render()),
            });

            let (outcome, event) = evaluate(
                &Evaluation {
                    materializer: &**materializer,
                    runner,
                    output,
                    registry,
                    suites,
                    limit,
                },
                target,
                &identity,
                &mutation,
                timings,
            );
            // Ctrl-C reaches child test processes too; the in-flight verdict is void.
            if interrupt.is_raised() {
                debug!(mutant = %identity, "interrupted mid-run, outcome discarded");
                break;
            }
            notifier.notify(event);
            score.record(outcome);
        }
        Ok(())
    }
}

struct Evaluation<'a, T, V> {
    materializer: &'a dyn Materializer<T, V>,
    runner: &'a BoundedRunner,
    output: &'a OutputSink,
    registry: &'a Arc<TargetRegistry<V>>,
    suites: &'a [TestSuiteHandle<V>],
    limit: Duration,
}

/// Build, inject and run one mutant. Returns the outcome and the classification
/// event for the caller to publish.
fn evaluate<T, V>(
    eval: &Evaluation<'_, T, V>,
    target: &Target<V>,
    identity: &MutantIdentity,
    mutation: &Mutation<T>,
    timings: &mut StageTimings,
) -> (Outcome, MutationEvent)
where
    V: Send + Sync + 'static,
{
    let materialize_started = Instant::now();
    let built = {
        let _quiet = eval.output.suppress();
        eval.materializer
            .materialize(target, identity, mutation, eval.output)
    };
    timings.materialize += materialize_started.elapsed();

    let variant = match built {
        Ok(variant) => variant,
        Err(err) => {
            debug!(mutant = %identity, error = %err, "mutant is incompetent");
            let event = MutationEvent::Incompetent {
                error: err.to_string(),
            };
            return (Outcome::Incompetent, event);
        }
    };

    let ctx = TestContext::new(
        Arc::clone(eval.registry),
        CancelToken::new(),
        eval.output.clone(),
    );
    let execution = {
        let _injected = eval.registry.inject(&target.name, Arc::new(variant));
        eval.runner.execute(
            &identity.to_string(),
            eval.suites,
            &ctx,
            true,
            Some(eval.limit),
        )
    };
    timings.run += execution.elapsed;
    if execution.unit == UnitFate::Leaked {
        warn!(mutant = %identity, "execution unit could not be stopped and was detached");
    }

    let duration_ms = execution.elapsed.as_millis() as u64;
    let verdict = execution.verdict();
    let event = match &verdict {
        Verdict::Incompetent { error } => MutationEvent::Incompetent {
            error: error.clone(),
        },
        Verdict::TimedOut => MutationEvent::TimedOut {
            deadline_ms: eval.limit.as_millis() as u64,
        },
        Verdict::Killed { killer } => MutationEvent::Killed {
            duration_ms,
            killer: killer.test_id.clone(),
            trace: killer.trace.clone(),
        },
        Verdict::Survived => MutationEvent::Survived { duration_ms },
    };
    debug!(mutant = %identity, outcome = %verdict.outcome(), duration_ms, "mutant evaluated");
    (verdict.outcome(), event)
}

/// `-`/`+` prefixed lines that differ between `original` and `mutant`.
pub fn line_diff(original: &str, mutant: &str) -> String {
    let diff = TextDiff::from_lines(original, mutant);
    let mut output = String::new();
    for change in diff.iter_all_changes() {
        let sign = match change.tag() {
            ChangeTag::Delete => "- ",
            ChangeTag::Insert => "+ ",
            ChangeTag::Equal => continue,
        };
        output.push_str(sign);
        output.push_str(change.value().trim_end_matches('\n'));
        output.push('\n');
    }
    output
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn line_diff_shows_only_changed_lines() {
        let original = "def add(a, b):\n    return a + b\n";
        let mutant = "def add(a, b):\n    return a - b\n";
        assert_eq!(
            line_diff(original, mutant),
            "-     return a + b\n+     return a - b\n"
        );
    }

    #[test]
    fn line_diff_of_identical_text_is_empty() {
        assert_eq!(line_diff("x = 1\n", "x = 1\n"), "");
    }
}

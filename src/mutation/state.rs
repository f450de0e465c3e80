//! Event log replay and run-state projection.

use std::io::{BufRead, BufReader};
use std::path::Path;

use thiserror::Error;

use super::events::{MutationEvent, SuiteTiming};
use super::score::{MutationScore, Outcome};
use super::views::LoggedEvent;

/// Status of one mutant as seen in the log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MutantStatus {
    /// Announced but never classified.
    Pending,
    /// Terminal classification.
    Classified(Outcome),
}

impl MutantStatus {
    /// True once the mutant has an outcome.
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Classified(_))
    }
}

/// Per-mutant state in a replay snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutantRecord {
    /// 1-based mutant number.
    pub number: usize,
    /// Operator id.
    pub operator: String,
    /// Target file name.
    pub filename: String,
    /// Altered line.
    pub line: u32,
    /// Line diff against the original.
    pub diff: String,
    /// Derived status.
    pub status: MutantStatus,
    /// Run time or exceeded deadline, in milliseconds.
    pub duration_ms: Option<u64>,
    /// Blamed test for killed mutants.
    pub killer: Option<String>,
    /// Error message for incompetent mutants.
    pub error: Option<String>,
}

/// Run state rebuilt from an event log. When a log holds several runs, the
/// snapshot describes the last one.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RunSnapshot {
    /// Target names.
    pub targets: Vec<String>,
    /// Suite names.
    pub tests: Vec<String>,
    /// Baseline timings.
    pub baseline: Vec<SuiteTiming>,
    /// Mutants in evaluation order.
    pub mutants: Vec<MutantRecord>,
    /// Counters recomputed from the classifications.
    pub score: MutationScore,
    /// Total run time from the end event.
    pub duration_ms: Option<u64>,
    /// Number of malformed lines ignored.
    pub malformed_lines: usize,
    /// An interrupt stopped the loop.
    pub interrupted: bool,
    /// An end event was seen.
    pub completed: bool,
    /// Why the run was aborted, if it was.
    pub aborted: Option<String>,
}

impl RunSnapshot {
    /// Mutants announced without a classification, e.g. after a crash.
    pub fn pending_mutants(&self) -> impl Iterator<Item = &MutantRecord> {
        self.mutants.iter().filter(|m| !m.status.is_terminal())
    }

    /// Mutants that survived.
    pub fn survivors(&self) -> impl Iterator<Item = &MutantRecord> {
        self.mutants
            .iter()
            .filter(|m| m.status == MutantStatus::Classified(Outcome::Survived))
    }

    fn classify(&mut self, outcome: Outcome, update: impl FnOnce(&mut MutantRecord)) {
        let Some(record) = self.mutants.last_mut() else {
            return;
        };
        if record.status.is_terminal() {
            return;
        }
        record.status = MutantStatus::Classified(outcome);
        update(record);
        self.score.record(outcome);
    }

    fn apply(&mut self, event: MutationEvent) {
        match event {
            MutationEvent::Initialize { targets, tests } => {
                *self = Self {
                    targets,
                    tests,
                    malformed_lines: self.malformed_lines,
                    ..Self::default()
                };
            }
            MutationEvent::Passed { tests } => self.baseline = tests,
            MutationEvent::Start => {}
            MutationEvent::Mutation {
                number,
                operator,
                filename,
                line,
                diff,
            } => self.mutants.push(MutantRecord {
                number,
                operator,
                filename,
                line,
                diff,
                status: MutantStatus::Pending,
                duration_ms: None,
                killer: None,
                error: None,
            }),
            MutationEvent::Incompetent { error } => {
                self.classify(Outcome::Incompetent, |r| r.error = Some(error));
            }
            MutationEvent::Killed {
                duration_ms,
                killer,
                ..
            } => self.classify(Outcome::Killed, |r| {
                r.duration_ms = Some(duration_ms);
                r.killer = Some(killer);
            }),
            MutationEvent::Survived { duration_ms } => {
                self.classify(Outcome::Survived, |r| r.duration_ms = Some(duration_ms));
            }
            MutationEvent::TimedOut { deadline_ms } => {
                self.classify(Outcome::TimedOut, |r| r.duration_ms = Some(deadline_ms));
            }
            MutationEvent::Interrupted => self.interrupted = true,
            MutationEvent::End { duration_ms, .. } => {
                self.completed = true;
                self.duration_ms = Some(duration_ms);
            }
            MutationEvent::CantLoad { name, reason } => {
                self.aborted = Some(format!("can't load {name}: {reason}"));
            }
            MutationEvent::OriginalTestsFail { result } => {
                let culprit = result
                    .first_failure()
                    .map(|f| f.test_id.clone())
                    .or(result.environment_error)
                    .unwrap_or_else(|| "unknown test".to_string());
                self.aborted = Some(format!("original tests failed: {culprit}"));
            }
        }
    }
}

/// Replay errors.
#[derive(Debug, Error)]
pub enum StateError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Replay a JSON-lines event log into a snapshot. Malformed lines are counted
/// and skipped.
pub fn replay_events(events_path: &Path) -> Result<RunSnapshot, StateError> {
    let file = std::fs::File::open(events_path)?;
    let reader = BufReader::new(file);
    let mut snapshot = RunSnapshot::default();

    for line in reader.lines() {
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        match serde_json::from_str::<LoggedEvent>(&line) {
            Ok(logged) => snapshot.apply(logged.event),
            Err(_) => snapshot.malformed_lines += 1,
        }
    }

    Ok(snapshot)
}

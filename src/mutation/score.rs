//! Outcome ledger and mutation score.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Classification of one evaluated mutant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Outcome {
    /// Mutant could not be built or initialised, or broke the test environment.
    Incompetent,
    /// Mutant test run exceeded its deadline and was forcibly stopped.
    TimedOut,
    /// At least one test failed or errored against the mutant.
    Killed,
    /// Every test passed against the mutant.
    Survived,
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            Self::Incompetent => "incompetent",
            Self::TimedOut => "timeout",
            Self::Killed => "killed",
            Self::Survived => "survived",
        };
        f.write_str(text)
    }
}

/// Monotonic per-outcome counters for one run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct MutationScore {
    /// Killed mutants.
    pub killed: usize,
    /// Timed out mutants.
    pub timed_out: usize,
    /// Incompetent mutants.
    pub incompetent: usize,
    /// Survived mutants.
    pub survived: usize,
}

impl MutationScore {
    /// Empty ledger.
    pub fn new() -> Self {
        Self::default()
    }

    /// Count one outcome. Exactly one counter moves.
    pub fn record(&mut self, outcome: Outcome) {
        match outcome {
            Outcome::Incompetent => self.incompetent += 1,
            Outcome::TimedOut => self.timed_out += 1,
            Outcome::Killed => self.killed += 1,
            Outcome::Survived => self.survived += 1,
        }
    }

    /// Number of mutants recorded so far.
    pub fn all_mutants(&self) -> usize {
        self.killed + self.timed_out + self.incompetent + self.survived
    }

    /// Mutation score in percent. Incompetent mutants are excluded from the
    /// denominator; an empty denominator scores `0`.
    pub fn count(&self) -> f64 {
        let bottom = self.all_mutants() - self.incompetent;
        if bottom == 0 {
            return 0.0;
        }
        (self.killed + self.timed_out) as f64 * 100.0 / bottom as f64
    }
}

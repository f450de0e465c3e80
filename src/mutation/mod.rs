//! Mutation testing engine.
//!
//! A run measures the unmutated suites once, derives a deadline from that
//! baseline, then for every mutant: materializes the variant, injects it
//! under the target's name, runs the suites fail-fast under the deadline and
//! classifies the result. Every step is reported as a [`MutationEvent`].

pub mod config;
pub mod controller;
pub mod events;
pub mod generator;
pub mod inject;
pub mod interrupt;
pub mod materialize;
pub mod output;
/// Human-readable and machine-friendly report generation.
pub mod report;
pub mod runner;
pub mod score;
pub mod state;
pub mod suite;
pub mod target;
pub mod views;

pub use config::{ConfigError, MutationConfig};
pub use controller::{ControllerError, MutationController, RunReport, StageTimings, line_diff};
pub use events::{ChannelView, MutationEvent, Notifier, SuiteTiming, View, ViewError};
pub use generator::{Mutation, MutationOperator, Mutator, SyntaxTree};
pub use inject::{Injection, TargetRegistry};
pub use interrupt::InterruptFlag;
#[cfg(feature = "cli")]
pub use interrupt::install_ctrlc_handler;
pub use materialize::{FnMaterializer, MaterializationError, Materializer, MutantIdentity};
pub use output::{OutputGuard, OutputSink, SinkWriter};
pub use report::{MutantReport, ReportFormat, RunSummary, render_report};
pub use runner::{
    BoundedRunner, CancelToken, Execution, RunState, UnitFate, Verdict, classify, deadline,
};
pub use score::{MutationScore, Outcome};
pub use state::{MutantRecord, MutantStatus, RunSnapshot, StateError, replay_events};
pub use suite::{
    FnSuite, TestContext, TestError, TestFailure, TestResult, TestSuite, TestSuiteHandle,
};
pub use target::{LoadError, LoadedSuite, Target, TargetLoader, TestLoader};
pub use views::{JsonLinesView, LoggedEvent, TextView};

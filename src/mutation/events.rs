//! Lifecycle events and the sinks they are fanned out to.

use std::panic::{AssertUnwindSafe, catch_unwind};
use std::sync::mpsc::Sender;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;

use super::score::MutationScore;
use super::suite::{TestResult, panic_message};

/// Baseline measurement of one suite.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SuiteTiming {
    /// Suite name.
    pub name: String,
    /// Baseline wall time in milliseconds.
    pub duration_ms: u64,
}

/// Event emitted by the controller, in run order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum MutationEvent {
    /// Run configured.
    Initialize {
        /// Target names.
        targets: Vec<String>,
        /// Test suite names.
        tests: Vec<String>,
    },
    /// Baseline suites passed.
    Passed {
        /// Baseline timing per suite.
        tests: Vec<SuiteTiming>,
    },
    /// Mutation loop starting.
    Start,
    /// A mutant is about to be evaluated.
    Mutation {
        /// 1-based mutant number.
        number: usize,
        /// Operator id.
        operator: String,
        /// Target file name.
        filename: String,
        /// Altered line.
        line: u32,
        /// Line diff of the mutant against the original rendering.
        diff: String,
    },
    /// Mutant could not be built or broke the environment.
    Incompetent {
        /// Error message.
        error: String,
    },
    /// Mutant killed.
    Killed {
        /// Run time in milliseconds.
        duration_ms: u64,
        /// Blamed test id.
        killer: String,
        /// Failure trace of the blamed test.
        trace: String,
    },
    /// Mutant survived.
    Survived {
        /// Run time in milliseconds.
        duration_ms: u64,
    },
    /// Mutant exceeded its deadline.
    TimedOut {
        /// Deadline that was exceeded, in milliseconds.
        deadline_ms: u64,
    },
    /// Operator interrupt stopped the loop; `End` follows with partial results.
    Interrupted,
    /// Run finished (fully or after an interrupt).
    End {
        /// Final counters.
        score: MutationScore,
        /// Mutation score in percent.
        mutation_score: f64,
        /// Total run time in milliseconds.
        duration_ms: u64,
    },
    /// A target or suite could not be loaded; the run is aborted.
    CantLoad {
        /// Item name.
        name: String,
        /// Reason.
        reason: String,
    },
    /// The unmutated suite failed; the run is aborted.
    OriginalTestsFail {
        /// Baseline result of the failing suite.
        result: TestResult,
    },
}

impl MutationEvent {
    /// True for the per-mutant classification events.
    pub fn is_classification(&self) -> bool {
        matches!(
            self,
            Self::Incompetent { .. } | Self::Killed { .. } | Self::Survived { .. } | Self::TimedOut { .. }
        )
    }
}

/// A sink failed to take an event.
#[derive(Debug, Error)]
pub enum ViewError {
    /// IO failure.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    /// Serialization failure.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    /// The receiving end is gone.
    #[error("view disconnected")]
    Disconnected,
}

/// Receives lifecycle events.
pub trait View {
    /// Handle one event.
    fn notify(&mut self, event: &MutationEvent) -> Result<(), ViewError>;
}

/// Forwards every event over a channel.
#[derive(Debug, Clone)]
pub struct ChannelView {
    sender: Sender<MutationEvent>,
}

impl ChannelView {
    /// Wrap a sender.
    pub fn new(sender: Sender<MutationEvent>) -> Self {
        Self { sender }
    }
}

impl View for ChannelView {
    fn notify(&mut self, event: &MutationEvent) -> Result<(), ViewError> {
        self.sender
            .send(event.clone())
            .map_err(|_| ViewError::Disconnected)
    }
}

/// Fans events out to every registered view. A failing or panicking view is
/// logged and skipped; it never stops the run.
#[derive(Default)]
pub struct Notifier {
    views: Vec<Box<dyn View>>,
}

impl Notifier {
    /// Notifier over `views`.
    pub fn new(views: Vec<Box<dyn View>>) -> Self {
        Self { views }
    }

    /// Register another view.
    pub fn add_view(&mut self, view: Box<dyn View>) {
        self.views.push(view);
    }

    /// Deliver `event` to every view, in registration order.
    pub fn notify(&mut self, event: MutationEvent) {
        for (index, view) in self.views.iter_mut().enumerate() {
            match catch_unwind(AssertUnwindSafe(|| view.notify(&event))) {
                Ok(Ok(())) => {}
                Ok(Err(err)) => warn!(view = index, error = %err, "view failed to handle event"),
                Err(payload) => warn!(
                    view = index,
                    panic = %panic_message(payload.as_ref()),
                    "view panicked while handling event"
                ),
            }
        }
    }
}

/// Current unix timestamp in milliseconds.
pub fn now_timestamp_ms() -> i64 {
    let now = std::time::SystemTime::now();
    let duration = now
        .duration_since(std::time::UNIX_EPOCH)
        .unwrap_or_else(|_| std::time::Duration::from_secs(0));
    (duration.as_secs() as i64)
        .saturating_mul(1000)
        .saturating_add(duration.subsec_millis() as i64)
}

#[cfg(test)]
mod tests {
    use std::sync::mpsc;

    use super::*;

    struct Broken;

    impl View for Broken {
        fn notify(&mut self, _event: &MutationEvent) -> Result<(), ViewError> {
            Err(ViewError::Disconnected)
        }
    }

    struct Exploding;

    impl View for Exploding {
        fn notify(&mut self, _event: &MutationEvent) -> Result<(), ViewError> {
            panic!("view bug")
        }
    }

    #[test]
    fn failing_views_do_not_block_later_views() {
        let (tx, rx) = mpsc::channel();
        let mut notifier = Notifier::new(vec![Box::new(Broken), Box::new(Exploding)]);
        notifier.add_view(Box::new(ChannelView::new(tx)));

        notifier.notify(MutationEvent::Start);
        notifier.notify(MutationEvent::Survived { duration_ms: 12 });

        let received: Vec<MutationEvent> = rx.try_iter().collect();
        assert_eq!(
            received,
            vec![
                MutationEvent::Start,
                MutationEvent::Survived { duration_ms: 12 }
            ]
        );
    }

    #[test]
    fn events_serialize_with_snake_case_tag() {
        let json = serde_json::to_string(&MutationEvent::TimedOut { deadline_ms: 1000 })
            .expect("event should serialize");
        assert_eq!(json, r#"{"event":"timed_out","deadline_ms":1000}"#);

        let back: MutationEvent = serde_json::from_str(r#"{"event":"start"}"#)
            .expect("event should deserialize");
        assert_eq!(back, MutationEvent::Start);
    }

    #[test]
    fn classification_events_are_recognised() {
        assert!(MutationEvent::TimedOut { deadline_ms: 1 }.is_classification());
        assert!(!MutationEvent::Start.is_classification());
        assert!(!MutationEvent::Interrupted.is_classification());
    }

    #[test]
    fn timestamp_is_positive() {
        assert!(now_timestamp_ms() > 0);
    }
}

//! Concrete event sinks: console progress and a JSON-lines event log.

use std::fs::{File, OpenOptions};
use std::io::{self, Write};
use std::path::Path;

use console::style;
use serde::{Deserialize, Serialize};

use super::events::{MutationEvent, View, ViewError, now_timestamp_ms};
use super::score::MutationScore;

/// Human-readable progress output.
pub struct TextView<W> {
    out: W,
    show_mutants: bool,
    // A mutation line waiting for its classification.
    open_line: bool,
}

impl TextView<io::Stdout> {
    /// Text view on stdout.
    pub fn stdout(show_mutants: bool) -> Self {
        Self::new(io::stdout(), show_mutants)
    }
}

impl<W: Write> TextView<W> {
    /// Text view on `out`. With `show_mutants`, each mutant's diff is printed.
    pub fn new(out: W, show_mutants: bool) -> Self {
        Self {
            out,
            show_mutants,
            open_line: false,
        }
    }

    /// Consume the view and return its writer.
    pub fn into_inner(self) -> W {
        self.out
    }

    fn end_open_line(&mut self) -> io::Result<()> {
        if std::mem::take(&mut self.open_line) {
            writeln!(self.out)?;
        }
        Ok(())
    }

    fn level_print(&mut self, msg: impl std::fmt::Display, level: usize) -> io::Result<()> {
        self.end_open_line()?;
        match level {
            1 => writeln!(self.out, "[*] {msg}"),
            _ => writeln!(self.out, "{}- {msg}", "   ".repeat(level - 1)),
        }
    }

    fn print_score(&mut self, score: &MutationScore, mutation_score: f64, duration_ms: u64) -> io::Result<()> {
        self.level_print(
            format!(
                "Mutation score [{:.5} s]: {}",
                duration_ms as f64 / 1000.0,
                style(format!("{mutation_score:.1}%")).bold()
            ),
            1,
        )?;
        let all = score.all_mutants();
        self.level_print(format!("all: {all}"), 2)?;
        if all == 0 {
            return Ok(());
        }
        for (label, count) in [
            ("killed", score.killed),
            ("survived", score.survived),
            ("incompetent", score.incompetent),
            ("timeout", score.timed_out),
        ] {
            let share = count as f64 * 100.0 / all as f64;
            self.level_print(format!("{label}: {count} ({share:.1}%)"), 2)?;
        }
        Ok(())
    }
}

impl<W: Write> View for TextView<W> {
    fn notify(&mut self, event: &MutationEvent) -> Result<(), ViewError> {
        if event.is_classification() {
            // Completes the pending mutation line.
            self.open_line = false;
        }
        match event {
            MutationEvent::Initialize { targets, tests } => {
                self.level_print("Start mutation process:", 1)?;
                self.level_print(format!("targets: {}", targets.join(", ")), 2)?;
                self.level_print(format!("tests: {}", tests.join(", ")), 2)?;
            }
            MutationEvent::Passed { tests } => {
                self.level_print(format!("{} tests passed:", tests.len()), 1)?;
                for test in tests {
                    self.level_print(
                        format!("{} [{:.5} s]", test.name, test.duration_ms as f64 / 1000.0),
                        2,
                    )?;
                }
            }
            MutationEvent::Start => {
                self.level_print("Start mutants generation and execution:", 1)?;
            }
            MutationEvent::Mutation {
                number,
                operator,
                filename,
                line,
                diff,
            } => {
                self.end_open_line()?;
                write!(self.out, "   - [#{number:>4}] {operator} {filename}:{line}: ")?;
                if self.show_mutants {
                    let rule = "-".repeat(80);
                    writeln!(self.out)?;
                    writeln!(self.out, "{rule}")?;
                    write!(self.out, "{diff}")?;
                    writeln!(self.out, "{rule}")?;
                } else {
                    self.open_line = true;
                }
            }
            MutationEvent::Incompetent { error } => {
                writeln!(self.out, "{} {error}", style("incompetent").cyan())?;
            }
            MutationEvent::Killed {
                duration_ms,
                killer,
                ..
            } => {
                writeln!(
                    self.out,
                    "[{:.5} s] {} by {killer}",
                    *duration_ms as f64 / 1000.0,
                    style("killed").green()
                )?;
            }
            MutationEvent::Survived { duration_ms } => {
                writeln!(
                    self.out,
                    "[{:.5} s] {}",
                    *duration_ms as f64 / 1000.0,
                    style("survived").red()
                )?;
            }
            MutationEvent::TimedOut { deadline_ms } => {
                writeln!(
                    self.out,
                    "[{:.5} s] {}",
                    *deadline_ms as f64 / 1000.0,
                    style("timeout").yellow()
                )?;
            }
            MutationEvent::Interrupted => {
                self.level_print("Interrupted, partial results follow.", 1)?;
            }
            MutationEvent::End {
                score,
                mutation_score,
                duration_ms,
            } => {
                self.print_score(score, *mutation_score, *duration_ms)?;
            }
            MutationEvent::CantLoad { name, reason } => {
                self.level_print(format!("Can't load {name}: {reason}"), 1)?;
            }
            MutationEvent::OriginalTestsFail { result } => {
                self.level_print(style("Tests failed:").red(), 1)?;
                for failure in result.failures.iter().chain(result.errors.iter()) {
                    self.level_print(format!("fail in {} - {}", failure.test_id, failure.trace.trim()), 2)?;
                }
                if let Some(error) = &result.environment_error {
                    self.level_print(format!("environment error - {error}"), 2)?;
                }
            }
        }
        self.out.flush()?;
        Ok(())
    }
}

/// One line of the event log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LoggedEvent {
    /// Unix timestamp in milliseconds.
    pub timestamp_ms: i64,
    /// The event.
    #[serde(flatten)]
    pub event: MutationEvent,
}

/// Appends every event to a file as one JSON object per line.
#[derive(Debug)]
pub struct JsonLinesView {
    file: File,
}

impl JsonLinesView {
    /// Open (or create) `path` for appending.
    pub fn create(path: &Path) -> Result<Self, ViewError> {
        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        Ok(Self { file })
    }
}

impl View for JsonLinesView {
    fn notify(&mut self, event: &MutationEvent) -> Result<(), ViewError> {
        let line = serde_json::to_string(&LoggedEvent {
            timestamp_ms: now_timestamp_ms(),
            event: event.clone(),
        })?;
        self.file.write_all(line.as_bytes())?;
        self.file.write_all(b"\n")?;
        self.file.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use std::io::{BufRead, BufReader};

    use tempfile::tempdir;

    use super::*;
    use crate::mutation::events::SuiteTiming;

    fn render(events: &[MutationEvent], show_mutants: bool) -> String {
        let mut view = TextView::new(Vec::new(), show_mutants);
        for event in events {
            view.notify(event).expect("text view should accept events");
        }
        console::strip_ansi_codes(&String::from_utf8_lossy(&view.into_inner())).to_string()
    }

    #[test]
    fn text_view_reports_progress_and_score() {
        let mut score = MutationScore::new();
        score.killed = 1;
        score.survived = 1;
        let text = render(
            &[
                MutationEvent::Initialize {
                    targets: vec!["calc".into()],
                    tests: vec!["test_calc".into()],
                },
                MutationEvent::Passed {
                    tests: vec![SuiteTiming {
                        name: "test_calc".into(),
                        duration_ms: 200,
                    }],
                },
                MutationEvent::Start,
                MutationEvent::Mutation {
                    number: 1,
                    operator: "AOR".into(),
                    filename: "calc.py".into(),
                    line: 2,
                    diff: "- a + b\n+ a - b\n".into(),
                },
                MutationEvent::Killed {
                    duration_ms: 120,
                    killer: "test_calc::test_add".into(),
                    trace: "3 != -1".into(),
                },
                MutationEvent::End {
                    score,
                    mutation_score: 50.0,
                    duration_ms: 1500,
                },
            ],
            true,
        );

        assert!(text.contains("[*] Start mutation process:"));
        assert!(text.contains("   - targets: calc"));
        assert!(text.contains("test_calc [0.20000 s]"));
        assert!(text.contains("[#   1] AOR calc.py:2:"));
        assert!(text.contains("+ a - b"));
        assert!(text.contains("killed by test_calc::test_add"));
        assert!(text.contains("Mutation score [1.50000 s]: 50.0%"));
        assert!(text.contains("killed: 1 (50.0%)"));
    }

    #[test]
    fn classification_shares_the_mutation_line() {
        let text = render(
            &[
                MutationEvent::Mutation {
                    number: 1,
                    operator: "AOR".into(),
                    filename: "calc.py".into(),
                    line: 2,
                    diff: "- a + b\n+ a - b\n".into(),
                },
                MutationEvent::Survived { duration_ms: 250 },
                MutationEvent::Mutation {
                    number: 2,
                    operator: "ROR".into(),
                    filename: "calc.py".into(),
                    line: 4,
                    diff: "- a < b\n+ a <= b\n".into(),
                },
                MutationEvent::Interrupted,
            ],
            false,
        );
        assert_eq!(
            text.lines().collect::<Vec<_>>(),
            vec![
                "   - [#   1] AOR calc.py:2: [0.25000 s] survived",
                "   - [#   2] ROR calc.py:4: ",
                "[*] Interrupted, partial results follow.",
            ]
        );
    }

    #[test]
    fn text_view_hides_diffs_unless_asked() {
        let text = render(
            &[MutationEvent::Mutation {
                number: 7,
                operator: "ROR".into(),
                filename: "calc.py".into(),
                line: 9,
                diff: "- a < b\n+ a <= b\n".into(),
            }],
            false,
        );
        assert!(text.contains("[#   7] ROR calc.py:9:"));
        assert!(!text.contains("a <= b"));
    }

    #[test]
    fn json_lines_view_appends_one_event_per_line() {
        let tmp = tempdir().expect("tempdir should be created");
        let path = tmp.path().join("nested").join("events.jsonl");

        let mut view = JsonLinesView::create(&path).expect("log should open");
        view.notify(&MutationEvent::Start).expect("start should append");
        view.notify(&MutationEvent::Survived { duration_ms: 5 })
            .expect("survived should append");

        let file = File::open(&path).expect("log should exist");
        let events: Vec<LoggedEvent> = BufReader::new(file)
            .lines()
            .map(|line| {
                serde_json::from_str(&line.expect("line should read")).expect("line should parse")
            })
            .collect();
        assert_eq!(events.len(), 2);
        assert_eq!(events[0].event, MutationEvent::Start);
        assert_eq!(events[1].event, MutationEvent::Survived { duration_ms: 5 });
    }
}

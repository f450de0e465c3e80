use serde::Serialize;

use super::score::Outcome;
use super::state::{MutantRecord, MutantStatus, RunSnapshot};

/// Supported output formats for run reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReportFormat {
    /// Markdown summary.
    Markdown,
    /// JSON summary with all mutants inline.
    Json,
}

/// Per-mutant report entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MutantReport {
    /// Mutant number.
    pub number: usize,
    /// Operator id.
    pub operator: String,
    /// Target file name.
    pub filename: String,
    /// Altered line.
    pub line: u32,
    /// Execution status.
    pub status: String,
    /// Run time or exceeded deadline in milliseconds.
    pub duration_ms: Option<u64>,
    /// Blamed test.
    pub killer: Option<String>,
    /// Incompetence reason.
    pub error: Option<String>,
    /// Line diff.
    pub diff: String,
}

impl From<&MutantRecord> for MutantReport {
    fn from(record: &MutantRecord) -> Self {
        Self {
            number: record.number,
            operator: record.operator.clone(),
            filename: record.filename.clone(),
            line: record.line,
            status: status_to_string(record.status),
            duration_ms: record.duration_ms,
            killer: record.killer.clone(),
            error: record.error.clone(),
            diff: record.diff.clone(),
        }
    }
}

fn status_to_string(status: MutantStatus) -> String {
    match status {
        MutantStatus::Pending => "pending".to_string(),
        MutantStatus::Classified(outcome) => outcome.to_string(),
    }
}

/// Aggregated run counts.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunSummary {
    /// Announced mutants.
    pub total: usize,
    /// Mutation score in percent.
    pub mutation_score: f64,
    /// Killed mutants.
    pub killed: usize,
    /// Timed-out mutants.
    pub timeout: usize,
    /// Survived mutants.
    pub survived: usize,
    /// Incompetent mutants.
    pub incompetent: usize,
    /// Mutants with no classification.
    pub incomplete: usize,
}

impl RunSummary {
    /// Build summary from snapshot.
    pub fn from_snapshot(snapshot: &RunSnapshot) -> Self {
        let score = &snapshot.score;
        Self {
            total: snapshot.mutants.len(),
            mutation_score: score.count(),
            killed: score.killed,
            timeout: score.timed_out,
            survived: score.survived,
            incompetent: score.incompetent,
            incomplete: snapshot.pending_mutants().count(),
        }
    }
}

/// Render run report in requested format.
pub fn render_report(snapshot: &RunSnapshot, format: ReportFormat) -> String {
    let summary = RunSummary::from_snapshot(snapshot);
    let mutants: Vec<MutantReport> = snapshot.mutants.iter().map(MutantReport::from).collect();

    match format {
        ReportFormat::Json => serde_json::to_string_pretty(&serde_json::json!({
            "targets": snapshot.targets,
            "tests": snapshot.tests,
            "completed": snapshot.completed,
            "interrupted": snapshot.interrupted,
            "aborted": snapshot.aborted,
            "duration_ms": snapshot.duration_ms,
            "malformed_lines": snapshot.malformed_lines,
            "summary": summary,
            "mutants": mutants,
        }))
        .expect("report JSON should serialize"),
        ReportFormat::Markdown => {
            let mut out = format!("# Mutation Run: {}\n\n", snapshot.targets.join(", "));

            out.push_str(&format!(
                "- completed: {}\n- interrupted: {}\n- malformed lines: {}\n",
                snapshot.completed, snapshot.interrupted, snapshot.malformed_lines
            ));
            if let Some(reason) = &snapshot.aborted {
                out.push_str(&format!("- aborted: {reason}\n"));
            }
            out.push('\n');

            if !snapshot.baseline.is_empty() {
                out.push_str("## Baseline\n\n| suite | duration |\n|---|---:|\n");
                for suite in &snapshot.baseline {
                    out.push_str(&format!("| {} | {}ms |\n", suite.name, suite.duration_ms));
                }
                out.push('\n');
            }

            out.push_str("## Summary\n\n| metric | count |\n|---|---:|\n");
            out.push_str(&format!("| total | {} |\n", summary.total));
            out.push_str(&format!("| killed | {} |\n", summary.killed));
            out.push_str(&format!("| timeout | {} |\n", summary.timeout));
            out.push_str(&format!("| survived | {} |\n", summary.survived));
            out.push_str(&format!("| incompetent | {} |\n", summary.incompetent));
            out.push_str(&format!("| incomplete | {} |\n", summary.incomplete));
            out.push_str(&format!(
                "| mutation score | {:.2}% |\n",
                summary.mutation_score
            ));

            let survivors: Vec<&MutantReport> = mutants
                .iter()
                .filter(|m| m.status == Outcome::Survived.to_string())
                .collect();
            if !survivors.is_empty() {
                out.push_str("\n## Survivors\n\n");
                for m in survivors {
                    out.push_str(&format!(
                        "### #{} {} {}:{}\n\n",
                        m.number, m.operator, m.filename, m.line
                    ));
                    if !m.diff.is_empty() {
                        out.push_str("```diff\n");
                        out.push_str(&m.diff);
                        if !m.diff.ends_with('\n') {
                            out.push('\n');
                        }
                        out.push_str("```\n");
                    }
                    out.push('\n');
                }
            }

            out
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::score::MutationScore;

    fn record(number: usize, outcome: Option<Outcome>) -> MutantRecord {
        MutantRecord {
            number,
            operator: "ROR".to_string(),
            filename: "calc.py".to_string(),
            line: 3,
            diff: "- a < b\n+ a <= b\n".to_string(),
            status: outcome.map_or(MutantStatus::Pending, MutantStatus::Classified),
            duration_ms: Some(5),
            killer: None,
            error: None,
        }
    }

    fn snapshot() -> RunSnapshot {
        let mut score = MutationScore::new();
        score.record(Outcome::Killed);
        score.record(Outcome::Survived);
        score.record(Outcome::TimedOut);
        RunSnapshot {
            targets: vec!["calc".to_string()],
            tests: vec!["test_calc".to_string()],
            mutants: vec![
                record(1, Some(Outcome::Killed)),
                record(2, Some(Outcome::Survived)),
                record(3, Some(Outcome::TimedOut)),
                record(4, None),
            ],
            score,
            completed: true,
            ..RunSnapshot::default()
        }
    }

    #[test]
    fn summary_uses_ledger_formula() {
        let summary = RunSummary::from_snapshot(&snapshot());
        assert_eq!(summary.total, 4);
        assert_eq!(summary.incomplete, 1);
        assert!((summary.mutation_score - 200.0 / 3.0).abs() < 1e-9);
    }

    #[test]
    fn markdown_lists_survivors_with_diff() {
        let md = render_report(&snapshot(), ReportFormat::Markdown);
        assert!(md.starts_with("# Mutation Run: calc"));
        assert!(md.contains("| mutation score | 66.67% |"));
        assert!(md.contains("### #2 ROR calc.py:3"));
        assert!(md.contains("```diff\n- a < b\n+ a <= b\n```"));
        assert!(!md.contains("### #1"));
    }

    #[test]
    fn json_report_is_parseable() {
        let json = render_report(&snapshot(), ReportFormat::Json);
        let value: serde_json::Value = serde_json::from_str(&json).expect("report should parse");
        assert_eq!(value["summary"]["killed"], 1);
        assert_eq!(value["mutants"][2]["status"], "timeout");
        assert_eq!(value["mutants"][3]["status"], "pending");
    }
}

use std::path::PathBuf;
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand, ValueEnum};
use tracing::warn;

use mutscope::mutation::{
    InterruptFlag, MutationConfig, MutationController, Mutator, ReportFormat, TextView,
    install_ctrlc_handler, render_report, replay_events,
};
use mutscope::source::{
    CommandTestLoader, FileTargetLoader, SourceTree, TargetSpec, Workspace, WorkspaceMaterializer,
    all_operators, operator_by_name, parse_command,
};

#[derive(Debug, Parser)]
#[command(name = "mutscope")]
#[command(about = "Mutation testing for source files and command-line test suites")]
struct Cli {
    #[command(subcommand)]
    command: TopCommand,
}

#[derive(Debug, Subcommand)]
enum TopCommand {
    /// Mutate targets and run the test commands against every mutant.
    Run {
        /// Project directory. Mutants are built in temporary copies of it.
        #[arg(long, default_value = ".")]
        project: PathBuf,
        /// File to mutate, relative to the project, optionally `FILE:NAME` to
        /// restrict mutation to one function or class.
        #[arg(long = "target", required = true)]
        targets: Vec<String>,
        /// Test command; exit 0 means pass. Repeat for several suites.
        #[arg(long = "test", required = true)]
        tests: Vec<String>,
        /// Command run in each mutant copy before testing; failure makes the
        /// mutant incompetent.
        #[arg(long)]
        check: Option<String>,
        /// Mutant deadline as a multiple of the baseline test time.
        #[arg(long, default_value_t = 5.0)]
        timeout_factor: f64,
        /// Deadline floor in milliseconds.
        #[arg(long, default_value_t = 1000)]
        min_timeout_ms: u64,
        /// Let test and check output through.
        #[arg(long)]
        show_output: bool,
        /// Print the diff of every mutant.
        #[arg(long)]
        show_mutants: bool,
        /// Extra argument appended to every test command.
        #[arg(long)]
        filter: Option<String>,
        /// Append a JSON-lines event log here.
        #[arg(long)]
        events: Option<PathBuf>,
        /// Operators to use (AOR, ROR, LCR, BLR). Defaults to all.
        #[arg(long = "operator")]
        operators: Vec<String>,
    },
    /// Render a report from an event log.
    Report {
        /// Event log written by `run --events`.
        events: PathBuf,
        /// Output format.
        #[arg(long, value_enum, default_value = "md")]
        format: OutputFormat,
    },
}

#[derive(Debug, Clone, Copy, ValueEnum)]
enum OutputFormat {
    /// Markdown
    Md,
    /// JSON
    Json,
}

fn make_mutator(names: &[String]) -> Result<Mutator<SourceTree>> {
    if names.is_empty() {
        return Ok(Mutator::new(all_operators()));
    }
    let mut mutator = Mutator::default();
    for name in names {
        match operator_by_name(name) {
            Some(op) => mutator.add_operator(op),
            None => bail!("unknown operator `{name}` (expected AOR, ROR, LCR or BLR)"),
        }
    }
    Ok(mutator)
}

fn interrupt_flag() -> InterruptFlag {
    match install_ctrlc_handler() {
        Ok(flag) => flag,
        Err(err) => {
            warn!(error = %err, "cannot install Ctrl-C handler");
            InterruptFlag::new()
        }
    }
}

fn main() -> Result<()> {
    mutscope::logging::init();
    let cli = Cli::parse();

    match cli.command {
        TopCommand::Run {
            project,
            targets,
            tests,
            check,
            timeout_factor,
            min_timeout_ms,
            show_output,
            show_mutants,
            filter,
            events,
            operators,
        } => {
            let project = std::fs::canonicalize(&project)
                .with_context(|| format!("project directory {}", project.display()))?;
            let specs: Vec<TargetSpec> = targets.iter().map(|t| TargetSpec::parse(t)).collect();
            let target_names: Vec<String> = specs.iter().map(TargetSpec::name).collect();

            let mut config = MutationConfig::default()
                .with_timeout_factor(timeout_factor)
                .with_min_timeout(Duration::from_millis(min_timeout_ms))
                .with_suppress_output(!show_output);
            if let Some(filter) = filter {
                config = config.with_test_filter(filter);
            }
            if let Some(events) = events {
                config = config.with_events_path(events);
            }
            config.validate().context("--timeout-factor")?;

            let mut materializer = WorkspaceMaterializer::new(&project);
            if let Some(check) = check {
                materializer = materializer.with_check(parse_command(&check));
            }

            let mut controller = MutationController::<SourceTree, Workspace>::new(
                Box::new(FileTargetLoader::new(&project, specs)),
                Box::new(CommandTestLoader::new(tests, target_names)),
                make_mutator(&operators)?,
                Box::new(materializer),
                config,
            )
            .with_view(Box::new(TextView::stdout(show_mutants)))
            .with_interrupt(interrupt_flag());

            match controller.run() {
                Ok(report) => {
                    let t = report.timings;
                    println!(
                        "[*] Stage times: parse {:.3}s, generate {:.3}s, materialize {:.3}s, run {:.3}s",
                        t.parse.as_secs_f64(),
                        t.generate.as_secs_f64(),
                        t.materialize.as_secs_f64(),
                        t.run.as_secs_f64()
                    );
                }
                Err(_) => std::process::exit(1),
            }
        }
        TopCommand::Report { events, format } => {
            let format = match format {
                OutputFormat::Md => ReportFormat::Markdown,
                OutputFormat::Json => ReportFormat::Json,
            };
            let snapshot = replay_events(&events)
                .with_context(|| format!("reading event log {}", events.display()))?;
            println!("{}", render_report(&snapshot, format));
        }
    }

    Ok(())
}

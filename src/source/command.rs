//! Test commands run as child processes, plus file-based loaders.

use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::tree::SourceTree;
use super::workspace::{Workspace, parse_command};
use crate::mutation::suite::{TestContext, TestError, TestResult, TestSuite};
use crate::mutation::target::{LoadError, LoadedSuite, Target, TargetLoader, TestLoader};

const POLL_INTERVAL: Duration = Duration::from_millis(20);
const TRACE_LIMIT_BYTES: usize = 4096;

/// A suite whose tests are shell-free commands run inside the workspace the
/// registry currently binds to one of `targets`. When a mutant is injected,
/// its copy is preferred over the unmutated project.
#[derive(Debug, Clone)]
pub struct CommandSuite {
    name: String,
    targets: Vec<String>,
    tests: Vec<(String, Vec<String>)>,
}

impl CommandSuite {
    /// Empty suite resolving its workspace from `targets`.
    pub fn new(name: impl Into<String>, targets: Vec<String>) -> Self {
        Self {
            name: name.into(),
            targets,
            tests: Vec::new(),
        }
    }

    /// Append a test command.
    pub fn test(mut self, name: impl Into<String>, argv: Vec<String>) -> Self {
        self.tests.push((name.into(), argv));
        self
    }

    fn workspace(&self, ctx: &TestContext<Workspace>) -> Result<Arc<Workspace>, TestError> {
        let mut fallback = None;
        for name in &self.targets {
            let workspace = ctx.target(name)?;
            if workspace.is_variant() {
                return Ok(workspace);
            }
            if fallback.is_none() {
                fallback = Some(workspace);
            }
        }
        fallback.ok_or_else(|| TestError::Environment("suite has no targets".to_string()))
    }

    fn run_one(
        &self,
        ctx: &TestContext<Workspace>,
        argv: &[String],
        filter: Option<&str>,
    ) -> Result<(), TestError> {
        let workspace = self.workspace(ctx)?;
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| TestError::Environment("empty test command".to_string()))?;
        let mut command = Command::new(program);
        command
            .args(args)
            .args(filter)
            .current_dir(workspace.root())
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped());

        let mut child = command
            .spawn()
            .map_err(|e| TestError::Environment(format!("cannot run `{program}`: {e}")))?;
        let stdout = spawn_reader(child.stdout.take());
        let stderr = spawn_reader(child.stderr.take());

        let status = wait_or_cancel(&mut child, ctx)
            .map_err(|e| TestError::Environment(format!("waiting for `{program}`: {e}")))?;
        // Readers of a killed child are detached: grandchildren may hold the pipes.
        let Some(status) = status else {
            return Err(TestError::Error("cancelled".to_string()));
        };
        let stdout = join_reader(stdout);
        let stderr = join_reader(stderr);
        let _ = ctx.stdout().write_all(&stdout);
        let _ = ctx.output().stderr().write_all(&stderr);
        debug!(suite = %self.name, exit_code = ?status.code(), "test command finished");
        classify_exit(program, status, &stdout, &stderr)
    }
}

impl TestSuite<Workspace> for CommandSuite {
    fn name(&self) -> &str {
        &self.name
    }

    fn run(&self, ctx: &TestContext<Workspace>, filter: Option<&str>, result: &mut TestResult) {
        for (name, argv) in &self.tests {
            if result.should_stop() || ctx.is_cancelled() {
                break;
            }
            result.start_test();
            let outcome = self.run_one(ctx, argv, filter);
            result.add_outcome(&format!("{}::{name}", self.name), outcome);
        }
    }
}

/// Wait for `child`, killing and reaping it once `ctx` is cancelled.
/// `None` means the child was killed.
fn wait_or_cancel(
    child: &mut Child,
    ctx: &TestContext<Workspace>,
) -> std::io::Result<Option<ExitStatus>> {
    loop {
        if let Some(status) = child.wait_timeout(POLL_INTERVAL)? {
            return Ok(Some(status));
        }
        if ctx.is_cancelled() {
            debug!(pid = child.id(), "run cancelled, killing test command");
            if let Err(err) = child.kill() {
                warn!(pid = child.id(), error = %err, "failed to kill test command");
            }
            child.wait()?;
            return Ok(None);
        }
    }
}

fn classify_exit(
    program: &str,
    status: ExitStatus,
    stdout: &[u8],
    stderr: &[u8],
) -> Result<(), TestError> {
    match status.code() {
        Some(0) => Ok(()),
        Some(code @ (126 | 127)) => Err(TestError::Environment(format!(
            "`{program}` could not be executed (exit {code})"
        ))),
        Some(_) => Err(TestError::Assertion(trace(status, stdout, stderr))),
        None => Err(TestError::Error(trace(status, stdout, stderr))),
    }
}

fn trace(status: ExitStatus, stdout: &[u8], stderr: &[u8]) -> String {
    let mut text = format!("{status}\n");
    for stream in [stdout, stderr] {
        let tail = &stream[stream.len().saturating_sub(TRACE_LIMIT_BYTES)..];
        let tail = String::from_utf8_lossy(tail);
        if !tail.trim().is_empty() {
            text.push_str(tail.trim_end());
            text.push('\n');
        }
    }
    text
}

fn spawn_reader<R: Read + Send + 'static>(
    stream: Option<R>,
) -> Option<thread::JoinHandle<Vec<u8>>> {
    stream.map(|mut stream| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = stream.read_to_end(&mut buf);
            buf
        })
    })
}

fn join_reader(handle: Option<thread::JoinHandle<Vec<u8>>>) -> Vec<u8> {
    handle
        .and_then(|handle| handle.join().ok())
        .unwrap_or_default()
}

/// A file to mutate, optionally restricted to one named block.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TargetSpec {
    /// Path relative to the project root.
    pub file: PathBuf,
    /// Restrict mutation to the block defining this name.
    pub to_mutate: Option<String>,
}

impl TargetSpec {
    /// Parse `FILE` or `FILE:NAME`.
    pub fn parse(spec: &str) -> Self {
        match spec.rsplit_once(':') {
            Some((file, name)) if !file.is_empty() && !name.is_empty() => Self {
                file: PathBuf::from(file),
                to_mutate: Some(name.to_string()),
            },
            _ => Self {
                file: PathBuf::from(spec),
                to_mutate: None,
            },
        }
    }

    /// Registry name: the file path, plus `:NAME` when restricted.
    pub fn name(&self) -> String {
        match &self.to_mutate {
            Some(name) => format!("{}:{name}", self.file.display()),
            None => self.file.display().to_string(),
        }
    }
}

/// Loads source files of one project. Every target's program is the
/// unmutated project workspace.
#[derive(Debug, Clone)]
pub struct FileTargetLoader {
    project: PathBuf,
    specs: Vec<TargetSpec>,
}

impl FileTargetLoader {
    /// Loader for `specs` inside `project`.
    pub fn new(project: impl Into<PathBuf>, specs: Vec<TargetSpec>) -> Self {
        Self {
            project: project.into(),
            specs,
        }
    }

    /// Project root.
    pub fn project(&self) -> &Path {
        &self.project
    }
}

impl TargetLoader<SourceTree, Workspace> for FileTargetLoader {
    fn names(&self) -> Vec<String> {
        self.specs.iter().map(TargetSpec::name).collect()
    }

    fn load(&self) -> Result<Vec<Target<Workspace>>, LoadError> {
        if !self.project.is_dir() {
            return Err(LoadError::new(
                self.project.display().to_string(),
                "project directory does not exist",
            ));
        }
        let program = Arc::new(Workspace::original(&self.project));
        self.specs
            .iter()
            .map(|spec| {
                let file = self.project.join(&spec.file);
                if !file.is_file() {
                    return Err(LoadError::new(spec.name(), "no such file in project"));
                }
                Ok(Target {
                    name: spec.name(),
                    file,
                    to_mutate: spec.to_mutate.clone(),
                    program: Arc::clone(&program),
                })
            })
            .collect()
    }

    fn parse(&self, target: &Target<Workspace>) -> Result<SourceTree, LoadError> {
        SourceTree::read(&target.file).map_err(|e| LoadError::new(&target.name, e.to_string()))
    }
}

/// Builds one [`CommandSuite`] per configured command line.
#[derive(Debug, Clone)]
pub struct CommandTestLoader {
    commands: Vec<String>,
    targets: Vec<String>,
}

impl CommandTestLoader {
    /// One suite per entry of `commands`, resolving workspaces from `targets`.
    pub fn new(commands: Vec<String>, targets: Vec<String>) -> Self {
        Self { commands, targets }
    }
}

impl TestLoader<Workspace> for CommandTestLoader {
    fn names(&self) -> Vec<String> {
        self.commands.clone()
    }

    fn load(&self) -> Result<Vec<LoadedSuite<Workspace>>, LoadError> {
        if self.targets.is_empty() {
            return Err(LoadError::new("tests", "no targets to run tests against"));
        }
        self.commands
            .iter()
            .map(|cmd| {
                let argv = parse_command(cmd);
                if argv.is_empty() {
                    return Err(LoadError::new(cmd, "empty test command"));
                }
                let suite = CommandSuite::new(cmd, self.targets.clone()).test("run", argv);
                Ok(LoadedSuite {
                    suite: Arc::new(suite),
                    filter: None,
                })
            })
            .collect()
    }
}

//! Isolated project copies for mutants.

use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use std::time::Duration;

use tempfile::TempDir;
use tracing::{debug, warn};
use wait_timeout::ChildExt;

use super::tree::SourceTree;
use crate::mutation::generator::{Mutation, SyntaxTree};
use crate::mutation::materialize::{MaterializationError, Materializer, MutantIdentity};
use crate::mutation::output::OutputSink;
use crate::mutation::target::Target;

const SKIP_NAMES: &[&str] = &[
    ".git",
    ".hg",
    ".svn",
    "node_modules",
    ".venv",
    "venv",
    "__pycache__",
    ".tox",
    ".mypy_cache",
    ".pytest_cache",
    ".ruff_cache",
    "target",
    "dist",
    "build",
    ".next",
    ".nuxt",
];

const SKIP_SUFFIXES: &[&str] = &[".pyc", ".pyo"];

/// A directory the test commands run in: either the project itself or a
/// temporary copy holding one mutant. Copies are removed on drop.
#[derive(Debug)]
pub struct Workspace {
    root: PathBuf,
    tmp: Option<TempDir>,
}

impl Workspace {
    /// The unmutated project at `root`.
    pub fn original(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            tmp: None,
        }
    }

    /// Directory to run commands in.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// True for mutant copies.
    pub fn is_variant(&self) -> bool {
        self.tmp.is_some()
    }
}

fn should_skip(name: &str) -> bool {
    SKIP_NAMES.contains(&name) || SKIP_SUFFIXES.iter().any(|s| name.ends_with(s))
}

/// Recursively copy `src` into `dst`, leaving out VCS, cache and build
/// directories. Symlinks and special files are not copied.
pub fn copy_tree(src: &Path, dst: &Path) -> io::Result<()> {
    fs::create_dir_all(dst)?;
    for entry in fs::read_dir(src)? {
        let entry = entry?;
        let name = entry.file_name();
        if should_skip(&name.to_string_lossy()) {
            continue;
        }
        let src_path = entry.path();
        let dst_path = dst.join(&name);
        let ft = entry.file_type()?;
        if ft.is_dir() {
            copy_tree(&src_path, &dst_path)?;
        } else if ft.is_file() {
            fs::copy(&src_path, &dst_path)?;
        }
    }
    Ok(())
}

/// Split a command line on whitespace. No shell quoting is applied.
pub fn parse_command(cmd: &str) -> Vec<String> {
    cmd.split_whitespace().map(str::to_string).collect()
}

/// Builds each mutant as a temporary copy of the project with the mutated
/// source written over the target file, optionally validated by a check
/// command (compiler, linter) run inside the copy.
#[derive(Debug, Clone)]
pub struct WorkspaceMaterializer {
    project: PathBuf,
    check: Option<Vec<String>>,
    check_timeout: Duration,
}

impl WorkspaceMaterializer {
    /// Materializer copying `project`.
    pub fn new(project: impl Into<PathBuf>) -> Self {
        Self {
            project: project.into(),
            check: None,
            check_timeout: Duration::from_secs(60),
        }
    }

    /// Run `argv` in every copy; a failing check makes the mutant incompetent.
    pub fn with_check(mut self, argv: Vec<String>) -> Self {
        self.check = (!argv.is_empty()).then_some(argv);
        self
    }

    /// Bound on how long the check command may run.
    pub fn with_check_timeout(mut self, timeout: Duration) -> Self {
        self.check_timeout = timeout;
        self
    }

    fn run_check(&self, root: &Path, output: &OutputSink) -> Result<(), MaterializationError> {
        let Some(argv) = &self.check else {
            return Ok(());
        };
        let (program, args) = argv
            .split_first()
            .ok_or_else(|| MaterializationError::Initialization("empty check command".into()))?;
        let quiet = output.is_suppressed();
        let mut child = Command::new(program)
            .args(args)
            .current_dir(root)
            .stdin(Stdio::null())
            .stdout(if quiet { Stdio::null() } else { Stdio::inherit() })
            .stderr(if quiet { Stdio::null() } else { Stdio::inherit() })
            .spawn()
            .map_err(|e| {
                MaterializationError::Initialization(format!("cannot run `{program}`: {e}"))
            })?;

        let status = match child.wait_timeout(self.check_timeout)? {
            Some(status) => status,
            None => {
                warn!(
                    timeout_secs = self.check_timeout.as_secs(),
                    "check command timed out, killing"
                );
                child.kill()?;
                child.wait()?;
                return Err(MaterializationError::Initialization(format!(
                    "`{}` timed out",
                    argv.join(" ")
                )));
            }
        };
        if status.success() {
            Ok(())
        } else {
            Err(MaterializationError::Invalid(format!(
                "`{}` failed ({status})",
                argv.join(" ")
            )))
        }
    }
}

impl Materializer<SourceTree, Workspace> for WorkspaceMaterializer {
    fn materialize(
        &self,
        target: &Target<Workspace>,
        identity: &MutantIdentity,
        mutation: &Mutation<SourceTree>,
        output: &OutputSink,
    ) -> Result<Workspace, MaterializationError> {
        let relative = target.file.strip_prefix(&self.project).map_err(|_| {
            MaterializationError::Invalid(format!(
                "{} is outside project {}",
                target.file.display(),
                self.project.display()
            ))
        })?;

        let tmp = tempfile::Builder::new()
            .prefix(&format!("{identity}-"))
            .tempdir()?;
        copy_tree(&self.project, tmp.path())?;
        let destination = tmp.path().join(relative);
        if let Some(parent) = destination.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::write(&destination, mutation.tree.render())?;
        debug!(mutant = %identity, root = %tmp.path().display(), "workspace materialized");

        self.run_check(tmp.path(), output)?;
        Ok(Workspace {
            root: tmp.path().to_path_buf(),
            tmp: Some(tmp),
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use tempfile::tempdir;

    use super::*;

    fn project() -> TempDir {
        let dir = tempdir().expect("tempdir should be created");
        fs::write(dir.path().join("calc.py"), "def add(a, b):\n    return a + b\n")
            .expect("source should write");
        fs::create_dir_all(dir.path().join("tests")).expect("tests dir should exist");
        fs::write(dir.path().join("tests").join("test_calc.py"), "assert True\n")
            .expect("test should write");
        fs::create_dir_all(dir.path().join(".git")).expect("git dir should exist");
        fs::write(dir.path().join(".git").join("HEAD"), "ref").expect("git file should write");
        fs::write(dir.path().join("calc.pyc"), "bytecode").expect("pyc should write");
        dir
    }

    fn target(project: &Path) -> Target<Workspace> {
        Target {
            name: "calc".to_string(),
            file: project.join("calc.py"),
            to_mutate: None,
            program: Arc::new(Workspace::original(project)),
        }
    }

    fn mutation() -> Mutation<SourceTree> {
        Mutation {
            operator: "AOR".to_string(),
            line: 2,
            tree: SourceTree::parse("def add(a, b):\n    return a - b\n"),
        }
    }

    fn identity() -> MutantIdentity {
        MutantIdentity {
            number: 1,
            target: "calc".to_string(),
        }
    }

    #[test]
    fn copy_tree_skips_vcs_and_bytecode() {
        let src = project();
        let dst = tempdir().expect("tempdir should be created");
        copy_tree(src.path(), dst.path()).expect("copy should succeed");

        assert!(dst.path().join("calc.py").exists());
        assert!(dst.path().join("tests").join("test_calc.py").exists());
        assert!(!dst.path().join(".git").exists());
        assert!(!dst.path().join("calc.pyc").exists());
    }

    #[test]
    fn materialized_copy_holds_mutant_and_is_removed_on_drop() {
        let src = project();
        let materializer = WorkspaceMaterializer::new(src.path());
        let workspace = materializer
            .materialize(&target(src.path()), &identity(), &mutation(), &OutputSink::muted())
            .expect("mutant should materialize");

        assert!(workspace.is_variant());
        let name = workspace
            .root()
            .file_name()
            .map(|n| n.to_string_lossy().to_string())
            .unwrap_or_default();
        assert!(name.starts_with("mutant-1-calc-"), "unexpected dir {name}");
        let text = fs::read_to_string(workspace.root().join("calc.py")).expect("copy should read");
        assert!(text.contains("a - b"));
        let original = fs::read_to_string(src.path().join("calc.py")).expect("source should read");
        assert!(original.contains("a + b"));

        let root = workspace.root().to_path_buf();
        drop(workspace);
        assert!(!root.exists());
    }

    #[test]
    fn target_outside_project_is_invalid() {
        let src = project();
        let other = tempdir().expect("tempdir should be created");
        let materializer = WorkspaceMaterializer::new(other.path());
        let err = materializer
            .materialize(&target(src.path()), &identity(), &mutation(), &OutputSink::muted())
            .expect_err("foreign target should be rejected");
        assert!(matches!(err, MaterializationError::Invalid(_)));
    }

    #[cfg(unix)]
    #[test]
    fn failing_check_makes_mutant_invalid() {
        let src = project();
        let materializer = WorkspaceMaterializer::new(src.path())
            .with_check(parse_command("grep -q + calc.py"));
        let err = materializer
            .materialize(&target(src.path()), &identity(), &mutation(), &OutputSink::muted())
            .expect_err("check should reject mutant");
        assert!(matches!(err, MaterializationError::Invalid(_)));

        let passing = WorkspaceMaterializer::new(src.path()).with_check(parse_command("true"));
        assert!(
            passing
                .materialize(&target(src.path()), &identity(), &mutation(), &OutputSink::muted())
                .is_ok()
        );
    }

    #[test]
    fn missing_check_program_is_initialization_error() {
        let src = project();
        let materializer = WorkspaceMaterializer::new(src.path())
            .with_check(vec!["mutscope-no-such-program".to_string()]);
        let err = materializer
            .materialize(&target(src.path()), &identity(), &mutation(), &OutputSink::muted())
            .expect_err("missing program should fail");
        assert!(matches!(err, MaterializationError::Initialization(_)));
    }

    #[test]
    fn parse_command_splits_on_whitespace() {
        assert_eq!(
            parse_command("  python -m   pytest -q "),
            vec!["python", "-m", "pytest", "-q"]
        );
        assert!(parse_command("   ").is_empty());
    }
}

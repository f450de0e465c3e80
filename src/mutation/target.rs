//! Targets, loaders and load errors.

use std::path::PathBuf;
use std::sync::Arc;

use thiserror::Error;

use super::suite::TestSuite;

/// A target or test suite could not be located or loaded.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("can't load {name}: {reason}")]
pub struct LoadError {
    /// Name of the item that failed to load.
    pub name: String,
    /// Human-readable reason.
    pub reason: String,
}

impl LoadError {
    /// Build a load error.
    pub fn new(name: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            reason: reason.into(),
        }
    }
}

/// A unit under mutation. Its syntax tree is parsed on demand by the loader.
#[derive(Debug)]
pub struct Target<V> {
    /// Identifier the test code uses to resolve this program.
    pub name: String,
    /// Originating source file.
    pub file: PathBuf,
    /// Restrict mutation to this element (function, class, ...).
    pub to_mutate: Option<String>,
    /// The unmutated, loaded program.
    pub program: Arc<V>,
}

impl<V> Clone for Target<V> {
    fn clone(&self) -> Self {
        Self {
            name: self.name.clone(),
            file: self.file.clone(),
            to_mutate: self.to_mutate.clone(),
            program: Arc::clone(&self.program),
        }
    }
}

impl<V> Target<V> {
    /// Base file name used in notifications.
    pub fn filename(&self) -> String {
        self.file
            .file_name()
            .map(|name| name.to_string_lossy().to_string())
            .unwrap_or_else(|| self.name.clone())
    }
}

/// Supplies targets and parses them into syntax trees.
pub trait TargetLoader<T, V> {
    /// Names of the configured targets, for the `initialize` notification.
    fn names(&self) -> Vec<String>;

    /// Load every configured target.
    fn load(&self) -> Result<Vec<Target<V>>, LoadError>;

    /// Parse one loaded target.
    fn parse(&self, target: &Target<V>) -> Result<T, LoadError>;
}

/// A test suite plus an optional narrowing filter.
pub struct LoadedSuite<V> {
    /// The suite.
    pub suite: Arc<dyn TestSuite<V>>,
    /// Run only this test of the suite.
    pub filter: Option<String>,
}

/// Supplies test suites.
pub trait TestLoader<V> {
    /// Names of the configured suites, for the `initialize` notification.
    fn names(&self) -> Vec<String>;

    /// Load every configured suite.
    fn load(&self) -> Result<Vec<LoadedSuite<V>>, LoadError>;
}

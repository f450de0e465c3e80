//! Turning mutated trees into runnable program variants.

use std::fmt;
use std::panic::{AssertUnwindSafe, catch_unwind};

use thiserror::Error;

use super::generator::Mutation;
use super::output::OutputSink;
use super::suite::panic_message;
use super::target::Target;

/// A mutant could not be built into a runnable variant.
#[derive(Debug, Error)]
pub enum MaterializationError {
    /// The transformed tree is not a valid program.
    #[error("invalid mutant: {0}")]
    Invalid(String),
    /// The variant failed while initialising.
    #[error("mutant initialisation failed: {0}")]
    Initialization(String),
    /// Filesystem or process failure while building the variant.
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// Synthetic identity of a mutant, distinct from its target's name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MutantIdentity {
    /// 1-based mutant number within the run.
    pub number: usize,
    /// Name of the mutated target.
    pub target: String,
}

impl fmt::Display for MutantIdentity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let target: String = self
            .target
            .chars()
            .map(|c| {
                if c.is_ascii_alphanumeric() || c == '-' || c == '_' {
                    c
                } else {
                    '_'
                }
            })
            .collect();
        write!(f, "mutant-{}-{target}", self.number)
    }
}

/// Builds isolated program variants from mutated trees.
pub trait Materializer<T, V>: Send + Sync {
    /// Build `mutation` of `target` under `identity`. Anything the variant
    /// prints while initialising goes through `output`.
    fn materialize(
        &self,
        target: &Target<V>,
        identity: &MutantIdentity,
        mutation: &Mutation<T>,
        output: &OutputSink,
    ) -> Result<V, MaterializationError>;
}

type BuildFn<T, V> = dyn Fn(&T) -> Result<V, String> + Send + Sync;

/// In-process materializer around a build closure. Build errors are reported as
/// invalid mutants, panics as initialisation failures.
pub struct FnMaterializer<T, V> {
    build: Box<BuildFn<T, V>>,
}

impl<T, V> FnMaterializer<T, V> {
    /// Wrap `build`.
    pub fn new<F>(build: F) -> Self
    where
        F: Fn(&T) -> Result<V, String> + Send + Sync + 'static,
    {
        Self {
            build: Box::new(build),
        }
    }
}

impl<T, V> Materializer<T, V> for FnMaterializer<T, V> {
    fn materialize(
        &self,
        _target: &Target<V>,
        _identity: &MutantIdentity,
        mutation: &Mutation<T>,
        _output: &OutputSink,
    ) -> Result<V, MaterializationError> {
        match catch_unwind(AssertUnwindSafe(|| (self.build)(&mutation.tree))) {
            Ok(Ok(variant)) => Ok(variant),
            Ok(Err(reason)) => Err(MaterializationError::Invalid(reason)),
            Err(payload) => Err(MaterializationError::Initialization(panic_message(
                payload.as_ref(),
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;

    use super::*;

    fn target() -> Target<i64> {
        Target {
            name: "pkg.calc".to_string(),
            file: PathBuf::from("calc.py"),
            to_mutate: None,
            program: Arc::new(0),
        }
    }

    fn mutation(tree: Vec<i64>) -> Mutation<Vec<i64>> {
        Mutation {
            operator: "AOR".to_string(),
            line: 1,
            tree,
        }
    }

    fn identity() -> MutantIdentity {
        MutantIdentity {
            number: 3,
            target: "pkg.calc".to_string(),
        }
    }

    fn summing() -> FnMaterializer<Vec<i64>, i64> {
        FnMaterializer::new(|tree: &Vec<i64>| {
            if tree.is_empty() {
                return Err("empty program".to_string());
            }
            if tree.contains(&0) {
                panic!("division by zero during init");
            }
            Ok(tree.iter().sum())
        })
    }

    #[test]
    fn identity_is_distinct_from_target_name() {
        assert_eq!(identity().to_string(), "mutant-3-pkg_calc");
    }

    #[test]
    fn successful_build_returns_variant() {
        let variant = summing()
            .materialize(&target(), &identity(), &mutation(vec![1, 2]), &OutputSink::default())
            .expect("variant should build");
        assert_eq!(variant, 3);
    }

    #[test]
    fn build_error_is_invalid() {
        let err = summing()
            .materialize(&target(), &identity(), &mutation(vec![]), &OutputSink::default())
            .expect_err("empty program should not build");
        assert!(matches!(err, MaterializationError::Invalid(_)));
    }

    #[test]
    fn panicking_initialisation_is_reported() {
        let err = summing()
            .materialize(&target(), &identity(), &mutation(vec![1, 0]), &OutputSink::default())
            .expect_err("init panic should be reported");
        match err {
            MaterializationError::Initialization(msg) => {
                assert!(msg.contains("division by zero"))
            }
            other => panic!("expected initialisation error, got {other:?}"),
        }
    }
}

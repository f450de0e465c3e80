//! Line-oriented text backend.
//!
//! Targets are source files of a project directory. Mutants are written to
//! temporary copies of the project and test suites are external commands run
//! inside whichever copy is currently injected.

pub mod command;
pub mod operators;
pub mod tree;
pub mod workspace;

pub use command::{CommandSuite, CommandTestLoader, FileTargetLoader, TargetSpec};
pub use operators::{
    ArithmeticOperatorReplacement, BooleanLiteralReplacement, LogicalConnectorReplacement,
    OPERATOR_NAMES, RelationalOperatorReplacement, all_operators, operator_by_name,
};
pub use tree::SourceTree;
pub use workspace::{Workspace, WorkspaceMaterializer, copy_tree, parse_command};

//! Mutation generation over pluggable operators.

/// A syntax tree the engine can clone, ship to threads and render.
pub trait SyntaxTree: Clone + Send + Sync + 'static {
    /// Source-like rendering used for diffs and notifications.
    fn render(&self) -> String;
}

/// A rule that rewrites one site of a tree at a time.
pub trait MutationOperator<T>: Send + Sync {
    /// Short operator id (`AOR`, `ROR`, ...).
    fn name(&self) -> &str;

    /// Every tree this operator can produce from `tree`, each with the 1-based
    /// line it altered. `to_mutate` restricts the candidate sites. Must not
    /// modify `tree` and must yield the same sequence on every call.
    fn mutate<'a>(
        &'a self,
        tree: &'a T,
        to_mutate: Option<&'a str>,
    ) -> Box<dyn Iterator<Item = (T, u32)> + 'a>;
}

/// One mutant: the operator that made it, the line it changed and the tree.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Mutation<T> {
    /// Operator id.
    pub operator: String,
    /// 1-based source line.
    pub line: u32,
    /// Transformed tree.
    pub tree: T,
}

/// Ordered set of operators.
pub struct Mutator<T> {
    operators: Vec<Box<dyn MutationOperator<T>>>,
}

impl<T> Default for Mutator<T> {
    fn default() -> Self {
        Self {
            operators: Vec::new(),
        }
    }
}

impl<T> Mutator<T> {
    /// Mutator over `operators`, tried in the given order.
    pub fn new(operators: Vec<Box<dyn MutationOperator<T>>>) -> Self {
        Self { operators }
    }

    /// Register another operator after the existing ones.
    pub fn add_operator(&mut self, operator: Box<dyn MutationOperator<T>>) {
        self.operators.push(operator);
    }

    /// Registered operator ids, in order.
    pub fn operator_names(&self) -> Vec<String> {
        self.operators.iter().map(|op| op.name().to_string()).collect()
    }

    /// Lazily enumerate mutants: operators in registration order, each
    /// operator's own yield order within.
    pub fn mutate<'a>(
        &'a self,
        tree: &'a T,
        to_mutate: Option<&'a str>,
    ) -> impl Iterator<Item = Mutation<T>> + 'a {
        self.operators.iter().flat_map(move |op| {
            op.mutate(tree, to_mutate).map(move |(tree, line)| Mutation {
                operator: op.name().to_string(),
                line,
                tree,
            })
        })
    }
}

//! Token-level mutation operators over [`SourceTree`].
//!
//! Lines are scanned into words and operator-symbol runs. String literals and
//! trailing `#`/`//` comments are never touched. Each matching token is one
//! mutation site and yields exactly one mutant.

use std::ops::Range;

use super::tree::SourceTree;
use crate::mutation::generator::MutationOperator;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum TokenKind {
    Word,
    Symbol,
}

#[derive(Debug, Clone, PartialEq, Eq)]
struct Token<'a> {
    kind: TokenKind,
    text: &'a str,
    span: Range<usize>,
}

const SYMBOL_CHARS: &str = "+-*/%<>=!&|^~";

const PREFIX_KEYWORDS: &[&str] = &[
    "return", "not", "and", "or", "in", "is", "if", "elif", "else", "yield", "lambda", "print",
    "assert", "await", "case",
];

/// Code tokens of one line, in order.
fn tokenize(line: &str) -> Vec<Token<'_>> {
    let bytes = line.as_bytes();
    let mut tokens = Vec::new();
    let mut i = 0;

    while i < bytes.len() {
        let c = bytes[i];
        if c == b'#' || (c == b'/' && bytes.get(i + 1) == Some(&b'/')) {
            break;
        }
        if c == b'"' || c == b'\'' || c == b'`' {
            i = skip_string(bytes, i);
            continue;
        }
        if c.is_ascii_alphanumeric() || c == b'_' {
            let start = i;
            while i < bytes.len() && (bytes[i].is_ascii_alphanumeric() || bytes[i] == b'_') {
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Word,
                text: &line[start..i],
                span: start..i,
            });
            continue;
        }
        if SYMBOL_CHARS.as_bytes().contains(&c) {
            let start = i;
            i += 1;
            while i < bytes.len() && SYMBOL_CHARS.as_bytes().contains(&bytes[i]) {
                if bytes[i] == b'/' && bytes.get(i + 1) == Some(&b'/') {
                    break;
                }
                i += 1;
            }
            tokens.push(Token {
                kind: TokenKind::Symbol,
                text: &line[start..i],
                span: start..i,
            });
            continue;
        }
        // Non-ASCII bytes are skipped whole so spans stay on char boundaries.
        i += line[i..].chars().next().map_or(1, char::len_utf8);
    }
    tokens
}

/// Index just past the string literal opening at `start`.
fn skip_string(bytes: &[u8], start: usize) -> usize {
    let quote = bytes[start];
    let mut i = start + 1;
    while i < bytes.len() {
        match bytes[i] {
            b'\\' => i += 2,
            c if c == quote => return i + 1,
            _ => i += 1,
        }
    }
    bytes.len()
}

/// True when the token before `index` can end an operand, so the symbol at
/// `index` is in binary position.
fn is_binary(tokens: &[Token<'_>], index: usize, line: &str) -> bool {
    let Some(start) = tokens.get(index).map(|t| t.span.start) else {
        return false;
    };
    let before = line[..start].trim_end();
    let Some(last) = before.chars().last() else {
        return false;
    };
    if last == ')' || last == ']' || last == '}' || last == '"' || last == '\'' {
        return true;
    }
    if !(last.is_alphanumeric() || last == '_') {
        return false;
    }
    match index.checked_sub(1).and_then(|i| tokens.get(i)) {
        Some(prev) if prev.kind == TokenKind::Word && prev.span.end == before.len() => {
            !PREFIX_KEYWORDS.contains(&prev.text)
        }
        _ => true,
    }
}

/// Replacement rule of one operator.
trait Rule: Send + Sync {
    fn name(&self) -> &'static str;
    fn replacement(&self, tokens: &[Token<'_>], index: usize, line: &str) -> Option<&'static str>;
}

fn swap(text: &str, table: &[(&str, &'static str)]) -> Option<&'static str> {
    table
        .iter()
        .find(|(from, _)| *from == text)
        .map(|(_, to)| *to)
}

/// Arithmetic operator replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct ArithmeticOperatorReplacement;

impl Rule for ArithmeticOperatorReplacement {
    fn name(&self) -> &'static str {
        "AOR"
    }

    fn replacement(&self, tokens: &[Token<'_>], index: usize, line: &str) -> Option<&'static str> {
        let token = &tokens[index];
        if token.kind != TokenKind::Symbol || !is_binary(tokens, index, line) {
            return None;
        }
        swap(
            token.text,
            &[("+", "-"), ("-", "+"), ("*", "/"), ("/", "*"), ("%", "*")],
        )
    }
}

/// Relational operator replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct RelationalOperatorReplacement;

impl Rule for RelationalOperatorReplacement {
    fn name(&self) -> &'static str {
        "ROR"
    }

    fn replacement(&self, tokens: &[Token<'_>], index: usize, _line: &str) -> Option<&'static str> {
        let token = &tokens[index];
        if token.kind != TokenKind::Symbol {
            return None;
        }
        swap(
            token.text,
            &[
                ("<", "<="),
                ("<=", "<"),
                (">", ">="),
                (">=", ">"),
                ("==", "!="),
                ("!=", "=="),
            ],
        )
    }
}

/// Logical connector replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogicalConnectorReplacement;

impl Rule for LogicalConnectorReplacement {
    fn name(&self) -> &'static str {
        "LCR"
    }

    fn replacement(&self, tokens: &[Token<'_>], index: usize, _line: &str) -> Option<&'static str> {
        swap(
            tokens[index].text,
            &[("and", "or"), ("or", "and"), ("&&", "||"), ("||", "&&")],
        )
    }
}

/// Boolean literal replacement.
#[derive(Debug, Clone, Copy, Default)]
pub struct BooleanLiteralReplacement;

impl Rule for BooleanLiteralReplacement {
    fn name(&self) -> &'static str {
        "BLR"
    }

    fn replacement(&self, tokens: &[Token<'_>], index: usize, _line: &str) -> Option<&'static str> {
        let token = &tokens[index];
        if token.kind != TokenKind::Word {
            return None;
        }
        swap(
            token.text,
            &[
                ("True", "False"),
                ("False", "True"),
                ("true", "false"),
                ("false", "true"),
            ],
        )
    }
}

fn mutate_sites<'a, R: Rule>(
    rule: &'a R,
    tree: &'a SourceTree,
    to_mutate: Option<&'a str>,
) -> Box<dyn Iterator<Item = (SourceTree, u32)> + 'a> {
    let lines = match to_mutate {
        Some(name) => tree.block_of(name).unwrap_or(0..0),
        None => 0..tree.lines().len(),
    };
    Box::new(lines.flat_map(move |index| {
        let line = tree.lines()[index].as_str();
        let tokens = tokenize(line);
        let sites: Vec<(Range<usize>, &'static str)> = (0..tokens.len())
            .filter_map(|i| {
                rule.replacement(&tokens, i, line)
                    .map(|replacement| (tokens[i].span.clone(), replacement))
            })
            .collect();
        sites.into_iter().map(move |(span, replacement)| {
            (
                tree.with_replacement(index, span, replacement),
                index as u32 + 1,
            )
        })
    }))
}

macro_rules! text_operators {
    ($($ty:ty),* $(,)?) => {$(
        impl MutationOperator<SourceTree> for $ty {
            fn name(&self) -> &str {
                Rule::name(self)
            }

            fn mutate<'a>(
                &'a self,
                tree: &'a SourceTree,
                to_mutate: Option<&'a str>,
            ) -> Box<dyn Iterator<Item = (SourceTree, u32)> + 'a> {
                mutate_sites(self, tree, to_mutate)
            }
        }
    )*};
}

text_operators!(
    ArithmeticOperatorReplacement,
    RelationalOperatorReplacement,
    LogicalConnectorReplacement,
    BooleanLiteralReplacement,
);

/// Operator ids in default registration order.
pub const OPERATOR_NAMES: &[&str] = &["AOR", "ROR", "LCR", "BLR"];

/// Look up an operator by id (case-insensitive).
pub fn operator_by_name(name: &str) -> Option<Box<dyn MutationOperator<SourceTree>>> {
    match name.to_ascii_uppercase().as_str() {
        "AOR" => Some(Box::new(ArithmeticOperatorReplacement)),
        "ROR" => Some(Box::new(RelationalOperatorReplacement)),
        "LCR" => Some(Box::new(LogicalConnectorReplacement)),
        "BLR" => Some(Box::new(BooleanLiteralReplacement)),
        _ => None,
    }
}

/// All operators in default order.
pub fn all_operators() -> Vec<Box<dyn MutationOperator<SourceTree>>> {
    OPERATOR_NAMES
        .iter()
        .filter_map(|name| operator_by_name(name))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mutation::generator::{Mutator, SyntaxTree};

    fn mutants(op: &dyn MutationOperator<SourceTree>, text: &str) -> Vec<(String, u32)> {
        let tree = SourceTree::parse(text);
        op.mutate(&tree, None)
            .map(|(tree, line)| (tree.render(), line))
            .collect()
    }

    #[test]
    fn aor_swaps_binary_operators_only() {
        let found = mutants(
            &ArithmeticOperatorReplacement,
            "x = -1\ny = a + b * c\nreturn -x\nz = f(*args)\n",
        );
        assert_eq!(
            found,
            vec![
                ("x = -1\ny = a - b * c\nreturn -x\nz = f(*args)\n".to_string(), 2),
                ("x = -1\ny = a + b / c\nreturn -x\nz = f(*args)\n".to_string(), 2),
            ]
        );
    }

    #[test]
    fn aor_ignores_compound_tokens_strings_and_comments() {
        let found = mutants(
            &ArithmeticOperatorReplacement,
            "x += 1\ns = \"a + b\"\ny = a ** 2  # a + b\nz = a // b\n",
        );
        assert!(found.is_empty(), "unexpected mutants: {found:?}");
    }

    #[test]
    fn ror_swaps_each_comparison() {
        let found = mutants(&RelationalOperatorReplacement, "if a < b and c == d:\n");
        let rendered: Vec<&str> = found.iter().map(|(text, _)| text.as_str()).collect();
        assert_eq!(
            rendered,
            vec!["if a <= b and c == d:\n", "if a < b and c != d:\n"]
        );
    }

    #[test]
    fn lcr_and_blr_work_on_words_and_symbols() {
        let lcr = mutants(&LogicalConnectorReplacement, "ok = a and b || c\n");
        assert_eq!(lcr.len(), 2);
        assert_eq!(lcr[0].0, "ok = a or b || c\n");
        assert_eq!(lcr[1].0, "ok = a and b && c\n");

        let blr = mutants(&BooleanLiteralReplacement, "flag = True\nother = false\nTrueish = 1\n");
        assert_eq!(blr.len(), 2);
        assert_eq!(blr[0], ("flag = False\nother = false\nTrueish = 1\n".to_string(), 1));
        assert_eq!(blr[1].1, 2);
    }

    #[test]
    fn restriction_limits_sites_to_the_named_block() {
        let tree = SourceTree::parse("def add(a, b):\n    return a + b\n\ndef sub(a, b):\n    return a - b\n");
        let op = ArithmeticOperatorReplacement;
        let lines: Vec<u32> = op.mutate(&tree, Some("sub")).map(|(_, line)| line).collect();
        assert_eq!(lines, vec![5]);
        assert_eq!(op.mutate(&tree, Some("missing")).count(), 0);
    }

    #[test]
    fn mutator_runs_operators_in_default_order() {
        let tree = SourceTree::parse("if a + b > c:\n    ok = True\n");
        let mutator = Mutator::new(all_operators());
        let ops: Vec<String> = mutator.mutate(&tree, None).map(|m| m.operator).collect();
        assert_eq!(ops, vec!["AOR", "ROR", "BLR"]);
        assert!(operator_by_name("aor").is_some());
        assert!(operator_by_name("XYZ").is_none());
    }

    #[test]
    fn original_tree_is_unchanged() {
        let tree = SourceTree::parse("y = a + b\n");
        let before = tree.clone();
        let _ = ArithmeticOperatorReplacement.mutate(&tree, None).count();
        assert_eq!(tree, before);
    }
}

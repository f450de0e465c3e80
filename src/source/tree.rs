//! Line-structured source text.

use std::io;
use std::ops::Range;
use std::path::Path;

use crate::mutation::generator::SyntaxTree;

/// A source file as a sequence of lines.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceTree {
    lines: Vec<String>,
    trailing_newline: bool,
}

impl SourceTree {
    /// Split `text` into lines. `\r\n` endings are normalised to `\n`.
    pub fn parse(text: &str) -> Self {
        Self {
            lines: text.lines().map(str::to_string).collect(),
            trailing_newline: text.ends_with('\n'),
        }
    }

    /// Read and parse a file.
    pub fn read(path: &Path) -> io::Result<Self> {
        Ok(Self::parse(&std::fs::read_to_string(path)?))
    }

    /// Lines without terminators.
    pub fn lines(&self) -> &[String] {
        &self.lines
    }

    /// Copy with `span` of line `index` replaced by `replacement`.
    pub fn with_replacement(&self, index: usize, span: Range<usize>, replacement: &str) -> Self {
        let mut tree = self.clone();
        if let Some(line) = tree.lines.get_mut(index) {
            line.replace_range(span, replacement);
        }
        tree
    }

    /// Half-open range of line indexes making up the block that defines
    /// `name`: the defining line plus every following line indented deeper
    /// (blank lines included). `None` when no line defines `name`.
    pub fn block_of(&self, name: &str) -> Option<Range<usize>> {
        let start = self.lines.iter().position(|line| defines(line, name))?;
        let indent = indentation(&self.lines[start]);
        let mut end = start + 1;
        while end < self.lines.len() {
            let line = &self.lines[end];
            if !line.trim().is_empty() && indentation(line) <= indent {
                break;
            }
            end += 1;
        }
        while end > start + 1 && self.lines[end - 1].trim().is_empty() {
            end -= 1;
        }
        Some(start..end)
    }
}

impl SyntaxTree for SourceTree {
    fn render(&self) -> String {
        let mut text = self.lines.join("\n");
        if self.trailing_newline {
            text.push('\n');
        }
        text
    }
}

const DEFINING_KEYWORDS: &[&str] = &["def", "fn", "function", "func", "class", "struct", "impl"];

fn defines(line: &str, name: &str) -> bool {
    let words: Vec<&str> = line
        .split(|c: char| !(c.is_alphanumeric() || c == '_'))
        .filter(|word| !word.is_empty())
        .collect();
    words
        .windows(2)
        .any(|pair| DEFINING_KEYWORDS.contains(&pair[0]) && pair[1] == name)
}

fn indentation(line: &str) -> usize {
    line.chars()
        .take_while(|c| c.is_whitespace())
        .map(|c| if c == '\t' { 4 } else { 1 })
        .sum()
}

#[cfg(test)]
mod tests {
    use super::*;

    const CALC: &str = "\
def add(a, b):
    return a + b

def sub(a, b):
    if a > b:
        return a - b

    return b - a

x = add(1, 2)
";

    #[test]
    fn render_preserves_text() {
        assert_eq!(SourceTree::parse(CALC).render(), CALC);
        assert_eq!(SourceTree::parse("a\nb").render(), "a\nb");
    }

    #[test]
    fn replacement_touches_one_line() {
        let tree = SourceTree::parse(CALC);
        let mutant = tree.with_replacement(1, 13..14, "-");
        assert_eq!(mutant.lines()[1], "    return a - b");
        assert_eq!(tree.lines()[1], "    return a + b");
    }

    #[test]
    fn block_spans_indented_body() {
        let tree = SourceTree::parse(CALC);
        assert_eq!(tree.block_of("add"), Some(0..2));
        assert_eq!(tree.block_of("sub"), Some(3..8));
        assert_eq!(tree.block_of("mul"), None);
    }

    #[test]
    fn block_recognises_other_languages() {
        let tree = SourceTree::parse("pub fn add(a: i64) -> i64 {\n    a + 1\n}\n");
        assert_eq!(tree.block_of("add"), Some(0..2));
    }
}
